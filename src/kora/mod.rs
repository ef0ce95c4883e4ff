pub mod monitor;

pub use monitor::KoraMonitor;
