pub mod auto_notify;
pub mod formatters;

pub use auto_notify::AutoNotifier;
