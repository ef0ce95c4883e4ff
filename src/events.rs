use solana_sdk::pubkey::Pubkey;
use tokio::sync::broadcast;
use tracing::trace;

use crate::reclaim::engine::ReclaimStatus;

const CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the pipeline for alerting subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Transition {
        address: Pubkey,
        from: ReclaimStatus,
        to: ReclaimStatus,
        amount: u64,
        signature: Option<String>,
        error_detail: Option<String>,
    },
    /// Only emitted when the rejected balance meets the materiality threshold
    Rejected {
        address: Pubkey,
        balance: u64,
        reason: String,
    },
}

impl PipelineEvent {
    pub fn address(&self) -> &Pubkey {
        match self {
            PipelineEvent::Transition { address, .. } => address,
            PipelineEvent::Rejected { address, .. } => address,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            PipelineEvent::Transition { to, .. } => to.is_terminal(),
            PipelineEvent::Rejected { .. } => true,
        }
    }
}

/// Fan-out channel. Publishing never blocks and never fails the caller.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    materiality_threshold: u64,
}

impl EventBus {
    pub fn new(materiality_threshold: u64) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            materiality_threshold,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        // no receivers is fine
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    /// Publishes a rejection if its balance is material.
    pub fn rejected(&self, address: Pubkey, balance: u64, reason: String) {
        if balance >= self.materiality_threshold {
            self.publish(PipelineEvent::Rejected {
                address,
                balance,
                reason,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejections_below_threshold_are_dropped() {
        let bus = EventBus::new(1_000_000);
        let mut rx = bus.subscribe();
        let small = Pubkey::new_unique();
        let large = Pubkey::new_unique();

        bus.rejected(small, 999_999, "RECENTLY_ACTIVE".into());
        bus.rejected(large, 1_000_000, "UNKNOWN_OWNER".into());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.address(), &large);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(0);
        bus.publish(PipelineEvent::Rejected {
            address: Pubkey::new_unique(),
            balance: 1,
            reason: "UNKNOWN_OWNER".into(),
        });
    }
}
