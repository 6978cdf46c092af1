use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::trace;

use crate::types::NodeEvent;

/// Broadcasts node lifecycle events (started, succeeded, failed, fatal) from
/// the node runner to any number of listeners, such as the CLI event printer.
///
/// Every subscriber sees every event published after it subscribed.
pub struct EventBus {
    tx: Sender<NodeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many listeners received the event.
    pub fn publish(&self, event: NodeEvent) -> usize {
        match self.tx.send(event) {
            Ok(listeners) => listeners,
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "No listeners for node event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionId, NodeType};

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let delivered = bus.publish(NodeEvent::Started {
            execution_id: ExecutionId::new(),
            node_id: "n1".into(),
            node_type: NodeType::TemplateTransform,
        });
        assert_eq!(delivered, 1);
        match rx.recv().await.unwrap() {
            NodeEvent::Started { node_id, .. } => assert_eq!(node_id, "n1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        let delivered = bus.publish(NodeEvent::Fatal {
            execution_id: ExecutionId::new(),
            node_id: "n1".into(),
            message: "boom".into(),
        });
        assert_eq!(delivered, 0);
    }
}
