use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{trace, warn};

use crate::error::SwarmError;

/// Stream of every unit published on the bus after subscription.
pub type Subscription = BoxStream<'static, Vec<u8>>;

/// Shared publish/subscribe capability. Subscribers also receive their own
/// publications; no ordering across publishers and no delivery guarantee.
pub trait Transport: Send + Sync {
    fn publish(&self, message: Vec<u8>) -> Result<(), SwarmError>;

    fn subscribe(&self) -> Subscription;
}

/// In-process bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastTransport {
    tx: broadcast::Sender<Vec<u8>>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Transport for BroadcastTransport {
    fn publish(&self, message: Vec<u8>) -> Result<(), SwarmError> {
        // With no subscriber the unit is simply lost, like on any bus.
        if self.tx.send(message).is_err() {
            trace!("Published with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|item| {
                future::ready(match item {
                    Ok(message) => Some(message),
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(missed, "Subscriber lagged behind, messages lost");
                        None
                    }
                })
            })
            .boxed()
    }
}
