use futures::StreamExt;
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use super::election::{ElectionSettings, NodeCore};
use super::protocol::{decode, encode, CodecError, Envelope, Message};
use super::transport::Transport;
use super::types::NodeClock;
use crate::config::MeshConfig;

/// One mesh participant bound to a transport.
///
/// The heartbeat tick and inbound messages are handled by the same task,
/// one at a time, under the write lock of the shared [`NodeCore`].
pub struct MeshNode {
    node_id: String,
    core: Arc<RwLock<NodeCore>>,
    transport: Arc<dyn Transport>,
    clock: NodeClock,
    interval: Duration,
    cancel: CancellationToken,
    rng: SmallRng,
}

impl MeshNode {
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: &MeshConfig,
        cancel: CancellationToken,
    ) -> Self {
        let node_id = node_id.into();
        let clock = NodeClock::new();
        let core = NodeCore::new(node_id.clone(), clock.now(), ElectionSettings::from(config));

        Self {
            node_id,
            core: Arc::new(RwLock::new(core)),
            transport,
            clock,
            interval: config.heartbeat_interval(),
            cancel,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Replaces the voting randomness with a seeded generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn core(&self) -> Arc<RwLock<NodeCore>> {
        self.core.clone()
    }

    /// Runs until the cancellation token fires or the transport closes.
    pub async fn run(self) {
        let span = info_span!("node", node_id = %self.node_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) {
        // Subscribe first so replies to the startup request are not missed.
        let mut inbound = self.transport.subscribe();

        info!("Node started");
        let startup = self.core.write().startup();
        self.publish_all(startup);

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.on_tick(),
                raw = inbound.next() => match raw {
                    Some(raw) => self.on_raw(&raw),
                    None => {
                        warn!("Transport closed");
                        break;
                    }
                },
            }
        }

        info!("Node stopped");
    }

    fn on_tick(&mut self) {
        let now = self.clock.now();
        let out = self.core.write().tick(now, &mut self.rng);
        self.publish_all(out);
    }

    /// Outermost dispatch point: nothing raised here may stop the loop.
    fn on_raw(&mut self, raw: &[u8]) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed envelope");
                return;
            }
        };

        if envelope.sender_id == self.node_id {
            trace!(tag = %envelope.type_tag, "Skipping own message");
            return;
        }

        let message = match decode(&envelope) {
            Ok(message) => message,
            Err(CodecError::UnknownType(tag)) => {
                warn!(sender = %envelope.sender_id, %tag, "Unknown message type");
                return;
            }
            Err(e) => {
                error!(sender = %envelope.sender_id, error = ?e, "Failed to decode message");
                return;
            }
        };

        let tag = message.type_tag();
        let result = self.core.write().handle(&envelope.sender_id, message);
        match result {
            Ok(out) => self.publish_all(out),
            Err(e) => error!(
                sender = %envelope.sender_id,
                tag,
                error = ?e,
                "Error while handling message"
            ),
        }
    }

    fn publish_all(&self, messages: Vec<Message>) {
        for message in messages {
            let envelope = match encode(&self.node_id, &message) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(tag = message.type_tag(), error = ?e, "Failed to encode message");
                    continue;
                }
            };

            debug!(tag = %envelope.type_tag, "Broadcasting");
            if let Err(e) = self.transport.publish(envelope.to_bytes()) {
                warn!(tag = %envelope.type_tag, error = %e, "Failed to publish message");
            }
        }
    }
}
