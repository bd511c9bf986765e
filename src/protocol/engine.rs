//! `EngineHandle` (§11): the top-level object a deployment constructs once.
//!
//! Wires the dispatcher's task-expiry sweep together with the two other
//! periodic background jobs named in the spec but owned by neither the
//! dispatcher nor any one protocol state machine: peer keepalive ping
//! (`ppc-pir`'s `OtPIRImpl::startPingTimer`) and agency-directory refresh
//! (§6). Both run on their own `RetryTimer` (C15) so a transient failure
//! backs off instead of busy-looping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::framing::{AlgorithmId, FramedMessage, MessageType, TaskType};
use crate::protocol::timer::{BackoffPolicy, RetryTimer};
use crate::transport::{AgencyDirectory, Transport};

/// Keepalive task id pings ride on; peers treat a `PingPeer` message as a
/// liveness signal regardless of which real task is in flight, so it
/// doesn't need to name one.
const PING_TASK_ID: &str = "__keepalive__";

pub struct EngineHandle {
    pub config: EngineConfig,
    pub dispatcher: Arc<Dispatcher>,
    ping_timer: Arc<RetryTimer>,
    agency_timer: Arc<RetryTimer>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Self {
        let dispatcher = Dispatcher::new(config.clone());
        let ping_timer = RetryTimer::new(BackoffPolicy::fixed(Duration::from_millis(
            config.ping_interval_ms,
        )));
        let agency_timer = RetryTimer::new(BackoffPolicy::fixed(Duration::from_millis(
            config.agency_refresh_ms,
        )));
        Self {
            config,
            dispatcher,
            ping_timer,
            agency_timer,
        }
    }

    /// Starts the dispatcher's expiry sweep plus the keepalive ping to
    /// `peers` and, if given, the periodic agency-directory refresh.
    /// Idempotent per-timer, matching `startPingTimer`'s reconnect guard.
    pub async fn start(
        &self,
        transport: Arc<dyn Transport>,
        self_id: String,
        peers: Vec<String>,
        directory: Option<(Arc<dyn AgencyDirectory>, Vec<String>)>,
    ) {
        self.dispatcher.start_expiry_sweep().await;

        let ping_transport = Arc::clone(&transport);
        let ping_self_id = self_id.clone();
        self.ping_timer
            .start(move || {
                for peer_id in &peers {
                    let Ok(msg) = FramedMessage::new(
                        TaskType::Psi,
                        AlgorithmId::EcdhPsi,
                        MessageType::PingPeer,
                        0,
                        PING_TASK_ID,
                        &ping_self_id,
                        b"",
                        vec![],
                    ) else {
                        continue;
                    };
                    let transport = Arc::clone(&ping_transport);
                    let peer_id = peer_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = transport.send(&peer_id, msg).await {
                            debug!(peer_id, error = %e, "keepalive ping failed");
                        }
                    });
                }
                true
            })
            .await;

        if let Some((directory, agency_ids)) = directory {
            self.agency_timer
                .start(move || {
                    for agency_id in &agency_ids {
                        let directory = Arc::clone(&directory);
                        let agency_id = agency_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = directory.resolve(&agency_id).await {
                                warn!(agency_id, error = %e, "agency directory refresh failed");
                            }
                        });
                    }
                    true
                })
                .await;
        }
    }

    pub async fn stop(&self) {
        self.ping_timer.stop().await;
        self.agency_timer.stop().await;
        self.dispatcher.stop_expiry_sweep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[tokio::test(start_paused = true)]
    async fn start_then_stop_is_idempotent_and_quiet() {
        let config = EngineConfig::default();
        let handle = EngineHandle::new(config);

        let mem = Arc::new(InMemoryTransport::new());
        mem.register("peer-a", PING_TASK_ID);
        let transport: Arc<dyn Transport> = mem;

        handle
            .start(transport, "self".into(), vec!["peer-a".into()], None)
            .await;
        tokio::time::advance(Duration::from_millis(10)).await;
        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_ping_reaches_registered_peer() {
        let config = EngineConfig::default();
        let handle = EngineHandle::new(config.clone());

        let mem = Arc::new(InMemoryTransport::new());
        mem.register("peer-a", PING_TASK_ID);
        let transport: Arc<dyn Transport> = mem;

        handle
            .start(
                Arc::clone(&transport),
                "self".into(),
                vec!["peer-a".into()],
                None,
            )
            .await;
        tokio::time::advance(Duration::from_millis(config.ping_interval_ms + 10)).await;
        tokio::task::yield_now().await;

        let received = transport.recv("peer-a", PING_TASK_ID).await.unwrap();
        assert!(matches!(received.message_type, MessageType::PingPeer));
        handle.stop().await;
    }
}
