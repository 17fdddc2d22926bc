//! Peer discovery and connection management.
//!
//! The [`ConnectionManager`] finds candidates through a primary discovery
//! path (with an optional fallback path) and negotiates a profile with each
//! candidate. Candidates are connected concurrently; one candidate's retries
//! never hold up another's.

mod connect;
mod discovery;

pub use discovery::Discovery;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::engine::PeerConnection;
use crate::event::emit;
use crate::transport::{Connector, DiscoveryBackend, PeerCandidate};
use crate::{EventCallback, StreamEvent, SyncStreamError};

/// Result of [`ConnectionManager::connect_all`].
///
/// Failed candidates appear only in the counts.
#[derive(Debug, Default)]
pub struct ConnectReport {
    /// Connections ready to hand to the broadcast engine.
    pub peers: Vec<PeerConnection>,
    /// Distinct candidates attempted.
    pub attempted: usize,
    /// Candidates dropped after exhausting retries or hitting an
    /// unsupported stack.
    pub failed: usize,
}

impl ConnectReport {
    /// Returns the number of connected candidates.
    pub fn connected(&self) -> usize {
        self.peers.len()
    }
}

/// Discovers candidates and negotiates connections with them.
///
/// The manager keeps no reference to a connection once `connect_all` returns
/// it.
pub struct ConnectionManager {
    primary: Arc<dyn DiscoveryBackend>,
    fallback: Option<Arc<dyn DiscoveryBackend>>,
    connector: Arc<dyn Connector>,
    config: ManagerConfig,
    event_callback: Option<EventCallback>,
}

impl ConnectionManager {
    /// Creates a manager with a primary discovery path and a connector.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`ManagerConfig::validate`].
    pub fn new(
        primary: Arc<dyn DiscoveryBackend>,
        connector: Arc<dyn Connector>,
        config: ManagerConfig,
    ) -> Result<Self, SyncStreamError> {
        config.validate()?;
        Ok(Self {
            primary,
            fallback: None,
            connector,
            config,
            event_callback: None,
        })
    }

    /// Sets the discovery path used when the primary path fails or finds
    /// nothing.
    #[must_use]
    pub fn with_fallback_discovery(mut self, fallback: Arc<dyn DiscoveryBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets the callback that receives discovery and connection events.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Enumerates nearby devices.
    ///
    /// Never fails: when every path fails the result is empty and
    /// [`Discovery::is_unavailable`] is `true`.
    pub async fn discover(&self) -> Discovery {
        discovery::run(
            self.primary.as_ref(),
            self.fallback.as_deref(),
            &self.config.discovery,
            self.event_callback.as_ref(),
        )
        .await
    }

    /// Connects every candidate concurrently.
    ///
    /// Each candidate gets the full profile/retry cycle on its own task, so
    /// a slow or retrying candidate never holds up the others. Peers are
    /// reported as their cycles finish. A repeated address is attempted
    /// once, using its first occurrence.
    pub async fn connect_all(
        &self,
        candidates: impl IntoIterator<Item = PeerCandidate>,
    ) -> ConnectReport {
        let mut seen = HashSet::new();
        let candidates: Vec<PeerCandidate> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.address))
            .collect();

        let config = Arc::new(self.config.clone());
        let mut cycles = JoinSet::new();
        for (index, candidate) in candidates.iter().cloned().enumerate() {
            let connector = Arc::clone(&self.connector);
            let config = Arc::clone(&config);
            let events = self.event_callback.clone();
            cycles.spawn(async move {
                let outcome = connect::connect_candidate(
                    connector.as_ref(),
                    &candidate,
                    &config,
                    events.as_ref(),
                )
                .await;
                (index, outcome)
            });
        }

        let events = self.event_callback.as_ref();
        let mut report = ConnectReport {
            attempted: candidates.len(),
            ..Default::default()
        };
        while let Some(joined) = cycles.join_next().await {
            let (index, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    warn!(error = %e, "connection task failed");
                    report.failed += 1;
                    continue;
                }
            };
            let candidate = &candidates[index];
            match outcome {
                Ok(peer) => {
                    info!(
                        address = %peer.address(),
                        name = peer.name(),
                        profile = %peer.profile(),
                        "peer connected"
                    );
                    emit(
                        events,
                        StreamEvent::PeerConnected {
                            address: peer.address(),
                            name: peer.name().to_string(),
                            profile: peer.profile(),
                        },
                    );
                    report.peers.push(peer);
                }
                Err(failure) => {
                    warn!(
                        address = %candidate.address,
                        name = %candidate.name,
                        attempts = failure.attempts,
                        reason = %failure.reason,
                        "connection failed"
                    );
                    emit(
                        events,
                        StreamEvent::ConnectionFailed {
                            address: candidate.address,
                            name: candidate.name.clone(),
                            attempts: failure.attempts,
                            reason: failure.reason,
                        },
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "{} of {} candidates connected",
            report.connected(),
            report.attempted
        );
        emit(
            events,
            StreamEvent::ConnectionSummary {
                connected: report.connected(),
                attempted: report.attempted,
            },
        );
        report
    }
}
