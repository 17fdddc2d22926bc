//! Builder pattern for `SyncStream`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ConnectionProfile, DiscoveryOptions, ManagerConfig, ServiceProfile};
use crate::engine::BroadcastEngine;
use crate::fallback::FallbackSink;
use crate::manager::{ConnectionManager, Discovery};
use crate::session::{ChunkSender, Session, SessionStats};
use crate::transport::{Connector, DiscoveryBackend, PeerCandidate};
use crate::{event_callback, EventCallback, StreamConfig, StreamEvent, SyncStreamError};

/// Builder for assembling a [`SyncStream`].
///
/// Use [`SyncStream::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use syncstream::{ChannelFallback, ServiceProfile, SyncStream};
/// use tokio::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel(32);
///
/// let stream = SyncStream::builder()
///     .stack(MyRadioStack::open()?)
///     .fallback_sink(ChannelFallback::new(tx))
///     .profiles([ServiceProfile::AudioSink, ServiceProfile::Handsfree])
///     .on_event(|e| tracing::info!(?e, "stream event"))
///     .build()?;
///
/// stream.discover_and_connect().await;
/// let sender = stream.start_session().await?;
/// ```
///
/// [`SyncStream::builder()`]: crate::SyncStream::builder
#[must_use]
pub struct SyncStreamBuilder {
    discovery: Option<Arc<dyn DiscoveryBackend>>,
    fallback_discovery: Option<Arc<dyn DiscoveryBackend>>,
    connector: Option<Arc<dyn Connector>>,
    fallback_sink: Option<Arc<dyn FallbackSink>>,
    manager_config: ManagerConfig,
    config: StreamConfig,
    event_callback: Option<EventCallback>,
}

impl Default for SyncStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStreamBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            discovery: None,
            fallback_discovery: None,
            connector: None,
            fallback_sink: None,
            manager_config: ManagerConfig::default(),
            config: StreamConfig::default(),
            event_callback: None,
        }
    }

    /// Sets the primary discovery path.
    pub fn discovery<D: DiscoveryBackend + 'static>(self, backend: D) -> Self {
        self.shared_discovery(Arc::new(backend))
    }

    /// Sets the primary discovery path from a shared handle.
    pub fn shared_discovery(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.discovery = Some(backend);
        self
    }

    /// Sets the discovery path tried when the primary path fails or finds
    /// nothing.
    pub fn fallback_discovery<D: DiscoveryBackend + 'static>(self, backend: D) -> Self {
        self.shared_fallback_discovery(Arc::new(backend))
    }

    /// Sets the fallback discovery path from a shared handle.
    pub fn shared_fallback_discovery(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.fallback_discovery = Some(backend);
        self
    }

    /// Sets the connector.
    pub fn connector<C: Connector + 'static>(self, connector: C) -> Self {
        self.shared_connector(Arc::new(connector))
    }

    /// Sets the connector from a shared handle.
    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Uses one radio stack binding as both primary discovery path and
    /// connector.
    pub fn stack<S>(mut self, stack: S) -> Self
    where
        S: DiscoveryBackend + Connector + 'static,
    {
        let stack = Arc::new(stack);
        let discovery: Arc<dyn DiscoveryBackend> = stack.clone();
        let connector: Arc<dyn Connector> = stack;
        self.discovery = Some(discovery);
        self.connector = Some(connector);
        self
    }

    /// Sets the sink that plays chunks while no peer is live.
    pub fn fallback_sink<F: FallbackSink + 'static>(self, sink: F) -> Self {
        self.shared_fallback_sink(Arc::new(sink))
    }

    /// Sets the fallback sink from a shared handle.
    pub fn shared_fallback_sink(mut self, sink: Arc<dyn FallbackSink>) -> Self {
        self.fallback_sink = Some(sink);
        self
    }

    /// Sets the profile preference list.
    ///
    /// Default: `[AudioSink, Handsfree]`
    pub fn profiles(mut self, profiles: impl IntoIterator<Item = ServiceProfile>) -> Self {
        self.manager_config.profiles = ConnectionProfile::new(profiles);
        self
    }

    /// Sets how many passes over the profile list a candidate gets.
    ///
    /// Default: 3
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.manager_config.retry_attempts = attempts;
        self
    }

    /// Sets the pause between passes.
    ///
    /// Default: zero
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.manager_config.retry_delay = delay;
        self
    }

    /// Sets the options handed to discovery backends.
    pub fn discovery_options(mut self, options: DiscoveryOptions) -> Self {
        self.manager_config.discovery = options;
        self
    }

    /// Replaces the whole connection manager configuration.
    pub fn with_manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager_config = config;
        self
    }

    /// Set custom stream configuration.
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include discovery degradation, connection outcomes, peer
    /// evictions and fallback transitions.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the configuration and assembles the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No discovery backend is configured
    /// - No connector is configured
    /// - No fallback sink is configured
    /// - The profile list is empty or the retry ceiling is zero
    pub fn build(self) -> Result<SyncStream, SyncStreamError> {
        let discovery = self.discovery.ok_or(SyncStreamError::NoDiscoveryBackend)?;
        let connector = self.connector.ok_or(SyncStreamError::NoConnector)?;
        let fallback = self.fallback_sink.ok_or(SyncStreamError::NoFallbackSink)?;

        let mut manager = ConnectionManager::new(discovery, connector, self.manager_config)?;
        if let Some(backend) = self.fallback_discovery {
            manager = manager.with_fallback_discovery(backend);
        }

        let mut engine = BroadcastEngine::new();
        if let Some(callback) = self.event_callback.clone() {
            manager = manager.with_event_callback(callback.clone());
            engine = engine.with_event_callback(callback);
        }

        debug!(fallback = fallback.name(), "sync stream assembled");

        Ok(SyncStream {
            manager,
            engine: Arc::new(engine),
            fallback,
            config: self.config,
            event_callback: self.event_callback,
            session: Mutex::new(None),
        })
    }
}

/// Result of [`SyncStream::connect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectSummary {
    /// Candidates handed to the connection manager.
    pub attempted: usize,
    /// Peers added to the live set.
    pub added: usize,
    /// Candidates dropped after exhausting retries or hitting an
    /// unsupported stack.
    pub failed: usize,
    /// Candidates skipped because their address is already live.
    pub skipped: usize,
    /// Connections the live set refused.
    pub rejected: usize,
}

/// Main entry point: one connection manager, one broadcast engine and at
/// most one running session.
///
/// Connect cycles may run at any time, including while a session is
/// streaming; new peers receive audio from the next chunk on.
pub struct SyncStream {
    manager: ConnectionManager,
    engine: Arc<BroadcastEngine>,
    fallback: Arc<dyn FallbackSink>,
    config: StreamConfig,
    event_callback: Option<EventCallback>,
    session: Mutex<Option<Session>>,
}

impl SyncStream {
    /// Creates a new builder.
    pub fn builder() -> SyncStreamBuilder {
        SyncStreamBuilder::new()
    }

    /// Returns the broadcast engine holding the live peer set.
    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }

    /// Returns the connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Returns the stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Enumerates nearby devices.
    pub async fn discover(&self) -> Discovery {
        self.manager.discover().await
    }

    /// Connects candidates and adds the resulting peers to the live set.
    ///
    /// Candidates whose address is already live are skipped without a
    /// connect attempt.
    pub async fn connect(
        &self,
        candidates: impl IntoIterator<Item = PeerCandidate>,
    ) -> ConnectSummary {
        let (fresh, live): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !self.engine.contains(c.address));

        let report = self.manager.connect_all(fresh).await;
        let mut summary = ConnectSummary {
            attempted: report.attempted,
            failed: report.failed,
            skipped: live.len(),
            ..Default::default()
        };

        for peer in report.peers {
            match self.engine.admit(peer).await {
                Ok(_) => summary.added += 1,
                Err(e) => {
                    warn!(error = %e, "live set refused connection");
                    summary.rejected += 1;
                }
            }
        }

        info!(
            added = summary.added,
            skipped = summary.skipped,
            live = self.engine.peer_count(),
            "connect cycle finished"
        );
        summary
    }

    /// Runs one discovery followed by one connect cycle.
    pub async fn discover_and_connect(&self) -> ConnectSummary {
        let discovery = self.discover().await;
        self.connect(discovery).await
    }

    /// Starts a streaming session and returns its producer handle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStreamError::SessionAlreadyRunning`] if a session is
    /// running.
    pub async fn start_session(&self) -> Result<ChunkSender, SyncStreamError> {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(Session::is_running) {
            return Err(SyncStreamError::SessionAlreadyRunning);
        }

        let (session, sender) = Session::start(
            Arc::clone(&self.engine),
            Arc::clone(&self.fallback),
            &self.config,
            self.event_callback.clone(),
        );
        *slot = Some(session);
        Ok(sender)
    }

    /// Stops the running session, draining queued chunks and disconnecting
    /// every peer.
    ///
    /// A no-op when no session is running.
    pub async fn stop_session(&self) {
        if let Some(session) = self.session.lock().await.as_mut() {
            session.stop().await;
        }
    }

    /// Returns `true` while a session is running.
    pub async fn is_streaming(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_running)
    }

    /// Returns statistics for the current or most recent session.
    pub async fn session_stats(&self) -> Option<SessionStats> {
        self.session.lock().await.as_ref().map(Session::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::ChannelFallback;
    use crate::transport::mock::{MockConnector, MockDiscovery, MockTransport, PeerPlan};
    use crate::transport::{ConnectResult, DeviceAddress};
    use crate::DiscoveryError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// A stack binding that finds one speaker and connects it on any profile.
    struct OneSpeakerStack;

    #[async_trait]
    impl DiscoveryBackend for OneSpeakerStack {
        fn name(&self) -> &str {
            "one-speaker"
        }

        async fn discover(
            &self,
            _options: &DiscoveryOptions,
        ) -> Result<Vec<PeerCandidate>, DiscoveryError> {
            Ok(vec![PeerCandidate::new(0xA1_u64, "Speaker")])
        }
    }

    #[async_trait]
    impl Connector for OneSpeakerStack {
        async fn connect(&self, _address: DeviceAddress, _profile: ServiceProfile) -> ConnectResult {
            ConnectResult::Connected(Box::new(MockTransport::new()))
        }
    }

    fn fallback() -> ChannelFallback {
        ChannelFallback::new(mpsc::channel(8).0)
    }

    #[test]
    fn test_builder_rejects_missing_discovery() {
        let result = SyncStream::builder()
            .connector(MockConnector::new())
            .fallback_sink(fallback())
            .build();
        assert!(matches!(result, Err(SyncStreamError::NoDiscoveryBackend)));
    }

    #[test]
    fn test_builder_rejects_missing_connector() {
        let result = SyncStream::builder()
            .discovery(MockDiscovery::empty("primary"))
            .fallback_sink(fallback())
            .build();
        assert!(matches!(result, Err(SyncStreamError::NoConnector)));
    }

    #[test]
    fn test_builder_rejects_missing_fallback_sink() {
        let result = SyncStream::builder().stack(OneSpeakerStack).build();
        assert!(matches!(result, Err(SyncStreamError::NoFallbackSink)));
    }

    #[test]
    fn test_builder_rejects_bad_manager_config() {
        let result = SyncStream::builder()
            .stack(OneSpeakerStack)
            .fallback_sink(fallback())
            .retry_attempts(0)
            .build();
        assert!(matches!(
            result,
            Err(SyncStreamError::InvalidRetryCeiling { value: 0 })
        ));

        let result = SyncStream::builder()
            .stack(OneSpeakerStack)
            .fallback_sink(fallback())
            .profiles([])
            .build();
        assert!(matches!(result, Err(SyncStreamError::NoProfilesConfigured)));
    }

    #[test]
    fn test_builder_applies_manager_settings() {
        let stream = SyncStream::builder()
            .stack(OneSpeakerStack)
            .fallback_sink(fallback())
            .profiles([ServiceProfile::Headset])
            .retry_attempts(5)
            .retry_delay(Duration::from_millis(20))
            .build()
            .unwrap();

        let config = stream.manager().config();
        assert_eq!(config.profiles.as_slice(), &[ServiceProfile::Headset]);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_stack_discovers_and_connects() {
        let stream = SyncStream::builder()
            .stack(OneSpeakerStack)
            .fallback_sink(fallback())
            .build()
            .unwrap();

        let summary = stream.discover_and_connect().await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.added, 1);
        assert_eq!(stream.engine().peer_addresses(), vec![DeviceAddress::from(0xA1_u64)]);
    }

    #[tokio::test]
    async fn test_connect_skips_live_addresses() {
        let connector = Arc::new(
            MockConnector::new().with_peer(0xB2_u64, PeerPlan::accept_on(ServiceProfile::AudioSink)),
        );
        let stream = SyncStream::builder()
            .discovery(MockDiscovery::empty("primary"))
            .shared_connector(connector.clone())
            .fallback_sink(fallback())
            .build()
            .unwrap();
        let candidate = PeerCandidate::new(0xB2_u64, "Headphones");

        let first = stream.connect([candidate.clone()]).await;
        let second = stream.connect([candidate]).await;

        assert_eq!(first.added, 1);
        assert_eq!(second.attempted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(connector.attempts_for(0xB2_u64), 1);
        assert_eq!(stream.engine().peer_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_closes_refused_connection() {
        let dead = MockTransport::new();
        dead.set_live(false);
        let connector = MockConnector::new().with_peer(
            0xC3_u64,
            PeerPlan::accept_on(ServiceProfile::AudioSink).with_transport(dead.clone()),
        );
        let stream = SyncStream::builder()
            .discovery(MockDiscovery::empty("primary"))
            .connector(connector)
            .fallback_sink(fallback())
            .build()
            .unwrap();

        let summary = stream.connect([PeerCandidate::new(0xC3_u64, "Car Kit")]).await;

        assert_eq!(summary.added, 0);
        assert_eq!(summary.rejected, 1);
        assert_eq!(dead.close_count(), 1);
        assert!(stream.engine().is_empty());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let stream = SyncStream::builder()
            .stack(OneSpeakerStack)
            .fallback_sink(fallback())
            .build()
            .unwrap();
        assert!(stream.session_stats().await.is_none());

        let sender = stream.start_session().await.unwrap();
        assert!(stream.is_streaming().await);
        assert!(matches!(
            stream.start_session().await,
            Err(SyncStreamError::SessionAlreadyRunning)
        ));

        sender.send(vec![0u8; 32]).await.unwrap();
        stream.stop_session().await;
        stream.stop_session().await;
        assert!(!stream.is_streaming().await);
        assert_eq!(stream.session_stats().await.unwrap().chunks_received, 1);

        // A stopped session can be replaced
        let sender = stream.start_session().await.unwrap();
        assert!(sender.is_running());
        stream.stop_session().await;
    }
}
