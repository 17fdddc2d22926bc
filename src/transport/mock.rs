//! Scripted transport doubles for testing and demos.
//!
//! These let you exercise discovery, connection retries and fan-out without a
//! radio. Every double records what was asked of it so tests can assert on
//! call counts and ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{DiscoveryOptions, ServiceProfile};
use crate::transport::{
    ConnectResult, Connector, DeviceAddress, DiscoveryBackend, PeerCandidate, Transport,
};
use crate::{AudioChunk, DiscoveryError, TransportError};

struct MockTransportState {
    received: Mutex<Vec<AudioChunk>>,
    live: AtomicBool,
    closed: AtomicBool,
    fail_after: Option<usize>,
    write_delay: Duration,
    close_calls: AtomicUsize,
}

/// A transport that records every chunk it receives.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
///
/// # Example
///
/// ```
/// use syncstream::transport::mock::MockTransport;
///
/// let transport = MockTransport::new().fail_after(2);
/// let observer = transport.clone();
/// // hand `transport` to the engine, then inspect `observer.received_sequences()`
/// assert_eq!(observer.write_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    /// Creates a live transport that accepts every write.
    pub fn new() -> Self {
        Self::with_script(None, Duration::ZERO)
    }

    fn with_script(fail_after: Option<usize>, write_delay: Duration) -> Self {
        Self {
            state: Arc::new(MockTransportState {
                received: Mutex::new(Vec::new()),
                live: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                fail_after,
                write_delay,
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Accepts `n` writes, then fails every later write.
    #[must_use]
    pub fn fail_after(self, n: usize) -> Self {
        Self::with_script(Some(n), self.state.write_delay)
    }

    /// Sleeps before handling each write.
    #[must_use]
    pub fn with_write_delay(self, delay: Duration) -> Self {
        Self::with_script(self.state.fail_after, delay)
    }

    /// Flips the liveness flag the engine checks before each write.
    pub fn set_live(&self, live: bool) {
        self.state.live.store(live, Ordering::SeqCst);
    }

    /// Returns the sequence numbers of delivered chunks, in arrival order.
    pub fn received_sequences(&self) -> Vec<u64> {
        self.state.received.lock().iter().map(|c| c.sequence).collect()
    }

    /// Returns the delivered bytes, concatenated.
    pub fn received_bytes(&self) -> Vec<u8> {
        self.state
            .received
            .lock()
            .iter()
            .flat_map(|c| c.as_bytes().iter().copied())
            .collect()
    }

    /// Returns the number of delivered chunks.
    pub fn write_count(&self) -> usize {
        self.state.received.lock().len()
    }

    /// Returns `true` once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Returns how many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst) && !self.is_closed()
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), TransportError> {
        if !self.state.write_delay.is_zero() {
            tokio::time::sleep(self.state.write_delay).await;
        }
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut received = self.state.received.lock();
        if let Some(limit) = self.state.fail_after {
            if received.len() >= limit {
                return Err(TransportError::write_failed("scripted failure"));
            }
        }
        received.push(chunk.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// How a [`MockConnector`] answers one device.
#[derive(Clone, Default)]
pub struct PeerPlan {
    accept: Option<ServiceProfile>,
    unsupported: bool,
    failures_first: usize,
    connect_delay: Duration,
    transport: Option<MockTransport>,
}

impl PeerPlan {
    /// Connects only when asked for `profile`.
    pub fn accept_on(profile: ServiceProfile) -> Self {
        Self {
            accept: Some(profile),
            ..Default::default()
        }
    }

    /// Fails every attempt with a transient error.
    pub fn always_fail() -> Self {
        Self::default()
    }

    /// Answers every attempt with [`ConnectResult::Unsupported`].
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Default::default()
        }
    }

    /// Fails the first `n` attempts regardless of profile.
    #[must_use]
    pub fn after_failures(mut self, n: usize) -> Self {
        self.failures_first = n;
        self
    }

    /// Makes every attempt take `delay` before it resolves, like a page
    /// that has to time out.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Hands out this transport on success instead of a fresh one.
    #[must_use]
    pub fn with_transport(mut self, transport: MockTransport) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// A connector that follows per-device [`PeerPlan`]s.
///
/// Devices with no plan fail every attempt with a transient error.
///
/// # Example
///
/// ```
/// use syncstream::transport::mock::{MockConnector, PeerPlan};
/// use syncstream::{DeviceAddress, ServiceProfile};
///
/// let speaker = DeviceAddress::from(0xA1);
/// let connector = MockConnector::new()
///     .with_peer(speaker, PeerPlan::accept_on(ServiceProfile::AudioSink));
/// assert_eq!(connector.attempts_for(speaker), 0);
/// ```
#[derive(Default)]
pub struct MockConnector {
    plans: HashMap<DeviceAddress, PeerPlan>,
    attempts: Mutex<Vec<(DeviceAddress, ServiceProfile)>>,
    transports: Mutex<HashMap<DeviceAddress, MockTransport>>,
}

impl MockConnector {
    /// Creates a connector with no plans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plan for one device.
    #[must_use]
    pub fn with_peer(mut self, address: impl Into<DeviceAddress>, plan: PeerPlan) -> Self {
        self.plans.insert(address.into(), plan);
        self
    }

    /// Returns every `connect` call, in call order.
    pub fn attempts(&self) -> Vec<(DeviceAddress, ServiceProfile)> {
        self.attempts.lock().clone()
    }

    /// Returns the number of `connect` calls made for one device.
    pub fn attempts_for(&self, address: impl Into<DeviceAddress>) -> usize {
        let address = address.into();
        self.attempts
            .lock()
            .iter()
            .filter(|(a, _)| *a == address)
            .count()
    }

    /// Returns a handle to the transport handed out for a device.
    pub fn transport(&self, address: impl Into<DeviceAddress>) -> Option<MockTransport> {
        self.transports.lock().get(&address.into()).cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: DeviceAddress, profile: ServiceProfile) -> ConnectResult {
        let previous = {
            let mut attempts = self.attempts.lock();
            let previous = attempts.iter().filter(|(a, _)| *a == address).count();
            attempts.push((address, profile));
            previous
        };

        let Some(plan) = self.plans.get(&address) else {
            return ConnectResult::TransientFailure(format!("{address} did not answer"));
        };

        if !plan.connect_delay.is_zero() {
            tokio::time::sleep(plan.connect_delay).await;
        }
        if plan.unsupported {
            return ConnectResult::Unsupported("stack cannot reach this device".into());
        }
        if previous < plan.failures_first {
            return ConnectResult::TransientFailure("page timeout".into());
        }
        if plan.accept != Some(profile) {
            return ConnectResult::TransientFailure(format!("{profile} refused"));
        }

        let transport = plan.transport.clone().unwrap_or_default();
        self.transports.lock().insert(address, transport.clone());
        ConnectResult::Connected(Box::new(transport))
    }
}

/// A discovery backend returning a scripted result.
pub struct MockDiscovery {
    name: String,
    result: Result<Vec<PeerCandidate>, DiscoveryError>,
    calls: AtomicUsize,
}

impl MockDiscovery {
    /// Returns `candidates` on every call.
    pub fn found(name: impl Into<String>, candidates: Vec<PeerCandidate>) -> Self {
        Self {
            name: name.into(),
            result: Ok(candidates),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns no candidates on every call.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::found(name, Vec::new())
    }

    /// Fails every call with `error`.
    pub fn failing(name: impl Into<String>, error: DiscoveryError) -> Self {
        Self {
            name: name.into(),
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many times `discover` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryBackend for MockDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(
        &self,
        _options: &DiscoveryOptions,
    ) -> Result<Vec<PeerCandidate>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
