//! Discovery with path fallback.

use tracing::{info, warn};

use crate::config::DiscoveryOptions;
use crate::event::emit;
use crate::transport::{DiscoveryBackend, DiscoverySource, PeerCandidate};
use crate::{EventCallback, StreamEvent};

/// Candidates produced by one discovery run.
///
/// Iterate it (or call [`into_candidates`](Self::into_candidates)) to get the
/// candidates. An unavailable discovery is empty, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    candidates: Vec<PeerCandidate>,
    source: Option<DiscoverySource>,
}

impl Discovery {
    fn from_path(source: DiscoverySource, candidates: Vec<PeerCandidate>) -> Self {
        let candidates = candidates
            .into_iter()
            .map(|c| c.with_source(source))
            .collect();
        Self {
            candidates,
            source: Some(source),
        }
    }

    fn unavailable() -> Self {
        Self {
            candidates: Vec::new(),
            source: None,
        }
    }

    /// Returns the candidates.
    pub fn candidates(&self) -> &[PeerCandidate] {
        &self.candidates
    }

    /// Consumes the result, returning the candidates.
    pub fn into_candidates(self) -> Vec<PeerCandidate> {
        self.candidates
    }

    /// Returns the path whose result this is, or `None` when every path
    /// failed.
    pub fn source(&self) -> Option<DiscoverySource> {
        self.source
    }

    /// Returns `true` when every discovery path failed.
    pub fn is_unavailable(&self) -> bool {
        self.source.is_none()
    }

    /// Returns the number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns `true` if no candidate was found.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl IntoIterator for Discovery {
    type Item = PeerCandidate;
    type IntoIter = std::vec::IntoIter<PeerCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

/// Tries the primary path, then the fallback path once if the primary failed
/// or found nothing.
///
/// The fallback result replaces the primary one as-is. Discovery is only
/// unavailable when every path that ran returned an error.
pub(crate) async fn run(
    primary: &dyn DiscoveryBackend,
    fallback: Option<&dyn DiscoveryBackend>,
    options: &DiscoveryOptions,
    events: Option<&EventCallback>,
) -> Discovery {
    let primary_failed = match primary.discover(options).await {
        Ok(found) if !found.is_empty() => {
            return completed(DiscoverySource::Primary, found, events);
        }
        Ok(_) => {
            if fallback.is_none() {
                return completed(DiscoverySource::Primary, Vec::new(), events);
            }
            fell_back(primary.name(), "no candidates found", events);
            false
        }
        Err(e) => {
            if fallback.is_some() {
                fell_back(primary.name(), &e.to_string(), events);
            } else {
                warn!(backend = primary.name(), error = %e, "discovery failed");
            }
            true
        }
    };

    let Some(fallback) = fallback else {
        return unavailable(events);
    };

    match fallback.discover(options).await {
        Ok(found) => completed(DiscoverySource::Fallback, found, events),
        Err(e) => {
            warn!(backend = fallback.name(), error = %e, "fallback discovery failed");
            if primary_failed {
                unavailable(events)
            } else {
                completed(DiscoverySource::Primary, Vec::new(), events)
            }
        }
    }
}

fn completed(
    source: DiscoverySource,
    found: Vec<PeerCandidate>,
    events: Option<&EventCallback>,
) -> Discovery {
    info!(%source, found = found.len(), "discovery completed");
    emit(
        events,
        StreamEvent::DiscoveryCompleted {
            source,
            found: found.len(),
        },
    );
    Discovery::from_path(source, found)
}

fn fell_back(backend: &str, reason: &str, events: Option<&EventCallback>) {
    warn!(backend, reason, "primary discovery gave nothing, trying fallback");
    emit(
        events,
        StreamEvent::DiscoveryFallback {
            backend: backend.to_string(),
            reason: reason.to_string(),
        },
    );
}

fn unavailable(events: Option<&EventCallback>) -> Discovery {
    warn!("no discovery path succeeded");
    emit(events, StreamEvent::DiscoveryUnavailable);
    Discovery::unavailable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockDiscovery;
    use crate::DiscoveryError;

    fn fallback_path(backend: &MockDiscovery) -> Option<&dyn DiscoveryBackend> {
        Some(backend)
    }

    fn speakers(n: u64) -> Vec<PeerCandidate> {
        (1..=n)
            .map(|i| PeerCandidate::new(i, format!("Speaker {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_primary_results_skip_fallback() {
        let primary = MockDiscovery::found("stack", speakers(2));
        let fallback = MockDiscovery::found("poll", speakers(5));

        let discovery = run(&primary, fallback_path(&fallback), &DiscoveryOptions::default(), None).await;

        assert_eq!(discovery.len(), 2);
        assert_eq!(discovery.source(), Some(DiscoverySource::Primary));
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_uses_fallback_once() {
        let primary = MockDiscovery::empty("stack");
        let fallback = MockDiscovery::found("poll", speakers(3));

        let discovery = run(&primary, fallback_path(&fallback), &DiscoveryOptions::default(), None).await;

        assert_eq!(fallback.calls(), 1);
        assert_eq!(discovery.source(), Some(DiscoverySource::Fallback));
        assert!(discovery
            .candidates()
            .iter()
            .all(|c| c.source == DiscoverySource::Fallback));
        assert_eq!(
            discovery
                .into_iter()
                .map(|c| c.address.to_u64())
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_unsupported_primary_uses_fallback() {
        let primary = MockDiscovery::failing("stack", DiscoveryError::unsupported("no binding"));
        let fallback = MockDiscovery::found("poll", speakers(1));

        let discovery = run(&primary, fallback_path(&fallback), &DiscoveryOptions::default(), None).await;
        assert_eq!(discovery.len(), 1);
        assert!(!discovery.is_unavailable());
    }

    #[tokio::test]
    async fn test_all_paths_failed_is_unavailable() {
        let primary = MockDiscovery::failing("stack", DiscoveryError::unsupported("no binding"));
        let fallback = MockDiscovery::failing("poll", DiscoveryError::failed("radio off"));

        let discovery = run(&primary, fallback_path(&fallback), &DiscoveryOptions::default(), None).await;
        assert!(discovery.is_unavailable());
        assert!(discovery.is_empty());
    }

    #[tokio::test]
    async fn test_empty_primary_failed_fallback_is_empty_not_unavailable() {
        let primary = MockDiscovery::empty("stack");
        let fallback = MockDiscovery::failing("poll", DiscoveryError::failed("radio off"));

        let discovery = run(&primary, fallback_path(&fallback), &DiscoveryOptions::default(), None).await;
        assert!(discovery.is_empty());
        assert_eq!(discovery.source(), Some(DiscoverySource::Primary));
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let primary = MockDiscovery::failing("stack", DiscoveryError::failed("timeout"));
        let discovery = run(&primary, None, &DiscoveryOptions::default(), None).await;
        assert!(discovery.is_unavailable());

        let primary = MockDiscovery::empty("stack");
        let discovery = run(&primary, None, &DiscoveryOptions::default(), None).await;
        assert!(!discovery.is_unavailable());
        assert!(discovery.is_empty());
    }
}
