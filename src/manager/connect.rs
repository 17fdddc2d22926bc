//! Per-candidate connection cycle: profile fallback with bounded retries.

use std::fmt;

use tracing::debug;

use crate::config::ManagerConfig;
use crate::engine::PeerConnection;
use crate::event::emit;
use crate::transport::{ConnectResult, Connector, PeerCandidate};
use crate::{EventCallback, StreamEvent};

/// A failed profile attempt, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptFailure {
    /// The stack cannot reach this candidate at all.
    Unsupported(String),
    /// This profile failed this time.
    Transient(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(reason) => write!(f, "unsupported: {reason}"),
            Self::Transient(reason) => f.write_str(reason),
        }
    }
}

/// Position in the retry schedule. `attempt` is the 1-based pass number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub attempt: u32,
    pub profile_index: usize,
}

impl Cursor {
    pub(crate) const FIRST: Self = Self {
        attempt: 1,
        profile_index: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Try(Cursor),
    Abandon,
}

/// Decides what to do after a failed attempt.
///
/// Profiles are tried in order within a pass; a pass that exhausts the list
/// starts over from the first profile until `ceiling` passes have been made.
/// `Unsupported` ends the cycle at once.
pub(crate) fn next_step(
    failure: &AttemptFailure,
    cursor: Cursor,
    profile_count: usize,
    ceiling: u32,
) -> Step {
    if let AttemptFailure::Unsupported(_) = failure {
        return Step::Abandon;
    }
    if cursor.profile_index + 1 < profile_count {
        return Step::Try(Cursor {
            profile_index: cursor.profile_index + 1,
            ..cursor
        });
    }
    if cursor.attempt < ceiling {
        return Step::Try(Cursor {
            attempt: cursor.attempt + 1,
            profile_index: 0,
        });
    }
    Step::Abandon
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CandidateFailure {
    pub attempts: u32,
    pub reason: String,
}

/// Runs the full connection cycle for one candidate.
pub(crate) async fn connect_candidate(
    connector: &dyn Connector,
    candidate: &PeerCandidate,
    config: &ManagerConfig,
    events: Option<&EventCallback>,
) -> Result<PeerConnection, CandidateFailure> {
    let profiles = config.profiles.as_slice();
    let address = candidate.address;
    let mut cursor = Cursor::FIRST;

    loop {
        let profile = profiles[cursor.profile_index];
        debug!(%address, attempt = cursor.attempt, %profile, "connecting");

        let failure = match connector.connect(address, profile).await {
            ConnectResult::Connected(transport) => {
                debug!(%address, attempt = cursor.attempt, %profile, "connected");
                return Ok(PeerConnection::from_candidate(candidate, profile, transport));
            }
            ConnectResult::Unsupported(reason) => AttemptFailure::Unsupported(reason),
            ConnectResult::TransientFailure(reason) => AttemptFailure::Transient(reason),
        };
        debug!(%address, attempt = cursor.attempt, %profile, error = %failure, "attempt failed");

        let step = next_step(&failure, cursor, profiles.len(), config.retry_attempts);
        let pass_over = match step {
            Step::Try(next) => next.attempt != cursor.attempt,
            Step::Abandon => true,
        };
        if pass_over {
            emit(
                events,
                StreamEvent::ConnectAttemptFailed {
                    address,
                    attempt: cursor.attempt,
                    profile,
                    reason: failure.to_string(),
                },
            );
        }

        match step {
            Step::Try(next) => {
                if pass_over && !config.retry_delay.is_zero() {
                    tokio::time::sleep(config.retry_delay).await;
                }
                cursor = next;
            }
            Step::Abandon => {
                return Err(CandidateFailure {
                    attempts: cursor.attempt,
                    reason: failure.to_string(),
                })
            }
        }
    }
}
