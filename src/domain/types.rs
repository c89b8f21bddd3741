//! Shared types for the correlation gateway

use serde::{Deserialize, Serialize};

/// Newtype wrapper for zone IDs (one camera / one physical lane)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ZoneId(pub u32);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for task-path IDs
///
/// A path is a named detection region, globally unique across the system
/// (e.g. "10000452"). Whether it is a start or an end path is determined by
/// zone configuration, not by the ID itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PathId(pub String);

impl PathId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PathId {
    fn from(s: &str) -> Self {
        PathId(s.to_string())
    }
}

/// A candidate correlation hypothesis: cargo at `start` is moving toward `end`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub zone: ZoneId,
    pub start: PathId,
    pub end: PathId,
}

impl PairKey {
    pub fn new(zone: ZoneId, start: PathId, end: PathId) -> Self {
        Self { zone, start, end }
    }

    /// Comma-joined "start,end" form used in the order API payload
    pub fn task_path(&self) -> String {
        format!("{},{}", self.start, self.end)
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "z{}:{}->{}", self.zone, self.start, self.end)
    }
}

/// Why a pair's path claims were released
///
/// Observability only - the release itself behaves identically for every
/// reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Start went clear or end went occupied before confirmation
    InvalidState,
    /// Sent pair outlived the sent-timeout without end confirmation
    Timeout,
    /// Timing pair exceeded the stuck-timer safety bound
    Stuck,
    /// Dispatch exhausted its retries; pair re-enters selection
    DispatchFailed,
    /// End path confirmed occupied after dispatch
    Completed,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &str {
        match self {
            ReleaseReason::InvalidState => "invalid_state",
            ReleaseReason::Timeout => "timeout",
            ReleaseReason::Stuck => "stuck",
            ReleaseReason::DispatchFailed => "dispatch_failed",
            ReleaseReason::Completed => "completed",
        }
    }
}
