//! Network reachability transitions.

use std::fmt;

/// Network reachability as reported by the platform or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachable => write!(f, "reachable"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// What a reachability change asks of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityAction {
    /// Network came back after an outage: reconnect if a socket is wanted.
    Reconnect,
    /// Network went away: drop the socket.
    Disconnect,
    None,
}

/// Turns raw reachability reports into connection actions.
///
/// Only transitions matter. `Reachable` right after `Unreachable` asks for a
/// reconnect; `Reachable` with no outage before it (including the very first
/// report) does nothing, so reachability never opens the initial socket.
#[derive(Debug, Default)]
pub struct ReachabilityTracker {
    previous: Option<Reachability>,
}

impl ReachabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported status.
    pub fn current(&self) -> Option<Reachability> {
        self.previous
    }

    pub fn observe(&mut self, status: Reachability) -> ReachabilityAction {
        let previous = self.previous.replace(status);
        match (previous, status) {
            (Some(Reachability::Unreachable), Reachability::Unreachable) => {
                ReachabilityAction::None
            }
            (_, Reachability::Unreachable) => ReachabilityAction::Disconnect,
            (Some(Reachability::Unreachable), Reachability::Reachable) => {
                ReachabilityAction::Reconnect
            }
            (_, Reachability::Reachable) => ReachabilityAction::None,
        }
    }
}
