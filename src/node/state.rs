use serde::{Deserialize, Serialize};
use std::fmt;

/// Last observed state of a node's task. Declaration order is the lifecycle
/// order used by [`CurrentState::has_reservation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentState {
    Unknown,
    Reserved,
    Starting,
    Started,
    ShuttingDown,
    Shutdown,
    Failed,
}

impl CurrentState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Reserved => "reserved",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::ShuttingDown => "shutting_down",
            Self::Shutdown => "shutdown",
            Self::Failed => "failed",
        }
    }

    /// A task exists, or may exist, for the node.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::ShuttingDown)
    }

    /// The node was launched at least once; reservation-only states are excluded.
    #[must_use]
    pub const fn is_launched(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Reserved)
    }

    #[must_use]
    pub fn has_reservation(&self) -> bool {
        *self >= Self::Reserved
    }

    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        if matches!(next, Self::Unknown) {
            return true;
        }
        match self {
            Self::Unknown => matches!(next, Self::Reserved | Self::Starting),
            Self::Reserved => matches!(next, Self::Reserved | Self::Starting),
            Self::Starting => matches!(
                next,
                Self::Starting | Self::Started | Self::Failed | Self::Shutdown | Self::ShuttingDown
            ),
            Self::Started => matches!(
                next,
                Self::Started | Self::Failed | Self::ShuttingDown | Self::Shutdown
            ),
            Self::ShuttingDown => matches!(
                next,
                Self::ShuttingDown | Self::Started | Self::Shutdown | Self::Failed
            ),
            Self::Shutdown => matches!(next, Self::Shutdown | Self::Starting),
            Self::Failed => matches!(next, Self::Failed | Self::Starting),
        }
    }
}

impl TryFrom<&str> for CurrentState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "reserved" => Ok(Self::Reserved),
            "starting" => Ok(Self::Starting),
            "started" => Ok(Self::Started),
            "shutting_down" => Ok(Self::ShuttingDown),
            "shutdown" => Ok(Self::Shutdown),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown node state: {s}")),
        }
    }
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator intent for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationState {
    Started,
    Restarting,
    Shutdown,
}

impl DestinationState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Restarting => "restarting",
            Self::Shutdown => "shutdown",
        }
    }

    #[must_use]
    pub const fn wants_running(&self) -> bool {
        matches!(self, Self::Started | Self::Restarting)
    }
}

impl TryFrom<&str> for DestinationState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "started" => Ok(Self::Started),
            "restarting" => Ok(Self::Restarting),
            "shutdown" => Ok(Self::Shutdown),
            _ => Err(format!("Unknown destination state: {s}")),
        }
    }
}

impl fmt::Display for DestinationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
