//! Lifecycle states of a single article fetch
//!
//! A task is created once its URL holds a slot, starts in `Pending`, and
//! moves from `InFlight` to one terminal state or back through `Retrying`.
use std::fmt;

/// Represents the current state of a fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// Slot acquired; no request issued yet
    Pending,

    /// A request is outstanding under its own timeout
    InFlight,

    /// Last attempt failed transiently; the task still holds its slot
    Retrying,

    // ===== Terminal States =====
    /// Body was fetched successfully
    Succeeded,

    /// Server answered with a status >= 400
    Fatal,

    /// Transient failures used up every allowed attempt
    Exhausted,
}

impl TaskState {
    /// Returns true if this is a terminal state (the slot is released)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Fatal | Self::Exhausted)
    }

    /// Whether `self -> next` is a legal move
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Succeeded)
                | (Self::InFlight, Self::Fatal)
                | (Self::InFlight, Self::Retrying)
                | (Self::InFlight, Self::Exhausted)
                | (Self::Retrying, Self::InFlight)
        )
    }

    /// Moves to `next`, or reports the illegal transition
    pub fn transition(&mut self, next: TaskState) -> crate::Result<()> {
        if !self.can_transition_to(next) {
            return Err(crate::SyncError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Fatal => "fatal",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
