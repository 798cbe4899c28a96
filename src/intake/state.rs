//! Session state machine — tracks which step a submitter is in.

use serde::{Deserialize, Serialize};

/// The steps of the intake conversation.
///
/// Progresses linearly: AwaitingName → AwaitingPhone → AwaitingFile → Closed.
/// A session that reaches `Closed` is removed from the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingName,
    AwaitingPhone,
    AwaitingFile,
    Closed,
}

impl SessionState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (AwaitingName, AwaitingPhone) | (AwaitingPhone, AwaitingFile) | (AwaitingFile, Closed)
        )
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Get the next state in the linear progression, if any.
    pub fn next(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            AwaitingName => Some(AwaitingPhone),
            AwaitingPhone => Some(AwaitingFile),
            AwaitingFile => Some(Closed),
            Closed => None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::AwaitingName
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingPhone => "awaiting_phone",
            Self::AwaitingFile => "awaiting_file",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Per-submitter conversation progress, held in memory only.
///
/// Fields fill in monotonically: `phone` is only set once `name` is, and a
/// session only reaches `AwaitingFile` with both present. The setters are the
/// only way to advance, so a session cannot skip a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    state: SessionState,
    name: Option<String>,
    phone: Option<String>,
}

impl Session {
    /// Fresh session waiting for a name.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Record the name and move to `AwaitingPhone`.
    pub fn record_name(&mut self, name: impl Into<String>) -> Result<SessionState, String> {
        self.advance_from(SessionState::AwaitingName)?;
        self.name = Some(name.into());
        Ok(self.state)
    }

    /// Record the phone and move to `AwaitingFile`.
    pub fn record_phone(&mut self, phone: impl Into<String>) -> Result<SessionState, String> {
        self.advance_from(SessionState::AwaitingPhone)?;
        self.phone = Some(phone.into());
        Ok(self.state)
    }

    /// Mark the file step done.
    pub fn close(&mut self) -> Result<SessionState, String> {
        self.advance_from(SessionState::AwaitingFile)?;
        Ok(self.state)
    }

    fn advance_from(&mut self, expected: SessionState) -> Result<(), String> {
        if self.state != expected {
            return Err(format!("Expected {expected}, session is {}", self.state));
        }
        let next = self
            .state
            .next()
            .ok_or_else(|| "Already at terminal state".to_string())?;
        if !self.state.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.state, next));
        }
        self.state = next;
        Ok(())
    }
}
