//! Conversation turn state machine.
//!
//! ```text
//!  Idle ─▶ Listening ─▶ Recognizing ─▶ Composing ─▶ Synthesizing ─▶ Speaking
//!            ▲                                                         │
//!            └─────────────────────────────────────────────────────────┘
//!
//!  any state but Idle/Stopping ─▶ Stopping ─▶ Idle
//! ```
//!
//! [`TurnMachine::transition`] is the only way the state changes.

use crate::error::{AgentError, AgentResult};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    Listening,
    Recognizing,
    Composing,
    Synthesizing,
    Speaking,
    Stopping,
}

impl TurnState {
    pub const ALL: [TurnState; 7] = [
        TurnState::Idle,
        TurnState::Listening,
        TurnState::Recognizing,
        TurnState::Composing,
        TurnState::Synthesizing,
        TurnState::Speaking,
        TurnState::Stopping,
    ];

    /// Whether `self -> to` is a legal edge.
    pub fn can_transition(self, to: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, to),
            (Idle, Listening)
                | (Listening, Recognizing)
                | (Recognizing, Composing)
                | (Composing, Synthesizing)
                | (Synthesizing, Speaking)
                | (Speaking, Listening)
                | (Stopping, Idle)
        ) || (to == Stopping && self.is_active())
    }

    /// Part of a run and not yet winding down.
    pub fn is_active(self) -> bool {
        !matches!(self, TurnState::Idle | TurnState::Stopping)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Recognizing => "recognizing",
            TurnState::Composing => "composing",
            TurnState::Synthesizing => "synthesizing",
            TurnState::Speaking => "speaking",
            TurnState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Holds the current [`TurnState`] and rejects illegal edges.
#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
}

impl TurnMachine {
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transition(&mut self, to: TurnState) -> AgentResult<TurnState> {
        let from = self.state;
        if !from.can_transition(to) {
            return Err(AgentError::InvalidTransition { from, to });
        }
        debug!("🔁 Turn {} -> {}", from, to);
        self.state = to;
        Ok(from)
    }

    /// Walk to Idle through Stopping from wherever the machine is.
    pub fn wind_down(&mut self) -> AgentResult<()> {
        if self.state.is_active() {
            self.transition(TurnState::Stopping)?;
        }
        if self.state == TurnState::Stopping {
            self.transition(TurnState::Idle)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force(&mut self, state: TurnState) {
        self.state = state;
    }
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new()
    }
}
