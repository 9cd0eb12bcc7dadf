//! Transition policy. Decides where a session goes after a reply.

use crate::error::IntakeError;

use super::message::Message;
use super::parser::IntakeStatus;
use super::stage::{StageId, StageRegistry, Successor};

/// Outcome of evaluating one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Keep working on the same stage.
    Stay(StageId),
    /// Move to the next stage of the chain.
    Advance(StageId),
    /// The final stage completed; the chain is done and a summary is due.
    Complete,
    /// Alert or stop: leave the chain and route to the stop stage.
    Halt,
    /// The latest reply requested tools; acknowledge before continuing.
    AwaitToolAck,
    /// Nothing left to respond to; the session ends without a summary.
    Exhausted,
}

impl Transition {
    /// Whether this transition ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Halt | Self::Exhausted)
    }
}

/// Decide the next step for a session on `current`.
///
/// `last` is the newest transcript message and `status` the parsed status
/// of the newest reply, if one has been evaluated. Pending tool calls take
/// precedence over status routing.
pub fn decide(
    registry: &StageRegistry,
    current: StageId,
    last: Option<&Message>,
    status: Option<IntakeStatus>,
) -> Result<Transition, IntakeError> {
    if last.is_some_and(|m| !m.pending_tool_calls().is_empty()) {
        return Ok(Transition::AwaitToolAck);
    }

    let transition = match status {
        Some(IntakeStatus::Alert) => Transition::Halt,
        Some(IntakeStatus::Stop) => Transition::Halt,
        Some(IntakeStatus::Complete) => match registry.successor(current)? {
            Successor::Stage(next) => Transition::Advance(next),
            Successor::Terminal => Transition::Complete,
        },
        Some(IntakeStatus::InProgress) => Transition::Stay(current),
        None => match last {
            Some(message) if message.is_user() => Transition::Stay(current),
            Some(_) => Transition::Exhausted,
            None => Transition::Stay(current),
        },
    };
    Ok(transition)
}
