//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
mod ledger;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{BackendRequest, Event, PollSource, SessionSnapshot};
pub use ledger::AmbiguityLedger;
pub use state::{ConvContext, ConvState, Outcome, ProcessingProgress};
pub use transition::{transition, TransitionError, TransitionResult};
