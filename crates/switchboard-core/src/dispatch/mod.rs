//! Dispatch layer - one inbound event, end to end.
//!
//! - [`DispatchController`]: authenticates, parses, locks, loads, handles,
//!   persists and responds
//! - [`BotEngine`] and [`BotLogic`]: the HANDLED step
//! - [`ConnectorCallback`]: the per-dispatch response sink

pub mod callback;
pub mod controller;
pub mod engine;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::{
    ActionWithDelay, BoxedCallback, ConnectorCallback, FlushStatus, Responder, ResponseBuffer,
    ResponseReceiver,
};
pub use controller::{DispatchController, DispatchOutcome, DispatchSettings, DispatchStage};
pub use engine::{BotEngine, BotLogic, BoxedBotLogic, Completion, Turn};
