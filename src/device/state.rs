// src/device/state.rs
//! Presentation device lifecycle as an explicit transition table.
//!
//! ```text
//! Uninitialized --Created-------> Ready
//! Ready/Lost    --LossDetected--> Lost
//! Ready/Lost    --ResetSucceeded> Ready
//! Ready/Lost    --ResetFailed---> Failed
//! Ready/Lost    --Faulted-------> Failed
//! Lost/Failed   --CreateFailed--> Failed
//! any           --Created-------> Ready
//! any           --Destroyed-----> Uninitialized
//! ```
//!
//! `Failed` only leaves through `Created` (an external re-init) or `Destroyed`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Ready,
    Lost,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Created,
    CreateFailed,
    LossDetected,
    /// The cooperative-level probe reported an unrecoverable driver error.
    Faulted,
    ResetSucceeded,
    ResetFailed,
    Destroyed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid device transition: {event:?} in state {from:?}")]
pub struct InvalidTransition {
    pub from: DeviceState,
    pub event: DeviceEvent,
}

impl DeviceState {
    pub fn transition(self, event: DeviceEvent) -> Result<DeviceState, InvalidTransition> {
        use DeviceEvent::*;
        use DeviceState::*;

        let next = match (self, event) {
            (_, Destroyed) => Uninitialized,

            (_, Created) => Ready,
            (Uninitialized, CreateFailed) => Uninitialized,
            (Lost | Failed, CreateFailed) => Failed,

            (Ready | Lost, LossDetected) => Lost,
            (Ready | Lost, Faulted) => Failed,

            (Ready | Lost, ResetSucceeded) => Ready,
            (Ready | Lost, ResetFailed) => Failed,

            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub fn is_ready(self) -> bool {
        self == DeviceState::Ready
    }
}
