// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod controller;
pub mod correlation;
pub mod dispatcher;
pub mod interface;

// Re-export the facade for convenience
pub use controller::{Controller, StandardController};
pub use correlation::{callback_fn, ControllerError, Correlator, SignalCallback};
pub use interface::{ControlInterface, InterfaceError, InterfaceManager};
