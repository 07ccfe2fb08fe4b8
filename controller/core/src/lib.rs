// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ikestack control-plane core
//!
//! Accepts IKE_SA/CHILD_SA lifecycle requests (initiate, terminate, route,
//! unroute) from control front-ends, turns each into a job for the keying
//! engine, and reports the outcome by correlating the signals that job
//! produces on the event bus.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Entry point:** [`application::controller::StandardController`]

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
