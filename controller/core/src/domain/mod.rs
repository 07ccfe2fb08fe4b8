// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Identifiers, aggregates, signals and the contracts of the collaborators
//! this core drives (job processor, keying engine).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types shared by infrastructure and application layers

pub mod action;
pub mod controller_config;
pub mod ike_sa;
pub mod job;
pub mod keying;
pub mod peer_config;
pub mod signal;
