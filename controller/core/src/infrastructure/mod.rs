// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod ike_sa_manager;
pub mod logging;
pub mod processor;
