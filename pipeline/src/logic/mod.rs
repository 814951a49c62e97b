//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod context;
pub mod controller;
pub mod events;
mod fsm;
pub mod intent;
pub mod link_states;
pub mod replay;
pub mod session_states;
pub(crate) mod telemetry;
