//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod config;
pub mod logic;
pub mod pose;
pub mod recording;
pub mod traits;
