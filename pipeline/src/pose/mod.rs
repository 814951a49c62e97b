//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod angles;
pub mod ingest;
pub mod landmarks;
pub mod normalize;
