// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The demo daemon: a small but complete workflow wired through every layer
//! of the engine.
//!
//! The demo "downloads" a file into a color-segregated in-memory sandbox,
//! hashes its lines, picks first letters on a separate tag, and aggregates
//! the results under a per-day root task. It exists to exercise the real
//! pipeline — building, normalization, trimming, caching, locking,
//! auto-testing, monitoring — without touching the actual filesystem.

mod sandbox;
mod settings;
mod tasks;

pub use sandbox::Sandbox;
pub use settings::Settings;
pub use tasks::{
    CreateDirectory, DownloadFile, HashEachLine, PathExists, PickFirstLetters,
    PublishDailyReport,
};
