// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod basic;
mod managed;
mod monitoring;

pub use basic::BasicExecutor;
pub use managed::ManagedExecutor;
pub use monitoring::MonitoringExecutor;
