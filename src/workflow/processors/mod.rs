// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The processor pipeline.
//!
//! Preprocessors (before tag filtering): [`TaskFreezer`],
//! [`WorkflowNormalizer`]. Then [`TagFilter`]. Postprocessors:
//! [`TargetCacher`], [`WorkflowTrimmer`], [`TargetPostChecker`],
//! [`TargetLocker`], [`TaskRanker`]. At authoring time the
//! [`WorkflowTestifier`] and [`TaskSegregator`] replace the workflow with
//! its auto-testing projection.

mod normalizer;
mod tag_filter;
mod target_cacher;
mod target_checker;
mod target_locker;
mod task_freezer;
mod task_ranker;
mod task_segregator;
mod testifier;
mod trimmer;

pub use normalizer::{TargetOverridingTaskWrapper, WorkflowNormalizer};
pub use tag_filter::TagFilter;
pub use target_cacher::TargetCacher;
pub use target_checker::{TargetChecker, TargetPostChecker, TargetPreChecker};
pub use target_locker::TargetLocker;
pub use task_freezer::TaskFreezer;
pub use task_ranker::TaskRanker;
pub use task_segregator::TaskSegregator;
pub use testifier::WorkflowTestifier;
pub use trimmer::WorkflowTrimmer;
