// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Small shared utilities: hashing, timestamps, flags, value boxes, and the
//! color slot used for environment segregation.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

/// Compute the hexadecimal SHA-1 digest of a string.
///
/// Used for task aliases, cache keys, lock-file names, and test-group colors.
pub fn sha1_hex(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// Current time in the UTC time zone.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a list of values as a multi-line string suitable for log messages
/// and error descriptions.
pub fn render<I>(values: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    values
        .into_iter()
        .map(|value| format!("\n * {value}"))
        .collect()
}

/// A shared boolean that can be raised and lowered by several owners.
///
/// Flags start lowered. Cloning shares the underlying state.
#[derive(Clone, Debug, Default)]
pub struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn up(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn down(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A primitive container that stores at most one value.
///
/// Boxes start empty. Cloning shares the underlying slot.
#[derive(Clone, Debug, Default)]
pub struct SimpleBox<T>(Arc<Mutex<Option<T>>>);

impl<T: Clone> SimpleBox<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    /// Put a value into the box, replacing whatever was there.
    pub fn put(&self, value: Option<T>) {
        *self.0.lock().unwrap() = value;
    }

    /// Get a copy of the stored value, if any.
    pub fn get(&self) -> Option<T> {
        self.0.lock().unwrap().clone()
    }
}

/// A single-producer-multiple-consumers box for handing the latest workflow
/// from the builder to the executors.
///
/// The box holds the latest value: writers overwrite, readers peek
/// non-destructively. Capacity is one, latest wins.
#[derive(Clone, Debug, Default)]
pub struct SharedBox<T>(Arc<RwLock<Option<T>>>);

impl<T: Clone> SharedBox<T> {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(None)))
    }

    /// Overwrite the stored value.
    pub fn put(&self, value: T) {
        *self.0.write().unwrap() = Some(value);
    }

    /// Peek at the latest value without consuming it.
    pub fn peek(&self) -> Option<T> {
        self.0.read().unwrap().clone()
    }
}

/// The task-scoped color slot.
///
/// The segregator stores the color of the executing task here; resources that
/// depend on the environment (per-color filesystem roots, connection pools)
/// read it back through [`colorbox::current`]. The slot is scoped to the
/// executing task, so concurrently running tasks of different colors never
/// observe each other's value.
pub mod colorbox {
    use super::*;

    tokio::task_local! {
        static COLOR: Option<String>;
    }

    /// Run the future with the given color stored in the slot.
    pub async fn scope<F: Future>(color: Option<String>, future: F) -> F::Output {
        COLOR.scope(color, future).await
    }

    /// The color of the currently executing task, if any.
    pub fn current() -> Option<String> {
        COLOR.try_with(|color| color.clone()).unwrap_or(None)
    }
}
