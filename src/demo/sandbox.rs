// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::helpers::colorbox;

/// An in-memory stand-in for a filesystem, segregated by color.
///
/// Every test-group color sees its own private tree; uncolored execution
/// uses the shared one. This is exactly the kind of environment-dependent
/// resource the segregator steers: the sandbox reads the current color from
/// the task-scoped slot on every call.
#[derive(Clone, Debug, Default)]
pub struct Sandbox {
    trees: Arc<Mutex<HashMap<Option<String>, Tree>>>,
}

#[derive(Debug, Default)]
struct Tree {
    directories: HashSet<String>,
    files: HashMap<String, String>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tree<T>(&self, action: impl FnOnce(&mut Tree) -> T) -> T {
        let mut trees = self.trees.lock().unwrap();
        action(trees.entry(colorbox::current()).or_default())
    }

    /// Whether the path exists (as a directory or a file).
    pub fn check(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        self.with_tree(|tree| {
            tree.directories.contains(path) || tree.files.contains_key(path)
        })
    }

    /// Create the directory (parents included).
    pub fn ensure(&self, path: &str) {
        self.with_tree(|tree| {
            let mut cursor = String::new();
            for segment in path.split('/') {
                if !cursor.is_empty() {
                    cursor.push('/');
                }
                cursor.push_str(segment);
                tree.directories.insert(cursor.clone());
            }
        });
    }

    /// Write the file.
    pub fn create(&self, path: &str, data: &str) {
        self.with_tree(|tree| {
            tree.files.insert(path.to_string(), data.to_string());
        });
    }

    /// Read the file back.
    pub fn read(&self, path: &str) -> Option<String> {
        self.with_tree(|tree| tree.files.get(path).cloned())
    }
}

/// The directory part of a path (empty for top-level entries).
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(position) => &path[..position],
        None => "",
    }
}
