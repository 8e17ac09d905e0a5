// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Pipeline dependency primitives.
//!
//! Responsibilities:
//! - Defines readiness dependencies used to park and wake operators.
//! - Provides the counted finish dependency used to wait for runtime-filter size merges.
//!
//! Key exported interfaces:
//! - Types: `Dependency`, `DependencyHandle`, `CountedFinishDependency`.
//!
//! Current limitations:
//! - Waiters are plain callbacks run on the thread that flips readiness.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::joinrf_logging::debug;

static NEXT_DEP_ID: AtomicUsize = AtomicUsize::new(1);

/// Callback invoked once a dependency becomes ready.
pub type Observer = Box<dyn FnOnce() + Send>;

/// Reference-counted handle to one pipeline dependency object.
pub type DependencyHandle = Arc<Dependency>;

/// Dependency primitive used to model blocked/unblocked execution conditions.
pub struct Dependency {
    id: usize,
    name: String,
    ready: AtomicBool,
    observers: Mutex<Vec<Observer>>,
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            ready: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self) {
        let prev = self.ready.swap(true, Ordering::AcqRel);
        if prev {
            return;
        }
        let observers = {
            let mut guard = self.observers.lock().expect("dependency observers lock");
            std::mem::take(&mut *guard)
        };
        debug!(
            "Dependency ready: dep_id={} name={} observers={}",
            self.id,
            self.name,
            observers.len()
        );
        for observer in observers {
            observer();
        }
    }

    pub fn set_blocked(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Run `observer` once the dependency is ready, immediately if it already is.
    pub fn add_waiter(&self, observer: Observer) {
        if self.is_ready() {
            observer();
            return;
        }
        let mut guard = self.observers.lock().expect("dependency observers lock");
        // Re-check under the lock: set_ready drains observers while holding it.
        if self.is_ready() {
            drop(guard);
            observer();
            return;
        }
        guard.push(observer);
    }
}

/// Dependency that becomes ready once every registered contribution has been withdrawn.
///
/// Each contributor calls `add` once before starting its work and `sub` exactly once when it
/// is done. The count starts at zero and the dependency starts ready, so a build instance with
/// no contributors never blocks.
pub struct CountedFinishDependency {
    inner: Dependency,
    outstanding: Mutex<usize>,
}

impl fmt::Debug for CountedFinishDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountedFinishDependency")
            .field("name", &self.inner.name())
            .field("outstanding", &self.outstanding())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl CountedFinishDependency {
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Dependency::new(name);
        inner.ready.store(true, Ordering::Release);
        Self {
            inner,
            outstanding: Mutex::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn add(&self) {
        let mut guard = self.outstanding.lock().expect("counted dependency lock");
        *guard += 1;
        if *guard == 1 {
            self.inner.set_blocked();
        }
    }

    pub fn sub(&self) -> Result<(), String> {
        let reached_zero = {
            let mut guard = self.outstanding.lock().expect("counted dependency lock");
            if *guard == 0 {
                return Err(format!(
                    "counted dependency {} released more times than registered",
                    self.inner.name()
                ));
            }
            *guard -= 1;
            *guard == 0
        };
        if reached_zero {
            self.inner.set_ready();
        }
        Ok(())
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock().expect("counted dependency lock")
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    pub fn add_waiter(&self, observer: Observer) {
        self.inner.add_waiter(observer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{CountedFinishDependency, Dependency};

    #[test]
    fn test_dependency_wakes_waiters_once() {
        let dep = Dependency::new("join_build:1");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        dep.add_waiter(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        dep.set_ready();
        dep.set_ready();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let h = Arc::clone(&hits);
        dep.add_waiter(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_counted_dependency_ready_after_all_subs() {
        let dep = CountedFinishDependency::new("rf_size_sync:1");
        assert!(dep.is_ready());
        dep.add();
        dep.add();
        assert!(!dep.is_ready());
        dep.sub().unwrap();
        assert!(!dep.is_ready());
        assert_eq!(dep.outstanding(), 1);
        dep.sub().unwrap();
        assert!(dep.is_ready());
    }

    #[test]
    fn test_counted_dependency_rejects_extra_sub() {
        let dep = CountedFinishDependency::new("rf_size_sync:2");
        dep.add();
        dep.sub().unwrap();
        let err = dep.sub().unwrap_err();
        assert!(err.contains("released more times"));
    }
}
