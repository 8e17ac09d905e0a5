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
//! Shared hash-table context for sibling join build instances.
//!
//! Responsibilities:
//! - Elects the one build instance that actually builds when siblings reuse the same hash table.
//! - Hands the builder's runtime filter state to siblings and wakes them once it is complete.
//!
//! Key exported interfaces:
//! - Types: `SharedHashTableContext`, `SharedHashTableController`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::common::ids::FilterId;
use crate::common::logging::debug;
use crate::exec::pipeline::dependency::{Dependency, DependencyHandle};
use crate::exec::runtime_filter::RuntimeFilterContextPtr;

#[derive(Debug, Default)]
pub struct SharedHashTableContext {
    pub runtime_filters: HashMap<FilterId, RuntimeFilterContextPtr>,
    pub build_row_count: u64,
    pub signaled: bool,
}

/// Shared context of one join node, written once by the builder and read by siblings.
#[derive(Debug)]
pub struct SharedHashTableController {
    node_id: i32,
    builder: Mutex<Option<usize>>,
    context: Mutex<SharedHashTableContext>,
    dep: DependencyHandle,
}

impl SharedHashTableController {
    pub fn new(node_id: i32) -> Self {
        Self {
            node_id,
            builder: Mutex::new(None),
            context: Mutex::new(SharedHashTableContext::default()),
            dep: Arc::new(Dependency::new(format!("shared_hash_table:{}", node_id))),
        }
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    /// The first instance to ask becomes the builder; later callers are readers.
    pub fn should_build(&self, instance_id: usize) -> bool {
        let mut guard = self.builder.lock().expect("shared hash table builder lock");
        match *guard {
            Some(builder) => builder == instance_id,
            None => {
                *guard = Some(instance_id);
                debug!(
                    "shared hash table {} builder elected: instance={}",
                    self.node_id, instance_id
                );
                true
            }
        }
    }

    pub fn dep(&self) -> DependencyHandle {
        Arc::clone(&self.dep)
    }

    pub fn is_signaled(&self) -> bool {
        self.dep.is_ready()
    }

    /// Fill the shared context under its lock, then wake every reader.
    pub fn publish_with<F>(&self, fill: F) -> Result<(), String>
    where
        F: FnOnce(&mut SharedHashTableContext) -> Result<(), String>,
    {
        {
            let mut guard = self.context.lock().expect("shared hash table context lock");
            if guard.signaled {
                return Err(format!(
                    "shared hash table {} already signaled",
                    self.node_id
                ));
            }
            fill(&mut guard)?;
            guard.signaled = true;
        }
        self.dep.set_ready();
        Ok(())
    }

    /// Read the context once the builder signaled.
    pub fn read_with<F, T>(&self, read: F) -> Result<T, String>
    where
        F: FnOnce(&SharedHashTableContext) -> Result<T, String>,
    {
        let guard = self.context.lock().expect("shared hash table context lock");
        if !guard.signaled {
            return Err(format!(
                "shared hash table {} read before the builder signaled",
                self.node_id
            ));
        }
        read(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::SharedHashTableController;

    #[test]
    fn test_first_caller_builds() {
        let controller = SharedHashTableController::new(3);
        assert!(controller.should_build(1));
        assert!(!controller.should_build(0));
        assert!(controller.should_build(1));
    }

    #[test]
    fn test_signal_once_then_read() {
        let controller = SharedHashTableController::new(4);
        assert!(controller.read_with(|_| Ok(())).is_err());
        controller
            .publish_with(|ctx| {
                ctx.build_row_count = 12;
                Ok(())
            })
            .unwrap();
        assert!(controller.is_signaled());
        let rows = controller.read_with(|ctx| Ok(ctx.build_row_count)).unwrap();
        assert_eq!(rows, 12);

        let err = controller.publish_with(|_| Ok(())).unwrap_err();
        assert!(err.contains("already signaled"));
    }
}
