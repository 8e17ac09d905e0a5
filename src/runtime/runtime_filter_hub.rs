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
//! Execution-state registry for runtime filters.
//!
//! Responsibilities:
//! - Merges partial build sizes reported by every build instance of a filter.
//! - Receives published filters: local ones for probe consumers in this fragment, global ones
//!   merged across build instances before they are exposed.
//!
//! Key exported interfaces:
//! - Types: `RuntimeFilterHub`, `SizeSyncCallback`.
//!
//! Current limitations:
//! - Remote targets are served from the same process; no network transport is involved.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::common::ids::FilterId;
use crate::common::logging::{debug, warn};
use crate::exec::runtime_filter::{PublishedFilterState, PublishedRuntimeFilter, RuntimeFilterValues};

/// Invoked once with the merged build size after every instance reported.
pub type SizeSyncCallback = Box<dyn FnOnce(u64) + Send>;

#[derive(Default)]
struct SizeSyncEntry {
    reported: usize,
    total: u64,
    waiters: Vec<SizeSyncCallback>,
    synced: Option<u64>,
}

#[derive(Default)]
struct MergeEntry {
    received: usize,
    merged: Option<PublishedRuntimeFilter>,
}

pub struct RuntimeFilterHub {
    max_in_num: u64,
    expected_instances: Mutex<HashMap<FilterId, usize>>,
    size_syncs: Mutex<HashMap<FilterId, SizeSyncEntry>>,
    local_filters: RwLock<HashMap<FilterId, Vec<Arc<PublishedRuntimeFilter>>>>,
    merging: Mutex<HashMap<FilterId, MergeEntry>>,
    global_filters: RwLock<HashMap<FilterId, Arc<PublishedRuntimeFilter>>>,
}

impl fmt::Debug for RuntimeFilterHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeFilterHub")
            .field("max_in_num", &self.max_in_num)
            .finish_non_exhaustive()
    }
}

impl RuntimeFilterHub {
    pub fn new(max_in_num: u64) -> Self {
        Self {
            max_in_num,
            expected_instances: Mutex::new(HashMap::new()),
            size_syncs: Mutex::new(HashMap::new()),
            local_filters: RwLock::new(HashMap::new()),
            merging: Mutex::new(HashMap::new()),
            global_filters: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_in_num(&self) -> u64 {
        self.max_in_num
    }

    /// Declare how many build instances contribute to `filter_id`. Unregistered ids expect one.
    pub fn register_producer(&self, filter_id: FilterId, expected_instances: usize) {
        let expected_instances = expected_instances.max(1);
        self.expected_instances
            .lock()
            .expect("runtime filter hub lock")
            .insert(filter_id, expected_instances);
        debug!(
            "runtime filter hub register producer: filter_id={}, instances={}",
            filter_id, expected_instances
        );
    }

    fn expected(&self, filter_id: FilterId) -> usize {
        self.expected_instances
            .lock()
            .expect("runtime filter hub lock")
            .get(&filter_id)
            .copied()
            .unwrap_or(1)
    }

    /// Record one instance's local size. When the last instance reports, every waiting callback
    /// runs with the total on the caller's thread.
    pub fn report_local_size(
        &self,
        filter_id: FilterId,
        local_size: u64,
        on_synced: SizeSyncCallback,
    ) -> Result<(), String> {
        let expected = self.expected(filter_id);
        let (total, waiters) = {
            let mut guard = self.size_syncs.lock().expect("runtime filter hub lock");
            let entry = guard.entry(filter_id).or_default();
            if entry.reported >= expected {
                return Err(format!(
                    "runtime filter {} size reported {} times, expected {}",
                    filter_id,
                    entry.reported + 1,
                    expected
                ));
            }
            entry.reported += 1;
            entry.total += local_size;
            entry.waiters.push(on_synced);
            if entry.reported < expected {
                debug!(
                    "runtime filter {} size partial: reported={}/{}, total={}",
                    filter_id, entry.reported, expected, entry.total
                );
                return Ok(());
            }
            entry.synced = Some(entry.total);
            (entry.total, std::mem::take(&mut entry.waiters))
        };
        debug!(
            "runtime filter {} size synced: total={}, waiters={}",
            filter_id,
            total,
            waiters.len()
        );
        for waiter in waiters {
            waiter(total);
        }
        Ok(())
    }

    pub fn synced_size(&self, filter_id: FilterId) -> Option<u64> {
        self.size_syncs
            .lock()
            .expect("runtime filter hub lock")
            .get(&filter_id)
            .and_then(|entry| entry.synced)
    }

    pub fn publish(
        &self,
        published: PublishedRuntimeFilter,
        publish_local: bool,
        has_remote_targets: bool,
    ) -> Result<(), String> {
        let filter_id = published.filter_id;
        if !publish_local && has_remote_targets {
            self.merge_global(published.clone())?;
        }
        self.local_filters
            .write()
            .expect("runtime filter hub lock")
            .entry(filter_id)
            .or_default()
            .push(Arc::new(published));
        Ok(())
    }

    fn merge_global(&self, partial: PublishedRuntimeFilter) -> Result<(), String> {
        let filter_id = partial.filter_id;
        let expected = self.expected(filter_id);
        let merged = {
            let mut guard = self.merging.lock().expect("runtime filter hub lock");
            let entry = guard.entry(filter_id).or_default();
            if entry.received >= expected {
                return Err(format!(
                    "runtime filter {} published by {} instances, expected {}",
                    filter_id,
                    entry.received + 1,
                    expected
                ));
            }
            entry.received += 1;
            let merged = match entry.merged.take() {
                None => partial,
                Some(mut acc) => {
                    acc.state = merge_state(filter_id, acc.state, partial.state)?;
                    acc.null_aware |= partial.null_aware;
                    acc
                }
            };
            let merged = self.degrade_oversized(merged);
            if entry.received < expected {
                entry.merged = Some(merged);
                return Ok(());
            }
            merged
        };
        debug!(
            "runtime filter {} global merge complete: instances={}",
            filter_id, expected
        );
        self.global_filters
            .write()
            .expect("runtime filter hub lock")
            .insert(filter_id, Arc::new(merged));
        Ok(())
    }

    fn degrade_oversized(&self, mut filter: PublishedRuntimeFilter) -> PublishedRuntimeFilter {
        if let PublishedFilterState::Ready(RuntimeFilterValues::In(values)) = &filter.state
            && values.len() as u64 > self.max_in_num
        {
            warn!(
                "runtime filter {} merged IN set has {} values (max {}), ignore it",
                filter.filter_id,
                values.len(),
                self.max_in_num
            );
            filter.state = PublishedFilterState::Ignored;
        }
        filter
    }

    /// Every local publication of `filter_id`, in publish order.
    pub fn local_filters(&self, filter_id: FilterId) -> Vec<Arc<PublishedRuntimeFilter>> {
        self.local_filters
            .read()
            .expect("runtime filter hub lock")
            .get(&filter_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Filter merged from every build instance, once all of them published.
    pub fn global_filter(&self, filter_id: FilterId) -> Option<Arc<PublishedRuntimeFilter>> {
        self.global_filters
            .read()
            .expect("runtime filter hub lock")
            .get(&filter_id)
            .cloned()
    }
}

fn merge_state(
    filter_id: FilterId,
    acc: PublishedFilterState,
    partial: PublishedFilterState,
) -> Result<PublishedFilterState, String> {
    let merged = match (acc, partial) {
        (PublishedFilterState::Ignored, _) | (_, PublishedFilterState::Ignored) => {
            PublishedFilterState::Ignored
        }
        (PublishedFilterState::Disabled, _) | (_, PublishedFilterState::Disabled) => {
            PublishedFilterState::Disabled
        }
        (PublishedFilterState::Ready(mut lhs), PublishedFilterState::Ready(rhs)) => {
            lhs.merge_from(&rhs)
                .map_err(|e| format!("runtime filter {}: {}", filter_id, e))?;
            PublishedFilterState::Ready(lhs)
        }
    };
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use arrow::array::{ArrayRef, Int64Array};

    use super::RuntimeFilterHub;
    use crate::common::ids::FilterId;
    use crate::exec::runtime_filter::key_column::{KeyColumnView, KeyDomain, KeyValue};
    use crate::exec::runtime_filter::{
        PublishedFilterState, PublishedRuntimeFilter, RuntimeFilterType, RuntimeFilterValues,
    };

    fn in_filter(id: i32, keys: Vec<i64>) -> PublishedRuntimeFilter {
        let mut values =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::InFilter, KeyDomain::Int);
        let array = Arc::new(Int64Array::from(keys)) as ArrayRef;
        values
            .insert_view(&KeyColumnView::try_new(&array).unwrap())
            .unwrap();
        PublishedRuntimeFilter::new(FilterId::new(id), false, PublishedFilterState::Ready(values))
    }

    #[test]
    fn test_size_sync_waits_for_every_instance() {
        let hub = RuntimeFilterHub::new(1024);
        let id = FilterId::new(1);
        hub.register_producer(id, 2);
        let seen = Arc::new(AtomicU64::new(0));

        let first = Arc::clone(&seen);
        hub.report_local_size(id, 10, Box::new(move |n| {
            first.fetch_add(n, Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(hub.synced_size(id), None);

        let second = Arc::clone(&seen);
        hub.report_local_size(id, 5, Box::new(move |n| {
            second.fetch_add(n, Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 30);
        assert_eq!(hub.synced_size(id), Some(15));

        let err = hub.report_local_size(id, 1, Box::new(|_| {})).unwrap_err();
        assert!(err.contains("expected 2"));
    }

    #[test]
    fn test_global_merge_unions_partials() {
        let hub = RuntimeFilterHub::new(1024);
        let id = FilterId::new(7);
        hub.register_producer(id, 2);
        hub.publish(in_filter(7, vec![1, 2]), false, true).unwrap();
        assert!(hub.global_filter(id).is_none());
        hub.publish(in_filter(7, vec![3]), false, true).unwrap();

        let merged = hub.global_filter(id).unwrap();
        let values = merged.values().unwrap();
        assert!(values.contains(&KeyValue::Int(1)));
        assert!(values.contains(&KeyValue::Int(3)));
        assert_eq!(hub.local_filters(id).len(), 2);
    }

    #[test]
    fn test_global_merge_degrades_large_in_set() {
        let hub = RuntimeFilterHub::new(2);
        let id = FilterId::new(8);
        hub.register_producer(id, 2);
        hub.publish(in_filter(8, vec![1, 2]), false, true).unwrap();
        hub.publish(in_filter(8, vec![3]), false, true).unwrap();
        assert!(hub.global_filter(id).unwrap().is_ignored());
    }

    #[test]
    fn test_disabled_partial_disables_merge_and_local_skips_global() {
        let hub = RuntimeFilterHub::new(1024);
        let id = FilterId::new(9);
        hub.register_producer(id, 2);
        hub.publish(in_filter(9, vec![1]), false, true).unwrap();
        hub.publish(
            PublishedRuntimeFilter::new(id, false, PublishedFilterState::Disabled),
            false,
            true,
        )
        .unwrap();
        assert!(hub.global_filter(id).unwrap().is_disabled());

        let local_only = FilterId::new(10);
        hub.publish(in_filter(10, vec![1]), true, true).unwrap();
        assert!(hub.global_filter(local_only).is_none());
        assert_eq!(hub.local_filters(local_only).len(), 1);
    }
}
