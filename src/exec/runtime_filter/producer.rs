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
//! Build-side runtime filter producer.
//!
//! Responsibilities:
//! - Defines the `RuntimeFilter` capability interface driven by `RuntimeFilterSlots`.
//! - Implements it with `RuntimeFilterProducer`: size reporting through the registry,
//!   representation changes, row insertion, publication and shared-state hand-off.
//!
//! Key exported interfaces:
//! - Traits: `RuntimeFilter`.
//! - Types: `RuntimeFilterProducer`, `RuntimeFilterContext`, `RuntimeFilterContextPtr`,
//!   `RuntimeFilterPhase`.
//!
//! Current limitations:
//! - Size synchronization only goes through the in-process `RuntimeFilterHub`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use arrow::array::ArrayRef;

use crate::common::ids::FilterId;
use crate::common::logging::{debug, error};
use crate::exec::pipeline::dependency::CountedFinishDependency;
use crate::runtime::runtime_state::RuntimeState;

use super::descriptor::{RuntimeFilterDesc, RuntimeFilterType};
use super::key_column::{KeyColumnView, KeyDomain};
use super::published::{PublishedFilterState, PublishedRuntimeFilter};
use super::values::RuntimeFilterValues;

/// Lifecycle of one filter within a build phase.
///
/// `ignored` and `disabled` are tracked as flags next to the phase; they never get cleared.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum RuntimeFilterPhase {
    Created,
    SizePending,
    Sized,
    TypeResolved,
    Inserting,
    Published,
}

/// Filter-owned state that sibling build instances can adopt.
#[derive(Clone, Debug)]
pub struct RuntimeFilterContext {
    pub values: RuntimeFilterValues,
    pub ignored: bool,
    pub disabled: bool,
}

pub type RuntimeFilterContextPtr = Arc<RwLock<RuntimeFilterContext>>;

/// Capability interface of one runtime filter as seen by the slot orchestrator.
pub trait RuntimeFilter: Send + Sync + fmt::Debug {
    fn filter_id(&self) -> FilterId;

    fn declared_type(&self) -> RuntimeFilterType;

    /// Effective type; differs from the declared one only for `InOrBloomFilter`.
    fn real_type(&self) -> RuntimeFilterType;

    fn expr_order(&self) -> usize;

    fn need_sync_filter_size(&self) -> bool;

    fn phase(&self) -> RuntimeFilterPhase;

    /// Register one outstanding contribution on `dependency`; released once the size is synced.
    fn set_finish_dependency(&self, dependency: Arc<CountedFinishDependency>);

    fn send_filter_size(&self, state: &RuntimeState, local_size: u64) -> Result<(), String>;

    /// Globally merged build size. Fails while the exchange is still pending.
    fn synced_size(&self) -> Result<u64, String>;

    fn change_to_bloom_filter(&self) -> Result<(), String>;

    fn init_bloom_filter(&self, size: u64) -> Result<(), String>;

    /// Close representation selection; inserts are rejected before this.
    fn mark_type_resolved(&self) -> Result<(), String>;

    fn insert_batch(&self, column: &ArrayRef) -> Result<(), String>;

    fn publish(&self, state: &RuntimeState, publish_local: bool) -> Result<(), String>;

    fn shared_context(&self) -> RuntimeFilterContextPtr;

    /// Whether `context` could be adopted, without adopting it.
    fn check_shared_context(&self, _context: &RuntimeFilterContextPtr) -> Result<(), String> {
        Ok(())
    }

    fn set_shared_context(&self, context: RuntimeFilterContextPtr) -> Result<(), String>;

    fn is_ignored(&self) -> bool;

    fn set_ignored(&self);

    fn is_disabled(&self) -> bool;

    fn set_disabled(&self);
}

#[derive(Debug)]
struct SizeSyncState {
    phase: RuntimeFilterPhase,
    dependency: Option<Arc<CountedFinishDependency>>,
    synced_size: Option<u64>,
}

/// Production `RuntimeFilter` backed by `RuntimeFilterHub`.
pub struct RuntimeFilterProducer {
    desc: RuntimeFilterDesc,
    domain: KeyDomain,
    bloom_min_bytes: u64,
    bloom_max_bytes: u64,
    context: RwLock<RuntimeFilterContextPtr>,
    sync: Arc<Mutex<SizeSyncState>>,
    ignored: AtomicBool,
    disabled: AtomicBool,
}

impl fmt::Debug for RuntimeFilterProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeFilterProducer")
            .field("filter_id", &self.desc.filter_id)
            .field("declared_type", &self.desc.filter_type)
            .field("expr_order", &self.desc.expr_order)
            .field("phase", &self.phase())
            .field("ignored", &self.is_ignored())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl RuntimeFilterProducer {
    pub fn new(state: &RuntimeState, desc: RuntimeFilterDesc) -> Result<Self, String> {
        let domain = KeyDomain::from_data_type(&desc.data_type)
            .map_err(|e| format!("runtime filter {}: {}", desc.filter_id, e))?;
        let values = RuntimeFilterValues::for_declared_type(desc.filter_type, domain);
        Ok(Self {
            bloom_min_bytes: state.runtime_bloom_filter_min_size(),
            bloom_max_bytes: state.runtime_bloom_filter_max_size(),
            domain,
            context: RwLock::new(Arc::new(RwLock::new(RuntimeFilterContext {
                values,
                ignored: false,
                disabled: false,
            }))),
            sync: Arc::new(Mutex::new(SizeSyncState {
                phase: RuntimeFilterPhase::Created,
                dependency: None,
                synced_size: None,
            })),
            ignored: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            desc,
        })
    }

    pub fn desc(&self) -> &RuntimeFilterDesc {
        &self.desc
    }

    fn current_context(&self) -> RuntimeFilterContextPtr {
        Arc::clone(&self.context.read().expect("runtime filter context lock"))
    }

    fn set_phase(&self, phase: RuntimeFilterPhase) {
        self.sync.lock().expect("runtime filter sync lock").phase = phase;
    }

    fn ensure_sized(&self, op: &str) -> Result<(), String> {
        let guard = self.sync.lock().expect("runtime filter sync lock");
        if guard.phase == RuntimeFilterPhase::SizePending {
            return Err(format!(
                "runtime filter {} size not synced before {}",
                self.desc.filter_id, op
            ));
        }
        Ok(())
    }

    /// Bloom element count: the real size when sizing exactly, otherwise the planner estimate.
    fn bloom_elements(&self, size: u64) -> u64 {
        if self.desc.build_bf_exactly || self.desc.bloom_filter_size == 0 {
            size
        } else {
            self.desc.bloom_filter_size
        }
    }
}

impl RuntimeFilter for RuntimeFilterProducer {
    fn filter_id(&self) -> FilterId {
        self.desc.filter_id
    }

    fn declared_type(&self) -> RuntimeFilterType {
        self.desc.filter_type
    }

    fn real_type(&self) -> RuntimeFilterType {
        let context = self.current_context();
        let guard = context.read().expect("runtime filter context lock");
        guard.values.real_type()
    }

    fn expr_order(&self) -> usize {
        self.desc.expr_order
    }

    fn need_sync_filter_size(&self) -> bool {
        self.desc.need_sync_filter_size()
    }

    fn phase(&self) -> RuntimeFilterPhase {
        self.sync.lock().expect("runtime filter sync lock").phase
    }

    fn set_finish_dependency(&self, dependency: Arc<CountedFinishDependency>) {
        dependency.add();
        let mut guard = self.sync.lock().expect("runtime filter sync lock");
        if let Some(previous) = guard.dependency.replace(dependency) {
            if let Err(e) = previous.sub() {
                error!("runtime filter {}: {}", self.desc.filter_id, e);
            }
        }
    }

    fn send_filter_size(&self, state: &RuntimeState, local_size: u64) -> Result<(), String> {
        let filter_id = self.desc.filter_id;
        {
            let mut guard = self.sync.lock().expect("runtime filter sync lock");
            if guard.phase != RuntimeFilterPhase::Created {
                return Err(format!(
                    "runtime filter {} sent its size twice (phase={:?})",
                    filter_id, guard.phase
                ));
            }
            guard.phase = RuntimeFilterPhase::SizePending;
        }
        debug!(
            "runtime filter {} send local size {} (ignored={})",
            filter_id,
            local_size,
            self.is_ignored()
        );
        let sync = Arc::clone(&self.sync);
        // The hub may run this on the thread of whichever instance reports last.
        let on_synced = Box::new(move |global_size: u64| {
            let dependency = {
                let mut guard = sync.lock().expect("runtime filter sync lock");
                guard.synced_size = Some(global_size);
                guard.phase = RuntimeFilterPhase::Sized;
                guard.dependency.take()
            };
            debug!("runtime filter {} synced size {}", filter_id, global_size);
            if let Some(dependency) = dependency
                && let Err(e) = dependency.sub()
            {
                error!("runtime filter {}: {}", filter_id, e);
            }
        });
        state
            .runtime_filter_hub()
            .report_local_size(filter_id, local_size, on_synced)
    }

    fn synced_size(&self) -> Result<u64, String> {
        let guard = self.sync.lock().expect("runtime filter sync lock");
        guard.synced_size.ok_or_else(|| {
            format!(
                "runtime filter {} size not synced (phase={:?})",
                self.desc.filter_id, guard.phase
            )
        })
    }

    fn change_to_bloom_filter(&self) -> Result<(), String> {
        if self.desc.filter_type != RuntimeFilterType::InOrBloomFilter {
            return Err(format!(
                "runtime filter {} declared as {} cannot change to bloom filter",
                self.desc.filter_id, self.desc.filter_type
            ));
        }
        self.ensure_sized("changing to bloom filter")?;
        let context = self.current_context();
        let mut guard = context.write().expect("runtime filter context lock");
        guard
            .values
            .convert_in_to_bloom()
            .map_err(|e| format!("runtime filter {}: {}", self.desc.filter_id, e))
    }

    fn init_bloom_filter(&self, size: u64) -> Result<(), String> {
        self.ensure_sized("allocating bloom filter")?;
        let elements = self.bloom_elements(size);
        let context = self.current_context();
        let mut guard = context.write().expect("runtime filter context lock");
        let real_type = guard.values.real_type();
        let RuntimeFilterValues::Bloom(bloom) = &mut guard.values else {
            return Err(format!(
                "runtime filter {} is {}, not a bloom filter",
                self.desc.filter_id, real_type
            ));
        };
        bloom
            .allocate(elements, self.bloom_min_bytes, self.bloom_max_bytes)
            .map_err(|e| format!("runtime filter {}: {}", self.desc.filter_id, e))?;
        debug!(
            "runtime filter {} bloom allocated: elements={}, bytes={}",
            self.desc.filter_id,
            elements,
            bloom.byte_size()
        );
        Ok(())
    }

    fn mark_type_resolved(&self) -> Result<(), String> {
        let mut guard = self.sync.lock().expect("runtime filter sync lock");
        match guard.phase {
            RuntimeFilterPhase::SizePending => Err(format!(
                "runtime filter {} size not synced before type resolution",
                self.desc.filter_id
            )),
            RuntimeFilterPhase::Created | RuntimeFilterPhase::Sized => {
                guard.phase = RuntimeFilterPhase::TypeResolved;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn insert_batch(&self, column: &ArrayRef) -> Result<(), String> {
        if self.is_ignored() || self.is_disabled() {
            return Ok(());
        }
        {
            let mut guard = self.sync.lock().expect("runtime filter sync lock");
            match guard.phase {
                RuntimeFilterPhase::TypeResolved => guard.phase = RuntimeFilterPhase::Inserting,
                RuntimeFilterPhase::Inserting => {}
                phase => {
                    return Err(format!(
                        "runtime filter {} cannot insert in phase {:?}",
                        self.desc.filter_id, phase
                    ));
                }
            }
        }
        let view = KeyColumnView::try_new(column)
            .map_err(|e| format!("runtime filter {}: {}", self.desc.filter_id, e))?;
        let context = self.current_context();
        let mut guard = context.write().expect("runtime filter context lock");
        guard
            .values
            .insert_view(&view)
            .map_err(|e| format!("runtime filter {}: {}", self.desc.filter_id, e))
    }

    fn publish(&self, state: &RuntimeState, publish_local: bool) -> Result<(), String> {
        if self.phase() == RuntimeFilterPhase::Published {
            return Err(format!(
                "runtime filter {} already published",
                self.desc.filter_id
            ));
        }
        let filter_state = if self.is_ignored() {
            PublishedFilterState::Ignored
        } else if self.is_disabled() {
            PublishedFilterState::Disabled
        } else {
            let context = self.current_context();
            let guard = context.read().expect("runtime filter context lock");
            if let RuntimeFilterValues::Bloom(bloom) = &guard.values
                && !bloom.is_allocated()
            {
                return Err(format!(
                    "runtime filter {} published before its bloom filter was allocated",
                    self.desc.filter_id
                ));
            }
            PublishedFilterState::Ready(guard.values.clone())
        };
        debug!(
            "runtime filter {} publish: state={}, publish_local={}",
            self.desc.filter_id,
            filter_state_name(&filter_state),
            publish_local
        );
        let published =
            PublishedRuntimeFilter::new(self.desc.filter_id, self.desc.null_aware, filter_state);
        state.runtime_filter_hub().publish(
            published,
            publish_local,
            self.desc.has_remote_targets,
        )?;
        self.set_phase(RuntimeFilterPhase::Published);
        Ok(())
    }

    fn shared_context(&self) -> RuntimeFilterContextPtr {
        let context = self.current_context();
        {
            let mut guard = context.write().expect("runtime filter context lock");
            guard.ignored |= self.is_ignored();
            guard.disabled |= self.is_disabled();
        }
        context
    }

    fn check_shared_context(&self, context: &RuntimeFilterContextPtr) -> Result<(), String> {
        let phase = self.phase();
        if phase > RuntimeFilterPhase::TypeResolved {
            return Err(format!(
                "runtime filter {} cannot adopt shared context in phase {:?}",
                self.desc.filter_id, phase
            ));
        }
        let guard = context.read().expect("runtime filter context lock");
        if guard.values.domain() != self.domain {
            return Err(format!(
                "runtime filter {} shared context key type mismatch: {:?} vs {:?}",
                self.desc.filter_id,
                guard.values.domain(),
                self.domain
            ));
        }
        Ok(())
    }

    fn set_shared_context(&self, context: RuntimeFilterContextPtr) -> Result<(), String> {
        self.check_shared_context(&context)?;
        {
            let guard = context.read().expect("runtime filter context lock");
            if guard.ignored {
                self.set_ignored();
            }
            if guard.disabled {
                self.set_disabled();
            }
        }
        *self.context.write().expect("runtime filter context lock") = context;
        let mut guard = self.sync.lock().expect("runtime filter sync lock");
        if guard.phase < RuntimeFilterPhase::TypeResolved {
            guard.phase = RuntimeFilterPhase::TypeResolved;
        }
        Ok(())
    }

    fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Acquire)
    }

    fn set_ignored(&self) {
        self.ignored.store(true, Ordering::Release);
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    fn set_disabled(&self) {
        self.disabled.store(true, Ordering::Release);
    }
}

fn filter_state_name(state: &PublishedFilterState) -> &'static str {
    match state {
        PublishedFilterState::Ignored => "ignored",
        PublishedFilterState::Disabled => "disabled",
        PublishedFilterState::Ready(_) => "ready",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::DataType;

    use super::{RuntimeFilter, RuntimeFilterPhase, RuntimeFilterProducer};
    use crate::exec::pipeline::dependency::CountedFinishDependency;
    use crate::exec::runtime_filter::descriptor::{RuntimeFilterDesc, RuntimeFilterType};
    use crate::exec::runtime_filter::key_column::KeyValue;
    use crate::exec::runtime_filter::values::RuntimeFilterValues;
    use crate::runtime::runtime_state::{QueryOptions, RuntimeState};

    fn test_state() -> RuntimeState {
        RuntimeState::new(QueryOptions {
            runtime_filter_max_in_num: Some(8),
            runtime_bloom_filter_min_size: Some(64),
            runtime_bloom_filter_max_size: Some(1 << 20),
            ..QueryOptions::default()
        })
    }

    fn ints(values: Vec<i64>) -> ArrayRef {
        Arc::new(Int64Array::from(values)) as ArrayRef
    }

    fn synced_hybrid(state: &RuntimeState, id: i32) -> RuntimeFilterProducer {
        let desc = RuntimeFilterDesc::new(id, RuntimeFilterType::InOrBloomFilter, 0, DataType::Int64)
            .with_build_bf_exactly(true);
        RuntimeFilterProducer::new(state, desc).unwrap()
    }

    #[test]
    fn test_size_sync_releases_dependency_when_all_instances_report() {
        let state = test_state();
        let filter = synced_hybrid(&state, 1);
        assert!(filter.need_sync_filter_size());
        state.runtime_filter_hub().register_producer(filter.filter_id(), 2);

        let dependency = Arc::new(CountedFinishDependency::new("rf_size"));
        filter.set_finish_dependency(Arc::clone(&dependency));
        filter.send_filter_size(&state, 3).unwrap();
        assert_eq!(filter.phase(), RuntimeFilterPhase::SizePending);
        assert!(!dependency.is_ready());
        assert!(filter.synced_size().is_err());
        assert!(filter.change_to_bloom_filter().unwrap_err().contains("size not synced"));
        assert!(filter.mark_type_resolved().is_err());

        state
            .runtime_filter_hub()
            .report_local_size(filter.filter_id(), 20, Box::new(|_| {}))
            .unwrap();
        assert!(dependency.is_ready());
        assert_eq!(filter.phase(), RuntimeFilterPhase::Sized);
        assert_eq!(filter.synced_size().unwrap(), 23);
        assert!(filter.send_filter_size(&state, 3).is_err());
    }

    #[test]
    fn test_insert_requires_resolved_type_and_allocated_bloom() {
        let state = test_state();
        let filter = synced_hybrid(&state, 2);
        let err = filter.insert_batch(&ints(vec![1])).unwrap_err();
        assert!(err.contains("cannot insert in phase Created"));

        filter.change_to_bloom_filter().unwrap();
        assert_eq!(filter.real_type(), RuntimeFilterType::BloomFilter);
        filter.mark_type_resolved().unwrap();
        let err = filter.insert_batch(&ints(vec![1])).unwrap_err();
        assert!(err.contains("not allocated"));
        let err = filter.publish(&state, true).unwrap_err();
        assert!(err.contains("before its bloom filter was allocated"));
    }

    #[test]
    fn test_bloom_uses_planner_size_unless_exact() {
        let state = test_state();
        let desc = RuntimeFilterDesc::new(3, RuntimeFilterType::BloomFilter, 0, DataType::Int64)
            .with_bloom_filter_size(1 << 14);
        let estimated = RuntimeFilterProducer::new(&state, desc.clone()).unwrap();
        estimated.init_bloom_filter(10).unwrap();
        let exact = RuntimeFilterProducer::new(&state, desc.with_build_bf_exactly(true)).unwrap();
        exact.init_bloom_filter(10).unwrap();

        let bytes = |filter: &RuntimeFilterProducer| {
            let context = filter.shared_context();
            let guard = context.read().unwrap();
            match &guard.values {
                RuntimeFilterValues::Bloom(bloom) => bloom.byte_size(),
                other => panic!("unexpected values {:?}", other),
            }
        };
        assert_eq!(bytes(&estimated), 1 << 14);
        assert_eq!(bytes(&exact), 64);
    }

    #[test]
    fn test_publish_states() {
        let state = test_state();
        let desc = RuntimeFilterDesc::new(4, RuntimeFilterType::InFilter, 0, DataType::Int64);
        let filter = RuntimeFilterProducer::new(&state, desc).unwrap();
        filter.mark_type_resolved().unwrap();
        filter
            .insert_batch(&(Arc::new(Int64Array::from(vec![Some(9), None])) as ArrayRef))
            .unwrap();
        filter.publish(&state, true).unwrap();
        assert_eq!(filter.phase(), RuntimeFilterPhase::Published);
        assert!(filter.publish(&state, true).unwrap_err().contains("already published"));

        let published = state.runtime_filter_hub().local_filters(filter.filter_id());
        let values = published[0].values().unwrap();
        assert!(values.contains(&KeyValue::Int(9)));
        assert!(values.has_null());

        let desc = RuntimeFilterDesc::new(5, RuntimeFilterType::MinMaxFilter, 0, DataType::Int64);
        let ignored = RuntimeFilterProducer::new(&state, desc).unwrap();
        ignored.set_ignored();
        ignored.set_disabled();
        ignored.insert_batch(&ints(vec![1])).unwrap();
        ignored.publish(&state, true).unwrap();
        assert!(state.runtime_filter_hub().local_filters(5.into())[0].is_ignored());
    }

    #[test]
    fn test_shared_context_carries_flags_and_values() {
        let state = test_state();
        let desc = RuntimeFilterDesc::new(6, RuntimeFilterType::InOrBloomFilter, 0, DataType::Int64);
        let builder = RuntimeFilterProducer::new(&state, desc.clone()).unwrap();
        builder.mark_type_resolved().unwrap();
        builder.insert_batch(&ints(vec![4, 5])).unwrap();
        builder.set_disabled();

        let sibling = RuntimeFilterProducer::new(&state, desc).unwrap();
        sibling.set_shared_context(builder.shared_context()).unwrap();
        assert!(sibling.is_disabled());
        assert!(!sibling.is_ignored());
        assert_eq!(sibling.phase(), RuntimeFilterPhase::TypeResolved);
        let context = sibling.shared_context();
        assert!(context.read().unwrap().values.contains(&KeyValue::Int(5)));

        let utf8 = RuntimeFilterDesc::new(6, RuntimeFilterType::InFilter, 0, DataType::Utf8);
        let mismatched = RuntimeFilterProducer::new(&state, utf8).unwrap();
        let err = mismatched
            .set_shared_context(builder.shared_context())
            .unwrap_err();
        assert!(err.contains("key type mismatch"));
    }

    #[test]
    fn test_shared_context_rejected_after_publish() {
        let state = test_state();
        let desc = RuntimeFilterDesc::new(8, RuntimeFilterType::InFilter, 0, DataType::Int64);
        let builder = RuntimeFilterProducer::new(&state, desc.clone()).unwrap();
        let published = RuntimeFilterProducer::new(&state, desc).unwrap();
        published.mark_type_resolved().unwrap();
        published.publish(&state, true).unwrap();

        let err = published
            .set_shared_context(builder.shared_context())
            .unwrap_err();
        assert!(err.contains("cannot adopt shared context"), "{}", err);
        assert_eq!(published.phase(), RuntimeFilterPhase::Published);
    }

    #[test]
    fn test_unsupported_key_type() {
        let state = test_state();
        let desc = RuntimeFilterDesc::new(7, RuntimeFilterType::InFilter, 0, DataType::Binary);
        let err = RuntimeFilterProducer::new(&state, desc).err().unwrap();
        assert!(err.contains("runtime filter 7"));
    }
}
