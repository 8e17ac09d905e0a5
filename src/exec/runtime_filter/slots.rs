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
//! Runtime filter slots of one hash join build.
//!
//! Responsibilities:
//! - Owns the runtime filters computed from the join's build key expressions.
//! - Drives them through size negotiation, representation selection, redundancy
//!   elimination, row insertion, publication and shared-context hand-off.
//!
//! Key exported interfaces:
//! - Types: `RuntimeFilterSlots`.
//!
//! Phases must run in order: `negotiate_sizes` → `finalize_representations` →
//! `eliminate_redundant` → `insert` (per chunk) → `publish`. Each build instance owns its
//! own slots; cross-instance coordination goes through the filters and the registry.

use std::sync::Arc;

use hashbrown::HashSet;

use crate::common::ids::FilterId;
use crate::common::logging::debug;
use crate::exec::chunk::Chunk;
use crate::exec::expr::ExprContext;
use crate::exec::operators::hashjoin::shared_hash_table::SharedHashTableContext;
use crate::exec::pipeline::dependency::CountedFinishDependency;
use crate::runtime::runtime_state::RuntimeState;

use super::descriptor::RuntimeFilterType;
use super::producer::{RuntimeFilter, RuntimeFilterPhase};

pub struct RuntimeFilterSlots<'a> {
    build_expr_ctxs: &'a [ExprContext],
    runtime_filters: Vec<Arc<dyn RuntimeFilter>>,
}

impl<'a> RuntimeFilterSlots<'a> {
    pub fn new(
        build_expr_ctxs: &'a [ExprContext],
        runtime_filters: Vec<Arc<dyn RuntimeFilter>>,
    ) -> Result<Self, String> {
        for filter in &runtime_filters {
            if filter.expr_order() >= build_expr_ctxs.len() {
                return Err(format!(
                    "runtime filter {} expr_order {} out of range (build exprs={})",
                    filter.filter_id(),
                    filter.expr_order(),
                    build_expr_ctxs.len()
                ));
            }
        }
        Ok(Self {
            build_expr_ctxs,
            runtime_filters,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.runtime_filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.runtime_filters.len()
    }

    pub fn runtime_filters(&self) -> &[Arc<dyn RuntimeFilter>] {
        &self.runtime_filters
    }

    /// Start the size exchange of every filter that needs the global build size.
    ///
    /// Every filter registers on `dependency` before any of them sends, since a send may
    /// complete the exchange and release the dependency synchronously.
    pub fn negotiate_sizes(
        &self,
        state: &RuntimeState,
        local_row_count: u64,
        dependency: Arc<CountedFinishDependency>,
    ) -> Result<(), String> {
        if self.runtime_filters.is_empty() {
            return Ok(());
        }
        for filter in &self.runtime_filters {
            if filter.need_sync_filter_size() {
                filter.set_finish_dependency(Arc::clone(&dependency));
            }
        }
        for filter in &self.runtime_filters {
            if filter.need_sync_filter_size() {
                filter.send_filter_size(state, local_row_count)?;
            }
        }
        Ok(())
    }

    fn resolved_size(filter: &dyn RuntimeFilter, local_row_count: u64) -> Result<u64, String> {
        if filter.need_sync_filter_size() {
            filter.synced_size()
        } else {
            Ok(local_row_count)
        }
    }

    /// Pick the concrete representation of every non-ignored filter and size bloom filters.
    pub fn finalize_representations(
        &self,
        state: &RuntimeState,
        local_row_count: u64,
    ) -> Result<(), String> {
        let max_in_num = state.runtime_filter_max_in_num();
        for filter in &self.runtime_filters {
            if filter.is_ignored() {
                continue;
            }
            let size = Self::resolved_size(filter.as_ref(), local_row_count)?;
            if filter.declared_type() == RuntimeFilterType::InOrBloomFilter && size > max_in_num {
                debug!(
                    "runtime filter {} change to bloom filter: size={}, max_in_num={}",
                    filter.filter_id(),
                    size,
                    max_in_num
                );
                filter.change_to_bloom_filter()?;
            }
            if filter.real_type() == RuntimeFilterType::BloomFilter {
                filter.init_bloom_filter(size)?;
            }
            filter.mark_type_resolved()?;
        }
        Ok(())
    }

    /// Disable filters made redundant by an exact IN filter on the same key.
    ///
    /// Of several IN filters on one key only the first is kept. Any other filter on a key
    /// that keeps an IN filter is disabled.
    pub fn eliminate_redundant(&self, _state: &RuntimeState) -> Result<(), String> {
        for filter in &self.runtime_filters {
            if filter.is_ignored() || filter.is_disabled() {
                continue;
            }
            if filter.declared_type() == RuntimeFilterType::InOrBloomFilter
                && filter.phase() < RuntimeFilterPhase::TypeResolved
            {
                return Err(format!(
                    "runtime filter {} type not resolved before redundancy elimination",
                    filter.filter_id()
                ));
            }
        }

        let mut has_in_filter = HashSet::new();
        for filter in &self.runtime_filters {
            if filter.is_ignored() || filter.is_disabled() {
                continue;
            }
            if filter.real_type() != RuntimeFilterType::InFilter {
                continue;
            }
            if !has_in_filter.insert(filter.expr_order()) {
                debug!(
                    "runtime filter {} disabled: duplicate IN filter on expr {}",
                    filter.filter_id(),
                    filter.expr_order()
                );
                filter.set_disabled();
            }
        }

        for filter in &self.runtime_filters {
            if filter.is_ignored() || filter.is_disabled() {
                continue;
            }
            if filter.real_type() == RuntimeFilterType::InFilter
                || !has_in_filter.contains(&filter.expr_order())
            {
                continue;
            }
            debug!(
                "runtime filter {} ({}) disabled: IN filter on expr {}",
                filter.filter_id(),
                filter.real_type(),
                filter.expr_order()
            );
            filter.set_disabled();
        }
        Ok(())
    }

    /// Fold one build chunk into every active filter. Build expressions must already have
    /// been executed over `chunk`.
    pub fn insert(&self, chunk: &Chunk) -> Result<(), String> {
        for filter in &self.runtime_filters {
            if filter.is_ignored() || filter.is_disabled() {
                continue;
            }
            let expr_ctx = &self.build_expr_ctxs[filter.expr_order()];
            let column_id = expr_ctx.last_result_column_id().ok_or_else(|| {
                format!(
                    "runtime filter {}: build expr {} has not been executed",
                    filter.filter_id(),
                    filter.expr_order()
                )
            })?;
            let column = chunk.column(column_id)?;
            filter.insert_batch(&column)?;
        }
        Ok(())
    }

    /// Hand every filter to the registry. Ignored and disabled filters publish their marker.
    pub fn publish(&self, state: &RuntimeState, publish_local: bool) -> Result<(), String> {
        for filter in &self.runtime_filters {
            filter.publish(state, publish_local)?;
        }
        Ok(())
    }

    pub fn copy_to_shared(&self, context: &mut SharedHashTableContext) {
        for filter in &self.runtime_filters {
            context
                .runtime_filters
                .insert(filter.filter_id(), filter.shared_context());
        }
    }

    /// Adopt the builder's filter state. Every filter is validated first, so a missing id or
    /// an incompatible handle leaves all filters untouched.
    pub fn copy_from_shared(&self, context: &SharedHashTableContext) -> Result<(), String> {
        let mut adopted = Vec::with_capacity(self.runtime_filters.len());
        for filter in &self.runtime_filters {
            let filter_id = filter.filter_id();
            let shared = context
                .runtime_filters
                .get(&filter_id)
                .ok_or_else(|| invalid_filter_id(filter_id))?;
            filter.check_shared_context(shared)?;
            adopted.push((filter, Arc::clone(shared)));
        }
        for (filter, shared) in adopted {
            filter.set_shared_context(shared)?;
        }
        Ok(())
    }

    pub fn ignore_all(&self) {
        for filter in &self.runtime_filters {
            filter.set_ignored();
        }
        debug!("runtime filter slots: ignore all {} filters", self.len());
    }

    pub fn disable_all(&self) {
        for filter in &self.runtime_filters {
            filter.set_disabled();
        }
        debug!("runtime filter slots: disable all {} filters", self.len());
    }
}

fn invalid_filter_id(filter_id: FilterId) -> String {
    format!("invalid runtime filter id: {}", filter_id)
}
