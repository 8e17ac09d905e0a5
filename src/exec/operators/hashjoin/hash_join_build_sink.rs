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
//! Hash-join build sink driving the runtime filter protocol.
//!
//! Responsibilities:
//! - Consumes build-side chunks, evaluates build key expressions and counts build rows.
//! - Runs the join's runtime filters through size negotiation, representation selection,
//!   redundancy elimination, insertion and publication once build input is exhausted.
//! - Shares the finished filters with sibling instances that reuse the same hash table.
//!
//! Key exported interfaces:
//! - Types: `HashJoinBuildSink`.
//!
//! Current limitations:
//! - The hash table itself is not built here; build chunks are only buffered for filter insertion.

use std::sync::Arc;
use std::sync::mpsc;

use arrow::compute::concat_batches;

use super::shared_hash_table::SharedHashTableController;
use crate::exec::chunk::Chunk;
use crate::exec::expr::ExprContext;
use crate::exec::pipeline::dependency::CountedFinishDependency;
use crate::exec::runtime_filter::{RuntimeFilter, RuntimeFilterSlots};
use crate::joinrf_logging::{debug, warn};
use crate::runtime::runtime_state::RuntimeState;

/// Build side of one hash join instance.
pub struct HashJoinBuildSink {
    name: String,
    node_id: i32,
    instance_id: usize,
    build_expr_ctxs: Vec<ExprContext>,
    runtime_filters: Vec<Arc<dyn RuntimeFilter>>,
    shared: Option<Arc<SharedHashTableController>>,
    should_build: bool,
    build_chunks: Vec<Chunk>,
    build_row_count: u64,
    size_dependency: Option<Arc<CountedFinishDependency>>,
    finishing: bool,
    finished: bool,
}

impl HashJoinBuildSink {
    /// `shared` is set when sibling instances reuse one hash table; the first instance asking the
    /// controller builds, the others adopt its filters.
    pub fn new(
        node_id: i32,
        instance_id: usize,
        build_expr_ctxs: Vec<ExprContext>,
        runtime_filters: Vec<Arc<dyn RuntimeFilter>>,
        shared: Option<Arc<SharedHashTableController>>,
    ) -> Result<Self, String> {
        // Validate expr orders up front.
        RuntimeFilterSlots::new(&build_expr_ctxs, runtime_filters.clone())?;
        let should_build = shared
            .as_ref()
            .map(|controller| controller.should_build(instance_id))
            .unwrap_or(true);
        debug!(
            "HashJoinBuildSink create: node_id={} instance_id={} build_keys={} runtime_filters={} should_build={}",
            node_id,
            instance_id,
            build_expr_ctxs.len(),
            runtime_filters.len(),
            should_build
        );
        Ok(Self {
            name: format!("HASH_JOIN_BUILD_SINK (id={})", node_id),
            node_id,
            instance_id,
            build_expr_ctxs,
            runtime_filters,
            shared,
            should_build,
            build_chunks: Vec::new(),
            build_row_count: 0,
            size_dependency: None,
            finishing: false,
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn should_build(&self) -> bool {
        self.should_build
    }

    pub fn build_row_count(&self) -> u64 {
        self.build_row_count
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn slots(&self) -> Result<RuntimeFilterSlots<'_>, String> {
        RuntimeFilterSlots::new(&self.build_expr_ctxs, self.runtime_filters.clone())
    }

    pub fn push_chunk(&mut self, _state: &RuntimeState, mut chunk: Chunk) -> Result<(), String> {
        if self.finishing {
            return Err(format!("{} received input after set_finishing", self.name));
        }
        if chunk.is_empty() {
            return Ok(());
        }
        if !self.should_build {
            // Siblings reuse the builder's hash table and filters.
            return Ok(());
        }
        for ctx in self.build_expr_ctxs.iter_mut() {
            ctx.execute(&mut chunk)?;
        }
        self.build_row_count = self.build_row_count.saturating_add(chunk.len() as u64);
        self.build_chunks.push(chunk);
        Ok(())
    }

    /// Build input is exhausted: start the runtime filter size exchange.
    pub fn set_finishing(&mut self, state: &RuntimeState) -> Result<(), String> {
        if self.finishing {
            return Ok(());
        }
        self.finishing = true;
        debug!(
            "HashJoinBuildSink set_finishing: node_id={} instance_id={} build_rows={} build_chunks={}",
            self.node_id,
            self.instance_id,
            self.build_row_count,
            self.build_chunks.len()
        );
        if !self.should_build {
            return Ok(());
        }
        let dependency = Arc::new(CountedFinishDependency::new(format!(
            "runtime_filter_size:{}:{}",
            self.node_id, self.instance_id
        )));
        self.size_dependency = Some(Arc::clone(&dependency));
        self.slots()?
            .negotiate_sizes(state, self.build_row_count, dependency)
    }

    /// True while waiting for merged filter sizes, or for the builder when this is a sibling.
    pub fn is_blocked(&self) -> bool {
        if self.should_build {
            return self
                .size_dependency
                .as_ref()
                .is_some_and(|dep| !dep.is_ready());
        }
        self.shared
            .as_ref()
            .is_some_and(|controller| !controller.is_signaled())
    }

    /// Block the calling thread until `is_blocked` turns false or the wait timeout expires.
    pub fn wait_ready(&self, state: &RuntimeState) -> Result<(), String> {
        if !self.is_blocked() {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel::<()>();
        let observer = Box::new(move || {
            let _ = tx.send(());
        });
        if self.should_build {
            if let Some(dep) = self.size_dependency.as_ref() {
                dep.add_waiter(observer);
            }
        } else if let Some(controller) = self.shared.as_ref() {
            controller.dep().add_waiter(observer);
        }
        let timeout = state.runtime_filter_wait_timeout();
        match rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    "HashJoinBuildSink wait timeout: node_id={} instance_id={} timeout_ms={}",
                    self.node_id,
                    self.instance_id,
                    timeout.as_millis()
                );
                Err(format!(
                    "{} timed out after {}ms waiting for runtime filters",
                    self.name,
                    timeout.as_millis()
                ))
            }
        }
    }

    /// Finish the runtime filters once `is_blocked` turned false.
    pub fn finish_build(&mut self, state: &RuntimeState) -> Result<(), String> {
        if self.finished {
            return Ok(());
        }
        if !self.finishing {
            return Err(format!("{} finish_build before set_finishing", self.name));
        }
        if self.is_blocked() {
            return Err(format!("{} finish_build while still blocked", self.name));
        }
        if self.should_build {
            self.finish_as_builder(state)?;
        } else {
            self.finish_from_shared(state)?;
        }
        self.finished = true;
        debug!(
            "HashJoinBuildSink finished: node_id={} instance_id={} should_build={} build_rows={}",
            self.node_id, self.instance_id, self.should_build, self.build_row_count
        );
        Ok(())
    }

    fn finish_as_builder(&mut self, state: &RuntimeState) -> Result<(), String> {
        let build_chunk = self.merged_build_chunk()?;
        let rows = self.build_row_count;
        let slots = self.slots()?;
        slots.finalize_representations(state, rows)?;
        slots.eliminate_redundant(state)?;
        if let Some(chunk) = build_chunk.as_ref() {
            slots.insert(chunk)?;
        }
        slots.publish(state, false)?;
        if let Some(controller) = self.shared.as_ref() {
            controller.publish_with(|ctx| {
                slots.copy_to_shared(ctx);
                ctx.build_row_count = rows;
                Ok(())
            })?;
        }
        Ok(())
    }

    fn finish_from_shared(&mut self, state: &RuntimeState) -> Result<(), String> {
        let controller = self
            .shared
            .as_ref()
            .ok_or_else(|| format!("{} has no shared hash table", self.name))?;
        let slots = self.slots()?;
        let rows = controller.read_with(|ctx| {
            slots.copy_from_shared(ctx)?;
            Ok(ctx.build_row_count)
        })?;
        slots.publish(state, true)?;
        self.build_row_count = rows;
        Ok(())
    }

    /// All buffered build chunks as one chunk, like the single build block of the hash table.
    fn merged_build_chunk(&mut self) -> Result<Option<Chunk>, String> {
        let chunks = std::mem::take(&mut self.build_chunks);
        match chunks.len() {
            0 => Ok(None),
            1 => Ok(chunks.into_iter().next()),
            _ => {
                let schema = chunks[0].schema();
                let batch = concat_batches(&schema, chunks.iter().map(|c| &c.batch))
                    .map_err(|e| e.to_string())?;
                Ok(Some(Chunk::new(batch)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::DataType;

    use super::HashJoinBuildSink;
    use crate::exec::chunk::Chunk;
    use crate::exec::expr::ExprContext;
    use crate::exec::runtime_filter::{
        KeyValue, RuntimeFilter, RuntimeFilterDesc, RuntimeFilterProducer, RuntimeFilterType,
    };
    use crate::runtime::runtime_state::RuntimeState;

    fn chunk(keys: Vec<i64>) -> Chunk {
        Chunk::try_from_columns(vec![("k", Arc::new(Int64Array::from(keys)) as ArrayRef)]).unwrap()
    }

    #[test]
    fn test_builder_publishes_merged_chunks() {
        let state = RuntimeState::default();
        let desc = RuntimeFilterDesc::new(11, RuntimeFilterType::InFilter, 0, DataType::Int64);
        let filter: Arc<dyn RuntimeFilter> =
            Arc::new(RuntimeFilterProducer::new(&state, desc).unwrap());
        let mut sink =
            HashJoinBuildSink::new(1, 0, vec![ExprContext::column_ref(0)], vec![filter], None)
                .unwrap();
        sink.push_chunk(&state, chunk(vec![1, 2])).unwrap();
        sink.push_chunk(&state, chunk(vec![3])).unwrap();
        sink.set_finishing(&state).unwrap();
        assert!(!sink.is_blocked());
        sink.finish_build(&state).unwrap();
        assert!(sink.is_finished());
        assert_eq!(sink.build_row_count(), 3);

        let published = state.runtime_filter_hub().local_filters(11.into());
        assert_eq!(published.len(), 1);
        let values = published[0].values().unwrap();
        assert!(values.contains(&KeyValue::Int(3)));
        assert!(!values.contains(&KeyValue::Int(4)));
    }

    #[test]
    fn test_finish_requires_set_finishing() {
        let state = RuntimeState::default();
        let mut sink =
            HashJoinBuildSink::new(2, 0, vec![ExprContext::column_ref(0)], Vec::new(), None)
                .unwrap();
        assert!(sink.finish_build(&state).is_err());
        sink.set_finishing(&state).unwrap();
        assert!(sink.push_chunk(&state, chunk(vec![1])).is_err());
        sink.finish_build(&state).unwrap();
    }
}
