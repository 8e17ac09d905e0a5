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
//! Consumer view of a published runtime filter.
//!
//! Responsibilities:
//! - Carries the finished filter (or its ignored/disabled marker) from the build side to probe consumers.
//! - Evaluates probe key columns and prunes chunks.
//!
//! Key exported interfaces:
//! - Types: `PublishedRuntimeFilter`, `PublishedFilterState`.

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;

use crate::common::ids::FilterId;
use crate::exec::chunk::Chunk;

use super::descriptor::RuntimeFilterType;
use super::key_column::KeyColumnView;
use super::values::RuntimeFilterValues;

#[derive(Clone, Debug)]
pub enum PublishedFilterState {
    /// Producer decided the filter carries no value; consumers keep every row.
    Ignored,
    /// Subsumed by another filter on the same key; consumers keep every row.
    Disabled,
    Ready(RuntimeFilterValues),
}

#[derive(Clone, Debug)]
pub struct PublishedRuntimeFilter {
    pub filter_id: FilterId,
    pub null_aware: bool,
    pub state: PublishedFilterState,
}

impl PublishedRuntimeFilter {
    pub fn new(filter_id: FilterId, null_aware: bool, state: PublishedFilterState) -> Self {
        Self {
            filter_id,
            null_aware,
            state,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.state, PublishedFilterState::Ignored)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, PublishedFilterState::Disabled)
    }

    pub fn real_type(&self) -> Option<RuntimeFilterType> {
        match &self.state {
            PublishedFilterState::Ready(values) => Some(values.real_type()),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<&RuntimeFilterValues> {
        match &self.state {
            PublishedFilterState::Ready(values) => Some(values),
            _ => None,
        }
    }

    /// Per-row keep flags for a probe key column.
    pub fn evaluate(&self, array: &ArrayRef) -> Result<Vec<bool>, String> {
        let PublishedFilterState::Ready(values) = &self.state else {
            return Ok(vec![true; array.len()]);
        };
        let view = KeyColumnView::try_new(array)
            .map_err(|e| format!("runtime filter {}: {}", self.filter_id, e))?;
        if view.domain() != values.domain() {
            return Err(format!(
                "runtime filter {} probe type mismatch: filter={:?} column={:?}",
                self.filter_id,
                values.domain(),
                view.domain()
            ));
        }
        let keep_null = self.null_aware && values.has_null();
        let keep = (0..view.len())
            .map(|row| match view.value_at(row) {
                Some(value) => values.contains(&value),
                None => keep_null,
            })
            .collect();
        Ok(keep)
    }

    /// Drop rows whose key at `column` cannot match. `None` when no row survives.
    pub fn filter_chunk(&self, chunk: Chunk, column: usize) -> Result<Option<Chunk>, String> {
        if chunk.is_empty() || self.values().is_none() {
            return Ok(Some(chunk));
        }
        let array = chunk.column(column)?;
        let keep = self.evaluate(&array)?;
        if keep.iter().all(|v| *v) {
            return Ok(Some(chunk));
        }
        if keep.iter().all(|v| !*v) {
            return Ok(None);
        }
        let mask = BooleanArray::from(keep);
        let filtered_batch = filter_record_batch(&chunk.batch, &mask).map_err(|e| e.to_string())?;
        Ok(Some(Chunk::new(filtered_batch)))
    }
}
