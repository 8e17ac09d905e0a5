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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::DataType;

use joinrf::joinrf_logging;
use joinrf::{
    Chunk, PublishedRuntimeFilter, QueryOptions, RuntimeFilter, RuntimeFilterDesc,
    RuntimeFilterProducer, RuntimeFilterType, RuntimeState,
};

/// Initialize logging once for the test binary.
pub fn init_test_logging() {
    joinrf_logging::init_with_level("warn");
}

/// Runtime state with small bloom bounds and the given IN threshold.
pub fn test_state(max_in_num: u64) -> RuntimeState {
    init_test_logging();
    RuntimeState::new(test_options(max_in_num))
}

pub fn test_options(max_in_num: u64) -> QueryOptions {
    QueryOptions {
        runtime_filter_max_in_num: Some(max_in_num),
        runtime_bloom_filter_min_size: Some(64),
        runtime_bloom_filter_max_size: Some(1 << 20),
        runtime_filter_wait_timeout_ms: Some(5_000),
    }
}

pub fn int_desc(id: i32, filter_type: RuntimeFilterType, expr_order: usize) -> RuntimeFilterDesc {
    RuntimeFilterDesc::new(id, filter_type, expr_order, DataType::Int64)
}

pub fn producer(state: &RuntimeState, desc: RuntimeFilterDesc) -> Arc<dyn RuntimeFilter> {
    Arc::new(RuntimeFilterProducer::new(state, desc).expect("create runtime filter producer"))
}

pub fn int_array(values: Vec<Option<i64>>) -> ArrayRef {
    Arc::new(Int64Array::from(values)) as ArrayRef
}

pub fn int_chunk(columns: Vec<Vec<Option<i64>>>) -> Chunk {
    let named = columns
        .into_iter()
        .enumerate()
        .map(|(idx, values)| (format!("k{}", idx), int_array(values)))
        .collect::<Vec<_>>();
    Chunk::try_from_columns(
        named
            .iter()
            .map(|(name, array)| (name.as_str(), Arc::clone(array)))
            .collect(),
    )
    .expect("build int chunk")
}

/// Keep flags of `filter` over the given probe keys.
pub fn probe(filter: &PublishedRuntimeFilter, keys: Vec<Option<i64>>) -> Vec<bool> {
    filter
        .evaluate(&int_array(keys))
        .expect("evaluate runtime filter")
}
