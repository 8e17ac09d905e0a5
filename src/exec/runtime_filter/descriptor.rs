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
//! Planner-side description of one runtime filter.

use std::fmt;

use arrow::datatypes::DataType;

use crate::common::ids::FilterId;

/// Declared (and realized) representation of a runtime filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RuntimeFilterType {
    /// Exact membership set.
    InFilter,
    BloomFilter,
    /// Min/max range.
    MinMaxFilter,
    /// Starts as an exact set and converts to bloom when the build side is large.
    InOrBloomFilter,
}

impl fmt::Display for RuntimeFilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeFilterType::InFilter => "IN_FILTER",
            RuntimeFilterType::BloomFilter => "BLOOM_FILTER",
            RuntimeFilterType::MinMaxFilter => "MIN_MAX_FILTER",
            RuntimeFilterType::InOrBloomFilter => "IN_OR_BLOOM_FILTER",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeFilterDesc {
    pub filter_id: FilterId,
    pub filter_type: RuntimeFilterType,
    /// Index of the build key expression this filter is computed from.
    pub expr_order: usize,
    pub data_type: DataType,
    /// Size the bloom filter by the real build cardinality instead of `bloom_filter_size`.
    pub build_bf_exactly: bool,
    pub is_broadcast_join: bool,
    pub has_remote_targets: bool,
    /// Planner estimate in elements; zero means no estimate.
    pub bloom_filter_size: u64,
    /// Null keys match on the probe side (`<=>` joins).
    pub null_aware: bool,
}

impl RuntimeFilterDesc {
    pub fn new(
        filter_id: impl Into<FilterId>,
        filter_type: RuntimeFilterType,
        expr_order: usize,
        data_type: DataType,
    ) -> Self {
        Self {
            filter_id: filter_id.into(),
            filter_type,
            expr_order,
            data_type,
            build_bf_exactly: false,
            is_broadcast_join: false,
            has_remote_targets: false,
            bloom_filter_size: 0,
            null_aware: false,
        }
    }

    pub fn with_build_bf_exactly(mut self, value: bool) -> Self {
        self.build_bf_exactly = value;
        self
    }

    pub fn with_broadcast_join(mut self, value: bool) -> Self {
        self.is_broadcast_join = value;
        self
    }

    pub fn with_remote_targets(mut self, value: bool) -> Self {
        self.has_remote_targets = value;
        self
    }

    pub fn with_bloom_filter_size(mut self, value: u64) -> Self {
        self.bloom_filter_size = value;
        self
    }

    pub fn with_null_aware(mut self, value: bool) -> Self {
        self.null_aware = value;
        self
    }

    /// Whether the bloom geometry must come from the merged size of every build instance.
    ///
    /// A broadcast build sees the whole build side locally, so only partitioned
    /// builds that size bloom filters exactly need the exchange.
    pub fn need_sync_filter_size(&self) -> bool {
        self.build_bf_exactly
            && !self.is_broadcast_join
            && matches!(
                self.filter_type,
                RuntimeFilterType::BloomFilter | RuntimeFilterType::InOrBloomFilter
            )
    }
}
