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
use std::sync::Arc;
use std::time::Duration;

use crate::common::config;
use crate::runtime::runtime_filter_hub::RuntimeFilterHub;

/// Per-query overrides of process-wide runtime filter settings.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub runtime_filter_max_in_num: Option<u64>,
    pub runtime_bloom_filter_min_size: Option<u64>,
    pub runtime_bloom_filter_max_size: Option<u64>,
    pub runtime_filter_wait_timeout_ms: Option<u64>,
}

/// RuntimeState is a per-fragment-instance execution context, similar to StarRocks BE RuntimeState.
///
/// Build instances of one join share the `RuntimeFilterHub`; cloning a state keeps the hub.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    query_options: QueryOptions,
    runtime_filter_hub: Arc<RuntimeFilterHub>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

impl RuntimeState {
    pub fn new(query_options: QueryOptions) -> Self {
        let max_in_num = query_options
            .runtime_filter_max_in_num
            .unwrap_or_else(config::runtime_filter_max_in_num);
        Self {
            query_options,
            runtime_filter_hub: Arc::new(RuntimeFilterHub::new(max_in_num)),
        }
    }

    pub fn with_hub(query_options: QueryOptions, runtime_filter_hub: Arc<RuntimeFilterHub>) -> Self {
        Self {
            query_options,
            runtime_filter_hub,
        }
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query_options
    }

    pub fn runtime_filter_hub(&self) -> &Arc<RuntimeFilterHub> {
        &self.runtime_filter_hub
    }

    /// Largest cardinality kept as an exact IN set.
    pub fn runtime_filter_max_in_num(&self) -> u64 {
        self.query_options
            .runtime_filter_max_in_num
            .unwrap_or_else(config::runtime_filter_max_in_num)
    }

    pub fn runtime_bloom_filter_min_size(&self) -> u64 {
        self.query_options
            .runtime_bloom_filter_min_size
            .unwrap_or_else(config::runtime_bloom_filter_min_size)
    }

    pub fn runtime_bloom_filter_max_size(&self) -> u64 {
        self.query_options
            .runtime_bloom_filter_max_size
            .unwrap_or_else(config::runtime_bloom_filter_max_size)
    }

    pub fn runtime_filter_wait_timeout(&self) -> Duration {
        let ms = self
            .query_options
            .runtime_filter_wait_timeout_ms
            .unwrap_or_else(config::runtime_filter_wait_timeout_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{QueryOptions, RuntimeState};

    #[test]
    fn test_query_options_override_config() {
        let state = RuntimeState::new(QueryOptions {
            runtime_filter_max_in_num: Some(3),
            runtime_bloom_filter_min_size: Some(64),
            runtime_bloom_filter_max_size: Some(4096),
            runtime_filter_wait_timeout_ms: Some(25),
        });
        assert_eq!(state.runtime_filter_max_in_num(), 3);
        assert_eq!(state.runtime_bloom_filter_min_size(), 64);
        assert_eq!(state.runtime_bloom_filter_max_size(), 4096);
        assert_eq!(state.runtime_filter_wait_timeout(), Duration::from_millis(25));
        assert_eq!(state.runtime_filter_hub().max_in_num(), 3);
    }

    #[test]
    fn test_clone_shares_hub() {
        let state = RuntimeState::default();
        let other = state.clone();
        assert!(Arc::ptr_eq(state.runtime_filter_hub(), other.runtime_filter_hub()));
    }
}
