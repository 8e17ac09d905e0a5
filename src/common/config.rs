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
use crate::joinrf_config::config as joinrf_app_config;

pub(crate) fn runtime_filter_max_in_num() -> u64 {
    joinrf_app_config()
        .ok()
        .map(|c| c.runtime.runtime_filter_max_in_num)
        .unwrap_or(1024)
}

pub(crate) fn runtime_bloom_filter_min_size() -> u64 {
    joinrf_app_config()
        .ok()
        .map(|c| c.runtime.runtime_bloom_filter_min_size)
        .unwrap_or(1024)
}

pub(crate) fn runtime_bloom_filter_max_size() -> u64 {
    joinrf_app_config()
        .ok()
        .map(|c| c.runtime.runtime_bloom_filter_max_size)
        .unwrap_or(16 * 1024 * 1024)
}

pub(crate) fn runtime_filter_wait_timeout_ms() -> u64 {
    joinrf_app_config()
        .ok()
        .map(|c| c.runtime.runtime_filter_wait_timeout_ms)
        .unwrap_or(10_000)
}
