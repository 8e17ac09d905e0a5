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
//! Runtime filters produced by the hash join build side.
//!
//! Responsibilities:
//! - Filter representations (IN set, bloom, min/max) over typed key columns.
//! - The producer capability interface and its registry-backed implementation.
//! - `RuntimeFilterSlots`, which runs a join's filters through the build protocol.
//!
//! Key exported interfaces:
//! - Types: `RuntimeFilterSlots`, `RuntimeFilterProducer`, `RuntimeFilterDesc`,
//!   `PublishedRuntimeFilter`.
//! - Traits: `RuntimeFilter`.

pub mod bloom;
pub mod descriptor;
pub mod in_filter;
pub mod key_column;
pub mod min_max;
pub mod producer;
pub mod published;
pub mod slots;
pub mod values;

pub use bloom::BloomFilterValues;
pub use descriptor::{RuntimeFilterDesc, RuntimeFilterType};
pub use in_filter::InFilterValues;
pub use key_column::{KeyDomain, KeyValue};
pub use min_max::{MinMaxFilterValues, MinMaxValue};
pub use producer::{
    RuntimeFilter, RuntimeFilterContext, RuntimeFilterContextPtr, RuntimeFilterPhase,
    RuntimeFilterProducer,
};
pub use published::{PublishedFilterState, PublishedRuntimeFilter};
pub use slots::RuntimeFilterSlots;
pub use values::RuntimeFilterValues;
