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
//! Realized runtime filter representation.
//!
//! The variant is the effective type: a hybrid filter that converted keeps
//! `Bloom`, one that stayed exact keeps `In`.

use super::bloom::BloomFilterValues;
use super::descriptor::RuntimeFilterType;
use super::in_filter::InFilterValues;
use super::key_column::{KeyColumnView, KeyDomain, KeyValue};
use super::min_max::MinMaxFilterValues;

#[derive(Clone, Debug)]
pub enum RuntimeFilterValues {
    In(InFilterValues),
    Bloom(BloomFilterValues),
    MinMax(MinMaxFilterValues),
}

impl RuntimeFilterValues {
    /// Empty representation for a declared type. Hybrid filters start exact.
    pub fn for_declared_type(filter_type: RuntimeFilterType, domain: KeyDomain) -> Self {
        match filter_type {
            RuntimeFilterType::InFilter | RuntimeFilterType::InOrBloomFilter => {
                RuntimeFilterValues::In(InFilterValues::new(domain))
            }
            RuntimeFilterType::BloomFilter => {
                RuntimeFilterValues::Bloom(BloomFilterValues::new(domain))
            }
            RuntimeFilterType::MinMaxFilter => {
                RuntimeFilterValues::MinMax(MinMaxFilterValues::new(domain))
            }
        }
    }

    pub fn real_type(&self) -> RuntimeFilterType {
        match self {
            RuntimeFilterValues::In(_) => RuntimeFilterType::InFilter,
            RuntimeFilterValues::Bloom(_) => RuntimeFilterType::BloomFilter,
            RuntimeFilterValues::MinMax(_) => RuntimeFilterType::MinMaxFilter,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        match self {
            RuntimeFilterValues::In(v) => v.domain(),
            RuntimeFilterValues::Bloom(v) => v.domain(),
            RuntimeFilterValues::MinMax(v) => v.domain(),
        }
    }

    pub fn has_null(&self) -> bool {
        match self {
            RuntimeFilterValues::In(v) => v.has_null(),
            RuntimeFilterValues::Bloom(v) => v.has_null(),
            RuntimeFilterValues::MinMax(v) => v.has_null(),
        }
    }

    /// Replace an exact set with an unallocated bloom filter carrying the same values.
    pub(crate) fn convert_in_to_bloom(&mut self) -> Result<(), String> {
        let RuntimeFilterValues::In(in_values) = self else {
            return Err(format!(
                "cannot convert {} runtime filter to bloom filter",
                self.real_type()
            ));
        };
        let bloom = BloomFilterValues::with_pending(
            in_values.domain(),
            in_values.hashes(),
            in_values.has_null(),
        );
        *self = RuntimeFilterValues::Bloom(bloom);
        Ok(())
    }

    pub(crate) fn insert_view(&mut self, view: &KeyColumnView<'_>) -> Result<(), String> {
        match self {
            RuntimeFilterValues::In(v) => v.insert_view(view),
            RuntimeFilterValues::Bloom(v) => v.insert_view(view),
            RuntimeFilterValues::MinMax(v) => v.insert_view(view),
        }
    }

    /// Whether a non-null probe key may match a build key.
    pub fn contains(&self, value: &KeyValue<'_>) -> bool {
        match self {
            RuntimeFilterValues::In(v) => v.contains(value),
            RuntimeFilterValues::Bloom(v) => v.contains(value),
            RuntimeFilterValues::MinMax(v) => v.contains(value),
        }
    }

    /// Merge a partial from another build instance. A hybrid filter may stay exact on one
    /// instance and convert on another; the exact values are folded into the bloom filter.
    pub(crate) fn merge_from(&mut self, other: &RuntimeFilterValues) -> Result<(), String> {
        if let (RuntimeFilterValues::In(in_values), RuntimeFilterValues::Bloom(bloom)) =
            (&*self, other)
        {
            let mut merged = bloom.clone();
            merged.merge_in_values(in_values)?;
            *self = RuntimeFilterValues::Bloom(merged);
            return Ok(());
        }
        match (self, other) {
            (RuntimeFilterValues::Bloom(lhs), RuntimeFilterValues::In(rhs)) => {
                lhs.merge_in_values(rhs)
            }
            (RuntimeFilterValues::In(lhs), RuntimeFilterValues::In(rhs)) => lhs.merge_from(rhs),
            (RuntimeFilterValues::Bloom(lhs), RuntimeFilterValues::Bloom(rhs)) => {
                lhs.merge_from(rhs)
            }
            (RuntimeFilterValues::MinMax(lhs), RuntimeFilterValues::MinMax(rhs)) => {
                lhs.merge_from(rhs)
            }
            (lhs, rhs) => Err(format!(
                "runtime filter merge type mismatch: {} vs {}",
                lhs.real_type(),
                rhs.real_type()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};

    use super::RuntimeFilterValues;
    use crate::exec::runtime_filter::descriptor::RuntimeFilterType;
    use crate::exec::runtime_filter::key_column::{KeyColumnView, KeyDomain, KeyValue};

    #[test]
    fn test_convert_in_to_bloom_keeps_values() {
        let mut values =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::InOrBloomFilter, KeyDomain::Int);
        assert_eq!(values.real_type(), RuntimeFilterType::InFilter);
        let array = Arc::new(Int64Array::from(vec![Some(7), None, Some(11)])) as ArrayRef;
        values
            .insert_view(&KeyColumnView::try_new(&array).unwrap())
            .unwrap();

        values.convert_in_to_bloom().unwrap();
        assert_eq!(values.real_type(), RuntimeFilterType::BloomFilter);
        assert!(values.has_null());
        let RuntimeFilterValues::Bloom(bloom) = &mut values else {
            panic!("expected bloom values");
        };
        bloom.allocate(16, 64, 1024).unwrap();
        assert!(values.contains(&KeyValue::Int(7)));
        assert!(values.contains(&KeyValue::Int(11)));
        assert!(values.convert_in_to_bloom().is_err());
    }

    #[test]
    fn test_merge_rejects_mixed_types() {
        let mut lhs =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::InFilter, KeyDomain::Int);
        let rhs =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::MinMaxFilter, KeyDomain::Int);
        let err = lhs.merge_from(&rhs).unwrap_err();
        assert!(err.contains("IN_FILTER vs MIN_MAX_FILTER"));
    }

    #[test]
    fn test_merge_exact_partial_with_bloom_partial() {
        let exact_keys = Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef;
        let bloom_keys = Arc::new(Int64Array::from(vec![10, 20, 30])) as ArrayRef;
        let mut exact =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::InOrBloomFilter, KeyDomain::Int);
        exact
            .insert_view(&KeyColumnView::try_new(&exact_keys).unwrap())
            .unwrap();
        let mut bloom =
            RuntimeFilterValues::for_declared_type(RuntimeFilterType::BloomFilter, KeyDomain::Int);
        let RuntimeFilterValues::Bloom(inner) = &mut bloom else {
            panic!("expected bloom values");
        };
        inner.allocate(3, 64, 1024).unwrap();
        bloom
            .insert_view(&KeyColumnView::try_new(&bloom_keys).unwrap())
            .unwrap();

        let mut exact_first = exact.clone();
        exact_first.merge_from(&bloom).unwrap();
        let mut bloom_first = bloom.clone();
        bloom_first.merge_from(&exact).unwrap();
        for merged in [&exact_first, &bloom_first] {
            assert_eq!(merged.real_type(), RuntimeFilterType::BloomFilter);
            for v in [1, 2, 10, 20, 30] {
                assert!(merged.contains(&KeyValue::Int(v)));
            }
        }
    }
}
