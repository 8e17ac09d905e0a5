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
//! Exact IN-set runtime filter values.
//!
//! Responsibilities:
//! - Collects the distinct non-null build keys of one join key expression.
//! - Answers exact membership for probe keys and merges partial sets from other instances.
//!
//! Key exported interfaces:
//! - Types: `InFilterValues`.

use hashbrown::HashSet;

use super::key_column::{KeyColumnView, KeyDomain, KeyValue};

#[derive(Clone, Debug)]
enum InSet {
    Int(HashSet<i64>),
    /// Canonical f64 bit patterns.
    Float(HashSet<u64>),
    Bool(HashSet<bool>),
    Utf8(HashSet<String>),
}

#[derive(Clone, Debug)]
/// Distinct build-side key values for an exact membership filter.
pub struct InFilterValues {
    set: InSet,
    has_null: bool,
}

impl InFilterValues {
    pub fn new(domain: KeyDomain) -> Self {
        let set = match domain {
            KeyDomain::Int => InSet::Int(HashSet::new()),
            KeyDomain::Float => InSet::Float(HashSet::new()),
            KeyDomain::Bool => InSet::Bool(HashSet::new()),
            KeyDomain::Utf8 => InSet::Utf8(HashSet::new()),
        };
        Self {
            set,
            has_null: false,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        match &self.set {
            InSet::Int(_) => KeyDomain::Int,
            InSet::Float(_) => KeyDomain::Float,
            InSet::Bool(_) => KeyDomain::Bool,
            InSet::Utf8(_) => KeyDomain::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match &self.set {
            InSet::Int(values) => values.len(),
            InSet::Float(values) => values.len(),
            InSet::Bool(values) => values.len(),
            InSet::Utf8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_null(&self) -> bool {
        self.has_null
    }

    pub fn insert_view(&mut self, view: &KeyColumnView<'_>) -> Result<(), String> {
        if view.domain() != self.domain() {
            return Err(format!(
                "runtime in-filter type mismatch: filter={:?} column={:?}",
                self.domain(),
                view.domain()
            ));
        }
        for row in 0..view.len() {
            match view.value_at(row) {
                Some(value) => self.insert_value(value),
                None => self.has_null = true,
            }
        }
        Ok(())
    }

    fn insert_value(&mut self, value: KeyValue<'_>) {
        match (&mut self.set, value) {
            (InSet::Int(values), KeyValue::Int(v)) => {
                values.insert(v);
            }
            (InSet::Float(values), KeyValue::Float(v)) => {
                values.insert(v.to_bits());
            }
            (InSet::Bool(values), KeyValue::Bool(v)) => {
                values.insert(v);
            }
            (InSet::Utf8(values), KeyValue::Utf8(v)) => {
                if !values.contains(v) {
                    values.insert(v.to_string());
                }
            }
            _ => {}
        }
    }

    pub fn contains(&self, value: &KeyValue<'_>) -> bool {
        match (&self.set, value) {
            (InSet::Int(values), KeyValue::Int(v)) => values.contains(v),
            (InSet::Float(values), KeyValue::Float(v)) => values.contains(&v.to_bits()),
            (InSet::Bool(values), KeyValue::Bool(v)) => values.contains(v),
            (InSet::Utf8(values), KeyValue::Utf8(v)) => values.contains(*v),
            _ => false,
        }
    }

    /// Hashes of every stored value, used when an IN set is converted to a bloom filter.
    pub fn hashes(&self) -> Vec<u64> {
        match &self.set {
            InSet::Int(values) => values.iter().map(|v| KeyValue::Int(*v).hash()).collect(),
            InSet::Float(values) => values
                .iter()
                .map(|v| KeyValue::Float(f64::from_bits(*v)).hash())
                .collect(),
            InSet::Bool(values) => values.iter().map(|v| KeyValue::Bool(*v).hash()).collect(),
            InSet::Utf8(values) => values.iter().map(|v| KeyValue::Utf8(v).hash()).collect(),
        }
    }

    pub fn merge_from(&mut self, other: &InFilterValues) -> Result<(), String> {
        self.has_null |= other.has_null;
        match (&mut self.set, &other.set) {
            (InSet::Int(lhs), InSet::Int(rhs)) => lhs.extend(rhs.iter().copied()),
            (InSet::Float(lhs), InSet::Float(rhs)) => lhs.extend(rhs.iter().copied()),
            (InSet::Bool(lhs), InSet::Bool(rhs)) => lhs.extend(rhs.iter().copied()),
            (InSet::Utf8(lhs), InSet::Utf8(rhs)) => lhs.extend(rhs.iter().cloned()),
            _ => return Err("runtime in-filter merge type mismatch".to_string()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, Int64Array, StringArray};

    use super::InFilterValues;
    use crate::exec::runtime_filter::key_column::{KeyColumnView, KeyDomain, KeyValue};

    fn insert(values: &mut InFilterValues, array: ArrayRef) {
        let view = KeyColumnView::try_new(&array).unwrap();
        values.insert_view(&view).unwrap();
    }

    #[test]
    fn test_in_filter_skips_null_and_dedups() {
        let mut values = InFilterValues::new(KeyDomain::Int);
        insert(
            &mut values,
            Arc::new(Int32Array::from(vec![Some(1), Some(2), Some(2), None, Some(3)])),
        );
        assert_eq!(values.len(), 3);
        assert!(values.has_null());
        assert!(values.contains(&KeyValue::Int(2)));
        assert!(!values.contains(&KeyValue::Int(5)));
    }

    #[test]
    fn test_in_filter_merge() {
        let mut lhs = InFilterValues::new(KeyDomain::Utf8);
        insert(&mut lhs, Arc::new(StringArray::from(vec!["a", "b"])));
        let mut rhs = InFilterValues::new(KeyDomain::Utf8);
        insert(&mut rhs, Arc::new(StringArray::from(vec!["b", "c"])));
        lhs.merge_from(&rhs).unwrap();
        assert_eq!(lhs.len(), 3);
        assert!(lhs.contains(&KeyValue::Utf8("c")));

        let ints = InFilterValues::new(KeyDomain::Int);
        assert!(lhs.merge_from(&ints).is_err());
    }

    #[test]
    fn test_in_filter_rejects_other_domain() {
        let mut values = InFilterValues::new(KeyDomain::Utf8);
        let array = Arc::new(Int64Array::from(vec![1])) as ArrayRef;
        let view = KeyColumnView::try_new(&array).unwrap();
        assert!(values.insert_view(&view).unwrap_err().contains("type mismatch"));
    }
}
