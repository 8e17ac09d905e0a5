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
//! Min/max runtime filter values.
//!
//! Responsibilities:
//! - Tracks the running lower and upper bound of build keys in one domain.
//! - Widens bounds when partial filters from other build instances are merged.
//!
//! Key exported interfaces:
//! - Types: `MinMaxValue`, `MinMaxFilterValues`.

use std::cmp::Ordering;

use super::key_column::{KeyColumnView, KeyDomain, KeyValue};

#[derive(Clone, Debug, PartialEq)]
/// Owned bound value.
pub enum MinMaxValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Utf8(String),
}

impl MinMaxValue {
    fn from_key(value: &KeyValue<'_>) -> Self {
        match value {
            KeyValue::Int(v) => MinMaxValue::Int(*v),
            KeyValue::Float(v) => MinMaxValue::Float(*v),
            KeyValue::Bool(v) => MinMaxValue::Bool(*v),
            KeyValue::Utf8(v) => MinMaxValue::Utf8((*v).to_string()),
        }
    }

    fn cmp_key(&self, value: &KeyValue<'_>) -> Option<Ordering> {
        match (self, value) {
            (MinMaxValue::Int(a), KeyValue::Int(b)) => Some(a.cmp(b)),
            (MinMaxValue::Float(a), KeyValue::Float(b)) => a.partial_cmp(b),
            (MinMaxValue::Bool(a), KeyValue::Bool(b)) => Some(a.cmp(b)),
            (MinMaxValue::Utf8(a), KeyValue::Utf8(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }

    fn as_key(&self) -> KeyValue<'_> {
        match self {
            MinMaxValue::Int(v) => KeyValue::Int(*v),
            MinMaxValue::Float(v) => KeyValue::Float(*v),
            MinMaxValue::Bool(v) => KeyValue::Bool(*v),
            MinMaxValue::Utf8(v) => KeyValue::Utf8(v.as_str()),
        }
    }
}

#[derive(Clone, Debug)]
/// Range bounds over build keys; empty until the first non-null key arrives.
pub struct MinMaxFilterValues {
    domain: KeyDomain,
    min: Option<MinMaxValue>,
    max: Option<MinMaxValue>,
    has_null: bool,
}

impl MinMaxFilterValues {
    pub fn new(domain: KeyDomain) -> Self {
        Self {
            domain,
            min: None,
            max: None,
            has_null: false,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    pub fn has_null(&self) -> bool {
        self.has_null
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    pub fn min(&self) -> Option<&MinMaxValue> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&MinMaxValue> {
        self.max.as_ref()
    }

    pub fn insert_view(&mut self, view: &KeyColumnView<'_>) -> Result<(), String> {
        if view.domain() != self.domain {
            return Err(format!(
                "runtime min/max filter type mismatch: filter={:?} column={:?}",
                self.domain,
                view.domain()
            ));
        }
        for row in 0..view.len() {
            match view.value_at(row) {
                Some(KeyValue::Float(v)) if v.is_nan() => {}
                Some(value) => self.update(&value),
                None => self.has_null = true,
            }
        }
        Ok(())
    }

    fn update(&mut self, value: &KeyValue<'_>) {
        let lower = match self.min.as_ref() {
            Some(min) => min.cmp_key(value) == Some(Ordering::Greater),
            None => true,
        };
        if lower {
            self.min = Some(MinMaxValue::from_key(value));
        }
        let higher = match self.max.as_ref() {
            Some(max) => max.cmp_key(value) == Some(Ordering::Less),
            None => true,
        };
        if higher {
            self.max = Some(MinMaxValue::from_key(value));
        }
    }

    /// True when `value` lies inside `[min, max]`.
    pub fn contains(&self, value: &KeyValue<'_>) -> bool {
        let (Some(min), Some(max)) = (self.min.as_ref(), self.max.as_ref()) else {
            return false;
        };
        let above_min = matches!(min.cmp_key(value), Some(Ordering::Less | Ordering::Equal));
        let below_max = matches!(max.cmp_key(value), Some(Ordering::Greater | Ordering::Equal));
        above_min && below_max
    }

    pub fn merge_from(&mut self, other: &MinMaxFilterValues) -> Result<(), String> {
        if self.domain != other.domain {
            return Err("runtime min/max filter merge type mismatch".to_string());
        }
        self.has_null |= other.has_null;
        if let Some(min) = other.min.as_ref() {
            self.update(&min.as_key());
        }
        if let Some(max) = other.max.as_ref() {
            self.update(&max.as_key());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};

    use super::{MinMaxFilterValues, MinMaxValue};
    use crate::exec::runtime_filter::key_column::{KeyColumnView, KeyDomain, KeyValue};

    fn insert(values: &mut MinMaxFilterValues, array: ArrayRef) {
        let view = KeyColumnView::try_new(&array).unwrap();
        values.insert_view(&view).unwrap();
    }

    #[test]
    fn test_min_max_tracks_bounds_and_nulls() {
        let mut values = MinMaxFilterValues::new(KeyDomain::Int);
        assert!(!values.contains(&KeyValue::Int(0)));
        insert(
            &mut values,
            Arc::new(Int32Array::from(vec![Some(5), None, Some(-3), Some(9)])) as ArrayRef,
        );
        assert_eq!(values.min(), Some(&MinMaxValue::Int(-3)));
        assert_eq!(values.max(), Some(&MinMaxValue::Int(9)));
        assert!(values.has_null());
        assert!(values.contains(&KeyValue::Int(0)));
        assert!(!values.contains(&KeyValue::Int(10)));
    }

    #[test]
    fn test_min_max_skips_nan() {
        let mut values = MinMaxFilterValues::new(KeyDomain::Float);
        insert(
            &mut values,
            Arc::new(Float64Array::from(vec![f64::NAN, 1.5, 0.5])) as ArrayRef,
        );
        assert_eq!(values.min(), Some(&MinMaxValue::Float(0.5)));
        assert_eq!(values.max(), Some(&MinMaxValue::Float(1.5)));
    }

    #[test]
    fn test_min_max_merge_widens() {
        let mut lhs = MinMaxFilterValues::new(KeyDomain::Utf8);
        insert(&mut lhs, Arc::new(StringArray::from(vec!["m", "p"])) as ArrayRef);
        let mut rhs = MinMaxFilterValues::new(KeyDomain::Utf8);
        insert(&mut rhs, Arc::new(StringArray::from(vec!["a"])) as ArrayRef);
        lhs.merge_from(&rhs).unwrap();
        assert!(lhs.contains(&KeyValue::Utf8("b")));
        assert!(!lhs.contains(&KeyValue::Utf8("z")));
        assert!(lhs.merge_from(&MinMaxFilterValues::new(KeyDomain::Int)).is_err());
    }
}
