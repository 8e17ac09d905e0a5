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
//! Typed read access to runtime-filter key columns.
//!
//! Every supported arrow type is folded into one of four key domains so filter
//! representations only deal with `i64`, `f64`, `bool` and `str` values.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int8Array,
    Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt8Array,
    UInt16Array, UInt32Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use twox_hash::XxHash64;

const KEY_HASH_SEED: u64 = 0x811C_9DC5;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyDomain {
    Int,
    Float,
    Bool,
    Utf8,
}

impl KeyDomain {
    pub fn from_data_type(data_type: &DataType) -> Result<Self, String> {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::Date32
            | DataType::Timestamp(_, _) => Ok(KeyDomain::Int),
            DataType::Float32 | DataType::Float64 => Ok(KeyDomain::Float),
            DataType::Boolean => Ok(KeyDomain::Bool),
            DataType::Utf8 | DataType::LargeUtf8 => Ok(KeyDomain::Utf8),
            other => Err(format!("unsupported runtime filter key type: {:?}", other)),
        }
    }
}

/// One non-null key value borrowed from a column.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KeyValue<'a> {
    Int(i64),
    /// Always canonical: `-0.0` is stored as `0.0` and every NaN as the same NaN.
    Float(f64),
    Bool(bool),
    Utf8(&'a str),
}

impl KeyValue<'_> {
    pub fn domain(&self) -> KeyDomain {
        match self {
            KeyValue::Int(_) => KeyDomain::Int,
            KeyValue::Float(_) => KeyDomain::Float,
            KeyValue::Bool(_) => KeyDomain::Bool,
            KeyValue::Utf8(_) => KeyDomain::Utf8,
        }
    }

    pub fn hash(&self) -> u64 {
        match self {
            KeyValue::Int(v) => XxHash64::oneshot(KEY_HASH_SEED, &v.to_le_bytes()),
            KeyValue::Float(v) => XxHash64::oneshot(KEY_HASH_SEED, &v.to_bits().to_le_bytes()),
            KeyValue::Bool(v) => XxHash64::oneshot(KEY_HASH_SEED, &[*v as u8]),
            KeyValue::Utf8(v) => XxHash64::oneshot(KEY_HASH_SEED, v.as_bytes()),
        }
    }
}

pub fn canonical_float(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

pub enum KeyColumnView<'a> {
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    UInt8(&'a UInt8Array),
    UInt16(&'a UInt16Array),
    UInt32(&'a UInt32Array),
    Date32(&'a Date32Array),
    TimestampSecond(&'a TimestampSecondArray),
    TimestampMillisecond(&'a TimestampMillisecondArray),
    TimestampMicrosecond(&'a TimestampMicrosecondArray),
    TimestampNanosecond(&'a TimestampNanosecondArray),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Boolean(&'a BooleanArray),
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
}

fn downcast<'a, T: Array + 'static>(array: &'a ArrayRef, expected: &str) -> Result<&'a T, String> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        format!(
            "runtime filter key column type mismatch: expected {}, got {:?}",
            expected,
            array.data_type()
        )
    })
}

impl<'a> KeyColumnView<'a> {
    pub fn try_new(array: &'a ArrayRef) -> Result<Self, String> {
        let view = match array.data_type() {
            DataType::Int8 => KeyColumnView::Int8(downcast(array, "Int8")?),
            DataType::Int16 => KeyColumnView::Int16(downcast(array, "Int16")?),
            DataType::Int32 => KeyColumnView::Int32(downcast(array, "Int32")?),
            DataType::Int64 => KeyColumnView::Int64(downcast(array, "Int64")?),
            DataType::UInt8 => KeyColumnView::UInt8(downcast(array, "UInt8")?),
            DataType::UInt16 => KeyColumnView::UInt16(downcast(array, "UInt16")?),
            DataType::UInt32 => KeyColumnView::UInt32(downcast(array, "UInt32")?),
            DataType::Date32 => KeyColumnView::Date32(downcast(array, "Date32")?),
            DataType::Timestamp(TimeUnit::Second, _) => {
                KeyColumnView::TimestampSecond(downcast(array, "Timestamp(Second)")?)
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                KeyColumnView::TimestampMillisecond(downcast(array, "Timestamp(Millisecond)")?)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                KeyColumnView::TimestampMicrosecond(downcast(array, "Timestamp(Microsecond)")?)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                KeyColumnView::TimestampNanosecond(downcast(array, "Timestamp(Nanosecond)")?)
            }
            DataType::Float32 => KeyColumnView::Float32(downcast(array, "Float32")?),
            DataType::Float64 => KeyColumnView::Float64(downcast(array, "Float64")?),
            DataType::Boolean => KeyColumnView::Boolean(downcast(array, "Boolean")?),
            DataType::Utf8 => KeyColumnView::Utf8(downcast(array, "Utf8")?),
            DataType::LargeUtf8 => KeyColumnView::LargeUtf8(downcast(array, "LargeUtf8")?),
            other => return Err(format!("unsupported runtime filter key type: {:?}", other)),
        };
        Ok(view)
    }

    fn array(&self) -> &dyn Array {
        match self {
            KeyColumnView::Int8(a) => *a,
            KeyColumnView::Int16(a) => *a,
            KeyColumnView::Int32(a) => *a,
            KeyColumnView::Int64(a) => *a,
            KeyColumnView::UInt8(a) => *a,
            KeyColumnView::UInt16(a) => *a,
            KeyColumnView::UInt32(a) => *a,
            KeyColumnView::Date32(a) => *a,
            KeyColumnView::TimestampSecond(a) => *a,
            KeyColumnView::TimestampMillisecond(a) => *a,
            KeyColumnView::TimestampMicrosecond(a) => *a,
            KeyColumnView::TimestampNanosecond(a) => *a,
            KeyColumnView::Float32(a) => *a,
            KeyColumnView::Float64(a) => *a,
            KeyColumnView::Boolean(a) => *a,
            KeyColumnView::Utf8(a) => *a,
            KeyColumnView::LargeUtf8(a) => *a,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        match self {
            KeyColumnView::Float32(_) | KeyColumnView::Float64(_) => KeyDomain::Float,
            KeyColumnView::Boolean(_) => KeyDomain::Bool,
            KeyColumnView::Utf8(_) | KeyColumnView::LargeUtf8(_) => KeyDomain::Utf8,
            _ => KeyDomain::Int,
        }
    }

    pub fn len(&self) -> usize {
        self.array().len()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.array().is_null(row)
    }

    /// Value at `row`, `None` for SQL null.
    pub fn value_at(&self, row: usize) -> Option<KeyValue<'a>> {
        if self.is_null(row) {
            return None;
        }
        let value = match *self {
            KeyColumnView::Int8(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::Int16(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::Int32(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::Int64(a) => KeyValue::Int(a.value(row)),
            KeyColumnView::UInt8(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::UInt16(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::UInt32(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::Date32(a) => KeyValue::Int(a.value(row) as i64),
            KeyColumnView::TimestampSecond(a) => KeyValue::Int(a.value(row)),
            KeyColumnView::TimestampMillisecond(a) => KeyValue::Int(a.value(row)),
            KeyColumnView::TimestampMicrosecond(a) => KeyValue::Int(a.value(row)),
            KeyColumnView::TimestampNanosecond(a) => KeyValue::Int(a.value(row)),
            KeyColumnView::Float32(a) => KeyValue::Float(canonical_float(a.value(row) as f64)),
            KeyColumnView::Float64(a) => KeyValue::Float(canonical_float(a.value(row))),
            KeyColumnView::Boolean(a) => KeyValue::Bool(a.value(row)),
            KeyColumnView::Utf8(a) => KeyValue::Utf8(a.value(row)),
            KeyColumnView::LargeUtf8(a) => KeyValue::Utf8(a.value(row)),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, BinaryArray, Float64Array, Int16Array, StringArray};
    use arrow::datatypes::DataType;

    use super::{KeyColumnView, KeyDomain, KeyValue};

    #[test]
    fn test_int_widths_share_domain_and_hash() {
        let narrow = Arc::new(Int16Array::from(vec![Some(7), None])) as ArrayRef;
        let view = KeyColumnView::try_new(&narrow).unwrap();
        assert_eq!(view.domain(), KeyDomain::Int);
        assert_eq!(view.value_at(0), Some(KeyValue::Int(7)));
        assert_eq!(view.value_at(1), None);
        assert_eq!(view.value_at(0).unwrap().hash(), KeyValue::Int(7).hash());
    }

    #[test]
    fn test_float_zero_is_canonical() {
        let array = Arc::new(Float64Array::from(vec![-0.0, 0.0])) as ArrayRef;
        let view = KeyColumnView::try_new(&array).unwrap();
        assert_eq!(
            view.value_at(0).unwrap().hash(),
            view.value_at(1).unwrap().hash()
        );
    }

    #[test]
    fn test_utf8_and_unsupported_types() {
        let array = Arc::new(StringArray::from(vec!["a"])) as ArrayRef;
        let view = KeyColumnView::try_new(&array).unwrap();
        assert!(matches!(view.value_at(0), Some(KeyValue::Utf8("a"))));

        let binary = Arc::new(BinaryArray::from(vec![b"a".as_ref()])) as ArrayRef;
        assert!(KeyColumnView::try_new(&binary).is_err());
        assert!(KeyDomain::from_data_type(&DataType::Binary).is_err());
    }
}
