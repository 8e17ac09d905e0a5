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

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema, SchemaRef};

/// A chunk of data, consisting of multiple rows.
/// Wrapper around Arrow RecordBatch.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
}

impl Chunk {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Build a chunk from named columns. All columns must have the same length.
    pub fn try_from_columns(columns: Vec<(&str, ArrayRef)>) -> Result<Self, String> {
        let fields = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect::<Vec<_>>();
        let arrays = columns.into_iter().map(|(_, array)| array).collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| e.to_string())?;
        Ok(Self { batch })
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    pub fn column(&self, index: usize) -> Result<ArrayRef, String> {
        self.batch.columns().get(index).cloned().ok_or_else(|| {
            format!(
                "column index {} out of range (num_columns={})",
                index,
                self.batch.num_columns()
            )
        })
    }

    /// Append one column and return its index.
    pub fn append_column(&mut self, name: &str, array: ArrayRef) -> Result<usize, String> {
        if array.len() != self.len() {
            return Err(format!(
                "appended column {} has {} rows, chunk has {}",
                name,
                array.len(),
                self.len()
            ));
        }
        let schema = self.batch.schema();
        let mut fields = schema.fields().iter().cloned().collect::<Vec<_>>();
        fields.push(Arc::new(Field::new(name, array.data_type().clone(), true)));
        let mut arrays = self.batch.columns().to_vec();
        arrays.push(array);
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| e.to_string())?;
        self.batch = batch;
        Ok(self.batch.num_columns() - 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, StringArray};

    use super::Chunk;

    #[test]
    fn test_append_column_returns_new_index() {
        let mut chunk = Chunk::try_from_columns(vec![(
            "k",
            Arc::new(Int32Array::from(vec![1, 2, 3])) as ArrayRef,
        )])
        .unwrap();
        let idx = chunk
            .append_column(
                "v",
                Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef,
            )
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(chunk.num_columns(), 2);
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_append_column_length_mismatch() {
        let mut chunk = Chunk::try_from_columns(vec![(
            "k",
            Arc::new(Int32Array::from(vec![1, 2, 3])) as ArrayRef,
        )])
        .unwrap();
        let err = chunk
            .append_column("v", Arc::new(Int32Array::from(vec![1])) as ArrayRef)
            .unwrap_err();
        assert!(err.contains("has 1 rows"));
        assert!(chunk.column(5).is_err());
    }
}
