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
//! Build-key expression evaluation.
//!
//! Responsibilities:
//! - Stores expression trees in an arena addressed by `ExprId`.
//! - Evaluates build-key expressions over a chunk and records where the result column lives.
//!
//! Key exported interfaces:
//! - Types: `ExprArena`, `ExprNode`, `ExprContext`.
//!
//! Current limitations:
//! - Only column references, literals, casts and integer addition are supported.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray, new_null_array};
use arrow::compute::cast;
use arrow::compute::kernels::numeric::add;
use arrow::datatypes::DataType;

use crate::exec::chunk::Chunk;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Int64(i64),
    Utf8(String),
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    /// Reads column `index` of the input chunk as is.
    ColumnRef(usize),
    Literal(LiteralValue),
    Cast { child: ExprId, to: DataType },
    Add(ExprId, ExprId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ExprNode) -> ExprId {
        self.nodes.push(node);
        ExprId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
        let node = self
            .node(id)
            .ok_or_else(|| format!("expr id {} not found in arena", id.0))?;
        match node {
            ExprNode::ColumnRef(index) => chunk.column(*index),
            ExprNode::Literal(value) => Ok(literal_array(value, chunk.len())),
            ExprNode::Cast { child, to } => {
                let input = self.eval(*child, chunk)?;
                cast(&input, to).map_err(|e| e.to_string())
            }
            ExprNode::Add(lhs, rhs) => {
                let lhs = self.eval(*lhs, chunk)?;
                let rhs = self.eval(*rhs, chunk)?;
                add(&lhs, &rhs).map_err(|e| e.to_string())
            }
        }
    }
}

fn literal_array(value: &LiteralValue, len: usize) -> ArrayRef {
    match value {
        LiteralValue::Null => new_null_array(&DataType::Null, len),
        LiteralValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
        LiteralValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
    }
}

/// One build-key expression plus the position of its last evaluated result.
///
/// The join operator runs `execute` over every build chunk; runtime filters then read the
/// cached column through `last_result_column_id` instead of evaluating again.
#[derive(Clone, Debug)]
pub struct ExprContext {
    arena: Arc<ExprArena>,
    root: ExprId,
    last_result_column_id: Option<usize>,
}

impl ExprContext {
    pub fn new(arena: Arc<ExprArena>, root: ExprId) -> Self {
        Self {
            arena,
            root,
            last_result_column_id: None,
        }
    }

    /// Shorthand for a context that reads column `index` directly.
    pub fn column_ref(index: usize) -> Self {
        let mut arena = ExprArena::new();
        let root = arena.push(ExprNode::ColumnRef(index));
        Self::new(Arc::new(arena), root)
    }

    /// Evaluate over `chunk`. Column references resolve in place, computed results are
    /// appended to the chunk. Returns the result column index.
    pub fn execute(&mut self, chunk: &mut Chunk) -> Result<usize, String> {
        let column_id = match self.arena.node(self.root) {
            Some(ExprNode::ColumnRef(index)) => {
                if *index >= chunk.num_columns() {
                    return Err(format!(
                        "build expr column {} out of range (num_columns={})",
                        index,
                        chunk.num_columns()
                    ));
                }
                *index
            }
            Some(_) => {
                let array = self.arena.eval(self.root, chunk)?;
                let name = format!("__build_expr_{}", self.root.0);
                chunk.append_column(&name, array)?
            }
            None => return Err(format!("expr id {} not found in arena", self.root.0)),
        };
        self.last_result_column_id = Some(column_id);
        Ok(column_id)
    }

    pub fn last_result_column_id(&self) -> Option<usize> {
        self.last_result_column_id
    }

    pub fn root(&self) -> ExprId {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Int32Array, Int64Array};
    use arrow::datatypes::DataType;

    use super::{ExprArena, ExprContext, ExprNode, LiteralValue};
    use crate::exec::chunk::Chunk;

    fn int32_chunk(values: Vec<Option<i32>>) -> Chunk {
        Chunk::try_from_columns(vec![("k", Arc::new(Int32Array::from(values)) as ArrayRef)])
            .unwrap()
    }

    #[test]
    fn test_column_ref_does_not_append() {
        let mut chunk = int32_chunk(vec![Some(1), None]);
        let mut ctx = ExprContext::column_ref(0);
        assert_eq!(ctx.last_result_column_id(), None);
        assert_eq!(ctx.execute(&mut chunk).unwrap(), 0);
        assert_eq!(ctx.last_result_column_id(), Some(0));
        assert_eq!(chunk.num_columns(), 1);
    }

    #[test]
    fn test_computed_expr_appends_result() {
        let mut arena = ExprArena::new();
        let col = arena.push(ExprNode::ColumnRef(0));
        let wide = arena.push(ExprNode::Cast {
            child: col,
            to: DataType::Int64,
        });
        let one = arena.push(ExprNode::Literal(LiteralValue::Int64(1)));
        let root = arena.push(ExprNode::Add(wide, one));
        let mut ctx = ExprContext::new(Arc::new(arena), root);

        let mut chunk = int32_chunk(vec![Some(1), None, Some(7)]);
        let id = ctx.execute(&mut chunk).unwrap();
        assert_eq!(id, 1);
        let result = chunk.column(id).unwrap();
        let result = result.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(result.value(0), 2);
        assert!(result.is_null(1));
        assert_eq!(result.value(2), 8);
    }

    #[test]
    fn test_column_ref_out_of_range() {
        let mut chunk = int32_chunk(vec![Some(1)]);
        let mut ctx = ExprContext::column_ref(3);
        assert!(ctx.execute(&mut chunk).unwrap_err().contains("out of range"));
        assert_eq!(ctx.last_result_column_id(), None);
    }
}
