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
//! Bloom runtime filter values.
//!
//! Responsibilities:
//! - Implements a split-block bloom filter (eight 32-bit words per bucket) over key hashes.
//! - Keeps hashes collected before allocation so an IN set can be converted in place.
//! - Merges filters of different geometry by widening the smaller directory.
//!
//! Key exported interfaces:
//! - Types: `BloomFilterValues`.
//!
//! Current limitations:
//! - Filter geometry is derived from the element count only; no false-positive target is tuned.

use super::in_filter::InFilterValues;
use super::key_column::{KeyColumnView, KeyDomain, KeyValue};

const SALT: [u32; 8] = [
    0x47b6137b, 0x44974d91, 0x8824ad5b, 0xa2b7289d, 0x705495c7, 0x2df1424b, 0x9efc4947, 0x5c6bfb31,
];
const BUCKET_BYTES_LOG2: i32 = 5;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SimdBlockFilter {
    log_num_buckets: i32,
    directory_mask: u32,
    directory: Vec<u32>,
}

fn ceil_log2(v: u64) -> i32 {
    if v <= 1 {
        return 0;
    }
    64 - (v - 1).leading_zeros() as i32
}

fn floor_log2(v: u64) -> i32 {
    if v == 0 {
        return 0;
    }
    63 - v.leading_zeros() as i32
}

impl SimdBlockFilter {
    /// Size for `num_elements` keys at roughly one byte per key, clamped to
    /// `[min_bytes, max_bytes]`.
    pub(crate) fn init(num_elements: u64, min_bytes: u64, max_bytes: u64) -> Self {
        let mut log_heap_space = ceil_log2(num_elements.max(1));
        log_heap_space = log_heap_space.max(ceil_log2(min_bytes));
        log_heap_space = log_heap_space.min(floor_log2(max_bytes.max(1)));
        let log_num_buckets = std::cmp::max(1, log_heap_space - BUCKET_BYTES_LOG2);
        let directory_mask = ((1u64 << log_num_buckets) - 1) as u32;
        let bucket_count = 1usize << log_num_buckets;
        Self {
            log_num_buckets,
            directory_mask,
            directory: vec![0u32; bucket_count * 8],
        }
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.directory.len() * 4
    }

    /// Same filter over `2^log_num_buckets` buckets. Bucket `b` of the wider directory holds
    /// the bits of bucket `b & directory_mask`, so no inserted hash is lost.
    fn widened(&self, log_num_buckets: i32) -> SimdBlockFilter {
        let bucket_count = 1usize << log_num_buckets;
        let mut directory = vec![0u32; bucket_count * 8];
        for (bucket, words) in directory.chunks_mut(8).enumerate() {
            let src = ((bucket as u32) & self.directory_mask) as usize * 8;
            words.copy_from_slice(&self.directory[src..src + 8]);
        }
        SimdBlockFilter {
            log_num_buckets,
            directory_mask: ((1u64 << log_num_buckets) - 1) as u32,
            directory,
        }
    }

    /// OR `other` into this filter, widening the smaller geometry to the larger one.
    pub(crate) fn merge_from(&mut self, other: &SimdBlockFilter) {
        if other.log_num_buckets > self.log_num_buckets {
            *self = self.widened(other.log_num_buckets);
        }
        let widened;
        let src = if other.log_num_buckets < self.log_num_buckets {
            widened = other.widened(self.log_num_buckets);
            &widened
        } else {
            other
        };
        for (dst, src) in self.directory.iter_mut().zip(src.directory.iter()) {
            *dst |= *src;
        }
    }

    // Bucket from the low word, masks from the high word: masks do not depend on geometry.
    fn insert_hash(&mut self, hash: u64) {
        let bucket_idx = (hash as u32) & self.directory_mask;
        let key = (hash >> 32) as u32;
        let masks = make_mask(key);
        let base = bucket_idx as usize * 8;
        for (i, mask) in masks.iter().enumerate() {
            self.directory[base + i] |= *mask;
        }
    }

    fn test_hash(&self, hash: u64) -> bool {
        let bucket_idx = (hash as u32) & self.directory_mask;
        let key = (hash >> 32) as u32;
        let masks = make_mask(key);
        let base = bucket_idx as usize * 8;
        masks
            .iter()
            .enumerate()
            .all(|(i, mask)| (self.directory[base + i] & *mask) != 0)
    }
}

fn make_mask(key: u32) -> [u32; 8] {
    let mut masks = [0u32; 8];
    for (i, salt) in SALT.iter().enumerate() {
        let v = key.wrapping_mul(*salt) >> 27;
        masks[i] = 1u32 << v;
    }
    masks
}

#[derive(Clone, Debug)]
/// Probabilistic membership over build keys of one domain.
pub struct BloomFilterValues {
    domain: KeyDomain,
    bf: Option<SimdBlockFilter>,
    pending_hashes: Vec<u64>,
    has_null: bool,
}

impl BloomFilterValues {
    pub fn new(domain: KeyDomain) -> Self {
        Self {
            domain,
            bf: None,
            pending_hashes: Vec::new(),
            has_null: false,
        }
    }

    /// Unallocated filter carrying the hashes of values already collected elsewhere.
    pub fn with_pending(domain: KeyDomain, pending_hashes: Vec<u64>, has_null: bool) -> Self {
        Self {
            domain,
            bf: None,
            pending_hashes,
            has_null,
        }
    }

    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    pub fn is_allocated(&self) -> bool {
        self.bf.is_some()
    }

    pub fn has_null(&self) -> bool {
        self.has_null
    }

    pub fn byte_size(&self) -> usize {
        self.bf.as_ref().map(|bf| bf.byte_size()).unwrap_or(0)
    }

    pub fn allocate(
        &mut self,
        num_elements: u64,
        min_bytes: u64,
        max_bytes: u64,
    ) -> Result<(), String> {
        if self.bf.is_some() {
            return Err("runtime bloom filter already allocated".to_string());
        }
        let mut bf = SimdBlockFilter::init(num_elements, min_bytes, max_bytes);
        for hash in self.pending_hashes.drain(..) {
            bf.insert_hash(hash);
        }
        self.bf = Some(bf);
        Ok(())
    }

    pub fn insert_view(&mut self, view: &KeyColumnView<'_>) -> Result<(), String> {
        if view.domain() != self.domain {
            return Err(format!(
                "runtime bloom filter type mismatch: filter={:?} column={:?}",
                self.domain,
                view.domain()
            ));
        }
        let Some(bf) = self.bf.as_mut() else {
            return Err("runtime bloom filter is not allocated".to_string());
        };
        for row in 0..view.len() {
            match view.value_at(row) {
                Some(value) => bf.insert_hash(value.hash()),
                None => self.has_null = true,
            }
        }
        Ok(())
    }

    pub fn contains(&self, value: &KeyValue<'_>) -> bool {
        if value.domain() != self.domain {
            return false;
        }
        match self.bf.as_ref() {
            Some(bf) => bf.test_hash(value.hash()),
            None => false,
        }
    }

    pub fn merge_from(&mut self, other: &BloomFilterValues) -> Result<(), String> {
        if self.domain != other.domain {
            return Err("runtime bloom filter merge type mismatch".to_string());
        }
        self.has_null |= other.has_null;
        match (self.bf.as_mut(), other.bf.as_ref()) {
            (Some(lhs), Some(rhs)) => {
                lhs.merge_from(rhs);
                Ok(())
            }
            _ => Err("runtime bloom filter merge requires allocated filters".to_string()),
        }
    }

    /// Fold the values of an exact set into this filter.
    pub fn merge_in_values(&mut self, other: &InFilterValues) -> Result<(), String> {
        if self.domain != other.domain() {
            return Err("runtime bloom filter merge type mismatch".to_string());
        }
        let Some(bf) = self.bf.as_mut() else {
            return Err("runtime bloom filter merge requires allocated filters".to_string());
        };
        for hash in other.hashes() {
            bf.insert_hash(hash);
        }
        self.has_null |= other.has_null();
        Ok(())
    }
}
