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
use std::fmt;
use std::str::FromStr;

/// Runtime filter id assigned by the planner.
///
/// The id is unique within one query and is the key under which a built filter is published
/// to consumers and handed over between sibling build instances.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FilterId(pub i32);

impl FilterId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for FilterId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<FilterId> for i32 {
    fn from(value: FilterId) -> Self {
        value.0
    }
}

impl FromStr for FilterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s
            .parse::<i32>()
            .map_err(|e| format!("invalid runtime filter id string '{}': {}", s, e))?;
        Ok(Self(v))
    }
}

#[cfg(test)]
mod tests {
    use super::FilterId;

    #[test]
    fn test_filter_id_parse_and_display() {
        let id: FilterId = "42".parse().unwrap();
        assert_eq!(id, FilterId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("x1".parse::<FilterId>().unwrap_err().contains("x1"));
    }
}
