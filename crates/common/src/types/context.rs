// TPD - Test Plan Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-thread run context.
//!
//! Each plan thread owns one [`RunContext`]. Elements read and write its
//! variables while they run, and the debugger hands it to frontends on a
//! status refresh so the current variable state can be displayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SampleResult;

/// Variables and bookkeeping visible to the elements of one plan thread
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunContext {
    thread_name: String,
    thread_number: u32,
    iteration: u64,
    variables: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    current_sampler: Option<String>,
    previous_result: Option<SampleResult>,
    sample_count: u64,
}

impl RunContext {
    /// Create an empty context for the given thread.
    pub fn new(thread_name: impl Into<String>, thread_number: u32) -> Self {
        Self { thread_name: thread_name.into(), thread_number, ..Default::default() }
    }

    /// Seed the context with properties shared by every thread of a run.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn thread_number(&self) -> u32 {
        self.thread_number
    }

    /// Zero-based iteration of the enclosing thread group.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u64) {
        self.iteration = iteration;
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Set a variable, returning the previous value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.variables.insert(name.into(), value.into())
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<String> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Replace every `${name}` with the value of variable `name`, falling back
    /// to the property of the same name. Unknown references are left as is.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.variable(name).or_else(|| self.property(name)) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Name of the sampler currently being executed, if any.
    pub fn current_sampler(&self) -> Option<&str> {
        self.current_sampler.as_deref()
    }

    pub fn set_current_sampler(&mut self, name: Option<String>) {
        self.current_sampler = name;
    }

    /// Result of the last completed sample on this thread.
    pub fn previous_result(&self) -> Option<&SampleResult> {
        self.previous_result.as_ref()
    }

    /// Record a completed sample.
    pub fn record_result(&mut self, result: SampleResult) {
        self.sample_count += 1;
        self.previous_result = Some(result);
    }

    /// Number of samples completed on this thread.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// JSON view of the context, suitable for display.
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
