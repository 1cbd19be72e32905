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

//! Sample results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of executing one sampler
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResult {
    label: String,
    success: bool,
    response_code: String,
    message: String,
    elapsed: Duration,
    assertion_failures: Vec<String>,
}

impl SampleResult {
    /// A successful sample with response code `200`.
    pub fn success(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            success: true,
            response_code: "200".into(),
            message: "OK".into(),
            elapsed: Duration::ZERO,
            assertion_failures: vec![],
        }
    }

    /// A failed sample.
    pub fn failure(
        label: impl Into<String>,
        response_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            success: false,
            response_code: response_code.into(),
            message: message.into(),
            elapsed: Duration::ZERO,
            assertion_failures: vec![],
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Record a failed assertion. The sample is marked as failed.
    pub fn fail_assertion(&mut self, message: impl Into<String>) {
        self.success = false;
        self.assertion_failures.push(message.into());
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn response_code(&self) -> &str {
        &self.response_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn assertion_failures(&self) -> &[String] {
        &self.assertion_failures
    }
}
