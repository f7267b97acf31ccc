//   Copyright 2025 carlini-wagner developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.


//! Hyperparameters of the Carlini-Wagner L2 attack

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::AttackError;

/// Hyperparameters of the attack.
///
/// Missing fields take their default value when deserialized, so a configuration
/// file only needs to list the parameters that differ from [`AttackConfig::default`].
///
/// ```json
/// {
///   "binary_search_steps": 9,
///   "max_iterations": 500,
///   "learning_rate": 0.01
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Number of samples attacked simultaneously.
    pub batch_size: usize,
    /// Lower bound of valid pixel values.
    pub clip_min: f64,
    /// Upper bound of valid pixel values.
    pub clip_max: f64,
    /// Number of rounds of binary search for the tradeoff constant between the
    /// size of the perturbation and the confidence of the classification.
    pub binary_search_steps: usize,
    /// Maximum number of gradient steps per round. Larger values produce lower
    /// distortion; few iterations require a larger learning rate.
    pub max_iterations: usize,
    /// Abort a round when gradient descent stops making progress.
    pub abort_early: bool,
    /// Required logit margin of adversarial examples. Higher values produce
    /// examples with larger distortion that are more strongly misclassified.
    pub confidence: f64,
    /// Tradeoff constant of the first round. Irrelevant for many search steps,
    /// smaller values give lower distortion.
    pub initial_const: f64,
    /// Step size of the Adam optimizer.
    pub learning_rate: f64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            clip_min: 0.,
            clip_max: 1.,
            binary_search_steps: 5,
            max_iterations: 1_000,
            abort_early: true,
            confidence: 0.,
            initial_const: 1e-2,
            learning_rate: 5e-3,
        }
    }
}

impl AttackConfig {
    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<AttackConfig, AttackError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|err| {
            AttackError::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        AttackConfig::from_json(&contents)
    }

    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json(contents: &str) -> Result<AttackConfig, AttackError> {
        let config: AttackConfig = serde_json::from_str(contents)
            .map_err(|err| AttackError::Config(format!("malformed configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all parameters lie within their admissible ranges.
    pub fn validate(&self) -> Result<(), AttackError> {
        if self.batch_size == 0 {
            return Err(AttackError::Config("batch_size must be positive".into()));
        }
        if self.binary_search_steps == 0 {
            return Err(AttackError::Config(
                "binary_search_steps must be positive".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(AttackError::Config("max_iterations must be positive".into()));
        }
        if !(self.clip_min.is_finite() && self.clip_max.is_finite() && self.clip_min < self.clip_max)
        {
            return Err(AttackError::Config(format!(
                "clip range [{}, {}] is empty",
                self.clip_min, self.clip_max
            )));
        }
        if !(self.confidence >= 0.) {
            return Err(AttackError::Config("confidence must be non-negative".into()));
        }
        if !(self.initial_const > 0.) {
            return Err(AttackError::Config("initial_const must be positive".into()));
        }
        if !(self.learning_rate > 0.) {
            return Err(AttackError::Config("learning_rate must be positive".into()));
        }
        Ok(())
    }
}
