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


//! Errors raised by the attack

use thiserror::Error;

use crate::model::arch::ShapeError;

/// Invalid arguments detected before the optimization of a batch starts.
///
/// When an error is returned, no adversarial examples are produced for any sample.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum AttackError {
    #[error("Must provide target labels for a targeted attack")]
    MissingTargetLabels,
    #[error("Input value {value} at index {index} lies outside of [{clip_min}, {clip_max}]")]
    OutOfRange {
        index: usize,
        value: f64,
        clip_min: f64,
        clip_max: f64,
    },
    #[error("Label count mismatch: expected {expected}, got {got}")]
    LabelCount { expected: usize, got: usize },
    #[error("One-hot labels have {got} columns, the classifier has {expected} classes")]
    ClassCount { expected: usize, got: usize },
    #[error("Label {label} is out of bounds for {classes} classes")]
    LabelOutOfBounds { label: usize, classes: usize },
    #[error("Row {row} of the label matrix is not one-hot")]
    NotOneHot { row: usize },
    #[error("Weights of shape {weights:?} cannot be applied to samples {offset}.. of a batch of shape {batch:?}")]
    WeightShape {
        weights: Vec<usize>,
        batch: Vec<usize>,
        offset: usize,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Cannot record progress: {0}")]
    Progress(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}
