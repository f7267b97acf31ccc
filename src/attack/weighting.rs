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


//! Per-pixel weighting of the distortion term
//!
//! The base attack penalizes every pixel equally. A sensitivity map assigns each
//! pixel a non-negative weight so that changes to sensitive regions become more
//! expensive than changes elsewhere.

use std::fmt::Debug;

use ndarray::{ArrayD, Axis, IxDyn, Slice};

use super::error::AttackError;

/// Strategy that supplies the weights of the distortion term for one chunk of the input.
pub trait PixelWeighting: Debug {
    /// Returns the weights for samples `offset..offset + batch_shape[0]` of the attacked
    /// input, with the full shape ``batch_shape``. ``None`` stands for uniform weights.
    fn weights(
        &self,
        offset: usize,
        batch_shape: &[usize],
    ) -> Result<Option<ArrayD<f64>>, AttackError>;

    /// Checks that weights can be provided for an input of shape ``input_shape``.
    fn validate(&self, input_shape: &[usize]) -> Result<(), AttackError> {
        self.weights(0, input_shape).map(|_| ())
    }
}

/// Every pixel weighs 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Uniform;

impl PixelWeighting for Uniform {
    fn weights(
        &self,
        _offset: usize,
        _batch_shape: &[usize],
    ) -> Result<Option<ArrayD<f64>>, AttackError> {
        Ok(None)
    }
}

/// Weights every pixel with an externally computed sensitivity value.
///
/// The map has either the shape of one sample, in which case it is shared by all
/// samples, or the shape of the whole input collection.
#[derive(Clone, Debug, PartialEq)]
pub struct SensitivityMap {
    map: ArrayD<f64>,
}

impl SensitivityMap {
    pub fn new(map: ArrayD<f64>) -> Result<SensitivityMap, AttackError> {
        if let Some((index, value)) = map
            .iter()
            .copied()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || *v < 0.)
        {
            return Err(AttackError::Config(format!(
                "sensitivity map entry {} at index {} must be finite and non-negative",
                value, index
            )));
        }
        Ok(SensitivityMap { map })
    }

    pub fn map(&self) -> &ArrayD<f64> {
        &self.map
    }

    fn shape_error(&self, offset: usize, batch_shape: &[usize]) -> AttackError {
        AttackError::WeightShape {
            weights: self.map.shape().to_vec(),
            batch: batch_shape.to_vec(),
            offset,
        }
    }
}

impl PixelWeighting for SensitivityMap {
    fn weights(
        &self,
        offset: usize,
        batch_shape: &[usize],
    ) -> Result<Option<ArrayD<f64>>, AttackError> {
        let (&n, sample_shape) = batch_shape
            .split_first()
            .ok_or_else(|| self.shape_error(offset, batch_shape))?;

        if self.map.shape() == sample_shape {
            let shared = self
                .map
                .broadcast(IxDyn(batch_shape))
                .ok_or_else(|| self.shape_error(offset, batch_shape))?;
            return Ok(Some(shared.to_owned()));
        }

        if self.map.ndim() == batch_shape.len()
            && &self.map.shape()[1..] == sample_shape
            && offset + n <= self.map.shape()[0]
        {
            return Ok(Some(
                self.map
                    .slice_axis(Axis(0), Slice::from(offset..offset + n))
                    .to_owned(),
            ));
        }

        Err(self.shape_error(offset, batch_shape))
    }
}
