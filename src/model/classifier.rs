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

//! The interface between the attack and the model under attack

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD};

use super::arch::ShapeError;

/// A differentiable classifier.
///
/// The attack only needs two capabilities from a model: the raw scores (logits)
/// for a batch, and the gradient of a scalar function of those scores with respect
/// to the input batch. The latter is expressed as a vector-Jacobian product, which
/// lets any reverse-mode differentiation backend plug in.
pub trait Classifier {
    /// Computes the logits of shape `[n, classes]` for a batch of shape `[n, ...]`.
    fn logits(&self, batch: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ShapeError>;

    /// Back-propagates ``output_gradient`` (shape `[n, classes]`, the gradient of some scalar
    /// with respect to the logits of ``batch``) to the input. The result has the shape of ``batch``.
    fn input_gradient(
        &self,
        batch: ArrayViewD<'_, f64>,
        output_gradient: ArrayView2<'_, f64>,
    ) -> Result<ArrayD<f64>, ShapeError>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn logits(&self, batch: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ShapeError> {
        (**self).logits(batch)
    }

    fn input_gradient(
        &self,
        batch: ArrayViewD<'_, f64>,
        output_gradient: ArrayView2<'_, f64>,
    ) -> Result<ArrayD<f64>, ShapeError> {
        (**self).input_gradient(batch, output_gradient)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn logits(&self, batch: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ShapeError> {
        (**self).logits(batch)
    }

    fn input_gradient(
        &self,
        batch: ArrayViewD<'_, f64>,
        output_gradient: ArrayView2<'_, f64>,
    ) -> Result<ArrayD<f64>, ShapeError> {
        (**self).input_gradient(batch, output_gradient)
    }
}
