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


//! A single optimization step of the attack

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD};

use super::error::AttackError;
use super::loss::{LossEvaluator, LossOutput};
use super::optimizer::Adam;
use super::transform::SpaceTransform;
use crate::model::classifier::Classifier;

/// Values observed at the candidate of a step (before the modifier is updated).
#[derive(Clone, Debug)]
pub struct StepOutput {
    pub candidate: ArrayD<f64>,
    pub loss: f64,
    pub logits: Array2<f64>,
    pub l2_dist: Array1<f64>,
}

/// Everything fixed during the optimization of one batch.
#[derive(Debug)]
pub struct AttackStep<'a, C: ?Sized> {
    model: &'a C,
    transform: SpaceTransform,
    evaluator: LossEvaluator,
    tanh_original: ArrayD<f64>,
    reference: ArrayD<f64>,
    labels: ArrayView2<'a, f64>,
    weights: Option<ArrayViewD<'a, f64>>,
}

impl<'a, C: Classifier + ?Sized> AttackStep<'a, C> {
    pub fn new(
        model: &'a C,
        transform: SpaceTransform,
        evaluator: LossEvaluator,
        original: ArrayViewD<'_, f64>,
        labels: ArrayView2<'a, f64>,
        weights: Option<ArrayViewD<'a, f64>>,
    ) -> AttackStep<'a, C> {
        let tanh_original = transform.to_unconstrained(&original);
        let reference = transform.to_pixel(&tanh_original);
        AttackStep {
            model,
            transform,
            evaluator,
            tanh_original,
            reference,
            labels,
            weights,
        }
    }

    /// The original batch after a round trip through the unconstrained space.
    pub fn reference(&self) -> &ArrayD<f64> {
        &self.reference
    }

    /// Evaluates the objective at ``modifier`` and returns its gradient with respect to ``modifier``.
    pub fn evaluate(
        &self,
        modifier: &ArrayD<f64>,
        consts: ArrayView1<'_, f64>,
    ) -> Result<(StepOutput, ArrayD<f64>), AttackError> {
        let z = modifier + &self.tanh_original;
        let candidate = self.transform.to_pixel(&z);
        let logits = self.model.logits(candidate.view())?;

        let LossOutput {
            total,
            l2_dist,
            logit_gradient,
            candidate_gradient,
            ..
        } = self.evaluator.evaluate(
            self.reference.view(),
            candidate.view(),
            self.labels,
            logits.view(),
            consts,
            self.weights.as_ref().map(|w| w.view()),
        );

        let through_model = self
            .model
            .input_gradient(candidate.view(), logit_gradient.view())?;
        let gradient = (candidate_gradient + through_model) * self.transform.to_pixel_derivative(&z);

        Ok((
            StepOutput {
                candidate,
                loss: total,
                logits,
                l2_dist,
            },
            gradient,
        ))
    }

    /// Runs one Adam update of ``modifier`` in place.
    pub fn step(
        &self,
        modifier: &mut ArrayD<f64>,
        optimizer: &mut Adam,
        consts: ArrayView1<'_, f64>,
    ) -> Result<StepOutput, AttackError> {
        let (output, gradient) = self.evaluate(modifier, consts)?;
        optimizer.step(modifier, gradient.view());
        Ok(output)
    }
}
