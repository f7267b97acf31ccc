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


//! Objective of the attack and its gradient

use float_ord::FloatOrd;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Zip};

/// Penalty that excludes the labelled class when searching for the strongest other class.
const LABEL_PENALTY: f64 = 10000.;

/// Per-sample loss terms and the gradients needed for back-propagation.
#[derive(Clone, Debug)]
pub struct LossOutput {
    /// Scalar objective `Σ const * classification + Σ l2_dist`.
    pub total: f64,
    /// Weighted squared distance between candidate and reference, per sample.
    pub l2_dist: Array1<f64>,
    /// Hinge loss on the logit margin, per sample.
    pub classification: Array1<f64>,
    /// Gradient of ``total`` with respect to the logits.
    pub logit_gradient: Array2<f64>,
    /// Gradient of the distortion term with respect to the candidate image.
    pub candidate_gradient: ArrayD<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossEvaluator {
    pub targeted: bool,
    pub confidence: f64,
}

impl LossEvaluator {
    pub fn new(targeted: bool, confidence: f64) -> LossEvaluator {
        LossEvaluator {
            targeted,
            confidence,
        }
    }

    /// Evaluates the loss of ``candidate`` (with ``logits``) against ``reference``.
    ///
    /// ``labels`` are one-hot rows, ``consts`` the per-sample tradeoff constants and
    /// ``weights`` optional per-pixel weights of the distortion with the shape of the batch.
    pub fn evaluate(
        &self,
        reference: ArrayViewD<'_, f64>,
        candidate: ArrayViewD<'_, f64>,
        labels: ArrayView2<'_, f64>,
        logits: ArrayView2<'_, f64>,
        consts: ArrayView1<'_, f64>,
        weights: Option<ArrayViewD<'_, f64>>,
    ) -> LossOutput {
        assert_eq!(reference.shape(), candidate.shape());
        assert_eq!(labels.shape(), logits.shape());
        assert_eq!(logits.nrows(), consts.len());

        let diff = &candidate - &reference;
        let (weighted_sq, candidate_gradient) = match weights {
            Some(w) => (&w * &diff * &diff, &w * &diff * 2.),
            None => (&diff * &diff, &diff * 2.),
        };
        let l2_dist: Array1<f64> = weighted_sq
            .axis_iter(Axis(0))
            .map(|sample| sample.sum())
            .collect();

        let mut classification = Array1::<f64>::zeros(logits.nrows());
        let mut logit_gradient = Array2::<f64>::zeros(logits.raw_dim());

        Zip::from(&mut classification)
            .and(logit_gradient.rows_mut())
            .and(labels.rows())
            .and(logits.rows())
            .and(&consts)
            .for_each(|loss, mut grad, label, logit, &c| {
                let real = label.dot(&logit);
                let (runner_up, other) = strongest_other(label, logit);
                let margin = if self.targeted {
                    other - real
                } else {
                    real - other
                };
                *loss = f64::max(0., margin + self.confidence);

                if *loss > 0. {
                    let sign = if self.targeted { 1. } else { -1. };
                    grad.zip_mut_with(&label, |g, &y| *g = -sign * c * y);
                    grad[runner_up] += sign * c * (1. - label[runner_up]);
                }
            });

        let total = (&consts * &classification).sum() + l2_dist.sum();

        LossOutput {
            total,
            l2_dist,
            classification,
            logit_gradient,
            candidate_gradient,
        }
    }
}

/// Returns the first index maximizing `(1 - label) * logit - label * 10000` and the maximum.
fn strongest_other(label: ArrayView1<'_, f64>, logit: ArrayView1<'_, f64>) -> (usize, f64) {
    label
        .iter()
        .zip(logit.iter())
        .map(|(&y, &l)| (1. - y) * l - y * LABEL_PENALTY)
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_idx, best), (idx, value)| {
            if FloatOrd(value) > FloatOrd(best) {
                (idx, value)
            } else {
                (best_idx, best)
            }
        })
}
