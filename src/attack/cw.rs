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


//! The Carlini-Wagner L2 attack
//!
//! The attack searches, for every sample, the smallest perturbation (in squared L2
//! distance) that changes the classification. The optimization runs in an unconstrained
//! space (see [`SpaceTransform`]), and an outer binary search tunes the per-sample
//! tradeoff constant between distortion and misclassification.

use std::ops::Range;
use std::path::Path;

use log::{debug, info, trace};
use ndarray::{Array1, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Slice, Zip};

use super::config::AttackConfig;
use super::error::AttackError;
use super::labels::{argmax_rows, get_or_guess_labels, Labels};
use super::loss::LossEvaluator;
use super::optimizer::Adam;
use super::step::AttackStep;
use super::transform::SpaceTransform;
use super::visitor::{
    count_successes, AttackConsole, AttackCsv, AttackVisitor, NoOpVis, RoundSummary,
};
use super::weighting::{PixelWeighting, SensitivityMap, Uniform};
use crate::linalg::select::set_with_mask;
use crate::model::arch::ShapeError;
use crate::model::classifier::Classifier;

/// Initial upper bound of the tradeoff constant, also marks "no success yet".
pub const UPPER_BOUND_INIT: f64 = 1e10;
/// Upper bounds below this value are considered found by the binary search.
pub const UPPER_BOUND_FOUND: f64 = 1e9;
/// Minimal relative decrease of the loss between two early-abort checks.
pub const ABORT_RATIO: f64 = 0.9999;
/// From this number of search steps on, the last round repeats the search at the upper bound.
pub const REPEAT_AT_UPPER_STEPS: usize = 10;

#[inline]
fn is_hit(targeted: bool, predicted: usize, label: usize) -> bool {
    if targeted {
        predicted == label
    } else {
        predicted != label
    }
}

/// Per-sample bounds and values of the tradeoff constant.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchBounds {
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
    pub consts: Array1<f64>,
}

impl SearchBounds {
    pub fn new(n: usize, initial_const: f64) -> SearchBounds {
        SearchBounds {
            lower: Array1::zeros(n),
            upper: Array1::from_elem(n, UPPER_BOUND_INIT),
            consts: Array1::from_elem(n, initial_const),
        }
    }

    /// Prepares the constants for round ``round`` of ``steps``.
    ///
    /// With many search steps, the last round uses the upper bound of every sample.
    pub fn start_round(&mut self, round: usize, steps: usize) {
        if steps >= REPEAT_AT_UPPER_STEPS && round + 1 == steps {
            self.consts = self.upper.clone();
        }
    }

    /// Bisects the constants after a round: samples in ``succeeded`` lower their upper bound
    /// to the current constant, all others raise their lower bound. While no upper bound
    /// has been found, the constant grows tenfold instead.
    pub fn update(&mut self, succeeded: ArrayView1<'_, bool>) {
        let failed = succeeded.mapv(|s| !s);

        let upper_min = Zip::from(&self.upper)
            .and(&self.consts)
            .map_collect(|&u, &c| u.min(c));
        let lower_max = Zip::from(&self.lower)
            .and(&self.consts)
            .map_collect(|&l, &c| l.max(c));
        self.upper = set_with_mask(&self.upper, &upper_min, &succeeded);
        self.lower = set_with_mask(&self.lower, &lower_max, &failed);

        let bounded = self.upper.mapv(|u| u < UPPER_BOUND_FOUND);
        let unbounded_failure = Zip::from(&bounded)
            .and(&failed)
            .map_collect(|&b, &f| !b && f);
        let mid = (&self.lower + &self.upper) / 2.;
        let grown = &self.consts * 10.;

        let consts = set_with_mask(&self.consts, &mid, &bounded);
        self.consts = set_with_mask(&consts, &grown, &unbounded_failure);
    }
}

/// Best distortion and class found per sample. ``None`` marks samples without success.
#[derive(Clone, Debug, PartialEq)]
pub struct BestState {
    pub l2: Array1<f64>,
    pub class: Array1<Option<usize>>,
}

impl BestState {
    pub fn new(n: usize) -> BestState {
        BestState {
            l2: Array1::from_elem(n, f64::INFINITY),
            class: Array1::from_elem(n, None),
        }
    }

    /// Selects the samples that hit their goal with a strictly smaller distortion.
    pub fn improvements(&self, l2: &Array1<f64>, hits: &Array1<bool>) -> Array1<bool> {
        Zip::from(l2)
            .and(&self.l2)
            .and(hits)
            .map_collect(|&new, &best, &hit| hit && new < best)
    }

    pub fn update(&self, l2: &Array1<f64>, predicted: &Array1<usize>, mask: &Array1<bool>) -> BestState {
        BestState {
            l2: set_with_mask(&self.l2, l2, mask),
            class: set_with_mask(&self.class, &predicted.mapv(Some), mask),
        }
    }
}

/// Result of the attack on one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
    /// Best adversarial example per sample, or the unmodified sample.
    pub adversarial: ArrayD<f64>,
    /// Distortion of the best adversarial example, `+inf` without success.
    pub l2: Array1<f64>,
    /// Class assigned to the best adversarial example.
    pub classes: Array1<Option<usize>>,
}

/// Result of the attack on a whole input collection.
#[derive(Clone, Debug, PartialEq)]
pub struct AttackOutcome {
    pub adversarial: ArrayD<f64>,
    pub l2: Array1<f64>,
    pub classes: Array1<Option<usize>>,
}

impl AttackOutcome {
    /// Marks the samples for which an adversarial example was found.
    pub fn succeeded(&self) -> Array1<bool> {
        self.classes.mapv(|class| class.is_some())
    }
}

/// The Carlini-Wagner L2 attack against the classifier ``C``.
///
/// # Example
///
/// ```rust
/// use carlini_wagner::attack::{AttackConfig, CarliniWagnerL2};
/// use carlini_wagner::model::{arch::TensorShape, network::Network};
/// use carlini_wagner::aff;
/// use ndarray::arr2;
///
/// let mut model = Network::new(TensorShape::Flat { in_dim: 2 });
/// model.linear(aff!([[1, -1], [-1, 1]] + [0, 0])).unwrap();
///
/// let config = AttackConfig {
///     max_iterations: 100,
///     ..AttackConfig::default()
/// };
/// let attack = CarliniWagnerL2::new(&model, config).unwrap();
/// let x = arr2(&[[0.6, 0.4]]).into_dyn();
///
/// let adversarial = attack.attack(x.view()).unwrap();
/// assert_eq!(adversarial.shape(), x.shape());
/// ```
#[derive(Debug)]
pub struct CarliniWagnerL2<C> {
    model: C,
    config: AttackConfig,
    targeted: bool,
    labels: Option<Labels>,
    weighting: Box<dyn PixelWeighting>,
}

impl<C: Classifier> CarliniWagnerL2<C> {
    /// Creates an untargeted attack that uses the predictions of ``model`` as labels.
    pub fn new(model: C, config: AttackConfig) -> Result<CarliniWagnerL2<C>, AttackError> {
        config.validate()?;
        Ok(CarliniWagnerL2 {
            model,
            config,
            targeted: false,
            labels: None,
            weighting: Box::new(Uniform),
        })
    }

    /// Creates a targeted attack, which requires the target ``labels``.
    pub fn targeted(
        model: C,
        config: AttackConfig,
        labels: Option<Labels>,
    ) -> Result<CarliniWagnerL2<C>, AttackError> {
        let labels = labels.ok_or(AttackError::MissingTargetLabels)?;
        Ok(CarliniWagnerL2::new(model, config)?.with_labels(labels))
    }

    /// Supplies labels, which turns this into a targeted attack towards these labels.
    pub fn with_labels<L: Into<Labels>>(mut self, labels: L) -> CarliniWagnerL2<C> {
        self.labels = Some(labels.into());
        self.targeted = true;
        self
    }

    pub fn with_weighting<W: PixelWeighting + 'static>(mut self, weighting: W) -> CarliniWagnerL2<C> {
        self.weighting = Box::new(weighting);
        self
    }

    /// Weights the distortion of every pixel by ``map`` (see [`SensitivityMap`]).
    pub fn sensitivity_aware(self, map: ArrayD<f64>) -> Result<CarliniWagnerL2<C>, AttackError> {
        Ok(self.with_weighting(SensitivityMap::new(map)?))
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    pub fn is_targeted(&self) -> bool {
        self.targeted
    }

    pub fn model(&self) -> &C {
        &self.model
    }

    fn transform(&self) -> SpaceTransform {
        SpaceTransform::new(self.config.clip_min, self.config.clip_max)
    }

    /// Returns adversarial examples for ``x`` with the same shape and value range.
    pub fn attack(&self, x: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>, AttackError> {
        self.attack_with(x, &mut NoOpVis {})
    }

    /// Like [`CarliniWagnerL2::attack`], but reports the progress on the console.
    pub fn attack_verbose(&self, x: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>, AttackError> {
        self.attack_with(x, &mut AttackConsole::new())
    }

    /// Like [`CarliniWagnerL2::attack`], but records statistics of every binary search
    /// round in a csv file located at ``path``.
    pub fn attack_csv<P: AsRef<Path>>(
        &self,
        x: ArrayViewD<'_, f64>,
        path: P,
    ) -> Result<ArrayD<f64>, AttackError> {
        let mut visitor = AttackCsv::new(path.as_ref()).map_err(|err| {
            AttackError::Progress(format!("{}: {}", path.as_ref().display(), err))
        })?;
        self.attack_with(x, &mut visitor)
    }

    pub fn attack_with<V: AttackVisitor>(
        &self,
        x: ArrayViewD<'_, f64>,
        visitor: &mut V,
    ) -> Result<ArrayD<f64>, AttackError> {
        Ok(self.attack_detailed_with(x, visitor)?.adversarial)
    }

    /// Returns the adversarial examples together with their distortion and class.
    pub fn attack_detailed(&self, x: ArrayViewD<'_, f64>) -> Result<AttackOutcome, AttackError> {
        self.attack_detailed_with(x, &mut NoOpVis {})
    }

    /// Splits ``x`` into batches of at most `batch_size` samples and attacks them in order.
    ///
    /// The whole input is validated before the first batch is attacked.
    pub fn attack_detailed_with<V: AttackVisitor>(
        &self,
        x: ArrayViewD<'_, f64>,
        visitor: &mut V,
    ) -> Result<AttackOutcome, AttackError> {
        if x.ndim() < 2 {
            return Err(ShapeError::Type.into());
        }
        let n = x.len_of(Axis(0));

        let transform = self.transform();
        if let Some((index, value)) = transform.find_out_of_range(&x) {
            return Err(self.out_of_range(index, value));
        }
        if self.targeted && self.labels.is_none() {
            return Err(AttackError::MissingTargetLabels);
        }
        if let Some(labels) = &self.labels {
            if labels.len() != n {
                return Err(AttackError::LabelCount {
                    expected: n,
                    got: labels.len(),
                });
            }
        }
        self.weighting.validate(x.shape())?;

        let chunks: Vec<Range<usize>> = (0..n)
            .step_by(self.config.batch_size)
            .map(|start| start..usize::min(start + self.config.batch_size, n))
            .collect();

        let mut one_hots = Vec::with_capacity(chunks.len());
        for range in &chunks {
            let batch = x.slice_axis(Axis(0), Slice::from(range.clone()));
            let labels = self.labels.as_ref().map(|labels| labels.slice(range.clone()));
            let (one_hot, _) =
                get_or_guess_labels(&self.model, batch, labels.as_ref(), self.targeted)?;
            one_hots.push(one_hot);
        }

        visitor.start_attack(n, chunks.len(), &self.config);

        let mut adversarial = x.to_owned();
        let mut l2 = Array1::from_elem(n, f64::INFINITY);
        let mut classes = Array1::from_elem(n, None);
        for (idx, (range, one_hot)) in chunks.iter().zip(&one_hots).enumerate() {
            let batch = x.slice_axis(Axis(0), Slice::from(range.clone()));
            let weights = self.weighting.weights(range.start, batch.shape())?;

            visitor.start_batch(idx, range.clone());
            let outcome = self.attack_targeted(
                batch,
                one_hot.view(),
                weights.as_ref().map(|w| w.view()),
                idx,
                visitor,
            )?;
            let successes = count_successes(outcome.classes.view());
            visitor.finish_batch(idx, successes, range.len());

            adversarial
                .slice_axis_mut(Axis(0), Slice::from(range.clone()))
                .assign(&outcome.adversarial);
            l2.slice_axis_mut(Axis(0), Slice::from(range.clone()))
                .assign(&outcome.l2);
            classes
                .slice_axis_mut(Axis(0), Slice::from(range.clone()))
                .assign(&outcome.classes);
        }

        let successes = count_successes(classes.view());
        info!("Found adversarial examples for {}/{} samples", successes, n);
        visitor.finish_attack(successes, n);

        Ok(AttackOutcome {
            adversarial,
            l2,
            classes,
        })
    }

    fn out_of_range(&self, index: usize, value: f64) -> AttackError {
        AttackError::OutOfRange {
            index,
            value,
            clip_min: self.config.clip_min,
            clip_max: self.config.clip_max,
        }
    }

    /// Attacks a single batch ``x`` with one-hot ``labels``.
    ///
    /// Runs `binary_search_steps` rounds of at most `max_iterations` optimizer steps each.
    /// Depending on whether this attack is targeted, a sample counts as adversarial when its
    /// predicted class equals (targeted) or differs from (untargeted) its label.
    pub fn attack_targeted<V: AttackVisitor>(
        &self,
        x: ArrayViewD<'_, f64>,
        labels: ArrayView2<'_, f64>,
        weights: Option<ArrayViewD<'_, f64>>,
        batch: usize,
        visitor: &mut V,
    ) -> Result<BatchOutcome, AttackError> {
        let config = &self.config;
        let transform = self.transform();

        if x.ndim() < 2 {
            return Err(ShapeError::Type.into());
        }
        let n = x.len_of(Axis(0));
        if let Some((index, value)) = transform.find_out_of_range(&x) {
            return Err(self.out_of_range(index, value));
        }
        if labels.nrows() != n {
            return Err(AttackError::LabelCount {
                expected: n,
                got: labels.nrows(),
            });
        }

        let targets = argmax_rows(&labels);
        let step = AttackStep::new(
            &self.model,
            transform,
            LossEvaluator::new(self.targeted, config.confidence),
            x.view(),
            labels.reborrow(),
            weights.map(|w| w.reborrow()),
        );

        let mut bounds = SearchBounds::new(n, config.initial_const);
        let mut best = BestState::new(n);
        let mut best_image = x.to_owned();

        let mut modifier = ArrayD::<f64>::zeros(x.raw_dim());
        let mut optimizer = Adam::new(config.learning_rate, x.shape());
        let check_every = usize::max(1, config.max_iterations / 10);

        for round in 0..config.binary_search_steps {
            modifier.fill(0.);
            optimizer.reset();
            let mut current = BestState::new(n);

            bounds.start_round(round, config.binary_search_steps);
            let consts = bounds.consts.clone();
            visitor.start_round(round, consts.view());
            debug!("Batch {} round {}: constants {}", batch, round, consts);

            let mut previous: Option<f64> = None;
            let mut iterations = 0;
            let mut aborted_early = false;
            for iteration in 0..config.max_iterations {
                let out = step.step(&mut modifier, &mut optimizer, consts.view())?;
                iterations = iteration + 1;
                trace!("Iteration {}: loss {}", iteration, out.loss);
                visitor.finish_iteration(iteration, out.loss);

                if config.abort_early && iteration % check_every == 0 {
                    if let Some(prev) = previous {
                        if out.loss > prev * ABORT_RATIO {
                            aborted_early = true;
                            break;
                        }
                    }
                    previous = Some(out.loss);
                }

                let predicted = argmax_rows(&out.logits);
                let shifted = if self.targeted {
                    &out.logits - config.confidence
                } else {
                    &out.logits + config.confidence
                };
                let hits = Zip::from(&argmax_rows(&shifted))
                    .and(&targets)
                    .map_collect(|&p, &t| is_hit(self.targeted, p, t));

                let mask = current.improvements(&out.l2_dist, &hits);
                current = current.update(&out.l2_dist, &predicted, &mask);

                let mask = best.improvements(&out.l2_dist, &hits);
                best = best.update(&out.l2_dist, &predicted, &mask);
                best_image = set_with_mask(&best_image, &out.candidate, &mask);
            }

            let succeeded = Zip::from(&best.class)
                .and(&targets)
                .map_collect(|class, &t| class.map_or(false, |c| is_hit(self.targeted, c, t)));
            bounds.update(succeeded.view());

            let summary = RoundSummary::new(
                batch,
                round,
                iterations,
                aborted_early,
                consts.view(),
                current.l2.view(),
            );
            debug!(
                "Batch {} round {}: {} iterations{}, {}/{} successes",
                batch,
                round,
                iterations,
                if aborted_early { " (aborted early)" } else { "" },
                summary.successes,
                n
            );
            visitor.finish_round(&summary);
        }

        info!(
            "Batch {}: {}/{} adversarial examples",
            batch,
            count_successes(best.class.view()),
            n
        );

        Ok(BatchOutcome {
            adversarial: best_image,
            l2: best.l2,
            classes: best.class,
        })
    }
}

/// Runs the untargeted Carlini-Wagner L2 attack on ``x`` against ``model``.
pub fn carlini_wagner_l2<C: Classifier>(
    model: C,
    x: ArrayViewD<'_, f64>,
    config: AttackConfig,
) -> Result<ArrayD<f64>, AttackError> {
    CarliniWagnerL2::new(model, config)?.attack(x)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assertables::*;
    use ndarray::{arr1, arr2, Array2};

    use super::*;
    use crate::aff;
    use crate::linalg::affine::AffFunc;
    use crate::model::arch::TensorShape;
    use crate::model::network::Network;

    fn init_logger() {
        use env_logger::Target;
        use log::LevelFilter;

        let _ = env_logger::builder()
            .is_test(true)
            .target(Target::Stdout)
            .filter_level(LevelFilter::Debug)
            .try_init();
    }

    #[test]
    fn test_bounds_success_bisects() {
        let mut bounds = SearchBounds::new(2, 1.);
        bounds.lower = arr1(&[0.5, 0.]);

        bounds.update(arr1(&[true, true]).view());

        assert_eq!(bounds.upper, arr1(&[1., 1.]));
        assert_eq!(bounds.lower, arr1(&[0.5, 0.]));
        assert_eq!(bounds.consts, arr1(&[0.75, 0.5]));
    }

    #[test]
    fn test_bounds_failure_grows() {
        let mut bounds = SearchBounds::new(2, 0.01);
        bounds.upper = arr1(&[UPPER_BOUND_INIT, 1.]);

        bounds.update(arr1(&[false, false]).view());

        assert_eq!(bounds.lower, arr1(&[0.01, 0.01]));
        assert_relative_eq!(bounds.consts[0], 0.1);
        assert_relative_eq!(bounds.consts[1], 0.505);
    }

    #[test]
    fn test_bounds_successful_sample_is_not_grown() {
        let mut bounds = SearchBounds::new(2, 0.01);

        bounds.update(arr1(&[true, false]).view());

        assert_relative_eq!(bounds.consts[0], 0.005);
        assert_relative_eq!(bounds.consts[1], 0.1);
        assert_relative_eq!(bounds.upper[0], 0.01);
    }

    #[test]
    fn test_bounds_repeat_at_upper() {
        let mut bounds = SearchBounds::new(1, 0.5);
        bounds.upper = arr1(&[2.]);

        bounds.start_round(8, 10);
        assert_eq!(bounds.consts, arr1(&[0.5]));
        bounds.start_round(9, 10);
        assert_eq!(bounds.consts, arr1(&[2.]));

        let mut bounds = SearchBounds::new(1, 0.5);
        bounds.upper = arr1(&[2.]);
        bounds.start_round(4, 5);
        assert_eq!(bounds.consts, arr1(&[0.5]));
    }

    #[test]
    fn test_best_state_requires_strict_improvement() {
        let best = BestState::new(3);
        let hits = arr1(&[true, false, true]);
        let l2 = arr1(&[0.5, 0.1, 0.2]);

        let mask = best.improvements(&l2, &hits);
        assert_eq!(mask, arr1(&[true, false, true]));
        let best = best.update(&l2, &arr1(&[2, 0, 1]), &mask);
        assert_eq!(best.class, arr1(&[Some(2), None, Some(1)]));

        let mask = best.improvements(&arr1(&[0.5, 0.05, 0.1]), &arr1(&[true, true, true]));
        assert_eq!(mask, arr1(&[false, true, true]));
    }

    #[test]
    fn test_rejects_out_of_range() {
        init_logger();
        let mut model = Network::new(TensorShape::Flat { in_dim: 2 });
        model.linear(aff!([[1, 0], [0, 1]] + [0, 0])).unwrap();
        let attack = CarliniWagnerL2::new(&model, AttackConfig::default()).unwrap();

        let x = arr2(&[[0.5, 0.5], [0.2, 1.2]]).into_dyn();

        assert_eq!(
            attack.attack(x.view()),
            Err(AttackError::OutOfRange {
                index: 3,
                value: 1.2,
                clip_min: 0.,
                clip_max: 1.
            })
        );
    }

    #[test]
    fn test_missing_target_labels() {
        let model = Network::new(TensorShape::Flat { in_dim: 2 });
        assert_eq!(
            CarliniWagnerL2::targeted(&model, AttackConfig::default(), None).unwrap_err(),
            AttackError::MissingTargetLabels
        );
    }

    #[test]
    fn test_label_count_mismatch() {
        let mut model = Network::new(TensorShape::Flat { in_dim: 2 });
        model.linear(aff!([[1, 0], [0, 1]] + [0, 0])).unwrap();
        let attack = CarliniWagnerL2::new(&model, AttackConfig::default())
            .unwrap()
            .with_labels(vec![0, 1, 1]);

        let x = arr2(&[[0.5, 0.5], [0.2, 0.8]]).into_dyn();

        assert_eq!(
            attack.attack(x.view()),
            Err(AttackError::LabelCount {
                expected: 2,
                got: 3
            })
        );
    }

    #[test]
    fn test_single_round_without_success_returns_input() {
        init_logger();
        let mut model = Network::new(TensorShape::Flat { in_dim: 3 });
        model
            .linear(AffFunc::constant(3, arr1(&[1., 0.])))
            .unwrap();
        let config = AttackConfig {
            binary_search_steps: 1,
            max_iterations: 20,
            ..AttackConfig::default()
        };
        let attack = CarliniWagnerL2::new(&model, config).unwrap();
        let x = arr2(&[[0.1, 0.5, 0.9]]);

        let outcome = attack
            .attack_targeted(
                x.view().into_dyn(),
                arr2(&[[1., 0.]]).view(),
                None,
                0,
                &mut NoOpVis {},
            )
            .unwrap();

        assert_eq!(outcome.adversarial, x.into_dyn());
        assert_eq!(outcome.classes, arr1(&[None]));
        assert_gt!(outcome.l2[0], 1e10);
    }

    #[test]
    fn test_outcome_succeeded() {
        let outcome = AttackOutcome {
            adversarial: Array2::<f64>::zeros((2, 1)).into_dyn(),
            l2: arr1(&[0.1, f64::INFINITY]),
            classes: arr1(&[Some(1), None]),
        };
        assert_eq!(outcome.succeeded(), arr1(&[true, false]));
    }
}
