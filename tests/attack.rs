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


/// End-to-end tests of the attack against small linear classifiers.
///
/// The classifiers are simple enough that the minimal adversarial distortion can be
/// computed by hand, which bounds the distortion the attack should find.
#[cfg(test)]
mod tests {
    use std::ops::Range;

    use approx::assert_relative_eq;
    use assertables::*;
    use carlini_wagner::aff;
    use carlini_wagner::attack::visitor::{AttackVisitor, RoundSummary};
    use carlini_wagner::attack::{
        carlini_wagner_l2, AttackConfig, AttackError, CarliniWagnerL2, Labels,
    };
    use carlini_wagner::linalg::affine::AffFunc;
    use carlini_wagner::model::arch::TensorShape;
    use carlini_wagner::model::classifier::Classifier;
    use carlini_wagner::model::network::Network;
    use carlini_wagner::attack::labels::argmax_rows;
    use ndarray::{arr1, arr2, Array1, ArrayD, ArrayView1, Axis, IxDyn};

    fn init_logger() {
        use env_logger::Target;
        use log::LevelFilter;

        let _ = env_logger::builder()
            .is_test(true)
            .target(Target::Stdout)
            .filter_level(LevelFilter::Debug)
            .try_init();
    }

    fn image_shape() -> TensorShape {
        TensorShape::Image {
            height: 2,
            width: 2,
            channels: 1,
        }
    }

    /// Two classes separated by the hyperplane x0 = x1.
    fn two_class_model() -> Network {
        let mut model = Network::new(image_shape());
        model
            .linear(AffFunc::antipodal(&arr1(&[4., -4., 0., 0.])))
            .unwrap();
        model
    }

    fn images(values: &[f64], n: usize) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[n, 2, 2, 1]), values.to_vec()).unwrap()
    }

    fn squared_distance(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Array1<f64> {
        a.axis_iter(Axis(0))
            .zip(b.axis_iter(Axis(0)))
            .map(|(x, y)| (&x - &y).mapv(|v| v * v).sum())
            .collect()
    }

    #[derive(Debug, Default)]
    struct Recorder {
        batches: Vec<Range<usize>>,
        consts: Vec<Vec<f64>>,
        rounds: Vec<RoundSummary>,
        iterations: usize,
        finished: Option<(usize, usize)>,
    }

    impl AttackVisitor for Recorder {
        fn start_attack(&mut self, _: usize, _: usize, _: &AttackConfig) {}

        fn start_batch(&mut self, _: usize, samples: Range<usize>) {
            self.batches.push(samples);
        }

        fn start_round(&mut self, _: usize, consts: ArrayView1<'_, f64>) {
            self.consts.push(consts.to_vec());
        }

        fn finish_iteration(&mut self, _: usize, loss: f64) {
            assert!(loss.is_finite());
            self.iterations += 1;
        }

        fn finish_round(&mut self, summary: &RoundSummary) {
            self.rounds.push(summary.clone());
        }

        fn finish_batch(&mut self, _: usize, _: usize, _: usize) {}

        fn finish_attack(&mut self, successes: usize, n_samples: usize) {
            self.finished = Some((successes, n_samples));
        }
    }

    #[test]
    pub fn test_untargeted_flips_class() {
        init_logger();
        let model = two_class_model();
        let x = images(&[0.55, 0.45, 0.5, 0.5], 1);
        let config = AttackConfig {
            max_iterations: 50,
            ..AttackConfig::default()
        };

        let attack = CarliniWagnerL2::new(&model, config).unwrap();
        let outcome = attack.attack_detailed(x.view()).unwrap();

        let logits = model.logits(outcome.adversarial.view()).unwrap();
        assert_eq!(argmax_rows(&logits), arr1(&[1]));
        assert_eq!(outcome.classes, arr1(&[Some(1)]));
        assert_eq!(outcome.succeeded(), arr1(&[true]));

        // The closest point of the other class lies at squared distance 2 * 0.05^2.
        let l2 = squared_distance(&outcome.adversarial, &x)[0];
        assert_ge!(l2, 0.005 - 1e-6);
        assert_lt!(l2, 0.01);
        assert_relative_eq!(outcome.l2[0], l2, max_relative = 1e-3);

        // Pixels without influence on the logits stay untouched.
        assert_relative_eq!(outcome.adversarial[[0, 1, 0, 0]], 0.5);
        assert_relative_eq!(outcome.adversarial[[0, 1, 1, 0]], 0.5);
    }

    #[test]
    pub fn test_batches_are_split_and_reassembled() {
        init_logger();
        let model = two_class_model();
        let x = images(&[0.55, 0.45, 0.5, 0.5, 0.3, 0.6, 0.2, 0.9], 2);
        let config = AttackConfig {
            batch_size: 1,
            max_iterations: 200,
            ..AttackConfig::default()
        };

        let attack = CarliniWagnerL2::new(&model, config).unwrap();
        let mut recorder = Recorder::default();
        let adversarial = attack.attack_with(x.view(), &mut recorder).unwrap();

        assert_eq!(adversarial.shape(), x.shape());
        assert_eq!(recorder.batches, vec![0..1, 1..2]);
        assert_eq!(recorder.rounds.len(), 2 * 5);
        assert_eq!(recorder.finished, Some((2, 2)));

        let logits = model.logits(adversarial.view()).unwrap();
        assert_eq!(argmax_rows(&logits), arr1(&[1, 0]));

        let l2 = squared_distance(&adversarial, &x);
        assert_lt!(l2[0], 0.01);
        assert_ge!(l2[1], 0.045 - 1e-6);
        assert_lt!(l2[1], 0.06);
    }

    #[test]
    pub fn test_targeted_three_classes() {
        init_logger();
        let mut model = Network::new(TensorShape::Flat { in_dim: 3 });
        model
            .linear(aff!([[2, 0, 0], [0, 2, 0], [0, 0, 2]] + [0, 0, 0]))
            .unwrap();
        let x = arr2(&[[0.6, 0.3, 0.2], [0.2, 0.7, 0.4]]).into_dyn();
        let config = AttackConfig {
            max_iterations: 300,
            ..AttackConfig::default()
        };

        let attack =
            CarliniWagnerL2::targeted(&model, config, Some(Labels::from(vec![2, 0]))).unwrap();
        assert!(attack.is_targeted());
        let outcome = attack.attack_detailed(x.view()).unwrap();

        assert_eq!(outcome.classes, arr1(&[Some(2), Some(0)]));
        let logits = model.logits(outcome.adversarial.view()).unwrap();
        assert_eq!(argmax_rows(&logits), arr1(&[2, 0]));

        // Moving both coordinates to their mean costs (0.6 - 0.2)^2 / 2.
        assert_ge!(outcome.l2[0], 0.08 - 1e-6);
        assert_lt!(outcome.l2[0], 0.1);
        assert_ge!(outcome.l2[1], 0.125 - 1e-6);
        assert_lt!(outcome.l2[1], 0.15);
    }

    #[test]
    pub fn test_one_hot_labels() {
        let mut model = Network::new(TensorShape::Flat { in_dim: 3 });
        model
            .linear(aff!([[2, 0, 0], [0, 2, 0], [0, 0, 2]] + [0, 0, 0]))
            .unwrap();
        let x = arr2(&[[0.6, 0.3, 0.2]]).into_dyn();
        let config = AttackConfig {
            max_iterations: 300,
            ..AttackConfig::default()
        };

        let attack = CarliniWagnerL2::new(&model, config)
            .unwrap()
            .with_labels(arr2(&[[0., 0., 1.]]));
        let outcome = attack.attack_detailed(x.view()).unwrap();

        assert_eq!(outcome.classes, arr1(&[Some(2)]));
    }

    #[test]
    pub fn test_hopeless_sample_is_returned_unchanged() {
        init_logger();
        let mut model = Network::new(image_shape());
        model
            .linear(AffFunc::constant(4, arr1(&[1., 0.])))
            .unwrap();
        let x = images(&[0.1, 0.2, 0.3, 0.4, 0., 1., 0.5, 0.25], 2);
        let config = AttackConfig {
            binary_search_steps: 3,
            max_iterations: 30,
            ..AttackConfig::default()
        };

        let outcome = CarliniWagnerL2::new(&model, config)
            .unwrap()
            .attack_detailed(x.view())
            .unwrap();

        assert_eq!(outcome.adversarial, x);
        assert_eq!(outcome.classes, arr1(&[None, None]));
        assert_eq!(outcome.succeeded(), arr1(&[false, false]));
    }

    #[test]
    pub fn test_free_function() {
        let model = two_class_model();
        let x = images(&[0.55, 0.45, 0.5, 0.5], 1);
        let config = AttackConfig {
            max_iterations: 50,
            ..AttackConfig::default()
        };

        let adversarial = carlini_wagner_l2(&model, x.view(), config).unwrap();

        let logits = model.logits(adversarial.view()).unwrap();
        assert_eq!(argmax_rows(&logits), arr1(&[1]));
    }

    #[test]
    pub fn test_output_stays_in_range() {
        let mut model = Network::new(TensorShape::Flat { in_dim: 4 });
        model
            .linear(aff!([[0.5, -1, 2, 0.1], [1, 0.3, -0.5, 1], [-1, 1, 0, 0.2]] + [0, 0.1, -0.1]))
            .unwrap();
        model.relu();
        model
            .linear(aff!([[1, -1, 0.5], [-1, 1, 0.5]] + [0, 0]))
            .unwrap();
        let x = arr2(&[[-1., 1., 0.5, -0.5], [0.25, 0.75, -0.75, 0.]]).into_dyn();
        let config = AttackConfig {
            clip_min: -1.,
            clip_max: 1.,
            binary_search_steps: 3,
            max_iterations: 100,
            ..AttackConfig::default()
        };

        let adversarial = CarliniWagnerL2::new(&model, config)
            .unwrap()
            .attack(x.view())
            .unwrap();

        assert_eq!(adversarial.shape(), x.shape());
        for &v in adversarial.iter() {
            assert_ge!(v, -1.);
            assert_le!(v, 1.);
        }
    }

    #[test]
    pub fn test_single_round_uses_initial_const() {
        let model = two_class_model();
        let x = images(&[0.55, 0.45, 0.5, 0.5], 1);
        let config = AttackConfig {
            binary_search_steps: 1,
            max_iterations: 50,
            initial_const: 0.02,
            ..AttackConfig::default()
        };

        let mut recorder = Recorder::default();
        CarliniWagnerL2::new(&model, config)
            .unwrap()
            .attack_with(x.view(), &mut recorder)
            .unwrap();

        assert_eq!(recorder.consts, vec![vec![0.02]]);
        assert_eq!(recorder.rounds.len(), 1);
        assert_le!(recorder.iterations, 50);
    }

    #[test]
    pub fn test_last_round_repeats_at_upper_bound() {
        let model = two_class_model();
        let x = images(&[0.55, 0.45, 0.5, 0.5], 1);
        let config = AttackConfig {
            binary_search_steps: 10,
            max_iterations: 50,
            ..AttackConfig::default()
        };

        let mut recorder = Recorder::default();
        CarliniWagnerL2::new(&model, config)
            .unwrap()
            .attack_with(x.view(), &mut recorder)
            .unwrap();

        assert_eq!(recorder.consts.len(), 10);
        assert_eq!(recorder.consts[0], vec![0.01]);
        assert_relative_eq!(recorder.consts[1][0], 0.1);
        // Once a sample succeeded, the upper bound equals the constant of the previous round.
        assert_eq!(recorder.consts[9], recorder.consts[8]);
    }

    #[test]
    pub fn test_stalled_loss_aborts_round() {
        // The logits ignore the input, so the loss never decreases.
        let mut model = Network::new(image_shape());
        model
            .linear(AffFunc::constant(4, arr1(&[1., 0.])))
            .unwrap();
        let x = images(&[0.3, 0.6, 0.2, 0.8], 1);
        let config = AttackConfig {
            binary_search_steps: 1,
            max_iterations: 100,
            ..AttackConfig::default()
        };

        let mut recorder = Recorder::default();
        CarliniWagnerL2::new(&model, config.clone())
            .unwrap()
            .attack_with(x.view(), &mut recorder)
            .unwrap();

        // The loss is compared every 10 iterations, the first comparison fails at iteration 10.
        assert_eq!(recorder.iterations, 11);
        assert_eq!(recorder.rounds[0].iterations, 11);
        assert!(recorder.rounds[0].aborted_early);
        assert_eq!(recorder.rounds[0].successes, 0);

        let mut recorder = Recorder::default();
        let config = AttackConfig {
            abort_early: false,
            ..config
        };
        CarliniWagnerL2::new(&model, config)
            .unwrap()
            .attack_with(x.view(), &mut recorder)
            .unwrap();

        assert_eq!(recorder.rounds[0].iterations, 100);
        assert!(!recorder.rounds[0].aborted_early);
    }

    #[test]
    pub fn test_sensitivity_map_shifts_perturbation() {
        init_logger();
        let mut model = Network::new(image_shape());
        model
            .linear(AffFunc::antipodal(&arr1(&[4., -4., 4., -4.])))
            .unwrap();
        let x = images(&[0.55, 0.45, 0.52, 0.48], 1);
        let config = AttackConfig {
            max_iterations: 300,
            ..AttackConfig::default()
        };

        let uniform = CarliniWagnerL2::new(&model, config.clone())
            .unwrap()
            .attack(x.view())
            .unwrap();
        let map = ArrayD::from_shape_vec(IxDyn(&[2, 2, 1]), vec![100., 100., 1., 1.]).unwrap();
        let weighted = CarliniWagnerL2::new(&model, config)
            .unwrap()
            .sensitivity_aware(map)
            .unwrap()
            .attack(x.view())
            .unwrap();

        let delta_uniform = (&uniform - &x).mapv(f64::abs);
        let delta_weighted = (&weighted - &x).mapv(f64::abs);

        assert_relative_eq!(
            delta_uniform[[0, 0, 0, 0]],
            delta_uniform[[0, 1, 0, 0]],
            max_relative = 0.05
        );
        assert_lt!(
            delta_weighted[[0, 0, 0, 0]] + delta_weighted[[0, 0, 1, 0]],
            0.1 * (delta_weighted[[0, 1, 0, 0]] + delta_weighted[[0, 1, 1, 0]])
        );

        let logits = model.logits(weighted.view()).unwrap();
        assert_eq!(argmax_rows(&logits), arr1(&[1]));
    }

    #[test]
    pub fn test_invalid_arguments() {
        let model = two_class_model();
        let config = AttackConfig::default();

        assert_eq!(
            CarliniWagnerL2::targeted(&model, config.clone(), None).unwrap_err(),
            AttackError::MissingTargetLabels
        );

        let attack = CarliniWagnerL2::new(&model, config.clone()).unwrap();
        let nan = images(&[0.5, f64::NAN, 0.5, 0.5], 1);
        assert!(matches!(
            attack.attack(nan.view()),
            Err(AttackError::OutOfRange { index: 1, .. })
        ));

        let attack = CarliniWagnerL2::new(&model, config.clone())
            .unwrap()
            .with_labels(vec![5]);
        let x = images(&[0.5, 0.5, 0.5, 0.5], 1);
        assert_eq!(
            attack.attack(x.view()),
            Err(AttackError::LabelOutOfBounds {
                label: 5,
                classes: 2
            })
        );

        let map = ArrayD::zeros(IxDyn(&[3, 3]));
        let attack = CarliniWagnerL2::new(&model, config.clone())
            .unwrap()
            .sensitivity_aware(map)
            .unwrap();
        assert!(matches!(
            attack.attack(x.view()),
            Err(AttackError::WeightShape { .. })
        ));

        let bad = AttackConfig {
            learning_rate: 0.,
            ..config
        };
        assert!(matches!(
            CarliniWagnerL2::new(&model, bad),
            Err(AttackError::Config(_))
        ));
    }
}
