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


/*!
Minimal-distortion adversarial examples for differentiable classifiers.

This crate implements the [Carlini-Wagner L2 attack](https://arxiv.org/abs/1608.04644).
Given a classifier and a batch of inputs, the attack searches for each input the closest
(in squared L2 distance) input of the same value range that the classifier assigns a
different class (untargeted attack) or a chosen class (targeted attack).

The attack reformulates this constrained search as an unconstrained minimization problem:
 - every candidate is expressed as `(tanh(w) + 1) / 2` scaled to the valid pixel range, so no
   clipping is necessary during the optimization
 - the objective adds the distortion and a hinge loss on the logit margin weighted by a
   per-sample tradeoff constant
 - an outer binary search tunes this constant, an inner loop minimizes the objective with Adam

Samples for which no adversarial example is found are returned unmodified.

# Quick Start
Classifiers are accessed through the [`Classifier`](crate::model::classifier::Classifier)
trait, which provides the logits of a batch and the gradient of a scalar with respect to
the input (a vector-Jacobian product). For piece-wise linear feed-forward networks, the
crate ships [`Network`](crate::model::network::Network), which can be assembled in code
or read from `numpy` archives.

```rust
use carlini_wagner::aff;
use carlini_wagner::attack::{AttackConfig, CarliniWagnerL2};
use carlini_wagner::model::{arch::TensorShape, network::Network};
use ndarray::arr2;

let mut model = Network::new(TensorShape::Flat { in_dim: 4 });
model.linear(aff!([[0.5, -1, 2, 0.1], [1, 0.3, -0.5, 1], [-1, 1, 0, 0.2]] + [0, 0.1, -0.1])).unwrap();
model.relu();
model.linear(aff!([[1, -1, 0.5], [-1, 1, 0.5]] + [0, 0])).unwrap();

let config = AttackConfig {
    binary_search_steps: 3,
    max_iterations: 100,
    ..AttackConfig::default()
};
let x = arr2(&[[0.2, 0.7, 0.1, 0.9], [0.5, 0.5, 0.5, 0.5]]).into_dyn();

// untargeted: move away from the current prediction
let attack = CarliniWagnerL2::new(&model, config.clone()).unwrap();
let outcome = attack.attack_detailed(x.view()).unwrap();
assert_eq!(outcome.adversarial.shape(), x.shape());

// targeted: move towards class 1
let attack = CarliniWagnerL2::new(&model, config).unwrap().with_labels(vec![1, 1]);
let adversarial = attack.attack(x.view()).unwrap();
assert!(adversarial.iter().all(|&v| (0. ..=1.).contains(&v)));
```

# Sensitivity-aware attacks
The distortion term can weight pixels individually by a sensitivity map, so that
perturbations of sensitive regions become more expensive
(see [`CarliniWagnerL2::sensitivity_aware`](crate::attack::cw::CarliniWagnerL2::sensitivity_aware)).

# Progress
The attack reports its progress to an [`AttackVisitor`](crate::attack::visitor::AttackVisitor).
Besides the silent default, progress can be shown on the console
([`attack_verbose`](crate::attack::cw::CarliniWagnerL2::attack_verbose)) or recorded in a
csv file ([`attack_csv`](crate::attack::cw::CarliniWagnerL2::attack_csv)).
Diagnostics are emitted through the `log` facade.
*/

#![warn(
    missing_debug_implementations,
    //missing_docs,
    rust_2021_compatibility,
    // unreachable_pub
)]

pub mod attack;
pub mod linalg;
pub mod model;
