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


//! Adam optimizer for the perturbation variable

use ndarray::{ArrayD, ArrayViewD, IxDyn, Zip};

pub const BETA1: f64 = 0.9;
pub const BETA2: f64 = 0.999;
pub const EPSILON: f64 = 1e-7;

/// Adam with the bias correction folded into the step size.
///
/// ```text
/// m     += (g - m) * (1 - beta1)
/// v     += (g² - v) * (1 - beta2)
/// alpha  = lr * sqrt(1 - beta2^t) / (1 - beta1^t)
/// param -= alpha * m / (sqrt(v) + epsilon)
/// ```
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f64,
    m: ArrayD<f64>,
    v: ArrayD<f64>,
    t: i32,
}

impl Adam {
    /// Creates an optimizer for parameters of the given shape.
    pub fn new(learning_rate: f64, shape: &[usize]) -> Adam {
        Adam {
            learning_rate,
            m: ArrayD::zeros(IxDyn(shape)),
            v: ArrayD::zeros(IxDyn(shape)),
            t: 0,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of updates since creation or the last reset.
    pub fn iterations(&self) -> usize {
        self.t as usize
    }

    /// Zeroes both moments and the iteration counter.
    pub fn reset(&mut self) {
        self.m.fill(0.);
        self.v.fill(0.);
        self.t = 0;
    }

    /// Applies one update to ``params`` in place.
    pub fn step(&mut self, params: &mut ArrayD<f64>, gradient: ArrayViewD<'_, f64>) {
        assert_eq!(
            params.shape(),
            gradient.shape(),
            "Shape mismatch of parameters and gradient"
        );
        assert_eq!(params.shape(), self.m.shape(), "Shape mismatch of parameters and moments");

        self.t += 1;
        let alpha = self.learning_rate * (1. - BETA2.powi(self.t)).sqrt()
            / (1. - BETA1.powi(self.t));

        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(&gradient)
            .for_each(|p, m, v, &g| {
                *m += (g - *m) * (1. - BETA1);
                *v += (g * g - *v) * (1. - BETA2);
                *p -= alpha * *m / (v.sqrt() + EPSILON);
            });
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assertables::*;
    use ndarray::arr1;

    use super::*;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.01, &[3]);
        let mut params = arr1(&[1., 2., 3.]).into_dyn();
        let grad = arr1(&[0.5, -4., 100.]).into_dyn();

        adam.step(&mut params, grad.view());

        // After bias correction the first update is lr * sign(g) up to epsilon.
        assert_relative_eq!(params[[0]], 0.99, max_relative = 1e-5);
        assert_relative_eq!(params[[1]], 2.01, max_relative = 1e-5);
        assert_relative_eq!(params[[2]], 2.99, max_relative = 1e-5);
        assert_eq!(adam.iterations(), 1);
    }

    #[test]
    fn test_zero_gradient_keeps_params() {
        let mut adam = Adam::new(0.1, &[2, 2]);
        let mut params = ArrayD::from_elem(IxDyn(&[2, 2]), 0.25);
        let grad = ArrayD::zeros(IxDyn(&[2, 2]));

        for _ in 0..5 {
            adam.step(&mut params, grad.view());
        }

        assert_eq!(params, ArrayD::from_elem(IxDyn(&[2, 2]), 0.25));
    }

    #[test]
    fn test_reset() {
        let mut adam = Adam::new(0.1, &[1]);
        let mut params = arr1(&[0.]).into_dyn();
        adam.step(&mut params, arr1(&[1.]).into_dyn().view());
        adam.step(&mut params, arr1(&[1.]).into_dyn().view());

        adam.reset();
        assert_eq!(adam.iterations(), 0);

        let mut fresh = arr1(&[0.]).into_dyn();
        adam.step(&mut fresh, arr1(&[-3.]).into_dyn().view());
        assert_relative_eq!(fresh[[0]], 0.1, max_relative = 1e-5);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new(0.05, &[2]);
        let target = arr1(&[1.5, -0.5]).into_dyn();
        let mut params = arr1(&[0., 0.]).into_dyn();

        for _ in 0..2000 {
            let grad = (&params - &target) * 2.;
            adam.step(&mut params, grad.view());
        }

        for (p, t) in params.iter().zip(target.iter()) {
            assert_lt!((p - t).abs(), 5e-2);
        }
    }
}
