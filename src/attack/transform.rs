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


//! Change of variables between the pixel box and an unconstrained space
//!
//! Optimizing over `z` with `x = (tanh(z) + 1) / 2 * (max - min) + min` keeps every
//! candidate inside the valid pixel range without clipping inside the gradient loop.

use ndarray::{Array, ArrayBase, Data, Dimension};

/// Shrinks the normalized values slightly so that `atanh` stays finite at the boundary.
const BOUNDARY_SCALE: f64 = 0.999999;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpaceTransform {
    pub clip_min: f64,
    pub clip_max: f64,
}

impl SpaceTransform {
    pub fn new(clip_min: f64, clip_max: f64) -> SpaceTransform {
        assert!(
            clip_min < clip_max,
            "Expected clip_min < clip_max, got {} >= {}",
            clip_min,
            clip_max
        );
        SpaceTransform { clip_min, clip_max }
    }

    #[inline]
    fn range(&self) -> f64 {
        self.clip_max - self.clip_min
    }

    /// Maps pixel values in `[clip_min, clip_max]` to the unconstrained space.
    pub fn to_unconstrained<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x.mapv(|v| {
            let unit = ((v - self.clip_min) / self.range()).clamp(0., 1.);
            ((unit * 2. - 1.) * BOUNDARY_SCALE).atanh()
        })
    }

    /// Maps unconstrained values back into `[clip_min, clip_max]`.
    pub fn to_pixel<S, D>(&self, z: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        z.mapv(|v| (v.tanh() + 1.) / 2. * self.range() + self.clip_min)
    }

    /// Element-wise derivative of [`SpaceTransform::to_pixel`].
    pub fn to_pixel_derivative<S, D>(&self, z: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        z.mapv(|v| {
            let t = v.tanh();
            (1. - t * t) / 2. * self.range()
        })
    }

    /// Returns the index and value of the first element outside of `[clip_min, clip_max]`.
    pub fn find_out_of_range<S, D>(&self, x: &ArrayBase<S, D>) -> Option<(usize, f64)>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x.iter()
            .copied()
            .enumerate()
            .find(|&(_, v)| !(v >= self.clip_min && v <= self.clip_max))
    }
}
