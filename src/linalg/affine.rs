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

//! Affine functions used as the linear layers of a classifier

use core::fmt;
use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};
use ndarray::{
    self, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, LinalgScalar, OwnedRepr, RawDataClone,
};
use num_traits::float::Float;

/// An affine function f(x) = mat @ x + bias.
pub struct AffFuncBase<S>
where
    S: Data,
    S::Elem: Float,
{
    pub mat: ArrayBase<S, Ix2>,
    pub bias: ArrayBase<S, Ix1>,
}

pub type AffFuncG<A> = AffFuncBase<OwnedRepr<A>>;

pub type AffFunc = AffFuncG<f64>;

impl<D: Data<Elem = A>, A: Float + Debug> Debug for AffFuncBase<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_tuple("AffFunc")
            .field(&self.mat)
            .field(&self.bias)
            .finish()
    }
}

impl<D: Data<Elem = A> + RawDataClone, A: Float + Clone> Clone for AffFuncBase<D> {
    fn clone(&self) -> Self {
        AffFuncBase {
            mat: self.mat.clone(),
            bias: self.bias.clone(),
        }
    }
}

/// # General constructor
impl<D: Data<Elem = A>, A: Float> AffFuncBase<D> {
    /// Create a new affine function consisting of a matrix mat: R^{m x n} and a vector bias: R^m.
    #[inline(always)]
    pub fn from_mats(mat: ArrayBase<D, Ix2>, bias: ArrayBase<D, Ix1>) -> AffFuncBase<D> {
        assert_eq!(
            mat.len_of(Axis(0)),
            bias.len_of(Axis(0)),
            "Dimensions mismatch of matrix and bias: {} x {} and {}",
            mat.len_of(Axis(0)),
            mat.len_of(Axis(1)),
            bias.len_of(Axis(0))
        );
        debug_assert!(
            mat.iter().all(|x| x.is_finite()),
            "Weights must be finite"
        );
        debug_assert!(bias.iter().all(|x| x.is_finite()), "Bias must be finite");

        AffFuncBase { mat, bias }
    }
}

/// # Owned constructors
impl<A: Float> AffFuncG<A> {
    /// Creates an affine function from ``indim`` to ``outdim`` that ignores its input
    /// and returns ``bias``.
    #[inline(always)]
    pub fn constant(indim: usize, bias: Array1<A>) -> AffFuncG<A> {
        AffFuncG::<A>::from_mats(Array2::zeros((bias.len(), indim)), bias)
    }

    /// Creates the linear function f(x) = [w @ x, -w @ x], a two-class scorer
    /// whose decision boundary is the hyperplane orthogonal to ``weights``.
    pub fn antipodal(weights: &Array1<A>) -> AffFuncG<A> {
        let mut mat = Array2::zeros((2, weights.len()));
        mat.row_mut(0).assign(weights);
        mat.row_mut(1).assign(&weights.mapv(|x| -x));
        AffFuncG::<A>::from_mats(mat, Array1::zeros(2))
    }
}

/// # General methods
impl<D: Data<Elem = A>, A: Float> AffFuncBase<D> {
    /// Returns the dimension of the input space.
    #[inline(always)]
    pub fn indim(&self) -> usize {
        self.mat.shape()[1]
    }

    /// Returns the dimension of the image space.
    #[inline(always)]
    pub fn outdim(&self) -> usize {
        self.mat.shape()[0]
    }
}

/// # Evaluation on inputs
impl<D: Data<Elem = A>, A: Float + LinalgScalar> AffFuncBase<D> {
    /// Evaluates this function under the given input.
    /// Mathematically, this corresponds to calculating mat @ input + bias
    pub fn apply<S: Data<Elem = A>>(&self, input: &ArrayBase<S, Ix1>) -> Array1<A> {
        self.mat.dot(input) + &self.bias
    }

    /// Evaluates this function on every row of ``inputs``.
    ///
    /// ``inputs`` has shape (n, indim), the result has shape (n, outdim).
    pub fn apply_rows<S: Data<Elem = A>>(&self, inputs: &ArrayBase<S, Ix2>) -> Array2<A> {
        assert_eq!(
            inputs.len_of(Axis(1)),
            self.indim(),
            "Input dimension mismatch: expected {}, got {}",
            self.indim(),
            inputs.len_of(Axis(1))
        );
        inputs.dot(&self.mat.t()) + &self.bias
    }

    /// Pulls the row-wise output gradients back to the inputs (vector-Jacobian product).
    ///
    /// ``gradients`` has shape (n, outdim), the result has shape (n, indim).
    pub fn pullback_rows<S: Data<Elem = A>>(&self, gradients: &ArrayBase<S, Ix2>) -> Array2<A> {
        assert_eq!(
            gradients.len_of(Axis(1)),
            self.outdim(),
            "Gradient dimension mismatch: expected {}, got {}",
            self.outdim(),
            gradients.len_of(Axis(1))
        );
        gradients.dot(&self.mat)
    }
}

impl<D: Data<Elem = A>, A: Float> core::cmp::PartialEq for AffFuncBase<D> {
    fn eq(&self, other: &Self) -> bool {
        self.mat.eq(&other.mat) && self.bias.eq(&other.bias)
    }
}

impl<S, A> AbsDiffEq for AffFuncBase<S>
where
    S: Data<Elem = A>,
    A: Float + AbsDiffEq,
    A::Epsilon: Clone,
{
    type Epsilon = A::Epsilon;

    fn default_epsilon() -> A::Epsilon {
        A::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: A::Epsilon) -> bool {
        <ArrayBase<S, Ix2> as AbsDiffEq<_>>::abs_diff_eq(&self.mat, &other.mat, epsilon.clone())
            && <ArrayBase<S, Ix1> as AbsDiffEq<_>>::abs_diff_eq(&self.bias, &other.bias, epsilon)
    }
}

impl<S, A> RelativeEq for AffFuncBase<S>
where
    S: Data<Elem = A>,
    A: Float + RelativeEq,
    A::Epsilon: Clone,
{
    fn default_max_relative() -> Self::Epsilon {
        A::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: A::Epsilon, max_relative: A::Epsilon) -> bool {
        <ArrayBase<S, Ix2> as RelativeEq<_>>::relative_eq(
            &self.mat,
            &other.mat,
            epsilon.clone(),
            max_relative.clone(),
        ) && <ArrayBase<S, Ix1> as RelativeEq<_>>::relative_eq(
            &self.bias,
            &other.bias,
            epsilon,
            max_relative,
        )
    }
}

/// Creates a new ``AffFunc`` from the given matrix and bias.
///
/// See also ndarray's ``array`` macro
///
/// # Examples
///
/// ```rust
/// use carlini_wagner::aff;
///
/// let func = aff!([[1, 2, 5, 7], [-2, -9, 7, 8]] + [1, -1]);
/// assert_eq!(func.indim(), 4);
/// ```
#[macro_export]
macro_rules! aff {
    ([ $([$($x:expr),* $(,)*]),+ $(,)* ] + [ $($y:expr),* $(,)* ]) => {{
        $crate::linalg::affine::AffFunc::from_mats(
           ndarray::Array2::<f64>::from(vec![$( [ $( ($x as f64), )* ], )*]),
           ndarray::Array1::<f64>::from(vec![$($y as f64,)*])
        )
    }};
    ([ $($x:expr),* $(,)* ] + $y:expr) => {{
        $crate::linalg::affine::AffFunc::from_mats(
           ndarray::Array2::<f64>::from(vec![ [ $( ($x as f64), )* ]]),
           ndarray::Array1::<f64>::from(vec![$y as f64])
        )
    }};
}
