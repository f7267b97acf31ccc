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

//! Conditional element-wise selection between two arrays

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, IxDyn, Zip};

/// Returns a copy of ``base`` where every element selected by ``mask`` is replaced
/// by the corresponding element of ``replacement``.
///
/// The shape of ``mask`` must be a prefix of the shape of ``base``; it is
/// broadcast along all remaining axes. A mask of shape `[n]` therefore selects whole
/// samples of a batch of shape `[n, ...]`, while a mask of the full shape selects
/// individual elements.
///
/// # Example
///
/// ```rust
/// use carlini_wagner::linalg::select::set_with_mask;
/// use ndarray::{arr1, arr2};
///
/// let base = arr2(&[[1., 2.], [3., 4.]]);
/// let other = arr2(&[[0., 0.], [9., 9.]]);
///
/// let out = set_with_mask(&base, &other, &arr1(&[false, true]));
/// assert_eq!(out, arr2(&[[1., 2.], [9., 9.]]));
/// ```
pub fn set_with_mask<A, S1, S2, SM, D, E>(
    base: &ArrayBase<S1, D>,
    replacement: &ArrayBase<S2, D>,
    mask: &ArrayBase<SM, E>,
) -> Array<A, D>
where
    A: Clone,
    S1: Data<Elem = A>,
    S2: Data<Elem = A>,
    SM: Data<Elem = bool>,
    D: Dimension,
    E: Dimension,
{
    assert_eq!(
        base.shape(),
        replacement.shape(),
        "Shape mismatch of base and replacement: {:?} and {:?}",
        base.shape(),
        replacement.shape()
    );
    assert!(
        mask.ndim() <= base.ndim() && mask.shape() == &base.shape()[..mask.ndim()],
        "Mask of shape {:?} cannot be broadcast to {:?}",
        mask.shape(),
        base.shape()
    );

    let mut expanded = mask.view().into_dyn();
    while expanded.ndim() < base.ndim() {
        let axis = Axis(expanded.ndim());
        expanded = expanded.insert_axis(axis);
    }
    let target = IxDyn(base.shape());
    let broadcast = expanded.broadcast(target).unwrap_or_else(|| {
        panic!(
            "Mask of shape {:?} cannot be broadcast to {:?}",
            mask.shape(),
            base.shape()
        )
    });

    let mut result = base.to_owned();
    Zip::from(result.view_mut().into_dyn())
        .and(replacement.view().into_dyn())
        .and(&broadcast)
        .for_each(|out, other, &selected| {
            if selected {
                *out = other.clone();
            }
        });
    result
}
