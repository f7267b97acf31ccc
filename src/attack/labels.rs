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


//! Resolution of attack labels
//!
//! Labels are either supplied by the caller (targeted attack: the classifier
//! should be pushed *towards* them) or derived from the classifier's own
//! predictions (untargeted attack: the classifier should be pushed *away* from them).

use std::ops::Range;

use float_ord::FloatOrd;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayViewD, Axis, Data, Ix2};

use super::error::AttackError;
use crate::model::classifier::Classifier;

/// Labels supplied by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Labels {
    /// One class index per sample.
    Indices(Array1<usize>),
    /// One one-hot row per sample.
    OneHot(Array2<f64>),
}

impl Labels {
    /// Returns the number of samples these labels cover.
    pub fn len(&self) -> usize {
        match self {
            Labels::Indices(idx) => idx.len(),
            Labels::OneHot(mat) => mat.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the labels of the samples in ``range``.
    pub fn slice(&self, range: Range<usize>) -> Labels {
        match self {
            Labels::Indices(idx) => Labels::Indices(idx.slice(s![range]).to_owned()),
            Labels::OneHot(mat) => Labels::OneHot(mat.slice(s![range, ..]).to_owned()),
        }
    }

    /// Converts these labels into a validated one-hot matrix with ``classes`` columns.
    pub fn to_one_hot(&self, classes: usize) -> Result<Array2<f64>, AttackError> {
        match self {
            Labels::Indices(idx) => {
                let mut one_hot = Array2::zeros((idx.len(), classes));
                for (mut row, &label) in one_hot.outer_iter_mut().zip(idx.iter()) {
                    if label >= classes {
                        return Err(AttackError::LabelOutOfBounds { label, classes });
                    }
                    row[label] = 1.;
                }
                Ok(one_hot)
            }
            Labels::OneHot(mat) => {
                if mat.ncols() != classes {
                    return Err(AttackError::ClassCount {
                        expected: classes,
                        got: mat.ncols(),
                    });
                }
                for (row_idx, row) in mat.outer_iter().enumerate() {
                    let ones = row.iter().filter(|&&x| x == 1.).count();
                    let zeros = row.iter().filter(|&&x| x == 0.).count();
                    if ones != 1 || ones + zeros != classes {
                        return Err(AttackError::NotOneHot { row: row_idx });
                    }
                }
                Ok(mat.to_owned())
            }
        }
    }
}

impl From<Vec<usize>> for Labels {
    fn from(value: Vec<usize>) -> Self {
        Labels::Indices(Array1::from(value))
    }
}

impl From<Array1<usize>> for Labels {
    fn from(value: Array1<usize>) -> Self {
        Labels::Indices(value)
    }
}

impl From<Array2<f64>> for Labels {
    fn from(value: Array2<f64>) -> Self {
        Labels::OneHot(value)
    }
}

/// Returns the index of the first maximal entry of every row.
pub fn argmax_rows<S: Data<Elem = f64>>(scores: &ArrayBase<S, Ix2>) -> Array1<usize> {
    scores.map_axis(Axis(1), |row| {
        row.iter()
            .enumerate()
            .fold((0, FloatOrd(f64::NEG_INFINITY)), |(best, value), (idx, &x)| {
                if FloatOrd(x) > value {
                    (idx, FloatOrd(x))
                } else {
                    (best, value)
                }
            })
            .0
    })
}

/// Gets the labels to use in generating adversarial examples for ``x``.
///
/// If ``y`` is given, these labels are used (and validated). A targeted attack
/// requires ``y``. Otherwise, the prediction of ``model`` serves as label for an
/// untargeted attack.
///
/// Returns the one-hot labels and the number of classes.
pub fn get_or_guess_labels<C: Classifier + ?Sized>(
    model: &C,
    x: ArrayViewD<'_, f64>,
    y: Option<&Labels>,
    targeted: bool,
) -> Result<(Array2<f64>, usize), AttackError> {
    if targeted && y.is_none() {
        return Err(AttackError::MissingTargetLabels);
    }

    let preds = model.logits(x.view())?;
    let n_classes = preds.ncols();

    match y {
        Some(labels) => {
            if labels.len() != preds.nrows() {
                return Err(AttackError::LabelCount {
                    expected: preds.nrows(),
                    got: labels.len(),
                });
            }
            Ok((labels.to_one_hot(n_classes)?, n_classes))
        }
        None => {
            let guessed = Labels::Indices(argmax_rows(&preds));
            Ok((guessed.to_one_hot(n_classes)?, n_classes))
        }
    }
}
