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

//! Shapes of the samples a classifier accepts

use std::fmt::Display;

use thiserror::Error;

/// Shape of a single sample (the batch axis is not included).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorShape {
    Flat {
        in_dim: usize,
    },
    /// An image in height x width x channels layout.
    Image {
        height: usize,
        width: usize,
        channels: usize,
    },
}

impl TensorShape {
    /// Returns the number of components this shape supports.
    pub fn max_dim(&self) -> usize {
        match self {
            TensorShape::Flat { in_dim } => *in_dim,
            TensorShape::Image {
                height,
                width,
                channels,
            } => height * width * channels,
        }
    }

    /// Returns the axes of one sample.
    pub fn dims(&self) -> Vec<usize> {
        match self {
            TensorShape::Flat { in_dim } => vec![*in_dim],
            TensorShape::Image {
                height,
                width,
                channels,
            } => vec![*height, *width, *channels],
        }
    }

    /// Checks if this given number of elements is compatible with this shape.
    pub fn compatible_dim(&self, dim: usize) -> Result<(), ShapeError> {
        if self.max_dim() == dim {
            Ok(())
        } else {
            Err(ShapeError::Dim {
                expected: self.max_dim(),
                got: dim,
            })
        }
    }

    /// Checks if the axes of a sample (batch axis excluded) match this shape.
    ///
    /// Flat shapes accept any sample with the right number of components,
    /// image shapes require the exact axes.
    pub fn compatible_sample(&self, sample: &[usize]) -> Result<(), ShapeError> {
        match self {
            TensorShape::Flat { .. } => self.compatible_dim(sample.iter().product()),
            TensorShape::Image { .. } => {
                if sample == self.dims().as_slice() {
                    Ok(())
                } else {
                    Err(ShapeError::Type)
                }
            }
        }
    }
}

impl Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorShape::Flat { in_dim } => {
                write!(f, "[{}]", in_dim)
            }
            TensorShape::Image {
                height,
                width,
                channels,
            } => {
                write!(f, "[{}, {}, {}]", height, width, channels)
            }
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ShapeError {
    #[error("Shape mismatch: expected {expected}, got {got}")]
    Dim { expected: usize, got: usize },
    #[error("Input type is not compatible")]
    Type,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_dim() {
        assert_eq!(TensorShape::Flat { in_dim: 8 }.max_dim(), 8);
        assert_eq!(
            TensorShape::Image {
                height: 4,
                width: 3,
                channels: 2
            }
            .max_dim(),
            24
        );
    }

    #[test]
    fn test_compatible_sample() {
        let flat = TensorShape::Flat { in_dim: 12 };
        assert!(flat.compatible_sample(&[12]).is_ok());
        assert!(flat.compatible_sample(&[3, 4]).is_ok());
        assert_eq!(
            flat.compatible_sample(&[5]),
            Err(ShapeError::Dim {
                expected: 12,
                got: 5
            })
        );

        let image = TensorShape::Image {
            height: 2,
            width: 3,
            channels: 1,
        };
        assert!(image.compatible_sample(&[2, 3, 1]).is_ok());
        assert_eq!(image.compatible_sample(&[3, 2, 1]), Err(ShapeError::Type));
    }

    #[test]
    fn test_display() {
        let image = TensorShape::Image {
            height: 28,
            width: 28,
            channels: 1,
        };
        assert_eq!(format!("{}", image), "[28, 28, 1]");
    }
}
