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

//! Feed-forward classifiers composed of affine layers and piece-wise linear activations

use std::borrow::Borrow;
use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use itertools::Itertools;
use log::debug;
use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn, Zip};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError};
use regex::Regex;
use thiserror::Error;

use super::arch::{ShapeError, TensorShape};
use super::classifier::Classifier;
use crate::linalg::affine::AffFunc;

/// A simple enum type to conveniently specify the layer structure of a neural network.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// A fully connected linear layer
    Linear(AffFunc),
    /// The ReLU applied to every component of the input
    ReLU,
    /// The leaky ReLU with the given negative slope
    LeakyReLU(f64),
    /// The hard hyperbolic tangent, clamping to [-1, 1]
    HardTanh,
    /// The hard sigmoid x / 6 + 1 / 2, clamped to [0, 1]
    HardSigmoid,
}

impl Layer {
    /// Applies this layer to every row of ``input``.
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Linear(aff) => aff.apply_rows(input),
            Layer::ReLU => input.mapv(|x| x.max(0.)),
            Layer::LeakyReLU(alpha) => input.mapv(|x| if x > 0. { x } else { alpha * x }),
            Layer::HardTanh => input.mapv(|x| x.clamp(-1., 1.)),
            Layer::HardSigmoid => input.mapv(|x| (x / 6. + 0.5).clamp(0., 1.)),
        }
    }

    /// Pulls ``gradient`` (with respect to the output of this layer) back to its ``input``.
    pub fn backward(&self, input: &Array2<f64>, gradient: &Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Linear(aff) => aff.pullback_rows(gradient),
            Layer::ReLU => scale_by_slope(input, gradient, |x| if x > 0. { 1. } else { 0. }),
            Layer::LeakyReLU(alpha) => {
                scale_by_slope(input, gradient, |x| if x > 0. { 1. } else { *alpha })
            }
            Layer::HardTanh => {
                scale_by_slope(input, gradient, |x| if x > -1. && x < 1. { 1. } else { 0. })
            }
            Layer::HardSigmoid => {
                scale_by_slope(input, gradient, |x| if x > -3. && x < 3. { 1. / 6. } else { 0. })
            }
        }
    }
}

fn scale_by_slope<F>(input: &Array2<f64>, gradient: &Array2<f64>, slope: F) -> Array2<f64>
where
    F: Fn(f64) -> f64,
{
    let mut result = gradient.to_owned();
    Zip::from(&mut result)
        .and(input)
        .for_each(|grad, &x| *grad *= slope(x));
    result
}

/// A feed-forward classifier.
///
/// Samples of ``input_shape`` are flattened in row-major order before the first layer.
#[derive(Clone, Debug)]
pub struct Network {
    pub input_shape: TensorShape,
    pub current_shape: TensorShape,
    /// All layers together with the shape after the layer
    pub layers: Vec<(Layer, TensorShape)>,
}

impl Network {
    /// Creates a new network without layers, i.e., the identity on ``input_shape``.
    pub fn new(input_shape: TensorShape) -> Network {
        Network {
            input_shape,
            current_shape: input_shape,
            layers: Vec::new(),
        }
    }

    /// Creates a network from a sequence of layers.
    pub fn from_layers<I>(input_shape: TensorShape, layers: I) -> Result<Network, ShapeError>
    where
        I: IntoIterator,
        I::Item: Borrow<Layer>,
    {
        let mut network = Network::new(input_shape);
        for layer in layers {
            match layer.borrow() {
                Layer::Linear(aff) => network.linear(aff.clone())?,
                activation => network.push(activation.clone()),
            }
        }
        Ok(network)
    }

    /// Reads the layers stored in an npz archive (see [`read_layers`]).
    pub fn read<P: AsRef<Path>>(path: &P, input_shape: TensorShape) -> Result<Network, LoadError> {
        let layers = read_layers(path)?;
        let network = Network::from_layers(input_shape, &layers)?;
        debug!("Loaded network:\n{}", network);
        Ok(network)
    }

    /// Adds a linear layer to this network.
    pub fn linear(&mut self, aff: AffFunc) -> Result<(), ShapeError> {
        self.current_shape.compatible_dim(aff.indim())?;
        self.current_shape = TensorShape::Flat {
            in_dim: aff.outdim(),
        };
        self.layers.push((Layer::Linear(aff), self.current_shape));
        Ok(())
    }

    /// Adds a ReLU activation layer to this network.
    pub fn relu(&mut self) {
        self.push(Layer::ReLU);
    }

    /// Adds a leaky ReLU activation layer to this network.
    pub fn leaky_relu(&mut self, alpha: f64) {
        self.push(Layer::LeakyReLU(alpha));
    }

    /// Adds a hard tanh activation layer to this network.
    pub fn hard_tanh(&mut self) {
        self.push(Layer::HardTanh);
    }

    /// Adds a hard sigmoid activation layer to this network.
    pub fn hard_sigmoid(&mut self) {
        self.push(Layer::HardSigmoid);
    }

    fn push(&mut self, activation: Layer) {
        self.layers.push((activation, self.current_shape));
    }

    /// Returns the number of output components (classes).
    pub fn out_dim(&self) -> usize {
        self.current_shape.max_dim()
    }

    /// Returns the layers of this network.
    #[rustfmt::skip]
    pub fn operators(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
            .map(|(op, _)| op)
    }

    fn flatten(&self, batch: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ShapeError> {
        if batch.ndim() < 2 {
            return Err(ShapeError::Type);
        }
        self.input_shape.compatible_sample(&batch.shape()[1..])?;

        let n = batch.len_of(Axis(0));
        let dim = self.input_shape.max_dim();
        Array2::from_shape_vec((n, dim), batch.iter().copied().collect()).map_err(|_| {
            ShapeError::Dim {
                expected: n * dim,
                got: batch.len(),
            }
        })
    }

    /// Returns the inputs of every layer followed by the output of the last layer.
    fn trace(&self, input: Array2<f64>) -> Vec<Array2<f64>> {
        let mut values = Vec::with_capacity(self.layers.len() + 1);
        values.push(input);
        for layer in self.operators() {
            let next = layer.forward(&values[values.len() - 1]);
            values.push(next);
        }
        values
    }
}

impl Classifier for Network {
    fn logits(&self, batch: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ShapeError> {
        let input = self.flatten(batch)?;
        Ok(self
            .operators()
            .fold(input, |value, layer| layer.forward(&value)))
    }

    fn input_gradient(
        &self,
        batch: ArrayViewD<'_, f64>,
        output_gradient: ArrayView2<'_, f64>,
    ) -> Result<ArrayD<f64>, ShapeError> {
        let n = batch.len_of(Axis(0));
        if output_gradient.dim() != (n, self.out_dim()) {
            return Err(ShapeError::Dim {
                expected: n * self.out_dim(),
                got: output_gradient.len(),
            });
        }

        let values = self.trace(self.flatten(batch.view())?);
        let mut gradient = output_gradient.to_owned();
        for ((layer, _), input) in self.layers.iter().zip(&values[..self.layers.len()]).rev() {
            gradient = layer.backward(input, &gradient);
        }

        ArrayD::from_shape_vec(IxDyn(batch.shape()), gradient.iter().copied().collect()).map_err(
            |_| ShapeError::Dim {
                expected: batch.len(),
                got: gradient.len(),
            },
        )
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:<30}   {:>16}", "Layer", "Shape")?;
        writeln!(f, "{:=<30}==={:=>16}", "=", "=")?;
        writeln!(f, "{:<30}   {:>16}", "Input", self.input_shape)?;

        for (layer, shape) in self.layers.iter() {
            let descr = match layer {
                Layer::Linear(aff) => {
                    format!("Linear ({}x{})", aff.indim(), aff.outdim())
                }
                Layer::ReLU => "ReLU".to_string(),
                Layer::LeakyReLU(alpha) => {
                    format!("LeakyReLU (alpha={})", alpha)
                }
                Layer::HardTanh => "HardTanh".to_string(),
                Layer::HardSigmoid => "HardSigmoid".to_string(),
            };
            writeln!(f, "{:<30}   {:>16}", descr, shape)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Npz(#[from] ReadNpzError),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Reads a sequence of layers from an npz archive.
///
/// Entries are named ``<idx>.linear.weights.npy`` and ``<idx>.linear.bias.npy`` for
/// linear layers and ``<idx>.relu.npy``, ``<idx>.hard_tanh.npy`` or ``<idx>.hard_sigmoid.npy``
/// for activations. ``<idx>.leaky_relu.npy`` holds a single element, the negative slope.
/// Layers are ordered by their numeric index; other entries are ignored.
pub fn read_layers<P: AsRef<Path>>(path: &P) -> Result<Vec<Layer>, LoadError> {
    let file = File::open(path).map_err(|err| ReadNpzError::from(ReadNpyError::from(err)))?;
    let mut npz = NpzReader::new(file)?;

    let pattern = Regex::new(r"^(\d+)\.(linear\.weights|relu|leaky_relu|hard_tanh|hard_sigmoid)\.npy$")?;

    let entries = npz
        .names()?
        .iter()
        .filter_map(|name| {
            let captures = pattern.captures(name)?;
            let idx = captures.get(1)?.as_str().parse::<usize>().ok()?;
            Some((idx, captures.get(2)?.as_str().to_string()))
        })
        .sorted()
        .collect_vec();

    let mut layers = Vec::with_capacity(entries.len());
    for (idx, kind) in entries {
        let layer = match kind.as_str() {
            "relu" => Layer::ReLU,
            "leaky_relu" => {
                let alpha: Array1<f64> = npz.by_name(&format!("{}.leaky_relu.npy", idx))?;
                if alpha.len() != 1 {
                    return Err(ShapeError::Dim {
                        expected: 1,
                        got: alpha.len(),
                    }
                    .into());
                }
                Layer::LeakyReLU(alpha[0])
            }
            "hard_tanh" => Layer::HardTanh,
            "hard_sigmoid" => Layer::HardSigmoid,
            _ => Layer::Linear(AffFunc::from_mats(
                npz.by_name(&format!("{}.linear.weights.npy", idx))?,
                npz.by_name(&format!("{}.linear.bias.npy", idx))?,
            )),
        };
        layers.push(layer);
    }

    Ok(layers)
}
