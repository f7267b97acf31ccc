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


//! Adversarial example generation with the Carlini-Wagner L2 attack

pub mod config;
pub mod cw;
pub mod error;
pub mod labels;
pub mod loss;
pub mod optimizer;
pub mod step;
pub mod transform;
pub mod visitor;
pub mod weighting;

pub use config::AttackConfig;
pub use cw::{carlini_wagner_l2, AttackOutcome, CarliniWagnerL2};
pub use error::AttackError;
pub use labels::Labels;
