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


//! Observers of the attack progress
//!
//! The attack reports its progress through the [`AttackVisitor`] trait. The crate ships a
//! silent visitor, a console visitor with a progress bar, and a visitor that records
//! every binary search round in a CSV file.

use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

use average::Mean;
use console::style;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::warn;
use ndarray::ArrayView1;

use super::config::AttackConfig;

/// Statistics of one binary search round of one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundSummary {
    pub batch: usize,
    pub round: usize,
    /// Number of optimizer steps performed in this round.
    pub iterations: usize,
    pub aborted_early: bool,
    /// Samples for which an adversarial example was found in this round.
    pub successes: usize,
    /// Mean distortion of the successful samples, if any.
    pub mean_l2: Option<f64>,
    pub mean_const: f64,
}

impl RoundSummary {
    /// Summarizes a round from its constants and the best distortion found per sample
    /// (`+inf` for samples without success).
    pub fn new(
        batch: usize,
        round: usize,
        iterations: usize,
        aborted_early: bool,
        consts: ArrayView1<'_, f64>,
        best_l2: ArrayView1<'_, f64>,
    ) -> RoundSummary {
        let l2: Mean = best_l2.iter().copied().filter(|v| v.is_finite()).collect();
        let mean_const: Mean = consts.iter().copied().collect();
        RoundSummary {
            batch,
            round,
            iterations,
            aborted_early,
            successes: l2.len() as usize,
            mean_l2: if l2.len() == 0 { None } else { Some(l2.mean()) },
            mean_const: mean_const.mean(),
        }
    }
}

pub trait AttackVisitor {
    fn start_attack(&mut self, n_samples: usize, n_batches: usize, config: &AttackConfig);
    fn start_batch(&mut self, batch: usize, samples: Range<usize>);
    fn start_round(&mut self, round: usize, consts: ArrayView1<'_, f64>);
    fn finish_iteration(&mut self, iteration: usize, loss: f64);
    fn finish_round(&mut self, summary: &RoundSummary);
    fn finish_batch(&mut self, batch: usize, successes: usize, batch_size: usize);
    fn finish_attack(&mut self, successes: usize, n_samples: usize);
}

impl<V: AttackVisitor + ?Sized> AttackVisitor for &mut V {
    fn start_attack(&mut self, n_samples: usize, n_batches: usize, config: &AttackConfig) {
        (**self).start_attack(n_samples, n_batches, config)
    }
    fn start_batch(&mut self, batch: usize, samples: Range<usize>) {
        (**self).start_batch(batch, samples)
    }
    fn start_round(&mut self, round: usize, consts: ArrayView1<'_, f64>) {
        (**self).start_round(round, consts)
    }
    fn finish_iteration(&mut self, iteration: usize, loss: f64) {
        (**self).finish_iteration(iteration, loss)
    }
    fn finish_round(&mut self, summary: &RoundSummary) {
        (**self).finish_round(summary)
    }
    fn finish_batch(&mut self, batch: usize, successes: usize, batch_size: usize) {
        (**self).finish_batch(batch, successes, batch_size)
    }
    fn finish_attack(&mut self, successes: usize, n_samples: usize) {
        (**self).finish_attack(successes, n_samples)
    }
}

fn round_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{: >12} {}",
            style("Attacking").cyan().bold(),
            "[{bar:25}] {pos:>2}/{len:2} ({elapsed})"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Prints the progress of the attack to the terminal.
#[derive(Clone, Debug)]
pub struct AttackConsole {
    pb: ProgressBar,
    timer: Instant,
    batch_timer: Instant,
    max_iterations: usize,
}

impl AttackConsole {
    pub fn new() -> AttackConsole {
        AttackConsole {
            pb: ProgressBar::hidden(),
            timer: Instant::now(),
            batch_timer: Instant::now(),
            max_iterations: 0,
        }
    }
}

impl Default for AttackConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl AttackVisitor for AttackConsole {
    fn start_attack(&mut self, n_samples: usize, n_batches: usize, config: &AttackConfig) {
        println!("Samples: {} in {} batches", n_samples, n_batches);
        println!(
            "Binary search steps: {}, max iterations: {}",
            config.binary_search_steps, config.max_iterations
        );
        self.max_iterations = config.max_iterations;
        self.timer = Instant::now();
    }

    fn start_batch(&mut self, batch: usize, samples: Range<usize>) {
        self.pb = ProgressBar::new(self.max_iterations as u64);
        self.pb.set_style(round_style());
        self.pb.enable_steady_tick(Duration::from_secs(5));
        self.pb.println(format!(
            "{: >12} batch {} (samples {}..{})",
            style("Starting").cyan().bold(),
            batch,
            samples.start,
            samples.end
        ));
        self.batch_timer = Instant::now();
    }

    fn start_round(&mut self, _round: usize, _consts: ArrayView1<'_, f64>) {
        self.pb.set_position(0);
    }

    fn finish_iteration(&mut self, iteration: usize, _loss: f64) {
        self.pb.set_position(iteration as u64 + 1);
    }

    fn finish_round(&mut self, summary: &RoundSummary) {
        let l2 = summary
            .mean_l2
            .map_or_else(|| String::from("-"), |v| format!("{:.4}", v));
        self.pb.println(format!(
            "{: >12} round {} after {} iterations{} ({} successes, mean l2 {}, mean const {:.4})",
            style("Finished").green().bold(),
            summary.round,
            summary.iterations,
            if summary.aborted_early { " (aborted early)" } else { "" },
            summary.successes,
            l2,
            summary.mean_const
        ));
    }

    fn finish_batch(&mut self, batch: usize, successes: usize, batch_size: usize) {
        self.pb.finish_and_clear();
        println!(
            "{: >12} batch {} in {:#} ({}/{} adversarial)",
            style("Finished").green().bold(),
            batch,
            HumanDuration(self.batch_timer.elapsed()),
            successes,
            batch_size
        );
    }

    fn finish_attack(&mut self, successes: usize, n_samples: usize) {
        println!(
            "\n{: >12} attack in {:#} ({}/{} adversarial)",
            style("Completed").green().bold(),
            HumanDuration(self.timer.elapsed()),
            successes,
            n_samples
        );
    }
}

#[derive(serde::Serialize)]
struct CsvRow {
    batch: usize,
    round: usize,
    iterations: usize,
    aborted_early: bool,
    successes: usize,
    mean_l2: Option<f64>,
    mean_const: f64,
    time_ms: u128,
}

/// Writes one row per binary search round to a CSV file.
#[derive(Debug)]
pub struct AttackCsv {
    writer: csv::Writer<File>,
    timer: Instant,
}

impl AttackCsv {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<AttackCsv, csv::Error> {
        Ok(AttackCsv {
            writer: csv::Writer::from_path(path)?,
            timer: Instant::now(),
        })
    }
}

impl AttackVisitor for AttackCsv {
    fn start_attack(&mut self, _: usize, _: usize, _: &AttackConfig) {}

    fn start_batch(&mut self, _: usize, _: Range<usize>) {}

    fn start_round(&mut self, _: usize, _: ArrayView1<'_, f64>) {
        self.timer = Instant::now();
    }

    fn finish_iteration(&mut self, _: usize, _: f64) {}

    fn finish_round(&mut self, summary: &RoundSummary) {
        let row = CsvRow {
            batch: summary.batch,
            round: summary.round,
            iterations: summary.iterations,
            aborted_early: summary.aborted_early,
            successes: summary.successes,
            mean_l2: summary.mean_l2,
            mean_const: summary.mean_const,
            time_ms: self.timer.elapsed().as_millis(),
        };
        if let Err(err) = self.writer.serialize(row) {
            warn!("Failed to write round summary: {}", err);
        }
        if let Err(err) = self.writer.flush() {
            warn!("Failed to flush round summaries: {}", err);
        }
    }

    fn finish_batch(&mut self, _: usize, _: usize, _: usize) {}

    fn finish_attack(&mut self, _: usize, _: usize) {
        if let Err(err) = self.writer.flush() {
            warn!("Failed to flush round summaries: {}", err);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoOpVis {}

impl AttackVisitor for NoOpVis {
    fn start_attack(&mut self, _: usize, _: usize, _: &AttackConfig) {}
    fn start_batch(&mut self, _: usize, _: Range<usize>) {}
    fn start_round(&mut self, _: usize, _: ArrayView1<'_, f64>) {}
    fn finish_iteration(&mut self, _: usize, _: f64) {}
    fn finish_round(&mut self, _: &RoundSummary) {}
    fn finish_batch(&mut self, _: usize, _: usize, _: usize) {}
    fn finish_attack(&mut self, _: usize, _: usize) {}
}

/// Counts the samples of a batch whose best class is set.
pub fn count_successes<T>(classes: ArrayView1<'_, Option<T>>) -> usize {
    classes.iter().filter(|class| class.is_some()).count()
}
