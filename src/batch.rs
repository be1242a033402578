//! The batch runner: a strictly sequential loop over work items with
//! usage accounting and operator-controlled failure recovery.
//!
//! ## Why one runner for both stages?
//!
//! Rendering page chunks and transcribing page images share everything but
//! the external call: items must run in order, each gets timed, usage and
//! cost accumulate, outputs are persisted, and a failure is either skipped or
//! ends the run. The stage-specific part is the [`UnitOfWork`] strategy; the
//! skip-or-abort choice is the [`FailureDecision`] strategy.
//!
//! ## State machine
//!
//! ```text
//!             invoke ok                      decision = Continue
//!   RUNNING ─────────────▶ RUNNING     ITEM_FAILED ───────────────▶ RUNNING
//!      │                                    │
//!      │ invoke / persist failed            │ decision = Abort
//!      └──────────────▶ ITEM_FAILED         └──────▶ ABORTED  (Err(BatchAborted))
//!
//!   items exhausted ──▶ COMPLETED (Ok(BatchReport))
//! ```
//!
//! A failed item is never retried within the run.

use crate::artifact::{ArtifactHeader, ArtifactWriter};
use crate::error::{ItemError, ScribeError};
use crate::progress::{BatchProgress, ProgressCallback};
use crate::usage::{UsageRates, UsageRecord, UsageTotals};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Strategy: the external unit of work ──────────────────────────────────────

/// Text produced for one item, to be persisted as an artifact.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The input the text was produced from (recorded in the header).
    pub source_path: PathBuf,
    /// Where the artifact goes.
    pub output_path: PathBuf,
    pub text: String,
    pub usage: UsageRecord,
}

/// What a successful [`UnitOfWork::invoke`] produced.
#[derive(Debug, Clone)]
pub enum WorkOutput {
    /// Files the collaborator already wrote itself (rendered page images).
    Images(Vec<PathBuf>),
    /// Text the runner must persist through the [`ArtifactWriter`].
    Transcript(Transcript),
}

impl WorkOutput {
    pub fn usage(&self) -> UsageRecord {
        match self {
            WorkOutput::Images(_) => UsageRecord::default(),
            WorkOutput::Transcript(t) => t.usage,
        }
    }
}

/// One stage of the pipeline: how to process a single item.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Item: Send + Sync;

    /// Short noun for the items, used in messages ("page chunks", "page images").
    fn item_kind(&self) -> &'static str;

    /// Human-readable label for one item.
    fn label(&self, item: &Self::Item) -> String;

    /// Call the external collaborator for `item`.
    async fn invoke(&self, item: &Self::Item) -> Result<WorkOutput, ItemError>;
}

// ── Strategy: what to do after a failure ─────────────────────────────────────

/// The outcome of a [`FailureDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Skip the failed item and carry on with the next one.
    Continue,
    /// Stop the run; nothing further is started.
    Abort,
}

/// Everything a decision policy may look at.
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub progress: BatchProgress,
    pub label: &'a str,
    pub error: &'a ItemError,
    /// Usage recorded so far. Includes the failed item when its call
    /// succeeded but its output could not be persisted.
    pub totals: &'a UsageTotals,
    pub cost_usd: f64,
    /// Items that succeeded before this one.
    pub completed: usize,
    /// Failures in this run so far, including this one.
    pub failures: usize,
}

/// Decides whether a run survives an item failure.
///
/// The CLI asks a human; tests and unattended jobs plug in one of the fixed
/// policies below. Implementations may block (e.g. on stdin).
pub trait FailureDecision: Send + Sync {
    fn decide(&self, failure: &FailureContext<'_>) -> Decision;
}

/// Skip every failed item.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl FailureDecision for AlwaysContinue {
    fn decide(&self, _failure: &FailureContext<'_>) -> Decision {
        Decision::Continue
    }
}

/// Abort on the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAbort;

impl FailureDecision for AlwaysAbort {
    fn decide(&self, _failure: &FailureContext<'_>) -> Decision {
        Decision::Abort
    }
}

/// Skip failures until the n-th one, then abort.
#[derive(Debug, Clone, Copy)]
pub struct AbortAfter(pub usize);

impl FailureDecision for AbortAfter {
    fn decide(&self, failure: &FailureContext<'_>) -> Decision {
        if failure.failures >= self.0 {
            Decision::Abort
        } else {
            Decision::Continue
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Running,
    ItemFailed,
    Aborted,
    Completed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Running => "RUNNING",
            BatchState::ItemFailed => "ITEM_FAILED",
            BatchState::Aborted => "ABORTED",
            BatchState::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// A skipped item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub label: String,
    pub error: ItemError,
}

/// Summary of a run that reached [`BatchState::Completed`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub state: BatchState,
    pub total_items: usize,
    /// Items whose output was persisted.
    pub completed: usize,
    /// Files written, in item order.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<ItemFailure>,
    pub totals: UsageTotals,
    pub cost_usd: f64,
    pub elapsed_ms: u64,
}

// ── Runner ───────────────────────────────────────────────────────────────────

/// Drives a [`UnitOfWork`] over a list of items.
#[derive(Clone)]
pub struct BatchRunner {
    writer: ArtifactWriter,
    rates: UsageRates,
    decision: Arc<dyn FailureDecision>,
    progress: Option<ProgressCallback>,
}

impl BatchRunner {
    pub fn new(decision: Arc<dyn FailureDecision>) -> Self {
        Self {
            writer: ArtifactWriter::default(),
            rates: UsageRates::default(),
            decision,
            progress: None,
        }
    }

    pub fn with_writer(mut self, writer: ArtifactWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_rates(mut self, rates: UsageRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Process `items` in order.
    ///
    /// # Errors
    /// - [`ScribeError::NoWork`] when `items` is empty (nothing is started)
    /// - [`ScribeError::BatchAborted`] when the decision policy aborts; outputs
    ///   of earlier items stay on disk
    pub async fn run<W: UnitOfWork>(
        &self,
        work: &W,
        items: &[W::Item],
    ) -> Result<BatchReport, ScribeError> {
        if items.is_empty() {
            return Err(ScribeError::NoWork(format!(
                "no {} to process",
                work.item_kind()
            )));
        }

        let started = Instant::now();
        let total = items.len();
        let mut state = BatchState::Running;
        let mut totals = UsageTotals::default();
        let mut outputs = Vec::new();
        let mut failures: Vec<ItemFailure> = Vec::new();
        let mut completed = 0usize;

        info!("Processing {} {}", total, work.item_kind());
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        for (index, item) in items.iter().enumerate() {
            let progress = BatchProgress { index, total };
            let label = work.label(item);
            if let Some(ref cb) = self.progress {
                cb.on_item_start(progress, &label);
            }

            let item_start = Instant::now();
            let result = match work.invoke(item).await {
                Ok(output) => {
                    let elapsed = item_start.elapsed();
                    let usage = output.usage();
                    totals.record(usage);
                    self.persist(output, usage, elapsed)
                        .await
                        .map(|files| (files, elapsed))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok((files, elapsed)) => {
                    completed += 1;
                    outputs.extend(files);
                    let cost = self.rates.cost_of_totals(&totals);
                    info!(
                        "[{}/{}] {} done in {:.1}s — {} in / {} out, ${:.4} so far",
                        progress.ordinal(),
                        total,
                        label,
                        elapsed.as_secs_f64(),
                        totals.input_tokens,
                        totals.output_tokens,
                        cost
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_item_complete(progress, &label, elapsed, &totals, cost);
                    }
                }
                Err(error) => {
                    transition(&mut state, BatchState::ItemFailed);
                    let cost = self.rates.cost_of_totals(&totals);
                    warn!(
                        "[{}/{}] {} failed: {} ({} in / {} out, ${:.4} so far)",
                        progress.ordinal(),
                        total,
                        label,
                        error,
                        totals.input_tokens,
                        totals.output_tokens,
                        cost
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_item_error(progress, &label, &error);
                    }

                    let decision = self.decision.decide(&FailureContext {
                        progress,
                        label: &label,
                        error: &error,
                        totals: &totals,
                        cost_usd: cost,
                        completed,
                        failures: failures.len() + 1,
                    });

                    match decision {
                        Decision::Abort => {
                            transition(&mut state, BatchState::Aborted);
                            let elapsed = started.elapsed();
                            warn!(
                                "Aborted after {}/{} {} in {:.1}s, ${:.4} spent",
                                completed,
                                total,
                                work.item_kind(),
                                elapsed.as_secs_f64(),
                                cost
                            );
                            return Err(ScribeError::BatchAborted {
                                completed,
                                total,
                                elapsed_secs: elapsed.as_secs_f64(),
                                input_tokens: totals.input_tokens,
                                output_tokens: totals.output_tokens,
                                cost_usd: cost,
                            });
                        }
                        Decision::Continue => {
                            failures.push(ItemFailure {
                                index,
                                label,
                                error,
                            });
                            transition(&mut state, BatchState::Running);
                        }
                    }
                }
            }
        }

        transition(&mut state, BatchState::Completed);
        let elapsed = started.elapsed();
        let cost_usd = self.rates.cost_of_totals(&totals);
        info!(
            "Completed {}/{} {} in {:.1}s — {} tokens in / {} tokens out, ${:.4}",
            completed,
            total,
            work.item_kind(),
            elapsed.as_secs_f64(),
            totals.input_tokens,
            totals.output_tokens,
            cost_usd
        );

        let report = BatchReport {
            state,
            total_items: total,
            completed,
            outputs,
            failures,
            totals,
            cost_usd,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(&report);
        }
        Ok(report)
    }

    /// Persist one item's output and return the files it consists of.
    async fn persist(
        &self,
        output: WorkOutput,
        usage: UsageRecord,
        elapsed: Duration,
    ) -> Result<Vec<PathBuf>, ItemError> {
        match output {
            WorkOutput::Images(files) => Ok(files),
            WorkOutput::Transcript(t) => {
                let header =
                    ArtifactHeader::new(&t.source_path, usage, elapsed, self.rates.cost(usage));
                let path = self.writer.write(&t.output_path, &header, &t.text).await?;
                Ok(vec![path])
            }
        }
    }
}

fn transition(state: &mut BatchState, next: BatchState) {
    debug!("Batch state {} → {}", state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_failures(n: usize) -> Decision {
        let error = ItemError::external("x", "y");
        let totals = UsageTotals::default();
        AbortAfter(3).decide(&FailureContext {
            progress: BatchProgress { index: 0, total: 1 },
            label: "x",
            error: &error,
            totals: &totals,
            cost_usd: 0.0,
            completed: 0,
            failures: n,
        })
    }

    #[test]
    fn abort_after_counts_failures() {
        assert_eq!(ctx_with_failures(1), Decision::Continue);
        assert_eq!(ctx_with_failures(2), Decision::Continue);
        assert_eq!(ctx_with_failures(3), Decision::Abort);
    }

    #[test]
    fn state_names() {
        assert_eq!(BatchState::ItemFailed.to_string(), "ITEM_FAILED");
        assert_eq!(
            serde_json::to_string(&BatchState::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }

    #[test]
    fn images_carry_no_usage() {
        let out = WorkOutput::Images(vec![PathBuf::from("a.png")]);
        assert_eq!(out.usage(), UsageRecord::default());
    }
}
