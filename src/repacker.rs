//! The repacking pipeline: several pack lines behind one input channel.
//!
//! ```text
//! input ──┬─> PackLine 0 ──┬──> output
//!         ├─> PackLine 1 ──┤
//!         └─> PackLine n ──┘
//! ```
//!
//! A supervisor task waits until some line has seen the last truck, asks
//! every line to shut down and joins them. The output channel closes once
//! the last line has dropped its sender.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RepackConfig;
use crate::error::Result;
use crate::model::Truck;
use crate::pack_line::{PackLine, PackLineReport};
use crate::packer::PackStrategy;

/// Totals of one repacker run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepackSummary {
    pub strategy: PackStrategy,
    pub sent_trucks: usize,
    pub immediate_trucks: usize,
    pub deferred_trucks: usize,
    pub straggler_trucks: usize,
    pub skipped_trucks: usize,
    pub batches: usize,
    pub boxes_packed: usize,
    pub pallets_in: usize,
    pub pallets_out: usize,
    pub lines: Vec<PackLineReport>,
}

impl RepackSummary {
    pub fn from_reports(strategy: PackStrategy, mut lines: Vec<PackLineReport>) -> Self {
        lines.sort_by_key(|r| r.line);
        let mut summary = Self {
            strategy,
            ..Self::default()
        };
        for r in &lines {
            summary.sent_trucks += r.sent_trucks;
            summary.immediate_trucks += r.immediate_trucks;
            summary.deferred_trucks += r.deferred_trucks;
            summary.straggler_trucks += r.straggler_trucks;
            summary.skipped_trucks += r.skipped_trucks;
            summary.batches += r.batches;
            summary.boxes_packed += r.boxes_packed;
            summary.pallets_in += r.pallets_in;
            summary.pallets_out += r.pallets_out;
        }
        summary.lines = lines;
        summary
    }

    pub fn received_trucks(&self) -> usize {
        self.immediate_trucks + self.deferred_trucks + self.straggler_trucks
    }

    /// Pallets no longer needed after repacking.
    pub fn pallets_saved(&self) -> usize {
        self.pallets_in.saturating_sub(self.pallets_out)
    }

    pub fn deferred_percent(&self) -> f64 {
        let received = self.received_trucks();
        if received == 0 {
            return 0.0;
        }
        (self.deferred_trucks + self.straggler_trucks) as f64 * 100.0 / received as f64
    }
}

/// A running repacker.
///
/// ```no_run
/// # async fn demo() -> truck_repacker::error::Result<()> {
/// use tokio::sync::mpsc;
/// use truck_repacker::model::Truck;
/// use truck_repacker::repacker::Repacker;
///
/// let (in_tx, in_rx) = mpsc::channel(16);
/// let (out_tx, mut out_rx) = mpsc::channel(16);
/// let repacker = Repacker::new(in_rx, out_tx);
///
/// in_tx.send(Truck::sentinel()).await.ok();
/// drop(in_tx);
/// while let Some(truck) = out_rx.recv().await {
///     println!("truck {}", truck.id);
/// }
/// let summary = repacker.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Repacker {
    supervisor: JoinHandle<Result<RepackSummary>>,
}

impl Repacker {
    pub fn new(input: mpsc::Receiver<Truck>, output: mpsc::Sender<Truck>) -> Self {
        Self::with_config(input, output, RepackConfig::default())
    }

    /// Starts the pack lines and the supervisor. Must be called within a
    /// tokio runtime.
    pub fn with_config(
        input: mpsc::Receiver<Truck>,
        output: mpsc::Sender<Truck>,
        config: RepackConfig,
    ) -> Self {
        let workers = config.worker_count();
        let input = Arc::new(Mutex::new(input));
        let (last_tx, last_rx) = mpsc::channel(1);

        let lines: Vec<PackLine> = (0..workers)
            .map(|id| {
                PackLine::spawn(
                    id,
                    Arc::clone(&input),
                    output.clone(),
                    last_tx.clone(),
                    &config,
                )
            })
            .collect();

        info!(
            workers,
            strategy = %config.strategy,
            max_box_count = config.max_box_count,
            restposten_factor = config.restposten_factor,
            "repacker started"
        );

        let supervisor = tokio::spawn(supervise(lines, last_rx, config.strategy));
        Self { supervisor }
    }

    /// Waits until every line has drained and the output is closed.
    ///
    /// Returns the first fatal error any line ran into.
    pub async fn wait(self) -> Result<RepackSummary> {
        self.supervisor.await?
    }
}

async fn supervise(
    lines: Vec<PackLine>,
    mut last_truck: mpsc::Receiver<()>,
    strategy: PackStrategy,
) -> Result<RepackSummary> {
    if last_truck.recv().await.is_none() {
        warn!("every pack line stopped before the last truck arrived");
    }
    drop(last_truck);

    info!(lines = lines.len(), "shutting down pack lines");
    let results = join_all(lines.into_iter().map(|line| async move {
        let id = line.id();
        (id, line.shutdown().await)
    }))
    .await;

    let mut reports = Vec::with_capacity(results.len());
    let mut first_err = None;
    for (line, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(line, %err, "pack line failed");
                first_err.get_or_insert(err);
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    let summary = RepackSummary::from_reports(strategy, reports);
    info!(
        trucks = summary.sent_trucks,
        boxes = summary.boxes_packed,
        pallets_in = summary.pallets_in,
        pallets_out = summary.pallets_out,
        deferred_percent = format_args!("{:.1}", summary.deferred_percent()),
        "repacker finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepackError;
    use crate::model::{Box2D, Pallet};

    fn config(workers: usize) -> RepackConfig {
        RepackConfig::builder()
            .workers(Some(workers))
            .restposten_factor(0)
            .seed(Some(3))
            .build()
    }

    #[test]
    fn summary_adds_up_line_reports() {
        let lines = vec![
            PackLineReport {
                line: 1,
                sent_trucks: 3,
                immediate_trucks: 1,
                deferred_trucks: 2,
                pallets_in: 6,
                pallets_out: 2,
                ..PackLineReport::default()
            },
            PackLineReport {
                line: 0,
                sent_trucks: 1,
                straggler_trucks: 1,
                pallets_in: 1,
                pallets_out: 1,
                ..PackLineReport::default()
            },
        ];
        let summary = RepackSummary::from_reports(PackStrategy::Ffd, lines);
        assert_eq!(summary.sent_trucks, 4);
        assert_eq!(summary.received_trucks(), 4);
        assert_eq!(summary.pallets_saved(), 4);
        assert_eq!(summary.deferred_percent(), 75.0);
        assert_eq!(summary.lines[0].line, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["strategy"], "ffd");
        assert_eq!(json["lines"].as_array().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sentinel_only_stream_closes_output() {
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let repacker = Repacker::with_config(in_rx, out_tx, config(3));

        in_tx.send(Truck::sentinel()).await.unwrap();
        drop(in_tx);

        assert!(out_rx.recv().await.is_none());
        let summary = repacker.wait().await.unwrap();
        assert_eq!(summary.sent_trucks, 0);
        assert_eq!(summary.lines.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn output_closed_is_reported_by_wait() {
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(4);
        drop(out_rx);
        let repacker = Repacker::with_config(in_rx, out_tx, config(1));

        let truck = Truck::new(4, vec![Pallet::new(vec![Box2D { x: 0, y: 0, w: 1, l: 1, id: 1 }])]);
        in_tx.send(truck).await.unwrap();
        in_tx.send(Truck::sentinel()).await.unwrap();
        drop(in_tx);

        let err = repacker.wait().await.unwrap_err();
        assert!(matches!(err, RepackError::OutputClosed { truck: 4 }));
    }
}
