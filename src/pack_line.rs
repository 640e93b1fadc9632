//! A single packing worker.
//!
//! Each pack line owns one batch at a time and pulls trucks from the shared
//! input. A truck is either unpacked right away or parked as "restposten"
//! until shutdown. Whenever the batch grows past its threshold it is
//! repacked and the rebuilt trucks go out.
//!
//! Shutdown has two phases: `PackLine::shutdown` sends the request, the
//! worker drains everything it still holds, and the caller observes
//! completion by joining the worker task.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::batch::Batch;
use crate::config::RepackConfig;
use crate::error::{RepackError, Result};
use crate::model::Truck;

/// The input receiver, shared by every pack line.
pub type SharedInput = Arc<Mutex<mpsc::Receiver<Truck>>>;

/// Per-line counters, returned when the line has shut down.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackLineReport {
    pub line: usize,
    pub sent_trucks: usize,
    pub immediate_trucks: usize,
    pub deferred_trucks: usize,
    /// Trucks still queued behind the sentinel when shutdown began.
    pub straggler_trucks: usize,
    /// Trucks emitted empty because of malformed boxes.
    pub skipped_trucks: usize,
    pub batches: usize,
    pub boxes_packed: usize,
    pub pallets_in: usize,
    pub pallets_out: usize,
}

impl PackLineReport {
    pub fn received_trucks(&self) -> usize {
        self.immediate_trucks + self.deferred_trucks + self.straggler_trucks
    }

    /// Share of trucks that were parked until shutdown, in percent.
    pub fn deferred_percent(&self) -> f64 {
        let received = self.received_trucks();
        if received == 0 {
            return 0.0;
        }
        (self.deferred_trucks + self.straggler_trucks) as f64 * 100.0 / received as f64
    }
}

/// Handle to a running pack line.
#[derive(Debug)]
pub struct PackLine {
    id: usize,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<PackLineReport>>,
}

impl PackLine {
    /// Spawns a pack line reading from `input` and writing to `output`.
    ///
    /// `last_truck` is signalled when this line receives the end-of-stream
    /// sentinel, and when it stops on a fatal error.
    pub fn spawn(
        id: usize,
        input: SharedInput,
        output: mpsc::Sender<Truck>,
        last_truck: mpsc::Sender<()>,
        config: &RepackConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        let worker = Worker {
            input,
            output,
            last_truck,
            seen_last_truck: false,
            batch: Batch::new(config.packer(), config.max_box_count),
            restposten: Vec::new(),
            rng,
            restposten_factor: config.restposten_factor,
            report: PackLineReport {
                line: id,
                ..PackLineReport::default()
            },
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(shutdown_rx));
        Self {
            id,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Asks the line to stop, then waits until it has drained.
    ///
    /// A line that already stopped on a fatal error reports that error.
    pub async fn shutdown(mut self) -> Result<PackLineReport> {
        if let Some(tx) = self.shutdown.take() {
            // the worker may be gone already; its result tells why
            let _ = tx.send(());
        }
        self.handle.await?
    }
}

struct Worker {
    input: SharedInput,
    output: mpsc::Sender<Truck>,
    last_truck: mpsc::Sender<()>,
    seen_last_truck: bool,
    batch: Batch,
    restposten: Vec<Truck>,
    rng: StdRng,
    restposten_factor: u8,
    report: PackLineReport,
}

async fn next_truck(input: &SharedInput) -> Option<Truck> {
    input.lock().await.recv().await
}

impl Worker {
    async fn run(self, shutdown: oneshot::Receiver<()>) -> Result<PackLineReport> {
        let line = self.report.line;
        let alarm = self.last_truck.clone();
        let result = self.work(shutdown).await;
        if let Err(err) = &result {
            error!(line, %err, "pack line stopped");
            // wake the supervisor so the other lines shut down too
            let _ = alarm.try_send(());
        }
        result
    }

    async fn work(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<PackLineReport> {
        let input = Arc::clone(&self.input);
        let mut input_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                truck = next_truck(&input), if input_open => match truck {
                    Some(truck) => self.receive(truck).await?,
                    None => {
                        debug!(line = self.report.line, "input closed before the last truck");
                        input_open = false;
                    }
                },
            }
        }

        self.drain(input_open).await
    }

    async fn receive(&mut self, truck: Truck) -> Result<()> {
        if truck.is_sentinel() {
            info!(line = self.report.line, "last truck received");
            if !self.seen_last_truck {
                self.seen_last_truck = true;
                // capacity one: if another line got there first that's fine
                let _ = self.last_truck.try_send(());
            }
            return Ok(());
        }

        if self.defer() {
            self.report.deferred_trucks += 1;
            self.restposten.push(truck);
            return Ok(());
        }

        self.report.immediate_trucks += 1;
        self.batch.unpack_truck(truck);
        if self.batch.is_full() {
            self.flush().await?;
        }
        Ok(())
    }

    fn defer(&mut self) -> bool {
        self.restposten_factor > 0 && self.rng.gen_range(0..100u8) < self.restposten_factor
    }

    /// Repacks the current batch, sends its trucks and starts a new one.
    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let fresh = self.batch.fresh();
        let mut batch = std::mem::replace(&mut self.batch, fresh);
        let (mut batch, packed) = task::spawn_blocking(move || {
            let packed = batch.repack_pallets()?;
            Ok::<_, RepackError>((batch, packed))
        })
        .await??;

        self.report.batches += 1;
        self.report.boxes_packed += packed;
        self.report.pallets_in += batch.open_pallets();
        self.report.pallets_out += batch.packed_pallets();
        self.report.skipped_trucks += batch.skipped_trucks();
        self.report.sent_trucks += batch.send_trucks(&self.output).await?;
        Ok(())
    }

    async fn drain(mut self, input_open: bool) -> Result<PackLineReport> {
        if input_open {
            // the driver closes the input after the sentinel
            while let Some(truck) = next_truck(&self.input).await {
                if truck.is_sentinel() {
                    continue;
                }
                self.report.straggler_trucks += 1;
                self.restposten.push(truck);
            }
        }

        for truck in std::mem::take(&mut self.restposten) {
            self.batch.unpack_truck(truck);
            if self.batch.is_full() {
                self.flush().await?;
            }
        }
        self.flush().await?;

        let report = self.report;
        debug_assert_eq!(report.sent_trucks, report.received_trucks());
        info!(
            line = report.line,
            sent = report.sent_trucks,
            immediate = report.immediate_trucks,
            deferred = report.deferred_trucks,
            stragglers = report.straggler_trucks,
            deferred_percent = format_args!("{:.1}", report.deferred_percent()),
            "pack line finished"
        );
        Ok(report)
    }
}
