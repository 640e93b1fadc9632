// src/main.rs
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use truck_repacker::audit::{ConservationLedger, LedgerReport};
use truck_repacker::generator::TruckGenerator;
use truck_repacker::{AppConfig, RepackSummary, Repacker, Truck};

#[derive(Serialize)]
struct RunSummary<'a> {
    repacker: &'a RepackSummary,
    ledger: &'a LedgerReport,
}

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ could not load .env: {}", err);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app_config = AppConfig::from_env();
    let repack_config = app_config.repack;
    let driver_config = app_config.driver;

    println!("🚚 Truck repacker starting...");

    let capacity = repack_config.channel_capacity();
    let (in_tx, in_rx) = mpsc::channel::<Truck>(capacity);
    let (out_tx, out_rx) = mpsc::channel::<Truck>(capacity);
    let repacker = Repacker::with_config(in_rx, out_tx, repack_config);

    let mut generator = TruckGenerator::new(driver_config.generator_seed)
        .with_pallet_fill(driver_config.pallet_fill);
    let mut incoming = generator.trucks(driver_config.trucks);
    incoming.push(Truck::sentinel());

    let mut ledger = ConservationLedger::new();
    for truck in &incoming {
        ledger.record_input(truck);
    }

    let feeder = tokio::spawn(async move {
        for truck in incoming {
            if in_tx.send(truck).await.is_err() {
                error!("input channel closed before all trucks were sent");
                break;
            }
        }
        // dropping the sender closes the input
    });

    let mut outgoing = ReceiverStream::new(out_rx);
    while let Some(truck) = outgoing.next().await {
        let audit = ledger.check_output(&truck);
        for pallet in &truck.pallets {
            debug!(truck = truck.id, ok = audit.is_ok(), pallet = %pallet.one_line(), "departing");
        }
    }

    if let Err(err) = feeder.await {
        error!(%err, "feeder task failed");
    }

    let summary = match repacker.wait().await {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("❌ Repacking failed: {}", err);
            std::process::exit(1);
        }
    };
    let report = ledger.finish();
    info!(clean = report.is_clean(), "output audited");

    if driver_config.json_summary {
        let run = RunSummary {
            repacker: &summary,
            ledger: &report,
        };
        match serde_json::to_string_pretty(&run) {
            Ok(json) => println!("{}", json),
            Err(err) => eprintln!("❌ could not serialize summary: {}", err),
        }
    } else {
        println!("trucks repacked: {}", report.trucks_out);
        println!("items repacked: {}", report.items);
        println!("profit: {}", report.profit);
        println!(
            "pallets: {} -> {} ({} batches, {:.1}% deferred)",
            report.pallets_in,
            report.pallets_out,
            summary.batches,
            summary.deferred_percent()
        );
    }

    if !report.is_clean() {
        eprintln!("❌ Trucks were not repacked correctly.");
        std::process::exit(1);
    }
}
