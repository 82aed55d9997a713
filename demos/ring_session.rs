use clap::Parser;
use samplering::{run_session_on, SessionConfig, SessionReport, SharedRingBuffer, WaitMode, Workload};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one producer and one consumer over a sample ring buffer")]
struct Args {
    /// Ring buffer capacity in samples
    #[arg(long, default_value_t = 10)]
    capacity: usize,

    /// Samples per producer push
    #[arg(long, default_value_t = 4)]
    batch_size: usize,

    /// Stop after this many samples (runs for the whole duration if unset)
    #[arg(long)]
    samples: Option<u64>,

    #[arg(long, default_value_t = 10)]
    duration_seconds: u64,

    #[arg(long, default_value_t = 10)]
    producer_backoff_ms: u64,

    #[arg(long, default_value_t = 1)]
    consumer_backoff_ms: u64,

    #[arg(long, default_value_t = 1000)]
    report_interval_ms: u64,

    #[arg(long, value_enum, default_value_t = WaitMode::Poll)]
    wait_mode: WaitMode,

    #[arg(long, value_enum, default_value_t = Workload::Sequential)]
    workload: Workload,

    /// Print the buffer layout once the session is over
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Also write a Perfetto trace to this file
    #[arg(long)]
    perfetto: Option<PathBuf>,
}

fn print_result(config: &SessionConfig, report: &SessionReport) {
    println!("\"capacity\", \"batch_size\", \"wait_mode\", \"workload\", \"produced\", \"consumed\", \"full_retries\", \"empty_polls\", \"order_violations\", \"samples_per_sec\", \"occupancy_mean\", \"occupancy_p50\", \"occupancy_p90\", \"occupancy_p99\", \"occupancy_max\"");
    println!("\"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{:.2}\", \"{:.2}\", \"{}\", \"{}\", \"{}\", \"{}\"",
             config.capacity,
             config.batch_size,
             config.wait_mode,
             config.workload,
             report.producer.samples,
             report.consumer.samples,
             report.producer.full_retries,
             report.consumer.empty_polls,
             report.consumer.order_violations,
             report.samples_per_sec(),
             report.occupancy.mean,
             report.occupancy.p50,
             report.occupancy.p90,
             report.occupancy.p99,
             report.occupancy.max
    );
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    match &args.perfetto {
        Some(path) => {
            let file = File::create(path).expect("failed to create perfetto trace file");
            registry
                .with(tracing_perfetto::PerfettoLayer::new(Mutex::new(file)))
                .init();
        }
        None => registry.init(),
    }

    let config = SessionConfig {
        capacity: args.capacity,
        batch_size: args.batch_size,
        total_samples: args.samples,
        duration: Duration::from_secs(args.duration_seconds),
        producer_backoff: Duration::from_millis(args.producer_backoff_ms),
        consumer_backoff: Duration::from_millis(args.consumer_backoff_ms),
        report_interval: Duration::from_millis(args.report_interval_ms),
        wait_mode: args.wait_mode,
        workload: args.workload,
    };
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let ring = SharedRingBuffer::new(config.capacity);
    let report = match run_session_on(&ring, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Session failed: {}", e);
            std::process::exit(1);
        }
    };

    print_result(&config, &report);
    if args.dump {
        println!("{}", ring.dump());
    }
    if !report.is_lossless() {
        std::process::exit(2);
    }
}
