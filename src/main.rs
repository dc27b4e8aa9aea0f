mod config;
mod export;
mod history;
mod kinematics;
mod receiver;
mod scheduler;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::export::KmlExporter;
use crate::history::History;
use crate::receiver::{Backend, SdrBackend, SimulatedBackend};
use crate::scheduler::{ChannelSchedule, Presenter, Scheduler, Status};

#[derive(Parser)]
#[command(name = "habmon")]
#[command(about = "APRS balloon telemetry acquisition")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file
    Validate { config: PathBuf },
    /// Monitor the configured channels
    Run {
        config: PathBuf,
        /// Replay canned packet traffic instead of driving the SDR
        #[arg(long)]
        simulate: bool,
    },
    /// Decode a single raw packet line and print the result
    Decode { line: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Run { config, simulate } => run(&config, simulate),
        Commands::Decode { line } => decode(&line),
    }
}

fn validate(path: &Path) -> ExitCode {
    let config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let interval = match config.interval() {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.launch_site() {
        eprintln!("Config error: {}", e);
        return ExitCode::FAILURE;
    }

    println!("Config is valid for {}", config.call_sign);
    for (i, frequency_hz) in config.frequencies().iter().enumerate() {
        println!("  channel {}: {} Hz", i + 1, frequency_hz);
    }
    println!("  beacon interval: {}s", interval.num_seconds());
    println!("  ledger: {}", config.ledger.display());
    ExitCode::SUCCESS
}

fn run(path: &Path, simulate: bool) -> ExitCode {
    let config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let (interval, launch_site) = match (config.interval(), config.launch_site()) {
        (Ok(interval), Ok(launch_site)) => (interval, launch_site),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Simulated traffic must never contaminate the real flight ledger
    let ledger = (!simulate).then(|| config.ledger.clone());
    let mut history = History::new(config.call_sign.clone(), ledger, launch_site);
    history.recover();

    println!("Monitoring as {}", config.call_sign);
    if simulate {
        monitor(&config, interval, history, SimulatedBackend::new())
    } else {
        monitor(&config, interval, history, SdrBackend::new())
    }
}

fn monitor<B: Backend>(
    config: &Config,
    interval: chrono::Duration,
    history: History,
    backend: B,
) -> ExitCode {
    let mut scheduler = Scheduler::new(
        backend,
        ChannelSchedule::new(config.frequencies()),
        config.secondary(),
        interval,
        history,
        Box::new(KmlExporter::new(config.track.clone())),
        Box::new(ConsolePresenter::new()),
    );
    scheduler.run()
}

fn decode(line: &str) -> ExitCode {
    match telemetry::decode(line, 0, chrono::Utc::now()) {
        Ok(message) => {
            println!("{:#?}", message);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Decode error: {}", e);
            ExitCode::FAILURE
        }
    }
}

const STATUS_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

/// Plain-console renderer: every packet once, a status line every few
/// seconds.
struct ConsolePresenter {
    seen: usize,
    last_status: Option<Instant>,
}

impl ConsolePresenter {
    fn new() -> Self {
        Self {
            seen: 0,
            last_status: None,
        }
    }
}

impl Presenter for ConsolePresenter {
    fn render(&mut self, status: &Status) {
        for message in &status.messages[self.seen..] {
            println!(
                "{} {:9.3} MHz {}",
                message.timestamp.format("%H:%M:%S"),
                message.frequency_hz as f64 / 1e6,
                message.raw
            );
        }
        self.seen = status.messages.len();

        let due = self
            .last_status
            .is_none_or(|last| last.elapsed() >= STATUS_PERIOD);
        if !due {
            return;
        }
        self.last_status = Some(Instant::now());

        let mut line = format!("[{:9.3} MHz]", status.frequency_hz as f64 / 1e6);
        if let Some(estimate) = &status.estimate {
            line.push_str(&format!(
                " alt {:.0} m ({:+.1} m/s), ground {:.1} m/s, {:.1} km downrange, fix {:.0}s ago",
                estimate.extrapolated_altitude_m,
                estimate.vertical_mps,
                estimate.horizontal_mps,
                estimate.distance_from_launch_m / 1_000.0,
                estimate.seconds_since_fix
            ));
        } else {
            line.push_str(" waiting for the first fix");
        }
        if let Some(next) = status.expected_broadcast {
            line.push_str(&format!(", next beacon {}", next.format("%H:%M:%S")));
        }
        if status.falling {
            line.push_str("  ** FALLING **");
        }
        println!("{}", line);
    }
}
