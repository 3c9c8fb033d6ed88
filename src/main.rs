use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use lap_logger::{
    AppConfig, LapFileManager, LapLoggerError, LapRecorder, LapSink, MockTelemetryReader,
    ReplayTelemetryReader, SampleNormalizer, TelemetryReader, TickOutcome, VehicleCatalog,
    VehicleLookup,
    vehicle_metadata::{JsonFileVehicleSource, NoVehicleMetadata},
};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Synthetic laps around Bahrain
    Mock,
    /// Samples recorded as JSON Lines
    Replay,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record completed laps to CSV files
    Record {
        #[arg(short, long, value_enum, default_value_t = Source::Mock)]
        source: Source,

        /// Replay file, required with `--source replay`
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        interval_ms: Option<u64>,

        /// JSON vehicle list for car model, manufacturer, team and class
        #[arg(long)]
        vehicles: Option<PathBuf>,

        /// Persist the effective settings as the new defaults
        #[arg(long)]
        save_config: bool,
    },
    /// List saved lap files
    List {
        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every saved lap file
    Clear {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config() -> AppConfig {
    match AppConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            AppConfig::default()
        }
    }
}

fn record(
    source: Source,
    input: Option<PathBuf>,
    config: AppConfig,
    stop: Arc<AtomicBool>,
) -> Result<usize, LapLoggerError> {
    let sink = LapFileManager::new(config.output_dir.clone(), &config.filename_format)?;
    info!("Writing laps to {:?}", sink.output_dir());

    match source {
        Source::Mock => {
            let reader = MockTelemetryReader::new(Duration::from_millis(config.poll_interval_ms));
            record_with(reader, sink, &config, stop, false)
        }
        Source::Replay => {
            let input = input.ok_or_else(|| LapLoggerError::TelemetryReaderError {
                description: "--input is required when replaying".to_string(),
            })?;
            let reader = ReplayTelemetryReader::from_file(&input)?;
            record_with(reader, sink, &config, stop, true)
        }
    }
}

fn record_with<R: TelemetryReader, S: LapSink>(
    reader: R,
    sink: S,
    config: &AppConfig,
    stop: Arc<AtomicBool>,
    stop_when_lost: bool,
) -> Result<usize, LapLoggerError> {
    let normalizer = SampleNormalizer::new(config.sector_count);
    let interval = Duration::from_millis(config.poll_interval_ms);
    match &config.vehicle_catalog {
        Some(path) => {
            let vehicles = VehicleCatalog::new(JsonFileVehicleSource::new(path.clone()));
            let recorder = LapRecorder::new(reader, sink, vehicles, normalizer);
            run_loop(recorder, interval, stop, stop_when_lost)
        }
        None => {
            let recorder = LapRecorder::new(reader, sink, NoVehicleMetadata, normalizer);
            run_loop(recorder, interval, stop, stop_when_lost)
        }
    }
}

fn run_loop<R: TelemetryReader, S: LapSink, L: VehicleLookup>(
    mut recorder: LapRecorder<R, S, L>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    stop_when_lost: bool,
) -> Result<usize, LapLoggerError> {
    while !stop.load(Ordering::SeqCst) {
        match recorder.tick() {
            Ok(TickOutcome::LapSaved(path)) => println!("Saved {}", path.display()),
            Ok(TickOutcome::SourceLost | TickOutcome::Waiting) if stop_when_lost => break,
            Ok(_) => {}
            Err(e) => error!("{}", e),
        }
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
    Ok(recorder.laps_saved())
}

fn list(session: Option<String>, config: &AppConfig) -> Result<(), LapLoggerError> {
    let manager = LapFileManager::new(config.output_dir.clone(), &config.filename_format)?;
    let laps = match session {
        Some(session_id) => manager.get_session_laps(&session_id)?,
        None => manager.list_saved_laps()?,
    };
    for lap in &laps {
        println!("{}", lap);
    }
    info!("{} lap files in {:?}", laps.len(), manager.output_dir());
    Ok(())
}

fn clear(config: &AppConfig) -> Result<(), LapLoggerError> {
    let manager = LapFileManager::new(config.output_dir.clone(), &config.filename_format)?;
    let deleted = manager.clear_all_laps()?;
    println!("Deleted {} lap files", deleted);
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let mut config = load_config();

    let result = match cli.command {
        Commands::Record {
            source,
            input,
            output,
            interval_ms,
            vehicles,
            save_config,
        } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(interval_ms) = interval_ms {
                config.poll_interval_ms = interval_ms;
            }
            if vehicles.is_some() {
                config.vehicle_catalog = vehicles;
            }
            if save_config {
                match config.save() {
                    Ok(()) => info!("Saved settings"),
                    Err(e) => warn!("Could not save settings: {}", e),
                }
            }

            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = stop.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                println!("Exiting...");
                handler_stop.store(true, Ordering::SeqCst);
            }) {
                warn!("Could not set Ctrl-C handler: {}", e);
            }
            record(source, input, config, stop)
                .map(|laps| println!("Recorded {} laps", laps))
        }
        Commands::List { session, output } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            list(session, &config)
        }
        Commands::Clear { output } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            clear(&config)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
