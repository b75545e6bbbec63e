use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use midicue::engine::{EngineCommand, EngineUpdate, spawn_engine};
use midicue::sink::{LogSink, MidiSink, PortSink, list_ports};
use midicue::timing::{ReleasePolicy, TimeSignature, schedule_records};
use midicue::{Performance, PlaybackConfig, ScheduleMode};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a performance file (RON, or JSON with a .json extension)
    Play {
        performance: PathBuf,

        #[clap(flatten)]
        overrides: Overrides,

        /// Log messages instead of sending them to a MIDI port
        #[clap(long, value_parser)]
        dry_run: bool,
    },
    /// Print the resolved schedule without playing it
    Resolve {
        performance: PathBuf,

        #[clap(flatten)]
        overrides: Overrides,
    },
    /// List MIDI output ports
    Ports,
}

#[derive(clap::Args, Debug)]
struct Overrides {
    /// Playback config file (RON)
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Substring of the output port name
    #[clap(short, long, value_parser)]
    port: Option<String>,

    /// MIDI channel, 0-15
    #[clap(long, value_parser)]
    channel: Option<u8>,

    /// Replace the tempo stored in the performance
    #[clap(long, value_parser)]
    bpm: Option<u16>,

    /// Replace the time signature, e.g. 3/4
    #[clap(long, value_parser)]
    time_signature: Option<TimeSignature>,

    /// Follow every note-on with a note-off after this many milliseconds
    #[clap(long, value_parser)]
    auto_release: Option<u64>,

    /// Schedule each record just before it is due
    #[clap(long, value_parser)]
    lazy: bool,
}

impl Overrides {
    fn config(&self) -> Result<PlaybackConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => PlaybackConfig::load(path)?,
            None => PlaybackConfig::default(),
        };
        if let Some(port) = &self.port {
            config.port = Some(port.clone());
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(hold_ms) = self.auto_release {
            config.release = ReleasePolicy::AutoRelease { hold_ms };
        }
        if self.lazy {
            config.mode = ScheduleMode::Lazy;
        }
        config.validate()?;
        Ok(config)
    }

    fn performance(&self, path: &Path) -> Result<Performance, Box<dyn Error>> {
        let mut performance = Performance::load(path)?;
        if let Some(bpm) = self.bpm {
            performance.bpm = bpm;
        }
        if let Some(time_signature) = self.time_signature {
            performance.time_signature = time_signature;
        }
        performance.tempo()?;
        Ok(performance)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Play {
            performance,
            overrides,
            dry_run,
        } => {
            let config = overrides.config()?;
            let performance = overrides.performance(&performance)?;
            play(config, performance, dry_run)
        }
        Command::Resolve {
            performance,
            overrides,
        } => {
            let config = overrides.config()?;
            let performance = overrides.performance(&performance)?;
            resolve(&config, &performance)
        }
        Command::Ports => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No MIDI outputs found.");
            }
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
            Ok(())
        }
    }
}

fn resolve(config: &PlaybackConfig, performance: &Performance) -> Result<(), Box<dyn Error>> {
    let tempo = performance.tempo()?;
    let schedule = schedule_records(&performance.events, tempo, config.channel, config.release);

    println!("{}", tempo);
    for event in &schedule.events {
        println!(
            "[{:>9.4}s] {:<12} {}",
            event.offset_seconds,
            event.position.to_string(),
            event.message
        );
    }
    for rejected in &schedule.rejected {
        println!("skipped {}", rejected);
    }
    println!(
        "{} event(s), {:.3}s",
        schedule.events.len(),
        schedule.duration_seconds()
    );
    Ok(())
}

fn play(
    config: PlaybackConfig,
    performance: Performance,
    dry_run: bool,
) -> Result<(), Box<dyn Error>> {
    let port = config.port.clone();
    let engine = if dry_run {
        spawn_engine(config, || Box::new(LogSink::new()) as Box<dyn MidiSink>)
    } else {
        spawn_engine(config, move || {
            let sink: Box<dyn MidiSink> = match PortSink::connect(port.as_deref()) {
                Ok(sink) => Box::new(sink),
                Err(e) => {
                    tracing::error!("{}", e);
                    Box::new(PortSink::disconnected())
                }
            };
            sink
        })
    };

    let cancel_tx = engine.command_tx.clone();
    std::thread::spawn(move || {
        println!("Playing. Press Enter to stop.\n");
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_ok() {
            let _ = cancel_tx.send(EngineCommand::Cancel);
        }
    });

    engine.play(performance);

    let mut result: Result<(), Box<dyn Error>> = Ok(());
    for update in engine.update_rx.iter() {
        match update {
            EngineUpdate::Finished(summary) => {
                println!(
                    "{:?}: {} delivered, {} undelivered, {} skipped, {} late",
                    summary.end,
                    summary.delivered,
                    summary.undelivered,
                    summary.rejected,
                    summary.late_dropped
                );
                break;
            }
            EngineUpdate::InvalidPerformance(e) => {
                result = Err(e.into());
                break;
            }
            EngineUpdate::Rejected(e) => tracing::warn!("{}", e),
            EngineUpdate::SinkUnavailable | EngineUpdate::SinkRestored => {}
            EngineUpdate::PlaybackState { .. } => {}
        }
    }

    engine.shutdown();
    result
}
