//! # Chime
//!
//! Line-oriented console over the chime sound engine. Reads one command per
//! line from stdin; `help` lists them.

mod command;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chime_audio::SoundEngine;
use chime_core::EngineConfig;
use clap::Parser;
use command::Command;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Period of the headless playback clock.
const CLOCK_TICK: Duration = Duration::from_millis(10);

/// Line-oriented console over the chime sound engine.
#[derive(Debug, Parser)]
#[command(name = "chime", version, about)]
struct Args {
    /// Run without an output device, advancing playback on a clock thread.
    #[arg(long)]
    headless: bool,

    /// JSON engine configuration.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory searched for sound files (overrides the config).
    base_path: Option<PathBuf>,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(base) = &self.base_path {
            config.base_path.clone_from(base);
        }
        Ok(config)
    }
}

/// Advances a headless engine in real time so instances finish on schedule.
struct Clock {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Clock {
    fn start(engine: Arc<SoundEngine>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let frames_per_tick = engine.format().sample_rate as usize / 100;

        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name("chime-clock".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    engine.advance(frames_per_tick);
                    std::thread::sleep(CLOCK_TICK);
                }
            })
            .context("spawning clock thread")?;

        Ok(Self { running, handle })
    }

    fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("Clock thread panicked");
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout only carries command results
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime=info,chime_audio=info,chime_cli=info".into()),
        )
        .init();

    info!("Starting Chime v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = args.engine_config()?;

    let engine = Arc::new(if args.headless {
        SoundEngine::headless(config)?
    } else {
        SoundEngine::new(config)?
    });
    let clock = if args.headless {
        Some(Clock::start(engine.clone())?)
    } else {
        None
    };

    let result = run(&engine);

    if let Some(clock) = clock {
        clock.stop();
    }
    engine.shutdown();
    result
}

fn run(engine: &SoundEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let events = engine.events();

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(stdout, "error: {e:#}")?;
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        let output = command.execute(engine);
        if !output.is_empty() {
            writeln!(stdout, "{output}")?;
        }
        stdout.flush()?;

        for event in events.try_iter() {
            debug!("{event:?}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use clap::CommandFactory;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("chime").chain(list.iter().copied()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&[]).unwrap();
        assert!(!parsed.headless);
        assert_eq!(parsed.config, None);
        assert_eq!(parsed.base_path, None);

        let parsed = args(&["--headless", "--config", "chime.json", "sounds"]).unwrap();
        assert!(parsed.headless);
        assert_eq!(parsed.config, Some(PathBuf::from("chime.json")));
        assert_eq!(parsed.base_path, Some(PathBuf::from("sounds")));

        assert!(args(&["--config"]).is_err());
        assert!(args(&["--loud"]).is_err());
        assert!(args(&["a", "b"]).is_err());
    }

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_base_path_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("chime.json");
        std::fs::write(&config_path, r#"{"base_path": "from_config", "sample_rate": 22050}"#)
            .unwrap();

        let parsed = args(&["--config", config_path.to_str().unwrap(), "sfx"]).unwrap();
        let config = parsed.engine_config().unwrap();
        assert_eq!(config.base_path, PathBuf::from("sfx"));
        assert_eq!(config.sample_rate, 22050);
    }
}
