//! Console commands and their execution against the engine.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chime_audio::{output_devices, OutputDevice, SoundEngine};
use chime_core::PlayParams;

pub const HELP: &str = "\
commands:
  preload NAME                       decode NAME into memory
  unload NAME                        free a preloaded sound
  play NAME [loop] [VOLUME] [PITCH]  start an instance
  stop NAME                          stop every instance of NAME
  stop_all                           stop everything
  is_playing NAME                    query NAME
  debug on|off                       toggle diagnostic logging
  volume V                           set the master volume
  base PATH                          set the sound directory
  update                             reclaim finished instances
  list                               show preloaded sounds
  devices                            show output devices (* = default)
  quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Preload(String),
    Unload(String),
    Play { name: String, params: PlayParams },
    Stop(String),
    StopAll,
    IsPlaying(String),
    Debug(bool),
    Volume(f32),
    Base(PathBuf),
    Update,
    List,
    Devices,
    Help,
    Quit,
}

impl Command {
    /// Parse a line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let name = |what: &str| -> Result<String> {
            args.first()
                .map(|s| (*s).to_string())
                .ok_or_else(|| anyhow!("{what} needs a sound name"))
        };

        let command = match keyword {
            "preload" => Self::Preload(name("preload")?),
            "unload" => Self::Unload(name("unload")?),
            "play" => Self::Play {
                name: name("play")?,
                params: parse_play_params(&args[1..])?,
            },
            "stop" => Self::Stop(name("stop")?),
            "stop_all" => Self::StopAll,
            "is_playing" => Self::IsPlaying(name("is_playing")?),
            "debug" => match args.first().copied() {
                Some("on" | "true" | "1") => Self::Debug(true),
                Some("off" | "false" | "0") => Self::Debug(false),
                other => bail!("debug expects on or off, got {other:?}"),
            },
            "volume" => {
                let value = args.first().context("volume needs a value")?;
                Self::Volume(parse_number(value, "volume")?)
            }
            "base" => {
                // Paths may contain spaces
                let rest = line[keyword.len()..].trim();
                if rest.is_empty() {
                    bail!("base needs a path");
                }
                Self::Base(PathBuf::from(rest))
            }
            "update" => Self::Update,
            "list" => Self::List,
            "devices" => Self::Devices,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };

        Ok(Some(command))
    }

    /// Run the command, returning what to print.
    pub fn execute(&self, engine: &SoundEngine) -> String {
        match self {
            Self::Preload(name) => engine.preload(name).to_string(),
            Self::Unload(name) => engine.unload(name).to_string(),
            Self::Play { name, params } => engine.play(name, *params).to_string(),
            Self::Stop(name) => engine.stop(name).to_string(),
            Self::StopAll => engine.stop_all().to_string(),
            Self::IsPlaying(name) => engine.is_playing(name).to_string(),
            Self::Debug(enable) => {
                engine.set_debug(*enable);
                String::new()
            }
            Self::Volume(volume) => {
                engine.set_master_volume(*volume);
                format!("{:.2}", engine.master_volume())
            }
            Self::Base(path) => {
                engine.set_base_path(path.clone());
                String::new()
            }
            Self::Update => engine.update().to_string(),
            Self::List => engine.loaded_sounds().join("\n"),
            Self::Devices => match output_devices() {
                Ok(devices) => format_devices(&devices),
                Err(e) => format!("error: {e}"),
            },
            Self::Help => HELP.to_string(),
            Self::Quit => String::new(),
        }
    }
}

fn format_devices(devices: &[OutputDevice]) -> String {
    if devices.is_empty() {
        return "no output devices".to_string();
    }
    devices
        .iter()
        .map(|device| {
            let marker = if device.is_default { '*' } else { ' ' };
            format!("{marker} {}", device.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_play_params(args: &[&str]) -> Result<PlayParams> {
    let mut params = PlayParams::default();
    let mut rest = args;

    if let Some(first) = rest.first() {
        match *first {
            "loop" | "true" => {
                params.looping = true;
                rest = &rest[1..];
            }
            "once" | "false" => rest = &rest[1..],
            _ => {}
        }
    }

    if let Some(volume) = rest.first() {
        params.volume = parse_number(volume, "volume")?;
    }
    if let Some(pitch) = rest.get(1) {
        params.pitch = parse_number(pitch, "pitch")?;
    }
    if rest.len() > 2 {
        bail!("play takes at most: NAME [loop] [VOLUME] [PITCH]");
    }

    Ok(params)
}

fn parse_number(value: &str, what: &str) -> Result<f32> {
    value
        .parse()
        .with_context(|| format!("{what} must be a number, got '{value}'"))
}
