//! Stemline Player - terminal front end for the stem engine
//!
//! ```text
//! stemline-player [--config PATH] [--list-devices] NAME=FILE ...
//! ```
//!
//! Loads every `NAME=FILE` pair as one stem, then reads transport commands
//! from stdin until `quit` or end of input.

mod command;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, RecvTimeoutError};
use stemline_core::audio::get_output_devices;
use stemline_core::config::{default_config_path, load_config};
use stemline_core::{EngineConfig, Phase, StemEngine};

use command::{Command, HELP};

/// How often the status line refreshes while playing
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
    stems: Vec<(String, String)>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        list_devices: false,
        stems: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--list-devices" => args.list_devices = true,
            _ => {
                let (name, file) = arg
                    .split_once('=')
                    .with_context(|| format!("Expected NAME=FILE, got '{}'", arg))?;
                if name.is_empty() || file.is_empty() {
                    bail!("Expected NAME=FILE, got '{}'", arg);
                }
                args.stems.push((name.to_string(), file.to_string()));
            }
        }
    }

    Ok(args)
}

fn list_devices() -> Result<()> {
    let devices = get_output_devices().context("Failed to enumerate output devices")?;
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {} ({} ch)", marker, device, device.max_channels);
    }
    Ok(())
}

fn print_status(engine: &mut StemEngine) {
    let phase = match engine.phase() {
        Phase::Playing => "playing",
        Phase::Paused => "paused",
        Phase::Stopped => "stopped",
    };
    println!(
        "[{:>7}] {:6.2}s / {:6.2}s",
        phase,
        engine.current_position(),
        engine.duration()
    );
}

/// Apply one command; returns false when the player should exit
fn handle(engine: &mut StemEngine, command: Command) -> bool {
    let result = match command {
        Command::Play(from) => engine.play(from),
        Command::Pause => {
            engine.pause();
            Ok(())
        }
        Command::Resume => engine.resume(),
        Command::Stop => {
            engine.stop();
            Ok(())
        }
        Command::Seek(to) => engine.seek(to),
        Command::Mute(stem) | Command::Unmute(stem) if engine.is_muted(&stem).is_none() => {
            println!("No stem named '{}'", stem);
            Ok(())
        }
        Command::Mute(stem) => {
            engine.set_muted(&stem, true);
            Ok(())
        }
        Command::Unmute(stem) => {
            engine.set_muted(&stem, false);
            Ok(())
        }
        Command::Gain(level) => {
            engine.set_master_gain(level);
            println!("Master gain {:.2}", engine.master_gain());
            Ok(())
        }
        Command::Status => Ok(()),
        Command::Help => {
            println!("{}", HELP);
            return true;
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        println!("Playback error: {}", e);
    }
    print_status(engine);
    true
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;

    if args.list_devices {
        return list_devices();
    }
    if args.stems.is_empty() {
        bail!("Usage: stemline-player [--config PATH] [--list-devices] NAME=FILE ...");
    }

    println!("╔═══════════════════════════════════════╗");
    println!("║         STEMLINE PLAYER v0.3.0        ║");
    println!("║      synchronized stem playback       ║");
    println!("╚═══════════════════════════════════════╝");

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config: EngineConfig = load_config(&config_path);

    let mut engine = StemEngine::open_default(config).context("Failed to open audio output")?;
    log::info!(
        "Output ready: {} Hz, {:.1} ms latency",
        engine.sample_rate(),
        engine.latency_ms()
    );

    engine
        .load_with_progress(args.stems, |progress| {
            log::info!("Loading stems: {:3.0}%", progress * 100.0);
        })
        .context("Failed to load stems")?;

    let names: Vec<String> = engine.stem_names().iter().map(|n| n.to_string()).collect();
    println!("Loaded {} ({:.2}s)", names.join(", "), engine.duration());
    println!("{}", HELP);

    let (tx, rx) = channel::unbounded::<Command>();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    loop {
        match rx.recv_timeout(STATUS_INTERVAL) {
            Ok(command) => {
                if !handle(&mut engine, command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if engine.is_playing() {
                    print_status(&mut engine);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.dispose();
    log::info!("Player shut down");
    Ok(())
}
