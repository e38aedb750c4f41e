use anyhow::Result;
use colored::Colorize;
use heartbeat::prelude::*;
use heartbeat::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());

    println!("{}", "-----------------------------------------------------------------------------------------------".dimmed());
}

/// Spawns a task that mirrors the heartbeat's event stream to the console.
fn spawn_event_listener(heartbeat: &Heartbeat, is_watching_beats: Arc<AtomicBool>) {
    let mut events = heartbeat.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                HeartbeatEvent::Beat { .. } | HeartbeatEvent::BeatSkipped { .. } => {
                    if is_watching_beats.load(Ordering::Relaxed) {
                        println!("\n<-- [BEAT EVENT] {:?}\n>> ", event);
                    }
                }
                other => println!("\n<-- [HEARTBEAT EVENT] {:?}\n>> ", other),
            }
        }
    });
}

fn print_help() {
    println!("Available commands:");
    println!("  start [MS]            - Starts the heartbeat, optionally setting the pulse.");
    println!("  stop                  - Stops the heartbeat; no beats fire after this.");
    println!("  skip <N> [set]        - Skips the next N beats ('set' replaces instead of adding).");
    println!("  pulse [MS]            - Shows or changes the pulse interval.");
    println!("  state                 - Shows state, pulse, pending skips, and beat count.");
    println!("  register              - Registers a printing callback on the registry.");
    println!("  fire [OBJ] [ATTR..]   - Executes the registry once with the given payload.");
    println!("  watch on|off          - Toggles printing of per-beat events.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let mut heartbeat = Heartbeat::new();

    // Create the shared flag for the beat listener.
    let is_watching_beats = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&heartbeat, is_watching_beats.clone());

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!(
        "{} is ready. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "start" => match args.get(1) {
                            Some(ms_str) => {
                                if let Ok(ms) = ms_str.parse::<u64>() {
                                    heartbeat.start(Some(Duration::from_millis(ms)));
                                    println!("--> Heartbeat started with a {}ms pulse.", ms);
                                } else {
                                    println!("Error: '{}' is not a valid number of milliseconds.", ms_str);
                                }
                            }
                            None => {
                                if heartbeat.pulse().is_none() {
                                    println!("No pulse set. Usage: start <MILLISECONDS>");
                                } else {
                                    heartbeat.start(None);
                                    println!("--> Heartbeat started with the existing {:?} pulse.", heartbeat.pulse());
                                }
                            }
                        },
                        "stop" => {
                            heartbeat.stop();
                            println!("--> Heartbeat stopped after {} beats.", heartbeat.beat_count());
                        }
                        "skip" => {
                            if let Some(beats_str) = args.get(1) {
                                if let Ok(beats) = beats_str.parse::<u64>() {
                                    let add = args.get(2) != Some(&"set");
                                    heartbeat.skip(beats, add);
                                    println!("--> Pending beat skips: {}", heartbeat.beat_skips());
                                } else {
                                    println!("Error: '{}' is not a valid number of beats.", beats_str);
                                }
                            } else {
                                println!("Usage: skip <BEATS> [set]");
                            }
                        }
                        "pulse" => match args.get(1) {
                            Some(ms_str) => {
                                if let Ok(ms) = ms_str.parse::<u64>() {
                                    heartbeat.set_pulse(Duration::from_millis(ms));
                                    println!("--> Pulse set to {}ms.", ms);
                                } else {
                                    println!("Error: '{}' is not a valid number of milliseconds.", ms_str);
                                }
                            }
                            None => println!("Current pulse: {:?}", heartbeat.pulse()),
                        },
                        "state" => {
                            println!("State:         {:?}", heartbeat.state());
                            println!("Pulse:         {:?}", heartbeat.pulse());
                            println!("Pending skips: {}", heartbeat.beat_skips());
                            println!("Beat count:    {}", heartbeat.beat_count());
                        }
                        "register" => {
                            heartbeat.register(|descriptor| {
                                println!(
                                    "<-- [CALLBACK] object: {}, attributes: {:?}",
                                    if descriptor.changed_object().is_some() { "present" } else { "none" },
                                    descriptor.changed_attributes()
                                );
                                Ok(())
                            });
                            println!("--> Registered a printing callback.");
                        }
                        "fire" => {
                            let changed_object = args
                                .get(1)
                                .map(|obj| Arc::new(obj.to_string()) as ChangedObject);
                            let changed_attributes = args
                                .iter()
                                .skip(2)
                                .map(|attr| attr.to_string())
                                .collect::<Vec<_>>();
                            let registry = heartbeat.callbacks();
                            registry
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner())
                                .execute(changed_object, changed_attributes, None);
                            println!("--> Executed the registry once.");
                        }
                        "watch" => match args.get(1) {
                            Some(&"on") => {
                                is_watching_beats.store(true, Ordering::Relaxed);
                                println!("--> Watching per-beat events.");
                            }
                            Some(&"off") => {
                                is_watching_beats.store(false, Ordering::Relaxed);
                                println!("--> Stopped watching per-beat events.");
                            }
                            _ => println!("Usage: watch on|off"),
                        },
                        "help" => print_help(),
                        "exit" | "quit" => {
                            heartbeat.stop();
                            break;
                        }
                        unknown => {
                            println!("Unknown command: '{}'. Type 'help' for a list.", unknown);
                        }
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => {
                heartbeat.stop();
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
