//! Blocker daemon.
//!
//! Hosts the blocker actor, reads one control line at a time from stdin and
//! prints every event as a JSON line on stdout.
//!
//! ```text
//! start <entity> <duration_ms> [name...]
//! stop <entity>
//! remaining <entity>
//! gesture <entity> <back|home|task_switch|focus_lost|menu>
//! status
//! quit
//! ```

use std::sync::Arc;

use nterrupt_core::runtime::{self, BlockerHandle, ServiceParts};
use nterrupt_core::surface::format_remaining;
use nterrupt_core::{Config, Event, Gesture, SqliteCountdownStore, SystemClock};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::host::{CommandProbe, LogPresenter};

#[derive(Debug, PartialEq, Eq)]
enum Request {
    Start {
        entity_id: String,
        duration_ms: u64,
        display_name: String,
    },
    Stop(String),
    Remaining(String),
    Gesture(String, Gesture),
    Status,
    Quit,
    Empty,
}

/// Non-event replies, printed with the same `type` tag as events.
#[derive(Serialize)]
#[serde(tag = "type")]
enum Reply {
    Remaining {
        entity_id: String,
        remaining_ms: u64,
        countdown: String,
    },
    Status {
        line: String,
    },
    Error {
        message: String,
    },
}

fn parse_line(line: &str) -> Result<Request, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Request::Empty);
    };
    let mut entity = || {
        words
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("{verb}: missing entity"))
    };

    match verb {
        "start" => {
            let entity_id = entity()?;
            let duration_ms = words
                .next()
                .ok_or_else(|| "start: missing duration_ms".to_string())?
                .parse::<u64>()
                .map_err(|e| format!("start: invalid duration_ms: {e}"))?;
            let display_name = words.collect::<Vec<_>>().join(" ");
            Ok(Request::Start {
                entity_id,
                duration_ms,
                display_name,
            })
        }
        "stop" => Ok(Request::Stop(entity()?)),
        "remaining" => Ok(Request::Remaining(entity()?)),
        "gesture" => {
            let entity_id = entity()?;
            let gesture = words
                .next()
                .ok_or_else(|| "gesture: missing kind".to_string())?
                .parse::<Gesture>()?;
            Ok(Request::Gesture(entity_id, gesture))
        }
        "status" => Ok(Request::Status),
        "quit" | "exit" => Ok(Request::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

/// Returns `false` once the daemon should exit.
async fn handle_request(handle: &BlockerHandle, request: Request) -> nterrupt_core::error::Result<bool> {
    match request {
        Request::Start {
            entity_id,
            duration_ms,
            display_name,
        } => {
            handle.start_block(&entity_id, &display_name, duration_ms).await?;
        }
        Request::Stop(entity_id) => {
            handle.stop_block(&entity_id).await?;
        }
        Request::Remaining(entity_id) => {
            let remaining_ms = handle.query_remaining(&entity_id).await?;
            print_json(&Reply::Remaining {
                entity_id,
                remaining_ms,
                countdown: format_remaining(remaining_ms),
            });
        }
        Request::Gesture(entity_id, gesture) => {
            handle.gesture(&entity_id, gesture).await?;
        }
        Request::Status => {
            let line = handle.status_line().await?;
            print_json(&Reply::Status { line });
        }
        Request::Quit => return Ok(false),
        Request::Empty => {}
    }
    Ok(true)
}

async fn print_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => print_json(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event printer lagged; {} event(s) skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let parts = ServiceParts {
        store: Box::new(SqliteCountdownStore::open()?),
        presenter: Box::new(LogPresenter),
        probe: Box::new(CommandProbe::new(
            config.monitor.foreground_command.clone(),
            config.monitor.probe_timeout_ms,
        )),
        clock: Arc::new(SystemClock),
    };
    let handle = runtime::spawn(parts, &config);
    let printer = tokio::spawn(print_events(handle.subscribe()));
    print_json(&handle.snapshot().await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let request = match parse_line(&line) {
                    Ok(request) => request,
                    Err(message) => {
                        print_json(&Reply::Error { message });
                        continue;
                    }
                };
                match handle_request(&handle, request).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => print_json(&Reply::Error { message: e.to_string() }),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; shutting down");
                break;
            }
        }
    }

    handle.shutdown().await?;
    // Closing the last event sender ends the printer.
    drop(handle);
    printer.await?;
    Ok(())
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}
