//! Interactive shell
//!
//! Lines come from a reader thread so the shell can also notice the session
//! ending on its own (xrun, stall, lost device) while waiting for input.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{select, tick, unbounded, Receiver};
use spool_input::{help_text, Action, InputHandler};
use spool_transport::{Command, Session, TransportHandle};

use crate::audio::BackendStats;

/// How often the xrun counter is polled
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Run until the user quits or the session ends on its own
pub fn run(session: &Session, stats: &Arc<BackendStats>) {
    let handle = session.handle();
    let parser = InputHandler::new(session.config().tapes);
    let lines = spawn_reader();
    let ticker = tick(STATS_INTERVAL);
    let mut seen_xruns = 0;

    println!("{}", help_text());
    prompt();

    loop {
        select! {
            recv(session.finished()) -> _ => return,
            recv(ticker) -> _ => {
                let xruns = stats.xruns();
                if xruns > seen_xruns {
                    tracing::warn!(total = xruns, "xrun");
                    seen_xruns = xruns;
                }
            }
            recv(lines) -> line => {
                let Ok(line) = line else {
                    // EOF on stdin
                    if let Err(e) = handle.quit() {
                        tracing::debug!(error = %e, "quit on EOF");
                    }
                    return;
                };
                match parser.parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Action::Help)) => println!("{}", help_text()),
                    Ok(Some(Action::Clear)) => print!("\x1b[2J\x1b[H"),
                    Ok(Some(Action::Transport(command))) => {
                        if let Err(e) = handle.send(command) {
                            println!("{e}");
                        } else if command == Command::Quit {
                            return;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
                prompt();
            }
        }
    }
}

/// Ctrl-C quits the session in order, like typing `q`
pub fn quit_on_interrupt(handle: TransportHandle) -> anyhow::Result<()> {
    ctrlc::set_handler(move || request_quit(&handle)).context("failed to install Ctrl-C handler")
}

fn request_quit(handle: &TransportHandle) {
    println!();
    tracing::info!("interrupted, quitting");
    if let Err(e) = handle.quit() {
        tracing::debug!(error = %e, "quit on interrupt");
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Forward stdin lines; the channel closes on EOF or a read error
fn spawn_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("spool-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        // rx is already closed, which the shell treats as EOF
        tracing::error!(error = %e, "failed to spawn stdin reader");
    }
    rx
}
