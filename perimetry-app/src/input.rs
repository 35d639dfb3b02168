//! Line-based keyboard input: one command per line on stdin.

use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use perimetry_experiment::{ShutdownHandle, TriggerHandle, TriggerOutcome};
use perimetry_timing::Timer;
use tracing::{debug, warn};

use crate::console::ManualGaze;

pub const HELP: &str =
    "Commands: p = press, r = release, f = fixating, a = looking away, q = quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Press,
    Release,
    Fixate,
    LookAway,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "press" | "" => Ok(Command::Press),
            "r" | "release" => Ok(Command::Release),
            "f" | "fixate" => Ok(Command::Fixate),
            "a" | "away" => Ok(Command::LookAway),
            "q" | "quit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Reads commands on a dedicated thread. The thread outlives the run and is
/// torn down with the process.
pub fn spawn_console_input<T: Timer>(
    trigger: TriggerHandle<T>,
    gaze: Arc<ManualGaze>,
    shutdown: ShutdownHandle,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("{e}; {HELP}");
                        continue;
                    }
                };
                match command {
                    Command::Press => {
                        // Keyboard presses have no physical release.
                        let outcome = trigger.press();
                        trigger.release();
                        if let TriggerOutcome::Late { index } = outcome {
                            warn!(trial = index, "press arrived after the response window");
                        }
                    }
                    Command::Release => trigger.release(),
                    Command::Fixate => gaze.set_fixating(true),
                    Command::LookAway => gaze.set_fixating(false),
                    Command::Quit => {
                        shutdown.shutdown();
                        break;
                    }
                }
                debug!(?command, state = ?trigger.state(), "console command");
            }
        })
}
