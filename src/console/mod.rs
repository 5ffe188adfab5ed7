//! Operator console on stdin

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{info, warn};

use crate::game::{Command, CommandSender, RoomStatus};
use crate::ws::protocol::ParticipantId;

/// One console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Players,
    Kill(ParticipantId),
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty line")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: kill <participant id>")]
    BadKill,
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Err(ConsoleError::Empty);
        };
        match word.to_ascii_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "players" => Ok(Self::Players),
            "kill" => {
                let id = parts
                    .next()
                    .and_then(|raw| raw.parse().ok())
                    .ok_or(ConsoleError::BadKill)?;
                Ok(Self::Kill(id))
            }
            "quit" | "exit" => Ok(Self::Quit),
            "help" => Ok(Self::Help),
            other => Err(ConsoleError::Unknown(other.to_string())),
        }
    }
}

const HELP: &str = "commands: status | players | kill <id> | quit | help";

/// Forward stdin lines from a dedicated OS thread, outside the runtime.
/// The thread ends at EOF or once the receiver is gone.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Console read error");
                    break;
                }
            }
        }
    });
    rx
}

/// Handle console lines until EOF or `quit`, which fires `shutdown`
pub async fn run(
    mut lines: mpsc::UnboundedReceiver<String>,
    commands: CommandSender,
    status: watch::Receiver<RoomStatus>,
    shutdown: Arc<Notify>,
) {
    info!("Operator console ready ({})", HELP);

    while let Some(line) = lines.recv().await {
        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => {
                info!("Shutdown requested from console");
                shutdown.notify_one();
                break;
            }
            Ok(command) => {
                let snapshot = status.borrow().clone();
                for output in execute(command, &commands, &snapshot) {
                    println!("{}", output);
                }
            }
            Err(ConsoleError::Empty) => {}
            Err(e) => println!("{}", e),
        }
    }
}

/// Run a non-quit console command and return the lines to print
fn execute(command: ConsoleCommand, commands: &CommandSender, status: &RoomStatus) -> Vec<String> {
    match command {
        ConsoleCommand::Status => vec![format!(
            "room {} | phase {:?} | round {} | bet {} | pool {} | host {} | {} participants",
            status.room_id,
            status.phase,
            status.round,
            status.bet,
            status.prize_pool,
            status
                .host_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            status.participants.len()
        )],
        ConsoleCommand::Players => {
            if status.participants.is_empty() {
                return vec!["no participants".to_string()];
            }
            status
                .participants
                .iter()
                .map(|p| {
                    format!(
                        "#{} {}{} | {} | acc {} | balance {} | augments {:?}",
                        p.participant_id,
                        p.nickname,
                        if p.is_bot { " (bot)" } else { "" },
                        if p.alive { "alive" } else { "dead" },
                        p.accuracy,
                        p.balance,
                        p.augments
                    )
                })
                .collect()
        }
        ConsoleCommand::Kill(id) => {
            commands.submit(Command::AdminKill { id });
            vec![format!("kill submitted for #{}", id)]
        }
        ConsoleCommand::Help | ConsoleCommand::Quit => vec![HELP.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::channel;
    use crate::ws::protocol::Phase;
    use tokio_test::{assert_err, assert_ok};

    fn empty_status() -> RoomStatus {
        RoomStatus {
            room_id: "local".into(),
            phase: Phase::Waiting,
            round: 0,
            bet: 0,
            prize_pool: 0,
            host_id: None,
            participants: Vec::new(),
        }
    }

    #[test]
    fn parses_console_lines() {
        assert_eq!(assert_ok!("status".parse::<ConsoleCommand>()), ConsoleCommand::Status);
        assert_eq!(assert_ok!("  PLAYERS ".parse::<ConsoleCommand>()), ConsoleCommand::Players);
        assert_eq!(assert_ok!("kill 12".parse::<ConsoleCommand>()), ConsoleCommand::Kill(12));
        assert_eq!(assert_ok!("exit".parse::<ConsoleCommand>()), ConsoleCommand::Quit);

        assert_eq!(assert_err!("kill".parse::<ConsoleCommand>()), ConsoleError::BadKill);
        assert_eq!(assert_err!("kill bob".parse::<ConsoleCommand>()), ConsoleError::BadKill);
        assert_eq!(assert_err!("   ".parse::<ConsoleCommand>()), ConsoleError::Empty);
        assert_eq!(
            assert_err!("dance".parse::<ConsoleCommand>()),
            ConsoleError::Unknown("dance".into())
        );
    }

    #[test]
    fn kill_goes_through_the_queue() {
        let (commands, mut rx) = channel();
        let output = execute(ConsoleCommand::Kill(4), &commands, &empty_status());
        assert_eq!(output, vec!["kill submitted for #4"]);
        assert_eq!(rx.try_recv().unwrap(), Command::AdminKill { id: 4 });
    }

    #[test]
    fn status_lines_read_the_snapshot() {
        let (commands, _rx) = channel();
        let status = empty_status();
        let line = &execute(ConsoleCommand::Status, &commands, &status)[0];
        assert!(line.contains("phase Waiting"));
        assert!(line.contains("host -"));
        assert_eq!(
            execute(ConsoleCommand::Players, &commands, &status),
            vec!["no participants"]
        );
    }

    #[tokio::test]
    async fn quit_line_fires_shutdown() {
        let (commands, mut rx) = channel();
        let (_status_tx, status) = watch::channel(empty_status());
        let shutdown = Arc::new(Notify::new());
        let (lines_tx, lines) = mpsc::unbounded_channel();

        for line in ["kill 3", "", "quit", "kill 4"] {
            lines_tx.send(line.to_string()).unwrap();
        }
        run(lines, commands, status, shutdown.clone()).await;

        // notify_one stores a permit when nobody is waiting yet
        shutdown.notified().await;
        assert_eq!(rx.try_recv().unwrap(), Command::AdminKill { id: 3 });
        assert!(rx.try_recv().is_err());
    }
}
