//! Commands and the single-consumer dispatcher that serializes all mutation

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::ws::protocol::{AimTrend, ClientMsg, ParticipantId, Phase};

use super::item::ItemError;
use super::session::{RoomStatus, Session};

/// An intent queued for sequential execution against the session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join {
        id: ParticipantId,
        nickname: Option<String>,
    },
    Leave {
        id: ParticipantId,
    },
    StartGame {
        id: ParticipantId,
    },
    AddBot {
        id: ParticipantId,
    },
    PickAccuracy {
        id: ParticipantId,
        index: Option<usize>,
    },
    Move {
        id: ParticipantId,
        direction: u8,
    },
    Aim {
        id: ParticipantId,
        trend: AimTrend,
    },
    SetTarget {
        id: ParticipantId,
        target: Option<ParticipantId>,
    },
    Shoot {
        shooter: ParticipantId,
        target: ParticipantId,
    },
    ChooseAugment {
        id: ParticipantId,
        index: usize,
    },
    Craft {
        id: ParticipantId,
    },
    UseItem {
        id: ParticipantId,
    },
    /// Batched simulation step from the tick clock
    AdvanceSimulation {
        dt: f32,
    },
    /// Periodic betting deduction
    CollectBets,
    /// Decision request from a bot driver
    BotThink {
        id: ParticipantId,
    },
    /// Operator kill
    AdminKill {
        id: ParticipantId,
    },
    #[cfg(test)]
    Panic,
}

impl Command {
    /// Translate a decoded client packet. `Ping` is answered by the
    /// connection itself and never reaches the session.
    pub fn from_client(id: ParticipantId, msg: ClientMsg) -> Option<Self> {
        let command = match msg {
            ClientMsg::Join { nickname } => Command::Join { id, nickname },
            ClientMsg::Leave => Command::Leave { id },
            ClientMsg::StartGame => Command::StartGame { id },
            ClientMsg::AddBot => Command::AddBot { id },
            ClientMsg::PickAccuracy { index } => Command::PickAccuracy { id, index },
            ClientMsg::Move { direction } => Command::Move { id, direction },
            ClientMsg::Aim { trend } => Command::Aim { id, trend },
            ClientMsg::Target { target_id } => Command::SetTarget {
                id,
                target: target_id,
            },
            ClientMsg::Shoot { target_id } => Command::Shoot {
                shooter: id,
                target: target_id,
            },
            ClientMsg::ChooseAugment { index } => Command::ChooseAugment { id, index },
            ClientMsg::Craft => Command::Craft { id },
            ClientMsg::UseItem => Command::UseItem { id },
            ClientMsg::Ping { .. } => return None,
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Join { .. } => "join",
            Command::Leave { .. } => "leave",
            Command::StartGame { .. } => "start_game",
            Command::AddBot { .. } => "add_bot",
            Command::PickAccuracy { .. } => "pick_accuracy",
            Command::Move { .. } => "move",
            Command::Aim { .. } => "aim",
            Command::SetTarget { .. } => "set_target",
            Command::Shoot { .. } => "shoot",
            Command::ChooseAugment { .. } => "choose_augment",
            Command::Craft { .. } => "craft",
            Command::UseItem { .. } => "use_item",
            Command::AdvanceSimulation { .. } => "advance_simulation",
            Command::CollectBets => "collect_bets",
            Command::BotThink { .. } => "bot_think",
            Command::AdminKill { .. } => "admin_kill",
            #[cfg(test)]
            Command::Panic => "panic",
        }
    }
}

/// Why a command was dropped without effect
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
    #[error("not allowed in phase {0:?}")]
    WrongPhase(Phase),
    #[error("only the host may do this")]
    NotHost,
    #[error("room is full")]
    RoomFull,
    #[error("already joined")]
    AlreadyJoined,
    #[error("not enough participants")]
    NotEnoughParticipants,
    #[error("participant is not alive")]
    NotAlive,
    #[error("weapon is reloading")]
    Reloading,
    #[error("busy crafting")]
    Crafting,
    #[error("invalid target")]
    InvalidTarget,
    #[error("target is already dead")]
    TargetDead,
    #[error("not this participant's turn")]
    NotYourTurn,
    #[error("already acted this phase")]
    AlreadyDone,
    #[error("invalid index {0}")]
    InvalidIndex(usize),
    #[error("participant is bankrupt")]
    Bankrupt,
    #[error("invalid direction {0}")]
    InvalidDirection(u8),
    #[error("participant is not a bot")]
    NotABot,
    #[error("invalid simulation step {0}")]
    InvalidStep(f32),
    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Producer handle; cheap to clone, never blocks
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Queue a command. Returns false once the dispatcher is gone.
    pub fn submit(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Create the command queue
pub fn channel() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, rx)
}

/// The single worker that owns the session
pub struct Dispatcher {
    session: Session,
    rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<RoomStatus>,
}

impl Dispatcher {
    pub fn new(
        session: Session,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> (Self, watch::Receiver<RoomStatus>) {
        let (status_tx, status_rx) = watch::channel(session.status());
        (
            Self {
                session,
                rx,
                status_tx,
            },
            status_rx,
        )
    }

    /// Execute commands in submission order until every sender is dropped
    pub async fn run(mut self) {
        info!("Command dispatcher started");
        while let Some(command) = self.rx.recv().await {
            self.dispatch(command);
        }
        info!("Command dispatcher stopped");
    }

    /// Run one command to completion, isolating rejections and panics
    pub fn dispatch(&mut self, command: Command) {
        let name = command.name();
        let session = &mut self.session;
        match catch_unwind(AssertUnwindSafe(|| session.execute(command))) {
            Ok(Ok(())) => {}
            Ok(Err(rejection)) => {
                debug!(command = name, %rejection, "Command rejected");
            }
            Err(panic) => {
                error!(
                    command = name,
                    panic = %panic_message(panic.as_ref()),
                    "Command panicked, continuing with next command"
                );
            }
        }
        self.status_tx.send_replace(self.session.status());
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameRules;
    use crate::game::outbox::{IdAllocator, Outbox};
    use crate::matchmaking::PhaseReporter;

    fn dispatcher() -> (Dispatcher, CommandSender, watch::Receiver<RoomStatus>) {
        let (commands, rx) = channel();
        let session = Session::new(
            "room".into(),
            GameRules::default(),
            Outbox::new(),
            commands.clone(),
            PhaseReporter::disabled("room"),
            IdAllocator::new(),
            7,
        );
        let (dispatcher, status) = Dispatcher::new(session, rx);
        (dispatcher, commands, status)
    }

    #[test]
    fn client_messages_translate_to_commands() {
        assert_eq!(
            Command::from_client(3, ClientMsg::Shoot { target_id: 4 }),
            Some(Command::Shoot {
                shooter: 3,
                target: 4
            })
        );
        assert_eq!(Command::from_client(3, ClientMsg::Ping { t: 1 }), None);
    }

    #[tokio::test]
    async fn commands_run_in_submission_order() {
        let (dispatcher, commands, status) = dispatcher();
        for id in 1..=3 {
            assert!(commands.submit(Command::Join {
                id,
                nickname: Some(format!("p{}", id)),
            }));
        }
        drop(commands);

        // Session keeps a sender for follow-ups, so drain by hand.
        let mut dispatcher = dispatcher;
        while let Ok(command) = dispatcher.rx.try_recv() {
            dispatcher.dispatch(command);
        }

        let status = status.borrow().clone();
        let ids: Vec<_> = status.participants.iter().map(|p| p.participant_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(status.host_id, Some(1));
    }

    #[test]
    fn rejected_commands_leave_state_untouched() {
        let (mut dispatcher, _commands, _status) = dispatcher();
        dispatcher.dispatch(Command::StartGame { id: 99 });
        assert_eq!(dispatcher.session().phase(), Phase::Waiting);
        assert!(dispatcher.session().status().participants.is_empty());
    }

    #[test]
    fn a_panicking_command_does_not_stop_the_worker() {
        let (mut dispatcher, _commands, status) = dispatcher();
        dispatcher.dispatch(Command::Join {
            id: 1,
            nickname: None,
        });
        dispatcher.dispatch(Command::Panic);
        dispatcher.dispatch(Command::Join {
            id: 2,
            nickname: None,
        });
        assert_eq!(status.borrow().participants.len(), 2);
    }

    #[test]
    fn bad_simulation_steps_are_rejected() {
        let (mut dispatcher, _commands, _status) = dispatcher();
        dispatcher.session.force_phase_for_test(Phase::Round);
        for dt in [f32::NAN, f32::INFINITY, -0.02] {
            assert!(matches!(
                dispatcher.session.execute(Command::AdvanceSimulation { dt }),
                Err(Rejection::InvalidStep(_))
            ));
        }
        assert_eq!(
            dispatcher.session.execute(Command::AdvanceSimulation { dt: 0.02 }),
            Ok(())
        );
    }
}
