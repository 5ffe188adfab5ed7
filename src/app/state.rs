//! Application state shared across routes

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::game::{CommandSender, IdAllocator, Outbox, RoomStatus};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Producer end of the room's command queue
    pub commands: CommandSender,
    /// Per-connection outbound channels
    pub outbox: Outbox,
    pub ids: IdAllocator,
    /// Latest room view published by the dispatcher
    pub status: watch::Receiver<RoomStatus>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        commands: CommandSender,
        outbox: Outbox,
        ids: IdAllocator,
        status: watch::Receiver<RoomStatus>,
    ) -> Self {
        Self {
            config,
            commands,
            outbox,
            ids,
            status,
        }
    }

    pub fn room_status(&self) -> RoomStatus {
        self.status.borrow().clone()
    }
}
