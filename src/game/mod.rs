//! Game simulation modules

pub mod augment;
pub mod bot;
pub mod combat;
pub mod command;
pub mod item;
pub mod outbox;
pub mod participant;
pub mod physics;
pub mod session;
pub mod timers;

pub use command::{channel, Command, CommandSender, Dispatcher};
pub use outbox::{IdAllocator, Outbox};
pub use session::{RoomStatus, Session};
