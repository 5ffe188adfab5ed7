//! Matchmaking integration

pub mod reporter;

pub use reporter::PhaseReporter;
