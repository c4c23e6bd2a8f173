//! Ferrous Control daemon library - exposes modules for testing.

pub mod autostart;
pub mod config;
pub mod dispatcher;
pub mod gate;
pub mod network;
pub mod panel;
pub mod platform;
pub mod routes;
pub mod server;
pub mod status;
pub mod tracker;

pub use dispatcher::{CommandDispatcher, DispatcherSettings, Origin};
