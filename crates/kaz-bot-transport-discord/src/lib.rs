#![deny(missing_docs)]
//! Discord transport adapter for the KAZ bot.

/// Message handling on top of the Discord transport.
pub mod bot;
/// Discord transport configuration.
pub mod config;
/// Discord REST and gateway clients.
pub mod discord;
/// Discord runtime entrypoint.
pub mod runner;
