//! Core domain + application logic for the hospital WhatsApp bot.
//!
//! Framework-agnostic: the WhatsApp gateway, Firestore, PostgreSQL and the HTTP
//! API live behind ports (traits) implemented in adapter crates.

pub mod bot;
pub mod clinical;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod handoff;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod parser;
pub mod scheduler;
pub mod session_store;
pub mod settings;

pub use errors::{Error, Result};
