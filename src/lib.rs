//! Session core for a natural-language-to-SQL client.
//!
//! The crate keeps the state a front end renders (database connectivity,
//! configured AI connections, query history, notifications) and drives the
//! remote service that connects to databases, generates SQL and runs it.

pub mod config;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use services::{ApiClient, ApiError, Preferences};
pub use state::{ConcurrencyPolicy, Session, SessionEvent, SessionSnapshot};
