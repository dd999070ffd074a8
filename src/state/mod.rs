//! Session state orchestration.
//!
//! One `Session` holds everything the presentation layer renders. Each
//! operation awaits a remote collaborator, then folds the outcome into the
//! session and notifies observers.
//!
//! ## Structure
//!
//! - `session` - The shared container, lifecycle and notification slots
//! - `connection` - Database connect, probe and test
//! - `ai` - AI connection registry and selection
//! - `query` - Prompt submission and query execution
//! - `history` - Server-side query history
//! - `signal` - Busy accounting and change events

mod ai;
mod connection;
mod history;
mod query;
mod session;
mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::ConnectionTest;
pub use query::QueryPhase;
pub use session::{Collaborators, Session, SessionSnapshot};
pub use signal::{ConcurrencyPolicy, OperationKind, SessionEvent};
