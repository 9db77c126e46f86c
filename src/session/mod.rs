//! Session state: storage contract, lifecycle engine, and the sweep task.

pub mod config;
pub mod engine;
pub mod postgres;
pub mod store;
pub mod sweep;

pub use config::SessionConfig;
pub use engine::{AuthError, SessionEngine, TokenPair};
pub use postgres::PgSessionStore;
pub use store::{MemorySessionStore, RotateOutcome, Session, SessionStore};
pub use sweep::spawn_session_sweeper;
