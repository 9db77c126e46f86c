//! questgate - session and token service for the quest platform.
//!
//! Issues short-lived access tokens paired with rotating refresh tokens,
//! detects refresh token replay, and binds upstream identities to local
//! user records.

pub mod api;
pub mod cli;
pub mod identity;
pub mod session;
pub mod token;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_name_and_version() {
        assert!(APP_USER_AGENT.starts_with("questgate/"));
    }
}
