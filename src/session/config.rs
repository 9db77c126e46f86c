//! Lifecycle engine configuration.

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_REFRESH_NOT_BEFORE_SECONDS: i64 = 30;

/// Explicit configuration threaded into the engine at construction.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    refresh_not_before_seconds: i64,
    max_sessions_per_subject: Option<u32>,
}

impl SessionConfig {
    /// Defaults: 15 minute access tokens, 7 day refresh window, 30 second
    /// minimum interval between rotations, unbounded concurrent sessions.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            refresh_not_before_seconds: DEFAULT_REFRESH_NOT_BEFORE_SECONDS,
            max_sessions_per_subject: None,
        }
    }

    #[must_use]
    pub const fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_not_before_seconds(mut self, seconds: i64) -> Self {
        self.refresh_not_before_seconds = seconds;
        self
    }

    /// `None` means unbounded.
    #[must_use]
    pub const fn with_max_sessions_per_subject(mut self, limit: Option<u32>) -> Self {
        self.max_sessions_per_subject = limit;
        self
    }

    #[must_use]
    pub const fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_not_before_seconds(&self) -> i64 {
        self.refresh_not_before_seconds
    }

    #[must_use]
    pub const fn max_sessions_per_subject(&self) -> Option<u32> {
        self.max_sessions_per_subject
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
