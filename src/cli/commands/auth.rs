//! Token and session lifecycle arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("token-key")
                .long("token-key")
                .help("Signing key material for access/refresh tokens (at least 32 bytes)")
                .env("QUESTGATE_TOKEN_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("QUESTGATE_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh window in seconds; also the maximum session age")
                .env("QUESTGATE_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-not-before-seconds")
                .long("refresh-not-before-seconds")
                .help("Minimum interval between refresh rotations")
                .env("QUESTGATE_REFRESH_NOT_BEFORE_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("max-sessions")
                .long("max-sessions")
                .help("Maximum concurrent sessions per user, 0 for unbounded")
                .env("QUESTGATE_MAX_SESSIONS")
                .default_value("0")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("sweep-interval-seconds")
                .long("sweep-interval-seconds")
                .help("Cadence of the aged-session sweep")
                .env("QUESTGATE_SWEEP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_key: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub refresh_not_before_seconds: i64,
    pub max_sessions: Option<u32>,
    pub sweep_interval_seconds: u64,
}

impl Options {
    /// Collect the session arguments from validated matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let token_key = matches
            .get_one::<String>("token-key")
            .cloned()
            .context("missing required argument: --token-key")?;
        let max_sessions = matches
            .get_one::<u32>("max-sessions")
            .copied()
            .filter(|&limit| limit > 0);

        Ok(Self {
            token_key: SecretString::from(token_key),
            access_ttl_seconds: matches
                .get_one::<i64>("access-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>("refresh-ttl-seconds")
                .copied()
                .unwrap_or(604_800),
            refresh_not_before_seconds: matches
                .get_one::<i64>("refresh-not-before-seconds")
                .copied()
                .unwrap_or(30),
            max_sessions,
            sweep_interval_seconds: matches
                .get_one::<u64>("sweep-interval-seconds")
                .copied()
                .unwrap_or(3600),
        })
    }
}
