use crate::cli::{actions::Action, commands::auth};
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let options = auth::Options::parse(matches)?;

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        options,
    })
}
