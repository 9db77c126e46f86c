use crate::api;
use crate::cli::actions::Action;
use crate::session::SessionConfig;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, options } => {
            let config = SessionConfig::new()
                .with_access_ttl_seconds(options.access_ttl_seconds)
                .with_refresh_ttl_seconds(options.refresh_ttl_seconds)
                .with_refresh_not_before_seconds(options.refresh_not_before_seconds)
                .with_max_sessions_per_subject(options.max_sessions);

            api::new(
                port,
                dsn,
                &options.token_key,
                config,
                options.sweep_interval_seconds,
            )
            .await?;
        }
    }

    Ok(())
}
