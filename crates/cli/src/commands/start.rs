use vmgate_db::migrations;

use crate::commands::{block_on_database, load_config, CommandResult};

/// Preflight for `vmgate-server`: config must validate and the database must
/// answer. Pending migrations are reported, not applied; the server applies
/// them on boot.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let pending = block_on_database("start", &config, |pool| async move {
        migrations::pending_versions(&pool)
            .await
            .map_err(|error| ("migration_status", error.to_string(), 5u8))
    });

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    match pending {
        Ok(pending) if pending.is_empty() => CommandResult::success(
            "start",
            format!("preflight passed; run `vmgate-server` to listen on http://{address}"),
        ),
        Ok(pending) => CommandResult::success(
            "start",
            format!(
                "preflight passed; `vmgate-server` will apply {} pending migration(s) and listen on http://{address}",
                pending.len()
            ),
        ),
        Err(failure) => failure,
    }
}
