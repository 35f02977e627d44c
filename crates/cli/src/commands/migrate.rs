use vmgate_db::migrations;

use crate::commands::{block_on_database, load_config, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let applied = block_on_database("migrate", &config, |pool| async move {
        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        Ok::<_, Failure>(pending.len())
    });

    match applied {
        Ok(0) => CommandResult::success("migrate", "schema already up to date"),
        Ok(count) => {
            CommandResult::success("migrate", format!("applied {count} pending migration(s)"))
        }
        Err(failure) => failure,
    }
}
