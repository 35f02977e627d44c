use vmgate_db::{migrations, DemoSeedDataset, DemoUser};

use crate::commands::{block_on_database, load_config, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let seeded = block_on_database("seed", &config, |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification.checks), 6u8));
        }

        Ok::<_, Failure>(seed_result.users)
    });

    match seeded {
        Ok(users) => CommandResult::success("seed", render_users(&users)),
        Err(failure) => failure,
    }
}

fn render_users(users: &[DemoUser]) -> String {
    let lines = users
        .iter()
        .map(|user| {
            format!("  - {}: {} (Authorization: Bearer {})", user.role, user.user_id, user.token)
        })
        .collect::<Vec<_>>();
    format!("demo users loaded with bearer sessions:\n{}", lines.join("\n"))
}

fn verification_message(checks: &[(&str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
