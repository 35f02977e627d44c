use chrono::{Duration, Utc};
use vmgate_core::auth::SessionToken;
use vmgate_core::domain::user::UserId;
use vmgate_db::repositories::{SqlUserRepository, UserRepository};

use crate::commands::{block_on_database, load_config, CommandResult, Failure};

/// Issues a bearer session for an existing user, valid for
/// `auth.session_ttl_hours`. The raw token is printed once and never stored.
pub fn run(user_id: &str) -> CommandResult {
    let config = match load_config("session") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let ttl = Duration::hours(i64::from(config.auth.session_ttl_hours));

    let issued = block_on_database("session", &config, |pool| async move {
        let users = SqlUserRepository::new(pool);
        let user = users
            .find_by_id(&UserId(user_id.to_string()))
            .await
            .map_err(|error| ("session_issue", error.to_string(), 5u8))?
            .ok_or_else(|| ("unknown_user", format!("user `{user_id}` does not exist"), 7u8))?;

        let token = SessionToken::generate();
        let expires_at = Utc::now() + ttl;
        users
            .create_session(&user.id, &token.hash(), expires_at)
            .await
            .map_err(|error| ("session_issue", error.to_string(), 5u8))?;
        Ok::<_, Failure>((token, expires_at))
    });

    match issued {
        Ok((token, expires_at)) => CommandResult::success(
            "session",
            format!(
                "Authorization: Bearer {} (expires {})",
                token.expose(),
                expires_at.to_rfc3339()
            ),
        ),
        Err(failure) => failure,
    }
}
