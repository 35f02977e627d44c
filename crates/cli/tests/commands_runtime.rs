use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use vmgate_cli::commands::{config, doctor, migrate, seed, session, start};

// Each in-memory SQLite connection is its own database.
const MEMORY_DB: (&str, &str) = ("VMGATE_DATABASE_URL", "sqlite::memory:");
const SINGLE_CONNECTION: (&str, &str) = ("VMGATE_DATABASE_MAX_CONNECTIONS", "1");

#[test]
fn start_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB, SINGLE_CONNECTION, ("VMGATE_SERVER_PORT", "9180")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("http://127.0.0.1:9180"), "unexpected message: {message}");
    });
}

#[test]
fn start_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("VMGATE_DATABASE_URL", "postgres://localhost/vmgate")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB, SINGLE_CONNECTION], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied 2 pending migration(s)");
    });
}

#[test]
fn seed_lists_demo_tokens_for_every_role() {
    with_env(&[MEMORY_DB, SINGLE_CONNECTION], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - REQUESTER: user-requester (Authorization: Bearer vmg_demo_requester)"));
        assert!(message.contains("  - APPROVER_L3: user-approver-l3"));
        assert!(message.contains("  - DC_OPS: user-dcops"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("seed.db").display());

    with_env(&[("VMGATE_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn session_issues_fresh_tokens_for_known_users_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("session.db").display());

    let vars = [("VMGATE_DATABASE_URL", url.as_str()), ("VMGATE_AUTH_SESSION_TTL_HOURS", "2")];

    with_env(&vars, || {
        assert_eq!(seed::run().exit_code, 0);

        let issued = session::run("user-approver-l1");
        assert_eq!(issued.exit_code, 0, "unexpected output: {}", issued.output);
        let payload = parse_payload(&issued.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("Authorization: Bearer vmg_"));
        assert!(!message.contains("vmg_demo_approver_l1"));

        let unknown = session::run("user-nobody");
        assert_eq!(unknown.exit_code, 7);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_user");
    });
}

#[test]
fn doctor_flags_pending_migrations() {
    with_env(&[MEMORY_DB, SINGLE_CONNECTION], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1, "unmigrated database should fail doctor");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check(&report, "config_validation")["status"], "pass");
        assert_eq!(check(&report, "database_connectivity")["status"], "pass");
        assert_eq!(check(&report, "migration_status")["status"], "fail");
    });
}

#[test]
fn doctor_passes_after_migrate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("doctor.db").display());

    with_env(&[("VMGATE_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0, "unexpected doctor output: {}", result.output);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] migration_status: schema is up to date"));
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("VMGATE_APPROVALS_LEVEL_QUORUM", "majority")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(check(&report, "config_validation")["status"], "fail");
        assert_eq!(check(&report, "database_connectivity")["status"], "skipped");
        assert_eq!(check(&report, "migration_status")["status"], "skipped");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(
        &[("VMGATE_SERVER_PORT", "9100"), ("VMGATE_APPROVALS_LEVEL_QUORUM", "first_decision")],
        || {
            let output = config::run();
            assert!(output.contains("- server.port = 9100 (source: env (VMGATE_SERVER_PORT))"));
            assert!(output.contains(
                "- approvals.level_quorum = first_decision (source: env (VMGATE_APPROVALS_LEVEL_QUORUM))"
            ));
            assert!(output.contains("- auth.session_ttl_hours = "));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .unwrap_or_else(|| panic!("missing doctor check {name}"))
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "VMGATE_DATABASE_URL",
        "VMGATE_DATABASE_MAX_CONNECTIONS",
        "VMGATE_DATABASE_TIMEOUT_SECS",
        "VMGATE_SERVER_BIND_ADDRESS",
        "VMGATE_SERVER_PORT",
        "VMGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "VMGATE_APPROVALS_LEVEL_QUORUM",
        "VMGATE_APPROVALS_CUSTOMIZATION_RETURNED",
        "VMGATE_AUTH_SESSION_TTL_HOURS",
        "VMGATE_LOGGING_LEVEL",
        "VMGATE_LOGGING_FORMAT",
        "VMGATE_LOG_LEVEL",
        "VMGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
