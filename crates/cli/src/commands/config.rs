use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;
use vmgate_core::config::{AppConfig, LoadOptions};

/// One effective setting: dotted key, rendered value, and the env var that
/// can override it.
struct Setting {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            Some(setting.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_key: "VMGATE_DATABASE_URL",
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_key: "VMGATE_DATABASE_MAX_CONNECTIONS",
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_key: "VMGATE_DATABASE_TIMEOUT_SECS",
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_key: "VMGATE_SERVER_BIND_ADDRESS",
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_key: "VMGATE_SERVER_PORT",
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_key: "VMGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        },
        Setting {
            key: "approvals.level_quorum",
            value: snake_case(&config.approvals.level_quorum),
            env_key: "VMGATE_APPROVALS_LEVEL_QUORUM",
        },
        Setting {
            key: "approvals.customization_returned",
            value: snake_case(&config.approvals.customization_returned),
            env_key: "VMGATE_APPROVALS_CUSTOMIZATION_RETURNED",
        },
        Setting {
            key: "auth.session_ttl_hours",
            value: config.auth.session_ttl_hours.to_string(),
            env_key: "VMGATE_AUTH_SESSION_TTL_HOURS",
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_key: "VMGATE_LOGGING_LEVEL",
        },
        Setting {
            key: "logging.format",
            value: snake_case(&config.logging.format),
            env_key: "VMGATE_LOGGING_FORMAT",
        },
    ]
}

/// Renders a unit enum the way it is spelled in `vmgate.toml`.
fn snake_case(value: &impl Serialize) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => text,
        _ => "<unrenderable>".to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("vmgate.toml"), PathBuf::from("config/vmgate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
