//! File and `.env` layering against real files.

use std::io::Write;

use sluice_config::{ConfigError, ConfigLoader};
use tempfile::{Builder, NamedTempFile};

fn file_with(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_then_json() {
    let toml = file_with(
        ".toml",
        r#"
        [server]
        http_addr = "127.0.0.1:3000"
        request_timeout_secs = 10

        [service]
        name = "users"
        version = "1.4.0"
        "#,
    );
    let json = file_with(".json", r#"{ "server": { "request_timeout_secs": 2 } }"#);

    let config = ConfigLoader::new()
        .with_file(toml.path())
        .unwrap()
        .with_file(json.path())
        .unwrap()
        .load_from(Vec::new())
        .unwrap();

    assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    assert_eq!(config.server.request_timeout_secs, 2);
    assert_eq!(config.service.name, "users");
    assert_eq!(config.server_config().service_version(), "1.4.0");
}

#[test]
fn test_missing_files() {
    let err = ConfigLoader::new().with_file("/nonexistent/sluice.toml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));

    let loader = ConfigLoader::new()
        .with_optional_file("/nonexistent/sluice.toml")
        .unwrap();
    assert!(loader.load_from(Vec::new()).is_ok());
}

#[test]
fn test_unsupported_extension() {
    let yaml = file_with(".yaml", "server: {}");
    let err = ConfigLoader::new().with_file(yaml.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}

#[test]
fn test_malformed_toml() {
    let toml = file_with(".toml", "[server\nhttp_addr = ");
    let err = ConfigLoader::new().with_file(toml.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_dotenv_file_feeds_env_overrides() {
    let env = file_with(".env", "SLUICE_FILE_LAYERS__SERVICE__NAME=from-dotenv\n");

    let config = ConfigLoader::new()
        .with_env_prefix("SLUICE_FILE_LAYERS")
        .with_dotenv_path(env.path())
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(config.service.name, "from-dotenv");
}
