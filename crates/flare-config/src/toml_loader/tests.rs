use flare_common::ConfigError;

use super::*;

fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn missing_file_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn directory_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_from_path(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got {err:?}");
}

#[test]
fn sections_override_only_what_they_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        r#"
[relay]
port = 4000
allowed_origins = ["https://a.example", "https://b.example"]

[peer]
relay_url = "wss://relay.example/ws"
"#,
    );

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.port, 4000);
    assert_eq!(config.relay.allowed_origins.len(), 2);
    assert_eq!(config.relay.bind_address, "0.0.0.0");
    assert_eq!(config.peer.relay_url, "wss://relay.example/ws");
    assert_eq!(config.peer.channel_label, "examSignal");
}

#[test]
fn malformed_toml_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "[relay\nport = ");

    match load_from_path(&path) {
        Err(ConfigError::ParseError(msg)) => assert!(msg.contains("config.toml"), "{msg}"),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn wrong_value_type_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "[relay]\nport = \"three thousand\"\n");
    assert!(matches!(
        load_from_path(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn rule_violations_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "[relay]\nmember_buffer = 0\n");

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.member_buffer, 0);
}

#[test]
fn written_default_round_trips_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("flare").join("config.toml");

    create_default_config(&path).unwrap();
    assert_eq!(load_from_path(&path).unwrap(), FlareConfig::default());
}

#[test]
fn template_mentions_every_section() {
    let template = default_config_toml();
    assert!(template.contains("[relay]"));
    assert!(template.contains("[peer]"));
    assert!(template.contains("FLARE_RELAY_URL"));
    assert!(template.contains(&format!(
        "Schema version {}",
        crate::schema::CONFIG_SCHEMA_VERSION
    )));
}

#[test]
fn default_path_ends_in_flare_dir() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("flare/config.toml"), "{}", path.display());
    }
}
