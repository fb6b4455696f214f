use super::settings::Settings;
use super::load_config_from;
use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.broker.data_dir, "popqueue_data");
    assert_eq!(settings.broker.max_connections, 1000);
    assert_eq!(settings.broker.ack_timeout(), Duration::from_secs(30));
    assert_eq!(settings.broker.shutdown_grace(), Duration::from_secs(5));
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.broker.ack_timeout_ms, 30_000);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("broker.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [broker]
        data_dir = "/var/lib/popqueue"
        ack_timeout_ms = 250
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.broker.data_dir, "/var/lib/popqueue");
    assert_eq!(cfg.broker.ack_timeout_ms, 250);
    // untouched keys keep their defaults
    assert_eq!(cfg.broker.max_connections, 1000);
    assert_eq!(cfg.logging.level, "info");
}

#[test]
#[serial]
fn environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("broker.toml");
    fs::write(&path, "[server]\nport = 9000\n").expect("write config file");

    temp_env::with_vars(
        [
            ("POPQUEUE_SERVER__PORT", Some("9100")),
            ("POPQUEUE_BROKER__DATA_DIR", Some("/tmp/pq")),
            ("POPQUEUE_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.broker.data_dir, "/tmp/pq");
            assert_eq!(cfg.logging.level, "debug");
        },
    );
}
