//! Tests for `src/config.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use radarwatch::config::{
    config_path, load_config, IgnoredOverride, RadarwatchConfig, DEFAULT_CONFIG_FILE,
};

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| vars.get(key).cloned()
}

// ---------------------------------------------------------------------------
// Defaults and parsing
// ---------------------------------------------------------------------------

#[test]
fn empty_toml_yields_defaults() {
    let config = RadarwatchConfig::from_toml("").expect("parse");

    assert_eq!(config.serial.port, "/dev/ttyUSB0");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.serial.read_timeout_ms, 100);
    assert_eq!(config.serial.settle_ms, 2000);
    assert_eq!(config.forward.bind, "127.0.0.1:65432");
    assert_eq!(config.alerts.cooldown_secs, 5);
    assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    assert_eq!(config.telegram.bot_token_key, "TELEGRAM_BOT_TOKEN");
    assert_eq!(config.telegram.recipients_key, "TELEGRAM_CHAT_ID");
    assert_eq!(config.telegram.request_timeout_secs, 2);
    assert!(config.telegram.discover);
    assert_eq!(config.store.env_file, PathBuf::from(".env"));
    assert_eq!(config.logging.dir, PathBuf::from("logs"));
    assert_eq!(config.logging.level, "info");
    config.validate().expect("defaults are valid");
}

#[test]
fn full_toml_overrides_every_section() {
    let toml = r#"
        [serial]
        port = "COM3"
        baud_rate = 115200
        read_timeout_ms = 250
        settle_ms = 0

        [forward]
        bind = "0.0.0.0:7000"

        [alerts]
        cooldown_secs = 30

        [telegram]
        api_base = "http://localhost:8081"
        bot_token_key = "BOT"
        recipients_key = "CHATS"
        request_timeout_secs = 10
        discover = false

        [store]
        env_file = "/etc/radarwatch/secrets.env"

        [logging]
        dir = "/var/log/radarwatch"
        level = "debug"
    "#;
    let config = RadarwatchConfig::from_toml(toml).expect("parse");

    assert_eq!(config.serial.port, "COM3");
    assert_eq!(config.serial.baud_rate, 115_200);
    assert_eq!(config.serial.read_timeout_ms, 250);
    assert_eq!(config.serial.settle_ms, 0);
    assert_eq!(config.forward.bind, "0.0.0.0:7000");
    assert_eq!(config.alerts.cooldown_secs, 30);
    assert_eq!(config.telegram.api_base, "http://localhost:8081");
    assert_eq!(config.telegram.bot_token_key, "BOT");
    assert_eq!(config.telegram.recipients_key, "CHATS");
    assert_eq!(config.telegram.request_timeout_secs, 10);
    assert!(!config.telegram.discover);
    assert_eq!(
        config.store.env_file,
        PathBuf::from("/etc/radarwatch/secrets.env")
    );
    assert_eq!(config.logging.level, "debug");
    config.validate().expect("valid");
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config = RadarwatchConfig::from_toml("[serial]\nport = \"/dev/ttyACM0\"\n").expect("parse");
    assert_eq!(config.serial.port, "/dev/ttyACM0");
    assert_eq!(config.serial.baud_rate, 9600);
}

#[test]
fn malformed_toml_is_an_error() {
    assert!(RadarwatchConfig::from_toml("[serial\nport=").is_err());
    assert!(RadarwatchConfig::from_toml("[serial]\nbaud_rate = \"fast\"").is_err());
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

#[test]
fn env_overrides_win_over_file_values() {
    let mut config = RadarwatchConfig::from_toml("[serial]\nport = \"COM1\"").expect("parse");
    let ignored = config.apply_overrides(env_from(&[
        ("RADARWATCH_SERIAL_PORT", "/dev/ttyS1"),
        ("RADARWATCH_BAUD_RATE", "57600"),
        ("RADARWATCH_BIND", "127.0.0.1:9000"),
        ("RADARWATCH_COOLDOWN_SECS", "12"),
        ("RADARWATCH_ENV_FILE", "/tmp/x.env"),
    ]));

    assert_eq!(config.serial.port, "/dev/ttyS1");
    assert_eq!(config.serial.baud_rate, 57_600);
    assert_eq!(config.forward.bind, "127.0.0.1:9000");
    assert_eq!(config.alerts.cooldown_secs, 12);
    assert_eq!(config.store.env_file, PathBuf::from("/tmp/x.env"));
    assert!(ignored.is_empty());
}

#[test]
fn unparsable_numeric_override_is_ignored() {
    let mut config = RadarwatchConfig::default();
    let ignored = config.apply_overrides(env_from(&[
        ("RADARWATCH_BAUD_RATE", "fast"),
        ("RADARWATCH_COOLDOWN_SECS", "-1"),
    ]));
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.alerts.cooldown_secs, 5);
    assert_eq!(
        ignored,
        vec![
            IgnoredOverride {
                var: "RADARWATCH_BAUD_RATE",
                value: "fast".to_owned(),
            },
            IgnoredOverride {
                var: "RADARWATCH_COOLDOWN_SECS",
                value: "-1".to_owned(),
            },
        ]
    );
    assert_eq!(ignored[1].to_string(), "RADARWATCH_COOLDOWN_SECS=\"-1\"");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn validate_rejects_bad_values() {
    let cases: [(&str, &str); 6] = [
        ("[serial]\nport = \"\"", "serial.port"),
        ("[serial]\nbaud_rate = 0", "serial.baud_rate"),
        ("[serial]\nread_timeout_ms = 0", "serial.read_timeout_ms"),
        ("[forward]\nbind = \"localhost\"", "forward.bind"),
        ("[telegram]\napi_base = \"ftp://x\"", "telegram.api_base"),
        ("[telegram]\nrequest_timeout_secs = 0", "telegram.request_timeout_secs"),
    ];
    for (toml, field) in cases {
        let config = RadarwatchConfig::from_toml(toml).expect("parse");
        let err = config.validate().expect_err(field);
        assert!(
            format!("{err:#}").contains(field),
            "error for {field} was: {err:#}"
        );
    }
}

#[test]
fn bind_addr_parses_default() {
    let addr = RadarwatchConfig::default().bind_addr().expect("addr");
    assert_eq!(addr.port(), 65432);
    assert!(addr.ip().is_loopback());
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (config, ignored) = load_config(&dir.path().join("absent.toml"), no_env).expect("load");
    assert!(ignored.is_empty());
    assert_eq!(config.serial.port, "/dev/ttyUSB0");
}

#[test]
fn load_applies_overrides_then_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("radarwatch.toml");
    std::fs::write(&path, "[alerts]\ncooldown_secs = 9\n").expect("write");

    let (config, _) =
        load_config(&path, env_from(&[("RADARWATCH_SERIAL_PORT", "COM7")])).expect("load");
    assert_eq!(config.alerts.cooldown_secs, 9);
    assert_eq!(config.serial.port, "COM7");

    let (config, ignored) = load_config(&path, env_from(&[("RADARWATCH_COOLDOWN_SECS", "soon")]))
        .expect("bad numeric override is skipped, not fatal");
    assert_eq!(config.alerts.cooldown_secs, 9);
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].var, "RADARWATCH_COOLDOWN_SECS");

    let err = load_config(&path, env_from(&[("RADARWATCH_BIND", "nope")]))
        .expect_err("invalid override must fail validation");
    assert!(format!("{err:#}").contains("forward.bind"));
}

#[test]
fn load_reports_invalid_file_with_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[serial\n").expect("write");

    let err = load_config(&path, no_env).expect_err("parse failure");
    assert!(format!("{err:#}").contains("broken.toml"));
}

#[test]
fn config_path_precedence() {
    let explicit = Path::new("/etc/explicit.toml");
    let env = env_from(&[("RADARWATCH_CONFIG_PATH", "/etc/from-env.toml")]);

    assert_eq!(config_path(Some(explicit), &env), explicit.to_path_buf());
    assert_eq!(config_path(None, &env), PathBuf::from("/etc/from-env.toml"));
    assert_eq!(config_path(None, no_env), PathBuf::from(DEFAULT_CONFIG_FILE));
}
