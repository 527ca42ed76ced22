//! Unit tests for command line handling.

use super::{Cli, StartupError, init_tracing, resolve_config};
use clap::Parser;
use rstest::rstest;
use stagehand::config::{ConfigError, DEFAULT_LISTEN};

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("stagehand").chain(args.iter().copied()))
        .expect("arguments should parse")
}

#[test]
fn defaults_apply_without_a_config_file() {
    let config = resolve_config(&cli(&[])).expect("default config");

    assert_eq!(config.gateway.listen, DEFAULT_LISTEN);
    assert!(config.server_types.is_empty());
}

#[test]
fn listen_flag_overrides_the_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("stagehand.toml");
    std::fs::write(&path, "[gateway]\nlisten = \"127.0.0.1:9000\"\n").expect("write config");
    let path_arg = path.to_str().expect("utf-8 temp path");

    let config = resolve_config(&cli(&["--config", path_arg, "--listen", "127.0.0.1:9100"]))
        .expect("config should resolve");

    assert_eq!(config.gateway.listen, "127.0.0.1:9100");
}

#[rstest]
#[case("not-an-address")]
#[case("localhost")]
fn invalid_listen_flag_is_rejected(#[case] listen: &str) {
    let result = resolve_config(&cli(&["--listen", listen]));

    assert!(matches!(
        result,
        Err(StartupError::Config(ConfigError::InvalidListenAddress(ref address))) if address == listen
    ));
}

#[test]
fn missing_config_file_is_reported() {
    let result = resolve_config(&cli(&["--config", "/nonexistent/stagehand.toml"]));

    assert!(matches!(
        result,
        Err(StartupError::Config(ConfigError::Read { .. }))
    ));
}

#[test]
fn malformed_log_filter_is_rejected() {
    let result = init_tracing(Some("stagehand=loud"));

    assert!(matches!(result, Err(StartupError::LogFilter(_))));
}
