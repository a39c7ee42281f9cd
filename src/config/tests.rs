use std::io::Write;

use super::*;

fn cli(args: &[&str]) -> CliArgs {
    let mut argv = vec!["typeset_dump"];
    argv.extend_from_slice(args);
    CliArgs::parse_from(argv)
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.max_entries.get(), 2048);
    assert_eq!(settings.render.verification_delay, Duration::from_millis(200));
    assert_eq!(settings.render.watchdog, Duration::from_secs(15));
    assert_eq!(settings.render.default_display_mode, DisplayMode::Inline);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.max_entries = Some(10);
    raw.logging.level = Some("info".to_string());

    let overrides = RenderOverrides {
        cache_max_entries: Some(64),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_render_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.max_entries.get(), 64);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = RenderOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_render_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_cache_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_entries = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero entries must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_entries",
            ..
        }
    ));
}

#[test]
fn zero_watchdog_is_rejected_but_zero_delay_is_allowed() {
    let mut raw = RawSettings::default();
    raw.render.verification_delay_ms = Some(0);
    let settings = Settings::from_raw(raw.clone()).expect("zero delay is fine");
    assert_eq!(settings.render.verification_delay, Duration::ZERO);

    raw.render.watchdog_ms = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn display_mode_parses_block_aliases() {
    let mut raw = RawSettings::default();
    raw.render.default_display_mode = Some("Display".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.default_display_mode, DisplayMode::Block);

    let mut raw = RawSettings::default();
    raw.render.default_display_mode = Some("sideways".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_reported_with_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "logging.level"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn parse_cli_arguments() {
    let args = cli(&[
        "--log-json",
        "true",
        "--display-mode",
        "block",
        "--watchdog-ms",
        "500",
        "--stats",
        "solution.json",
    ]);

    assert_eq!(args.solution, PathBuf::from("solution.json"));
    assert!(args.stats);
    assert_eq!(args.overrides.log_json, Some(true));
    assert_eq!(args.overrides.display_mode.as_deref(), Some("block"));
    assert_eq!(args.overrides.watchdog_ms, Some(500));
}

#[test]
fn config_file_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[cache]\nmax_entries = 12\n\n[render]\nverification_delay_ms = 5\nwatchdog_ms = 900"
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = cli(&["--config-file", &path, "--watchdog-ms", "1000", "solution.json"]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.cache.max_entries.get(), 12);
    assert_eq!(settings.render.verification_delay, Duration::from_millis(5));
    assert_eq!(settings.render.watchdog, Duration::from_millis(1000));
}
