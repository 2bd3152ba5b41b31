use std::io::Write;

use serial_test::serial;

use super::*;
use crate::cache::CacheConfig;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:8000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.upstream.base_url, None);
    assert_eq!(settings.upstream.timeout, Duration::from_secs(10));
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cache_settings_use_correct_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let cache = CacheConfig::from(&settings.cache);

    assert_eq!(cache.key_prefix, "isr");
    assert_eq!(cache.default_ttl_seconds, 3600);
    assert_eq!(cache.default_stale_seconds, 60);
    assert_eq!(cache.root_check_interval_seconds, 10);
    assert_eq!(cache.max_key_len, 100);
    assert!(cache.should_prewarm());
}

#[test]
fn cache_settings_can_be_overridden_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        cache_key_prefix: Some("page".to_string()),
        cache_default_ttl_seconds: Some(600),
        cache_default_stale_seconds: Some(30),
        dev_mode: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.key_prefix, "page");
    assert_eq!(settings.cache.default_ttl_seconds, 600);
    assert_eq!(settings.cache.default_stale_seconds, 30);
    assert!(!CacheConfig::from(&settings.cache).should_prewarm());
}

#[test]
fn upstream_base_url_is_trimmed() {
    let mut raw = RawSettings::default();
    raw.upstream.base_url = Some(" http://leaky.local:3001/ ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.upstream.base_url.as_deref(),
        Some("http://leaky.local:3001")
    );
}

#[test]
fn blank_base_url_disables_upstream() {
    let mut raw = RawSettings::default();
    raw.upstream.base_url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.upstream.base_url, None);
}

#[test]
fn invalid_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.upstream.base_url = Some("not a url".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "upstream.base_url",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.root_check_interval_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.root_check_interval_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.server.port = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["isr-cache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "isr-cache",
        "serve",
        "--server-port",
        "9000",
        "--upstream-base-url",
        "http://leaky.local",
        "--cache-prewarm-on-startup",
        "false",
        "--log-json",
        "yes",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            let overrides = serve.overrides;
            assert_eq!(overrides.server_port, Some(9000));
            assert_eq!(
                overrides.upstream_base_url.as_deref(),
                Some("http://leaky.local")
            );
            assert_eq!(overrides.cache_prewarm_on_startup, Some(false));
            assert_eq!(overrides.log_json, Some(true));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_routes_command() {
    let args = CliArgs::parse_from(["isr-cache", "routes"]);
    assert!(matches!(args.command, Some(Command::Routes)));
}

#[test]
#[serial]
fn config_file_and_environment_are_layered() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    writeln!(
        file,
        "[server]\nport = 8100\n\n[cache]\ndefault_ttl_seconds = 120\n"
    )
    .expect("write config");

    // SAFETY: guarded by `#[serial]`; no other test touches the environment concurrently.
    unsafe {
        std::env::set_var("ISR__CACHE__DEFAULT_TTL_SECONDS", "240");
    }

    let args = CliArgs::parse_from([
        "isr-cache",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
    ]);
    let result = load(&args);

    // SAFETY: see above.
    unsafe {
        std::env::remove_var("ISR__CACHE__DEFAULT_TTL_SECONDS");
    }

    let settings = result.expect("valid settings");
    assert_eq!(settings.server.addr.port(), 8100);
    assert_eq!(settings.cache.default_ttl_seconds, 240);
}
