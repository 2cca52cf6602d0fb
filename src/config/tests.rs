use super::*;

use serial_test::serial;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.redis.url, DEFAULT_REDIS_URL);
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackend::Redis);
    assert_eq!(settings.cache.namespace, "rescache");
    assert_eq!(settings.cache.ttl, Duration::from_secs(60));
    assert_eq!(settings.cache.memory_capacity.get(), 1024);
    assert_eq!(settings.cache.max_body_bytes.get(), 1024 * 1024);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.backend = Some("redis".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_backend: Some(BackendArg::Memory),
        cache_ttl_seconds: Some(5),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.ttl, Duration::from_secs(5));
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
fn store_overrides_apply_to_purge() {
    let mut raw = RawSettings::default();
    raw.apply_store_overrides(&StoreOverrides {
        redis_url: Some("redis://cache.internal:6380/2".to_string()),
        cache_namespace: Some("staging".to_string()),
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.redis.url, "redis://cache.internal:6380/2");
    assert_eq!(settings.cache.namespace, "staging");
}

#[test]
fn invalid_values_are_rejected_with_their_key() {
    let cases: [(&str, fn(&mut RawSettings)); 7] = [
        ("server.port", |raw| raw.server.port = Some(0)),
        ("logging.level", |raw| raw.logging.level = Some("loud".into())),
        ("redis.url", |raw| raw.redis.url = Some("http://x".into())),
        ("cache.backend", |raw| raw.cache.backend = Some("disk".into())),
        ("cache.ttl_seconds", |raw| raw.cache.ttl_seconds = Some(0)),
        ("cache.ttl_seconds", |raw| raw.cache.ttl_seconds = Some(u64::MAX)),
        ("cache.namespace", |raw| raw.cache.namespace = Some("a*".into())),
    ];

    for (expected, mutate) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected invalid `{expected}`, got {other:?}"),
        }
    }
}

#[test]
fn ttl_up_to_one_year_is_accepted() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(MAX_CACHE_TTL_SECS);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl, Duration::from_secs(MAX_CACHE_TTL_SECS));
}

#[test]
fn backend_names_are_case_insensitive() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some(" Memory ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["rescache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "rescache",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--redis-url",
        "redis://override:6379/1",
        "--cache-backend",
        "memory",
        "--cache-enabled",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.store.redis_url.as_deref(),
                Some("redis://override:6379/1")
            );
            assert_eq!(serve.overrides.cache_backend, Some(BackendArg::Memory));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_purge_arguments() {
    let args = CliArgs::parse_from([
        "rescache",
        "purge",
        "--resource",
        "ArticleController",
        "--cache-namespace",
        "prod",
    ]);

    match args.command.expect("purge command") {
        Command::Purge(purge) => {
            assert_eq!(purge.resource, "ArticleController");
            assert_eq!(purge.store.cache_namespace.as_deref(), Some("prod"));
            assert!(purge.store.redis_url.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn environment_overrides_file_defaults() {
    // SAFETY: serialized with every other test touching the environment.
    unsafe {
        std::env::set_var("RESCACHE__CACHE__TTL_SECONDS", "15");
        std::env::set_var("RESCACHE__SERVER__PORT", "8181");
    }

    let args = CliArgs::parse_from(["rescache"]);
    let loaded = load(&args);

    unsafe {
        std::env::remove_var("RESCACHE__CACHE__TTL_SECONDS");
        std::env::remove_var("RESCACHE__SERVER__PORT");
    }

    let settings = loaded.expect("valid settings");
    assert_eq!(settings.cache.ttl, Duration::from_secs(15));
    assert_eq!(settings.server.addr.port(), 8181);
}
