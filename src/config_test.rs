use super::*;

/// # Safety
/// Tests must run with `--test-threads=1` to avoid env races.
unsafe fn clear_notes_env() {
    unsafe {
        std::env::remove_var("NOTES_API_BASE");
        std::env::remove_var("NOTES_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("NOTES_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("NOTES_TOGGLE_COOLDOWN_MS");
        std::env::remove_var("NOTES_PERSIST_COOLDOWN_MS");
        std::env::remove_var("NOTES_AI_COOLDOWN_MS");
    }
}

#[test]
fn from_env_uses_defaults() {
    unsafe { clear_notes_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg, ClientConfig::default());
    assert_eq!(cfg.api_base, DEFAULT_API_BASE);
    assert_eq!(cfg.timeouts.request(), Duration::from_secs(300));
    assert_eq!(cfg.cooldowns, Cooldowns { toggle_ms: 300, persist_ms: 2000, ai_ms: 3000 });
}

#[test]
fn from_env_parses_overrides() {
    unsafe {
        clear_notes_env();
        std::env::set_var("NOTES_API_BASE", "https://notes.example.test/api/");
        std::env::set_var("NOTES_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("NOTES_CONNECT_TIMEOUT_SECS", "7");
        std::env::set_var("NOTES_PERSIST_COOLDOWN_MS", "500");
        std::env::set_var("NOTES_AI_COOLDOWN_MS", "not-a-number");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_base, "https://notes.example.test/api");
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 42, connect_secs: 7 });
    assert_eq!(cfg.cooldowns.persist_ms, 500);
    assert_eq!(cfg.cooldowns.ai_ms, DEFAULT_AI_COOLDOWN_MS);

    unsafe { clear_notes_env() };
}

#[test]
fn from_env_rejects_non_http_base() {
    unsafe {
        clear_notes_env();
        std::env::set_var("NOTES_API_BASE", "ftp://nope");
    }

    let err = ClientConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("invalid API base URL"));

    unsafe { clear_notes_env() };
}

#[test]
fn from_env_rejects_zero_timeout() {
    unsafe {
        clear_notes_env();
        std::env::set_var("NOTES_REQUEST_TIMEOUT_SECS", "0");
    }

    assert!(matches!(ClientConfig::from_env(), Err(ConfigError::ZeroTimeout)));

    unsafe { clear_notes_env() };
}

#[test]
fn with_api_base_trims_trailing_slash() {
    let cfg = ClientConfig::default()
        .with_api_base("http://localhost:9000/api//")
        .unwrap();
    assert_eq!(cfg.api_base, "http://localhost:9000/api");
}
