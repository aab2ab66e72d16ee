use super::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold the guard from `lock_env`.
unsafe fn clear_tobi_env() {
    unsafe {
        std::env::remove_var("TOBI_WS_URL");
        std::env::remove_var("TOBI_ROLE");
        std::env::remove_var("TOBI_HISTORY_LIMIT");
        std::env::remove_var("TOBI_SEND_HISTORY");
        std::env::remove_var("TOBI_DISPLAY_SOURCES");
        std::env::remove_var("TOBI_MAX_BUFFERED_BYTES");
        std::env::remove_var("TOBI_REQUEST_TIMEOUT_SECS");
    }
}

#[test]
fn from_env_defaults() {
    let _env = lock_env();
    unsafe { clear_tobi_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg, ClientConfig::default());
    assert_eq!(cfg.role, "researchAssistant");
    assert_eq!(cfg.history_limit, 20);
    assert!(cfg.endpoint.is_none());
    assert_eq!(cfg.request_timeout_ms(), Some(120_000));
}

#[test]
fn from_env_parses_overrides() {
    let _env = lock_env();
    unsafe {
        clear_tobi_env();
        std::env::set_var("TOBI_WS_URL", " wss://chat.example.test/prod ");
        std::env::set_var("TOBI_ROLE", "policyAdvisor");
        std::env::set_var("TOBI_HISTORY_LIMIT", "6");
        std::env::set_var("TOBI_SEND_HISTORY", "no");
        std::env::set_var("TOBI_DISPLAY_SOURCES", "0");
        std::env::set_var("TOBI_MAX_BUFFERED_BYTES", "4096");
        std::env::set_var("TOBI_REQUEST_TIMEOUT_SECS", "0");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.endpoint.as_deref(), Some("wss://chat.example.test/prod"));
    assert_eq!(cfg.role, "policyAdvisor");
    assert_eq!(cfg.history_limit, 6);
    assert!(!cfg.send_history);
    assert!(!cfg.display_sources);
    assert_eq!(cfg.max_buffered_bytes, 4096);
    assert_eq!(cfg.request_timeout_ms(), None);

    unsafe { clear_tobi_env() };
}

#[test]
fn from_env_ignores_unparsable_numbers() {
    let _env = lock_env();
    unsafe {
        clear_tobi_env();
        std::env::set_var("TOBI_HISTORY_LIMIT", "lots");
        std::env::set_var("TOBI_REQUEST_TIMEOUT_SECS", "-5");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.history_limit, DEFAULT_HISTORY_LIMIT);
    assert_eq!(cfg.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

    unsafe { clear_tobi_env() };
}

#[test]
fn from_env_invalid_bool_errors() {
    let _env = lock_env();
    unsafe {
        clear_tobi_env();
        std::env::set_var("TOBI_DISPLAY_SOURCES", "maybe");
    }

    let err = ClientConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("TOBI_DISPLAY_SOURCES"));
    assert!(err.contains("maybe"));

    unsafe { clear_tobi_env() };
}

#[test]
fn blank_endpoint_is_treated_as_unset() {
    let _env = lock_env();
    unsafe {
        clear_tobi_env();
        std::env::set_var("TOBI_WS_URL", "   ");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert!(cfg.endpoint.is_none());

    unsafe { clear_tobi_env() };
}

#[test]
fn with_endpoint_keeps_other_defaults() {
    let cfg = ClientConfig::with_endpoint("ws://localhost:9000");
    assert_eq!(cfg.endpoint.as_deref(), Some("ws://localhost:9000"));
    assert_eq!(cfg.max_buffered_bytes, DEFAULT_MAX_BUFFERED_BYTES);
}

#[test]
fn parse_bool_accepts_common_spellings() {
    assert_eq!(parse_bool("TRUE"), Some(true));
    assert_eq!(parse_bool(" yes "), Some(true));
    assert_eq!(parse_bool("0"), Some(false));
    assert_eq!(parse_bool("off"), None);
}
