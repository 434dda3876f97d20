use insta::assert_snapshot;
use stateless_session::{CookieSessionId, SessionConfig, StatelessSession};

use crate::fixtures::config;


#[test]
fn all_fields_but_the_secret_have_a_default_value() {
    let config = serde_json::from_str::<SessionConfig>("{}").unwrap();
    assert!(config.secret.is_none());
}

#[test]
fn the_secret_is_required() {
    let err = StatelessSession::new(SessionConfig::default(), CookieSessionId::default())
        .unwrap_err();
    assert_snapshot!(err, @"No secret was provided: it is required to seal session tokens");
}

#[test]
fn the_secret_must_be_long_enough() {
    let err = StatelessSession::new(SessionConfig::new("hunter2"), CookieSessionId::default())
        .unwrap_err();
    assert_snapshot!(err, @"The session secret is too short: it must be at least 32 bytes long, it is 7 bytes long");
}

#[test]
fn the_custom_header_must_be_a_valid_header_name() {
    let mut config = config();
    config.custom_header = Some("x session".into());
    let err = StatelessSession::new(config, CookieSessionId::default()).unwrap_err();
    assert_snapshot!(err, @"`x session` is not a valid header name");
}

#[test]
fn the_cookie_name_must_be_valid() {
    let mut config = config();
    config.cookie.name = "my session".into();
    let err = StatelessSession::new(config, CookieSessionId::default()).unwrap_err();
    assert_snapshot!(err, @"`my session` is not a valid cookie name");
}

#[test]
fn the_cookie_name_is_irrelevant_if_a_custom_header_is_used() {
    let mut config = config();
    config.cookie.name = "my session".into();
    config.custom_header = Some("x-session".into());
    assert!(StatelessSession::new(config, CookieSessionId::default()).is_ok());
}

#[test]
fn the_cookie_max_age_cannot_be_zero() {
    let mut config = config();
    config.cookie.max_age = Some(std::time::Duration::ZERO);
    let err = StatelessSession::new(config, CookieSessionId::default()).unwrap_err();
    assert_snapshot!(err, @"The `Max-Age` of the session cookie can't be zero: the browser would discard it immediately");
}

#[test]
fn the_debug_representation_does_not_leak_the_secret() {
    let sessions = StatelessSession::new(config(), CookieSessionId::default()).unwrap();
    let repr = format!("{sessions:?}");
    assert!(!repr.contains(crate::fixtures::SECRET));
    assert!(repr.contains("sk-stateless-session"));
}
