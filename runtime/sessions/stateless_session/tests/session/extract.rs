//! Locating the session token in incoming requests.
use googletest::{
    assert_that,
    prelude::{eq, some},
};
use http::{HeaderMap, HeaderValue, Request, header::COOKIE};
use serde_json::json;
use stateless_session::{StatelessSession, session_id_from_cookie};

use crate::fixtures::{config, cookie_sessions, data};

#[test]
fn the_session_cookie_is_found_among_other_cookies() {
    let sessions = cookie_sessions(config());
    let token = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();
    let request = Request::builder()
        .header(COOKIE, "theme=dark")
        .header(COOKIE, format!("lang=en; sk-stateless-session={token}"))
        .body(())
        .unwrap();

    let session = sessions.load(request.headers());
    assert_that!(session.get_raw("a"), some(eq(&json!(1))));
}

#[test]
fn invalid_cookie_headers_are_skipped() {
    let sessions = cookie_sessions(config());
    let token = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();
    let mut headers = HeaderMap::new();
    headers.append(COOKIE, HeaderValue::from_static("=no-name"));
    headers.append(
        COOKIE,
        HeaderValue::from_str(&format!("sk-stateless-session={token}")).unwrap(),
    );

    let session = sessions.load(&headers);
    assert_that!(session.get_raw("a"), some(eq(&json!(1))));
}

#[test]
fn a_renamed_cookie_is_honored() {
    let mut config = config();
    config.cookie.name = "my-session".into();
    let sessions = cookie_sessions(config);
    let token = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&format!("sk-stateless-session={token}")).unwrap(),
    );
    assert!(sessions.load(&headers).is_empty());

    headers.insert(
        COOKIE,
        HeaderValue::from_str(&format!("my-session={token}")).unwrap(),
    );
    assert!(!sessions.load(&headers).is_empty());
}

#[test]
fn an_empty_token_counts_as_absent() {
    let sessions = StatelessSession::new(config(), |_: &HeaderMap| Some(String::new())).unwrap();
    let session = sessions.load(&HeaderMap::new());
    assert!(session.is_empty());
    assert!(!session.is_dirty());
}

#[test]
fn closures_can_locate_the_token() {
    let sessions = StatelessSession::new(config(), |headers: &HeaderMap| {
        headers
            .get("x-api-session")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    })
    .unwrap();
    let token = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("x-api-session", HeaderValue::from_str(&token).unwrap());
    assert!(!sessions.load(&headers).is_empty());
}

#[test]
fn the_cookie_extractor_can_be_shared_with_other_configurations() {
    let extractor = session_id_from_cookie("shared");
    assert_eq!(extractor.name(), "shared");

    let mut config = config();
    config.cookie.name = "shared".into();
    assert!(StatelessSession::new(config, extractor).is_ok());
}
