use fixtures::{config, cookie_sessions, data, header_sessions, request_with_cookie};
use googletest::{
    assert_that,
    prelude::{empty, eq, len, none, some},
};
use helpers::{session_cookie, set_cookies, unseal};
use http::{Request, Response, header::SET_COOKIE};
use itertools::Itertools;
use serde_json::json;
use stateless_session::{SessionExt, errors::FinalizeError};

mod config;
mod extract;

#[tokio::test]
async fn untouched_session_is_not_sent_to_the_client() {
    let sessions = cookie_sessions(config());
    let token = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();

    let response = sessions
        .handle(request_with_cookie(&token), |request: Request<()>| async move {
            let session = request.session().unwrap();
            assert_that!(session.get_raw("a"), some(eq(&json!(1))));
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    assert_that!(set_cookies(&response), empty());
}

#[tokio::test]
async fn in_place_mutations_are_sealed_into_a_new_token() {
    let sessions = cookie_sessions(config());
    let token = sessions
        .codec()
        .seal(&data(json!({ "user": { "name": "b" } })))
        .unwrap();

    let response = sessions
        .handle(request_with_cookie(&token), |request: Request<()>| async move {
            request.session().unwrap().update(|data| {
                data["user"]["name"] = json!("a");
            });
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    let cookies = set_cookies(&response);
    assert_that!(cookies, len(eq(1)));
    let cookie = session_cookie(&response);
    assert_ne!(cookie.value, token);
    assert_eq!(
        unseal(&sessions, &cookie.value),
        json!({ "user": { "name": "a" } })
    );
}

#[tokio::test]
async fn clearing_then_inserting_replaces_the_previous_data() {
    let sessions = cookie_sessions(config());
    let token = sessions
        .codec()
        .seal(&data(json!({ "a": 1, "b": [1, 2] })))
        .unwrap();

    let response = sessions
        .handle(request_with_cookie(&token), |request: Request<()>| async move {
            let session = request.session().unwrap();
            assert!(session.clear());
            session.insert("x", 1).unwrap();
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    let cookie = session_cookie(&response);
    assert_eq!(unseal(&sessions, &cookie.value), json!({ "x": 1 }));
}

#[tokio::test]
async fn many_mutations_produce_a_single_token() {
    let sessions = cookie_sessions(config());

    let response = sessions
        .handle(Request::new(()), |request: Request<()>| async move {
            let session = request.session().unwrap();
            session.insert("a", 1).unwrap();
            session.insert("b", 2).unwrap();
            session.remove_raw("a");
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    let cookies = set_cookies(&response);
    assert_that!(cookies, len(eq(1)));
    assert_eq!(unseal(&sessions, &cookies[0].value), json!({ "b": 2 }));
}

#[tokio::test]
async fn a_custom_header_replaces_the_cookie() {
    let sessions = header_sessions();

    let response = sessions
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().insert("k", "v").unwrap();
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    assert_that!(response.headers().get(SET_COOKIE), none());
    let token = response.headers().get("x-session").unwrap().to_str().unwrap();
    assert_eq!(unseal(&sessions, token), json!({ "k": "v" }));
}

#[tokio::test]
async fn the_session_cookie_is_appended_to_existing_cookies() {
    let sessions = cookie_sessions(config());

    let response = sessions
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().insert("k", "v").unwrap();
            let response = Response::builder()
                .header(SET_COOKIE, "theme=dark; Path=/")
                .body(())
                .unwrap();
            Ok::<_, FinalizeError>(response)
        })
        .await
        .unwrap();

    let names = set_cookies(&response)
        .into_iter()
        .map(|c| c.name)
        .sorted()
        .collect_vec();
    assert_eq!(names, vec!["sk-stateless-session", "theme"]);
}

#[tokio::test]
async fn a_request_without_a_token_starts_with_an_empty_session() {
    let sessions = cookie_sessions(config());
    let session = sessions.load(Request::new(()).headers());
    assert!(session.is_empty());
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn unusable_tokens_are_treated_as_absent() {
    let sessions = cookie_sessions(config());
    let other_secret = {
        let mut config = config();
        config.secret = Some("another-secret-that-is-at-least-32-bytes".into());
        cookie_sessions(config)
    };
    let foreign = other_secret
        .codec()
        .seal(&data(json!({ "admin": true })))
        .unwrap();

    for token in ["garbage", "v1.a.b.c.d", foreign.as_str()] {
        let response = sessions
            .handle(request_with_cookie(token), |request: Request<()>| async move {
                assert!(request.session().unwrap().is_empty());
                Ok::<_, FinalizeError>(Response::new(()))
            })
            .await
            .unwrap();
        assert_that!(set_cookies(&response), empty());
    }
}

#[tokio::test]
async fn expired_tokens_are_treated_as_absent() {
    let mut config = config();
    config.expires_in = std::time::Duration::from_secs(60 * 60);
    let sessions = cookie_sessions(config);

    let two_hours_ago = time::OffsetDateTime::now_utc() - time::Duration::hours(2);
    let expired = sessions
        .codec()
        .seal_at(&data(json!({ "a": 1 })), two_hours_ago)
        .unwrap();
    assert!(sessions.load(request_with_cookie(&expired).headers()).is_empty());

    let fresh = sessions.codec().seal(&data(json!({ "a": 1 }))).unwrap();
    let session = sessions.load(request_with_cookie(&fresh).headers());
    assert_that!(session.get_raw("a"), some(eq(&json!(1))));
}

#[derive(Debug)]
enum HandlerError {
    Failed,
    Finalize,
}

impl From<FinalizeError> for HandlerError {
    fn from(_: FinalizeError) -> Self {
        HandlerError::Finalize
    }
}

#[tokio::test]
async fn handler_errors_are_propagated_as_is() {
    let sessions = cookie_sessions(config());

    let outcome = sessions
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().insert("k", "v").unwrap();
            Err::<Response<()>, _>(HandlerError::Failed)
        })
        .await;

    assert!(matches!(outcome, Err(HandlerError::Failed)));
}

#[tokio::test]
async fn error_responses_are_still_finalized() {
    let sessions = cookie_sessions(config());

    let response = sessions
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().insert("attempts", 1).unwrap();
            let response = Response::builder()
                .status(http::StatusCode::UNPROCESSABLE_ENTITY)
                .body(())
                .unwrap();
            Ok::<_, FinalizeError>(response)
        })
        .await
        .unwrap();

    let cookie = session_cookie(&response);
    assert_eq!(unseal(&sessions, &cookie.value), json!({ "attempts": 1 }));
}

#[tokio::test]
async fn handlers_can_read_the_session_while_updating_it() {
    let sessions = cookie_sessions(config());
    let token = sessions.codec().seal(&data(json!({ "visits": 1 }))).unwrap();

    let response = sessions
        .handle(request_with_cookie(&token), |request: Request<()>| async move {
            let session = request.session().unwrap();
            session.update(|data| {
                let visits: u32 = session.get("visits").unwrap().unwrap_or_default();
                data.insert("visits".into(), json!(visits + 1));
            });
            Ok::<_, FinalizeError>(Response::new(()))
        })
        .await
        .unwrap();

    let cookie = session_cookie(&response);
    assert_eq!(unseal(&sessions, &cookie.value), json!({ "visits": 2 }));
}
