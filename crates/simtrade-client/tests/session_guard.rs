//! 세션 토큰 가드 통합 테스트.

use mockito::{Matcher, Server};
use std::sync::Arc;

use simtrade_client::{
    ApiRequest, MemoryTokenStore, SessionContext, SessionStatus, SessionTokenGuard,
};
use simtrade_core::{ApiConfig, ClientError, RefreshPolicy};

fn guard(base_url: &str, token: Option<&str>, policy: RefreshPolicy) -> SessionTokenGuard {
    let store = match token {
        Some(t) => MemoryTokenStore::with_token(t),
        None => MemoryTokenStore::new(),
    };
    let session = Arc::new(SessionContext::new(
        Arc::new(store),
        format!("{}/login", base_url),
    ));
    let config = ApiConfig {
        base_url: base_url.to_string(),
        refresh_policy: policy,
        ..Default::default()
    };
    SessionTokenGuard::new(config, session).unwrap()
}

#[tokio::test]
async fn test_request_carries_stored_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/companies/info")
        .match_header("authorization", "Bearer abc")
        .with_status(200)
        .with_body(r#"{"results":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("abc"), RefreshPolicy::PerRequest);
    let response = guard.send(ApiRequest::get("/companies/info")).await.unwrap();

    assert_eq!(response.status.as_u16(), 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_request_without_token_has_no_authorization() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/companies/info")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), None, RefreshPolicy::PerRequest);
    guard.send(ApiRequest::get("/companies/info")).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_401_refreshes_once_and_retries_once() {
    let mut server = Server::new_async().await;
    let stale = server
        .mock("GET", "/user-positions/portfolio")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"new"}"#)
        .expect(1)
        .create_async()
        .await;
    let retried = server
        .mock("GET", "/user-positions/portfolio")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"results":{"positions":[]}}"#)
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::PerRequest);
    let response = guard
        .send(ApiRequest::get("/user-positions/portfolio"))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(guard.session().access_token().unwrap().expose(), "new");
    assert_eq!(guard.default_authorization().as_deref(), Some("Bearer new"));

    stale.assert_async().await;
    refresh.assert_async().await;
    retried.assert_async().await;
}

#[tokio::test]
async fn test_retried_request_is_not_refreshed_again() {
    let mut server = Server::new_async().await;
    let always_401 = server
        .mock("GET", "/user-positions/portfolio")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"new"}"#)
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::PerRequest);
    let err = guard
        .send(ApiRequest::get("/user-positions/portfolio"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    always_401.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure_clears_session() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", "/companies/info")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::PerRequest);
    let mut status = guard.session().subscribe_status();

    let err = guard.send(ApiRequest::get("/companies/info")).await.unwrap_err();

    assert!(matches!(err, ClientError::Reauthentication(_)));
    assert!(guard.session().access_token().is_none());
    assert!(guard.default_authorization().is_none());
    assert!(status.has_changed().unwrap());
    assert_eq!(
        *status.borrow_and_update(),
        SessionStatus::LoginRequired {
            login_url: format!("{}/login", server.url())
        }
    );

    original.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refresh_without_token_in_body_is_a_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/companies/info")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::PerRequest);
    let err = guard.send(ApiRequest::get("/companies/info")).await.unwrap_err();

    assert!(matches!(err, ClientError::Reauthentication(_)));
    assert!(guard.session().access_token().is_none());
}

#[tokio::test]
async fn test_non_401_failure_skips_refresh() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/companies/info")
        .with_status(500)
        .with_body(r#"{"message":"서버 오류"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("abc"), RefreshPolicy::PerRequest);
    let err = guard.send(ApiRequest::get("/companies/info")).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("서버 오류"));
    assert_eq!(guard.session().access_token().unwrap().expose(), "abc");

    failing.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_per_request_refreshes_each_failed_request() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/(companies/info|user-positions/ranking)$".to_string()))
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"new"}"#)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"^/(companies/info|user-positions/ranking)$".to_string()))
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"results":[]}"#)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::PerRequest);
    let (first, second) = tokio::join!(
        guard.send(ApiRequest::get("/companies/info")),
        guard.send(ApiRequest::get("/user-positions/ranking")),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    refresh.assert_async().await;
    assert_eq!(guard.session().access_token().unwrap().expose(), "new");
}

#[tokio::test]
async fn test_single_flight_shares_one_refresh() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/(companies/info|user-positions/ranking)$".to_string()))
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"new"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"^/(companies/info|user-positions/ranking)$".to_string()))
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"results":[]}"#)
        .create_async()
        .await;

    let guard = guard(&server.url(), Some("old"), RefreshPolicy::SingleFlight);
    let (first, second) = tokio::join!(
        guard.send(ApiRequest::get("/companies/info")),
        guard.send(ApiRequest::get("/user-positions/ranking")),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    refresh.assert_async().await;
}
