//! 도메인 API 및 로그인 흐름 통합 테스트.

use mockito::{Matcher, Server};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

use simtrade_client::{
    ApiClient, LoginFlow, MemoryTokenStore, SessionContext, SessionStatus, SessionTokenGuard,
};
use simtrade_core::{ApiConfig, ClientError, TradeOrder};

fn guard(base_url: &str, token: Option<&str>) -> Arc<SessionTokenGuard> {
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
        ..Default::default()
    };
    Arc::new(SessionTokenGuard::new(config, session).unwrap())
}

#[tokio::test]
async fn test_companies_reads_results_envelope() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/companies/info")
        .with_status(200)
        .with_body(r#"{"results":[{"companyName":"A","currentPrice":1000,"changeRate":-2.5,"sector":"IT"}]}"#)
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    let companies = api.companies().await.unwrap();

    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].company_name, "A");
    assert_eq!(companies[0].change_rate, dec!(-2.5));
    assert_eq!(companies[0].sector.as_deref(), Some("IT"));
}

#[tokio::test]
async fn test_company_detail_sends_name_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/companies/detail")
        .match_query(Matcher::UrlEncoded("name".into(), "삼성 전자".into()))
        .with_status(200)
        .with_body(r#"{"results":{"companyName":"삼성 전자","currentPrice":70000,"chart":[{"time":"2024-01-01T09:00:00","price":69000}]}}"#)
        .expect(1)
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    let detail = api.company_detail("삼성 전자").await.unwrap().unwrap();

    assert_eq!(detail.current_price, dec!(70000));
    assert_eq!(detail.chart[0].short_time(), "09:00");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rankings_drop_empty_accounts() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/user-positions/ranking")
        .with_status(200)
        .with_body(
            r#"{"results":[{"username":"a","totalAssets":1000},{"username":"b","totalAssets":0},{"username":"c","totalAssets":-5}]}"#,
        )
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    let rankings = api.rankings().await.unwrap();

    assert_eq!(rankings.len(), 1);
    assert_eq!(rankings[0].username, "a");
}

#[tokio::test]
async fn test_sector_themes_use_data_envelope() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sector-themes/info")
        .with_status(200)
        .with_body(r#"{"data":[{"themeName":"반도체","changeRate":3.1,"leadingStock":"A"}]}"#)
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    let themes = api.sector_themes().await.unwrap();

    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].display_name(), "반도체");
}

#[tokio::test]
async fn test_buy_posts_order_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/trade/buy")
        .match_header("authorization", "Bearer t")
        .match_body(Matcher::Json(json!({
            "companyName": "A",
            "quantity": 1,
            "price": "1500"
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    api.buy(&TradeOrder::new("A", 0, dec!(1500))).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_sell_surfaces_server_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/trade/sell")
        .with_status(400)
        .with_body(r#"{"message":"보유 수량이 부족합니다"}"#)
        .create_async()
        .await;

    let api = ApiClient::new(guard(&server.url(), Some("t")));
    let err = api
        .sell(&TradeOrder::new("A", 10, dec!(1500)))
        .await
        .unwrap_err();

    match err {
        ClientError::Request { status, message } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "보유 수량이 부족합니다");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_callback_token_is_stored_without_reissue() {
    let mut server = Server::new_async().await;
    let reissue = server
        .mock("GET", "/auth/reissue")
        .expect(0)
        .create_async()
        .await;

    let guard = guard(&server.url(), None);
    let flow = LoginFlow::new(Arc::clone(&guard));
    let token = flow
        .complete_callback("http://localhost:3000/login/callback?accessToken=cb-token")
        .await
        .unwrap();

    assert_eq!(token.expose(), "cb-token");
    assert_eq!(guard.session().status(), SessionStatus::Authenticated);
    reissue.assert_async().await;
}

#[tokio::test]
async fn test_callback_without_token_reissues_from_header() {
    let mut server = Server::new_async().await;
    let reissue = server
        .mock("GET", "/auth/reissue")
        .with_status(200)
        .with_header("authorization", "Bearer reissued")
        .expect(1)
        .create_async()
        .await;

    let guard = guard(&server.url(), None);
    let flow = LoginFlow::new(Arc::clone(&guard));
    flow.complete_callback("?state=xyz").await.unwrap();

    assert_eq!(guard.session().access_token().unwrap().expose(), "reissued");
    reissue.assert_async().await;
}

#[tokio::test]
async fn test_reissue_failure_requires_login() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/auth/reissue")
        .with_status(401)
        .create_async()
        .await;

    let guard = guard(&server.url(), None);
    let flow = LoginFlow::new(Arc::clone(&guard));
    let err = flow.reissue().await.unwrap_err();

    assert!(matches!(err, ClientError::Reauthentication(_)));
    assert!(matches!(
        guard.session().status(),
        SessionStatus::LoginRequired { .. }
    ));
}

#[tokio::test]
async fn test_logout_and_login_url() {
    let server = Server::new_async().await;
    let guard = guard(&server.url(), Some("t"));
    let flow = LoginFlow::new(Arc::clone(&guard));

    assert_eq!(
        flow.login_url().unwrap().as_str(),
        format!("{}/oauth2/authorization/google", server.url())
    );

    flow.logout().unwrap();
    assert!(guard.session().access_token().is_none());
    assert_eq!(guard.session().status(), SessionStatus::LoggedOut);
}
