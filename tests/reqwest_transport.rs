use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tomiko_client::auth::error::{general_errors, token_errors};
use tomiko_client::auth::TokenRequest;
use tomiko_client::core::types::GrantType;
use tomiko_client::http::{HttpRequest, HttpTransport, ReqwestTransport};
use tomiko_client::provider::{AuthorizationService, ServiceConfig};

fn discovery_for(base: &str) -> serde_json::Value {
    json!({
        "issuer": base,
        "authorization_endpoint": format!("{}/authorize", base),
        "token_endpoint": format!("{}/token", base),
        "jwks_uri": format!("{}/jwks", base),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"]
    })
}

async fn provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_for(&server.uri())))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn discovery_and_refresh_over_http() {
    let server = provider().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "token_type": "Bearer",
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = AuthorizationService::new(ReqwestTransport::new());
    let config = service
        .fetch_from_issuer(&Url::parse(&server.uri()).unwrap())
        .await
        .unwrap();
    assert_eq!(config.token_endpoint.as_str(), format!("{}/token", server.uri()));

    let request = TokenRequest::builder(config, "c1")
        .grant_type(GrantType::RefreshToken)
        .refresh_token("rt-1".to_string())
        .build()
        .unwrap();
    let response = service.perform_token_request(request).await.unwrap();
    assert_eq!(response.access_token(), Some("at-2"));
    assert_eq!(response.expires_in(), Some(3600));
}

#[tokio::test]
async fn token_endpoint_errors_are_mapped() {
    let server = provider().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_uri": "https://docs.example.com/errors"
        })))
        .mount(&server)
        .await;

    let service = AuthorizationService::new(ReqwestTransport::new());
    let config = service
        .fetch_from_issuer(&Url::parse(&server.uri()).unwrap())
        .await
        .unwrap();
    let request = TokenRequest::builder(config, "c1")
        .refresh_token("rt-1".to_string())
        .build()
        .unwrap();
    let ex = service.perform_token_request(request).await.unwrap_err();
    assert_eq!(ex, token_errors::INVALID_CLIENT);
    assert_eq!(ex.uri(), Some("https://docs.example.com/errors"));
}

#[tokio::test]
async fn request_timeout_is_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(discovery_for(&server.uri()))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let service = AuthorizationService::with_config(
        ReqwestTransport::new(),
        ServiceConfig::default().with_request_timeout(Duration::from_millis(100)),
    );
    let ex = service
        .fetch_from_issuer(&Url::parse(&server.uri()).unwrap())
        .await
        .unwrap_err();
    assert_eq!(ex, general_errors::NETWORK_ERROR);
    assert_eq!(ex.cause(), Some("request timed out"));
}

#[tokio::test]
async fn transport_sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_string_contains("\"redirect_uris\""))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/register", server.uri())).unwrap();
    let response = ReqwestTransport::new()
        .execute(HttpRequest::post_json(url, &json!({ "redirect_uris": ["https://app/cb"] })))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert!(response.is_success());
    assert_eq!(response.text(), "{}");
}
