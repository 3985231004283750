mod common;

use std::sync::Arc;

use serde_json::json;
use url::Url;

use common::*;
use tomiko_client::auth::error::{general_errors, registration_errors, token_errors};
use tomiko_client::auth::{AuthorizationRequest, ManagementRequest, ManagementResponse, RedirectOutcome, RegistrationRequest};
use tomiko_client::core::{clock::FixedClock, models::AuthorizationServiceConfiguration, types::GrantType};
use tomiko_client::http::{HttpMethod, TransportError};
use tomiko_client::provider::{AuthorizationService, ServiceConfig};
use tomiko_client::state::{AuthStateManager, MemoryStateStore};
use tomiko_client::util::params::{form_url_decode, AdditionalParameters};

fn service(transport: &Arc<MockTransport>) -> AuthorizationService<Arc<MockTransport>> {
    AuthorizationService::new(transport.clone()).with_clock(Arc::new(FixedClock::from_secs(NOW_SECS)))
}

async fn discovered(transport: &Arc<MockTransport>) -> AuthorizationServiceConfiguration {
    transport.respond_json(200, &discovery_document());
    service(transport)
        .fetch_from_issuer(&Url::parse(ISSUER).unwrap())
        .await
        .unwrap()
}

fn authorization_request(config: AuthorizationServiceConfiguration) -> AuthorizationRequest {
    AuthorizationRequest::builder(config, CLIENT_ID, redirect_uri(), "code")
        .scope("openid profile")
        .state("s-1")
        .nonce("n-1")
        .build()
        .unwrap()
}

#[tokio::test]
async fn discovery_uses_well_known_path() {
    let transport = Arc::new(MockTransport::new());
    let config = discovered(&transport).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(
        requests[0].url.as_str(),
        "https://idp.example.com/.well-known/openid-configuration"
    );
    assert_eq!(config.issuer.as_deref(), Some(ISSUER));
    assert_eq!(config.token_endpoint.as_str(), "https://idp.example.com/token");
    assert!(config.discovery.is_some());
}

#[tokio::test]
async fn discovery_failures_are_catalogued() {
    let transport = Arc::new(MockTransport::new());
    let issuer = Url::parse(ISSUER).unwrap();
    transport
        .respond(404, "not found")
        .respond(200, r#"{"issuer": "https://idp.example.com"}"#)
        .fail(TransportError::Timeout);
    let service = service(&transport);

    assert_eq!(service.fetch_from_issuer(&issuer).await, Err(general_errors::NETWORK_ERROR));
    assert_eq!(
        service.fetch_from_issuer(&issuer).await,
        Err(general_errors::INVALID_DISCOVERY_DOCUMENT)
    );
    assert_eq!(service.fetch_from_issuer(&issuer).await, Err(general_errors::NETWORK_ERROR));
}

#[tokio::test]
async fn code_flow_end_to_end() {
    let transport = Arc::new(MockTransport::new());
    let config = discovered(&transport).await;
    let manager = AuthStateManager::load(MemoryStateStore::new()).unwrap();
    let clock = FixedClock::from_secs(NOW_SECS);

    let pending = ManagementRequest::from(authorization_request(config));
    let uri = pending.request_uri().unwrap();
    assert!(uri.as_str().starts_with("https://idp.example.com/authorize?client_id=c1"));
    assert!(uri.query_pairs().any(|(k, v)| k == "code_challenge_method" && v == "S256"));

    let pending = ManagementRequest::from_json(&pending.to_json().unwrap()).unwrap();
    let redirect = Url::parse("https://app/cb?code=abc&state=s-1").unwrap();
    let response = match pending.complete(RedirectOutcome::Completed(redirect), &clock).unwrap() {
        ManagementResponse::Authorization(response) => response,
        other => panic!("unexpected response {:?}", other),
    };
    let state = manager.update_after_authorization(Some(response), None).unwrap();
    assert_eq!(state.scope(), Some("openid profile"));
    assert!(!state.is_authorized());

    transport.respond_json(
        200,
        &json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "id_token": mint_id_token(json!({ "nonce": "n-1" })),
            "session_state": "xyz"
        }),
    );
    let exchange = state
        .last_authorization_response()
        .unwrap()
        .create_token_exchange_request(AdditionalParameters::new())
        .unwrap();
    let token = service(&transport).perform_token_request(exchange).await.unwrap();
    assert_eq!(token.additional_parameters().get("session_state").map(String::as_str), Some("xyz"));

    let sent = transport.requests().pop().unwrap();
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.header("content-type"), Some("application/x-www-form-urlencoded"));
    let body = form_url_decode(std::str::from_utf8(&sent.body.unwrap()).unwrap()).unwrap();
    let keys: Vec<_> = body.keys().map(String::as_str).collect();
    assert_eq!(keys[..2], ["client_id", "grant_type"]);
    assert_eq!(body["grant_type"], "authorization_code");
    assert_eq!(body["code"], "abc");
    assert_eq!(body["redirect_uri"], "https://app/cb");
    assert!(!body["code_verifier"].is_empty());

    let state = manager.update_after_token_response(Some(token), None).unwrap();
    assert!(state.is_authorized());
    assert_eq!(state.access_token(), Some("at-1"));
    assert_eq!(state.access_token_expiration_time(), Some((NOW_SECS + 3600) * 1000));
    assert_eq!(state.parsed_id_token().unwrap().subject, "user-1");
    assert!(!state.needs_token_refresh(&clock));

    let refresh = state.create_token_refresh(AdditionalParameters::new()).unwrap();
    assert_eq!(refresh.grant_type(), &GrantType::RefreshToken);
    transport.respond_json(200, &json!({ "access_token": "at-2", "expires_in": 60 }));
    let refreshed = service(&transport).perform_token_request(refresh).await.unwrap();
    let sent = transport.requests().pop().unwrap();
    let body = form_url_decode(std::str::from_utf8(&sent.body.unwrap()).unwrap()).unwrap();
    assert_eq!(body["grant_type"], "refresh_token");
    assert_eq!(body["refresh_token"], "rt-1");

    // the refresh response carried no refresh token, so none is kept
    let state = manager.update_after_token_response(Some(refreshed), None).unwrap();
    assert_eq!(state.access_token(), Some("at-2"));
    assert_eq!(state.refresh_token(), None);
    assert!(state.needs_token_refresh(&clock));
}

#[tokio::test]
async fn token_errors_map_through_catalogue() {
    let transport = Arc::new(MockTransport::new());
    let config = discovered(&transport).await;
    let clock = FixedClock::from_secs(NOW_SECS);
    let response = tomiko_client::auth::AuthorizationResponse::from_redirect(
        authorization_request(config),
        &Url::parse("https://app/cb?code=abc&state=s-1").unwrap(),
        &clock,
    )
    .unwrap();
    let exchange = || response.create_token_exchange_request(AdditionalParameters::new()).unwrap();

    transport.respond_json(
        400,
        &json!({ "error": "invalid_grant", "error_description": "code already used" }),
    );
    let ex = service(&transport).perform_token_request(exchange()).await.unwrap_err();
    assert_eq!(ex, token_errors::INVALID_GRANT);
    assert_eq!(ex.description(), Some("code already used"));

    transport.respond_json(400, &json!({ "error": "something_new" }));
    let ex = service(&transport).perform_token_request(exchange()).await.unwrap_err();
    assert_eq!(ex, token_errors::OTHER);
    assert_eq!(ex.error(), Some("something_new"));

    transport.respond(503, "upstream down");
    let ex = service(&transport).perform_token_request(exchange()).await.unwrap_err();
    assert_eq!(ex, general_errors::SERVER_ERROR);

    transport.respond(200, "not json");
    let ex = service(&transport).perform_token_request(exchange()).await.unwrap_err();
    assert_eq!(ex, general_errors::JSON_DESERIALIZATION_ERROR);

    transport.fail(TransportError::Connect("refused".into()));
    let ex = service(&transport).perform_token_request(exchange()).await.unwrap_err();
    assert_eq!(ex, general_errors::NETWORK_ERROR);
}

#[tokio::test]
async fn invalid_id_token_rejects_token_response() {
    let transport = Arc::new(MockTransport::new());
    let config = discovered(&transport).await;
    let response = tomiko_client::auth::AuthorizationResponse::from_redirect(
        authorization_request(config),
        &Url::parse("https://app/cb?code=abc&state=s-1").unwrap(),
        &FixedClock::from_secs(NOW_SECS),
    )
    .unwrap();

    for id_token in [
        mint_id_token(json!({ "nonce": "other" })),
        mint_id_token(json!({ "nonce": "n-1", "aud": "someone-else" })),
        mint_id_token(json!({ "nonce": "n-1", "iss": "https://evil.example.com" })),
    ] {
        transport.respond_json(200, &json!({ "access_token": "at", "id_token": id_token }));
        let exchange = response.create_token_exchange_request(AdditionalParameters::new()).unwrap();
        let ex = service(&transport).perform_token_request(exchange).await.unwrap_err();
        assert_eq!(ex, general_errors::ID_TOKEN_VALIDATION_ERROR);
    }

    transport.respond_json(200, &json!({ "access_token": "at", "id_token": "garbage" }));
    let exchange = response.create_token_exchange_request(AdditionalParameters::new()).unwrap();
    let ex = service(&transport).perform_token_request(exchange).await.unwrap_err();
    assert_eq!(ex, general_errors::ID_TOKEN_PARSING_ERROR);
}

#[tokio::test]
async fn http_issuer_allowed_when_configured() {
    let transport = Arc::new(MockTransport::new());
    let mut document = discovery_document();
    document["issuer"] = json!("http://idp.example.com");
    transport.respond_json(200, &document);
    let service = AuthorizationService::with_config(
        transport.clone(),
        ServiceConfig::default().with_skip_issuer_https_check(true),
    )
    .with_clock(Arc::new(FixedClock::from_secs(NOW_SECS)));
    let config = service.fetch_from_issuer(&Url::parse(ISSUER).unwrap()).await.unwrap();

    let response = tomiko_client::auth::AuthorizationResponse::from_redirect(
        authorization_request(config),
        &Url::parse("https://app/cb?code=abc&state=s-1").unwrap(),
        &FixedClock::from_secs(NOW_SECS),
    )
    .unwrap();
    transport.respond_json(
        200,
        &json!({
            "access_token": "at",
            "id_token": mint_id_token(json!({ "iss": "http://idp.example.com", "nonce": "n-1" }))
        }),
    );
    let exchange = response.create_token_exchange_request(AdditionalParameters::new()).unwrap();
    assert!(service.perform_token_request(exchange).await.is_ok());
}

#[tokio::test]
async fn dynamic_registration() {
    let transport = Arc::new(MockTransport::new());
    let config = discovered(&transport).await;
    let manager = AuthStateManager::load(MemoryStateStore::new()).unwrap();
    let request = || {
        RegistrationRequest::builder(config.clone(), vec![redirect_uri()])
            .build()
            .unwrap()
    };

    transport.respond_json(
        201,
        &json!({
            "client_id": "registered-1",
            "client_secret": "shh",
            "client_secret_expires_at": 0,
            "client_name": "demo"
        }),
    );
    let response = service(&transport).perform_registration_request(request()).await.unwrap();
    assert_eq!(response.client_id(), "registered-1");
    assert_eq!(response.additional_parameters().get("client_name").map(String::as_str), Some("demo"));

    let sent = transport.requests().pop().unwrap();
    assert_eq!(sent.url.as_str(), "https://idp.example.com/register");
    let body: serde_json::Value = serde_json::from_slice(&sent.body.unwrap()).unwrap();
    assert_eq!(body["redirect_uris"], json!(["https://app/cb"]));
    assert_eq!(body["application_type"], json!("native"));

    let state = manager.update_after_registration(Some(response), None).unwrap();
    assert_eq!(state.client_secret(), Some("shh"));
    assert!(!state.has_client_secret_expired(&FixedClock::from_secs(NOW_SECS)));

    transport.respond_json(400, &json!({ "error": "invalid_redirect_uri" }));
    let ex = service(&transport).perform_registration_request(request()).await.unwrap_err();
    assert_eq!(ex, registration_errors::INVALID_REDIRECT_URI);

    transport.respond_json(201, &json!({ "client_secret": "shh" }));
    let ex = service(&transport).perform_registration_request(request()).await.unwrap_err();
    assert_eq!(ex, general_errors::INVALID_REGISTRATION_RESPONSE);
}
