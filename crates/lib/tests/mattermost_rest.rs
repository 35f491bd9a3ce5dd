//! Mattermost REST calls (identity, posting, logout) against a local mock server.

use bridge::config::MattermostConfig;
use bridge::transport::{ChatTransport, MattermostTransport, TransportError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "bot-token";

fn transport(server: &MockServer) -> MattermostTransport {
    let config = MattermostConfig {
        url: "127.0.0.1".to_string(),
        port: server.address().port(),
        scheme: "http".to_string(),
        token: None,
    };
    MattermostTransport::new(&config, TOKEN)
}

#[tokio::test]
async fn create_post_sends_channel_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/posts"))
        .and(header("Authorization", "Bearer bot-token"))
        .and(body_json(json!({ "channel_id": "C1", "message": "hi" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "P1" })))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).create_post("C1", "hi").await.unwrap();
}

#[tokio::test]
async fn rejected_post_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/posts"))
        .respond_with(ResponseTemplate::new(403).set_body_string("no permission"))
        .mount(&server)
        .await;

    let err = transport(&server).create_post("C1", "hi").await.unwrap_err();
    assert!(matches!(err, TransportError::Api(ref m) if m.contains("403")), "{}", err);
}

#[tokio::test]
async fn bad_token_fails_the_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let err = match transport(&server).connect().await {
        Ok(_) => panic!("connect should fail with a rejected token"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("users/me"), "{}", err);
}

#[tokio::test]
async fn logout_posts_to_users_logout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/users/logout"))
        .and(header("Authorization", "Bearer bot-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK" })))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).logout().await.unwrap();
}
