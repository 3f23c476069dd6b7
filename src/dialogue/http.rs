//! HTTP 对话服务客户端
//!
//! 通过 reqwest 调用 `{base_url}/session` 与 `{base_url}/session/{id}/turns`；
//! 非 2xx 状态码按 ServiceError::from_status 分类（429 / 5xx / 其它）。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::ServiceError;
use crate::dialogue::{DialogueService, SessionCreated, SessionRequest, TurnReply, TurnRequest};

pub struct HttpDialogueService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDialogueService {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self) -> String {
        format!("{}/session", self.base_url)
    }

    fn turns_url(&self, session_id: &str) -> String {
        format!("{}/session/{}/turns", self.base_url, session_id)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else if err.is_decode() {
        ServiceError::Decode(err.to_string())
    } else {
        ServiceError::Transport(err.to_string())
    }
}

#[async_trait]
impl DialogueService for HttpDialogueService {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionCreated, ServiceError> {
        let created: SessionCreated = self.post_json(&self.session_url(), request).await?;
        if created.session_id.trim().is_empty() {
            return Err(ServiceError::Decode("Missing sessionId in response".to_string()));
        }
        Ok(created)
    }

    async fn send_turn(&self, session_id: &str, request: &TurnRequest) -> Result<TurnReply, ServiceError> {
        self.post_json(&self.turns_url(session_id), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn turns_server(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/turns"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn turn_request() -> TurnRequest {
        TurnRequest {
            message: "Hello".into(),
            locale: None,
            allow_auto_end: true,
        }
    }

    fn session_request() -> SessionRequest {
        SessionRequest {
            scenario_id: "outside-bar-girl".into(),
            persona_id: "friend-girl-01".into(),
            locale: "en".into(),
            allow_auto_end: true,
            scenario: None,
            persona: None,
        }
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let service = HttpDialogueService::new("http://localhost:3000/api/ai-scenarios/");
        assert_eq!(service.session_url(), "http://localhost:3000/api/ai-scenarios/session");
        assert_eq!(
            service.turns_url("abc"),
            "http://localhost:3000/api/ai-scenarios/session/abc/turns"
        );
    }

    #[tokio::test]
    async fn test_send_turn_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/turns"))
            .and(body_partial_json(json!({"message": "Hello", "allowAutoEnd": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reply": "Hi",
                "conversationComplete": false,
                "completionReason": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDialogueService::new(&server.uri());
        let reply = service.send_turn("s-1", &turn_request()).await.unwrap();
        assert_eq!(reply, TurnReply::new("Hi"));
    }

    #[tokio::test]
    async fn test_npc_reply_alias_with_completion() {
        let server = turns_server(
            200,
            json!({
                "npcReply": "See you",
                "conversationComplete": true,
                "conversationCompleteReason": "Natural conclusion"
            }),
        )
        .await;
        let service = HttpDialogueService::new(&server.uri());
        let reply = service.send_turn("s-1", &turn_request()).await.unwrap();
        assert_eq!(reply, TurnReply::completing("See you", Some("Natural conclusion")));
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let server = turns_server(429, json!({"error": "slow down"})).await;
        let service = HttpDialogueService::new(&server.uri());
        let err = service.send_turn("s-1", &turn_request()).await.unwrap_err();
        assert_eq!(err, ServiceError::RateLimited);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = turns_server(500, json!({"error": "Server error"})).await;
        let service = HttpDialogueService::new(&server.uri());
        let err = service.send_turn("s-1", &turn_request()).await.unwrap_err();
        assert_eq!(err, ServiceError::Server { status: 500 });
    }

    #[tokio::test]
    async fn test_not_found_is_rejected() {
        let server = turns_server(404, json!({"error": "Session not found"})).await;
        let service = HttpDialogueService::new(&server.uri());
        let err = service.send_turn("s-1", &turn_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_create_session_posts_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "scenarioId": "outside-bar-girl",
                "personaId": "friend-girl-01",
                "locale": "en"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": "s-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDialogueService::new(&server.uri());
        let created = service.create_session(&session_request()).await.unwrap();
        assert_eq!(created.session_id, "s-1");
    }

    #[tokio::test]
    async fn test_missing_session_id_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": ""})))
            .mount(&server)
            .await;

        let service = HttpDialogueService::new(&server.uri());
        let err = service.create_session(&session_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }
}
