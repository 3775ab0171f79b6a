//! Contract tests for the Azure completion and translation clients
//!
//! A local wiremock server stands in for the Azure endpoints; no API keys or
//! network access are needed.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voicebot::completion::{AzureOpenAiClient, CompletionClient, CompletionError};
use voicebot::history::Message;
use voicebot::settings::{CompletionSettings, TranslationSettings};
use voicebot::translation::{AzureTranslator, TranslationError, Translator};

const CHAT_PATH: &str = "/openai/deployments/gpt-4o-mini/chat/completions";

fn completion_client(server: &MockServer, timeout: Duration) -> AzureOpenAiClient {
    let settings = CompletionSettings {
        endpoint: server.uri(),
        ..CompletionSettings::default()
    };
    AzureOpenAiClient::new(&settings, "test-completion-key".into(), timeout).unwrap()
}

fn translator(server: &MockServer) -> AzureTranslator {
    let settings = TranslationSettings {
        endpoint: server.uri(),
        ..TranslationSettings::default()
    };
    AzureTranslator::new(&settings, "test-translator-key".into(), Duration::from_secs(5)).unwrap()
}

fn history() -> Vec<Message> {
    vec![
        Message::system("You are a helpful telecom assistant."),
        Message::user("What packages do you have?"),
    ]
}

fn chat_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"},
            {"index": 1, "message": {"role": "assistant", "content": "second choice"}, "finish_reason": "stop"}
        ]
    })
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn completion_sends_history_and_returns_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(query_param("api-version", "2024-08-01-preview"))
        .and(header("api-key", "test-completion-key"))
        .and(body_partial_json(json!({
            "max_tokens": 100,
            "top_p": 1.0,
            "messages": [
                {"role": "system", "content": "You are a helpful telecom assistant."},
                {"role": "user", "content": "What packages do you have?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("We have three data packages.")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap();
    assert_eq!(reply, "We have three data packages.");
}

#[tokio::test]
async fn completion_unauthorized_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"code": "401", "message": "Access denied due to invalid subscription key."}})),
        )
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CompletionError::Auth("Access denied due to invalid subscription key.".into())
    );
}

#[tokio::test]
async fn completion_throttled_is_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap_err();
    assert_eq!(err, CompletionError::RateLimited);
}

#[tokio::test]
async fn completion_server_error_is_network_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap_err();
    assert_eq!(err, CompletionError::Network("HTTP 500: boom".into()));
}

#[tokio::test]
async fn completion_without_choices_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::Malformed(_)));
}

#[tokio::test]
async fn completion_garbage_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&history())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::Malformed(_)));
}

#[tokio::test]
async fn completion_slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_response("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_millis(200))
        .complete(&history())
        .await
        .unwrap_err();
    assert_eq!(err, CompletionError::Timeout);
}

#[tokio::test]
async fn completion_rejects_history_without_persona_before_sending() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let err = completion_client(&server, Duration::from_secs(5))
        .complete(&[Message::user("hello")])
        .await
        .unwrap_err();
    assert_eq!(err, CompletionError::InvalidHistory);
}

// ============================================================================
// Translation
// ============================================================================

#[tokio::test]
async fn translation_sends_expected_request_and_joins_fragments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(query_param("api-version", "3.0"))
        .and(query_param("from", "en"))
        .and(query_param("to", "si"))
        .and(header("Ocp-Apim-Subscription-Key", "test-translator-key"))
        .and(header("Ocp-Apim-Subscription-Region", "westus2"))
        .and(header_exists("X-ClientTraceId"))
        .and(body_json(json!([{"text": "Hello there"}])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"translations": [{"text": "ආයුබෝවන්", "to": "si"}, {"text": "හිතවත", "to": "si"}]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let text = translator(&server)
        .translate("Hello there", "en", "si")
        .await
        .unwrap();
    assert_eq!(text, "ආයුබෝවන් හිතවත");
}

#[tokio::test]
async fn translation_unauthorized_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"code": 401000, "message": "The request is not authorized."}})),
        )
        .mount(&server)
        .await;

    let err = translator(&server)
        .translate("Hello", "en", "si")
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::Auth("The request is not authorized.".into()));
}

#[tokio::test]
async fn translation_with_no_fragments_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = translator(&server)
        .translate("Hello", "en", "si")
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::Malformed(_)));
}

#[tokio::test]
async fn blank_text_is_not_sent_for_translation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = translator(&server).translate("   ", "en", "si").await.unwrap_err();
    assert_eq!(err, TranslationError::EmptyInput);
}
