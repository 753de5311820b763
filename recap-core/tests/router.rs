//! Router strategies and batch flow against mock providers.

use std::sync::Arc;

use recap_core::llm::router::RouterBatchRequest;
use recap_core::llm::ChatOptions;
use recap_core::{
    BatchJobStore, LlmRouter, PricingTable, ProviderConfig, SummarizeError, UsageTracker,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"content": content}}],
        "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
    })
}

fn generic_router(server: &MockServer, mode: &str) -> LlmRouter {
    let config = ProviderConfig::from_toml_str(&format!(
        r#"
        [strategy]
        mode = "{mode}"

        [providers.generic]
        api_key = ""
        base_url = "{}/v1"

        [tasks.enrich]
        provider = "generic"
        model = "cheap"
        escalation_model = "strong"
        "#,
        server.uri()
    ))
    .unwrap();
    LlmRouter::new(config, Arc::new(UsageTracker::new(PricingTable::builtin())))
}

#[tokio::test]
async fn adaptive_low_confidence_escalates_with_same_user_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"cheap\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(
            r#"{"answer": "base answer", "confidence": 0.4}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"strong\""))
        .and(body_string_contains("classify these changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(
            r#"{"answer": "escalated answer", "confidence": 0.95}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let router = generic_router(&server, "adaptive");
    let answer = router
        .chat(
            "You are a classifier.",
            "classify these changes",
            "enrich",
            ChatOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(answer, "escalated answer");

    // Both calls were recorded.
    let usages = router.tracker().model_usages();
    let models: Vec<&str> = usages.iter().map(|u| u.model.as_str()).collect();
    assert!(models.contains(&"cheap"), "{models:?}");
    assert!(models.contains(&"strong"), "{models:?}");
}

#[tokio::test]
async fn adaptive_high_confidence_stays_on_base_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"cheap\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(
            r#"{"answer": "confident answer", "confidence": 0.9}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"strong\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let router = generic_router(&server, "adaptive");
    let answer = router
        .chat("sys", "user", "enrich", ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "confident answer");
}

#[tokio::test]
async fn adaptive_malformed_envelope_returns_raw_text_without_escalation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"cheap\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_completion("just plain prose")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"strong\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let router = generic_router(&server, "adaptive");
    let answer = router
        .chat("sys", "user", "enrich", ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "just plain prose");
}

#[tokio::test]
async fn economy_never_escalates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"cheap\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("cheap answer")))
        .expect(1)
        .mount(&server)
        .await;

    let router = generic_router(&server, "economy");
    let answer = router
        .chat("sys", "user", "enrich", ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "cheap answer");
}

#[tokio::test]
async fn premium_goes_straight_to_escalation_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"strong\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("strong answer")))
        .expect(1)
        .mount(&server)
        .await;

    let router = generic_router(&server, "premium");
    let answer = router
        .chat("sys", "user", "enrich", ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "strong answer");
}

#[tokio::test]
async fn standard_escalates_on_structural_failure_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"cheap\""))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "response_format not satisfiable"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"model\":\"strong\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let router = generic_router(&server, "standard");
    let answer = router
        .chat("sys", "user", "enrich", ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "recovered");
}

#[tokio::test]
async fn batch_submission_requires_a_batch_capable_provider() {
    let server = MockServer::start().await;
    let router = generic_router(&server, "fixed");
    let err = router
        .submit_batch(
            vec![RouterBatchRequest {
                custom_id: "enrich-2025-02-16".into(),
                system_prompt: "sys".into(),
                user_content: "user".into(),
                json_mode: true,
                max_tokens: None,
                cache_system_prompt: false,
            }],
            "enrich",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SummarizeError::BatchUnsupported(_)), "{err}");
}

#[tokio::test]
async fn openai_batch_flow_submits_polls_and_collects_results() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_in"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "batch_1", "status": "validating"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/batches/batch_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "batch_1",
            "status": "completed",
            "output_file_id": "file_out"
        })))
        .mount(&server)
        .await;
    let output_lines = [
        json!({
            "custom_id": "daily-2025-02-16",
            "response": {
                "status_code": 200,
                "body": {
                    "choices": [{"message": {"content": "# Summary for 02-16"}}],
                    "usage": {"prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60}
                }
            }
        })
        .to_string(),
        json!({
            "custom_id": "daily-2025-02-17",
            "response": {
                "status_code": 500,
                "body": {"error": {"message": "upstream exploded"}}
            }
        })
        .to_string(),
    ]
    .join("\n");
    Mock::given(method("GET"))
        .and(path("/files/file_out/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string(output_lines))
        .expect(1)
        .mount(&server)
        .await;

    let config = ProviderConfig::from_toml_str(&format!(
        r#"
        [providers.openai]
        api_key = "sk-test"
        base_url = "{}"

        [tasks.daily]
        provider = "openai"
        model = "gpt-4o-mini"
        max_tokens = 1000
        "#,
        server.uri()
    ))
    .unwrap();
    let jobs = Arc::new(BatchJobStore::new(dir.path().join("batch_jobs.json")));
    let router = LlmRouter::new(config, Arc::new(UsageTracker::new(PricingTable::builtin())))
        .with_batch_store(Arc::clone(&jobs));

    let batch_id = router
        .submit_batch(
            vec![
                RouterBatchRequest {
                    custom_id: "daily-2025-02-16".into(),
                    system_prompt: "sys".into(),
                    user_content: "day one".into(),
                    json_mode: false,
                    max_tokens: None,
                    cache_system_prompt: true,
                },
                RouterBatchRequest {
                    custom_id: "daily-2025-02-17".into(),
                    system_prompt: "sys".into(),
                    user_content: "day two".into(),
                    json_mode: false,
                    max_tokens: None,
                    cache_system_prompt: true,
                },
            ],
            "daily",
        )
        .await
        .unwrap();
    assert_eq!(batch_id, "batch_1");
    assert_eq!(jobs.get_job("batch_1").unwrap().unwrap().status, "submitted");

    let results = router.wait_for_batch(&batch_id, "daily", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    let ok = results
        .iter()
        .find(|r| r.custom_id == "daily-2025-02-16")
        .unwrap();
    assert_eq!(ok.content.as_deref(), Some("# Summary for 02-16"));
    let failed = results
        .iter()
        .find(|r| r.custom_id == "daily-2025-02-17")
        .unwrap();
    assert_eq!(failed.error.as_deref(), Some("upstream exploded"));

    // The job record reached a terminal status.
    assert_eq!(jobs.get_job("batch_1").unwrap().unwrap().status, "completed");
    assert!(jobs.active_jobs().unwrap().is_empty());
}

#[tokio::test]
async fn anthropic_wire_format_honours_prefill_and_cache_marker() {
    use recap_core::llm::providers::AnthropicProvider;
    use recap_core::llm::LlmProvider;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(wiremock::matchers::header("anthropic-version", "2023-06-01"))
        .and(wiremock::matchers::header("x-api-key", "sk-ant-test"))
        .and(body_string_contains("cache_control"))
        .and(body_string_contains("ephemeral"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "{\"a\":1}]"}],
            "usage": {
                "input_tokens": 200,
                "output_tokens": 30,
                "cache_read_input_tokens": 150,
                "cache_creation_input_tokens": 50
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("sk-ant-test", Some(&server.uri()));
    let response = provider
        .chat(
            "claude-haiku-4-5",
            "You classify changes.",
            "classify this",
            &ChatOptions {
                json_mode: true,
                max_tokens: Some(512),
                cache_system_prompt: true,
            },
        )
        .await
        .unwrap();

    // The prefilled opening bracket is restored onto the reply.
    assert_eq!(response.text, "[{\"a\":1}]");
    assert_eq!(response.usage.cache_read_tokens, 150);
    assert_eq!(response.usage.cache_write_tokens, 50);
    assert_eq!(response.usage.prompt_tokens, 200);
}
