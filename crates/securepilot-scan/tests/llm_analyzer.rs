use securepilot_core::{AnalysisError, LlmConfig};
use securepilot_scan::analyzer::{Analyzer, LlmAnalyzer};
use securepilot_scan::llm::LlmClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn analyzer(server: &MockServer) -> LlmAnalyzer {
    let config = LlmConfig {
        api_key: Some("sk-test".into()),
        base_url: Some(server.uri()),
        model: "test-model".into(),
        ..LlmConfig::default()
    };
    LlmAnalyzer::new(LlmClient::new(&config).unwrap())
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn returns_normalized_issues() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"issues":[{"severity":"high","line":3,"description":"SQL built from request.args"}]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let issues = analyzer(&server)
        .analyze("app/db.py", "+q = \"SELECT * FROM t WHERE id=\" + request.args['id']\n")
        .await
        .unwrap();

    assert_eq!(issues, vec!["[high] line 3: SQL built from request.args"]);
    assert_eq!(analyzer(&server).model(), "test-model");
}

#[tokio::test]
async fn clean_chunk_has_no_issues() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"issues":[]}"#)))
        .mount(&server)
        .await;

    let issues = analyzer(&server).analyze("a.py", "+x = 1\n").await.unwrap();
    assert!(issues.is_empty());
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    for status in [429, 500, 503] {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = analyzer(&server).analyze("a.py", "+x\n").await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::Unavailable(_)),
            "status {status}: {err:?}"
        );
    }
}

#[tokio::test]
async fn client_errors_are_refused() {
    for status in [400, 401, 413, 422] {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("bad request"))
            .mount(&server)
            .await;

        let err = analyzer(&server).analyze("a.py", "+x\n").await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::Refused(_)),
            "status {status}: {err:?}"
        );
    }
}

#[tokio::test]
async fn content_filter_is_refused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": null },
                "finish_reason": "content_filter"
            }]
        })))
        .mount(&server)
        .await;

    let err = analyzer(&server).analyze("a.py", "+x\n").await.unwrap_err();
    assert_eq!(err.kind(), "AnalysisRefused");
}

#[tokio::test]
async fn prose_reply_is_refused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("Sorry, I cannot review this.")),
        )
        .mount(&server)
        .await;

    let err = analyzer(&server).analyze("a.py", "+x\n").await.unwrap_err();
    assert_eq!(err.kind(), "AnalysisRefused");
}
