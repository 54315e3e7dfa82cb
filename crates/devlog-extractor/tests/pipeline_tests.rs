//! Pipeline Integration Tests
//!
//! The model-backed cases talk to a minimal HTTP stub bound to a random
//! local port, so no Ollama install is needed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use devlog_core::{AppConfig, DevlogError, ExtractorKind, LlmConfig};
use devlog_extractor::{
    Extractor, ExtractionOptions, GenerationBackend, ModelExtractor, OllamaClient, Pipeline,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const SESSION: &str = r#"
This is a test session.
We fixed a bug in ManageColumnsModal.
The issue was related to useSortable hook.
Also changed nginx.conf settings.

- ManageColumnsModal -> useSortable (uses)
- nginx -> nginx.conf (configures)
"#;

// =============================================================================
// Stub Ollama server
// =============================================================================

type RequestLog = Arc<Mutex<Vec<String>>>;

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

/// Serve `/api/tags` and `/api/generate`; returns the base URL
async fn serve_stub(generate_status: u16, generate_reply: &'static str) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let server_log = log.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let log = server_log.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request.clone());

                let (status, body) = if request.starts_with("GET /api/tags") {
                    (200, r#"{"models":[{"name":"llama3.2:3b"}]}"#.to_string())
                } else if request.starts_with("POST /api/generate") {
                    let body = serde_json::json!({
                        "model": "llama3.2:3b",
                        "response": generate_reply,
                        "done": true
                    });
                    (generate_status, body.to_string())
                } else {
                    (404, "{}".to_string())
                };

                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), log)
}

fn model_config(url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.extraction.enabled = true;
    config.extraction.primary_extractor = ExtractorKind::Model;
    config.llm = LlmConfig {
        ollama_url: url.to_string(),
        probe_timeout_ms: 500,
        timeout_secs: 10,
        ..Default::default()
    };
    config
}

// =============================================================================
// Pattern-only
// =============================================================================

#[tokio::test]
async fn test_end_to_end_pattern_only() {
    let pipeline = Pipeline::new();
    let result = pipeline.run(SESSION).await;

    for name in ["managecolumnsmodal", "usesortable", "nginx"] {
        let entity = result
            .entity(name)
            .unwrap_or_else(|| panic!("missing entity {name}"));
        assert_eq!(entity.confidence, 0.8);
        assert_eq!(entity.source, "pattern");
        assert_eq!(entity.entity_type, "component");
    }

    assert_eq!(result.relationships.len(), 2);
    let types: Vec<_> = result
        .relationships
        .iter()
        .map(|r| r.relationship_type.as_str())
        .collect();
    assert_eq!(types, vec!["uses", "configures"]);
    assert_eq!(result.extractor, "pattern");
}

#[tokio::test]
async fn test_entities_unique_and_lowercase() {
    let result = Pipeline::new().run(SESSION).await;

    let mut names: Vec<_> = result.entities.iter().map(|e| e.name.clone()).collect();
    for name in &names {
        assert_eq!(name, &name.to_lowercase());
    }
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
}

#[tokio::test]
async fn test_concurrent_runs_agree() {
    let pipeline = Arc::new(Pipeline::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(SESSION).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    for result in &results[1..] {
        assert_eq!(result.entities, results[0].entities);
        assert_eq!(result.relationships, results[0].relationships);
    }
}

#[tokio::test]
async fn test_log_entry_from_run() {
    let result = Pipeline::new().run(SESSION).await;
    let entry = result.log_entry(Some("sess-42"), SESSION);

    assert_eq!(entry.extractor, "pattern");
    assert_eq!(entry.input_length, SESSION.len());
    assert_eq!(entry.entities_found, result.entities.len());
}

// =============================================================================
// Model-backed
// =============================================================================

#[tokio::test]
async fn test_unreachable_model_degrades_to_patterns() {
    // Nothing listens on port 1
    let config = model_config("http://127.0.0.1:1");
    let pipeline = Pipeline::from_config(&config, ExtractionOptions::default());
    assert_eq!(pipeline.extractor_names(), vec!["pattern", "llm"]);

    let result = pipeline.run(SESSION).await;

    assert_eq!(result.extractor, "pattern");
    assert!(result.entity("managecolumnsmodal").is_some());
    assert_eq!(result.relationships.len(), 2);
}

#[tokio::test]
async fn test_model_output_merged_over_patterns() {
    let reply = "```json\n{\"entities\":[{\"name\":\"ManageColumnsModal\",\"type\":\"component\"},{\"name\":[\"Postgres\",\"Redis\"],\"type\":\"technology\"}],\"relationships\":[{\"from\":\"ManageColumnsModal\",\"to\":\"useSortable\",\"type\":\"uses\"}]}\n```";
    let (url, log) = serve_stub(200, reply).await;

    let pipeline = Pipeline::from_config(&model_config(&url), ExtractionOptions::default());
    let result = pipeline.run(SESSION).await;

    assert_eq!(result.extractor, "pattern+llm");

    let modal = result.entity("managecolumnsmodal").unwrap();
    assert_eq!(modal.source, "llm");
    assert_eq!(modal.confidence, 1.0);
    assert_eq!(result.entity("postgres").unwrap().entity_type, "technology");
    assert_eq!(result.entity("usesortable").unwrap().source, "pattern");

    // Two from the pattern lines, one from the model
    assert_eq!(result.relationships.len(), 3);

    let requests = log.lock().unwrap().clone();
    let generate = requests
        .iter()
        .find(|r| r.starts_with("POST /api/generate"))
        .expect("generate request sent");
    assert!(generate.contains(r#""format":"json""#));
    assert!(generate.contains(r#""stream":false"#));
    assert!(generate.contains(r#""model":"llama3.2:3b""#));
}

#[tokio::test]
async fn test_malformed_model_reply_is_parse_error() {
    let (url, _log) = serve_stub(200, "I could not find any entities, sorry!").await;
    let config = model_config(&url);
    let extractor = ModelExtractor::from_config(&config.llm).unwrap();

    let err = extractor
        .extract(SESSION, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        DevlogError::Parse { snippet, .. } => assert!(snippet.contains("could not find")),
        other => panic!("expected parse error, got {other:?}"),
    }

    // The pipeline still returns the pattern result
    let result = Pipeline::from_config(&config, ExtractionOptions::default())
        .run(SESSION)
        .await;
    assert_eq!(result.extractor, "pattern");
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let (url, _log) = serve_stub(500, "").await;
    let extractor = ModelExtractor::from_config(&model_config(&url).llm).unwrap();

    let err = extractor
        .extract(SESSION, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DevlogError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_ollama_client_lists_models() {
    let (url, _log) = serve_stub(200, "{}").await;
    let client =
        OllamaClient::new(&url, Duration::from_millis(500), Duration::from_secs(5)).unwrap();

    let models = client.list_models().await.unwrap();
    assert_eq!(models, vec!["llama3.2:3b".to_string()]);
}

#[tokio::test]
async fn test_cancelled_run_still_returns_patterns() {
    let (url, _log) = serve_stub(200, "{}").await;
    let pipeline = Pipeline::from_config(&model_config(&url), ExtractionOptions::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = pipeline.run_with_cancellation(SESSION, &cancel).await;
    assert_eq!(result.extractor, "pattern");
    assert_eq!(result.relationships.len(), 2);
}
