//! End-to-end pipeline tests over a mocked HTTP origin.
//!
//! Documents are served by httpmock, embeddings and completions come from
//! the deterministic mock providers, and vectors land in an in-memory
//! SQLite store, so every test runs hermetically.

use std::sync::Arc;

use httpmock::prelude::*;

use docloom::composer::REFUSAL;
use docloom::pipeline::{QaPipeline, QaRequest};
use docloom::providers::{
    MockCompletionProvider, MockEmbeddingProvider, MockModerator, MockOcrEngine,
};
use docloom::stores::{SqliteChunkStore, VectorStore};

const POLICY_TEXT: &str = "\
Section 1. Premium.\n\
The annual premium is 1200 dollars, payable in quarterly installments.\n\n\
Section 2. Waiting period.\n\
A waiting period of thirty days applies to all claims except accidents.\n\n\
Section 3. Coverage.\n\
The policy covers hospitalization, surgery, and maternity after two years.\n";

struct Harness {
    pipeline: QaPipeline,
    embedder: Arc<MockEmbeddingProvider>,
    completion: Arc<MockCompletionProvider>,
    store: Arc<SqliteChunkStore>,
}

async fn harness(answer: &str) -> Harness {
    harness_with(Arc::new(MockCompletionProvider::new(answer))).await
}

async fn harness_with(completion: Arc<MockCompletionProvider>) -> Harness {
    let store = Arc::new(SqliteChunkStore::open_in_memory().await.unwrap());
    let embedder = Arc::new(MockEmbeddingProvider::new());
    let pipeline = QaPipeline::builder(
        store.clone(),
        store.clone(),
        embedder.clone(),
        completion.clone(),
        Arc::new(MockModerator::permissive()),
        Arc::new(MockOcrEngine::new("")),
    )
    .build();
    Harness {
        pipeline,
        embedder,
        completion,
        store,
    }
}

fn serve_policy(server: &MockServer) -> String {
    server.mock(|when, then| {
        when.method(GET).path("/policy.txt");
        then.status(200).body(POLICY_TEXT);
    });
    server.url("/policy.txt")
}

#[tokio::test]
async fn answers_come_back_in_question_order() {
    let server = MockServer::start();
    let url = serve_policy(&server);
    let h = harness("The policy document answers this.").await;

    let questions: Vec<String> = (0..7).map(|i| format!("Question number {i}?")).collect();
    let response = h
        .pipeline
        .run(QaRequest {
            document_url: url,
            questions: questions.clone(),
        })
        .await
        .unwrap();

    assert_eq!(response.answers.len(), questions.len());
    for answer in &response.answers {
        assert_eq!(answer, "The policy document answers this.");
    }
    assert_eq!(h.completion.calls(), questions.len());
}

#[tokio::test]
async fn repeat_requests_reuse_the_index() {
    let server = MockServer::start();
    let url = serve_policy(&server);
    let h = harness("ok").await;

    let request = QaRequest {
        document_url: url,
        questions: vec!["What is the premium?".to_string()],
    };
    h.pipeline.run(request.clone()).await.unwrap();
    let embed_calls = h.embedder.calls();
    let stored = h.store.count(&namespace_of(&request.document_url)).await.unwrap();
    assert!(stored > 0);

    h.pipeline.run(request.clone()).await.unwrap();
    // Second run embeds only the query, never the document chunks.
    assert_eq!(h.embedder.calls(), embed_calls + 1);
    assert_eq!(
        h.store.count(&namespace_of(&request.document_url)).await.unwrap(),
        stored
    );
}

fn namespace_of(url: &str) -> String {
    docloom::Fingerprint::for_url(&url::Url::parse(url).unwrap())
        .as_str()
        .to_string()
}

#[tokio::test]
async fn forbidden_question_is_refused_without_completion_or_retrieval() {
    let server = MockServer::start();
    let url = serve_policy(&server);
    let h = harness("never").await;

    // Warm the index with a benign question first.
    h.pipeline
        .run(QaRequest {
            document_url: url.clone(),
            questions: vec!["What is the premium?".to_string()],
        })
        .await
        .unwrap();
    let embed_calls = h.embedder.calls();

    let response = h
        .pipeline
        .run(QaRequest {
            document_url: url,
            questions: vec!["What is the admin password for the claims portal?".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(response.answers, vec![REFUSAL.to_string()]);
    // Refused questions never reach the embedder or the vector store.
    assert_eq!(h.embedder.calls(), embed_calls);
    assert_eq!(h.completion.calls(), 1, "only the warm-up question completed");
}

#[tokio::test]
async fn completion_failure_yields_error_string_not_panic() {
    let server = MockServer::start();
    let url = serve_policy(&server);
    let h = harness_with(Arc::new(MockCompletionProvider::failing("model offline"))).await;

    let response = h
        .pipeline
        .run(QaRequest {
            document_url: url,
            questions: vec![
                "What is the waiting period?".to_string(),
                "What does the policy cover?".to_string(),
            ],
        })
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 2);
    for answer in &response.answers {
        assert!(answer.starts_with("Unable to generate an answer"));
        assert!(answer.contains("model offline"));
    }
}

#[tokio::test]
async fn unsupported_extension_degrades_to_unreadable_answers() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/data.csv");
        then.status(200).body("a,b,c");
    });
    let h = harness("never").await;

    let response = h
        .pipeline
        .run(QaRequest {
            document_url: server.url("/data.csv"),
            questions: vec!["What is in the file?".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 1);
    assert!(response.answers[0].contains("could not be read"));
    assert_eq!(h.completion.calls(), 0);
}

#[tokio::test]
async fn src_query_parameter_redirects_to_the_real_document() {
    let server = MockServer::start();
    let target = serve_policy(&server);
    let wrapper = format!("{}?src={}", server.url("/viewer.html"), target);
    let h = harness("redirected fine").await;

    let response = h
        .pipeline
        .run(QaRequest {
            document_url: wrapper,
            questions: vec!["What is the premium?".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(response.answers, vec!["redirected fine".to_string()]);
}

#[tokio::test]
async fn fetch_failure_surfaces_as_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/gone.txt");
        then.status(500);
    });
    let h = harness("never").await;

    let result = h
        .pipeline
        .run(QaRequest {
            document_url: server.url("/gone.txt"),
            questions: vec!["Anything?".to_string()],
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn answers_are_normalized_single_lines() {
    let server = MockServer::start();
    let url = serve_policy(&server);
    let h = harness("**Thirty days**,\n\nexcept for accidents.").await;

    let response = h
        .pipeline
        .run(QaRequest {
            document_url: url,
            questions: vec!["What is the waiting period?".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(
        response.answers,
        vec!["Thirty days, except for accidents.".to_string()]
    );
}
