//! HTTP surface.
//!
//! Three routes: POST /search (the full retrieve + rerank pipeline),
//! POST /embeddings (raw embedding passthrough) and GET /talents
//! (paginated profile listing). The pipeline itself is blocking, so
//! handlers hop onto the blocking pool with `block_in_place`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    error::CoreError,
    profile::Profile,
    provider::EmbeddingProvider,
    search::{RelevanceFilter, SimilaritySearcher},
    store::Store,
};

const NO_PROFILES_ANSWER: &str = "No profiles found—try broadening your query.";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub searcher: Arc<SimilaritySearcher>,
    pub relevance: Arc<RelevanceFilter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/embeddings", post(embeddings))
        .route("/talents", get(talents))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn serve(state: AppState, listen: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run the HTTP server on its own multi-thread runtime until SIGINT or
/// SIGTERM.
pub fn start_daemon(state: AppState, listen: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { serve(state, listen).await })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// Wraps `CoreError` so axum knows how to render it.
#[derive(Debug)]
struct HttpError(CoreError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            CoreError::InvalidInput(_) => axum::http::StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            CoreError::Provider(_) => {
                log::error!("{:?}", self.0);
                axum::http::StatusCode::BAD_GATEWAY
            }
            CoreError::Parse(_) | CoreError::Store(_) => {
                log::error!("{:?}", self.0);
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, json!({ "error": self.0.to_string() }).to_string()).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<CoreError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,

    /// Optional restriction to a caller-supplied talent id set (e.g.
    /// the members of one organisation).
    #[serde(default)]
    candidate_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SearchResponse {
    Ids { ids: Vec<i64> },
    Answer { answer: String },
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    if payload.query.trim().is_empty() {
        return Err(HttpError(CoreError::InvalidInput(
            "query must not be blank".to_string(),
        )));
    }

    tokio::task::block_in_place(move || {
        let hits = match state
            .searcher
            .search(&payload.query, payload.candidate_ids.as_deref())
        {
            Ok(hits) => hits,
            // search is best-effort: an unreachable store degrades to
            // "no matches", not a 5xx
            Err(CoreError::Store(err)) => {
                log::error!("similarity search store failure: {err}");
                vec![]
            }
            Err(err) => return Err(HttpError(err)),
        };

        if hits.is_empty() {
            return Ok(Json(SearchResponse::Answer {
                answer: NO_PROFILES_ANSWER.to_string(),
            }));
        }

        let ids = state.relevance.filter(&payload.query, &hits);
        Ok(Json(SearchResponse::Ids { ids }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextInput {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingsRequest {
    text: Option<TextInput>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EmbeddingsRequest>,
) -> Result<Json<EmbeddingsResponse>, HttpError> {
    let inputs = match payload.text {
        Some(TextInput::One(text)) if !text.trim().is_empty() => vec![text],
        Some(TextInput::Many(texts)) if !texts.is_empty() => texts,
        _ => {
            return Err(HttpError(CoreError::InvalidInput(
                "missing `text`".to_string(),
            )))
        }
    };

    tokio::task::block_in_place(move || {
        let embeddings = state.embedder.embed_batch(&inputs)?;
        Ok(Json(EmbeddingsResponse { embeddings }))
    })
}

fn default_page() -> u32 {
    1
}
fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct TalentsQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(rename = "pageSize", default = "default_page_size")]
    page_size: u32,
}

#[derive(Debug, Serialize)]
struct TalentsResponse {
    data: Vec<Profile>,
    count: i64,
}

async fn talents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TalentsQuery>,
) -> Result<Json<TalentsResponse>, HttpError> {
    // listing is authoritative: store failures propagate as 500
    tokio::task::block_in_place(move || {
        let data = state.store.list_profiles(params.page, params.page_size)?;
        let count = state.store.count_profiles()?;
        Ok(Json(TalentsResponse { data, count }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{StubChat, StubEmbedder};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(chat_reply: &str) -> (Router, Arc<Store>, Arc<StubEmbedder>) {
        let store = Arc::new(Store::open_in_memory(3).unwrap());
        let embedder = Arc::new(StubEmbedder::new(3));
        let searcher = Arc::new(SimilaritySearcher::new(
            store.clone(),
            embedder.clone(),
            10,
            0.5,
        ));
        let relevance = Arc::new(RelevanceFilter::new(Arc::new(StubChat::replying(
            chat_reply,
        ))));
        let state = AppState {
            store: store.clone(),
            embedder: embedder.clone(),
            searcher,
            relevance,
        };
        (router(state), store, embedder)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blank_query_is_rejected() {
        let (app, _, _) = app("[]");
        let response = app
            .oneshot(post_json("/search", json!({ "query": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_matches_yields_canned_answer() {
        let (app, _, embedder) = app("[]");
        embedder.map("nothing here", vec![1.0, 0.0, 0.0]);

        let response = app
            .oneshot(post_json("/search", json!({ "query": "nothing here" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["answer"], NO_PROFILES_ANSWER);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn search_returns_filtered_ids() {
        let (app, store, embedder) = app("```json\n[1]\n```");
        store.upsert_document(1, "rust engineer").unwrap();
        store.upsert_vector(1, &[1.0, 0.0, 0.0]).unwrap();
        store.upsert_document(2, "pastry chef").unwrap();
        store.upsert_vector(2, &[0.9, 0.1, 0.0]).unwrap();
        embedder.map("rust", vec![1.0, 0.0, 0.0]);

        let response = app
            .oneshot(post_json("/search", json!({ "query": "rust" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ids"], json!([1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gibberish_model_output_fails_open() {
        let (app, store, embedder) = app("happy to help! candidates 1 and 2 look strong");
        for id in [1, 2] {
            store.upsert_document(id, "summary").unwrap();
            store.upsert_vector(id, &[1.0, 0.0, 0.0]).unwrap();
        }
        embedder.map("q", vec![1.0, 0.0, 0.0]);

        let response = app
            .oneshot(post_json("/search", json!({ "query": "q" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ids"], json!([1, 2]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn candidate_ids_restrict_search() {
        let (app, store, embedder) = app("[2]");
        for id in [1, 2] {
            store.upsert_document(id, "summary").unwrap();
            store.upsert_vector(id, &[1.0, 0.0, 0.0]).unwrap();
        }
        embedder.map("q", vec![1.0, 0.0, 0.0]);

        let response = app
            .oneshot(post_json(
                "/search",
                json!({ "query": "q", "candidate_ids": [2] }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["ids"], json!([2]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embedding_provider_failure_is_bad_gateway() {
        let (app, _, embedder) = app("[]");
        embedder.fail_on("q");

        let response = app
            .oneshot(post_json("/search", json!({ "query": "q" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embeddings_requires_text() {
        let (app, _, _) = app("[]");
        let response = app
            .oneshot(post_json("/embeddings", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embeddings_rejects_blank_string_and_empty_list() {
        let (app, _, _) = app("[]");
        let response = app
            .clone()
            .oneshot(post_json("/embeddings", json!({ "text": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json("/embeddings", json!({ "text": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embeddings_returns_one_vector_per_input() {
        let (app, _, _) = app("[]");
        let response = app
            .oneshot(post_json("/embeddings", json!({ "text": ["a", "b"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["embeddings"].as_array().unwrap().len(), 2);
        assert_eq!(body["embeddings"][0].as_array().unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embeddings_is_post_only() {
        let (app, _, _) = app("[]");
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/embeddings")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn talents_lists_with_count() {
        let (app, store, _) = app("[]");
        for (id, name) in [(1, "Ann Able"), (2, "Bob Baker"), (3, "Cara Cole")] {
            store
                .seed_profile(&crate::profile::Profile::bare(id, name))
                .unwrap();
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/talents?page=1&pageSize=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["name"], "Ann Able");
    }
}
