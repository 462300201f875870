use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::error::{Error, Result};
use models::{BlobStore, CoursesResponse, ErrorResponse, SavedResponse, COURSES_KEY};

pub mod models;

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET,PUT,OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
];

/// Shared state of the course map service
pub struct AppState {
    store: Arc<dyn BlobStore>,
    /// Write secret, no secret means every write is refused
    token: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn BlobStore>, token: Option<String>) -> Self {
        let token = token
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());

        Self { store, token }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = self.token.as_deref() else {
            return Err(Error::Unauthorized);
        };

        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

        if token == expected {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(read_courses)
                .put(write_courses)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .with_state(Arc::new(state))
}

/// Run the service until interrupted.
///
/// Writes are last-writer-wins: concurrent PUTs from different
/// installations are not merged and carry no version check.
pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("course map service listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("course map service stopped");
    Ok(())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, CORS_HEADERS, Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        json_response(
            status,
            ErrorResponse {
                error: self.to_string(),
            },
        )
    }
}

async fn read_courses(State(state): State<Arc<AppState>>) -> Response {
    // Anything unreadable is served as an empty map
    let courses = match state.store.get(COURSES_KEY) {
        Ok(Some(courses @ Value::Object(_))) => courses,
        Ok(Some(_)) => {
            tracing::warn!("stored course map is not an object, serving an empty map");
            json!({})
        }
        Ok(None) => json!({}),
        Err(e) => {
            tracing::warn!("failed to read stored course map: {}", e);
            json!({})
        }
    };

    json_response(
        StatusCode::OK,
        CoursesResponse {
            courses,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    )
}

async fn write_courses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    if let Err(e) = state.authorize(&headers) {
        tracing::warn!("rejected course map write: bad token");
        return Err(e);
    }

    let courses = resolve_payload(&body)?;
    state.store.set(COURSES_KEY, &courses)?;

    tracing::info!(
        courses = courses.as_object().map_or(0, serde_json::Map::len),
        "course map replaced"
    );

    Ok(json_response(StatusCode::OK, SavedResponse { saved: true }))
}

async fn preflight() -> Response {
    (StatusCode::OK, CORS_HEADERS).into_response()
}

async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorResponse {
            error: "Method not allowed".into(),
        },
    )
}

/// Accept either `{courses: {...}}` or the raw map
fn resolve_payload(body: &[u8]) -> Result<Value> {
    let body: Value = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedPayload(format!("Invalid JSON body: {e}")))?;

    let wrapped = body.get("courses").filter(|c| !c.is_null()).cloned();
    let courses = wrapped.unwrap_or(body);

    if courses.is_object() {
        Ok(courses)
    } else {
        Err(Error::MalformedPayload(
            "Course map must be a JSON object".into(),
        ))
    }
}

/// Serve on an ephemeral local port, returns the base URL
#[cfg(test)]
pub async fn spawn_local(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    format!("http://{addr}/")
}
