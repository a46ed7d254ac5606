use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::errors::ApiResult;
use crate::api::types::ApiState;

/// Prometheus scrape endpoint
pub async fn get_metrics(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
