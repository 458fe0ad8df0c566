use crate::{
    error::AppError,
    handlers::AppState,
    store::{QueryOutcome, TimeRange},
};
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Query string of `/data`; epoch seconds, `until` exclusive
#[derive(Debug, Default, Deserialize)]
pub struct DataParams {
    pub from: Option<i64>,
    pub until: Option<i64>,
}

impl DataParams {
    /// Missing `from` means the last `default_window_secs`; missing `until` is open ended.
    pub fn resolve(&self, now: i64, default_window_secs: i64) -> TimeRange {
        TimeRange::new(
            self.from.unwrap_or(now - default_window_secs),
            self.until.unwrap_or(0),
        )
    }
}

/// Handle GET /data
///
/// Streams the matching rows as one JSON array in fixed-size chunks. The
/// store lock is held until the body finishes or the client goes away.
pub async fn handle_data(
    State(state): State<AppState>,
    params: Result<Query<DataParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let range = params.resolve(chrono::Utc::now().timestamp(), state.query.default_window_secs);
    tracing::debug!(from = range.from, until = range.until, "History query");

    let response = match state.logger.store().query(range).await? {
        QueryOutcome::Empty => ([(header::CONTENT_TYPE, "application/json")], "[]").into_response(),
        QueryOutcome::Streaming(cursor) => {
            let stream = cursor
                .with_padding(state.query.pad_chunks)
                .into_stream(state.query.chunk_size);
            (
                [(header::CONTENT_TYPE, "application/json")],
                Body::from_stream(stream),
            )
                .into_response()
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_to_recent_window() {
        let range = DataParams::default().resolve(10_000, 3600);
        assert_eq!(range, TimeRange::new(6_400, 0));
    }

    #[test]
    fn test_resolve_explicit_zero_means_everything() {
        let params = DataParams { from: Some(0), until: Some(150) };
        assert_eq!(params.resolve(10_000, 3600), TimeRange::new(0, 150));
    }
}
