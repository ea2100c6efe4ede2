use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue},
    response::Response,
    Extension,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    middleware::RequestId,
    models::PreferenceRequest,
    services::PipelineOutcome,
};

/// Chunks buffered between the pipeline task and the response body
const BODY_BUFFER: usize = 16;

/// Parses the request body; an empty body means "no preferences"
pub fn parse_preferences(body: &[u8]) -> AppResult<PreferenceRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PreferenceRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid request body: {}", e)))
}

/// Handler for the streamed recommendations endpoint
///
/// Everything that can fail with a structured error happens before the
/// response is returned. The pipeline then runs on its own task, and
/// dropping the body cancels it.
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> AppResult<Response> {
    let request = parse_preferences(&body)?;
    let pipeline = state.pipeline()?;

    tracing::info!(
        request_id = %request_id,
        media_type = %request.media_type,
        region = %request.region(),
        providers = request.provider_ids.len(),
        genres = request.genres.len(),
        seen = request.liked.len() + request.disliked.len(),
        "Processing recommendation request"
    );

    let (tx, rx) = mpsc::channel(BODY_BUFFER);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    tokio::spawn(async move {
        match pipeline.execute(request, tx, cancel).await {
            Ok(PipelineOutcome::Completed { found, picks }) => {
                tracing::info!(request_id = %request_id, found, picks, "Recommendation stream completed");
            }
            Ok(PipelineOutcome::Abandoned) => {
                tracing::info!(request_id = %request_id, "Recommendation stream abandoned");
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Recommendation stream failed");
            }
        }
    });

    // The guard lives inside the body stream, so dropping the body cancels the run.
    let stream = ReceiverStream::new(rx).map(move |chunk| {
        let _ = &guard;
        chunk
    });

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;

    #[test]
    fn test_empty_body_is_default_request() {
        let request = parse_preferences(b"").unwrap();
        assert_eq!(request.media_type, MediaType::Movie);
        assert_eq!(request.region(), "US");

        assert!(parse_preferences(b"  \n").is_ok());
    }

    #[test]
    fn test_camel_case_body() {
        let request = parse_preferences(
            br#"{"mediaType":"tv","providerIds":[8,337],"region":"gb","liked":["Dark"]}"#,
        )
        .unwrap();
        assert_eq!(request.media_type, MediaType::Tv);
        assert_eq!(request.provider_ids, vec![8, 337]);
        assert_eq!(request.region(), "GB");
        assert_eq!(request.seen_titles(), vec!["dark".to_string()]);
    }

    #[test]
    fn test_malformed_body_is_invalid_input() {
        assert!(matches!(
            parse_preferences(b"{not json"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_preferences(br#"{"mediaType":"podcast"}"#),
            Err(AppError::InvalidInput(_))
        ));
    }
}
