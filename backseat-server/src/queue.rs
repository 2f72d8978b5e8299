use axum::{extract::State, http::StatusCode, routing::post};
use log::debug;

use crate::{BearerToken, ErrorBody, QueueSchema, Router, ServerContext, ServerResult, ValidatedJson};

/// Adds a track to the playback queue of the account the token belongs to
#[utoipa::path(
    post,
    path = "/queue",
    request_body = QueueSchema,
    responses(
        (status = 204, description = "Track queued"),
        (status = 400, description = "Uri missing", body = ErrorBody),
        (status = 401, description = "Access token missing", body = ErrorBody),
        (status = 404, description = "No active device", body = ErrorBody)
    ),
    security(("BearerAuth" = []))
)]
pub async fn queue(
    State(context): State<ServerContext>,
    BearerToken(token): BearerToken,
    ValidatedJson(body): ValidatedJson<QueueSchema>,
) -> ServerResult<StatusCode> {
    context.streaming.add_to_queue(&token, &body.uri).await?;
    debug!("Queued {}", body.uri);

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new().route("/queue", post(queue))
}
