use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json,
};

use crate::{BearerToken, ErrorBody, Router, SearchParams, ServerContext, ServerError, ServerResult};

/// Searches tracks with the caller's token, handing the answer on as it is
#[utoipa::path(
    get,
    path = "/search",
    params(SearchParams),
    responses(
        (status = 200, description = "The streaming service's search results"),
        (status = 400, description = "Query missing", body = ErrorBody),
        (status = 401, description = "Access token missing", body = ErrorBody)
    ),
    security(("BearerAuth" = []))
)]
pub async fn search(
    State(context): State<ServerContext>,
    BearerToken(token): BearerToken,
    Query(params): Query<SearchParams>,
) -> ServerResult<Response> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing q".to_string()))?;

    let result = context.streaming.search(&token, &query).await?;
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::BAD_GATEWAY);

    Ok((status, Json(result.body)).into_response())
}

pub fn router() -> Router {
    Router::new().route("/search", get(search))
}
