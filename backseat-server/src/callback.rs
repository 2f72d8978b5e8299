use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
};
use backseat_core::{StreamingError, TokenMessage};
use log::{info, warn};

use crate::{CallbackParams, ErrorBody, Router, ServerContext, ServerError, ServerResult};

/// Exchanges the authorization code for tokens, then hands them to the opener window
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackParams),
    responses(
        (status = 200, description = "A page posting the tokens to the app", content_type = "text/html"),
        (status = 400, description = "Code or verifier missing", body = ErrorBody),
        (status = 500, description = "Token exchange failed")
    )
)]
pub async fn callback(
    State(context): State<ServerContext>,
    Query(params): Query<CallbackParams>,
) -> ServerResult<Html<String>> {
    let (code, verifier) = match (params.code, params.state) {
        (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
        _ => {
            return Err(ServerError::BadRequest(
                "Missing code or code_verifier".to_string(),
            ))
        }
    };

    let tokens = context
        .streaming
        .exchange_code(&code, &verifier)
        .await
        .map_err(|e| match e {
            StreamingError::Upstream { status: _, body } => ServerError::TokenExchange { body },
            e => {
                warn!("Token exchange did not complete: {}", e);
                ServerError::Unknown(e.to_string())
            }
        })?;

    info!("Authorization completed, delivering tokens");

    let message = TokenMessage {
        state: verifier,
        tokens,
    };

    Ok(Html(delivery_page(&message, &context.app_origin)?))
}

/// Renders the page that posts the message to the opener, restricted to `origin`, then closes
fn delivery_page(message: &TokenMessage, origin: &str) -> ServerResult<String> {
    let message = script_json(message)?;
    let origin = script_json(&origin)?;

    Ok(format!(
        "<!doctype html>\n<html>\n<body>\n<script>\n  \
         if (window.opener) window.opener.postMessage({message}, {origin});\n  \
         window.close();\n</script>\n</body>\n</html>\n"
    ))
}

/// JSON that is safe to place inside a script element
fn script_json<T: serde::Serialize>(value: &T) -> ServerResult<String> {
    let json = serde_json::to_string(value).map_err(|e| ServerError::Unknown(e.to_string()))?;

    Ok(json
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

pub fn router() -> Router {
    Router::new().route("/auth/callback", get(callback).post(callback))
}
