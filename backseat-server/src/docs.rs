use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{ErrorBody, QueueSchema};

#[derive(OpenApi)]
#[openapi(
    paths(crate::callback::callback, crate::search::search, crate::queue::queue),
    components(schemas(QueueSchema, ErrorBody)),
    modifiers(&Security),
    info(
        title = "backseat proxy",
        description = "Completes streaming authorization and forwards search and queue requests with the caller's token"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
