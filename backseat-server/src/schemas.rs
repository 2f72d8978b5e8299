use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
pub struct QueueSchema {
    /// The track to add, like `spotify:track:4uLU6hMCjMI75M1A2tKUQC`
    #[serde(default)]
    #[validate(length(min = 1, message = "Missing uri"))]
    pub uri: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// What to search for
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// The authorization code
    pub code: Option<String>,
    /// The PKCE verifier the authorization started with
    pub state: Option<String>,
}

/// The envelope every error is answered with
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::BadRequest("JSON parse failed".to_string()))?;

        extracted_json.0.validate().map_err(|errors| {
            let message = errors
                .field_errors()
                .into_values()
                .flat_map(|errors| errors.iter())
                .find_map(|error| error.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "Request body is invalid".to_string());

            ServerError::BadRequest(message)
        })?;

        Ok(Self(extracted_json.0))
    }
}
