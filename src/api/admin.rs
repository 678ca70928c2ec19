use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppError;
use crate::ledger::UserLedger;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(alias = "id_user")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PriceView {
    pub provider: String,
    pub model: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub data: Vec<PriceView>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    let req: CreateUserRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::BadRequest("Cannot parse JSON".into()))?;

    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("user_id is required".into()));
    }

    state.ledger.create_user(user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user_id: user_id.to_string(),
        }),
    ))
}

/// GET /users/{id}/ledger
pub async fn get_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserLedger>, AppError> {
    Ok(Json(state.ledger.load_for_display(&user_id).await?))
}

/// GET /pricing
pub async fn list_pricing(State(state): State<AppState>) -> Json<PricingResponse> {
    let data = state
        .pricing
        .entries()
        .into_iter()
        .map(|e| PriceView {
            provider: e.provider.to_string(),
            model: e.model.clone(),
            input_price_per_million: e.input_price_per_million,
            output_price_per_million: e.output_price_per_million,
        })
        .collect();
    Json(PricingResponse { data })
}
