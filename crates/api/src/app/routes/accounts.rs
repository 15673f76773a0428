use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn register_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterAccountRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_payload", rejection.body_text());
        }
    };

    match services.register(&body.nik, &body.phone_number).await {
        Ok(account) => {
            tracing::info!(account_number = %account.number, "account registered");
            (
                StatusCode::CREATED,
                Json(dto::RegisterAccountResponse {
                    account_number: account.number.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => errors::registration_error_to_response(e),
    }
}
