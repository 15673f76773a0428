use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use teller_accounts::RegistrationError;
use teller_ledger::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match &err {
        LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn registration_error_to_response(err: RegistrationError) -> axum::response::Response {
    match err {
        RegistrationError::Invalid(errors) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "validation_error",
                "message": "invalid holder data",
                "errors": errors,
            })),
        )
            .into_response(),
        RegistrationError::DuplicateHolder => json_error(
            StatusCode::CONFLICT,
            "duplicate_holder",
            "NIK or phone number already registered",
        ),
        RegistrationError::NumberSpaceExhausted(_) | RegistrationError::Generator(_) => {
            tracing::error!(error = %err, "account number allocation failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "number_unavailable", err.to_string())
        }
        RegistrationError::Store(e) => {
            tracing::error!(error = %e, "registration store failure");
            let status = match e {
                teller_ledger::StoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            json_error(status, "store_unavailable", "account store unavailable")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
