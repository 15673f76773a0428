use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

fn parse_body(
    body: Result<Json<dto::TransactionRequest>, JsonRejection>,
) -> Result<dto::TransactionRequest, axum::response::Response> {
    body.map(|Json(body)| body)
        .map_err(|rejection| errors::json_error(StatusCode::BAD_REQUEST, "invalid_payload", rejection.body_text()))
}

pub async fn deposit(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::TransactionRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    match services.deposit(&body.account_number, body.amount).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(dto::TransactionResponse::new("deposit successful", balance)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn withdraw(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::TransactionRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    match services.withdraw(&body.account_number, body.amount).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(dto::TransactionResponse::new("withdrawal successful", balance)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_number): Path<String>,
) -> axum::response::Response {
    match services.balance(&account_number).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(dto::BalanceResponse::new(account_number, balance)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_number): Path<String>,
) -> axum::response::Response {
    match services.history(&account_number).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(dto::HistoryResponse {
                account_number,
                entries: entries.into_iter().map(dto::EntryDto::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_reconciliation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_number): Path<String>,
) -> axum::response::Response {
    match services.reconcile(&account_number).await {
        Ok(report) => (StatusCode::OK, Json(dto::ReconciliationResponse::from(report))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
