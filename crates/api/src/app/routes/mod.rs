use axum::{
    Router,
    routing::{get, post},
};

pub mod accounts;
pub mod ledger;
pub mod system;

/// Router for all account and ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(accounts::register_account))
        .route("/accounts/:account_number/balance", get(ledger::get_balance))
        .route("/accounts/:account_number/history", get(ledger::get_history))
        .route("/accounts/:account_number/reconciliation", get(ledger::get_reconciliation))
        .route("/deposits", post(ledger::deposit))
        .route("/withdrawals", post(ledger::withdraw))
}
