//! Ledger observer that turns unit outcomes into structured log events.
//!
//! Levels: commits at `info`, caller errors at `warn`, store failures and
//! timeouts at `error`.

use ::tracing::{error, info, warn};

use teller_ledger::{LedgerEvent, LedgerObserver};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LedgerObserver for TracingObserver {
    fn observe(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Refused {
                kind,
                account_number,
                error,
            } => warn!(
                kind = %kind,
                account_number = %account_number,
                code = error.code(),
                error = %error,
                "ledger request refused"
            ),
            LedgerEvent::Committed {
                kind,
                account_number,
                account_id,
                amount,
                previous_balance,
                balance,
                entry_id,
            } => info!(
                kind = %kind,
                account_number = %account_number,
                account_id = %account_id,
                amount = %amount,
                previous_balance = %previous_balance,
                balance = %balance,
                entry_id = entry_id.0,
                "ledger unit committed"
            ),
            LedgerEvent::RolledBack {
                kind,
                account_number,
                stage,
                error,
            } if error.is_retryable() => error!(
                kind = %kind,
                account_number = %account_number,
                stage = stage.as_str(),
                code = error.code(),
                error = %error,
                "ledger unit rolled back"
            ),
            LedgerEvent::RolledBack {
                kind,
                account_number,
                stage,
                error,
            } => warn!(
                kind = %kind,
                account_number = %account_number,
                stage = stage.as_str(),
                code = error.code(),
                error = %error,
                "ledger unit rolled back"
            ),
            LedgerEvent::RollbackFailed {
                kind,
                account_number,
                reason,
            } => error!(
                kind = %kind,
                account_number = %account_number,
                reason = %reason,
                "explicit rollback failed; unit discarded on drop"
            ),
            LedgerEvent::TimedOut {
                kind,
                account_number,
                after,
            } => error!(
                kind = %kind,
                account_number = %account_number,
                after_ms = after.as_millis() as u64,
                "ledger unit timed out"
            ),
        }
    }
}
