use std::sync::Arc;

use rust_decimal::Decimal;

use teller_accounts::{RegistrationError, RegistrationService};
use teller_core::Balance;
use teller_infra::config::{AppConfig, DatabaseConfig, StorageConfig};
use teller_infra::store::{InMemoryLedgerStore, PostgresLedgerStore};
use teller_ledger::{Account, EngineConfig, LedgerEngine, LedgerEntry, LedgerResult, Reconciliation, StoreError};
use teller_observability::TracingObserver;

type Engine<S> = LedgerEngine<S, TracingObserver>;

/// Ledger engine + registration over one store backend.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        engine: Arc<Engine<InMemoryLedgerStore>>,
        registration: Arc<RegistrationService<InMemoryLedgerStore>>,
    },
    Persistent {
        engine: Arc<Engine<PostgresLedgerStore>>,
        registration: Arc<RegistrationService<PostgresLedgerStore>>,
    },
}

/// Build services for the configured backend.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    match &config.storage {
        StorageConfig::InMemory => {
            tracing::info!("using in-memory stores");
            Ok(AppServices::in_memory(config.engine))
        }
        StorageConfig::Postgres(db) => {
            tracing::info!(
                max_connections = db.max_connections,
                lock_timeout_ms = db.lock_timeout.as_millis() as u64,
                "using postgres stores"
            );
            AppServices::persistent(db, config.engine).await
        }
    }
}

impl AppServices {
    pub fn in_memory(engine_config: EngineConfig) -> Self {
        let store = InMemoryLedgerStore::new();
        AppServices::InMemory {
            engine: Arc::new(
                LedgerEngine::new(store.clone())
                    .with_observer(TracingObserver)
                    .with_config(engine_config),
            ),
            registration: Arc::new(RegistrationService::new(store)),
        }
    }

    pub async fn persistent(db: &DatabaseConfig, engine_config: EngineConfig) -> Result<Self, StoreError> {
        let store = PostgresLedgerStore::connect(db).await?;
        Ok(AppServices::Persistent {
            engine: Arc::new(
                LedgerEngine::new(store.clone())
                    .with_observer(TracingObserver)
                    .with_config(engine_config),
            ),
            registration: Arc::new(RegistrationService::new(store)),
        })
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Persistent { .. } => "postgres",
        }
    }

    pub async fn register(&self, nik: &str, phone_number: &str) -> Result<Account, RegistrationError> {
        match self {
            AppServices::InMemory { registration, .. } => registration.register(nik, phone_number).await,
            AppServices::Persistent { registration, .. } => registration.register(nik, phone_number).await,
        }
    }

    pub async fn deposit(&self, account_number: &str, amount: Decimal) -> LedgerResult<Balance> {
        match self {
            AppServices::InMemory { engine, .. } => engine.deposit(account_number, amount).await,
            AppServices::Persistent { engine, .. } => engine.deposit(account_number, amount).await,
        }
    }

    pub async fn withdraw(&self, account_number: &str, amount: Decimal) -> LedgerResult<Balance> {
        match self {
            AppServices::InMemory { engine, .. } => engine.withdraw(account_number, amount).await,
            AppServices::Persistent { engine, .. } => engine.withdraw(account_number, amount).await,
        }
    }

    pub async fn balance(&self, account_number: &str) -> LedgerResult<Balance> {
        match self {
            AppServices::InMemory { engine, .. } => engine.get_balance(account_number).await,
            AppServices::Persistent { engine, .. } => engine.get_balance(account_number).await,
        }
    }

    pub async fn history(&self, account_number: &str) -> LedgerResult<Vec<LedgerEntry>> {
        match self {
            AppServices::InMemory { engine, .. } => engine.get_history(account_number).await,
            AppServices::Persistent { engine, .. } => engine.get_history(account_number).await,
        }
    }

    pub async fn reconcile(&self, account_number: &str) -> LedgerResult<Reconciliation> {
        match self {
            AppServices::InMemory { engine, .. } => engine.reconcile(account_number).await,
            AppServices::Persistent { engine, .. } => engine.reconcile(account_number).await,
        }
    }
}
