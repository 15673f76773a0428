//! Integration tests for the full ledger pipeline.
//!
//! Tests: Registration → LedgerEngine → InMemoryLedgerStore
//!
//! Verifies:
//! - Balances and history move together or not at all
//! - Concurrent withdrawals never overdraw an account
//! - A stuck unit on one account times out without blocking others
//! - Each concrete ledger scenario, with state checked before and after

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use teller_accounts::RegistrationService;
    use teller_core::{AccountId, Balance};
    use teller_ledger::{
        Account, AccountNumber, EngineConfig, EntryKind, LedgerEngine, LedgerEntry, LedgerError,
        LedgerEvent, LedgerStore, LedgerUnit, LockedAccount, NewLedgerEntry, RecordingObserver,
        StoreError, UnitStage,
    };

    use crate::store::{InMemoryLedgerStore, InMemoryUnit};

    const NIK_A: &str = "3171011201900001";
    const NIK_B: &str = "3171011201900002";
    const PHONE_A: &str = "081234567890";
    const PHONE_B: &str = "081234567891";

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn balance(v: i64) -> Balance {
        Balance::new(dec(v)).unwrap()
    }

    async fn register(store: &InMemoryLedgerStore, nik: &str, phone: &str) -> Account {
        RegistrationService::new(store.clone())
            .register(nik, phone)
            .await
            .expect("registration succeeds")
    }

    fn engine(store: &InMemoryLedgerStore) -> LedgerEngine<InMemoryLedgerStore> {
        LedgerEngine::new(store.clone())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn deposit_withdraw_and_history_roundtrip() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);

        assert_eq!(engine.deposit(number, dec(500)).await.unwrap(), balance(500));
        assert_eq!(engine.withdraw(number, dec(200)).await.unwrap(), balance(300));
        assert_eq!(engine.get_balance(number).await.unwrap(), balance(300));

        let history = engine.get_history(number).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|e| (e.kind, e.amount.value())).collect();
        assert_eq!(
            kinds,
            vec![(EntryKind::Deposit, dec(500)), (EntryKind::Withdrawal, dec(200))]
        );
        assert!(history[0].created_at <= history[1].created_at);
        assert!(history.iter().all(|e| e.account_id == account.id));
    }

    #[tokio::test]
    async fn overdraft_is_refused_without_side_effects() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);

        engine.deposit(number, dec(100)).await.unwrap();
        let err = engine.withdraw(number, dec(150)).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(engine.get_balance(number).await.unwrap(), balance(100));
        assert_eq!(engine.get_history(number).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_amounts_never_reach_the_store() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);

        for amount in [dec(0), dec(-5), Decimal::new(1001, 3)] {
            assert!(matches!(
                engine.deposit(number, amount).await,
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                engine.withdraw(number, amount).await,
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert!(engine.get_history(number).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_account_is_reported() {
        let store = InMemoryLedgerStore::new();
        let engine = engine(&store);

        assert!(matches!(
            engine.deposit("1099999999", dec(10)).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            engine.get_history("1099999999").await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_withdrawals_never_overdraw() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let engine = Arc::new(engine(&store));
        engine.deposit(account.number.as_str(), dec(1_000)).await.unwrap();

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let number = account.number.to_string();
                tokio::spawn(async move { engine.withdraw(&number, dec(100)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(engine.get_balance(account.number.as_str()).await.unwrap(), Balance::ZERO);

        let reconciliation = engine.reconcile(account.number.as_str()).await.unwrap();
        assert!(reconciliation.consistent);
        assert_eq!(reconciliation.entry_count, 11);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_deposits_lose_no_updates() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let engine = Arc::new(engine(&store));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let number = account.number.to_string();
                tokio::spawn(async move { engine.deposit(&number, dec(10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.get_balance(account.number.as_str()).await.unwrap(), balance(500));
        assert_eq!(engine.get_history(account.number.as_str()).await.unwrap().len(), 50);
    }

    /// Wraps the in-memory store and fails `append_entry` while armed.
    #[derive(Clone)]
    struct FailingAppendStore {
        inner: InMemoryLedgerStore,
        armed: Arc<AtomicBool>,
    }

    struct FailingAppendUnit {
        inner: InMemoryUnit,
        armed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LedgerUnit for FailingAppendUnit {
        async fn lock_account_for_update(
            &mut self,
            number: &AccountNumber,
        ) -> Result<Option<LockedAccount>, StoreError> {
            self.inner.lock_account_for_update(number).await
        }

        async fn set_balance(&mut self, account_id: AccountId, balance: Balance) -> Result<(), StoreError> {
            self.inner.set_balance(account_id, balance).await
        }

        async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
            if self.armed.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("history table unreachable".to_string()));
            }
            self.inner.append_entry(entry).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl LedgerStore for FailingAppendStore {
        type Unit = FailingAppendUnit;

        async fn begin(&self) -> Result<Self::Unit, StoreError> {
            Ok(FailingAppendUnit {
                inner: self.inner.begin().await?,
                armed: Arc::clone(&self.armed),
            })
        }

        async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
            self.inner.find_account(number).await
        }

        async fn account_history(
            &self,
            number: &AccountNumber,
        ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
            self.inner.account_history(number).await
        }
    }

    #[tokio::test]
    async fn failed_history_write_rolls_back_the_balance() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();

        let armed = Arc::new(AtomicBool::new(false));
        let observer = Arc::new(RecordingObserver::new());
        let engine = LedgerEngine::new(FailingAppendStore {
            inner: store.clone(),
            armed: Arc::clone(&armed),
        })
        .with_observer(Arc::clone(&observer));

        engine.deposit(number, dec(300)).await.unwrap();

        armed.store(true, Ordering::SeqCst);
        let err = engine.withdraw(number, dec(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        assert_eq!(engine.get_balance(number).await.unwrap(), balance(300));
        assert_eq!(engine.get_history(number).await.unwrap().len(), 1);
        assert!(observer.events().iter().any(|e| matches!(
            e,
            LedgerEvent::RolledBack {
                stage: UnitStage::Applied,
                ..
            }
        )));

        // The row lock was released by the rollback; a retry goes through.
        armed.store(false, Ordering::SeqCst);
        assert_eq!(engine.withdraw(number, dec(100)).await.unwrap(), balance(200));
        assert!(engine.reconcile(number).await.unwrap().consistent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stuck_lock_times_out_and_leaves_state_untouched() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.clone();
        let observer = Arc::new(RecordingObserver::new());
        let engine = LedgerEngine::new(store.clone())
            .with_observer(Arc::clone(&observer))
            .with_config(EngineConfig {
                unit_timeout: Duration::from_millis(100),
            });
        engine.deposit(number.as_str(), dec(50)).await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(&number).await.unwrap().unwrap();

        let err = engine.withdraw(number.as_str(), dec(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(
            observer
                .events()
                .iter()
                .any(|e| matches!(e, LedgerEvent::TimedOut { .. }))
        );

        holder.rollback().await.unwrap();

        assert_eq!(engine.get_balance(number.as_str()).await.unwrap(), balance(50));
        assert_eq!(engine.withdraw(number.as_str(), dec(10)).await.unwrap(), balance(40));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn locked_account_does_not_block_other_accounts() {
        let store = InMemoryLedgerStore::new();
        let a = register(&store, NIK_A, PHONE_A).await;
        let b = register(&store, NIK_B, PHONE_B).await;
        let engine = engine(&store).with_config(EngineConfig {
            unit_timeout: Duration::from_secs(2),
        });

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(&a.number).await.unwrap().unwrap();

        let started = Instant::now();
        engine.deposit(b.number.as_str(), dec(10)).await.unwrap();
        engine.withdraw(b.number.as_str(), dec(5)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        holder.rollback().await.unwrap();
    }

    async fn state(
        engine: &LedgerEngine<InMemoryLedgerStore>,
        number: &str,
    ) -> (Balance, Vec<(EntryKind, Decimal)>) {
        let balance = engine.get_balance(number).await.unwrap();
        let history = engine
            .get_history(number)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.kind, e.amount.value()))
            .collect();
        (balance, history)
    }

    #[tokio::test]
    async fn scenario_1_withdraw_from_fresh_account_changes_nothing() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);
        assert_eq!(state(&engine, number).await, (Balance::ZERO, vec![]));

        let err = engine.withdraw(number, dec(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(state(&engine, number).await, (Balance::ZERO, vec![]));
    }

    #[tokio::test]
    async fn scenario_2_deposit_then_withdraw() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);

        assert_eq!(engine.deposit(number, dec(500)).await.unwrap(), balance(500));
        assert_eq!(
            state(&engine, number).await,
            (balance(500), vec![(EntryKind::Deposit, dec(500))])
        );

        assert_eq!(engine.withdraw(number, dec(200)).await.unwrap(), balance(300));
        assert_eq!(
            state(&engine, number).await,
            (
                balance(300),
                vec![(EntryKind::Deposit, dec(500)), (EntryKind::Withdrawal, dec(200))]
            )
        );
    }

    #[tokio::test]
    async fn scenario_3_negative_deposit_changes_nothing() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = engine(&store);
        engine.deposit(number, dec(40)).await.unwrap();
        let before = state(&engine, number).await;

        let err = engine.deposit(number, dec(-5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert_eq!(state(&engine, number).await, before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_4_two_concurrent_withdrawals_one_succeeds() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let engine = Arc::new(engine(&store));
        engine.deposit(account.number.as_str(), dec(500)).await.unwrap();

        let spawn = |engine: Arc<LedgerEngine<InMemoryLedgerStore>>, number: String| {
            tokio::spawn(async move { engine.withdraw(&number, dec(300)).await })
        };
        let first = spawn(Arc::clone(&engine), account.number.to_string());
        let second = spawn(Arc::clone(&engine), account.number.to_string());
        let results = [first.await.unwrap(), second.await.unwrap()];

        let ok: Vec<Balance> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(ok, vec![balance(200)]);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
        );

        let (final_balance, history) = state(&engine, account.number.as_str()).await;
        assert_eq!(final_balance, balance(200));
        assert_eq!(
            history,
            vec![(EntryKind::Deposit, dec(500)), (EntryKind::Withdrawal, dec(300))]
        );
    }

    #[tokio::test]
    async fn scenario_5_history_is_in_creation_order() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let fresh = register(&store, NIK_B, PHONE_B).await;
        let number = account.number.as_str();
        let engine = engine(&store);

        engine.deposit(number, dec(100)).await.unwrap();
        engine.withdraw(number, dec(30)).await.unwrap();
        engine.deposit(number, dec(7)).await.unwrap();

        let history = engine.get_history(number).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|e| (e.kind, e.amount.value())).collect();
        assert_eq!(
            kinds,
            vec![
                (EntryKind::Deposit, dec(100)),
                (EntryKind::Withdrawal, dec(30)),
                (EntryKind::Deposit, dec(7)),
            ]
        );
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        assert!(engine.get_history(fresh.number.as_str()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_6_nonexistent_account_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let engine = engine(&store);
        let missing = if account.number.as_str() == "1099999999" {
            "1099999998"
        } else {
            "1099999999"
        };

        assert!(matches!(
            engine.withdraw(missing, dec(10)).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            engine.get_balance(missing).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert_eq!(state(&engine, account.number.as_str()).await, (Balance::ZERO, vec![]));
    }

    /// Wraps the in-memory store; `commit` publishes, then acknowledges late.
    #[derive(Clone)]
    struct SlowAckStore {
        inner: InMemoryLedgerStore,
        delay: Duration,
    }

    struct SlowAckUnit {
        inner: InMemoryUnit,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerUnit for SlowAckUnit {
        async fn lock_account_for_update(
            &mut self,
            number: &AccountNumber,
        ) -> Result<Option<LockedAccount>, StoreError> {
            self.inner.lock_account_for_update(number).await
        }

        async fn set_balance(&mut self, account_id: AccountId, balance: Balance) -> Result<(), StoreError> {
            self.inner.set_balance(account_id, balance).await
        }

        async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
            self.inner.append_entry(entry).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl LedgerStore for SlowAckStore {
        type Unit = SlowAckUnit;

        async fn begin(&self) -> Result<Self::Unit, StoreError> {
            Ok(SlowAckUnit {
                inner: self.inner.begin().await?,
                delay: self.delay,
            })
        }

        async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
            self.inner.find_account(number).await
        }

        async fn account_history(
            &self,
            number: &AccountNumber,
        ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
            self.inner.account_history(number).await
        }
    }

    #[tokio::test]
    async fn durable_commit_with_late_ack_is_reported_as_success() {
        let store = InMemoryLedgerStore::new();
        let account = register(&store, NIK_A, PHONE_A).await;
        let number = account.number.as_str();
        let engine = LedgerEngine::new(SlowAckStore {
            inner: store.clone(),
            delay: Duration::from_millis(200),
        })
        .with_config(EngineConfig {
            unit_timeout: Duration::from_millis(100),
        });

        assert_eq!(engine.deposit(number, dec(100)).await.unwrap(), balance(100));

        // A caller retrying on Timeout would have double-credited here.
        let plain = self::engine(&store);
        assert_eq!(plain.get_balance(number).await.unwrap(), balance(100));
        assert_eq!(plain.get_history(number).await.unwrap().len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i64),
        Withdraw(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..=100_000).prop_map(Op::Deposit),
            (1i64..=100_000).prop_map(Op::Withdraw),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of operations (amounts in cents), the
        /// balance equals the replayed history and never went negative.
        #[test]
        fn balance_always_matches_history(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let store = InMemoryLedgerStore::new();
                let account = register(&store, NIK_A, PHONE_A).await;
                let number = account.number.as_str();
                let engine = engine(&store);

                let mut expected = Decimal::ZERO;
                for op in &ops {
                    match *op {
                        Op::Deposit(cents) => {
                            let amount = Decimal::new(cents, 2);
                            engine.deposit(number, amount).await.unwrap();
                            expected += amount;
                        }
                        Op::Withdraw(cents) => {
                            let amount = Decimal::new(cents, 2);
                            match engine.withdraw(number, amount).await {
                                Ok(_) => expected -= amount,
                                Err(LedgerError::InsufficientFunds { .. }) => assert!(amount > expected),
                                Err(other) => panic!("unexpected error: {other}"),
                            }
                        }
                    }
                    assert!(expected >= Decimal::ZERO);
                }

                let reconciliation = engine.reconcile(number).await.unwrap();
                assert!(reconciliation.consistent);
                assert_eq!(reconciliation.balance.value(), expected);
            });
        }

        /// Property: concurrent withdrawals of `amount` from `funds` succeed
        /// exactly `min(attempts, funds / amount)` times.
        #[test]
        fn concurrent_withdrawal_successes_are_bounded_by_funds(
            funds in 0i64..2_000,
            amount in 1i64..500,
            attempts in 1usize..30,
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let store = InMemoryLedgerStore::new();
                let account = register(&store, NIK_A, PHONE_A).await;
                let engine = Arc::new(engine(&store));
                if funds > 0 {
                    engine.deposit(account.number.as_str(), dec(funds)).await.unwrap();
                }

                let handles: Vec<_> = (0..attempts)
                    .map(|_| {
                        let engine = Arc::clone(&engine);
                        let number = account.number.to_string();
                        tokio::spawn(async move { engine.withdraw(&number, dec(amount)).await })
                    })
                    .collect();

                let mut succeeded = 0usize;
                for handle in handles {
                    if handle.await.unwrap().is_ok() {
                        succeeded += 1;
                    }
                }

                let expected = attempts.min((funds / amount) as usize);
                assert_eq!(succeeded, expected);
                assert_eq!(
                    engine.get_balance(account.number.as_str()).await.unwrap().value(),
                    dec(funds - amount * expected as i64)
                );
            });
        }
    }
}
