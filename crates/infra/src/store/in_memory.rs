use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use teller_accounts::{
    AccountDirectory, AccountHolder, DUPLICATE_ACCOUNT_NUMBER, DUPLICATE_NIK, DUPLICATE_PHONE_NUMBER,
    NewAccount,
};
use teller_core::{AccountId, Balance};
use teller_ledger::{
    Account, AccountNumber, EntryId, LedgerEntry, LedgerStore, LedgerUnit, LockedAccount, NewLedgerEntry,
    StoreError,
};

/// In-memory account + history store.
///
/// Intended for tests/dev. Each account carries its own async row lock, so
/// units on different accounts never wait on each other. Writes made through
/// a unit are staged and only published at commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    directory: RwLock<Directory>,
    next_entry_id: AtomicI64,
}

#[derive(Debug, Default)]
struct Directory {
    by_number: HashMap<AccountNumber, Arc<AccountRow>>,
    niks: HashSet<String>,
    phone_numbers: HashSet<String>,
}

#[derive(Debug)]
struct AccountRow {
    id: AccountId,
    number: AccountNumber,
    created_at: DateTime<Utc>,
    lock: Arc<Mutex<()>>,
    committed: RwLock<Committed>,
}

#[derive(Debug, Clone)]
struct Committed {
    balance: Balance,
    entries: Vec<LedgerEntry>,
}

impl AccountRow {
    fn snapshot(&self) -> Result<(Account, Vec<LedgerEntry>), StoreError> {
        let committed = self.committed.read().map_err(|_| poisoned())?;
        Ok((
            Account {
                id: self.id,
                number: self.number.clone(),
                balance: committed.balance,
                created_at: self.created_at,
            },
            committed.entries.clone(),
        ))
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, number: &AccountNumber) -> Result<Option<Arc<AccountRow>>, StoreError> {
        let directory = self.inner.directory.read().map_err(|_| poisoned())?;
        Ok(directory.by_number.get(number).cloned())
    }
}

/// Atomic unit over the in-memory store.
///
/// Holds the row locks it acquired until commit, rollback or drop. Dropping
/// the unit discards everything it staged.
#[derive(Debug)]
pub struct InMemoryUnit {
    inner: Arc<Inner>,
    locked: HashMap<AccountId, LockedRow>,
    staged_entries: Vec<LedgerEntry>,
}

#[derive(Debug)]
struct LockedRow {
    row: Arc<AccountRow>,
    staged_balance: Option<Balance>,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryUnit {
    fn locked_mut(&mut self, account_id: AccountId) -> Result<&mut LockedRow, StoreError> {
        self.locked
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::Unavailable(format!("account {account_id} is not locked by this unit")))
    }
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn lock_account_for_update(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<LockedAccount>, StoreError> {
        let row = {
            let directory = self.inner.directory.read().map_err(|_| poisoned())?;
            match directory.by_number.get(number) {
                Some(row) => Arc::clone(row),
                None => return Ok(None),
            }
        };

        if let Some(locked) = self.locked.get(&row.id) {
            let balance = match locked.staged_balance {
                Some(balance) => balance,
                None => locked.row.committed.read().map_err(|_| poisoned())?.balance,
            };
            return Ok(Some(LockedAccount { id: row.id, balance }));
        }

        let guard = Arc::clone(&row.lock).lock_owned().await;
        let balance = row.committed.read().map_err(|_| poisoned())?.balance;
        let id = row.id;
        self.locked.insert(
            id,
            LockedRow {
                row,
                staged_balance: None,
                _guard: guard,
            },
        );

        Ok(Some(LockedAccount { id, balance }))
    }

    async fn set_balance(&mut self, account_id: AccountId, balance: Balance) -> Result<(), StoreError> {
        self.locked_mut(account_id)?.staged_balance = Some(balance);
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.locked_mut(entry.account_id)?;
        // Ids consumed by rolled-back units leave gaps, like a database sequence.
        let id = EntryId(self.inner.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = LedgerEntry::from_new(id, entry);
        self.staged_entries.push(stored.clone());
        Ok(stored)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let mut entries_by_account: HashMap<AccountId, Vec<LedgerEntry>> = HashMap::new();
        for entry in self.staged_entries.drain(..) {
            entries_by_account.entry(entry.account_id).or_default().push(entry);
        }

        for (id, locked) in &self.locked {
            let mut committed = locked.row.committed.write().map_err(|_| poisoned())?;
            if let Some(balance) = locked.staged_balance {
                committed.balance = balance;
            }
            if let Some(entries) = entries_by_account.remove(id) {
                committed.entries.extend(entries);
            }
        }

        // Row locks are released when `self` drops here.
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        Ok(InMemoryUnit {
            inner: Arc::clone(&self.inner),
            locked: HashMap::new(),
            staged_entries: Vec::new(),
        })
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        match self.row(number)? {
            Some(row) => Ok(Some(row.snapshot()?.0)),
            None => Ok(None),
        }
    }

    async fn account_history(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
        match self.row(number)? {
            Some(row) => Ok(Some(row.snapshot()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountDirectory for InMemoryLedgerStore {
    async fn holder_exists(&self, holder: &AccountHolder) -> Result<bool, StoreError> {
        let directory = self.inner.directory.read().map_err(|_| poisoned())?;
        Ok(directory.niks.contains(holder.nik.as_str())
            || directory.phone_numbers.contains(holder.phone_number.as_str()))
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut directory = self.inner.directory.write().map_err(|_| poisoned())?;

        if directory.by_number.contains_key(&account.number) {
            return Err(StoreError::Duplicate(DUPLICATE_ACCOUNT_NUMBER.to_string()));
        }
        if directory.niks.contains(account.holder.nik.as_str()) {
            return Err(StoreError::Duplicate(DUPLICATE_NIK.to_string()));
        }
        if directory.phone_numbers.contains(account.holder.phone_number.as_str()) {
            return Err(StoreError::Duplicate(DUPLICATE_PHONE_NUMBER.to_string()));
        }

        directory.niks.insert(account.holder.nik.as_str().to_string());
        directory
            .phone_numbers
            .insert(account.holder.phone_number.as_str().to_string());
        directory.by_number.insert(
            account.number.clone(),
            Arc::new(AccountRow {
                id: account.id,
                number: account.number.clone(),
                created_at: account.created_at,
                lock: Arc::new(Mutex::new(())),
                committed: RwLock::new(Committed {
                    balance: Balance::ZERO,
                    entries: Vec::new(),
                }),
            }),
        );

        Ok(Account {
            id: account.id,
            number: account.number,
            balance: Balance::ZERO,
            created_at: account.created_at,
        })
    }
}
