//! DuckDB ledger store
//!
//! A single connection behind a mutex: the mutex is the store-wide write
//! serialization scope, and every mutating operation runs as one SQL
//! transaction under it. Balances are re-read inside that scope before any
//! funds check - a balance read before the lock is stale by definition.
//!
//! Idempotency records are written inside the same transaction as the
//! business mutation they belong to. A losing insert on the unique
//! (key, route) constraint rolls the whole transaction back and adopts the
//! winner's committed record instead of executing twice.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, EntryKind, EntryStatus, IdempotencyRecord, LedgerEntry, User,
};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Check if an error message is a unique/primary-key constraint violation
fn is_unique_violation(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("unique constraint")
        || lower.contains("primary key constraint")
        || lower.contains("duplicate key")
}

/// Idempotency scope attached to a mutating operation
///
/// Present only when the caller supplied an idempotency key; without one
/// the operation is executed unconditionally.
#[derive(Debug, Clone)]
pub struct IdempotencyScope {
    pub key: String,
    pub route: String,
    /// Caller reference for auditing, not ownership
    pub user_id: Option<Uuid>,
    /// Zero or less means the record never expires
    pub ttl_seconds: i64,
}

/// Outcome of an atomic double-entry transfer
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub transfer_group_id: Uuid,
    pub from_balance_minor: i64,
    pub to_balance_minor: i64,
    /// True when an idempotency race resolved to a previous execution
    pub replayed: bool,
}

/// Outcome of an atomic deposit credit
#[derive(Debug, Clone)]
pub struct DepositRecord {
    pub entry_id: Uuid,
    pub new_balance_minor: i64,
    /// True when an idempotency race resolved to a previous execution
    pub replayed: bool,
}

/// DuckDB ledger store
pub struct DuckDbLedgerStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DuckDbLedgerStore {
    /// Open (or create) the ledger database
    ///
    /// Includes retry logic with exponential backoff for file locking
    /// errors, which can occur when another process has the file open.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading is unused and can trip on stale caches
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(conn)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("connection lock poisoned"))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock_conn()?;
        let migration_service = MigrationService::new(&conn);
        migration_service
            .run_pending()
            .map_err(|e| Error::database(e.to_string()))
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Get the path to the ledger database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // === Users ===

    /// Fetch the user for an email, creating one if absent
    ///
    /// The caller is expected to have applied the configured email policy
    /// (normalized or exact) before calling.
    pub fn create_or_get_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let conn = self.lock_conn()?;

        if let Some(user) = Self::user_by_email(&conn, email)? {
            return Ok(user);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.map(|n| n.to_string()),
            created_at: Utc::now(),
        };
        let inserted = conn.execute(
            "INSERT INTO sys_users (user_id, email, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                user.id.to_string(),
                user.email,
                user.name,
                format_timestamp(user.created_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(user),
            // Lost a cross-process race on the unique email: adopt the winner
            Err(e) if is_unique_violation(&e.to_string()) => Self::user_by_email(&conn, email)?
                .ok_or_else(|| Error::database("user missing after unique conflict")),
            Err(e) => Err(e.into()),
        }
    }

    fn user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
        let mut stmt = conn.prepare(
            "SELECT user_id, email, name, created_at FROM sys_users WHERE email = ?",
        )?;
        let mut rows = stmt.query_map([email], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        match rows.next() {
            Some(row) => {
                let (id, email, name, created_at) = row?;
                Ok(Some(User {
                    id: parse_uuid(&id)?,
                    email,
                    name,
                    created_at: parse_timestamp(&created_at),
                }))
            }
            None => Ok(None),
        }
    }

    // === Accounts ===

    /// Fetch the (user, currency) account, creating one with a zero
    /// balance if absent
    pub fn create_or_get_account(&self, user_id: Uuid, currency: &str) -> Result<Account> {
        let currency = Account::normalize_currency(currency);
        let conn = self.lock_conn()?;

        if let Some(account) = Self::account_by_user_currency(&conn, user_id, &currency)? {
            return Ok(account);
        }

        let account = Account::new(Uuid::new_v4(), user_id, currency.as_str());
        let inserted = conn.execute(
            "INSERT INTO sys_accounts (account_id, user_id, currency, balance_minor, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                account.id.to_string(),
                account.user_id.to_string(),
                account.currency,
                account.balance_minor,
                format_timestamp(account.created_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(account),
            Err(e) if is_unique_violation(&e.to_string()) => {
                Self::account_by_user_currency(&conn, user_id, &currency)?
                    .ok_or_else(|| Error::database("account missing after unique conflict"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get an account by id
    pub fn get_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        let conn = self.lock_conn()?;
        Self::account_by_id(&conn, account_id)
    }

    fn account_by_id(conn: &Connection, account_id: Uuid) -> Result<Option<Account>> {
        Self::account_query(
            conn,
            "SELECT account_id, user_id, currency, balance_minor, created_at
             FROM sys_accounts WHERE account_id = ?",
            &[&account_id.to_string()],
        )
    }

    fn account_by_user_currency(
        conn: &Connection,
        user_id: Uuid,
        currency: &str,
    ) -> Result<Option<Account>> {
        Self::account_query(
            conn,
            "SELECT account_id, user_id, currency, balance_minor, created_at
             FROM sys_accounts WHERE user_id = ? AND currency = ?",
            &[&user_id.to_string(), &currency],
        )
    }

    fn account_query(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Option<Account>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        match rows.next() {
            Some(row) => {
                let (id, user_id, currency, balance_minor, created_at) = row?;
                Ok(Some(Account {
                    id: parse_uuid(&id)?,
                    user_id: parse_uuid(&user_id)?,
                    currency,
                    balance_minor,
                    created_at: parse_timestamp(&created_at),
                }))
            }
            None => Ok(None),
        }
    }

    // === Ledger entries ===

    /// List an account's entries, newest first
    pub fn list_entries(&self, account_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT entry_id, account_id, kind, status, amount_minor, currency,
                    transfer_group_id, related_entry_id, created_at
             FROM sys_ledger_entries
             WHERE account_id = ?
             ORDER BY created_at DESC, seq DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![account_id.to_string(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, account_id, kind, status, amount_minor, currency, group, related, created_at) =
                row?;
            entries.push(LedgerEntry {
                id: parse_uuid(&id)?,
                account_id: parse_uuid(&account_id)?,
                kind: EntryKind::parse(&kind)?,
                status: EntryStatus::parse(&status)?,
                amount_minor,
                currency,
                transfer_group_id: group.as_deref().map(parse_uuid).transpose()?,
                related_entry_id: related.as_deref().map(parse_uuid).transpose()?,
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(entries)
    }

    fn insert_entry(conn: &Connection, entry: &LedgerEntry) -> Result<()> {
        conn.execute(
            "INSERT INTO sys_ledger_entries
                 (entry_id, account_id, kind, status, amount_minor, currency,
                  transfer_group_id, related_entry_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id.to_string(),
                entry.account_id.to_string(),
                entry.kind.as_str(),
                entry.status.as_str(),
                entry.amount_minor,
                entry.currency,
                entry.transfer_group_id.map(|id| id.to_string()),
                entry.related_entry_id.map(|id| id.to_string()),
                format_timestamp(entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn adjust_balance(conn: &Connection, account_id: Uuid, delta_minor: i64) -> Result<()> {
        let updated = conn.execute(
            "UPDATE sys_accounts SET balance_minor = balance_minor + ? WHERE account_id = ?",
            params![delta_minor, account_id.to_string()],
        )?;
        if updated != 1 {
            return Err(Error::database(format!(
                "balance update touched {} rows for account {}",
                updated, account_id
            )));
        }
        Ok(())
    }

    // === Money movement ===

    /// Atomically record a double-entry transfer
    ///
    /// Under the store lock, in one transaction: re-read both balances,
    /// enforce funds, write the idempotency record, append both legs and
    /// adjust both cached balances. Any failure rolls the whole unit back.
    pub fn record_transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency: Option<&IdempotencyScope>,
    ) -> Result<TransferRecord> {
        let mut conn = self.lock_conn()?;

        match Self::transfer_txn(
            &mut conn,
            from_account_id,
            to_account_id,
            amount_minor,
            currency,
            idempotency,
        ) {
            // Lost the insert race on (key, route): the winner's committed
            // record is the outcome of this logical request.
            Err(Error::Conflict(_)) => {
                let scope = idempotency
                    .ok_or_else(|| Error::conflict("idempotency conflict without a key"))?;
                let record = Self::idempotency_by_key(&conn, &scope.key, &scope.route)?
                    .ok_or_else(|| Error::conflict("idempotency record missing after conflict"))?;
                let group = record
                    .result_ref
                    .as_deref()
                    .ok_or_else(|| Error::conflict("idempotency record has no recorded outcome"))?;
                let from = Self::account_by_id(&conn, from_account_id)?.ok_or_else(|| {
                    Error::not_found(format!("Account {} not found", from_account_id))
                })?;
                let to = Self::account_by_id(&conn, to_account_id)?.ok_or_else(|| {
                    Error::not_found(format!("Account {} not found", to_account_id))
                })?;
                Ok(TransferRecord {
                    transfer_group_id: parse_uuid(group)?,
                    from_balance_minor: from.balance_minor,
                    to_balance_minor: to.balance_minor,
                    replayed: true,
                })
            }
            other => other,
        }
    }

    fn transfer_txn(
        conn: &mut Connection,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency: Option<&IdempotencyScope>,
    ) -> Result<TransferRecord> {
        let tx = conn.transaction()?;

        // Balances read before this point are stale; the funds check only
        // counts inside the serialization scope.
        let from = Self::account_by_id(&tx, from_account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", from_account_id)))?;
        let to = Self::account_by_id(&tx, to_account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", to_account_id)))?;

        // The idempotency insert comes before the funds check: a retry
        // racing the original must adopt its outcome via the conflict
        // path, not fail the funds check against the drained balance.
        let group_id = Uuid::new_v4();
        if let Some(scope) = idempotency {
            Self::insert_idempotency(&tx, scope, &group_id.to_string())?;
        }

        if from.balance_minor < amount_minor {
            return Err(Error::InsufficientFunds {
                available: from.balance_minor,
                requested: amount_minor,
            });
        }

        let now = Utc::now();
        let out_id = Uuid::new_v4();
        let in_id = Uuid::new_v4();

        Self::insert_entry(
            &tx,
            &LedgerEntry {
                id: out_id,
                account_id: from.id,
                kind: EntryKind::TransferOut,
                status: EntryStatus::Posted,
                amount_minor,
                currency: currency.to_string(),
                transfer_group_id: Some(group_id),
                related_entry_id: Some(in_id),
                created_at: now,
            },
        )?;
        Self::insert_entry(
            &tx,
            &LedgerEntry {
                id: in_id,
                account_id: to.id,
                kind: EntryKind::TransferIn,
                status: EntryStatus::Posted,
                amount_minor,
                currency: currency.to_string(),
                transfer_group_id: Some(group_id),
                related_entry_id: Some(out_id),
                created_at: now,
            },
        )?;

        Self::adjust_balance(&tx, from.id, -amount_minor)?;
        Self::adjust_balance(&tx, to.id, amount_minor)?;

        tx.commit()?;

        Ok(TransferRecord {
            transfer_group_id: group_id,
            from_balance_minor: from.balance_minor - amount_minor,
            to_balance_minor: to.balance_minor + amount_minor,
            replayed: false,
        })
    }

    /// Atomically credit a deposit to an account
    pub fn record_deposit(
        &self,
        account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency: Option<&IdempotencyScope>,
    ) -> Result<DepositRecord> {
        let mut conn = self.lock_conn()?;

        match Self::deposit_txn(&mut conn, account_id, amount_minor, currency, idempotency) {
            Err(Error::Conflict(_)) => {
                let scope = idempotency
                    .ok_or_else(|| Error::conflict("idempotency conflict without a key"))?;
                let record = Self::idempotency_by_key(&conn, &scope.key, &scope.route)?
                    .ok_or_else(|| Error::conflict("idempotency record missing after conflict"))?;
                let entry_ref = record
                    .result_ref
                    .as_deref()
                    .ok_or_else(|| Error::conflict("idempotency record has no recorded outcome"))?;
                let account = Self::account_by_id(&conn, account_id)?
                    .ok_or_else(|| Error::not_found(format!("Account {} not found", account_id)))?;
                Ok(DepositRecord {
                    entry_id: parse_uuid(entry_ref)?,
                    new_balance_minor: account.balance_minor,
                    replayed: true,
                })
            }
            other => other,
        }
    }

    fn deposit_txn(
        conn: &mut Connection,
        account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency: Option<&IdempotencyScope>,
    ) -> Result<DepositRecord> {
        let tx = conn.transaction()?;

        let account = Self::account_by_id(&tx, account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", account_id)))?;

        let entry_id = Uuid::new_v4();
        if let Some(scope) = idempotency {
            Self::insert_idempotency(&tx, scope, &entry_id.to_string())?;
        }

        Self::insert_entry(
            &tx,
            &LedgerEntry {
                id: entry_id,
                account_id: account.id,
                kind: EntryKind::Deposit,
                status: EntryStatus::Posted,
                amount_minor,
                currency: currency.to_string(),
                transfer_group_id: None,
                related_entry_id: None,
                created_at: Utc::now(),
            },
        )?;
        Self::adjust_balance(&tx, account.id, amount_minor)?;

        tx.commit()?;

        Ok(DepositRecord {
            entry_id,
            new_balance_minor: account.balance_minor + amount_minor,
            replayed: false,
        })
    }

    // === Idempotency ===

    /// Insert the idempotency record for a fresh execution
    ///
    /// A unique-constraint violation maps to Error::Conflict so the caller
    /// can roll back and adopt the winner's record.
    fn insert_idempotency(
        conn: &Connection,
        scope: &IdempotencyScope,
        result_ref: &str,
    ) -> Result<()> {
        let record = IdempotencyRecord::new(
            scope.key.as_str(),
            scope.route.as_str(),
            scope.user_id,
            result_ref,
            scope.ttl_seconds,
        );
        conn.execute(
            "INSERT INTO sys_idempotency_keys
                 (record_id, idem_key, route, user_id, result_ref,
                  created_at, last_seen_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.to_string(),
                record.key,
                record.route,
                record.user_id.map(|id| id.to_string()),
                record.result_ref,
                format_timestamp(record.created_at),
                format_timestamp(record.last_seen_at),
                record.expires_at.map(format_timestamp),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e.to_string()) {
                Error::conflict(format!(
                    "idempotency key already recorded for route {}",
                    scope.route
                ))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    /// Look up an idempotency record by its (key, route) identity
    pub fn find_idempotency(&self, key: &str, route: &str) -> Result<Option<IdempotencyRecord>> {
        let conn = self.lock_conn()?;
        Self::idempotency_by_key(&conn, key, route)
    }

    /// Refresh last_seen_at on a replayed record
    pub fn touch_idempotency(&self, key: &str, route: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE sys_idempotency_keys SET last_seen_at = ? WHERE idem_key = ? AND route = ?",
            params![format_timestamp(Utc::now()), key, route],
        )?;
        Ok(())
    }

    /// Delete records past their expiry; returns how many were removed
    pub fn sweep_idempotency(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_idempotency_keys
             WHERE expires_at IS NOT NULL AND expires_at < ?",
            [format_timestamp(now)],
        )?;
        Ok(deleted)
    }

    fn idempotency_by_key(
        conn: &Connection,
        key: &str,
        route: &str,
    ) -> Result<Option<IdempotencyRecord>> {
        let mut stmt = conn.prepare(
            "SELECT record_id, idem_key, route, user_id, result_ref,
                    created_at, last_seen_at, expires_at
             FROM sys_idempotency_keys
             WHERE idem_key = ? AND route = ?",
        )?;
        let mut rows = stmt.query_map(params![key, route], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        match rows.next() {
            Some(row) => {
                let (id, key, route, user_id, result_ref, created_at, last_seen_at, expires_at) =
                    row?;
                Ok(Some(IdempotencyRecord {
                    id: parse_uuid(&id)?,
                    key,
                    route,
                    user_id: user_id.as_deref().map(parse_uuid).transpose()?,
                    result_ref,
                    created_at: parse_timestamp(&created_at),
                    last_seen_at: parse_timestamp(&last_seen_at),
                    expires_at: expires_at.as_deref().map(parse_timestamp),
                }))
            }
            None => Ok(None),
        }
    }

    // === Integrity and status queries ===

    /// Recompute an account's balance from its posted entry history
    pub fn recompute_balance(&self, account_id: Uuid) -> Result<i64> {
        let conn = self.lock_conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(CASE
                        WHEN kind IN ('deposit', 'transfer_in', 'adjustment') THEN amount_minor
                        ELSE -amount_minor
                    END), 0)
             FROM sys_ledger_entries
             WHERE account_id = ? AND status = 'posted'",
            [account_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Accounts whose cached balance disagrees with the entry history
    ///
    /// Returns "account_id|cached|recomputed" per drifting account.
    pub fn check_balance_drift(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT a.account_id, a.balance_minor, COALESCE(e.total, 0)
             FROM sys_accounts a
             LEFT JOIN (
                 SELECT account_id,
                        SUM(CASE
                            WHEN kind IN ('deposit', 'transfer_in', 'adjustment') THEN amount_minor
                            ELSE -amount_minor
                        END) AS total
                 FROM sys_ledger_entries
                 WHERE status = 'posted'
                 GROUP BY account_id
             ) e ON a.account_id = e.account_id
             WHERE a.balance_minor != COALESCE(e.total, 0)",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(format!(
                "{}|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Transfer groups whose legs do not pair up
    ///
    /// A well-formed group has exactly one transfer_out and one transfer_in
    /// with equal amount and currency.
    pub fn check_unpaired_transfers(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT transfer_group_id
             FROM sys_ledger_entries
             WHERE transfer_group_id IS NOT NULL
             GROUP BY transfer_group_id
             HAVING COUNT(*) != 2
                 OR SUM(CASE WHEN kind = 'transfer_out' THEN 1 ELSE 0 END) != 1
                 OR SUM(CASE WHEN kind = 'transfer_in' THEN 1 ELSE 0 END) != 1
                 OR MIN(amount_minor) != MAX(amount_minor)
                 OR MIN(currency) != MAX(currency)",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Entries that reference a missing account
    pub fn check_orphaned_entries(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.entry_id
             FROM sys_ledger_entries e
             LEFT JOIN sys_accounts a ON e.account_id = a.account_id
             WHERE a.account_id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Count idempotency records that a sweep would remove
    pub fn count_sweepable_idempotency(&self, now: DateTime<Utc>) -> Result<i64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_idempotency_keys
             WHERE expires_at IS NOT NULL AND expires_at < ?",
            [format_timestamp(now)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_users(&self) -> Result<i64> {
        self.count_table("sys_users")
    }

    pub fn count_accounts(&self) -> Result<i64> {
        self.count_table("sys_accounts")
    }

    pub fn count_entries(&self) -> Result<i64> {
        self.count_table("sys_ledger_entries")
    }

    pub fn count_idempotency_records(&self) -> Result<i64> {
        self.count_table("sys_idempotency_keys")
    }

    fn count_table(&self, table: &str) -> Result<i64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Format a timestamp as fixed-width RFC 3339 (UTC, microseconds) so that
/// string ordering matches time ordering
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("invalid uuid {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> DuckDbLedgerStore {
        let store = DuckDbLedgerStore::new(&dir.path().join("test.duckdb")).unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(Utc::now());
        let b = format_timestamp(Utc::now());
        assert_eq!(a.len(), b.len());
        assert!(a.ends_with('Z'));

        let parsed = parse_timestamp(&a);
        assert_eq!(format_timestamp(parsed), a);
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(is_unique_violation(
            "Constraint Error: Duplicate key \"k\" violates unique constraint"
        ));
        assert!(is_unique_violation(
            "Constraint Error: Duplicate key violates primary key constraint"
        ));
        assert!(!is_unique_violation("Catalog Error: table missing"));
    }

    #[test]
    fn test_create_or_get_user_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let first = store.create_or_get_user("ada@example.com", Some("Ada")).unwrap();
        let second = store.create_or_get_user("ada@example.com", None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Ada"));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn test_create_or_get_account_one_per_currency() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let first = store.create_or_get_account(user.id, "USD").unwrap();
        let second = store.create_or_get_account(user.id, "USD").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.balance_minor, 0);
        assert_eq!(store.count_accounts().unwrap(), 1);
    }

    #[test]
    fn test_deposit_then_recompute_matches_cache() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let account = store.create_or_get_account(user.id, "USD").unwrap();

        let record = store.record_deposit(account.id, 10_000, "USD", None).unwrap();
        assert_eq!(record.new_balance_minor, 10_000);
        assert!(!record.replayed);

        let cached = store.get_account(account.id).unwrap().unwrap().balance_minor;
        assert_eq!(cached, 10_000);
        assert_eq!(store.recompute_balance(account.id).unwrap(), cached);
    }

    #[test]
    fn test_transfer_rolls_back_on_insufficient_funds() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let from = store.create_or_get_account(user.id, "USD").unwrap();
        let other = store.create_or_get_user("bob@example.com", None).unwrap();
        let to = store.create_or_get_account(other.id, "USD").unwrap();

        store.record_deposit(from.id, 500, "USD", None).unwrap();

        let err = store
            .record_transfer(from.id, to.id, 501, "USD", None)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { available: 500, requested: 501 }));

        // Nothing applied: balances and entry count unchanged
        assert_eq!(store.get_account(from.id).unwrap().unwrap().balance_minor, 500);
        assert_eq!(store.get_account(to.id).unwrap().unwrap().balance_minor, 0);
        assert_eq!(store.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_transfer_writes_paired_legs() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let from = store.create_or_get_account(user.id, "USD").unwrap();
        let other = store.create_or_get_user("bob@example.com", None).unwrap();
        let to = store.create_or_get_account(other.id, "USD").unwrap();

        store.record_deposit(from.id, 10_000, "USD", None).unwrap();
        let record = store
            .record_transfer(from.id, to.id, 2_500, "USD", None)
            .unwrap();

        assert_eq!(record.from_balance_minor, 7_500);
        assert_eq!(record.to_balance_minor, 2_500);

        let out_legs = store.list_entries(from.id, 20).unwrap();
        let in_legs = store.list_entries(to.id, 20).unwrap();
        let out = &out_legs[0];
        let inn = &in_legs[0];
        assert_eq!(out.kind, EntryKind::TransferOut);
        assert_eq!(inn.kind, EntryKind::TransferIn);
        assert_eq!(out.transfer_group_id, inn.transfer_group_id);
        assert_eq!(out.related_entry_id, Some(inn.id));
        assert_eq!(inn.related_entry_id, Some(out.id));
        assert!(store.check_unpaired_transfers().unwrap().is_empty());
        assert!(store.check_balance_drift().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_idempotency_scope_replays() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let account = store.create_or_get_account(user.id, "USD").unwrap();

        let scope = IdempotencyScope {
            key: "retry-1".to_string(),
            route: format!("deposit/{}", account.id),
            user_id: Some(user.id),
            ttl_seconds: 86_400,
        };

        let first = store
            .record_deposit(account.id, 1_000, "USD", Some(&scope))
            .unwrap();
        // Same scope again: the insert conflicts and the first outcome wins
        let second = store
            .record_deposit(account.id, 1_000, "USD", Some(&scope))
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.entry_id, second.entry_id);
        assert_eq!(second.new_balance_minor, 1_000);
        assert_eq!(store.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired_records() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let user = store.create_or_get_user("ada@example.com", None).unwrap();
        let account = store.create_or_get_account(user.id, "USD").unwrap();

        let expiring = IdempotencyScope {
            key: "old".to_string(),
            route: "transfer".to_string(),
            user_id: None,
            ttl_seconds: 1,
        };
        let permanent = IdempotencyScope {
            key: "keep".to_string(),
            route: "transfer".to_string(),
            user_id: None,
            ttl_seconds: 0,
        };
        store.record_deposit(account.id, 100, "USD", Some(&expiring)).unwrap();
        store.record_deposit(account.id, 100, "USD", Some(&permanent)).unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(store.count_sweepable_idempotency(future).unwrap(), 1);
        assert_eq!(store.sweep_idempotency(future).unwrap(), 1);
        assert!(store.find_idempotency("old", "transfer").unwrap().is_none());
        assert!(store.find_idempotency("keep", "transfer").unwrap().is_some());
    }
}
