use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use crate::auth::AuthorizationContext;
use crate::error::AppResult;
use crate::models::{
    BudgetDetailRecord, CashFlowRecord, Kind, Status, Totals, TransactionInput,
    TransactionRecord, User,
};

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_db(path: &Path) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))
    });
    let pool = Pool::new(manager)?;
    let conn = pool.get()?;
    run_migrations(&conn)?;
    Ok(pool)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            last_seen_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('income', 'expense')),
            category TEXT NOT NULL,
            occurred_on TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('paid', 'pending')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS transactions_owner_date
            ON transactions(user_id, occurred_on);

        CREATE TABLE IF NOT EXISTS budgets (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            month TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS budgets_owner_category_month
            ON budgets(user_id, category, month);
        ",
    )
}

// Accounts and sessions

pub fn insert_user(conn: &Connection, email: &str, password_hash: &str, created_at: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
        params![email, password_hash, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

pub fn user_credentials(conn: &Connection, email: &str) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT id, password_hash FROM users WHERE email = ?1",
        params![email],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

pub fn create_session(
    conn: &Connection,
    user_id: i64,
    token: &str,
    created_at: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, token, created_at, last_seen_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, token, created_at, now],
    )?;
    Ok(())
}

/// Returns the session owner if the session was seen within `idle_seconds`,
/// and slides its window forward. Stale sessions are removed.
pub fn touch_session(conn: &Connection, token: &str, now: i64, idle_seconds: i64) -> Result<Option<User>> {
    let found = conn
        .query_row(
            "
            SELECT u.id, u.email, s.last_seen_at
            FROM sessions s
            JOIN users u ON s.user_id = u.id
            WHERE s.token = ?1
            ",
            params![token],
            |row| {
                Ok((
                    User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    },
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((user, last_seen_at)) = found else {
        return Ok(None);
    };
    if now - last_seen_at > idle_seconds {
        delete_session(conn, token)?;
        return Ok(None);
    }
    conn.execute(
        "UPDATE sessions SET last_seen_at = ?1 WHERE token = ?2",
        params![now, token],
    )?;
    Ok(Some(user))
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn prune_sessions(conn: &Connection, user_id: i64, keep: i64) -> Result<()> {
    conn.execute(
        "
        DELETE FROM sessions
        WHERE user_id = ?1
          AND id NOT IN (
            SELECT id
            FROM sessions
            WHERE user_id = ?1
            ORDER BY last_seen_at DESC, id DESC
            LIMIT ?2
          )
        ",
        params![user_id, keep],
    )?;
    Ok(())
}

// Transactions. Every statement carries the owner predicate.

fn transaction_from_row(row: &Row<'_>) -> Result<TransactionRecord> {
    let kind: String = row.get(4)?;
    let status: String = row.get(7)?;
    Ok(TransactionRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        amount_cents: row.get(2)?,
        occurred_on: row.get(3)?,
        kind: Kind::parse(&kind).ok_or_else(|| invalid_column(4, kind.clone()))?,
        category: row.get(5)?,
        payment_method: row.get(6)?,
        status: Status::parse(&status).ok_or_else(|| invalid_column(7, status.clone()))?,
    })
}

fn invalid_column(index: usize, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unexpected value '{value}'").into(),
    )
}

pub fn insert_transaction(
    conn: &Connection,
    owner: &AuthorizationContext,
    input: &TransactionInput,
) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO transactions
            (user_id, name, amount_cents, kind, category, occurred_on, payment_method, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            owner.owner_id(),
            input.name,
            input.amount_cents,
            input.kind.as_str(),
            input.category,
            input.occurred_on,
            input.payment_method,
            input.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns the number of rows changed: zero when `id` belongs to someone else.
pub fn update_transaction(
    conn: &Connection,
    owner: &AuthorizationContext,
    id: i64,
    input: &TransactionInput,
) -> Result<usize> {
    conn.execute(
        "
        UPDATE transactions
        SET name = ?1, amount_cents = ?2, kind = ?3, category = ?4,
            occurred_on = ?5, payment_method = ?6, status = ?7
        WHERE id = ?8 AND user_id = ?9
        ",
        params![
            input.name,
            input.amount_cents,
            input.kind.as_str(),
            input.category,
            input.occurred_on,
            input.payment_method,
            input.status.as_str(),
            id,
            owner.owner_id(),
        ],
    )
}

pub fn delete_transaction(conn: &Connection, owner: &AuthorizationContext, id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![id, owner.owner_id()],
    )
}

pub fn find_transaction(
    conn: &Connection,
    owner: &AuthorizationContext,
    id: i64,
) -> Result<Option<TransactionRecord>> {
    conn.query_row(
        "
        SELECT id, name, amount_cents, occurred_on, kind, category, payment_method, status
        FROM transactions
        WHERE id = ?1 AND user_id = ?2
        ",
        params![id, owner.owner_id()],
        transaction_from_row,
    )
    .optional()
}

// Dashboard aggregates. Date bounds are inclusive days.

pub fn period_totals(conn: &Connection, user_id: i64, start: NaiveDate, end: NaiveDate) -> Result<Totals> {
    conn.query_row(
        "
        SELECT COALESCE(SUM(CASE WHEN kind = 'income' THEN amount_cents END), 0),
               COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount_cents END), 0)
        FROM transactions
        WHERE user_id = ?1 AND occurred_on BETWEEN ?2 AND ?3
        ",
        params![user_id, start, end],
        |row| {
            Ok(Totals {
                income_cents: row.get(0)?,
                expense_cents: row.get(1)?,
            })
        },
    )
}

pub fn planned_budget_total(conn: &Connection, user_id: i64, month: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM budgets WHERE user_id = ?1 AND month = ?2",
        params![user_id, month],
        |row| row.get(0),
    )
}

pub fn list_transactions(
    conn: &Connection,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, amount_cents, occurred_on, kind, category, payment_method, status
        FROM transactions
        WHERE user_id = ?1 AND occurred_on BETWEEN ?2 AND ?3
        ORDER BY occurred_on DESC, id DESC
        ",
    )?;
    let rows = stmt.query_map(params![user_id, start, end], transaction_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn cash_flow_by_category(
    conn: &Connection,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<CashFlowRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT category,
               COALESCE(SUM(CASE WHEN kind = 'income' THEN amount_cents END), 0) AS income_cents,
               COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount_cents END), 0) AS expense_cents
        FROM transactions
        WHERE user_id = ?1 AND occurred_on BETWEEN ?2 AND ?3
        GROUP BY category
        HAVING income_cents > 0 OR expense_cents > 0
        ORDER BY category
        ",
    )?;
    let rows = stmt.query_map(params![user_id, start, end], |row| {
        Ok(CashFlowRecord {
            category: row.get(0)?,
            income_cents: row.get(1)?,
            expense_cents: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn budget_detail(
    conn: &Connection,
    user_id: i64,
    month: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<BudgetDetailRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT b.category, b.amount_cents,
               COALESCE(SUM(t.amount_cents), 0) AS spent_cents
        FROM budgets b
        LEFT JOIN transactions t
            ON t.category = b.category
           AND t.user_id = b.user_id
           AND t.kind = 'expense'
           AND t.occurred_on BETWEEN ?3 AND ?4
        WHERE b.user_id = ?1 AND b.month = ?2
        GROUP BY b.id, b.category, b.amount_cents
        ORDER BY b.category
        ",
    )?;
    let rows = stmt.query_map(params![user_id, month, start, end], |row| {
        Ok(BudgetDetailRecord {
            category: row.get(0)?,
            planned_cents: row.get(1)?,
            spent_cents: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Budgets

pub fn upsert_budget(
    conn: &Connection,
    owner: &AuthorizationContext,
    category: &str,
    month: &str,
    amount_cents: i64,
) -> Result<()> {
    conn.execute(
        "
        INSERT INTO budgets (user_id, category, month, amount_cents)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(user_id, category, month) DO UPDATE SET amount_cents = excluded.amount_cents
        ",
        params![owner.owner_id(), category, month, amount_cents],
    )?;
    Ok(())
}

pub fn delete_budget(
    conn: &Connection,
    owner: &AuthorizationContext,
    category: &str,
    month: &str,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM budgets WHERE user_id = ?1 AND category = ?2 AND month = ?3",
        params![owner.owner_id(), category, month],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn temp_pool() -> (TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(&dir.path().join("test.sqlite")).unwrap();
        (dir, pool)
    }

    pub(crate) fn user(conn: &Connection, email: &str) -> AuthorizationContext {
        let id = insert_user(conn, email, "hash", "2024-01-01T00:00:00Z").unwrap();
        AuthorizationContext::new(id).unwrap()
    }

    pub(crate) fn input(kind: Kind, cents: i64, category: &str, on: &str) -> TransactionInput {
        TransactionInput {
            name: format!("{category} {on}"),
            amount_cents: cents,
            kind,
            category: category.to_string(),
            occurred_on: on.parse().unwrap(),
            payment_method: "PIX".to_string(),
            status: Status::Paid,
        }
    }

    fn day(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    #[test]
    fn listing_orders_by_date_then_id_descending() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        let first = insert_transaction(&conn, &owner, &input(Kind::Expense, 100, "Lazer", "2024-03-10")).unwrap();
        let second = insert_transaction(&conn, &owner, &input(Kind::Expense, 200, "Lazer", "2024-03-10")).unwrap();
        let older = insert_transaction(&conn, &owner, &input(Kind::Income, 300, "Salário", "2024-03-01")).unwrap();

        let listed = list_transactions(&conn, owner.owner_id(), day("2024-03-01"), day("2024-03-31")).unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second, first, older]);
    }

    #[test]
    fn aggregates_are_scoped_to_owner_and_window() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let alice = user(&conn, "alice@example.com");
        let bob = user(&conn, "bob@example.com");
        insert_transaction(&conn, &alice, &input(Kind::Income, 10000, "Salário", "2024-03-05")).unwrap();
        insert_transaction(&conn, &alice, &input(Kind::Expense, 4000, "Alimentação", "2024-03-31")).unwrap();
        insert_transaction(&conn, &alice, &input(Kind::Expense, 999, "Alimentação", "2024-04-01")).unwrap();
        insert_transaction(&conn, &bob, &input(Kind::Expense, 5000, "Alimentação", "2024-03-06")).unwrap();

        let (start, end) = (day("2024-03-01"), day("2024-03-31"));
        let totals = period_totals(&conn, alice.owner_id(), start, end).unwrap();
        assert_eq!(totals, Totals { income_cents: 10000, expense_cents: 4000 });

        let flow = cash_flow_by_category(&conn, alice.owner_id(), start, end).unwrap();
        let categories: Vec<&str> = flow.iter().map(|row| row.category.as_str()).collect();
        assert_eq!(categories, vec!["Alimentação", "Salário"]);
        assert_eq!(flow[0].expense_cents, 4000);
        assert_eq!(flow[1].income_cents, 10000);
    }

    #[test]
    fn cash_flow_skips_zero_activity_categories() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        insert_transaction(&conn, &owner, &input(Kind::Expense, 0, "Outros", "2024-03-05")).unwrap();
        insert_transaction(&conn, &owner, &input(Kind::Expense, 250, "Lazer", "2024-03-05")).unwrap();

        let flow = cash_flow_by_category(&conn, owner.owner_id(), day("2024-03-01"), day("2024-03-31")).unwrap();
        assert_eq!(flow.len(), 1);
        assert_eq!(flow[0].category, "Lazer");
    }

    #[test]
    fn budget_detail_zero_fills_missing_expenses() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        upsert_budget(&conn, &owner, "Alimentação", "2024-03", 20000).unwrap();
        upsert_budget(&conn, &owner, "Lazer", "2024-03", 5000).unwrap();
        insert_transaction(&conn, &owner, &input(Kind::Expense, 1500, "Lazer", "2024-03-02")).unwrap();
        insert_transaction(&conn, &owner, &input(Kind::Income, 7000, "Lazer", "2024-03-02")).unwrap();

        let detail = budget_detail(&conn, owner.owner_id(), "2024-03", day("2024-03-01"), day("2024-03-31")).unwrap();
        assert_eq!(detail.len(), 2);
        assert_eq!(detail[0].category, "Alimentação");
        assert_eq!(detail[0].planned_cents, 20000);
        assert_eq!(detail[0].spent_cents, 0);
        assert_eq!(detail[1].spent_cents, 1500);
    }

    #[test]
    fn upsert_keeps_one_entry_per_category_and_month() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        upsert_budget(&conn, &owner, "Lazer", "2024-03", 5000).unwrap();
        upsert_budget(&conn, &owner, "Lazer", "2024-03", 8000).unwrap();
        upsert_budget(&conn, &owner, "Lazer", "2024-04", 1000).unwrap();

        assert_eq!(planned_budget_total(&conn, owner.owner_id(), "2024-03").unwrap(), 8000);
        assert_eq!(planned_budget_total(&conn, owner.owner_id(), "2024-05").unwrap(), 0);
        assert_eq!(delete_budget(&conn, &owner, "Lazer", "2024-04").unwrap(), 1);
    }

    #[test]
    fn mutations_ignore_rows_of_other_owners() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let alice = user(&conn, "alice@example.com");
        let bob = user(&conn, "bob@example.com");
        let id = insert_transaction(&conn, &alice, &input(Kind::Expense, 100, "Lazer", "2024-03-05")).unwrap();

        assert_eq!(delete_transaction(&conn, &bob, id).unwrap(), 0);
        assert_eq!(update_transaction(&conn, &bob, id, &input(Kind::Income, 1, "Outros", "2024-01-01")).unwrap(), 0);
        assert!(find_transaction(&conn, &bob, id).unwrap().is_none());

        let kept = find_transaction(&conn, &alice, id).unwrap().unwrap();
        assert_eq!(kept.amount_cents, 100);
        assert_eq!(kept.kind, Kind::Expense);
        assert_eq!(delete_transaction(&conn, &alice, id).unwrap(), 1);
    }

    #[test]
    fn idle_sessions_expire() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        create_session(&conn, owner.owner_id(), "tok", "2024-01-01T00:00:00Z", 1_000).unwrap();

        let seen = touch_session(&conn, "tok", 1_500, 600).unwrap();
        assert_eq!(seen.map(|u| u.email), Some("a@example.com".to_string()));
        // last_seen moved to 1_500, so 2_000 is still inside the window
        assert!(touch_session(&conn, "tok", 2_000, 600).unwrap().is_some());
        assert!(touch_session(&conn, "tok", 2_601, 600).unwrap().is_none());
        assert!(touch_session(&conn, "tok", 2_602, 600).unwrap().is_none());
    }

    #[test]
    fn prune_keeps_most_recent_sessions() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let owner = user(&conn, "a@example.com");
        for (i, token) in ["t1", "t2", "t3"].iter().enumerate() {
            create_session(&conn, owner.owner_id(), token, "2024-01-01T00:00:00Z", i as i64).unwrap();
        }
        prune_sessions(&conn, owner.owner_id(), 2).unwrap();
        assert!(touch_session(&conn, "t1", 3, 600).unwrap().is_none());
        assert!(touch_session(&conn, "t3", 3, 600).unwrap().is_some());
    }
}
