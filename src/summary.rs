//! Dashboard aggregation: five independent reads over one period, assembled
//! into the figures the dashboard renders.

use rocket::tokio::task;
use rusqlite::Connection;
use serde::Serialize;

use crate::auth::AuthorizationContext;
use crate::db::{self, DbPool};
use crate::error::AppResult;
use crate::models::{BudgetDetailRecord, CashFlowRecord, Totals, TransactionRecord};
use crate::money::format_money;
use crate::period::Period;

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: i64,
    pub name: String,
    pub amount: String,
    pub kind: &'static str,
    pub kind_label: &'static str,
    pub category: String,
    pub occurred_on: String,
    pub occurred_on_display: String,
    pub payment_method: String,
    pub status: &'static str,
    pub status_label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashFlowView {
    pub category: String,
    pub income: String,
    pub expense: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetView {
    pub category: String,
    pub planned: String,
    pub actual: String,
    pub remaining: String,
    pub percent: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_income: String,
    pub total_expense: String,
    pub balance: String,
    pub planned_budget: String,
    pub remaining_budget: String,
    pub transactions: Vec<TransactionView>,
    pub cash_flow: Vec<CashFlowView>,
    pub budgets: Vec<BudgetView>,
    /// `cash_flow` as JSON for the chart widget.
    pub cash_flow_json: String,
}

/// Raw query results before formatting.
#[derive(Debug, Clone, Default)]
pub struct SummaryParts {
    pub totals: Totals,
    pub planned_cents: i64,
    pub transactions: Vec<TransactionRecord>,
    pub cash_flow: Vec<CashFlowRecord>,
    pub budgets: Vec<BudgetDetailRecord>,
}

pub fn transaction_view(record: TransactionRecord) -> TransactionView {
    TransactionView {
        id: record.id,
        name: record.name,
        amount: format_money(record.amount_cents),
        kind: record.kind.as_str(),
        kind_label: record.kind.label(),
        category: record.category,
        occurred_on: record.occurred_on.format("%Y-%m-%d").to_string(),
        occurred_on_display: record.occurred_on.format("%d/%m/%Y").to_string(),
        payment_method: record.payment_method,
        status: record.status.as_str(),
        status_label: record.status.label(),
    }
}

fn cash_flow_view(record: CashFlowRecord) -> CashFlowView {
    CashFlowView {
        category: record.category,
        income: format_money(record.income_cents),
        expense: format_money(record.expense_cents),
    }
}

fn budget_view(record: BudgetDetailRecord) -> BudgetView {
    let percent = if record.planned_cents == 0 {
        0
    } else {
        ((record.spent_cents as f64 / record.planned_cents as f64) * 100.0).round() as i64
    };
    BudgetView {
        category: record.category,
        planned: format_money(record.planned_cents),
        actual: format_money(record.spent_cents),
        remaining: format_money(record.planned_cents - record.spent_cents),
        percent,
    }
}

impl DashboardSummary {
    pub fn empty() -> Self {
        Self::assemble(SummaryParts::default())
    }

    pub fn assemble(parts: SummaryParts) -> Self {
        let Totals {
            income_cents,
            expense_cents,
        } = parts.totals;
        let cash_flow = parts
            .cash_flow
            .into_iter()
            .map(cash_flow_view)
            .collect::<Vec<_>>();
        let cash_flow_json = serde_json::to_string(&cash_flow).unwrap_or_else(|_| "[]".to_string());

        DashboardSummary {
            total_income: format_money(income_cents),
            total_expense: format_money(expense_cents),
            balance: format_money(income_cents - expense_cents),
            planned_budget: format_money(parts.planned_cents),
            remaining_budget: format_money(parts.planned_cents - expense_cents),
            transactions: parts.transactions.into_iter().map(transaction_view).collect(),
            cash_flow,
            budgets: parts.budgets.into_iter().map(budget_view).collect(),
            cash_flow_json,
        }
    }
}

async fn run_blocking<T, F>(pool: &DbPool, query: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
{
    let pool = pool.clone();
    task::spawn_blocking(move || -> AppResult<T> {
        let conn = pool.get()?;
        Ok(query(&conn)?)
    })
    .await?
}

/// Issues the five aggregate reads concurrently. Any single failure fails the
/// whole set.
pub async fn fetch_parts(
    pool: &DbPool,
    owner: AuthorizationContext,
    period: &Period,
) -> AppResult<SummaryParts> {
    let user_id = owner.owner_id();
    let (start, end) = (period.start_date(), period.end_date());
    let planned_month = period.budget_month.clone();
    let detail_month = period.budget_month.clone();

    let (totals, planned_cents, transactions, cash_flow, budgets) = rocket::tokio::join!(
        run_blocking(pool, move |conn| db::period_totals(conn, user_id, start, end)),
        run_blocking(pool, move |conn| db::planned_budget_total(conn, user_id, &planned_month)),
        run_blocking(pool, move |conn| db::list_transactions(conn, user_id, start, end)),
        run_blocking(pool, move |conn| db::cash_flow_by_category(conn, user_id, start, end)),
        run_blocking(pool, move |conn| db::budget_detail(conn, user_id, &detail_month, start, end)),
    );

    Ok(SummaryParts {
        totals: totals?,
        planned_cents: planned_cents?,
        transactions: transactions?,
        cash_flow: cash_flow?,
        budgets: budgets?,
    })
}

/// Never fails: a data store error is logged and the dashboard shows zeros.
pub async fn load_summary(pool: &DbPool, owner: AuthorizationContext, period: &Period) -> DashboardSummary {
    match fetch_parts(pool, owner, period).await {
        Ok(parts) => DashboardSummary::assemble(parts),
        Err(err) => {
            log::error!(
                "dashboard aggregation failed for user {} ({}): {err}",
                owner.owner_id(),
                period.label
            );
            DashboardSummary::empty()
        }
    }
}
