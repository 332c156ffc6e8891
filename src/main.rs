#[macro_use]
extern crate rocket;

mod auth;
mod config;
mod db;
mod error;
mod filter;
mod models;
mod money;
mod period;
mod summary;

use auth::AuthorizationContext;
use chrono::{Local, NaiveDate};
use config::AppConfig;
use db::DbPool;
use error::{AppError, AppResult};
use filter::{FilterState, StatusMessage};
use models::{Catalog, Kind, Status, TransactionInput, User};
use rocket::fairing::{self, AdHoc};
use rocket::figment::Figment;
use rocket::form::{Contextual, Form};
use rocket::fs::{relative, FileServer};
use rocket::http::CookieJar;
use rocket::response::Redirect;
use rocket::serde::Serialize;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::Template;

#[derive(FromForm)]
struct CredentialsForm {
    email: String,
    password: String,
}

#[derive(FromForm)]
struct TransactionForm {
    id: Option<i64>,
    name: String,
    amount: String,
    kind: String,
    category: String,
    transaction_date: String,
    payment_method: String,
    status: String,
}

#[derive(FromForm)]
struct DeleteTransactionForm {
    id: i64,
}

#[derive(FromForm)]
struct BudgetForm {
    category: String,
    month: String,
    amount: Option<String>,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct FilterOption {
    value: &'static str,
    label: &'static str,
}

const FILTER_OPTIONS: [FilterOption; 5] = [
    FilterOption { value: "current_month", label: "Mês atual" },
    FilterOption { value: "7_days", label: "Últimos 7 dias" },
    FilterOption { value: "30_days", label: "Últimos 30 dias" },
    FilterOption { value: "12_months", label: "Últimos 12 meses" },
    FilterOption { value: "all_time", label: "Todo o período" },
];

/// Whether a create must reject zero. Updates keep whatever parses.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AmountRule {
    Positive,
    AsSubmitted,
}

impl TransactionForm {
    fn validated(&self, catalog: &Catalog, rule: AmountRule) -> AppResult<TransactionInput> {
        let amount_cents = match rule {
            AmountRule::Positive => money::positive_amount(&self.amount)?,
            AmountRule::AsSubmitted => money::parse_amount_to_cents(&self.amount).ok_or_else(|| {
                AppError::Unstorable(format!("amount '{}' is not numeric", self.amount))
            })?,
        };
        let kind = Kind::parse(&self.kind)
            .ok_or_else(|| AppError::Validation("Tipo de transação inválido.".to_string()))?;
        let status = Status::parse(&self.status)
            .ok_or_else(|| AppError::Validation("Status inválido.".to_string()))?;
        let occurred_on = if self.transaction_date.trim().is_empty() {
            today()
        } else {
            NaiveDate::parse_from_str(self.transaction_date.trim(), "%Y-%m-%d")
                .map_err(|_| AppError::Validation("Data da transação inválida.".to_string()))?
        };
        Ok(TransactionInput {
            name: self.name.trim().to_string(),
            amount_cents,
            kind,
            category: catalog.category(&self.category)?,
            occurred_on,
            payment_method: catalog.payment_method(&self.payment_method)?,
            status,
        })
    }
}

impl BudgetForm {
    /// Category, normalized `YYYY-MM` month and planned cents.
    fn validated(&self, catalog: &Catalog) -> AppResult<(String, String, i64)> {
        let category = catalog.category(&self.category)?;
        let (year, month) = period::parse_year_month(self.month.trim())
            .map_err(|_| AppError::Validation("Mês do orçamento inválido.".to_string()))?;
        let amount_cents = money::positive_amount(self.amount.as_deref().unwrap_or_default())?;
        Ok((category, format!("{year:04}-{month:02}"), amount_cents))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn current_user(pool: &DbPool, config: &AppConfig, cookies: &CookieJar<'_>) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    auth::session_user(&conn, config, cookies)
}

/// Session user and owner context, or the redirect that replaces them.
fn require_user(
    pool: &DbPool,
    config: &AppConfig,
    cookies: &CookieJar<'_>,
    filter: &FilterState,
) -> Result<(User, AuthorizationContext), Redirect> {
    let user = match current_user(pool, config, cookies) {
        Ok(Some(user)) => user,
        Ok(None) => {
            let message = StatusMessage::error("Faça login para continuar.");
            return Err(Redirect::to(filter.dashboard_uri(Some(&message))));
        }
        Err(err) => {
            log::error!("session lookup failed: {err}");
            return Err(Redirect::to(filter.dashboard_uri(Some(&StatusMessage::from(&err)))));
        }
    };
    match AuthorizationContext::for_user(&user) {
        Ok(owner) => Ok((user, owner)),
        Err(err) => {
            log::warn!("rejected owner context for user {}: {err}", user.id);
            Err(Redirect::to(filter.dashboard_uri(Some(&StatusMessage::from(&err)))))
        }
    }
}

fn require_owner(
    pool: &DbPool,
    config: &AppConfig,
    cookies: &CookieJar<'_>,
    filter: &FilterState,
) -> Result<AuthorizationContext, Redirect> {
    require_user(pool, config, cookies, filter).map(|(_, owner)| owner)
}

/// Splits a submitted mutation into the period selection, read from the raw
/// fields, and the parsed form. A body that fails to parse still yields the
/// selection so the redirect can keep it.
fn submitted<'v, T>(form: Form<Contextual<'v, T>>) -> (FilterState, AppResult<T>)
where
    T: rocket::form::FromForm<'v>,
{
    let form = form.into_inner();
    let filter = FilterState::new(
        form.context.field_value("current_filter"),
        form.context.field_value("month_year_filter"),
    );
    let value = form.value.ok_or_else(|| {
        let fields = form
            .context
            .errors()
            .filter_map(|err| err.name.as_ref().map(|name| name.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        log::warn!("malformed form fields: [{fields}]");
        AppError::Validation("Preencha todos os campos corretamente.".to_string())
    });
    (filter, value)
}

/// Redirect back to the dashboard with the period selection intact. User
/// input errors are echoed; data store errors get the generic `failure` text.
fn mutation_redirect(filter: &FilterState, outcome: AppResult<()>, success: &str, failure: &str) -> Redirect {
    let message = match outcome {
        Ok(()) => StatusMessage::notice(success),
        Err(err @ (AppError::Validation(_) | AppError::Authentication(_))) => {
            log::warn!("{failure} {err}");
            StatusMessage::from(&err)
        }
        Err(err @ AppError::Unstorable(_)) => {
            log::warn!("{failure} {err}");
            StatusMessage::error(failure)
        }
        Err(err) => {
            log::error!("{failure} {err}");
            StatusMessage::error(failure)
        }
    };
    Redirect::to(filter.dashboard_uri(Some(&message)))
}

fn message_context(msg: Option<String>, err: Option<String>) -> (Option<String>, &'static str) {
    match (msg.filter(|m| !m.is_empty()), err.filter(|e| !e.is_empty())) {
        (Some(msg), _) => (Some(msg), "notice"),
        (None, Some(err)) => (Some(err), "error"),
        (None, None) => (None, "notice"),
    }
}

#[get("/")]
fn index() -> Redirect {
    Redirect::to(filter::DASHBOARD)
}

#[get("/login")]
fn login() -> Redirect {
    Redirect::to(filter::DASHBOARD)
}

#[get("/register")]
fn register() -> Redirect {
    Redirect::to(filter::DASHBOARD)
}

#[post("/register", data = "<form>")]
fn register_post(pool: &State<DbPool>, form: Form<CredentialsForm>) -> Redirect {
    let form = form.into_inner();
    let outcome = pool
        .get()
        .map_err(AppError::from)
        .and_then(|conn| auth::register(&conn, &form.email, &form.password));
    let message = match outcome {
        Ok(user_id) => {
            log::info!("registered user {user_id}");
            StatusMessage::notice("Conta criada com sucesso! Faça o login.")
        }
        Err(err @ (AppError::Validation(_) | AppError::Authentication(_))) => {
            log::warn!("registration rejected: {err}");
            StatusMessage::from(&err)
        }
        Err(err) => {
            log::error!("registration failed: {err}");
            StatusMessage::error("Ocorreu um erro interno. Tente novamente.")
        }
    };
    Redirect::to(FilterState::default().dashboard_uri(Some(&message)))
}

#[post("/login", data = "<form>")]
fn login_post(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Form<CredentialsForm>,
) -> Redirect {
    let form = form.into_inner();
    let outcome = pool
        .get()
        .map_err(AppError::from)
        .and_then(|conn| auth::login(&conn, config, &form.email, &form.password));
    match outcome {
        Ok(token) => {
            auth::set_session_cookie(cookies, token);
            log::info!("login succeeded");
            Redirect::to(filter::DASHBOARD)
        }
        Err(err) => {
            match &err {
                AppError::Authentication(_) => log::warn!("login rejected: {err}"),
                _ => log::error!("login failed: {err}"),
            }
            Redirect::to(FilterState::default().dashboard_uri(Some(&StatusMessage::from(&err))))
        }
    }
}

#[post("/logout")]
fn logout(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Redirect {
    if let Some(cookie) = cookies.get(auth::SESSION_COOKIE) {
        let token = cookie.value().to_string();
        match pool.get() {
            Ok(conn) => {
                if let Err(err) = db::delete_session(&conn, &token) {
                    log::error!("failed to delete session: {err}");
                }
            }
            Err(err) => log::error!("failed to delete session: {err}"),
        }
    }
    auth::clear_session_cookie(cookies);
    Redirect::to(
        FilterState::default()
            .dashboard_uri(Some(&StatusMessage::notice("Logout realizado com sucesso."))),
    )
}

#[get("/dashboard?<period_filter>&<month_year_filter>&<msg>&<err>")]
async fn dashboard(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    catalog: &State<Catalog>,
    cookies: &CookieJar<'_>,
    period_filter: Option<String>,
    month_year_filter: Option<String>,
    msg: Option<String>,
    err: Option<String>,
) -> Result<Template, Redirect> {
    let (message, message_kind) = message_context(msg, err);
    let user = match current_user(pool, config, cookies) {
        Ok(user) => user,
        Err(err) => {
            log::error!("session lookup failed: {err}");
            None
        }
    };
    let Some(user) = user else {
        return Ok(Template::render(
            "dashboard",
            serde_json::json!({
                "user": null,
                "message": message,
                "message_kind": message_kind,
            }),
        ));
    };

    let period = period::resolve(month_year_filter.as_deref(), period_filter.as_deref(), today())
        .map_err(|err| {
            log::warn!("dashboard filter rejected: {err}");
            Redirect::to(FilterState::default().dashboard_uri(Some(&StatusMessage::from(&err))))
        })?;
    let owner = AuthorizationContext::for_user(&user).map_err(|err| {
        Redirect::to(FilterState::default().dashboard_uri(Some(&StatusMessage::from(&err))))
    })?;
    let summary = summary::load_summary(pool.inner(), owner, &period).await;
    let state = FilterState::from_period(&period);
    let current_filter = state.period_filter.unwrap_or_default();

    let context = serde_json::json!({
        "user": user,
        "message": message,
        "message_kind": message_kind,
        "period_label": period.label,
        "current_filter": current_filter,
        "current_month_year": period.selected_month,
        "month_year_filter": state.month_year_filter.unwrap_or_default(),
        "budget_month": period.budget_month,
        "filters": FILTER_OPTIONS,
        "summary": summary,
        "catalog": catalog.inner(),
        "transaction": null,
        "form_action": "/transactions",
        "submit_label": "Adicionar",
        "today": today().format("%Y-%m-%d").to_string(),
    });
    Ok(Template::render("dashboard", &context))
}

#[post("/transactions", data = "<form>")]
fn create_transaction<'r>(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    catalog: &State<Catalog>,
    cookies: &CookieJar<'_>,
    form: Form<Contextual<'r, TransactionForm>>,
) -> Redirect {
    let (filter, form) = submitted(form);
    let owner = match require_owner(pool, config, cookies, &filter) {
        Ok(owner) => owner,
        Err(redirect) => return redirect,
    };
    let outcome = form
        .and_then(|form| form.validated(catalog, AmountRule::Positive))
        .and_then(|input| {
            let conn = pool.get()?;
            let id = db::insert_transaction(&conn, &owner, &input)?;
            log::info!("user {} created transaction {id}", owner.owner_id());
            Ok(())
        });
    mutation_redirect(
        &filter,
        outcome,
        "Transação adicionada com sucesso!",
        "Falha ao adicionar transação.",
    )
}

#[get("/transactions/edit/<id>?<filter>&<month_filter>")]
fn edit_transaction(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    catalog: &State<Catalog>,
    cookies: &CookieJar<'_>,
    id: i64,
    filter: Option<String>,
    month_filter: Option<String>,
) -> Result<Template, Redirect> {
    let state = FilterState::new(filter.as_deref(), month_filter.as_deref());
    let (user, owner) = require_user(pool, config, cookies, &state)?;
    let found = pool
        .get()
        .map_err(AppError::from)
        .and_then(|conn| Ok(db::find_transaction(&conn, &owner, id)?));
    let record = match found {
        Ok(Some(record)) => record,
        Ok(None) => {
            let message = StatusMessage::error("Transação não encontrada.");
            return Err(Redirect::to(state.dashboard_uri(Some(&message))));
        }
        Err(err) => {
            log::error!("failed to load transaction {id}: {err}");
            let message = StatusMessage::error("Falha ao carregar dados de edição.");
            return Err(Redirect::to(state.dashboard_uri(Some(&message))));
        }
    };

    let context = serde_json::json!({
        "user": user,
        "message": null,
        "message_kind": "notice",
        "transaction": summary::transaction_view(record),
        "catalog": catalog.inner(),
        "current_filter": state.period_filter.clone().unwrap_or_else(|| "current_month".to_string()),
        "month_year_filter": state.month_year_filter.clone().unwrap_or_default(),
        "form_action": "/transactions/edit",
        "submit_label": "Salvar",
        "back_uri": state.dashboard_uri(None),
        "today": today().format("%Y-%m-%d").to_string(),
    });
    Ok(Template::render("edit_transaction", &context))
}

#[post("/transactions/edit", data = "<form>")]
fn update_transaction<'r>(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    catalog: &State<Catalog>,
    cookies: &CookieJar<'_>,
    form: Form<Contextual<'r, TransactionForm>>,
) -> Redirect {
    let (filter, form) = submitted(form);
    let owner = match require_owner(pool, config, cookies, &filter) {
        Ok(owner) => owner,
        Err(redirect) => return redirect,
    };
    let outcome = form
        .and_then(|form| {
            let id = form
                .id
                .ok_or_else(|| AppError::Validation("Transação não informada.".to_string()))?;
            Ok((id, form.validated(catalog, AmountRule::AsSubmitted)?))
        })
        .and_then(|(id, input)| {
            let conn = pool.get()?;
            let changed = db::update_transaction(&conn, &owner, id, &input)?;
            log::info!("user {} updated transaction {id} ({changed} rows)", owner.owner_id());
            Ok(())
        });
    mutation_redirect(
        &filter,
        outcome,
        "Transação atualizada com sucesso!",
        "Falha ao atualizar transação.",
    )
}

#[post("/transactions/delete", data = "<form>")]
fn delete_transaction<'r>(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Form<Contextual<'r, DeleteTransactionForm>>,
) -> Redirect {
    let (filter, form) = submitted(form);
    let owner = match require_owner(pool, config, cookies, &filter) {
        Ok(owner) => owner,
        Err(redirect) => return redirect,
    };
    let outcome = form.and_then(|form| {
        let conn = pool.get()?;
        let removed = db::delete_transaction(&conn, &owner, form.id)?;
        log::info!("user {} deleted transaction {} ({removed} rows)", owner.owner_id(), form.id);
        Ok(())
    });
    mutation_redirect(
        &filter,
        outcome,
        "Transação removida com sucesso!",
        "Falha ao remover transação.",
    )
}

#[post("/budgets", data = "<form>")]
fn save_budget<'r>(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    catalog: &State<Catalog>,
    cookies: &CookieJar<'_>,
    form: Form<Contextual<'r, BudgetForm>>,
) -> Redirect {
    let (filter, form) = submitted(form);
    let owner = match require_owner(pool, config, cookies, &filter) {
        Ok(owner) => owner,
        Err(redirect) => return redirect,
    };
    let outcome = form
        .and_then(|form| form.validated(catalog))
        .and_then(|(category, month, amount_cents)| {
            let conn = pool.get()?;
            db::upsert_budget(&conn, &owner, &category, &month, amount_cents)?;
            Ok(())
        });
    mutation_redirect(&filter, outcome, "Orçamento salvo com sucesso!", "Falha ao salvar orçamento.")
}

#[post("/budgets/delete", data = "<form>")]
fn delete_budget<'r>(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Form<Contextual<'r, BudgetForm>>,
) -> Redirect {
    let (filter, form) = submitted(form);
    let owner = match require_owner(pool, config, cookies, &filter) {
        Ok(owner) => owner,
        Err(redirect) => return redirect,
    };
    let outcome = form.and_then(|form| {
        let conn = pool.get()?;
        db::delete_budget(&conn, &owner, form.category.trim(), form.month.trim())?;
        Ok(())
    });
    mutation_redirect(&filter, outcome, "Orçamento removido com sucesso!", "Falha ao remover orçamento.")
}

async fn init_database(rocket: Rocket<Build>) -> fairing::Result {
    let config: AppConfig = match rocket.figment().extract() {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid application config: {err}");
            return Err(rocket);
        }
    };
    if let Some(dir) = config.database_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(dir) {
            log::error!("failed to create {}: {err}", dir.display());
            return Err(rocket);
        }
    }
    match db::init_db(&config.database_path) {
        Ok(pool) => {
            log::info!("database ready at {}", config.database_path.display());
            Ok(rocket.manage(pool).manage(config))
        }
        Err(err) => {
            log::error!("failed to open {}: {err}", config.database_path.display());
            Err(rocket)
        }
    }
}

fn build(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(Catalog::default())
        .attach(AdHoc::try_on_ignite("Database", init_database))
        .mount(
            "/",
            routes![
                index,
                login,
                login_post,
                register,
                register_post,
                logout,
                dashboard,
                create_transaction,
                edit_transaction,
                update_transaction,
                delete_transaction,
                save_budget,
                delete_budget
            ],
        )
        .mount("/static", FileServer::from(relative!("static")))
        .attach(Template::fairing())
}

#[launch]
fn rocket() -> _ {
    build(rocket::Config::figment())
}
