use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Local, Utc};
use password_hash::SaltString;
use rand_core::OsRng;
use rocket::http::{Cookie, CookieJar, SameSite};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::User;

pub const SESSION_COOKIE: &str = "session";
const MIN_PASSWORD_LEN: usize = 6;

/// The identity every owned read and write is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationContext {
    owner_id: i64,
}

impl AuthorizationContext {
    pub fn new(owner_id: i64) -> AppResult<Self> {
        if owner_id <= 0 {
            return Err(AppError::Authorization);
        }
        Ok(Self { owner_id })
    }

    pub fn for_user(user: &User) -> AppResult<Self> {
        Self::new(user.id)
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::DataStore(format!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn register(conn: &Connection, email: &str, password: &str) -> AppResult<i64> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::Validation("Informe um email.".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "A senha deve ter pelo menos 6 caracteres.".to_string(),
        ));
    }
    if db::email_exists(conn, &email)? {
        return Err(AppError::Authentication(
            "Este email já está registrado. Tente fazer login.".to_string(),
        ));
    }
    let password_hash = hash_password(password)?;
    let created_at = Local::now().to_rfc3339();
    Ok(db::insert_user(conn, &email, &password_hash, &created_at)?)
}

/// Checks credentials and opens a session. Returns the session token.
pub fn login(conn: &Connection, config: &AppConfig, email: &str, password: &str) -> AppResult<String> {
    let rejected = || AppError::Authentication("Email ou senha incorretos.".to_string());
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(rejected());
    }
    let Some((user_id, hash)) = db::user_credentials(conn, &email)? else {
        return Err(rejected());
    };
    if !verify_password(&hash, password) {
        return Err(rejected());
    }

    let token = Uuid::new_v4().to_string();
    db::create_session(conn, user_id, &token, &Local::now().to_rfc3339(), Utc::now().timestamp())?;
    db::prune_sessions(conn, user_id, config.max_sessions)?;
    Ok(token)
}

pub fn session_user(conn: &Connection, config: &AppConfig, cookies: &CookieJar<'_>) -> AppResult<Option<User>> {
    let Some(cookie) = cookies.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let user = db::touch_session(
        conn,
        cookie.value(),
        Utc::now().timestamp(),
        config.session_idle_seconds(),
    )?;
    if user.is_none() {
        clear_session_cookie(cookies);
    }
    Ok(user)
}

pub fn set_session_cookie(cookies: &CookieJar<'_>, token: String) {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookies.add(cookie);
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);
}
