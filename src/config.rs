use std::path::PathBuf;

use rocket::serde::Deserialize;

/// Application settings read from the same figment as Rocket's own
/// (`Rocket.toml`, `ROCKET_*` environment variables).
#[derive(Debug, Clone, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: i64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: i64,
}

fn default_database_path() -> PathBuf {
    let mut path = PathBuf::from("data");
    path.push("cashflow.sqlite");
    path
}

fn default_session_idle_minutes() -> i64 {
    10
}

fn default_max_sessions() -> i64 {
    5
}

impl AppConfig {
    pub fn session_idle_seconds(&self) -> i64 {
        self.session_idle_minutes * 60
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session_idle_minutes: default_session_idle_minutes(),
            max_sessions: default_max_sessions(),
        }
    }
}
