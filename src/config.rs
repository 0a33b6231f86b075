use std::env;
use std::path::PathBuf;

pub const DB_ENV: &str = "POSTULA_DB";
pub const SESSION_ENV: &str = "POSTULA_SESSION";

/// Where the database and the connected-wallet session live.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
}

impl Config {
    /// Environment first, then the platform data directory, then the
    /// current directory.
    pub fn from_env() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: env_path(DB_ENV).unwrap_or_else(|| data_dir.join("postula.db")),
            session_path: env_path(SESSION_ENV).unwrap_or_else(|| data_dir.join("session.json")),
        }
    }

    pub fn with_db_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.db_path = path;
        }
        self
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "postula")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
