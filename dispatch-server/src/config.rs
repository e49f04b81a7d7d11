use dispatch_core::Responder;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "emergencies.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const DEFAULT_MAX_PAGE_LIMIT: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub bind: String,
    pub paging: Paging,
    /// JSON array of responder accounts upserted at startup.
    pub accounts_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_PAGE_LIMIT,
        }
    }
}

impl Paging {
    /// Missing or zero falls back to the default; anything else is clamped.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u32| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        let default_limit = number("DISPATCH_PAGE_LIMIT", DEFAULT_PAGE_LIMIT);
        let max_limit = number("DISPATCH_MAX_PAGE_LIMIT", DEFAULT_MAX_PAGE_LIMIT).max(default_limit);

        Self {
            db_path: non_empty("DISPATCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            bind: non_empty("DISPATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.into()),
            paging: Paging {
                default_limit,
                max_limit,
            },
            accounts_file: non_empty("DISPATCH_ACCOUNTS_FILE").map(PathBuf::from),
        }
    }
}

pub fn load_accounts(path: &Path) -> Result<Vec<Responder>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid accounts file {}: {e}", path.display()))
}
