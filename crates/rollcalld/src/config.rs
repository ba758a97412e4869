use rollcall_core::enroll::EmailPolicy;
use rollcall_core::EnrollPolicy;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory receiving one capture subdirectory per enrolled student.
    pub captures_dir: PathBuf,
    /// Whether unknown ids at ingest are enrolled on the fly (default) or
    /// dropped with a warning.
    pub auto_enroll: bool,
    /// Email-domain allow-list for enrollment; `None` allows all.
    pub allowed_email_domains: Option<Vec<String>>,
    /// Optional TOML roster seed file loaded at startup.
    pub roster_seed: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let captures_dir = std::env::var("ROLLCALL_CAPTURES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("captures"));

        Self {
            db_path,
            captures_dir,
            auto_enroll: env_bool("ROLLCALL_AUTO_ENROLL", true),
            allowed_email_domains: env_list("ROLLCALL_ALLOWED_EMAIL_DOMAINS"),
            roster_seed: std::env::var("ROLLCALL_ROSTER_SEED").ok().map(PathBuf::from),
        }
    }

    pub fn enroll_policy(&self) -> EnrollPolicy {
        if self.auto_enroll {
            EnrollPolicy::AutoEnroll
        } else {
            EnrollPolicy::Strict
        }
    }

    pub fn email_policy(&self) -> EmailPolicy {
        match &self.allowed_email_domains {
            Some(domains) => EmailPolicy::restrict_to(domains.clone()),
            None => EmailPolicy::allow_all(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

/// Comma-separated list; unset or empty means `None`.
fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
