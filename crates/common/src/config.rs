use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;

/// Default MySQL port.
const DEFAULT_DB_PORT: u16 = 3306;

/// Default pool size. One connection is pinned by the run lock for the
/// whole run, so this must stay at two or more.
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Default name of the notification ledger table.
const DEFAULT_LEDGER_TABLE: &str = "assignment_notifications";

/// Global application configuration loaded from environment variables.
///
/// Loaded once at process start and read-only afterwards; components get
/// the pieces they need at construction time.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database connection and table layout.
    pub storage: StorageConfig,

    /// Outbound SMTP settings.
    pub smtp: SmtpConfig,

    /// Base URL of the board web application, used for card deep links.
    pub deck_base_url: String,

    /// Append JSON logs to this file instead of stdout.
    pub log_file: Option<PathBuf>,
}

/// Everything needed to reach the board database and the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub database: DatabaseTarget,

    /// Maximum number of MySQL connections in the pool (default: 5)
    pub max_connections: u32,

    pub tables: TableNames,
}

/// How to reach the MySQL server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum DatabaseTarget {
    /// A full `mysql://` connection string (`DATABASE_URL`).
    Url(String),
    /// Discrete connection parameters (`DB_HOST`, `DB_USER`, ...).
    Parts {
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        database: String,
    },
}

/// Fully qualified table names, validated so they can be interpolated
/// into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableNames {
    /// Card assignments (`card_id`, `participant`).
    pub assignments: String,
    pub cards: String,
    pub stacks: String,
    pub boards: String,
    /// User table with `uid` and `email` columns.
    pub users: String,
    /// The notification ledger owned by this system.
    pub ledger: String,
}

/// Transport security used for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// TLS from the first byte (SMTPS).
    Ssl,
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// No encryption. Only for local relays.
    None,
}

/// Outbound SMTP settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    /// RFC 5322 "From" address.
    pub from: String,
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = StorageConfig::from_lookup(&lookup)?;
        let smtp = SmtpConfig::from_lookup(&lookup)?;

        let deck_base_url = required(&lookup, "DECK_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            storage,
            smtp,
            deck_base_url,
            log_file: log_file(&lookup),
        })
    }
}

/// `LOG_FILE` alone, for binaries that do not load the full [`AppConfig`].
pub fn log_file_from_env() -> Option<PathBuf> {
    dotenvy::dotenv().ok();
    log_file(&|key: &str| std::env::var(key).ok())
}

fn log_file<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    var(lookup, "LOG_FILE").map(PathBuf::from)
}

impl StorageConfig {
    /// Load only the storage settings. Used by the setup binary, which
    /// never talks to SMTP.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match var(lookup, "DATABASE_URL") {
            Some(url) => DatabaseTarget::Url(url),
            None => DatabaseTarget::Parts {
                host: required(lookup, "DB_HOST")?,
                port: parsed(lookup, "DB_PORT", DEFAULT_DB_PORT)?,
                user: required(lookup, "DB_USER")?,
                password: var(lookup, "DB_PASSWORD"),
                database: required(lookup, "DB_DATABASE")?,
            },
        };

        let max_connections = parsed(lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if max_connections < 2 {
            return Err(AppError::Config(
                "DB_MAX_CONNECTIONS must be at least 2".to_string(),
            ));
        }

        let prefix = var(lookup, "DB_PREFIX").unwrap_or_default();
        let tables = TableNames::new(
            &prefix,
            var(lookup, "USER_TABLE"),
            var(lookup, "ASSIGNMENT_TABLE"),
        )?;

        Ok(Self {
            database,
            max_connections,
            tables,
        })
    }
}

impl TableNames {
    /// Derive the board tables from `prefix` and validate every name.
    ///
    /// `users` defaults to `{prefix}users`; `ledger` defaults to
    /// `assignment_notifications` and is deliberately not prefixed.
    pub fn new(
        prefix: &str,
        users: Option<String>,
        ledger: Option<String>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            assignments: validate_identifier(format!("{prefix}deck_assigned_users"))?,
            cards: validate_identifier(format!("{prefix}deck_cards"))?,
            stacks: validate_identifier(format!("{prefix}deck_stacks"))?,
            boards: validate_identifier(format!("{prefix}deck_boards"))?,
            users: validate_identifier(users.unwrap_or_else(|| format!("{prefix}users")))?,
            ledger: validate_identifier(
                ledger.unwrap_or_else(|| DEFAULT_LEDGER_TABLE.to_string()),
            )?,
        })
    }
}

impl SmtpConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let security = match var(lookup, "SMTP_SECURITY") {
            Some(raw) => raw.parse()?,
            None => SmtpSecurity::Ssl,
        };

        Ok(Self {
            server: required(lookup, "SMTP_SERVER")?,
            port: parsed(lookup, "SMTP_PORT", security.default_port())?,
            security,
            username: var(lookup, "EMAIL_USERNAME"),
            password: var(lookup, "EMAIL_PASSWORD"),
            from: required(lookup, "EMAIL_FROM")?,
        })
    }
}

impl SmtpSecurity {
    /// Conventional port for this security mode.
    pub fn default_port(self) -> u16 {
        match self {
            SmtpSecurity::Ssl => 465,
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::None => 25,
        }
    }
}

impl FromStr for SmtpSecurity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ssl" | "tls" => Ok(SmtpSecurity::Ssl),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "none" | "plain" => Ok(SmtpSecurity::None),
            other => Err(AppError::Config(format!(
                "SMTP_SECURITY must be one of ssl, starttls, none (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpSecurity::Ssl => write!(f, "ssl"),
            SmtpSecurity::StartTls => write!(f, "starttls"),
            SmtpSecurity::None => write!(f, "none"),
        }
    }
}

/// Table names end up inside SQL text, so only plain identifiers are allowed.
fn validate_identifier(name: String) -> Result<String, AppError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(AppError::Config(format!(
            "Invalid table name '{name}': only [A-Za-z0-9_], at most 64 characters"
        )))
    }
}

fn var<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    var(lookup, key)
        .ok_or_else(|| AppError::Config(format!("{key} environment variable is required")))
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match var(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a valid number (got '{raw}')"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_HOST", "db.internal"),
            ("DB_USER", "nextcloud"),
            ("DB_PASSWORD", "s3cret"),
            ("DB_DATABASE", "nextcloud"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("EMAIL_FROM", "deck@example.com"),
            ("DECK_BASE_URL", "https://cloud.example.com/"),
        ]
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&minimal())).unwrap();

        assert_eq!(
            config.storage.database,
            DatabaseTarget::Parts {
                host: "db.internal".to_string(),
                port: 3306,
                user: "nextcloud".to_string(),
                password: Some("s3cret".to_string()),
                database: "nextcloud".to_string(),
            }
        );
        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.storage.tables.ledger, "assignment_notifications");
        assert_eq!(config.storage.tables.users, "users");
        assert_eq!(config.storage.tables.cards, "deck_cards");
        assert_eq!(config.smtp.security, SmtpSecurity::Ssl);
        assert_eq!(config.smtp.port, 465);
        assert!(config.smtp.username.is_none());
        assert_eq!(config.deck_base_url, "https://cloud.example.com");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_log_file_is_read_when_set() {
        let mut pairs = minimal();
        pairs.push(("LOG_FILE", " /var/log/deckmail/run.log "));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.log_file.as_deref(),
            Some(Path::new("/var/log/deckmail/run.log"))
        );
    }

    #[test]
    fn test_prefix_applies_to_board_tables_but_not_ledger() {
        let mut pairs = minimal();
        pairs.push(("DB_PREFIX", "oc_"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        let tables = config.storage.tables;

        assert_eq!(tables.assignments, "oc_deck_assigned_users");
        assert_eq!(tables.stacks, "oc_deck_stacks");
        assert_eq!(tables.boards, "oc_deck_boards");
        assert_eq!(tables.users, "oc_users");
        assert_eq!(tables.ledger, "assignment_notifications");
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let pairs = vec![
            ("DATABASE_URL", "mysql://u:p@localhost/nc"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("EMAIL_FROM", "deck@example.com"),
            ("DECK_BASE_URL", "https://cloud.example.com"),
        ];
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.storage.database,
            DatabaseTarget::Url("mysql://u:p@localhost/nc".to_string())
        );
    }

    #[test]
    fn test_starttls_default_port() {
        let mut pairs = minimal();
        pairs.push(("SMTP_SECURITY", "STARTTLS"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.smtp.security, SmtpSecurity::StartTls);
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn test_missing_smtp_server_is_config_error() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "SMTP_SERVER")
            .collect();
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("SMTP_SERVER"));
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let mut pairs = minimal();
        pairs.push(("USER_TABLE", "   "));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.storage.tables.users, "users");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut pairs = minimal();
        pairs.push(("SMTP_PORT", "smtp"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_single_connection_pool_rejected() {
        let mut pairs = minimal();
        pairs.push(("DB_MAX_CONNECTIONS", "1"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_table_name_injection_rejected() {
        let mut pairs = minimal();
        pairs.push(("ASSIGNMENT_TABLE", "notifications; DROP TABLE users"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_unknown_smtp_security_rejected() {
        assert!("smtps-ish".parse::<SmtpSecurity>().is_err());
        assert_eq!("tls".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::Ssl);
        assert_eq!(SmtpSecurity::None.to_string(), "none");
    }
}
