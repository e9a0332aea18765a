//! Reconciliation configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIREBASE_PROJECT_ID` - Project hosting the document store and auth provider
//! - `FIREBASE_API_KEY` - Web API key used for operator sign-in
//! - `OPERATOR_EMAIL` - Operator account email
//! - `OPERATOR_PASSWORD` - Operator account password
//!
//! ## Optional
//! - `FIRESTORE_DATABASE` - Database ID (default: `(default)`)
//! - `FIRESTORE_EMULATOR_HOST` - `host:port` of a local store emulator
//! - `FIREBASE_AUTH_EMULATOR_HOST` - `host:port` of a local auth emulator
//! - `USERS_COLLECTION` - Users collection (default: `Users`)
//! - `ORDERS_COLLECTION` - Orders collection (default: `Orders`)
//! - `USER_AUTH_ID_FIELD` - User field holding the auth identifier (default: `authId`)
//! - `USER_EMAIL_FIELD` - User email field (default: `email`)
//! - `USER_DISPLAY_NAME_FIELD` - User display name field (default: `displayName`)
//! - `ORDER_USER_REF_FIELD` - Order field referencing the user (default: `userRef`)
//! - `LEGACY_KEY_PREFIXES` - Comma-separated prefixes of locally generated user keys
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use freightdesk_core::{Email, RecordLayout};
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_DATABASE: &str = "(default)";
const DEFAULT_USERS_COLLECTION: &str = "Users";
const DEFAULT_ORDERS_COLLECTION: &str = "Orders";

/// Key prefixes produced by the pre-auth signup flow and admin seeding.
pub const DEFAULT_LEGACY_KEY_PREFIXES: &[&str] = &["user_", "user-", "local_", "legacy_", "tmp_"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Full configuration for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Hosted store and auth endpoints
    pub firebase: FirebaseConfig,
    /// Operator credentials
    pub operator: OperatorCredentials,
    /// Collection names and field layout
    pub collections: CollectionConfig,
    /// Prefixes that mark a storage key as locally generated
    pub legacy_key_prefixes: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Emit JSON logs
    pub json_logs: bool,
}

/// Project and endpoint settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Project ID
    pub project_id: String,
    /// Database ID within the project
    pub database: String,
    /// Web API key
    pub api_key: SecretString,
    /// `host:port` of a store emulator, if any
    pub firestore_emulator_host: Option<String>,
    /// `host:port` of an auth emulator, if any
    pub auth_emulator_host: Option<String>,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("api_key", &"[REDACTED]")
            .field("firestore_emulator_host", &self.firestore_emulator_host)
            .field("auth_emulator_host", &self.auth_emulator_host)
            .finish()
    }
}

/// Operator sign-in credentials.
#[derive(Clone)]
pub struct OperatorCredentials {
    pub email: Email,
    pub password: SecretString,
}

impl std::fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Where user and order documents live and how to read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub users: String,
    pub orders: String,
    pub layout: RecordLayout,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS_COLLECTION.to_owned(),
            orders: DEFAULT_ORDERS_COLLECTION.to_owned(),
            layout: RecordLayout::default(),
        }
    }
}

impl ReconcileConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let firebase = FirebaseConfig::from_env()?;
        let operator = OperatorCredentials::from_env()?;
        let collections = CollectionConfig::from_env()?;
        let legacy_key_prefixes = get_optional_env("LEGACY_KEY_PREFIXES").map_or_else(
            || {
                DEFAULT_LEGACY_KEY_PREFIXES
                    .iter()
                    .map(|p| (*p).to_owned())
                    .collect()
            },
            |raw| parse_list(&raw),
        );

        Ok(Self {
            firebase,
            operator,
            collections,
            legacy_key_prefixes,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            json_logs: get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

impl FirebaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: get_required_env("FIREBASE_PROJECT_ID")?,
            database: get_env_or_default("FIRESTORE_DATABASE", DEFAULT_DATABASE),
            api_key: get_required_secret("FIREBASE_API_KEY")?,
            firestore_emulator_host: get_optional_env("FIRESTORE_EMULATOR_HOST"),
            auth_emulator_host: get_optional_env("FIREBASE_AUTH_EMULATOR_HOST"),
        })
    }
}

impl OperatorCredentials {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_email = get_required_env("OPERATOR_EMAIL")?;
        let email = Email::parse(&raw_email)
            .map_err(|e| ConfigError::InvalidEnvVar("OPERATOR_EMAIL".to_owned(), e.to_string()))?;

        Ok(Self {
            email,
            password: get_required_secret("OPERATOR_PASSWORD")?,
        })
    }
}

impl CollectionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = RecordLayout::default();
        Ok(Self {
            users: get_identifier_env("USERS_COLLECTION", DEFAULT_USERS_COLLECTION)?,
            orders: get_identifier_env("ORDERS_COLLECTION", DEFAULT_ORDERS_COLLECTION)?,
            layout: RecordLayout {
                auth_id_field: get_identifier_env("USER_AUTH_ID_FIELD", &defaults.auth_id_field)?,
                email_field: get_identifier_env("USER_EMAIL_FIELD", &defaults.email_field)?,
                display_name_field: get_identifier_env(
                    "USER_DISPLAY_NAME_FIELD",
                    &defaults.display_name_field,
                )?,
                user_ref_field: get_identifier_env(
                    "ORDER_USER_REF_FIELD",
                    &defaults.user_ref_field,
                )?,
            },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    get_required_env(key).map(SecretString::from)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_owned())
}

/// Get a collection or field name, rejecting values containing path separators.
fn get_identifier_env(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = get_env_or_default(key, default);
    validate_identifier(&value).map_err(|msg| ConfigError::InvalidEnvVar(key.to_owned(), msg))?;
    Ok(value)
}

fn validate_identifier(value: &str) -> Result<(), String> {
    if value.contains('/') {
        return Err(format!("'{value}' must not contain '/'"));
    }
    if value.trim() != value {
        return Err(format!("'{value}' must not have surrounding whitespace"));
    }
    Ok(())
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
