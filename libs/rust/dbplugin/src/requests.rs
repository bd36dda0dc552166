//! Request and response types of the plugin contract.
//!
//! Passwords deserialize straight into [`SecretString`] and are never
//! serialized back out.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Free-form plugin configuration as delivered by the host.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Metadata the username template is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameMetadata {
    /// Display name of the token or entity requesting credentials
    #[serde(default)]
    pub display_name: String,
    /// Name of the role the credentials are issued for
    #[serde(default)]
    pub role_name: String,
}

impl UsernameMetadata {
    /// Create metadata from a display name and role name.
    #[must_use]
    pub fn new(display_name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            role_name: role_name.into(),
        }
    }
}

/// Ordered raw statement templates supplied for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statements {
    /// Statement templates, each possibly holding several `;`-separated statements
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Statements {
    /// Build a statement set from anything yielding strings.
    #[must_use]
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether no statements were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Initialize (or re-initialize) the plugin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeRequest {
    /// Plugin configuration
    #[serde(default)]
    pub config: ConfigMap,
    /// Whether to check connectivity before returning
    #[serde(default)]
    pub verify_connection: bool,
}

/// Result of a successful initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitializeResponse {
    /// Configuration the host should persist, with connection secrets lifted out of the URL
    pub config: ConfigMap,
}

/// Create a new database account.
#[derive(Debug, Deserialize)]
pub struct NewUserRequest {
    /// Metadata for username generation
    #[serde(default)]
    pub username_config: UsernameMetadata,
    /// Creation statements
    #[serde(default)]
    pub statements: Statements,
    /// Initial password of the account
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// When the host will revoke the account
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl NewUserRequest {
    /// Build a request without expiration.
    #[must_use]
    pub fn new(
        username_config: UsernameMetadata,
        statements: Statements,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username_config,
            statements,
            password: SecretString::from(password.into()),
            expiration: None,
        }
    }

    /// Set the expiration.
    #[must_use]
    pub const fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// Result of a successful account creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUserResponse {
    /// Generated account name
    pub username: String,
}

/// Password change part of an update.
#[derive(Debug, Deserialize)]
pub struct ChangePassword {
    /// Password to set
    #[serde(deserialize_with = "deserialize_secret")]
    pub new_password: SecretString,
    /// Rotation statements
    #[serde(default)]
    pub statements: Statements,
}

impl ChangePassword {
    /// Build a password change.
    #[must_use]
    pub fn new(new_password: impl Into<String>, statements: Statements) -> Self {
        Self {
            new_password: SecretString::from(new_password.into()),
            statements,
        }
    }
}

/// Rotate the password of an existing account.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    /// Account to update
    #[serde(default)]
    pub username: String,
    /// Requested password change
    #[serde(default)]
    pub password: Option<ChangePassword>,
}

impl UpdateUserRequest {
    /// Build a password rotation request.
    #[must_use]
    pub fn new(username: impl Into<String>, password: Option<ChangePassword>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateUserResponse {}

/// Revoke an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteUserRequest {
    /// Account to remove
    #[serde(default)]
    pub username: String,
    /// Revocation statements
    #[serde(default)]
    pub statements: Statements,
}

impl DeleteUserRequest {
    /// Build a revocation request.
    #[must_use]
    pub fn new(username: impl Into<String>, statements: Statements) -> Self {
        Self {
            username: username.into(),
            statements,
        }
    }
}

/// Result of a successful revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteUserResponse {}
