//! Test fixtures with sample data.
//!
//! Statement sets mirror what operators configure on a ClickHouse role.

use dbplugin::{ConfigMap, Statements};
use serde_json::{Value, json};

/// Administrative password used by fixture configurations.
pub const ADMIN_PASSWORD: &str = "clickhouse-admin-pw";

/// Creation statements using `{{username}}`.
pub const CREATE_STATEMENTS: &str = r#"CREATE USER "{{username}}" IDENTIFIED BY '{{password}}';
				GRANT ALL ON default.* TO "{{username}}";"#;

/// Creation statements using the `{{name}}` alias.
pub const CREATE_WITH_NAME_STATEMENTS: &str = r#"CREATE USER "{{name}}" IDENTIFIED BY '{{password}}';
				GRANT ALL ON default.* TO "{{name}}";"#;

/// Creation statements that fail on the second fragment.
pub const BROKEN_CREATE_STATEMENTS: &str = r#"CREATE USER "{{username}}" IDENTIFIED BY '{{password}}';
				GRANT ALL ON default.* TOO "{{username}}";"#;

/// Rotation statements.
pub const ROTATE_STATEMENTS: &str = r#"ALTER USER "{{username}}" IDENTIFIED BY '{{password}}';"#;

/// Revocation statements.
pub const REVOKE_STATEMENTS: &str = r#"DROP USER IF EXISTS "{{username}}";"#;

/// Revocation statements that ClickHouse rejects.
pub const BROKEN_REVOKE_STATEMENTS: &str = r#"DROP USERS "{{username}}";"#;

/// Wrap one raw template in a statement set.
#[must_use]
pub fn statements(raw: &str) -> Statements {
    Statements::new([raw])
}

/// Plugin configuration pointing at `url` with the `default` admin account.
#[must_use]
pub fn connection_config(url: &str, admin_password: &str) -> ConfigMap {
    match json!({
        "connection_url": url,
        "username": "default",
        "password": admin_password,
    }) {
        Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}

/// [`connection_config`] plus a custom username template.
#[must_use]
pub fn config_with_template(url: &str, admin_password: &str, template: &str) -> ConfigMap {
    let mut config = connection_config(url, admin_password);
    config.insert("username_template".to_string(), Value::String(template.to_string()));
    config
}
