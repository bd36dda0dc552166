//! Shared proptest generators.
//!
//! Reusable strategies for the request data the plugin receives.

use dbplugin::{Statements, UsernameMetadata};
use proptest::prelude::*;

/// Generate display names as issued by the host (token or entity names).
pub fn display_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("token".to_string()),
        Just("approle".to_string()),
        "[a-z][a-z0-9_-]{0,24}",
        Just(String::new()),
    ]
}

/// Generate role names.
pub fn role_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("readonly".to_string()),
        Just("analytics-writer".to_string()),
        "[a-z][a-z0-9_-]{0,24}",
    ]
}

/// Generate username metadata.
pub fn username_metadata_strategy() -> impl Strategy<Value = UsernameMetadata> {
    (display_name_strategy(), role_name_strategy()).prop_map(|(d, r)| UsernameMetadata::new(d, r))
}

/// Generate passwords, including characters that need escaping in SQL.
pub fn password_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9]{20}",
        "[A-Za-z0-9'\"`\\\\!@#$%^&*-]{8,40}",
    ]
}

/// Generate ClickHouse account names.
pub fn account_name_strategy() -> impl Strategy<Value = String> {
    "v-[a-z0-9]{1,8}-[a-z0-9]{1,8}-[A-Za-z0-9]{8}"
}

/// Generate raw statement templates padded with blank fragments.
pub fn padded_statements_strategy() -> impl Strategy<Value = Statements> {
    prop::collection::vec(
        prop_oneof![
            Just(r#"GRANT SELECT ON default.* TO "{{name}}""#.to_string()),
            Just(String::new()),
            Just(" \n\t ".to_string()),
        ],
        0..6,
    )
    .prop_map(|parts| {
        let mut raw = vec![r#"CREATE USER "{{name}}" IDENTIFIED BY '{{password}}'"#.to_string()];
        raw.extend(parts);
        Statements::new([raw.join(";")])
    })
}
