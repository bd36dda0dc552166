//! Statement splitting and placeholder binding.
//!
//! A statement template may hold several SQL statements separated by `;`.
//! Each fragment is trimmed, empty fragments are skipped, and the closed set
//! of placeholders (`{{name}}`, `{{username}}`, `{{password}}`) is resolved in
//! a single pass. Any placeholder that cannot be resolved is an error.
//!
//! Bound values are escaped for ClickHouse quoted contexts, so a value placed
//! inside `'...'` or `"..."` cannot close the quote it sits in.

use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{DatabaseError, DatabaseResult};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Placeholder keys recognized in statement templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `{{name}}`, the account name
    Name,
    /// `{{username}}`, the account name
    Username,
    /// `{{password}}`, the account password
    Password,
}

impl Placeholder {
    /// All recognized placeholders.
    pub const ALL: [Self; 3] = [Self::Name, Self::Username, Self::Password];

    /// Key as written between the braces.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Username => "username",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{}}}}}", self.key())
    }
}

impl FromStr for Placeholder {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.key() == s)
            .ok_or_else(|| DatabaseError::configuration(format!("unrecognized placeholder {{{{{s}}}}}")))
    }
}

/// Values bound into the placeholders of one operation.
#[derive(Clone, Copy)]
pub struct Bindings<'a> {
    name: &'a str,
    username: &'a str,
    password: Option<&'a str>,
}

impl<'a> Bindings<'a> {
    /// Bind `{{name}}` and `{{username}}` to the account name, leaving `{{password}}` unbound.
    #[must_use]
    pub const fn for_user(username: &'a str) -> Self {
        Self {
            name: username,
            username,
            password: None,
        }
    }

    /// Also bind `{{password}}`.
    #[must_use]
    pub fn with_password(mut self, password: &'a SecretString) -> Self {
        self.password = Some(password.expose_secret());
        self
    }

    /// Value bound to `placeholder`, if any.
    #[must_use]
    pub const fn value(&self, placeholder: Placeholder) -> Option<&'a str> {
        match placeholder {
            Placeholder::Name => Some(self.name),
            Placeholder::Username => Some(self.username),
            Placeholder::Password => self.password,
        }
    }
}

impl fmt::Debug for Bindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Split a raw template on `;`, trimming and skipping empty fragments.
pub fn split_statements(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve every placeholder in `fragment`.
///
/// # Errors
///
/// Returns [`DatabaseError::Configuration`] for an unknown key, a recognized
/// key with no bound value, or a `{{` without matching `}}`.
pub fn bind(fragment: &str, bindings: &Bindings<'_>) -> DatabaseResult<String> {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| DatabaseError::configuration("unterminated placeholder in statement"))?;

        let placeholder: Placeholder = after[..end].trim().parse()?;
        let value = bindings
            .value(placeholder)
            .ok_or_else(|| DatabaseError::configuration(format!("no value bound for {placeholder}")))?;
        escape_into(&mut out, value);

        rest = &after[end + CLOSE.len()..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Lazily split and bind every statement of a set, in order.
pub fn bind_all<'a>(
    statements: &'a [String],
    bindings: Bindings<'a>,
) -> impl Iterator<Item = DatabaseResult<String>> + 'a {
    statements
        .iter()
        .flat_map(|raw| split_statements(raw))
        .map(move |fragment| bind(fragment, &bindings))
}

/// Quote `value` as a ClickHouse string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    escape_into(&mut out, value);
    out.push('\'');
    out
}

/// Quote `value` as a ClickHouse identifier.
#[must_use]
pub fn quote_identifier(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    escape_into(&mut out, value);
    out.push('"');
    out
}

fn escape_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'' | '"' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_skips_empty_fragments() {
        let fragments: Vec<_> = split_statements("A; ;B;").collect();
        assert_eq!(fragments, vec!["A", "B"]);
    }

    #[test]
    fn test_split_multiline_template() {
        let raw = "CREATE USER \"{{name}}\" IDENTIFIED BY '{{password}}';\n\t\t\t\tGRANT ALL ON default.* TO \"{{name}}\";\n";
        let fragments: Vec<_> = split_statements(raw).collect();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].starts_with("GRANT"));
    }

    #[test]
    fn test_bind_all_placeholders() {
        let password = SecretString::from("pw".to_string());
        let bindings = Bindings::for_user("v-token").with_password(&password);
        let sql = bind("CREATE USER \"{{name}}\" IDENTIFIED BY '{{ password }}' -- {{username}}", &bindings).unwrap();
        assert_eq!(sql, "CREATE USER \"v-token\" IDENTIFIED BY 'pw' -- v-token");
    }

    #[test]
    fn test_bind_escapes_quotes() {
        let password = SecretString::from("it's\"a\\trap`".to_string());
        let bindings = Bindings::for_user("u").with_password(&password);
        let sql = bind("'{{password}}'", &bindings).unwrap();
        assert_eq!(sql, r#"'it\'s\"a\\trap\`'"#);
    }

    #[test]
    fn test_bound_values_are_not_rescanned() {
        let password = SecretString::from("{{username}}".to_string());
        let bindings = Bindings::for_user("u").with_password(&password);
        assert_eq!(bind("{{password}}", &bindings).unwrap(), "{{username}}");
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let err = bind("DROP USER {{user}}", &Bindings::for_user("u")).unwrap_err();
        assert_eq!(err, DatabaseError::configuration("unrecognized placeholder {{user}}"));
    }

    #[test]
    fn test_unbound_password_is_error() {
        let err = bind("ALTER USER x IDENTIFIED BY '{{password}}'", &Bindings::for_user("u")).unwrap_err();
        assert_eq!(err, DatabaseError::configuration("no value bound for {{password}}"));
    }

    #[test]
    fn test_unterminated_placeholder_is_error() {
        let err = bind("DROP USER {{name", &Bindings::for_user("u")).unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn test_cluster_macro_left_alone() {
        let sql = bind("DROP USER \"{{name}}\" ON CLUSTER '{cluster}'", &Bindings::for_user("u")).unwrap();
        assert_eq!(sql, "DROP USER \"u\" ON CLUSTER '{cluster}'");
    }

    #[test]
    fn test_bind_all_order() {
        let statements = vec!["A {{name}}; B {{name}};".to_string(), " ; C".to_string()];
        let bound: Vec<_> = bind_all(&statements, Bindings::for_user("x"))
            .collect::<DatabaseResult<_>>()
            .unwrap();
        assert_eq!(bound, vec!["A x", "B x", "C"]);
    }

    #[test]
    fn test_quote_helpers() {
        assert_eq!(quote_literal("o'brien"), r"'o\'brien'");
        assert_eq!(quote_identifier("a\"b"), r#""a\"b""#);
    }

    #[test]
    fn test_bindings_debug_redacts_password() {
        let password = SecretString::from("hunter2".to_string());
        let bindings = Bindings::for_user("u").with_password(&password);
        assert!(!format!("{bindings:?}").contains("hunter2"));
    }

    #[test]
    fn test_placeholder_display() {
        assert_eq!(Placeholder::Password.to_string(), "{{password}}");
        assert_eq!("name".parse::<Placeholder>().unwrap(), Placeholder::Name);
    }
}
