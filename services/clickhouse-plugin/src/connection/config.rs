//! Connection options of the HTTP producer.

use std::time::Duration;

use dbplugin::{ConfigMap, ConfigReader, DatabaseError, DatabaseResult};
use secrecy::SecretString;
use serde_json::Value;
use url::{Url, form_urlencoded};

const USERNAME_PLACEHOLDER: &str = "{{username}}";
const PASSWORD_PLACEHOLDER: &str = "{{password}}";

/// Default HTTP interface port.
pub const DEFAULT_HTTP_PORT: u16 = 8123;
/// Default HTTPS interface port.
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

const NATIVE_PORT: u16 = 9000;
const NATIVE_TLS_PORT: u16 = 9440;

const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 2;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings resolved from the plugin configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint without credentials or connection query parameters
    pub endpoint: Url,
    /// Default database for statements
    pub database: Option<String>,
    /// Administrative account
    pub username: Option<String>,
    /// Administrative password
    pub password: Option<SecretString>,
    /// Idle connections kept per host
    pub max_idle_connections: usize,
    /// How long an idle connection may be reused, `None` for the client default
    pub max_connection_lifetime: Option<Duration>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Components found in the connection URL, placeholders still in place.
#[derive(Default)]
struct UrlCredentials {
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

impl ConnectionConfig {
    /// Parse the options of `config`.
    ///
    /// Returns the settings together with the configuration the host should
    /// persist: a literal password written into `connection_url` is moved to
    /// the `password` option and replaced by the `{{password}}` placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] for a missing or malformed URL,
    /// an unsupported scheme, an unfillable placeholder or a bad numeric option.
    pub fn from_config(config: &ConfigMap) -> DatabaseResult<(Self, ConfigMap)> {
        let reader = ConfigReader::new(config);
        let raw = reader
            .non_empty_string("connection_url")?
            .ok_or_else(|| DatabaseError::configuration("connection_url cannot be empty"))?;
        let option_username = reader.non_empty_string("username")?;
        let option_password = reader.non_empty_string("password")?;

        let mut url = parse_url(raw)?;
        let found = take_credentials(&mut url);

        let lifted = found.password.as_deref().filter(|p| !p.contains(PASSWORD_PLACEHOLDER));
        let mut sanitized = config.clone();
        if let Some(literal) = lifted {
            sanitized.insert("connection_url".to_string(), Value::String(lift_password(raw)?));
            sanitized.insert("password".to_string(), Value::String(literal.to_string()));
        }

        let fill = |value: &str| fill_placeholders(value, option_username, option_password);
        let username = found
            .username
            .as_deref()
            .map(fill)
            .transpose()?
            .or_else(|| option_username.map(str::to_string));
        let password = found
            .password
            .as_deref()
            .map(fill)
            .transpose()?
            .or_else(|| option_password.map(str::to_string));

        let settings = Self {
            endpoint: url,
            database: found.database,
            username,
            password: password.map(SecretString::from),
            max_idle_connections: reader
                .u64("max_idle_connections")?
                .map_or(Ok(DEFAULT_MAX_IDLE_CONNECTIONS), usize::try_from)
                .map_err(|_| DatabaseError::configuration("max_idle_connections is too large"))?,
            max_connection_lifetime: reader
                .u64("max_connection_lifetime")?
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            request_timeout: reader
                .u64("request_timeout")?
                .filter(|s| *s > 0)
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        };
        Ok((settings, sanitized))
    }
}

/// Parse `raw`, mapping `clickhouse://` to HTTP and filling in default ports.
fn parse_url(raw: &str) -> DatabaseResult<Url> {
    let normalized = match raw.split_once("://") {
        Some(("clickhouse", rest)) => format!("http://{rest}"),
        _ => raw.to_string(),
    };
    let mut url =
        Url::parse(&normalized).map_err(|e| DatabaseError::configuration(format!("invalid connection_url: {e}")))?;

    let default_port = match url.scheme() {
        "http" => DEFAULT_HTTP_PORT,
        "https" => DEFAULT_HTTPS_PORT,
        other => {
            return Err(DatabaseError::configuration(format!(
                "unsupported connection_url scheme {other}"
            )));
        }
    };
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DatabaseError::configuration("connection_url has no host"));
    }
    match url.port() {
        None => url
            .set_port(Some(default_port))
            .map_err(|()| DatabaseError::configuration("connection_url cannot carry a port"))?,
        Some(port @ (NATIVE_PORT | NATIVE_TLS_PORT)) => {
            let http_port = if port == NATIVE_TLS_PORT { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT };
            return Err(DatabaseError::configuration(format!(
                "connection_url port {port} is the native protocol port; use the HTTP interface port {http_port}"
            )));
        }
        Some(_) => {}
    }
    Ok(url)
}

/// Remove userinfo and connection query parameters from `url`.
fn take_credentials(url: &mut Url) -> UrlCredentials {
    let mut found = UrlCredentials::default();
    if !url.username().is_empty() {
        found.username = Some(percent_decode(url.username()));
    }
    found.password = url.password().map(percent_decode);

    let mut kept = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "username" | "user" => found.username = Some(value.into_owned()),
            "password" => found.password = Some(value.into_owned()),
            "database" => found.database = Some(value.into_owned()),
            _ => kept.push((key.into_owned(), value.into_owned())),
        }
    }

    // Clearing userinfo only fails for URLs without a host, rejected earlier.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    found
}

/// Rewrite `raw` with its literal password replaced by the placeholder.
fn lift_password(raw: &str) -> DatabaseResult<String> {
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| DatabaseError::configuration("invalid connection_url"))?;
    let mut url = Url::parse(&format!("http://{rest}"))
        .map_err(|e| DatabaseError::configuration(format!("invalid connection_url: {e}")))?;

    if url.password().is_some() {
        let _ = url.set_password(Some(PASSWORD_PLACEHOLDER));
    }
    if url.query_pairs().any(|(k, _)| k == "password") {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "password" { PASSWORD_PLACEHOLDER.to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let encoded = percent_encode(PASSWORD_PLACEHOLDER);
    let rewritten = url.as_str().replacen("http://", "", 1).replace(&encoded, PASSWORD_PLACEHOLDER);
    Ok(format!("{scheme}://{rewritten}"))
}

fn fill_placeholders(value: &str, username: Option<&str>, password: Option<&str>) -> DatabaseResult<String> {
    let mut out = value.to_string();
    for (placeholder, replacement, option) in [
        (USERNAME_PLACEHOLDER, username, "username"),
        (PASSWORD_PLACEHOLDER, password, "password"),
    ] {
        if out.contains(placeholder) {
            let replacement = replacement.ok_or_else(|| {
                DatabaseError::configuration(format!("connection_url references {placeholder} but {option} is not set"))
            })?;
            out = out.replace(placeholder, replacement);
        }
    }
    Ok(out)
}

/// Decode a percent-encoded URL component. `+` stays literal.
fn percent_decode(value: &str) -> String {
    let escaped = value.replace('+', "%2B").replace('&', "%26");
    form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

fn percent_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}
