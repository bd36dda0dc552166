//! Username generation from a tera template.
//!
//! Templates see two variables, `display_name` and `role_name`, plus the
//! helper functions and filters below:
//!
//! | helper | kind | output |
//! |---|---|---|
//! | `random(length=N)` | function | N alphanumeric characters |
//! | `unix_time()` | function | seconds since the epoch |
//! | `unix_time_millis()` | function | milliseconds since the epoch |
//! | `timestamp(format="%Y%m%d")` | function | current UTC time, strftime format |
//! | `uuid()` | function | random v4 UUID |
//! | `truncate(length=N)` | filter | first N characters |
//! | `truncate_sha256(length=N)` | filter | N characters, the tail replaced by a hash prefix |
//! | `uppercase`, `lowercase` | filter | case change |
//! | `sha256` | filter | hex digest |
//! | `base64` | filter | standard base64 |

use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use chrono::format::{Item, StrftimeItems};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use tera::{Context, Tera, Value};

use crate::error::{DatabaseError, DatabaseResult};
use crate::requests::UsernameMetadata;

const TEMPLATE_NAME: &str = "username";
const SHA_PREFIX_LEN: usize = 8;
const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Template used when `username_template` is not configured.
///
/// `v-<display name, 8>-<role name, 8>-<20 random>-<unix time>`, at most 32 characters.
pub const DEFAULT_USERNAME_TEMPLATE: &str = "{% filter truncate(length=32) %}v-{{ display_name | truncate(length=8) }}-{{ role_name | truncate(length=8) }}-{{ random(length=20) }}-{{ unix_time() }}{% endfilter %}";

/// A compiled username template.
pub struct UsernameTemplate {
    tera: Tera,
    source: String,
}

impl fmt::Debug for UsernameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernameTemplate").field("source", &self.source).finish_non_exhaustive()
    }
}

impl UsernameTemplate {
    /// Compile `source`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Template`] when the template does not parse.
    pub fn new(source: &str) -> DatabaseResult<Self> {
        let mut tera = Tera::default();
        register_helpers(&mut tera);
        tera.add_raw_template(TEMPLATE_NAME, source).map_err(|e| {
            DatabaseError::template(format!("unable to initialize username template: {}", describe(&e)))
        })?;

        Ok(Self {
            tera,
            source: source.to_string(),
        })
    }

    /// Compile the built-in default template.
    ///
    /// # Errors
    ///
    /// Never in practice; kept fallible to share the constructor.
    pub fn default_template() -> DatabaseResult<Self> {
        Self::new(DEFAULT_USERNAME_TEMPLATE)
    }

    /// The template source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render one throwaway sample with empty metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Template`] if rendering fails.
    pub fn validate(&self) -> DatabaseResult<()> {
        self.render(&UsernameMetadata::default())
            .map(|_| ())
            .map_err(|e| e.map_message(|m| format!("invalid username template: {m}")))
    }

    /// Produce a username for `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Template`] if rendering fails or yields only whitespace.
    pub fn generate(&self, metadata: &UsernameMetadata) -> DatabaseResult<String> {
        let rendered = self.render(metadata)?;
        let username = rendered.trim();
        if username.is_empty() {
            return Err(DatabaseError::template("username template produced an empty username"));
        }
        Ok(username.to_string())
    }

    fn render(&self, metadata: &UsernameMetadata) -> DatabaseResult<String> {
        let mut context = Context::new();
        context.insert("display_name", &metadata.display_name);
        context.insert("role_name", &metadata.role_name);
        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| DatabaseError::template(describe(&e)))
    }
}

/// Flatten a tera error and its sources into one line.
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn register_helpers(tera: &mut Tera) {
    tera.register_function("random", random);
    tera.register_function("unix_time", unix_time);
    tera.register_function("unix_time_millis", unix_time_millis);
    tera.register_function("timestamp", timestamp);
    tera.register_function("uuid", uuid_v4);

    tera.register_filter("truncate", truncate);
    tera.register_filter("truncate_sha256", truncate_sha256);
    tera.register_filter("uppercase", uppercase);
    tera.register_filter("lowercase", lowercase);
    tera.register_filter("sha256", sha256);
    tera.register_filter("base64", base64_encode);
}

fn text(value: &Value, helper: &str) -> tera::Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(tera::Error::msg(format!("{helper} requires a string"))),
    }
}

fn length_arg(args: &HashMap<String, Value>, helper: &str) -> tera::Result<usize> {
    args.get("length")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| tera::Error::msg(format!("{helper} requires a non-negative 'length' argument")))
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn random(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let length = length_arg(args, "random")?;
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    Ok(Value::String(value))
}

#[allow(clippy::unnecessary_wraps)]
fn unix_time(_: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(Utc::now().timestamp()))
}

#[allow(clippy::unnecessary_wraps)]
fn unix_time_millis(_: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(Utc::now().timestamp_millis()))
}

#[allow(clippy::unnecessary_wraps)]
fn uuid_v4(_: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(uuid::Uuid::new_v4().to_string()))
}

fn timestamp(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let format = match args.get("format") {
        Some(v) => v
            .as_str()
            .ok_or_else(|| tera::Error::msg("timestamp 'format' must be a string"))?,
        None => DEFAULT_TIMESTAMP_FORMAT,
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(tera::Error::msg(format!("invalid timestamp format {format:?}")));
    }
    Ok(Value::String(Utc::now().format_with_items(items.into_iter()).to_string()))
}

fn truncate(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = text(value, "truncate")?;
    let length = length_arg(args, "truncate")?;
    Ok(Value::String(input.chars().take(length).collect()))
}

fn uppercase(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(text(value, "uppercase")?.to_uppercase()))
}

fn lowercase(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(text(value, "lowercase")?.to_lowercase()))
}

fn sha256(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(sha256_hex(&text(value, "sha256")?)))
}

fn base64_encode(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(STANDARD.encode(text(value, "base64")?)))
}

fn truncate_sha256(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = text(value, "truncate_sha256")?;
    let length = length_arg(args, "truncate_sha256")?;
    if length <= SHA_PREFIX_LEN {
        return Err(tera::Error::msg(format!(
            "truncate_sha256 'length' must be greater than {SHA_PREFIX_LEN}"
        )));
    }
    if input.chars().count() <= length {
        return Ok(Value::String(input));
    }

    let keep = length - SHA_PREFIX_LEN;
    let head: String = input.chars().take(keep).collect();
    let tail: String = input.chars().skip(keep).collect();
    let hash = sha256_hex(&tail);
    Ok(Value::String(format!("{head}{}", &hash[..SHA_PREFIX_LEN])))
}
