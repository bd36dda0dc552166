//! Mock implementations for testing.
//!
//! [`MockClickhouse`] is an in-memory stand-in for a ClickHouse server that
//! understands the access-control statements the plugin issues, and
//! [`MockConnectionProducer`] hands out connections to it.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use dbplugin::{
    ConfigMap, ConfigReader, Connection, ConnectionProducer, DatabaseError, DatabaseResult,
    SecretMap, Transaction,
};
use parking_lot::Mutex;
use regex::{Captures, Regex};

const NAME: &str = r#"(?P<name>"(?:[^"\\]|\\.)*"|`(?:[^`\\]|\\.)*`|[^\s"'`;]+)"#;
const CLUSTER: &str = r"(?:\s+ON\s+CLUSTER\s+'(?P<cluster>(?:[^'\\]|\\.)*)')?";
const PASSWORD: &str = r"IDENTIFIED\s+(?:WITH\s+\w+\s+)?BY\s+'(?P<password>(?:[^'\\]|\\.)*)'";

static CREATE_USER: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?is)^CREATE\s+USER\s+(?P<if_not_exists>IF\s+NOT\s+EXISTS\s+)?{NAME}{CLUSTER}(?:\s+{PASSWORD})?(?:\s+.*)?$"
    ))
});
static ALTER_USER: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(r"(?is)^ALTER\s+USER\s+(?P<if_exists>IF\s+EXISTS\s+)?{NAME}{CLUSTER}\s+{PASSWORD}\s*$"))
});
static DROP_USER: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(r"(?is)^DROP\s+USER\s+(?P<if_exists>IF\s+EXISTS\s+)?{NAME}{CLUSTER}\s*$"))
});
static GRANT: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(r"(?is)^GRANT\s+(?P<privileges>.+?){CLUSTER}\s+TO\s+{NAME}\s*$"))
});
static USER_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?is)FROM\s+system\.users\s+WHERE\s+name\s*=\s*'(?P<name>(?:[^'\\]|\\.)*)'"));
static MACRO_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?is)FROM\s+system\.macros\s+WHERE\s+macro\s*=\s*'(?P<name>(?:[^'\\]|\\.)*)'"));

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("mock statement pattern is valid")
}

/// An account stored by [`MockClickhouse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockUser {
    /// Password, if the account was created with one
    pub password: Option<String>,
    /// Privileges granted, as written in the GRANT statement
    pub grants: Vec<String>,
}

type Users = BTreeMap<String, MockUser>;

#[derive(Debug, Default)]
struct ServerState {
    users: Users,
    cluster: bool,
    unreachable: bool,
    failing: Vec<String>,
    latency: Option<Duration>,
    executed: Vec<String>,
    commits: usize,
    rollbacks: usize,
}

/// In-memory ClickHouse double.
///
/// Cloning yields another handle to the same server.
#[derive(Debug, Clone, Default)]
pub struct MockClickhouse {
    state: Arc<Mutex<ServerState>>,
}

impl MockClickhouse {
    /// Create an empty single-node server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server that defines the `cluster` macro.
    #[must_use]
    pub fn clustered() -> Self {
        let server = Self::new();
        server.set_cluster(true);
        server
    }

    /// Define or remove the `cluster` macro.
    pub fn set_cluster(&self, cluster: bool) {
        self.state.lock().cluster = cluster;
    }

    /// Make every round-trip fail with a connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every round-trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Fail every statement or query containing `fragment`.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.state.lock().failing.push(fragment.into());
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Insert an account directly.
    pub fn add_user(&self, name: &str, password: &str) {
        self.state.lock().users.insert(
            name.to_string(),
            MockUser {
                password: Some(password.to_string()),
                grants: Vec::new(),
            },
        );
    }

    /// Whether the account exists.
    #[must_use]
    pub fn user_exists(&self, name: &str) -> bool {
        self.state.lock().users.contains_key(name)
    }

    /// Snapshot of one account.
    #[must_use]
    pub fn user(&self, name: &str) -> Option<MockUser> {
        self.state.lock().users.get(name).cloned()
    }

    /// Names of all accounts.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.state.lock().users.keys().cloned().collect()
    }

    /// Whether `name` can log in with `password`.
    #[must_use]
    pub fn authenticate(&self, name: &str, password: &str) -> bool {
        self.state
            .lock()
            .users
            .get(name)
            .is_some_and(|u| u.password.as_deref() == Some(password))
    }

    /// Every statement and query received, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Number of rolled back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    /// A connection to this server.
    #[must_use]
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::new(MockConnection { server: self.clone() })
    }

    /// A connection producer bound to this server.
    #[must_use]
    pub fn producer(&self) -> MockConnectionProducer {
        MockConnectionProducer::new(self.clone())
    }

    async fn round_trip(&self, sql: &str) -> DatabaseResult<()> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if state.unreachable {
            return Err(DatabaseError::connection("dial tcp 127.0.0.1:8123: connect: connection refused"));
        }
        state.executed.push(sql.to_string());
        if state.failing.iter().any(|f| sql.contains(f.as_str())) {
            return Err(DatabaseError::execution(format!(
                "Code: 999. DB::Exception: injected failure while executing '{sql}'"
            )));
        }
        Ok(())
    }

    async fn query(&self, sql: &str) -> DatabaseResult<Option<bool>> {
        self.round_trip(sql).await?;
        let state = self.state.lock();

        if let Some(caps) = USER_EXISTS.captures(sql) {
            return Ok(Some(state.users.contains_key(&unescape(&caps["name"]))));
        }
        if let Some(caps) = MACRO_EXISTS.captures(sql) {
            return Ok(Some(state.cluster && unescape(&caps["name"]) == "cluster"));
        }
        if sql.trim().eq_ignore_ascii_case("SELECT 1") {
            return Ok(Some(true));
        }
        Err(syntax_error(sql))
    }

    async fn execute_on(&self, users: Option<&mut Users>, sql: &str) -> DatabaseResult<()> {
        self.round_trip(sql).await?;
        let mut state = self.state.lock();
        let cluster = state.cluster;
        match users {
            Some(users) => apply(users, cluster, sql),
            None => apply(&mut state.users, cluster, sql),
        }
    }
}

fn apply(users: &mut Users, cluster: bool, sql: &str) -> DatabaseResult<()> {
    let sql = sql.trim();

    if let Some(caps) = CREATE_USER.captures(sql) {
        check_cluster(&caps, cluster)?;
        let name = unescape(&caps["name"]);
        if users.contains_key(&name) {
            if caps.name("if_not_exists").is_some() {
                return Ok(());
            }
            return Err(DatabaseError::execution(format!(
                "Code: 493. DB::Exception: user `{name}`: cannot insert because user `{name}` already exists in local directory"
            )));
        }
        let password = caps.name("password").map(|p| unescape(p.as_str()));
        users.insert(name, MockUser { password, grants: Vec::new() });
        return Ok(());
    }

    if let Some(caps) = ALTER_USER.captures(sql) {
        check_cluster(&caps, cluster)?;
        let name = unescape(&caps["name"]);
        return match users.get_mut(&name) {
            Some(user) => {
                user.password = Some(unescape(&caps["password"]));
                Ok(())
            }
            None if caps.name("if_exists").is_some() => Ok(()),
            None => Err(no_such_user(&name)),
        };
    }

    if let Some(caps) = DROP_USER.captures(sql) {
        check_cluster(&caps, cluster)?;
        let name = unescape(&caps["name"]);
        if users.remove(&name).is_none() && caps.name("if_exists").is_none() {
            return Err(no_such_user(&name));
        }
        return Ok(());
    }

    if let Some(caps) = GRANT.captures(sql) {
        check_cluster(&caps, cluster)?;
        let name = unescape(&caps["name"]);
        let user = users.get_mut(&name).ok_or_else(|| no_such_user(&name))?;
        user.grants.push(caps["privileges"].trim().to_string());
        return Ok(());
    }

    Err(syntax_error(sql))
}

fn check_cluster(caps: &Captures<'_>, cluster: bool) -> DatabaseResult<()> {
    match caps.name("cluster") {
        Some(c) if c.as_str() == "{cluster}" && !cluster => Err(DatabaseError::execution(
            "Code: 62. DB::Exception: No macro 'cluster' in config while processing substitutions",
        )),
        _ => Ok(()),
    }
}

fn no_such_user(name: &str) -> DatabaseError {
    DatabaseError::execution(format!("Code: 192. DB::Exception: There is no user `{name}` in local directory"))
}

fn syntax_error(sql: &str) -> DatabaseError {
    DatabaseError::execution(format!("Code: 62. DB::Exception: Syntax error: failed at position 1 ('{sql}')"))
}

/// Strip identifier or literal quotes and resolve backslash escapes.
fn unescape(raw: &str) -> String {
    let inner = match raw.chars().next() {
        Some(q @ ('"' | '`' | '\'')) if raw.len() >= 2 && raw.ends_with(q) => &raw[1..raw.len() - 1],
        _ => raw,
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

struct MockConnection {
    server: MockClickhouse,
}

#[async_trait]
impl Connection for MockConnection {
    async fn query_bool(&self, query: &str) -> DatabaseResult<Option<bool>> {
        self.server.query(query).await
    }

    async fn execute(&self, query: &str) -> DatabaseResult<()> {
        self.server.execute_on(None, query).await
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn Transaction>> {
        if self.server.state.lock().unreachable {
            return Err(DatabaseError::connection("dial tcp 127.0.0.1:8123: connect: connection refused"));
        }
        let pending = self.server.state.lock().users.clone();
        Ok(Box::new(MockTransaction {
            server: self.server.clone(),
            pending,
        }))
    }
}

/// Buffers effects on a copy of the accounts until commit.
struct MockTransaction {
    server: MockClickhouse,
    pending: Users,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&mut self, query: &str) -> DatabaseResult<()> {
        self.server.execute_on(Some(&mut self.pending), query).await
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        let mut state = self.server.state.lock();
        if state.unreachable {
            return Err(DatabaseError::connection("dial tcp 127.0.0.1:8123: connect: connection refused"));
        }
        state.users = self.pending;
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        self.server.state.lock().rollbacks += 1;
        Ok(())
    }
}

/// [`ConnectionProducer`] handing out connections to a [`MockClickhouse`].
#[derive(Debug)]
pub struct MockConnectionProducer {
    server: MockClickhouse,
    initialized: bool,
    admin_password: Option<String>,
}

impl MockConnectionProducer {
    /// Create an uninitialized producer.
    #[must_use]
    pub const fn new(server: MockClickhouse) -> Self {
        Self {
            server,
            initialized: false,
            admin_password: None,
        }
    }
}

#[async_trait]
impl ConnectionProducer for MockConnectionProducer {
    async fn init(&mut self, config: &ConfigMap, verify_connection: bool) -> DatabaseResult<ConfigMap> {
        let reader = ConfigReader::new(config);
        let url = reader
            .non_empty_string("connection_url")?
            .ok_or_else(|| DatabaseError::configuration("connection_url cannot be empty"))?;
        self.admin_password = reader.non_empty_string("password")?.map(str::to_string);

        if verify_connection {
            self.server.query("SELECT 1").await.map_err(|e| {
                DatabaseError::connection(format!("error verifying connection to {url}: {}", e.message()))
            })?;
        }

        self.initialized = true;
        Ok(config.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn connection(&mut self) -> DatabaseResult<Arc<dyn Connection>> {
        if !self.initialized {
            return Err(DatabaseError::connection("connection producer is not initialized"));
        }
        if self.server.state.lock().unreachable {
            return Err(DatabaseError::connection("dial tcp 127.0.0.1:8123: connect: connection refused"));
        }
        Ok(self.server.connection())
    }

    fn secret_values(&self) -> SecretMap {
        self.admin_password
            .iter()
            .map(|p| (p.clone(), "[password]".to_string()))
            .collect()
    }

    async fn close(&mut self) -> DatabaseResult<()> {
        self.initialized = false;
        Ok(())
    }
}
