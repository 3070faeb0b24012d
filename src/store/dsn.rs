use crate::config::StoreConfig;
use std::fmt;
use std::time::Duration;

/// Connection string for the store:
/// `scheme://host?username=..&password=..&database=..&write_timeout=..&read_timeout=..`
///
/// Timeouts are written in whole seconds. `Display` masks the password; use
/// [`Dsn::to_connection_string`] for the real value.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    pub scheme: String,
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl Dsn {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            host: config.host.clone(),
            username: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            write_timeout: config.write_timeout,
            read_timeout: config.read_timeout,
        }
    }

    pub fn to_connection_string(&self) -> String {
        self.render(&self.password)
    }

    fn render(&self, password: &str) -> String {
        format!(
            "{}://{}?username={}&password={}&database={}&write_timeout={}&read_timeout={}",
            self.scheme,
            self.host,
            self.username,
            password,
            self.database,
            self.write_timeout.as_secs(),
            self.read_timeout.as_secs(),
        )
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("***"))
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dsn({})", self)
    }
}
