//! Hosting service model
//!
//! Servers, repository paths and accounts, plus the API client, the account
//! store and the URL rules that tie git remotes to hosted repositories.

pub mod accounts;
pub mod api;
pub mod data;
pub mod remote_url;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::{validate_path_segment, ValidationError};

pub use accounts::{Account, AccountStore, ConfigAccountStore};
pub use api::{ApiClient, ApiError, ApiTransport, HttpTransport};
pub use data::{RepoDetailed, RepoSummary};

/// Host of the public Gitee service
pub const GITEE_HOST: &str = "gitee.com";
const GITHUB_HOST: &str = "github.com";

/// A hosting server: scheme, host, optional port and path prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerPath {
    use_http: bool,
    host: String,
    port: Option<u16>,
    suffix: Option<String>,
}

impl ServerPath {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            use_http: false,
            host: host.into().to_ascii_lowercase(),
            port: None,
            suffix: None,
        }
    }

    pub fn gitee() -> Self {
        Self::new(GITEE_HOST)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set a path prefix such as `/gitee`
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        let trimmed = suffix.trim_matches('/');
        self.suffix = (!trimmed.is_empty()).then(|| format!("/{trimmed}"));
        self
    }

    pub fn with_http(mut self, use_http: bool) -> Self {
        self.use_http = use_http;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path prefix with a leading slash, if any
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_http {
            "http"
        } else {
            "https"
        }
    }

    /// Web URL of the server, e.g. `https://gitee.com`
    pub fn to_url(&self) -> String {
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        format!("{}://{}{}{}", self.scheme(), self.host, port, self.suffix().unwrap_or(""))
    }

    /// Base URL of the REST API
    pub fn to_api_url(&self) -> String {
        match self.host.as_str() {
            GITEE_HOST if self.port.is_none() && self.suffix.is_none() => "https://gitee.com/api/v5".to_string(),
            GITHUB_HOST if self.port.is_none() && self.suffix.is_none() => "https://api.github.com".to_string(),
            _ => format!("{}/api/v5", self.to_url()),
        }
    }
}

impl Default for ServerPath {
    fn default() -> Self {
        Self::gitee()
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        if self.use_http {
            write!(f, "http://")?;
        }
        write!(f, "{}{}{}", self.host, port, self.suffix().unwrap_or(""))
    }
}

impl FromStr for ServerPath {
    type Err = String;

    /// Parse `host`, `host:port/suffix` or a full `http(s)://` URL
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (use_http, rest) = if let Some(rest) = s.strip_prefix("http://") {
            (true, rest)
        } else {
            (false, s.strip_prefix("https://").unwrap_or(s))
        };

        let (authority, suffix) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| format!("invalid port in server '{s}'"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(format!("invalid server '{s}'"));
        }

        let mut server = ServerPath::new(host).with_http(use_http);
        server.port = port;
        if let Some(suffix) = suffix {
            server = server.with_suffix(suffix);
        }
        Ok(server)
    }
}

impl TryFrom<String> for ServerPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerPath> for String {
    fn from(server: ServerPath) -> Self {
        server.to_string()
    }
}

/// `owner/repository` on a hosting server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryPath {
    pub owner: String,
    pub repository: String,
}

impl RepositoryPath {
    pub fn new(owner: impl Into<String>, repository: impl Into<String>) -> Result<Self, ValidationError> {
        let owner = owner.into();
        let repository = repository.into();
        validate_path_segment(&owner)?;
        validate_path_segment(&repository)?;
        Ok(Self { owner, repository })
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repository)
    }
}

impl FromStr for RepositoryPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repository) = s
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidIdentifier(s.to_string(), "expected owner/repository"))?;
        Self::new(owner, repository)
    }
}
