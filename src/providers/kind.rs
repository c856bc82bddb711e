//! Provider kinds and their credential shapes.
//!
//! [`ProviderSettings`] is a closed set of variants, one per provider kind.
//! Validation, connection URL construction and redaction live on the
//! variants so callers never branch on the provider themselves.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::config::redact_url_password;
use crate::error::StoreError;

pub const REDACTED: &str = "[REDACTED]";
pub const DEFAULT_EMBEDDED_FILE_PATH: &str = "./data/fintrack.db";
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    PostgresManaged,
    MysqlManaged,
    BackendAsAService,
    PostgresSelfHosted,
    MysqlSelfHosted,
    EmbeddedFile,
}

/// SQL family spoken by a provider, when it speaks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl SqlDialect {
    fn accepts_scheme(self, scheme: &str) -> bool {
        match self {
            SqlDialect::Postgres => matches!(scheme, "postgres" | "postgresql"),
            SqlDialect::Mysql => scheme == "mysql",
            SqlDialect::Sqlite => scheme == "sqlite",
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            SqlDialect::Postgres => "postgres",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
        }
    }
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::PostgresManaged,
        ProviderKind::MysqlManaged,
        ProviderKind::BackendAsAService,
        ProviderKind::PostgresSelfHosted,
        ProviderKind::MysqlSelfHosted,
        ProviderKind::EmbeddedFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::PostgresManaged => "postgres-managed",
            ProviderKind::MysqlManaged => "mysql-managed",
            ProviderKind::BackendAsAService => "backend-as-a-service",
            ProviderKind::PostgresSelfHosted => "postgres-self-hosted",
            ProviderKind::MysqlSelfHosted => "mysql-self-hosted",
            ProviderKind::EmbeddedFile => "embedded-file",
        }
    }

    pub fn dialect(self) -> Option<SqlDialect> {
        match self {
            ProviderKind::PostgresManaged | ProviderKind::PostgresSelfHosted => {
                Some(SqlDialect::Postgres)
            }
            ProviderKind::MysqlManaged | ProviderKind::MysqlSelfHosted => Some(SqlDialect::Mysql),
            ProviderKind::EmbeddedFile => Some(SqlDialect::Sqlite),
            ProviderKind::BackendAsAService => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StoreError::validation(format!("unknown provider '{s}'")))
    }
}

/// Credentials of a self-hosted SQL server: either a connection string or discrete parts.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ServerCredentials {
    pub fn connection_string(&self) -> Option<&str> {
        present(&self.connection_string)
    }

    fn validate(&self, dialect: SqlDialect) -> Result<(), StoreError> {
        if let Some(conn) = self.connection_string() {
            return validate_connection_string(conn, dialect);
        }

        let missing: Vec<&str> = [
            ("host", present(&self.host)),
            ("database", present(&self.database)),
            ("username", present(&self.username)),
            ("password", present(&self.password)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.is_none().then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(StoreError::validation(format!(
                "either connectionString or host, database, username and password are required (missing: {})",
                missing.join(", ")
            )));
        }

        if self.port == Some(0) {
            return Err(StoreError::validation("port must be between 1 and 65535"));
        }

        Ok(())
    }

    /// Connection URL built from the discrete parts.
    fn build_url(&self, dialect: SqlDialect, ssl: bool) -> Result<String, StoreError> {
        let host = present(&self.host).unwrap_or_default();
        let default_port = match dialect {
            SqlDialect::Mysql => DEFAULT_MYSQL_PORT,
            _ => DEFAULT_POSTGRES_PORT,
        };

        let mut url = Url::parse(&format!("{}://{}", dialect.scheme(), host))
            .map_err(|e| StoreError::validation(format!("invalid host '{host}': {e}")))?;
        let invalid = |_| StoreError::validation("host cannot carry credentials");
        url.set_port(Some(self.port.unwrap_or(default_port)))
            .map_err(invalid)?;
        url.set_username(present(&self.username).unwrap_or_default())
            .map_err(invalid)?;
        url.set_password(present(&self.password)).map_err(invalid)?;
        url.set_path(present(&self.database).unwrap_or_default());

        if ssl {
            match dialect {
                SqlDialect::Postgres => {
                    url.query_pairs_mut().append_pair("sslmode", "require");
                }
                SqlDialect::Mysql => {
                    url.query_pairs_mut().append_pair("ssl-mode", "REQUIRED");
                }
                SqlDialect::Sqlite => {}
            }
        }

        Ok(url.to_string())
    }

    fn redacted(&self) -> Self {
        Self {
            connection_string: self
                .connection_string
                .as_deref()
                .map(redact_url_password),
            password: self.password.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }
}

fn validate_connection_string(conn: &str, dialect: SqlDialect) -> Result<(), StoreError> {
    let parsed = Url::parse(conn)
        .map_err(|e| StoreError::validation(format!("connection string is not a valid URL: {e}")))?;

    if !dialect.accepts_scheme(parsed.scheme()) {
        return Err(StoreError::validation(format!(
            "connection string scheme '{}' does not match the provider (expected {}://)",
            parsed.scheme(),
            dialect.scheme()
        )));
    }

    Ok(())
}

/// Provider-specific connection settings, tagged by `provider`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum ProviderSettings {
    PostgresManaged {
        #[serde(default, rename = "connectionString")]
        connection_string: String,
    },
    MysqlManaged {
        #[serde(default, rename = "connectionString")]
        connection_string: String,
    },
    BackendAsAService {
        #[serde(default, rename = "serviceUrl")]
        service_url: String,
        #[serde(default, rename = "anonKey")]
        anon_key: String,
        #[serde(default, rename = "serviceRoleKey")]
        service_role_key: String,
    },
    PostgresSelfHosted(ServerCredentials),
    MysqlSelfHosted(ServerCredentials),
    EmbeddedFile {
        #[serde(default, rename = "filePath", skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderSettings::PostgresManaged { .. } => ProviderKind::PostgresManaged,
            ProviderSettings::MysqlManaged { .. } => ProviderKind::MysqlManaged,
            ProviderSettings::BackendAsAService { .. } => ProviderKind::BackendAsAService,
            ProviderSettings::PostgresSelfHosted(_) => ProviderKind::PostgresSelfHosted,
            ProviderSettings::MysqlSelfHosted(_) => ProviderKind::MysqlSelfHosted,
            ProviderSettings::EmbeddedFile { .. } => ProviderKind::EmbeddedFile,
        }
    }

    /// Static validation. Performs no I/O.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            ProviderSettings::PostgresManaged { connection_string }
            | ProviderSettings::MysqlManaged { connection_string } => {
                let conn = connection_string.trim();
                if conn.is_empty() {
                    return Err(StoreError::validation("connectionString is required"));
                }
                let dialect = self.kind().dialect().unwrap_or(SqlDialect::Postgres);
                validate_connection_string(conn, dialect)
            }
            ProviderSettings::BackendAsAService {
                service_url,
                anon_key,
                service_role_key,
            } => {
                let missing: Vec<&str> = [
                    ("serviceUrl", service_url),
                    ("anonKey", anon_key),
                    ("serviceRoleKey", service_role_key),
                ]
                .into_iter()
                .filter_map(|(name, value)| value.trim().is_empty().then_some(name))
                .collect();
                if !missing.is_empty() {
                    return Err(StoreError::validation(format!(
                        "missing required fields: {}",
                        missing.join(", ")
                    )));
                }

                let parsed = Url::parse(service_url.trim()).map_err(|e| {
                    StoreError::validation(format!("serviceUrl is not a valid URL: {e}"))
                })?;
                if parsed.scheme() != "https" {
                    return Err(StoreError::validation("serviceUrl must use https"));
                }
                Ok(())
            }
            ProviderSettings::PostgresSelfHosted(creds) => creds.validate(SqlDialect::Postgres),
            ProviderSettings::MysqlSelfHosted(creds) => creds.validate(SqlDialect::Mysql),
            ProviderSettings::EmbeddedFile { .. } => Ok(()),
        }
    }

    /// Connection URL for SQL providers; `None` for the backend-as-a-service.
    pub fn connection_url(&self, ssl: bool) -> Result<Option<String>, StoreError> {
        let url = match self {
            ProviderSettings::PostgresManaged { connection_string }
            | ProviderSettings::MysqlManaged { connection_string } => {
                connection_string.trim().to_string()
            }
            ProviderSettings::PostgresSelfHosted(creds) => match creds.connection_string() {
                Some(conn) => conn.to_string(),
                None => creds.build_url(SqlDialect::Postgres, ssl)?,
            },
            ProviderSettings::MysqlSelfHosted(creds) => match creds.connection_string() {
                Some(conn) => conn.to_string(),
                None => creds.build_url(SqlDialect::Mysql, ssl)?,
            },
            ProviderSettings::EmbeddedFile { .. } => {
                format!("sqlite://{}?mode=rwc", self.file_path().unwrap_or_default())
            }
            ProviderSettings::BackendAsAService { .. } => return Ok(None),
        };
        Ok(Some(url))
    }

    /// File path of an embedded-file provider, defaulted when unset.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            ProviderSettings::EmbeddedFile { file_path } => Some(
                file_path
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(DEFAULT_EMBEDDED_FILE_PATH),
            ),
            _ => None,
        }
    }

    /// Copy with every secret masked, safe for API responses and logs.
    pub fn redacted(&self) -> Self {
        match self {
            ProviderSettings::PostgresManaged { connection_string } => {
                ProviderSettings::PostgresManaged {
                    connection_string: redact_url_password(connection_string),
                }
            }
            ProviderSettings::MysqlManaged { connection_string } => ProviderSettings::MysqlManaged {
                connection_string: redact_url_password(connection_string),
            },
            ProviderSettings::BackendAsAService { service_url, .. } => {
                ProviderSettings::BackendAsAService {
                    service_url: service_url.clone(),
                    anon_key: REDACTED.to_string(),
                    service_role_key: REDACTED.to_string(),
                }
            }
            ProviderSettings::PostgresSelfHosted(creds) => {
                ProviderSettings::PostgresSelfHosted(creds.redacted())
            }
            ProviderSettings::MysqlSelfHosted(creds) => {
                ProviderSettings::MysqlSelfHosted(creds.redacted())
            }
            ProviderSettings::EmbeddedFile { file_path } => ProviderSettings::EmbeddedFile {
                file_path: file_path.clone(),
            },
        }
    }

    /// True when switching from `self` to `other` changes what is connected to.
    pub fn credentials_differ(&self, other: &ProviderSettings) -> bool {
        self != other
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = serde_json::to_string(&self.redacted()).map_err(|_| fmt::Error)?;
        write!(f, "ProviderSettings({redacted})")
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
