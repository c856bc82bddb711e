//! Deployment environment variables for a configuration.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::redact_url_password;
use crate::error::StoreError;
use crate::providers::kind::{DEFAULT_MYSQL_PORT, DEFAULT_POSTGRES_PORT, REDACTED};
use crate::providers::{ProviderSettings, ServerCredentials};

/// Variables whose values are secrets in full.
const SECRET_KEYS: [&str; 3] = ["SUPABASE_ANON_KEY", "SUPABASE_SERVICE_ROLE_KEY", "DB_PASSWORD"];

pub type EnvTemplate = BTreeMap<String, String>;

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Connection-string components come percent-encoded.
fn decoded(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Discrete parts of a self-hosted server, taken from the fields or else from the connection string.
fn server_parts(creds: &ServerCredentials, default_port: u16) -> [(&'static str, String); 5] {
    let parsed = creds.connection_string().and_then(|c| Url::parse(c).ok());
    let from_url = |pick: fn(&Url) -> Option<String>| parsed.as_ref().and_then(pick);

    let host = trimmed(&creds.host)
        .or_else(|| from_url(|u| u.host_str().map(str::to_string)))
        .unwrap_or_default();
    let port = creds
        .port
        .or_else(|| parsed.as_ref().and_then(Url::port))
        .unwrap_or(default_port);
    let database = trimmed(&creds.database)
        .or_else(|| from_url(|u| Some(decoded(u.path().trim_start_matches('/')))))
        .unwrap_or_default();
    let user = trimmed(&creds.username)
        .or_else(|| from_url(|u| Some(decoded(u.username()))))
        .unwrap_or_default();
    let password = trimmed(&creds.password)
        .or_else(|| from_url(|u| u.password().map(decoded)))
        .unwrap_or_default();

    [
        ("DB_HOST", host),
        ("DB_PORT", port.to_string()),
        ("DB_NAME", database),
        ("DB_USER", user),
        ("DB_PASSWORD", password),
    ]
}

/// Builds the variables a deployment needs to use `settings` directly.
pub fn template(
    settings: &ProviderSettings,
    ssl: bool,
    max_connections: u32,
) -> Result<EnvTemplate, StoreError> {
    let mut vars = EnvTemplate::new();
    vars.insert("DATABASE_PROVIDER".into(), settings.kind().as_str().into());

    match settings {
        ProviderSettings::BackendAsAService {
            service_url,
            anon_key,
            service_role_key,
        } => {
            vars.insert("SUPABASE_URL".into(), service_url.trim().into());
            vars.insert("SUPABASE_ANON_KEY".into(), anon_key.trim().into());
            vars.insert("SUPABASE_SERVICE_ROLE_KEY".into(), service_role_key.trim().into());
        }
        ProviderSettings::PostgresManaged { connection_string }
        | ProviderSettings::MysqlManaged { connection_string } => {
            vars.insert("DATABASE_URL".into(), connection_string.trim().into());
        }
        ProviderSettings::PostgresSelfHosted(creds) | ProviderSettings::MysqlSelfHosted(creds) => {
            let default_port = match settings {
                ProviderSettings::MysqlSelfHosted(_) => DEFAULT_MYSQL_PORT,
                _ => DEFAULT_POSTGRES_PORT,
            };
            if let Some(url) = settings.connection_url(ssl)? {
                vars.insert("DATABASE_URL".into(), url);
            }
            for (key, value) in server_parts(creds, default_port) {
                vars.insert(key.into(), value);
            }
            vars.insert("DB_SSL".into(), ssl.to_string());
            vars.insert("DB_MAX_CONNECTIONS".into(), max_connections.to_string());
        }
        ProviderSettings::EmbeddedFile { .. } => {
            let path = settings.file_path().unwrap_or_default();
            vars.insert("DATABASE_URL".into(), format!("sqlite://{path}"));
            vars.insert("DB_FILE_PATH".into(), path.into());
        }
    }

    Ok(vars)
}

/// Masks secrets in a template. URLs keep everything but their password.
pub fn redact(mut vars: EnvTemplate) -> EnvTemplate {
    for (key, value) in vars.iter_mut() {
        if SECRET_KEYS.contains(&key.as_str()) {
            if !value.is_empty() {
                *value = REDACTED.to_string();
            }
        } else if key == "DATABASE_URL" {
            *value = redact_url_password(value);
        }
    }
    vars
}

/// Renders a template as dotenv text, one `KEY=value` per line.
pub fn render_dotenv(vars: &EnvTemplate) -> String {
    vars.iter()
        .map(|(key, value)| {
            let needs_quotes = value.is_empty()
                || value
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '$'));
            if needs_quotes {
                format!("{key}=\"{}\"\n", value.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                format!("{key}={value}\n")
            }
        })
        .collect()
}
