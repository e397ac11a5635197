use anyhow::{anyhow, Result};
use axum::http::HeaderName;
use clap::Parser;

use crate::context::{BrokerOptions, HeaderSettings, SessionSettings, SettingsResolver};

#[derive(Parser, Clone, Debug)]
#[command(version, about = "GraphQL gateway over PostgreSQL")]
pub struct GatewayOptions {
    /// The database URL requests are served from
    #[arg(short = 'd', long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Comma-separated schema namespaces exposed through GraphQL
    #[arg(long, env = "GATEWAY_SCHEMAS", value_delimiter = ',', default_value = "public")]
    pub schemas: Vec<String>,

    /// Secret for the schema collaborator; the gateway itself never verifies tokens
    #[arg(long, env = "GATEWAY_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// The address to listen on
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on
    #[arg(short = 'p', long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// The maximum number of pooled database connections
    #[arg(long, env = "GATEWAY_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// The role applied to every request unless its settings name another
    #[arg(long, env = "GATEWAY_DEFAULT_ROLE")]
    pub default_role: Option<String>,

    /// The session variable carrying the caller's bearer token
    #[arg(long, env = "GATEWAY_CREDENTIAL_SETTING", default_value = "jwt.token")]
    pub credential_setting: String,

    /// Static session settings as key=value pairs
    #[arg(long = "setting", env = "GATEWAY_SETTINGS", value_delimiter = ',', value_parser = parse_pair)]
    pub settings: Vec<(String, String)>,

    /// Request headers copied into session settings as header=key pairs
    #[arg(long = "header-setting", env = "GATEWAY_HEADER_SETTINGS", value_delimiter = ',', value_parser = parse_pair)]
    pub header_settings: Vec<(String, String)>,
}

impl GatewayOptions {
    #[must_use]
    pub fn broker_options(&self) -> BrokerOptions {
        BrokerOptions {
            default_role: self.default_role.clone(),
            credential_setting: Some(self.credential_setting.clone()).filter(|s| !s.is_empty()),
        }
    }

    /// Static settings, or a header-mapping callback when any header
    /// mappings are configured.
    ///
    /// # Errors
    /// Returns an error if a mapped header name is not a valid HTTP header name
    pub fn settings_resolver(&self) -> Result<SettingsResolver> {
        let base: SessionSettings = self.settings.iter().cloned().collect();

        if self.header_settings.is_empty() {
            return Ok(SettingsResolver::Static((!base.is_empty()).then_some(base)));
        }

        let mut callback = HeaderSettings::new(base);
        for (header, setting) in &self.header_settings {
            let header = HeaderName::from_bytes(header.as_bytes())
                .map_err(|_| anyhow!("invalid header name in header setting: {header}"))?;
            callback = callback.map(header, setting.clone());
        }
        Ok(SettingsResolver::callback(callback))
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
