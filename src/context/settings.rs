use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, Method, Uri};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::error::ContextError;

/// Database session variables resolved once per request, keyed by setting
/// name (`role`, `app.tenant_id`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSettings(BTreeMap<String, String>);

impl SessionSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for SessionSettings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The part of an inbound HTTP request visible to settings callbacks.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl InboundRequest {
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }
}

impl From<HeaderMap> for InboundRequest {
    fn from(headers: HeaderMap) -> Self {
        Self::new(Method::POST, Uri::from_static("/graphql"), headers)
    }
}

/// Computes session settings for a request. Implementations may do I/O.
#[async_trait]
pub trait SettingsCallback: Send + Sync + 'static {
    async fn settings(&self, request: &InboundRequest) -> Result<Option<SessionSettings>>;
}

/// Where a request's session settings come from.
#[derive(Clone)]
pub enum SettingsResolver {
    Static(Option<SessionSettings>),
    Callback(Arc<dyn SettingsCallback>),
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::Static(None)
    }
}

impl SettingsResolver {
    pub fn callback(callback: impl SettingsCallback) -> Self {
        Self::Callback(Arc::new(callback))
    }

    /// Resolves settings for one request. Callback failures are surfaced as
    /// [`ContextError::SettingsResolution`].
    pub async fn resolve(
        &self,
        request: &InboundRequest,
    ) -> Result<Option<SessionSettings>, ContextError> {
        match self {
            Self::Static(settings) => Ok(settings.clone()),
            Self::Callback(callback) => callback
                .settings(request)
                .await
                .map_err(ContextError::SettingsResolution),
        }
    }
}

/// Copies selected request headers into session settings, layered over a
/// fixed base.
#[derive(Clone, Debug, Default)]
pub struct HeaderSettings {
    base: SessionSettings,
    mappings: Vec<(HeaderName, String)>,
}

impl HeaderSettings {
    #[must_use]
    pub fn new(base: SessionSettings) -> Self {
        Self {
            base,
            mappings: Vec::new(),
        }
    }

    #[must_use]
    pub fn map(mut self, header: HeaderName, setting: impl Into<String>) -> Self {
        self.mappings.push((header, setting.into()));
        self
    }
}

#[async_trait]
impl SettingsCallback for HeaderSettings {
    async fn settings(&self, request: &InboundRequest) -> Result<Option<SessionSettings>> {
        let mut settings = self.base.clone();
        for (header, setting) in &self.mappings {
            if let Some(value) = request.headers.get(header) {
                let value = value
                    .to_str()
                    .map_err(|_| anyhow!("header {header} is not valid visible ASCII"))?;
                settings.insert(setting.clone(), value);
            }
        }
        Ok((!settings.is_empty()).then_some(settings))
    }
}
