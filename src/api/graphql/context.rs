/// Schema-wide data available to every resolver, next to the per-request
/// resource context.
#[derive(Clone, Debug)]
pub struct ApiContext {
    /// Schema namespaces exposed through the API
    pub schemas: Vec<String>,
    /// Session variable the caller's bearer token is applied under
    pub credential_setting: Option<String>,
}

impl ApiContext {
    /// Create a new context exposing the given schema namespaces
    pub fn new(schemas: Vec<String>) -> Self {
        Self {
            schemas,
            credential_setting: None,
        }
    }

    #[must_use]
    pub fn with_credential_setting(mut self, setting: Option<String>) -> Self {
        self.credential_setting = setting;
        self
    }

    /// Whether the namespace is one of the exposed ones
    #[must_use]
    pub fn exposes(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| s == schema)
    }
}
