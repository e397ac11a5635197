use async_graphql::SimpleObject;

/// The database session serving the current request
#[derive(SimpleObject, Clone, Debug)]
pub struct Session {
    /// Whether the request carried a bearer credential
    pub authenticated: bool,
    /// The database role queries run as
    pub role: String,
    /// Session settings resolved for this request
    pub settings: Vec<Setting>,
    /// Session variables applied to the connection, defaults and credential included
    pub variables: Vec<Setting>,
}

#[derive(SimpleObject, Clone, Debug, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    /// Absent for the credential, whose value is never echoed
    pub value: Option<String>,
}
