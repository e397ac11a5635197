use async_graphql::{Context, ErrorExtensions, Result};

use crate::api::graphql::{
    context::ApiContext,
    types::{Session, Setting},
};
use crate::context::{PgResourceContext, SessionVariables};

/// Resolves the role and settings of the request's database session
///
/// # Errors
/// Returns an error if the request has no resource context or the query fails
pub async fn resolve_current_session(ctx: &Context<'_>) -> Result<Session> {
    let api = ctx.data_unchecked::<ApiContext>();
    let request = ctx.data::<PgResourceContext>()?;

    let role: String = {
        let mut conn = request.connection().await.map_err(|e| e.extend())?;
        sqlx::query_scalar("SELECT current_user::text")
            .fetch_one(&mut **conn)
            .await?
    };

    let masked = request
        .credential()
        .and(api.credential_setting.as_deref());

    Ok(Session {
        authenticated: request.credential().is_some(),
        role,
        settings: request
            .settings()
            .map(|settings| {
                settings
                    .iter()
                    .map(|(name, value)| Setting {
                        name: name.to_string(),
                        value: Some(value.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        variables: echo_variables(request.variables(), masked),
    })
}

fn echo_variables(variables: &SessionVariables, masked: Option<&str>) -> Vec<Setting> {
    variables
        .iter()
        .map(|(name, value)| Setting {
            name: name.clone(),
            value: (masked != Some(name.as_str())).then(|| value.clone()),
        })
        .collect()
}
