use async_graphql::{Context, Error, ErrorExtensions, Result};
use sqlx::Row;

use crate::api::graphql::{context::ApiContext, types::Table};
use crate::context::PgResourceContext;

/// Resolves the tables the request's role can see in the exposed schemas
///
/// # Errors
/// Returns an error if `schema` is not exposed, the request has no resource
/// context, or the database query fails
pub async fn resolve_tables(ctx: &Context<'_>, schema: Option<String>) -> Result<Vec<Table>> {
    let api = ctx.data_unchecked::<ApiContext>();
    let namespaces = namespaces(api, schema)?;
    let request = ctx.data::<PgResourceContext>()?;

    let mut conn = request.connection().await.map_err(|e| e.extend())?;
    let rows = sqlx::query(
        r"
        SELECT
            table_schema::text AS table_schema,
            table_name::text AS table_name,
            table_type::text AS table_type
        FROM
            information_schema.tables
        WHERE
            table_schema::text = ANY($1)
        ORDER BY
            table_schema, table_name
        ",
    )
    .bind(namespaces)
    .fetch_all(&mut **conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Table {
            schema: row.get("table_schema"),
            name: row.get("table_name"),
            table_type: row.get("table_type"),
        })
        .collect())
}

fn namespaces(api: &ApiContext, schema: Option<String>) -> Result<Vec<String>> {
    match schema {
        Some(schema) if api.exposes(&schema) => Ok(vec![schema]),
        Some(schema) => Err(Error::new(format!("schema `{schema}` is not exposed"))),
        None => Ok(api.schemas.clone()),
    }
}
