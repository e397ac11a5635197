use async_graphql::SimpleObject;

#[derive(SimpleObject, Clone, Debug)]
pub struct Table {
    pub schema: String,
    pub name: String,
    #[graphql(name = "tableType")]
    pub table_type: String,
}
