use sea_orm::entity::prelude::*;
use time::{Date, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scholarship")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owner email.
    pub email: String,
    pub title: String,
    pub amount: f64,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub deadline: Option<Date>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
