use sea_orm::entity::prelude::*;
use time::Date;

/// One Student row per owner email.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "student")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub course: String,
    pub enrollment_date: Date,
    pub expected_graduation: Option<Date>,
    pub gpa: f64,
    pub credits_completed: i32,
    pub major: String,
    pub minor: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
