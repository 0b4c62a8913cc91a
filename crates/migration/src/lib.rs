pub use sea_orm_migration::prelude::*;

mod m20241105_120000_add_student_table;
mod m20241105_120100_add_scholarship_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241105_120000_add_student_table::Migration),
            Box::new(m20241105_120100_add_scholarship_table::Migration),
        ]
    }
}
