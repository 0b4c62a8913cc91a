use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Student::Table)
                    .if_not_exists()
                    .col(pk_auto(Student::Id))
                    .col(string(Student::Email).not_null().unique_key().to_owned())
                    .col(string(Student::Name).not_null().to_owned())
                    .col(string(Student::Course).not_null().to_owned())
                    .col(date(Student::EnrollmentDate).not_null().to_owned())
                    .col(date_null(Student::ExpectedGraduation))
                    .col(double(Student::Gpa).default(0.0).not_null().to_owned())
                    .col(
                        integer(Student::CreditsCompleted)
                            .default(0)
                            .not_null()
                            .to_owned(),
                    )
                    .col(string(Student::Major).not_null().to_owned())
                    .col(string_null(Student::Minor))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Student::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Student {
    Table,
    Id,
    Email,
    Name,
    Course,
    EnrollmentDate,
    ExpectedGraduation,
    Gpa,
    CreditsCompleted,
    Major,
    Minor,
}
