use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Scholarship::Table)
                    .if_not_exists()
                    .col(pk_auto(Scholarship::Id))
                    .col(string_len(Scholarship::Email, 120).not_null().to_owned())
                    .col(string_len(Scholarship::Title, 100).not_null().to_owned())
                    .col(double(Scholarship::Amount).not_null().to_owned())
                    .col(text_null(Scholarship::Description))
                    .col(date_null(Scholarship::Deadline))
                    .col(
                        timestamp_with_time_zone(Scholarship::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null()
                            .to_owned(),
                    )
                    .to_owned(),
            )
            .await?;
        // Owners list their own scholarships on every page view.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scholarship_email")
                    .table(Scholarship::Table)
                    .col(Scholarship::Email)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_scholarship_email")
                    .table(Scholarship::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Scholarship::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Scholarship {
    Table,
    Id,
    Email,
    Title,
    Amount,
    Description,
    Deadline,
    CreatedAt,
}
