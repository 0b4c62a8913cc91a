use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder,
};
use time::{Date, OffsetDateTime};

use super::{optional_text, parse_optional_date, require_text};
use crate::{entity::scholarship, error::StoreError};

/// Validated scholarship fields, shared by create and update.
#[derive(Clone, Debug, PartialEq)]
pub struct ScholarshipInput {
    pub title: String,
    pub amount: f64,
    pub description: Option<String>,
    pub deadline: Option<Date>,
}

impl ScholarshipInput {
    /// Build from raw form values.
    pub fn parse(
        title: &str,
        amount: &str,
        description: Option<String>,
        deadline: Option<&str>,
    ) -> Result<Self, StoreError> {
        let title = require_text("title", title)?;
        if title.chars().count() > 100 {
            return Err(StoreError::Invalid(
                "title must be at most 100 characters".into(),
            ));
        }
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|_| StoreError::Invalid("amount must be a number".into()))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(StoreError::Invalid(
                "amount must be a non-negative number".into(),
            ));
        }
        Ok(Self {
            title,
            amount,
            description: optional_text(description),
            deadline: parse_optional_date("deadline", deadline)?,
        })
    }
}

/// Scholarship records, many per owner email.
#[derive(Clone, Debug)]
pub struct ScholarshipStore {
    db: Arc<DatabaseConnection>,
}

impl ScholarshipStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records visible to the caller: their own, or every record when
    /// `read_all` is granted.
    #[tracing::instrument(skip(self))]
    pub async fn list_visible(
        &self,
        email: &str,
        read_all: bool,
    ) -> Result<Vec<scholarship::Model>, StoreError> {
        let mut query = scholarship::Entity::find().order_by_asc(scholarship::Column::Id);
        if !read_all {
            query = query.filter(scholarship::Column::Email.eq(email));
        }
        Ok(query.all(self.db.as_ref()).await?)
    }

    /// Fetch a record and check that `email` owns it.
    #[tracing::instrument(skip(self))]
    pub async fn find_owned(
        &self,
        id: i32,
        email: &str,
    ) -> Result<scholarship::Model, StoreError> {
        let record = scholarship::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| StoreError::NotFound("Scholarship not found".into()))?;

        if record.email != email {
            tracing::warn!(
                scholarship_id = id,
                "Unauthorized access attempt to scholarship owned by another user"
            );
            return Err(StoreError::NotOwner { id });
        }
        Ok(record)
    }

    #[tracing::instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(
        &self,
        email: &str,
        input: ScholarshipInput,
    ) -> Result<scholarship::Model, StoreError> {
        let row = scholarship::ActiveModel {
            email: Set(email.to_string()),
            title: Set(input.title),
            amount: Set(input.amount),
            description: Set(input.description),
            deadline: Set(input.deadline),
            created_at: Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        let model = row.insert(self.db.as_ref()).await?;
        tracing::info!(id = model.id, "scholarship created");
        Ok(model)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update_owned(
        &self,
        id: i32,
        email: &str,
        input: ScholarshipInput,
    ) -> Result<scholarship::Model, StoreError> {
        let existing = self.find_owned(id, email).await?;
        let mut row: scholarship::ActiveModel = existing.into();
        row.title = Set(input.title);
        row.amount = Set(input.amount);
        row.description = Set(input.description);
        row.deadline = Set(input.deadline);
        Ok(row.update(self.db.as_ref()).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_owned(&self, id: i32, email: &str) -> Result<(), StoreError> {
        let existing = self.find_owned(id, email).await?;
        existing.delete(self.db.as_ref()).await?;
        tracing::info!(id, "scholarship deleted");
        Ok(())
    }
}
