use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use time::Date;

use super::{is_unique_violation, optional_text, require_text};
use crate::{entity::student, error::StoreError};

/// Fields supplied when a caller creates their Student record.
#[derive(Clone, Debug, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub course: String,
    pub enrollment_date: Date,
    pub expected_graduation: Option<Date>,
    pub gpa: f64,
    pub credits_completed: i32,
    pub major: String,
    pub minor: Option<String>,
}

/// Full replacement of the mutable Student fields.
///
/// `enrollment_date: None` keeps the stored date; every other optional field
/// is written as given (absent means cleared or reset to its default).
#[derive(Clone, Debug, PartialEq)]
pub struct StudentUpdate {
    pub name: String,
    pub course: String,
    pub enrollment_date: Option<Date>,
    pub expected_graduation: Option<Date>,
    pub gpa: f64,
    pub credits_completed: i32,
    pub major: String,
    pub minor: Option<String>,
}

fn check_numbers(gpa: f64, credits_completed: i32) -> Result<(), StoreError> {
    if !gpa.is_finite() || gpa < 0.0 {
        return Err(StoreError::Invalid("gpa must be a non-negative number".into()));
    }
    if credits_completed < 0 {
        return Err(StoreError::Invalid(
            "credits_completed must not be negative".into(),
        ));
    }
    Ok(())
}

/// Student records, one per owner email.
#[derive(Clone, Debug)]
pub struct StudentStore {
    db: Arc<DatabaseConnection>,
}

impl StudentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_owner(&self, email: &str) -> Result<Option<student::Model>, StoreError> {
        Ok(student::Entity::find()
            .filter(student::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, new))]
    pub async fn create(&self, email: &str, new: NewStudent) -> Result<student::Model, StoreError> {
        let name = require_text("name", &new.name)?;
        let course = require_text("course", &new.course)?;
        let major = require_text("major", &new.major)?;
        check_numbers(new.gpa, new.credits_completed)?;

        if self.find_by_owner(email).await?.is_some() {
            return Err(StoreError::Conflict(
                "Student with this email already exists".into(),
            ));
        }

        let row = student::ActiveModel {
            email: Set(email.to_string()),
            name: Set(name),
            course: Set(course),
            enrollment_date: Set(new.enrollment_date),
            expected_graduation: Set(new.expected_graduation),
            gpa: Set(new.gpa),
            credits_completed: Set(new.credits_completed),
            major: Set(major),
            minor: Set(optional_text(new.minor)),
            ..Default::default()
        };

        match row.insert(self.db.as_ref()).await {
            Ok(model) => {
                tracing::info!(id = model.id, "student record created");
                Ok(model)
            }
            // A concurrent insert can still win the race after the pre-check.
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(
                "Student with this email already exists".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_owned(
        &self,
        email: &str,
        update: StudentUpdate,
    ) -> Result<student::Model, StoreError> {
        let name = require_text("name", &update.name)?;
        let course = require_text("course", &update.course)?;
        let major = require_text("major", &update.major)?;
        check_numbers(update.gpa, update.credits_completed)?;

        let existing = self.find_by_owner(email).await?.ok_or_else(|| {
            StoreError::NotFound("No student record found for this email".into())
        })?;

        let mut row: student::ActiveModel = existing.into();
        row.name = Set(name);
        row.course = Set(course);
        if let Some(date) = update.enrollment_date {
            row.enrollment_date = Set(date);
        }
        row.expected_graduation = Set(update.expected_graduation);
        row.gpa = Set(update.gpa);
        row.credits_completed = Set(update.credits_completed);
        row.major = Set(major);
        row.minor = Set(optional_text(update.minor));

        Ok(row.update(self.db.as_ref()).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_owned(&self, email: &str) -> Result<(), StoreError> {
        let result = student::Entity::delete_many()
            .filter(student::Column::Email.eq(email))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(
                "No student record found for this email".into(),
            ));
        }
        tracing::info!("student record deleted");
        Ok(())
    }
}
