//! Student resource API (`/api/resource`).
//!
//! Every operation is scoped to the caller's own Student record, keyed by the
//! `email` claim of a verified bearer token carrying the configured client role.

use axum::{
    Extension, Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    AppResources,
    auth::{ApiCredential, Operation, Principal, RoleGate, RoleSource, TokenClaims},
    entity::student,
    error::{ApiError, ErrorBody},
    store::{NewStudent, StudentStore, StudentUpdate, parse_date, parse_optional_date},
};

/// Tag for OpenAPI documentation.
pub const STUDENT_TAG: &str = "Student Resources";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentDto {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub course: String,
    /// `YYYY-MM-DD`
    pub enrollment_date: String,
    pub expected_graduation: Option<String>,
    pub gpa: f64,
    pub credits_completed: i32,
    pub major: String,
    pub minor: Option<String>,
}

impl From<student::Model> for StudentDto {
    fn from(model: student::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            course: model.course,
            enrollment_date: model.enrollment_date.to_string(),
            expected_graduation: model.expected_graduation.map(|d| d.to_string()),
            gpa: model.gpa,
            credits_completed: model.credits_completed,
            major: model.major,
            minor: model.minor,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentResponse {
    #[schema(example = "GET request successful")]
    pub message: String,
    pub data: Option<StudentDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "DELETE request successful")]
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStudentRequest {
    #[schema(example = "John Doe")]
    pub name: String,
    #[schema(example = "Computer Science")]
    pub course: String,
    #[schema(example = "2024-03-15")]
    pub enrollment_date: String,
    #[schema(example = "2028-05-30")]
    pub expected_graduation: Option<String>,
    #[schema(example = 3.5)]
    pub gpa: Option<f64>,
    #[schema(example = 60)]
    pub credits_completed: Option<i32>,
    #[schema(example = "Computer Science")]
    pub major: String,
    #[schema(example = "Mathematics")]
    pub minor: Option<String>,
}

impl TryFrom<CreateStudentRequest> for NewStudent {
    type Error = ApiError;

    fn try_from(req: CreateStudentRequest) -> Result<Self, Self::Error> {
        Ok(NewStudent {
            name: req.name,
            course: req.course,
            enrollment_date: parse_date("enrollment_date", &req.enrollment_date)?,
            expected_graduation: parse_optional_date(
                "expected_graduation",
                req.expected_graduation.as_deref(),
            )?,
            gpa: req.gpa.unwrap_or(0.0),
            credits_completed: req.credits_completed.unwrap_or(0),
            major: req.major,
            minor: req.minor,
        })
    }
}

/// Full replacement of the caller's record. Omitted optional fields are
/// cleared or reset to their defaults; an omitted `enrollment_date` keeps the
/// stored one.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStudentRequest {
    pub name: String,
    pub course: String,
    pub enrollment_date: Option<String>,
    pub expected_graduation: Option<String>,
    pub gpa: Option<f64>,
    pub credits_completed: Option<i32>,
    pub major: String,
    pub minor: Option<String>,
}

impl TryFrom<UpdateStudentRequest> for StudentUpdate {
    type Error = ApiError;

    fn try_from(req: UpdateStudentRequest) -> Result<Self, Self::Error> {
        Ok(StudentUpdate {
            name: req.name,
            course: req.course,
            enrollment_date: parse_optional_date("enrollment_date", req.enrollment_date.as_deref())?,
            expected_graduation: parse_optional_date(
                "expected_graduation",
                req.expected_graduation.as_deref(),
            )?,
            gpa: req.gpa.unwrap_or(0.0),
            credits_completed: req.credits_completed.unwrap_or(0),
            major: req.major,
            minor: req.minor,
        })
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn authorize(
    resources: &AppResources,
    claims: &TokenClaims,
    operation: Operation,
) -> Result<Principal, ApiError> {
    let principal = RoleGate::uniform(&resources.config.api.required_role).authorize(
        claims,
        RoleSource::Client(&resources.config.api.client_id),
        operation,
    )?;
    tracing::Span::current().record("email", principal.email.as_str());
    Ok(principal)
}

#[tracing::instrument(skip_all, fields(email = tracing::field::Empty))]
#[utoipa::path(
    get,
    path = "/api/resource",
    tag = STUDENT_TAG,
    operation_id = "Get Student",
    summary = "Fetch the caller's Student record",
    description = "Returns the Student record owned by the email in the bearer token, or `null` data when none exists.",
    security(("Bearer" = [])),
    responses(
        (status = 200, description = "Student data retrieved", body = StudentResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 403, description = "Insufficient permissions", body = ErrorBody),
    )
)]
pub async fn get_resource(
    Extension(resources): Extension<AppResources>,
    ApiCredential(claims): ApiCredential,
) -> Result<Json<StudentResponse>, ApiError> {
    let principal = authorize(&resources, &claims, Operation::Read)?;

    let store = StudentStore::new(resources.db.clone());
    let record = store.find_by_owner(&principal.email).await?;

    Ok(Json(StudentResponse {
        message: "GET request successful".into(),
        data: record.map(StudentDto::from),
    }))
}

#[tracing::instrument(skip_all, fields(email = tracing::field::Empty))]
#[utoipa::path(
    post,
    path = "/api/resource",
    tag = STUDENT_TAG,
    operation_id = "Create Student",
    summary = "Create the caller's Student record",
    description = "Creates a Student record owned by the email in the bearer token. Only one record per email may exist.",
    security(("Bearer" = [])),
    request_body(content = CreateStudentRequest, description = "Student details"),
    responses(
        (status = 201, description = "Student created", body = StudentResponse),
        (status = 400, description = "Student already exists or invalid body", body = ErrorBody),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 403, description = "Insufficient permissions", body = ErrorBody),
    )
)]
pub async fn post_resource(
    Extension(resources): Extension<AppResources>,
    ApiCredential(claims): ApiCredential,
    payload: Result<Json<CreateStudentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let principal = authorize(&resources, &claims, Operation::Create)?;
    let new = NewStudent::try_from(body(payload)?)?;

    let store = StudentStore::new(resources.db.clone());
    let created = store.create(&principal.email, new).await?;

    Ok((
        StatusCode::CREATED,
        Json(StudentResponse {
            message: "POST request successful".into(),
            data: Some(created.into()),
        }),
    )
        .into_response())
}

#[tracing::instrument(skip_all, fields(email = tracing::field::Empty))]
#[utoipa::path(
    put,
    path = "/api/resource",
    tag = STUDENT_TAG,
    operation_id = "Update Student",
    summary = "Replace the caller's Student record",
    security(("Bearer" = [])),
    request_body(content = UpdateStudentRequest, description = "New Student details"),
    responses(
        (status = 200, description = "Student updated", body = StudentResponse),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 403, description = "Insufficient permissions", body = ErrorBody),
        (status = 404, description = "No student record found for this email", body = ErrorBody),
    )
)]
pub async fn put_resource(
    Extension(resources): Extension<AppResources>,
    ApiCredential(claims): ApiCredential,
    payload: Result<Json<UpdateStudentRequest>, JsonRejection>,
) -> Result<Json<StudentResponse>, ApiError> {
    let principal = authorize(&resources, &claims, Operation::Update)?;
    let update = StudentUpdate::try_from(body(payload)?)?;

    let store = StudentStore::new(resources.db.clone());
    let updated = store.update_owned(&principal.email, update).await?;

    Ok(Json(StudentResponse {
        message: "PUT request successful".into(),
        data: Some(updated.into()),
    }))
}

#[tracing::instrument(skip_all, fields(email = tracing::field::Empty))]
#[utoipa::path(
    delete,
    path = "/api/resource",
    tag = STUDENT_TAG,
    operation_id = "Delete Student",
    summary = "Delete the caller's Student record",
    security(("Bearer" = [])),
    responses(
        (status = 200, description = "Student deleted", body = MessageResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 403, description = "Insufficient permissions", body = ErrorBody),
        (status = 404, description = "No student record found for this email", body = ErrorBody),
    )
)]
pub async fn delete_resource(
    Extension(resources): Extension<AppResources>,
    ApiCredential(claims): ApiCredential,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = authorize(&resources, &claims, Operation::Delete)?;

    let store = StudentStore::new(resources.db.clone());
    store.delete_owned(&principal.email).await?;

    Ok(Json(MessageResponse {
        message: "DELETE request successful".into(),
    }))
}
