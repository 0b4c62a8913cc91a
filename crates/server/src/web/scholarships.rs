//! Scholarships app. Everyone sees their own records, the privileged realm role
//! sees every record, and only the owner may edit or delete.

use askama::Template;
use axum::{
    Extension, Form,
    extract::{Path, Query},
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::pages::NoticeQuery;
use super::{WEB_TAG, render, with_query};
use crate::{
    AppResources,
    auth::{Principal, RoleSource, TokenClaims},
    entity::scholarship,
    error::{ApiError, StoreError},
    oidc::{
        SessionData, WebSession,
        session::{login_redirect_target, with_cookies},
    },
    store::{ScholarshipInput, ScholarshipStore},
};

const LIST_PATH: &str = "/scholarships";

/// Raw add/edit form submission.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScholarshipForm {
    pub title: String,
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub deadline: Option<String>,
}

struct ScholarshipView {
    id: i32,
    email: String,
    title: String,
    amount: String,
    description: String,
    deadline: String,
    created_at: String,
    can_edit: bool,
}

impl ScholarshipView {
    fn new(model: scholarship::Model, viewer: &str) -> Self {
        Self {
            id: model.id,
            can_edit: model.email == viewer,
            email: model.email,
            title: model.title,
            amount: format!("{:.2}", model.amount),
            description: model.description.unwrap_or_default(),
            deadline: model.deadline.map(|d| d.to_string()).unwrap_or_default(),
            created_at: model
                .created_at
                .format(time::macros::format_description!(
                    "[year]-[month]-[day] [hour]:[minute]"
                ))
                .unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "scholarships.html")]
struct ListTemplate {
    logged_in: bool,
    is_lecturer: bool,
    user_email: String,
    scholarships: Vec<ScholarshipView>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "scholarship_form.html")]
struct FormTemplate {
    logged_in: bool,
    heading: String,
    action: String,
    title: String,
    amount: String,
    description: String,
    deadline: String,
    error: Option<String>,
}

impl FormTemplate {
    fn empty() -> Self {
        Self {
            logged_in: true,
            heading: "Add Scholarship".into(),
            action: "/scholarship/add".into(),
            title: String::new(),
            amount: String::new(),
            description: String::new(),
            deadline: String::new(),
            error: None,
        }
    }

    fn for_record(model: &scholarship::Model) -> Self {
        Self {
            logged_in: true,
            heading: "Edit Scholarship".into(),
            action: format!("/scholarship/edit/{}", model.id),
            title: model.title.clone(),
            amount: model.amount.to_string(),
            description: model.description.clone().unwrap_or_default(),
            deadline: model.deadline.map(|d| d.to_string()).unwrap_or_default(),
            error: None,
        }
    }

    /// Re-render a rejected submission with what the user typed.
    fn rejected(mut self, form: ScholarshipForm, error: String) -> Response {
        self.title = form.title;
        self.amount = form.amount;
        self.description = form.description.unwrap_or_default();
        self.deadline = form.deadline.unwrap_or_default();
        self.error = Some(error);
        (StatusCode::BAD_REQUEST, render(&self)).into_response()
    }
}

/// The verified user, plus re-issued session cookies when the access token
/// had to be refreshed on the way.
struct WebCaller {
    principal: Principal,
    cookies: Vec<String>,
}

impl WebCaller {
    fn respond(self, response: Response) -> Response {
        with_cookies(response, &self.cookies).unwrap_or_else(IntoResponse::into_response)
    }
}

/// Verify the session's access token and read realm roles from it.
///
/// An access token that no longer verifies is refreshed with the session's
/// refresh token. Only when that fails is the browser sent back through login.
async fn web_caller(
    resources: &AppResources,
    session: &SessionData,
    uri: &Uri,
) -> Result<WebCaller, Response> {
    let (mut claims, cookies) = match resources.token_keys.verify(&session.access_token).await {
        Ok(claims) => (claims, Vec::new()),
        Err(e) => {
            tracing::info!(error = %e, "session access token no longer valid, refreshing");
            match refresh_session(resources, session).await {
                Some(refreshed) => refreshed,
                None => {
                    let current = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(LIST_PATH);
                    return Err(Redirect::to(&login_redirect_target(current)).into_response());
                }
            }
        }
    };
    if claims.email.is_none() {
        claims.email = session.email.clone();
    }
    let principal = Principal::from_claims(&claims, RoleSource::Realm)
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(WebCaller { principal, cookies })
}

/// Run the refresh-token grant and verify the new access token.
async fn refresh_session(
    resources: &AppResources,
    session: &SessionData,
) -> Option<(TokenClaims, Vec<String>)> {
    let refresh_token = session.refresh_token.as_deref()?;
    let tokens = resources
        .oidc
        .refresh(refresh_token)
        .await
        .inspect_err(|e| tracing::info!(error = %e, "refresh failed, re-authenticating"))
        .ok()?;
    let refreshed = session.refreshed(tokens);
    let claims = resources
        .token_keys
        .verify(&refreshed.access_token)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "refreshed access token rejected"))
        .ok()?;
    let jwt = resources
        .sessions
        .encode_session(&refreshed)
        .inspect_err(|e| tracing::error!(error = %e, "Failed to sign session"))
        .ok()?;
    tracing::info!(email = ?refreshed.email, "access token refreshed transparently");
    Some((claims, resources.sessions.session_cookies(&jwt)))
}

fn list_redirect(key: &str, value: &str) -> Response {
    Redirect::to(&with_query(LIST_PATH, key, value)).into_response()
}

/// Ownership failures go back to the list with a notice; everything else is an error response.
fn store_failure(err: StoreError) -> Response {
    match err {
        StoreError::NotOwner { .. } => list_redirect("error", "Unauthorized access"),
        other => ApiError::from(other).into_response(),
    }
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/scholarships",
    tag = WEB_TAG,
    operation_id = "List Scholarships",
    summary = "List scholarships visible to the user",
    description = "Users holding the privileged realm role (default `lecturer`) see every scholarship; everyone else \
                   sees only their own.",
    params(NoticeQuery),
    responses(
        (status = 200, description = "Scholarship list HTML", content_type = "text/html"),
        (status = 303, description = "Not logged in, redirect to login"),
    )
)]
pub async fn list(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
    uri: Uri,
    Query(notice): Query<NoticeQuery>,
) -> Response {
    let caller = match web_caller(&resources, &session, &uri).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let response = render_list(&resources, &caller.principal, notice).await;
    caller.respond(response)
}

async fn render_list(
    resources: &AppResources,
    principal: &Principal,
    notice: NoticeQuery,
) -> Response {
    let is_lecturer = principal.has_role(&resources.config.web.privileged_role);

    let store = ScholarshipStore::new(resources.db.clone());
    match store.list_visible(&principal.email, is_lecturer).await {
        Ok(records) => render(&ListTemplate {
            logged_in: true,
            is_lecturer,
            scholarships: records
                .into_iter()
                .map(|m| ScholarshipView::new(m, &principal.email))
                .collect(),
            user_email: principal.email.clone(),
            message: notice.message,
            error: notice.error,
        }),
        Err(e) => store_failure(e),
    }
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/scholarship/add",
    tag = WEB_TAG,
    operation_id = "Add Scholarship Form",
    summary = "Empty scholarship form",
    responses((status = 200, description = "Form HTML", content_type = "text/html"))
)]
pub async fn add_form(WebSession(_session): WebSession) -> Response {
    render(&FormTemplate::empty())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/scholarship/add",
    tag = WEB_TAG,
    operation_id = "Add Scholarship",
    summary = "Create a scholarship owned by the user",
    request_body(content = ScholarshipForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Created, redirect to the list"),
        (status = 400, description = "Invalid form, re-rendered with the error", content_type = "text/html"),
    )
)]
pub async fn add_submit(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
    uri: Uri,
    Form(form): Form<ScholarshipForm>,
) -> Response {
    let caller = match web_caller(&resources, &session, &uri).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let response = create_from_form(&resources, &caller.principal, form).await;
    caller.respond(response)
}

async fn create_from_form(
    resources: &AppResources,
    principal: &Principal,
    form: ScholarshipForm,
) -> Response {
    let input = match ScholarshipInput::parse(
        &form.title,
        &form.amount,
        form.description.clone(),
        form.deadline.as_deref(),
    ) {
        Ok(input) => input,
        Err(e) => return FormTemplate::empty().rejected(form, e.to_string()),
    };

    let store = ScholarshipStore::new(resources.db.clone());
    match store.create(&principal.email, input).await {
        Ok(_) => list_redirect("message", "Scholarship added successfully!"),
        Err(e) => store_failure(e),
    }
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/scholarship/edit/{id}",
    tag = WEB_TAG,
    operation_id = "Edit Scholarship Form",
    summary = "Prefilled form for a scholarship the user owns",
    params(("id" = i32, Path, description = "Scholarship id")),
    responses(
        (status = 200, description = "Form HTML", content_type = "text/html"),
        (status = 303, description = "Not the owner, redirect to the list with an error"),
        (status = 404, description = "No such scholarship", body = crate::error::ErrorBody),
    )
)]
pub async fn edit_form(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
    uri: Uri,
    Path(id): Path<i32>,
) -> Response {
    let caller = match web_caller(&resources, &session, &uri).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let store = ScholarshipStore::new(resources.db.clone());
    let response = match store.find_owned(id, &caller.principal.email).await {
        Ok(model) => render(&FormTemplate::for_record(&model)),
        Err(e) => store_failure(e),
    };
    caller.respond(response)
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/scholarship/edit/{id}",
    tag = WEB_TAG,
    operation_id = "Edit Scholarship",
    summary = "Update a scholarship the user owns",
    params(("id" = i32, Path, description = "Scholarship id")),
    request_body(content = ScholarshipForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Updated (or not the owner), redirect to the list"),
        (status = 400, description = "Invalid form, re-rendered with the error", content_type = "text/html"),
        (status = 404, description = "No such scholarship", body = crate::error::ErrorBody),
    )
)]
pub async fn edit_submit(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
    uri: Uri,
    Path(id): Path<i32>,
    Form(form): Form<ScholarshipForm>,
) -> Response {
    let caller = match web_caller(&resources, &session, &uri).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let response = update_from_form(&resources, &caller.principal, id, form).await;
    caller.respond(response)
}

async fn update_from_form(
    resources: &AppResources,
    principal: &Principal,
    id: i32,
    form: ScholarshipForm,
) -> Response {
    let store = ScholarshipStore::new(resources.db.clone());

    // Ownership before validation.
    let existing = match store.find_owned(id, &principal.email).await {
        Ok(model) => model,
        Err(e) => return store_failure(e),
    };
    let input = match ScholarshipInput::parse(
        &form.title,
        &form.amount,
        form.description.clone(),
        form.deadline.as_deref(),
    ) {
        Ok(input) => input,
        Err(e) => return FormTemplate::for_record(&existing).rejected(form, e.to_string()),
    };

    match store.update_owned(id, &principal.email, input).await {
        Ok(_) => list_redirect("message", "Scholarship updated successfully!"),
        Err(e) => store_failure(e),
    }
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/scholarship/delete/{id}",
    tag = WEB_TAG,
    operation_id = "Delete Scholarship",
    summary = "Delete a scholarship the user owns",
    params(("id" = i32, Path, description = "Scholarship id")),
    responses(
        (status = 303, description = "Deleted (or not the owner), redirect to the list"),
        (status = 404, description = "No such scholarship", body = crate::error::ErrorBody),
    )
)]
pub async fn delete(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
    uri: Uri,
    Path(id): Path<i32>,
) -> Response {
    let caller = match web_caller(&resources, &session, &uri).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let store = ScholarshipStore::new(resources.db.clone());
    let response = match store.delete_owned(id, &caller.principal.email).await {
        Ok(()) => list_redirect("message", "Scholarship deleted successfully!"),
        Err(e) => store_failure(e),
    };
    caller.respond(response)
}
