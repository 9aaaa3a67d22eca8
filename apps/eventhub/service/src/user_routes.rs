use super::*;

const MAX_CHECK_EMAILS: usize = 50;

#[derive(Debug, Deserialize)]
pub(super) struct UpdateUserRequestPayload {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    college: Option<String>,
    branch: Option<String>,
    year: Option<Value>,
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckEmailsRequestPayload {
    emails: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct UserSummary {
    uid: String,
    name: String,
    email: String,
}

pub(super) async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let (record, created) = state
        .store
        .create_user_if_absent(CreateUserInput {
            uid: user.uid.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        })
        .await
        .map_err(map_domain_store_error)?;

    if !created {
        return Ok(ok_data(json!({ "created": false, "user": record })));
    }

    state.observability.audit(
        AuditEvent::new("user.created", request_id.clone())
            .with_user_id(record.uid.clone())
            .with_attribute("email", record.email.clone()),
    );
    state
        .observability
        .increment_counter("user.created", &request_id);

    Ok(created_data(json!({ "created": true, "user": record })))
}

pub(super) async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateUserRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let year = match payload.year.as_ref() {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_year(value)?),
    };

    let record = state
        .store
        .update_user(
            &user.uid,
            UpdateUserInput {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                college: payload.college,
                branch: payload.branch,
                year,
                bio: payload.bio,
            },
        )
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("user.updated", request_id.clone()).with_user_id(record.uid.clone()),
    );
    state
        .observability
        .increment_counter("user.updated", &request_id);

    Ok(ok_data(json!({ "user": record })))
}

pub(super) async fn user_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let record = state
        .store
        .get_user(&user.uid)
        .await
        .ok_or_else(|| not_found_error("Profile not found."))?;

    Ok(ok_data(json!({ "user": record })))
}

pub(super) async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    let users = state
        .store
        .list_users()
        .await
        .into_iter()
        .map(|record| UserSummary {
            uid: record.uid,
            name: record.name,
            email: record.email,
        })
        .collect::<Vec<UserSummary>>();

    ok_data(json!({ "users": users }))
}

pub(super) async fn user_exists(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    if state.store.get_user(uid.trim()).await.is_none() {
        return Err(not_found_error("User not found."));
    }

    Ok(ok_data(json!({ "exists": true })))
}

pub(super) async fn check_emails(
    State(state): State<AppState>,
    Json(payload): Json<CheckEmailsRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let Some(raw_emails) = payload.emails else {
        return Err(validation_error("emails", "The emails field is required."));
    };
    if raw_emails.len() > MAX_CHECK_EMAILS {
        return Err(validation_error(
            "emails",
            "No more than 50 emails can be checked at once.",
        ));
    }

    let mut emails = Vec::with_capacity(raw_emails.len());
    for raw in raw_emails {
        let email = normalize_email(&raw).ok_or_else(|| {
            validation_error("emails", "Every entry must be a valid email address.")
        })?;
        if !emails.contains(&email) {
            emails.push(email);
        }
    }

    let unregistered = state.store.unregistered_emails(&emails).await;
    Ok(ok_data(json!({ "unregistered": unregistered })))
}

fn parse_year(value: &Value) -> Result<u8, ApiErrorTuple> {
    let parsed = match value {
        Value::Number(number) => number.as_u64().and_then(|year| u8::try_from(year).ok()),
        Value::String(raw) => raw.trim().parse::<u8>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| validation_error("year", "Year must be between 1 and 6."))
}
