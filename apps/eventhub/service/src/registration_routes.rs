use super::*;

#[derive(Debug, Deserialize)]
pub(super) struct RegisterEventRequestPayload {
    event_id: Option<Value>,
    leader_email: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LeaveEventRequestPayload {
    event_id: Option<Value>,
}

pub(super) async fn list_events(State(state): State<AppState>) -> impl IntoResponse {
    ok_data(state.catalog.list())
}

pub(super) async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    let event = state
        .catalog
        .get(event_id)
        .cloned()
        .ok_or_else(|| not_found_error("Event not found."))?;

    Ok(ok_data(event))
}

pub(super) async fn register_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RegisterEventRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = parse_event_id(payload.event_id.as_ref())
        .ok_or_else(|| validation_error("event_id", "The event id must be numeric."))?;
    let leader_email = required_email(
        payload.leader_email,
        "leader_email",
        "A valid leader email is required.",
    )?;
    let kind = payload
        .kind
        .as_deref()
        .and_then(EventKind::parse)
        .ok_or_else(|| validation_error("type", "Type must be team or individual."))?;

    let mut members: Vec<String> = Vec::new();
    for raw in payload.members.unwrap_or_default() {
        let email = normalize_email(&raw).ok_or_else(|| {
            validation_error("members", "Every member must be a valid email address.")
        })?;
        if !members.contains(&email) {
            members.push(email);
        }
    }

    let event = catalog_event(&state, event_id)?;
    if event.kind != kind {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            "Invalid event type",
        ));
    }

    match kind {
        EventKind::Team => {
            if members.contains(&leader_email) {
                return Err(error_response(
                    ApiErrorCode::InvalidRequest,
                    "Leader cannot be listed as a member.",
                ));
            }
            let capacity = event.team_capacity();
            if 1 + members.len() > capacity {
                return Err(error_response(
                    ApiErrorCode::InvalidRequest,
                    format!("Team size cannot exceed {capacity} participants."),
                ));
            }
        }
        EventKind::Individual => {
            if !members.is_empty() {
                return Err(error_response(
                    ApiErrorCode::InvalidRequest,
                    "Members not allowed for individual events.",
                ));
            }
        }
    }

    if user.email != leader_email {
        return Err(forbidden_error(
            "You can only register with your own email as leader.",
        ));
    }

    let record = state
        .store
        .register_for_event(RegisterEventInput {
            event_id,
            kind,
            leader_email,
            members,
        })
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("event.registered", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_attribute("event_id", event_id.to_string())
            .with_attribute("registration_id", record.id.clone())
            .with_attribute("participants", record.participants.len().to_string()),
    );
    state
        .observability
        .increment_counter("event.registered", &request_id);

    Ok(created_data(json!({
        "registration": record,
        "paymentRequired": event.is_paid(),
    })))
}

pub(super) async fn leave_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<LeaveEventRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = parse_event_id(payload.event_id.as_ref())
        .ok_or_else(|| validation_error("event_id", "The event id is required."))?;

    let outcome = state
        .store
        .leave_event(event_id, &user.email)
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    let (deleted, registration) = match outcome {
        LeaveEventOutcome::Deleted => (true, None),
        LeaveEventOutcome::Left(record) => (false, Some(record)),
    };
    state.observability.audit(
        AuditEvent::new("event.left", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_outcome(if deleted { "deleted" } else { "left" })
            .with_attribute("event_id", event_id.to_string()),
    );
    state
        .observability
        .increment_counter("event.left", &request_id);

    Ok(ok_data(json!({
        "left": true,
        "deleted": deleted,
        "registration": registration,
    })))
}

pub(super) async fn my_registrations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    let registrations = state
        .store
        .registrations_for_email(&user.email)
        .await
        .into_iter()
        .map(|record| {
            let title = state
                .catalog
                .get(record.event_id)
                .map(|event| event.title.clone());
            let is_leader = record.leader_email == user.email;
            json!({
                "registration": record,
                "eventTitle": title,
                "isLeader": is_leader,
            })
        })
        .collect::<Vec<Value>>();

    ok_data(json!({ "registrations": registrations }))
}
