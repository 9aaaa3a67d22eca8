use super::*;

#[derive(Debug, Deserialize)]
pub(super) struct JoinEventTeamRequestPayload {
    #[serde(rename = "leaderEmail")]
    leader_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RemoveEventTeamMemberRequestPayload {
    #[serde(rename = "memberEmail")]
    member_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckoutRequestPayload {
    pub(super) razorpay_order_id: Option<String>,
    pub(super) razorpay_payment_id: Option<String>,
    pub(super) razorpay_signature: Option<String>,
}

pub(super) struct CheckoutFields {
    pub(super) order_id: String,
    pub(super) payment_id: String,
    pub(super) signature: String,
}

impl CheckoutRequestPayload {
    pub(super) fn into_fields(self) -> Result<CheckoutFields, ApiErrorTuple> {
        Ok(CheckoutFields {
            order_id: required_string(
                self.razorpay_order_id,
                "razorpay_order_id",
                "The razorpay_order_id field is required.",
            )?,
            payment_id: required_string(
                self.razorpay_payment_id,
                "razorpay_payment_id",
                "The razorpay_payment_id field is required.",
            )?,
            signature: required_string(
                self.razorpay_signature,
                "razorpay_signature",
                "The razorpay_signature field is required.",
            )?,
        })
    }
}

fn team_event(state: &AppState, event_id: u32) -> Result<EventDetail, ApiErrorTuple> {
    let event = state
        .catalog
        .get(event_id)
        .cloned()
        .ok_or_else(|| not_found_error("Event not found."))?;
    if event.kind != EventKind::Team {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            "Teams are only available for team events.",
        ));
    }
    Ok(event)
}

pub(super) async fn my_event_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    let team = state.store.event_team_for(event_id, &user.email).await;
    let is_leader = team
        .as_ref()
        .is_some_and(|team| team.leader_email == user.email);

    Ok(ok_data(json!({ "team": team, "isLeader": is_leader })))
}

pub(super) async fn create_event_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    team_event(&state, event_id)?;

    let team = state
        .store
        .create_event_team(event_id, &user.email)
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("event_team.created", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_attribute("event_id", event_id.to_string())
            .with_attribute("team_id", team.team_id.clone()),
    );
    state
        .observability
        .increment_counter("event_team.created", &request_id);

    Ok(created_data(json!({ "teamId": team.team_id, "team": team })))
}

pub(super) async fn join_event_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<String>,
    Json(payload): Json<JoinEventTeamRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    let leader_email = required_email(
        payload.leader_email,
        "leaderEmail",
        "A valid leader email is required.",
    )?;
    let event = team_event(&state, event_id)?;

    let team = state
        .store
        .join_event_team(event_id, &leader_email, &user.email, event.team_capacity())
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("event_team.joined", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_attribute("event_id", event_id.to_string())
            .with_attribute("team_id", team.team_id.clone()),
    );
    state
        .observability
        .increment_counter("event_team.joined", &request_id);

    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn disband_event_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path((event_id, team_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;

    let team = state
        .store
        .disband_event_team(event_id, team_id.trim(), &user.email)
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("event_team.disbanded", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_attribute("team_id", team.team_id.clone()),
    );
    state
        .observability
        .increment_counter("event_team.disbanded", &request_id);

    Ok(ok_data(json!({ "disbanded": true, "teamId": team.team_id })))
}

pub(super) async fn remove_event_team_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((event_id, team_id)): Path<(String, String)>,
    Json(payload): Json<RemoveEventTeamMemberRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    let member_email = required_email(
        payload.member_email,
        "memberEmail",
        "A valid member email is required.",
    )?;

    let team = state
        .store
        .remove_event_team_member(event_id, team_id.trim(), &user.email, &member_email)
        .await
        .map_err(map_domain_store_error)?;

    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn pay_event_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path((event_id, team_id)): Path<(String, String)>,
    Json(payload): Json<CheckoutRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let event_id = path_event_id(&event_id)?;
    let team_id = team_id.trim().to_string();
    let fields = payload.into_fields()?;

    let team = state
        .store
        .get_event_team(&team_id)
        .await
        .ok_or_else(|| not_found_error("Team not found."))?;
    if team.event_id != event_id {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            "Team does not belong to this event",
        ));
    }
    if team.payment_done {
        return Ok(ok_data(json!({ "alreadyPaid": true, "team": team })));
    }
    if team.leader_email != user.email {
        return Err(forbidden_error("Only the team leader can pay."));
    }

    let event = team_event(&state, event_id)?;
    let capacity = event.team_capacity();
    if team.members.len() != capacity {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            format!("Team must have exactly {capacity} members before payment."),
        ));
    }

    let request_id = request_id(&headers);
    let target = PaymentTarget::EventTeam(team_id.clone());
    let verification = state
        .reconciler
        .verify_checkout(
            &fields.order_id,
            &fields.payment_id,
            &fields.signature,
            Some(&target),
            &request_id,
        )
        .await;

    match verification {
        Ok(CheckoutVerification {
            outcome: Some(ReconcileOutcome::Orphaned { .. }),
            ..
        }) => return Err(orphaned_capture_error()),
        Ok(CheckoutVerification {
            outcome: Some(_), ..
        }) => {}
        Ok(CheckoutVerification { outcome: None, .. })
        | Err(ReconcileError::NotCaptured { .. } | ReconcileError::AmountMismatch { .. }) => {
            return Err(error_response(
                ApiErrorCode::PaymentRejected,
                "Payment not captured or amount mismatch",
            ));
        }
        Err(error) => return Err(map_reconcile_error(error)),
    }

    let team = state
        .store
        .get_event_team(&team_id)
        .await
        .ok_or_else(|| not_found_error("Team not found."))?;

    Ok(ok_data(json!({ "alreadyPaid": false, "team": team })))
}
