use super::*;

#[derive(Debug, Deserialize)]
pub(super) struct CreateTeamRequestPayload {
    team_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JoinTeamRequestPayload {
    leader_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TeamReferencePayload {
    team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RemoveMemberRequestPayload {
    team_id: Option<String>,
    member_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DriveLinkRequestPayload {
    team_id: Option<String>,
    drive_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InviteMemberRequestPayload {
    team_id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ShortlistRequestPayload {
    shortlisted: Option<bool>,
}

fn required_team_id(value: Option<String>) -> Result<String, ApiErrorTuple> {
    required_string(value, "team_id", "The team id is required.")
}

fn audit_team(state: &AppState, name: &str, request_id: &str, user: &AuthUser, team_id: &str) {
    state.observability.audit(
        AuditEvent::new(name, request_id)
            .with_user_id(user.uid.clone())
            .with_attribute("team_id", team_id),
    );
    state.observability.increment_counter(name, request_id);
}

pub(super) async fn create_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateTeamRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_name = required_string(
        payload.team_name,
        "team_name",
        "The team name is required.",
    )?;
    let leader = member_identity(&state, &user).await;

    let team = state
        .store
        .create_team(leader, &team_name)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.created", &request_id(&headers), &user, &team.team_id);
    Ok(created_data(json!({ "team": team })))
}

pub(super) async fn join_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<JoinTeamRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let leader_email = required_email(
        payload.leader_email,
        "leader_email",
        "A valid leader email is required.",
    )?;
    let member = member_identity(&state, &user).await;

    let team = state
        .store
        .join_team(member, &leader_email, state.config.hackathon_team_max_size)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.joined", &request_id(&headers), &user, &team.team_id);
    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn get_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    let team = state.store.team_for_email(&user.email).await;
    let is_leader = team
        .as_ref()
        .is_some_and(|team| team.team_leader_email == user.email);

    ok_data(json!({ "team": team, "is_leader": is_leader }))
}

pub(super) async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RemoveMemberRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;
    let member_email = required_email(
        payload.member_email,
        "member_email",
        "A valid member email is required.",
    )?;

    let team = state
        .store
        .remove_team_member(&team_id, &user.email, &member_email)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.member_removed", &request_id(&headers), &user, &team_id);
    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn leave_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TeamReferencePayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;

    state
        .store
        .leave_team(&team_id, &user.email)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.left", &request_id(&headers), &user, &team_id);
    Ok(ok_data(json!({ "left": true, "team_id": team_id })))
}

pub(super) async fn delete_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TeamReferencePayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;

    let team = state
        .store
        .delete_team(&team_id, &user.email)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.deleted", &request_id(&headers), &user, &team_id);
    Ok(ok_data(json!({ "deleted": true, "team_id": team.team_id })))
}

pub(super) async fn finalize_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TeamReferencePayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;

    let team = state
        .store
        .finalize_team(&team_id, &user.email, state.config.hackathon_team_min_size)
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.finalized", &request_id(&headers), &user, &team_id);
    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn set_drive_link(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<DriveLinkRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;
    let drive_link = required_string(
        payload.drive_link,
        "drive_link",
        "The drive link is required.",
    )?;

    let team = state
        .store
        .set_drive_link(&team_id, &user.email, &drive_link)
        .await
        .map_err(map_domain_store_error)?;

    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn invite_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<InviteMemberRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let team_id = required_team_id(payload.team_id)?;
    let invitee = required_email(payload.email, "email", "A valid email is required.")?;

    let invite = state
        .store
        .create_team_invite(
            &team_id,
            &user.email,
            &invitee,
            state.config.hackathon_team_max_size,
        )
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.invited", &request_id(&headers), &user, &team_id);
    Ok(created_data(json!({ "invite": invite })))
}

pub(super) async fn list_invites(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    let invites = state.store.pending_invites_for(&user.email).await;
    ok_data(json!({ "invites": invites }))
}

pub(super) async fn accept_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path(invite_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let member = member_identity(&state, &user).await;

    let team = state
        .store
        .accept_team_invite(
            invite_id.trim(),
            member,
            state.config.hackathon_team_max_size,
        )
        .await
        .map_err(map_domain_store_error)?;

    audit_team(&state, "team.invite_accepted", &request_id(&headers), &user, &team.team_id);
    Ok(ok_data(json!({ "team": team })))
}

pub(super) async fn shortlist_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Path(team_id): Path<String>,
    Json(payload): Json<ShortlistRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let Some(shortlisted) = payload.shortlisted else {
        return Err(validation_error(
            "shortlisted",
            "The shortlisted field is required.",
        ));
    };

    let team = state
        .store
        .set_team_shortlisted(team_id.trim(), shortlisted)
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("team.shortlisted", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_outcome(if shortlisted { "shortlisted" } else { "cleared" })
            .with_attribute("team_id", team.team_id.clone()),
    );
    state
        .observability
        .increment_counter("team.shortlisted", &request_id);

    Ok(ok_data(json!({ "team": team })))
}
