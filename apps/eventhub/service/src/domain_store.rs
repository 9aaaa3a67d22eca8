use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::EventKind;
use crate::config::Config;

const MAX_NAME_CHARS: usize = 120;
const MAX_TEAM_NAME_CHARS: usize = 64;
const MAX_BIO_CHARS: usize = 500;
const MAX_EMAIL_CHARS: usize = 254;
const MIN_YEAR: u8 = 1;
const MAX_YEAR: u8 = 6;
const DRIVE_LINK_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

#[derive(Clone)]
pub struct DomainStore {
    state: Arc<RwLock<DomainStoreState>>,
    path: Option<PathBuf>,
    pending_hold: chrono::Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DomainStoreState {
    users: HashMap<String, UserRecord>,
    event_registrations: HashMap<String, EventRegistrationRecord>,
    teams: HashMap<String, TeamRecord>,
    team_invites: HashMap<String, TeamInviteRecord>,
    event_teams: HashMap<String, EventTeamRecord>,
    payment_orders: HashMap<String, PaymentOrderRecord>,
    payments: HashMap<String, PaymentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_year")]
    pub year: u8,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub college: Option<String>,
    pub branch: Option<String>,
    pub year: Option<u8>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub payment_id: String,
    pub order_id: String,
    pub paid_at: DateTime<Utc>,
    pub amount_minor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRegistrationRecord {
    pub id: String,
    pub event_id: u32,
    pub kind: EventKind,
    pub leader_email: String,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_details: Option<PaymentDetails>,
    #[serde(default)]
    pub pending_order_id: Option<String>,
    #[serde(default)]
    pub pending_order_amount: Option<u64>,
    #[serde(default)]
    pub pending_order_created_at: Option<DateTime<Utc>>,
}

impl EventRegistrationRecord {
    pub fn includes(&self, email: &str) -> bool {
        self.leader_email == email || self.participants.iter().any(|row| row == email)
    }
}

/// Leader and members are already normalized and de-duplicated.
#[derive(Debug, Clone)]
pub struct RegisterEventInput {
    pub event_id: u32,
    pub kind: EventKind,
    pub leader_email: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveEventOutcome {
    Deleted,
    Left(EventRegistrationRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Leader,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    pub role: TeamRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: String,
    pub team_name: String,
    pub team_leader: String,
    pub team_leader_email: String,
    pub members: Vec<TeamMember>,
    #[serde(default)]
    pub drive_link: String,
    #[serde(default)]
    pub finalized: bool,
    #[serde(default)]
    pub shortlisted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TeamRecord {
    pub fn has_member(&self, email: &str) -> bool {
        self.members.iter().any(|member| member.email == email)
    }
}

#[derive(Debug, Clone)]
pub struct TeamMemberIdentity {
    pub uid: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInviteRecord {
    pub invite_id: String,
    pub team_id: String,
    pub team_name: String,
    pub invited_by: String,
    pub invitee_email: String,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTeamRecord {
    pub team_id: String,
    pub event_id: u32,
    pub leader_email: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub payment_done: bool,
    #[serde(default)]
    pub registered: bool,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<u64>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_order_id: Option<String>,
    #[serde(default)]
    pub pending_order_amount: Option<u64>,
    #[serde(default)]
    pub pending_order_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PaymentTarget {
    Registration(String),
    EventTeam(String),
}

impl PaymentTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Registration(id) | Self::EventTeam(id) => id,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::EventTeam(_) => "event_team",
        }
    }
}

/// Snapshot of the thing an order pays for, used to price and authorize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTargetSummary {
    pub target: PaymentTarget,
    pub event_id: u32,
    pub leader_email: String,
    pub participant_count: usize,
    pub paid: bool,
    pub pending_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Mismatch,
    /// Captured after its registration or event team was removed.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrderRecord {
    pub order_id: String,
    pub gateway: String,
    pub target: PaymentTarget,
    pub event_id: u32,
    pub payer_email: String,
    pub amount_minor: u64,
    pub currency: String,
    pub status: OrderStatus,
    /// Team size the amount was priced for.
    #[serde(default)]
    pub participant_count: usize,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentOrderInput {
    pub order_id: String,
    pub gateway: String,
    pub target: PaymentTarget,
    pub payer_email: String,
    pub amount_minor: u64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub order_id: String,
    pub gateway: String,
    pub status: String,
    pub amount_minor: u64,
    pub currency: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A capture reported by the gateway for one of our orders.
#[derive(Debug, Clone)]
pub struct CaptureInput {
    pub order_id: String,
    pub payment_id: String,
    pub gateway_order_id: String,
    pub amount_minor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Applied {
        order: PaymentOrderRecord,
    },
    /// The money was taken but the order's target no longer exists.
    Orphaned {
        order: PaymentOrderRecord,
    },
    AlreadyApplied {
        order: PaymentOrderRecord,
    },
    /// The target was already paid through a different payment.
    Duplicate {
        order: PaymentOrderRecord,
    },
    Rejected {
        order: PaymentOrderRecord,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DomainStoreError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{message}")]
    Rejected { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Forbidden { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Persistence { message: String },
}

impl DomainStore {
    pub fn from_config(config: &Config) -> Self {
        let path = config.domain_store_path.clone();
        let state = Self::load_state(path.as_ref());
        let pending_hold = chrono::Duration::from_std(Duration::from_secs(
            config.payment_pending_hold_seconds,
        ))
        .unwrap_or_else(|_| chrono::Duration::days(365));

        Self {
            state: Arc::new(RwLock::new(state)),
            path,
            pending_hold,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    // ---- users ----

    /// Returns the profile and whether it was created by this call.
    pub async fn create_user_if_absent(
        &self,
        input: CreateUserInput,
    ) -> Result<(UserRecord, bool), DomainStoreError> {
        let uid = normalize_non_empty(&input.uid, "uid")?;
        let email = require_email(&input.email, "email")?;
        let name = truncate_chars(input.name.trim(), MAX_NAME_CHARS);

        self.mutate(|state| {
            if let Some(existing) = state.users.get(&uid) {
                return Ok((existing.clone(), false));
            }
            if state.users.values().any(|user| user.email == email) {
                return Err(DomainStoreError::Conflict {
                    message: "Another profile already uses this email.".to_string(),
                });
            }

            let record = UserRecord {
                uid: uid.clone(),
                name,
                email,
                phone: input.phone.unwrap_or_default().trim().to_string(),
                college: String::new(),
                branch: String::new(),
                year: default_year(),
                bio: String::new(),
                team_id: None,
                created_at: Utc::now(),
                updated_at: None,
            };
            state.users.insert(uid.clone(), record.clone());
            Ok((record, true))
        })
        .await
    }

    pub async fn update_user(
        &self,
        uid: &str,
        input: UpdateUserInput,
    ) -> Result<UserRecord, DomainStoreError> {
        let name = input
            .name
            .as_deref()
            .map(|value| normalize_bounded(value, "name", MAX_NAME_CHARS))
            .transpose()?;
        let email = input
            .email
            .as_deref()
            .map(|value| require_email(value, "email"))
            .transpose()?;
        let phone = input.phone.as_deref().map(normalize_phone).transpose()?;
        let college = input
            .college
            .as_deref()
            .map(|value| bounded_optional(value, "college", MAX_NAME_CHARS))
            .transpose()?;
        let branch = input
            .branch
            .as_deref()
            .map(|value| bounded_optional(value, "branch", MAX_NAME_CHARS))
            .transpose()?;
        let bio = input
            .bio
            .as_deref()
            .map(|value| bounded_optional(value, "bio", MAX_BIO_CHARS))
            .transpose()?;
        if let Some(year) = input.year {
            if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                return Err(DomainStoreError::Validation {
                    field: "year",
                    message: format!("Year must be between {MIN_YEAR} and {MAX_YEAR}."),
                });
            }
        }

        self.mutate(|state| {
            let user = state.users.get_mut(uid).ok_or_else(profile_not_found)?;
            // Team and registration lookups key on the sign-in email.
            if email.as_ref().is_some_and(|email| *email != user.email) {
                return Err(DomainStoreError::Validation {
                    field: "email",
                    message: "Email is tied to your sign-in account and cannot be changed."
                        .to_string(),
                });
            }
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(phone) = phone {
                user.phone = phone;
            }
            if let Some(college) = college {
                user.college = college;
            }
            if let Some(branch) = branch {
                user.branch = branch;
            }
            if let Some(year) = input.year {
                user.year = year;
            }
            if let Some(bio) = bio {
                user.bio = bio;
            }
            user.updated_at = Some(Utc::now());
            Ok(user.clone())
        })
        .await
    }

    pub async fn get_user(&self, uid: &str) -> Option<UserRecord> {
        self.state.read().await.users.get(uid).cloned()
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        let email = normalize_email(email)?;
        let state = self.state.read().await;
        state.users.values().find(|user| user.email == email).cloned()
    }

    pub async fn list_users(&self) -> Vec<UserRecord> {
        let state = self.state.read().await;
        let mut users: Vec<UserRecord> = state.users.values().cloned().collect();
        users.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.email.cmp(&right.email))
        });
        users
    }

    /// Emails from `emails` with no matching profile, in input order.
    pub async fn unregistered_emails(&self, emails: &[String]) -> Vec<String> {
        let state = self.state.read().await;
        emails
            .iter()
            .filter(|email| !state.users.values().any(|user| user.email == **email))
            .cloned()
            .collect()
    }

    // ---- event registrations ----

    pub async fn register_for_event(
        &self,
        input: RegisterEventInput,
    ) -> Result<EventRegistrationRecord, DomainStoreError> {
        self.mutate(|state| {
            let event_id = input.event_id;
            let leader = input.leader_email.clone();

            if state
                .event_registrations
                .values()
                .any(|row| row.event_id == event_id && row.includes(&leader))
            {
                return Err(DomainStoreError::Conflict {
                    message: "Already registered".to_string(),
                });
            }

            if input.kind == EventKind::Team && !input.members.is_empty() {
                let missing: Vec<&str> = input
                    .members
                    .iter()
                    .filter(|email| !state.users.values().any(|user| user.email == **email))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(DomainStoreError::Rejected {
                        message: format!("Not registered: {}", missing.join(", ")),
                    });
                }

                if let Some(duplicate) = input.members.iter().find(|email| {
                    state
                        .event_registrations
                        .values()
                        .any(|row| row.event_id == event_id && row.includes(email))
                }) {
                    return Err(DomainStoreError::Conflict {
                        message: format!("{duplicate} already registered"),
                    });
                }
            }

            let id = registration_id(event_id, &leader);
            if state.event_registrations.contains_key(&id) {
                return Err(DomainStoreError::Conflict {
                    message: "Already registered".to_string(),
                });
            }

            let mut participants = Vec::with_capacity(input.members.len() + 1);
            participants.push(leader.clone());
            participants.extend(input.members.iter().cloned());

            let record = EventRegistrationRecord {
                id: id.clone(),
                event_id,
                kind: input.kind,
                leader_email: leader,
                participants,
                created_at: Utc::now(),
                payment_status: PaymentStatus::Pending,
                payment_details: None,
                pending_order_id: None,
                pending_order_amount: None,
                pending_order_created_at: None,
            };
            state.event_registrations.insert(id, record.clone());
            Ok(record)
        })
        .await
    }

    pub async fn leave_event(
        &self,
        event_id: u32,
        email: &str,
    ) -> Result<LeaveEventOutcome, DomainStoreError> {
        let hold = self.pending_hold;
        self.mutate(|state| {
            let registration = state
                .event_registrations
                .values()
                .find(|row| row.event_id == event_id && row.includes(email))
                .cloned()
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Not registered for this event".to_string(),
                })?;

            if registration.payment_status == PaymentStatus::Paid {
                return Err(DomainStoreError::Conflict {
                    message: "Paid registrations cannot be withdrawn.".to_string(),
                });
            }
            if order_in_flight(
                state,
                registration.pending_order_id.as_deref(),
                registration.pending_order_created_at,
                hold,
            ) {
                return Err(payment_in_progress());
            }

            if registration.leader_email == email {
                state.event_registrations.remove(&registration.id);
                return Ok(LeaveEventOutcome::Deleted);
            }

            let Some(record) = state.event_registrations.get_mut(&registration.id) else {
                return Ok(LeaveEventOutcome::Deleted);
            };
            record.participants.retain(|row| row != email);
            if record.participants.is_empty() {
                state.event_registrations.remove(&registration.id);
                return Ok(LeaveEventOutcome::Deleted);
            }
            Ok(LeaveEventOutcome::Left(record.clone()))
        })
        .await
    }

    pub async fn registrations_for_email(&self, email: &str) -> Vec<EventRegistrationRecord> {
        let state = self.state.read().await;
        let mut rows: Vec<EventRegistrationRecord> = state
            .event_registrations
            .values()
            .filter(|row| row.includes(email))
            .cloned()
            .collect();
        rows.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        rows
    }

    pub async fn get_registration(&self, id: &str) -> Option<EventRegistrationRecord> {
        self.state.read().await.event_registrations.get(id).cloned()
    }

    pub async fn list_registrations(&self) -> Vec<EventRegistrationRecord> {
        let state = self.state.read().await;
        let mut rows: Vec<EventRegistrationRecord> =
            state.event_registrations.values().cloned().collect();
        rows.sort_by(|left, right| {
            left.event_id
                .cmp(&right.event_id)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        rows
    }

    // ---- hackathon teams ----

    pub async fn create_team(
        &self,
        leader: TeamMemberIdentity,
        team_name: &str,
    ) -> Result<TeamRecord, DomainStoreError> {
        let team_name = normalize_bounded(team_name, "team_name", MAX_TEAM_NAME_CHARS)?;
        let leader_email = require_email(&leader.email, "email")?;

        self.mutate(|state| {
            ensure_not_in_team(state, &leader_email)?;
            if state
                .teams
                .values()
                .any(|team| team.team_name.eq_ignore_ascii_case(&team_name))
            {
                return Err(DomainStoreError::Conflict {
                    message: "Team name is already taken.".to_string(),
                });
            }

            let now = Utc::now();
            let team_id = format!("team_{}", Uuid::new_v4().simple());
            let record = TeamRecord {
                team_id: team_id.clone(),
                team_name,
                team_leader: leader.name.clone(),
                team_leader_email: leader_email.clone(),
                members: vec![TeamMember {
                    name: leader.name.clone(),
                    email: leader_email.clone(),
                    role: TeamRole::Leader,
                }],
                drive_link: String::new(),
                finalized: false,
                shortlisted: false,
                created_at: now,
                updated_at: None,
            };
            state.teams.insert(team_id.clone(), record.clone());
            set_user_team(state, &leader.uid, &leader_email, Some(&team_id));
            Ok(record)
        })
        .await
    }

    pub async fn join_team(
        &self,
        member: TeamMemberIdentity,
        leader_email: &str,
        max_size: usize,
    ) -> Result<TeamRecord, DomainStoreError> {
        let leader_email = require_email(leader_email, "leader_email")?;
        let member_email = require_email(&member.email, "email")?;

        self.mutate(|state| {
            ensure_not_in_team(state, &member_email)?;
            let team_id = state
                .teams
                .values()
                .find(|team| team.team_leader_email == leader_email && !team.finalized)
                .map(|team| team.team_id.clone())
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Team not found or already finalized".to_string(),
                })?;
            add_team_member(state, &team_id, &member, &member_email, max_size)
        })
        .await
    }

    pub async fn team_for_email(&self, email: &str) -> Option<TeamRecord> {
        let state = self.state.read().await;
        state
            .teams
            .values()
            .find(|team| team.has_member(email))
            .cloned()
    }

    pub async fn get_team(&self, team_id: &str) -> Option<TeamRecord> {
        self.state.read().await.teams.get(team_id).cloned()
    }

    pub async fn list_teams(&self) -> Vec<TeamRecord> {
        let state = self.state.read().await;
        let mut teams: Vec<TeamRecord> = state.teams.values().cloned().collect();
        teams.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        teams
    }

    pub async fn remove_team_member(
        &self,
        team_id: &str,
        actor_email: &str,
        member_email: &str,
    ) -> Result<TeamRecord, DomainStoreError> {
        let member_email = require_email(member_email, "member_email")?;

        self.mutate(|state| {
            let team = editable_team_for_leader(state, team_id, actor_email)?;
            if member_email == team.team_leader_email {
                return Err(DomainStoreError::Rejected {
                    message: "The leader cannot be removed; delete the team instead.".to_string(),
                });
            }
            if !team.has_member(&member_email) {
                return Err(DomainStoreError::NotFound {
                    message: "Member not found in team".to_string(),
                });
            }

            let updated = {
                let Some(record) = state.teams.get_mut(team_id) else {
                    return Err(team_not_found());
                };
                record.members.retain(|member| member.email != member_email);
                record.updated_at = Some(Utc::now());
                record.clone()
            };
            set_user_team_by_email(state, &member_email, None);
            Ok(updated)
        })
        .await
    }

    pub async fn leave_team(&self, team_id: &str, actor_email: &str) -> Result<(), DomainStoreError> {
        self.mutate(|state| {
            let team = state.teams.get(team_id).cloned().ok_or_else(team_not_found)?;
            if !team.has_member(actor_email) {
                return Err(DomainStoreError::Forbidden {
                    message: "You are not a member of this team.".to_string(),
                });
            }
            if team.team_leader_email == actor_email {
                return Err(DomainStoreError::Rejected {
                    message: "The leader cannot leave; delete the team instead.".to_string(),
                });
            }
            if team.finalized {
                return Err(team_finalized());
            }

            if let Some(record) = state.teams.get_mut(team_id) {
                record.members.retain(|member| member.email != actor_email);
                record.updated_at = Some(Utc::now());
            }
            set_user_team_by_email(state, actor_email, None);
            Ok(())
        })
        .await
    }

    pub async fn delete_team(
        &self,
        team_id: &str,
        actor_email: &str,
    ) -> Result<TeamRecord, DomainStoreError> {
        self.mutate(|state| {
            let team = editable_team_for_leader(state, team_id, actor_email)?;
            state.teams.remove(team_id);
            for member in &team.members {
                set_user_team_by_email(state, &member.email, None);
            }
            state
                .team_invites
                .retain(|_, invite| invite.team_id != team_id);
            Ok(team)
        })
        .await
    }

    /// Finalizing an already finalized team is a no-op.
    pub async fn finalize_team(
        &self,
        team_id: &str,
        actor_email: &str,
        min_size: usize,
    ) -> Result<TeamRecord, DomainStoreError> {
        self.mutate(|state| {
            let team = state.teams.get_mut(team_id).ok_or_else(team_not_found)?;
            if team.team_leader_email != actor_email {
                return Err(leader_only());
            }
            if team.finalized {
                return Ok(team.clone());
            }
            if team.members.len() < min_size {
                return Err(DomainStoreError::Rejected {
                    message: format!("A team needs at least {min_size} members to finalize."),
                });
            }
            team.finalized = true;
            team.updated_at = Some(Utc::now());
            let finalized = team.clone();
            for invite in state.team_invites.values_mut() {
                if invite.team_id == team_id && invite.status == InviteStatus::Pending {
                    invite.status = InviteStatus::Revoked;
                    invite.responded_at = Some(Utc::now());
                }
            }
            Ok(finalized)
        })
        .await
    }

    pub async fn set_drive_link(
        &self,
        team_id: &str,
        actor_email: &str,
        drive_link: &str,
    ) -> Result<TeamRecord, DomainStoreError> {
        let drive_link = normalize_drive_link(drive_link)?;

        self.mutate(|state| {
            editable_team_for_leader(state, team_id, actor_email)?;
            let record = state.teams.get_mut(team_id).ok_or_else(team_not_found)?;
            record.drive_link = drive_link;
            record.updated_at = Some(Utc::now());
            Ok(record.clone())
        })
        .await
    }

    pub async fn set_team_shortlisted(
        &self,
        team_id: &str,
        shortlisted: bool,
    ) -> Result<TeamRecord, DomainStoreError> {
        self.mutate(|state| {
            let record = state.teams.get_mut(team_id).ok_or_else(team_not_found)?;
            record.shortlisted = shortlisted;
            record.updated_at = Some(Utc::now());
            Ok(record.clone())
        })
        .await
    }

    pub async fn create_team_invite(
        &self,
        team_id: &str,
        actor_email: &str,
        invitee_email: &str,
        max_size: usize,
    ) -> Result<TeamInviteRecord, DomainStoreError> {
        let invitee_email = require_email(invitee_email, "email")?;

        self.mutate(|state| {
            let team = editable_team_for_leader(state, team_id, actor_email)?;
            if team.has_member(&invitee_email) {
                return Err(DomainStoreError::Conflict {
                    message: "That user is already in your team.".to_string(),
                });
            }
            if team.members.len() >= max_size {
                return Err(team_full());
            }
            if state.team_invites.values().any(|invite| {
                invite.team_id == team_id
                    && invite.invitee_email == invitee_email
                    && invite.status == InviteStatus::Pending
            }) {
                return Err(DomainStoreError::Conflict {
                    message: "An invite is already pending for this email.".to_string(),
                });
            }

            let invite = TeamInviteRecord {
                invite_id: format!("invite_{}", Uuid::new_v4().simple()),
                team_id: team.team_id.clone(),
                team_name: team.team_name.clone(),
                invited_by: team.team_leader_email.clone(),
                invitee_email,
                status: InviteStatus::Pending,
                created_at: Utc::now(),
                responded_at: None,
            };
            state
                .team_invites
                .insert(invite.invite_id.clone(), invite.clone());
            Ok(invite)
        })
        .await
    }

    pub async fn pending_invites_for(&self, email: &str) -> Vec<TeamInviteRecord> {
        let state = self.state.read().await;
        let mut invites: Vec<TeamInviteRecord> = state
            .team_invites
            .values()
            .filter(|invite| invite.invitee_email == email && invite.status == InviteStatus::Pending)
            .cloned()
            .collect();
        invites.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        invites
    }

    pub async fn accept_team_invite(
        &self,
        invite_id: &str,
        member: TeamMemberIdentity,
        max_size: usize,
    ) -> Result<TeamRecord, DomainStoreError> {
        let member_email = require_email(&member.email, "email")?;

        self.mutate(|state| {
            let invite = state
                .team_invites
                .get(invite_id)
                .cloned()
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Invite not found.".to_string(),
                })?;
            if invite.invitee_email != member_email {
                return Err(DomainStoreError::Forbidden {
                    message: "This invite was sent to a different email.".to_string(),
                });
            }
            if invite.status != InviteStatus::Pending {
                return Err(DomainStoreError::Conflict {
                    message: "This invite is no longer pending.".to_string(),
                });
            }
            ensure_not_in_team(state, &member_email)?;
            let finalized = state
                .teams
                .get(&invite.team_id)
                .map(|team| team.finalized)
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Team not found or already finalized".to_string(),
                })?;
            if finalized {
                return Err(DomainStoreError::NotFound {
                    message: "Team not found or already finalized".to_string(),
                });
            }

            let team = add_team_member(state, &invite.team_id, &member, &member_email, max_size)?;
            if let Some(record) = state.team_invites.get_mut(invite_id) {
                record.status = InviteStatus::Accepted;
                record.responded_at = Some(Utc::now());
            }
            Ok(team)
        })
        .await
    }

    // ---- per-event teams ----

    pub async fn event_team_for(&self, event_id: u32, email: &str) -> Option<EventTeamRecord> {
        let state = self.state.read().await;
        state
            .event_teams
            .values()
            .find(|team| team.event_id == event_id && team.members.iter().any(|row| row == email))
            .cloned()
    }

    pub async fn get_event_team(&self, team_id: &str) -> Option<EventTeamRecord> {
        self.state.read().await.event_teams.get(team_id).cloned()
    }

    pub async fn list_event_teams(&self) -> Vec<EventTeamRecord> {
        let state = self.state.read().await;
        let mut teams: Vec<EventTeamRecord> = state.event_teams.values().cloned().collect();
        teams.sort_by(|left, right| {
            left.event_id
                .cmp(&right.event_id)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        teams
    }

    pub async fn create_event_team(
        &self,
        event_id: u32,
        leader_email: &str,
    ) -> Result<EventTeamRecord, DomainStoreError> {
        let leader_email = require_email(leader_email, "email")?;

        self.mutate(|state| {
            ensure_not_in_event_team(state, event_id, &leader_email)?;
            let now = Utc::now();
            let record = EventTeamRecord {
                team_id: format!("evteam_{}", Uuid::new_v4().simple()),
                event_id,
                leader_email: leader_email.clone(),
                members: vec![leader_email],
                payment_done: false,
                registered: false,
                payment_id: None,
                payment_amount: None,
                paid_at: None,
                pending_order_id: None,
                pending_order_amount: None,
                pending_order_created_at: None,
                created_at: now,
                updated_at: None,
            };
            state
                .event_teams
                .insert(record.team_id.clone(), record.clone());
            Ok(record)
        })
        .await
    }

    pub async fn join_event_team(
        &self,
        event_id: u32,
        leader_email: &str,
        member_email: &str,
        capacity: usize,
    ) -> Result<EventTeamRecord, DomainStoreError> {
        let leader_email = require_email(leader_email, "leaderEmail")?;
        let member_email = require_email(member_email, "email")?;
        let hold = self.pending_hold;

        self.mutate(|state| {
            let current = state
                .event_teams
                .values()
                .find(|team| team.event_id == event_id && team.leader_email == leader_email)
                .cloned()
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Team not found for this event.".to_string(),
                })?;
            ensure_not_in_event_team(state, event_id, &member_email)?;

            if current.registered || current.payment_done {
                return Err(DomainStoreError::Conflict {
                    message: "Team is already registered.".to_string(),
                });
            }
            if event_team_order_in_flight(state, &current, hold) {
                return Err(payment_in_progress());
            }
            if current.members.len() >= capacity {
                return Err(team_full());
            }

            let team = state
                .event_teams
                .get_mut(&current.team_id)
                .ok_or_else(team_not_found)?;
            team.members.push(member_email);
            team.updated_at = Some(Utc::now());
            Ok(team.clone())
        })
        .await
    }

    pub async fn disband_event_team(
        &self,
        event_id: u32,
        team_id: &str,
        actor_email: &str,
    ) -> Result<EventTeamRecord, DomainStoreError> {
        let hold = self.pending_hold;
        self.mutate(|state| {
            let team = event_team_in_event(state, event_id, team_id)?;
            if team.leader_email != actor_email {
                return Err(leader_only());
            }
            if team.payment_done {
                return Err(DomainStoreError::Conflict {
                    message: "Paid teams cannot be disbanded.".to_string(),
                });
            }
            if event_team_order_in_flight(state, &team, hold) {
                return Err(payment_in_progress());
            }
            state.event_teams.remove(team_id);
            Ok(team)
        })
        .await
    }

    pub async fn remove_event_team_member(
        &self,
        event_id: u32,
        team_id: &str,
        actor_email: &str,
        member_email: &str,
    ) -> Result<EventTeamRecord, DomainStoreError> {
        let member_email = require_email(member_email, "memberEmail")?;
        let hold = self.pending_hold;

        self.mutate(|state| {
            let team = event_team_in_event(state, event_id, team_id)?;
            if team.leader_email != actor_email {
                return Err(DomainStoreError::Forbidden {
                    message: "Only leader can remove members".to_string(),
                });
            }
            if team.registered || team.payment_done {
                return Err(DomainStoreError::Rejected {
                    message: "Cannot remove members after registration".to_string(),
                });
            }
            if event_team_order_in_flight(state, &team, hold) {
                return Err(payment_in_progress());
            }
            if member_email == team.leader_email {
                return Err(DomainStoreError::Rejected {
                    message: "The leader cannot be removed; disband the team instead.".to_string(),
                });
            }
            if !team.members.iter().any(|row| *row == member_email) {
                return Err(DomainStoreError::Rejected {
                    message: "Member not in team".to_string(),
                });
            }

            let record = state.event_teams.get_mut(team_id).ok_or_else(team_not_found)?;
            record.members.retain(|row| *row != member_email);
            record.updated_at = Some(Utc::now());
            Ok(record.clone())
        })
        .await
    }

    // ---- payments ----

    pub async fn payment_target_summary(
        &self,
        target: &PaymentTarget,
    ) -> Result<PaymentTargetSummary, DomainStoreError> {
        let state = self.state.read().await;
        target_summary(&state, target)
    }

    /// Records a freshly created gateway order and marks it pending on its target.
    pub async fn record_payment_order(
        &self,
        input: CreatePaymentOrderInput,
    ) -> Result<PaymentOrderRecord, DomainStoreError> {
        self.mutate(|state| {
            let summary = target_summary(state, &input.target)?;
            if summary.paid {
                return Err(already_paid());
            }
            if state.payment_orders.contains_key(&input.order_id) {
                return Err(DomainStoreError::Conflict {
                    message: "Order already recorded.".to_string(),
                });
            }

            let now = Utc::now();
            let order = PaymentOrderRecord {
                order_id: input.order_id.clone(),
                gateway: input.gateway,
                target: input.target.clone(),
                event_id: summary.event_id,
                payer_email: input.payer_email,
                amount_minor: input.amount_minor,
                currency: input.currency,
                status: OrderStatus::Created,
                participant_count: summary.participant_count,
                payment_id: None,
                last_error: None,
                created_at: now,
                updated_at: now,
            };

            match &input.target {
                PaymentTarget::Registration(id) => {
                    if let Some(row) = state.event_registrations.get_mut(id) {
                        row.pending_order_id = Some(order.order_id.clone());
                        row.pending_order_amount = Some(order.amount_minor);
                        row.pending_order_created_at = Some(now);
                    }
                }
                PaymentTarget::EventTeam(id) => {
                    if let Some(row) = state.event_teams.get_mut(id) {
                        row.pending_order_id = Some(order.order_id.clone());
                        row.pending_order_amount = Some(order.amount_minor);
                        row.pending_order_created_at = Some(now);
                        row.updated_at = Some(now);
                    }
                }
            }

            state
                .payment_orders
                .insert(order.order_id.clone(), order.clone());
            Ok(order)
        })
        .await
    }

    pub async fn get_payment_order(&self, order_id: &str) -> Option<PaymentOrderRecord> {
        self.state.read().await.payment_orders.get(order_id).cloned()
    }

    pub async fn list_payment_orders(&self, status: Option<OrderStatus>) -> Vec<PaymentOrderRecord> {
        let state = self.state.read().await;
        let mut orders: Vec<PaymentOrderRecord> = state
            .payment_orders
            .values()
            .filter(|order| status.is_none_or(|expected| order.status == expected))
            .cloned()
            .collect();
        orders.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        orders
    }

    pub async fn upsert_payment(&self, record: PaymentRecord) -> Result<PaymentRecord, DomainStoreError> {
        self.mutate(|state| {
            let stored = state
                .payments
                .entry(record.payment_id.clone())
                .and_modify(|existing| {
                    existing.status = record.status.clone();
                    existing.amount_minor = record.amount_minor;
                    existing.method = record.method.clone().or(existing.method.take());
                    existing.email = record.email.clone().or(existing.email.take());
                    existing.contact = record.contact.clone().or(existing.contact.take());
                })
                .or_insert_with(|| record.clone());
            Ok(stored.clone())
        })
        .await
    }

    pub async fn get_payment(&self, payment_id: &str) -> Option<PaymentRecord> {
        self.state.read().await.payments.get(payment_id).cloned()
    }

    /// Applies a gateway capture to the order and its target in one write.
    pub async fn apply_payment_capture(
        &self,
        capture: CaptureInput,
    ) -> Result<CaptureOutcome, DomainStoreError> {
        self.mutate(|state| {
            let now = Utc::now();
            let order = state
                .payment_orders
                .get(&capture.order_id)
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Payment order not found.".to_string(),
                })?;

            if order.status == OrderStatus::Paid {
                let same_payment = order.payment_id.as_deref() == Some(capture.payment_id.as_str());
                let order = order.clone();
                return Ok(if same_payment {
                    CaptureOutcome::AlreadyApplied { order }
                } else {
                    CaptureOutcome::Duplicate { order }
                });
            }
            if order.status == OrderStatus::Orphaned {
                return Ok(CaptureOutcome::Orphaned {
                    order: order.clone(),
                });
            }
            let order = order.clone();

            let target_exists = match &order.target {
                PaymentTarget::Registration(id) => state.event_registrations.contains_key(id),
                PaymentTarget::EventTeam(id) => state.event_teams.contains_key(id),
            };
            let reason = if capture.gateway_order_id != order.order_id {
                Some("Payment belongs to a different order.".to_string())
            } else if capture.amount_minor != order.amount_minor {
                Some(format!(
                    "Captured amount {} does not match expected {}.",
                    capture.amount_minor, order.amount_minor
                ))
            } else {
                team_size_changed(state, &order)
            };
            if let Some(reason) = reason {
                let order = store_order_status(state, &order.order_id, now, |stored| {
                    stored.status = OrderStatus::Mismatch;
                    stored.last_error = Some(reason.clone());
                })?;
                return Ok(CaptureOutcome::Rejected { order, reason });
            }
            if !target_exists {
                let order = store_order_status(state, &order.order_id, now, |stored| {
                    stored.status = OrderStatus::Orphaned;
                    stored.payment_id = Some(capture.payment_id.clone());
                    stored.last_error = Some("Payment target no longer exists.".to_string());
                })?;
                return Ok(CaptureOutcome::Orphaned { order });
            }

            let order = store_order_status(state, &order.order_id, now, |stored| {
                stored.status = OrderStatus::Paid;
                stored.payment_id = Some(capture.payment_id.clone());
                stored.last_error = None;
            })?;

            let details = PaymentDetails {
                payment_id: capture.payment_id.clone(),
                order_id: order.order_id.clone(),
                paid_at: now,
                amount_minor: capture.amount_minor,
            };

            let duplicate = match &order.target {
                PaymentTarget::Registration(id) => match state.event_registrations.get_mut(id) {
                    Some(row) if row.payment_status == PaymentStatus::Paid => true,
                    Some(row) => {
                        row.payment_status = PaymentStatus::Paid;
                        row.payment_details = Some(details);
                        clear_pending(
                            &mut row.pending_order_id,
                            &mut row.pending_order_amount,
                            &mut row.pending_order_created_at,
                        );
                        false
                    }
                    None => false,
                },
                PaymentTarget::EventTeam(id) => match state.event_teams.get_mut(id) {
                    Some(row) if row.payment_done => true,
                    Some(row) => {
                        row.payment_done = true;
                        row.registered = true;
                        row.payment_id = Some(details.payment_id);
                        row.payment_amount = Some(details.amount_minor);
                        row.paid_at = Some(now);
                        row.updated_at = Some(now);
                        clear_pending(
                            &mut row.pending_order_id,
                            &mut row.pending_order_amount,
                            &mut row.pending_order_created_at,
                        );
                        false
                    }
                    None => false,
                },
            };

            if duplicate {
                return Ok(CaptureOutcome::Duplicate { order });
            }
            Ok(CaptureOutcome::Applied { order })
        })
        .await
    }

    fn load_state(path: Option<&PathBuf>) -> DomainStoreState {
        let Some(path) = path else {
            return DomainStoreState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return DomainStoreState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "eventhub.domain_store",
                    path = %path.display(),
                    error = %error,
                    "failed to read domain store; booting with empty state",
                );
                return DomainStoreState::default();
            }
        };

        match serde_json::from_str::<DomainStoreState>(&raw) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    target: "eventhub.domain_store",
                    path = %path.display(),
                    error = %error,
                    "failed to parse domain store; booting with empty state",
                );
                DomainStoreState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &DomainStoreState) -> Result<(), DomainStoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                DomainStoreError::Persistence {
                    message: format!("failed to prepare domain store directory: {error}"),
                }
            })?;
        }

        let payload =
            serde_json::to_vec(snapshot).map_err(|error| DomainStoreError::Persistence {
                message: format!("failed to encode domain store payload: {error}"),
            })?;
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| DomainStoreError::Persistence {
                message: format!("failed to write domain store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|error| {
            DomainStoreError::Persistence {
                message: format!("failed to finalize domain store payload: {error}"),
            }
        })?;

        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> Result<T, DomainStoreError>
    where
        F: FnOnce(&mut DomainStoreState) -> Result<T, DomainStoreError>,
    {
        // The write guard stays held through persistence so snapshots reach
        // disk in the order the mutations were applied.
        let mut state = self.state.write().await;
        let previous = state.clone();

        let result = match operation(&mut state) {
            Ok(result) => result,
            Err(error) => {
                *state = previous;
                return Err(error);
            }
        };

        if let Err(error) = self.persist_state(&state).await {
            *state = previous;
            return Err(error);
        }
        Ok(result)
    }
}

pub fn registration_id(event_id: u32, leader_email: &str) -> String {
    format!("{event_id}:{leader_email}")
}

/// Trims and lowercases an address, returning `None` when it is not a
/// plausible `local@domain.tld` email.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_CHARS {
        return None;
    }
    if email.chars().any(char::is_whitespace) {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }

    Some(email)
}

fn default_year() -> u8 {
    MIN_YEAR
}

fn require_email(raw: &str, field: &'static str) -> Result<String, DomainStoreError> {
    normalize_email(raw).ok_or_else(|| DomainStoreError::Validation {
        field,
        message: "Invalid email address.".to_string(),
    })
}

fn normalize_non_empty(value: &str, field: &'static str) -> Result<String, DomainStoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainStoreError::Validation {
            field,
            message: "value is required".to_string(),
        });
    }

    Ok(trimmed.to_string())
}

fn normalize_bounded(
    value: &str,
    field: &'static str,
    max_chars: usize,
) -> Result<String, DomainStoreError> {
    let trimmed = normalize_non_empty(value, field)?;
    if trimmed.chars().count() > max_chars {
        return Err(DomainStoreError::Validation {
            field,
            message: format!("must be at most {max_chars} characters"),
        });
    }
    Ok(trimmed)
}

fn bounded_optional(
    value: &str,
    field: &'static str,
    max_chars: usize,
) -> Result<String, DomainStoreError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max_chars {
        return Err(DomainStoreError::Validation {
            field,
            message: format!("must be at most {max_chars} characters"),
        });
    }
    Ok(trimmed.to_string())
}

fn normalize_phone(value: &str) -> Result<String, DomainStoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    let allowed = trimmed
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | ' ' | '(' | ')'));
    if !allowed || !(7..=15).contains(&digits) {
        return Err(DomainStoreError::Validation {
            field: "phone",
            message: "Enter a valid phone number.".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn normalize_drive_link(value: &str) -> Result<String, DomainStoreError> {
    let trimmed = value.trim();
    let host = trimmed
        .strip_prefix("https://")
        .and_then(|rest| rest.split(['/', '?', '#']).next())
        .unwrap_or_default()
        .to_lowercase();

    if !DRIVE_LINK_HOSTS.contains(&host.as_str()) {
        return Err(DomainStoreError::Validation {
            field: "drive_link",
            message: "Drive link must be an https Google Drive or Docs URL.".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn profile_not_found() -> DomainStoreError {
    DomainStoreError::NotFound {
        message: "Profile not found.".to_string(),
    }
}

fn team_not_found() -> DomainStoreError {
    DomainStoreError::NotFound {
        message: "Team not found.".to_string(),
    }
}

fn team_finalized() -> DomainStoreError {
    DomainStoreError::Conflict {
        message: "Team is already finalized.".to_string(),
    }
}

fn team_full() -> DomainStoreError {
    DomainStoreError::Conflict {
        message: "Team is full.".to_string(),
    }
}

fn leader_only() -> DomainStoreError {
    DomainStoreError::Forbidden {
        message: "Only the team leader can do this.".to_string(),
    }
}

fn already_paid() -> DomainStoreError {
    DomainStoreError::Conflict {
        message: "Payment already completed.".to_string(),
    }
}

fn store_order_status(
    state: &mut DomainStoreState,
    order_id: &str,
    now: DateTime<Utc>,
    update: impl FnOnce(&mut PaymentOrderRecord),
) -> Result<PaymentOrderRecord, DomainStoreError> {
    let stored = state
        .payment_orders
        .get_mut(order_id)
        .ok_or_else(|| DomainStoreError::NotFound {
            message: "Payment order not found.".to_string(),
        })?;
    update(stored);
    stored.updated_at = now;
    Ok(stored.clone())
}

/// An unpaid event team must still have the roster the order was priced for.
fn team_size_changed(state: &DomainStoreState, order: &PaymentOrderRecord) -> Option<String> {
    let PaymentTarget::EventTeam(team_id) = &order.target else {
        return None;
    };
    let team = state.event_teams.get(team_id)?;
    if team.payment_done || order.participant_count == 0 {
        return None;
    }
    (team.members.len() != order.participant_count)
        .then(|| "Team membership changed after the order was created.".to_string())
}

fn payment_in_progress() -> DomainStoreError {
    DomainStoreError::Conflict {
        message: "A payment is in progress; try again once it completes.".to_string(),
    }
}

/// True while `pending_order_id` names a created order younger than `hold`.
fn order_in_flight(
    state: &DomainStoreState,
    pending_order_id: Option<&str>,
    pending_since: Option<DateTime<Utc>>,
    hold: chrono::Duration,
) -> bool {
    let Some(order_id) = pending_order_id else {
        return false;
    };
    let open = state
        .payment_orders
        .get(order_id)
        .is_some_and(|order| order.status == OrderStatus::Created);
    open && pending_since.is_some_and(|since| Utc::now() - since < hold)
}

fn event_team_order_in_flight(
    state: &DomainStoreState,
    team: &EventTeamRecord,
    hold: chrono::Duration,
) -> bool {
    order_in_flight(
        state,
        team.pending_order_id.as_deref(),
        team.pending_order_created_at,
        hold,
    )
}

fn ensure_not_in_team(state: &DomainStoreState, email: &str) -> Result<(), DomainStoreError> {
    if state.teams.values().any(|team| team.has_member(email)) {
        return Err(DomainStoreError::Rejected {
            message: "You are already part of a team".to_string(),
        });
    }
    Ok(())
}

fn ensure_not_in_event_team(
    state: &DomainStoreState,
    event_id: u32,
    email: &str,
) -> Result<(), DomainStoreError> {
    if state
        .event_teams
        .values()
        .any(|team| team.event_id == event_id && team.members.iter().any(|row| row == email))
    {
        return Err(DomainStoreError::Conflict {
            message: "You are already in a team for this event.".to_string(),
        });
    }
    Ok(())
}

fn editable_team_for_leader(
    state: &DomainStoreState,
    team_id: &str,
    actor_email: &str,
) -> Result<TeamRecord, DomainStoreError> {
    let team = state.teams.get(team_id).cloned().ok_or_else(team_not_found)?;
    if team.team_leader_email != actor_email {
        return Err(leader_only());
    }
    if team.finalized {
        return Err(team_finalized());
    }
    Ok(team)
}

fn event_team_in_event(
    state: &DomainStoreState,
    event_id: u32,
    team_id: &str,
) -> Result<EventTeamRecord, DomainStoreError> {
    let team = state
        .event_teams
        .get(team_id)
        .cloned()
        .ok_or_else(team_not_found)?;
    if team.event_id != event_id {
        return Err(DomainStoreError::Rejected {
            message: "Team does not belong to this event".to_string(),
        });
    }
    Ok(team)
}

fn add_team_member(
    state: &mut DomainStoreState,
    team_id: &str,
    member: &TeamMemberIdentity,
    member_email: &str,
    max_size: usize,
) -> Result<TeamRecord, DomainStoreError> {
    let updated = {
        let team = state.teams.get_mut(team_id).ok_or_else(team_not_found)?;
        if team.members.len() >= max_size {
            return Err(team_full());
        }
        team.members.push(TeamMember {
            name: member.name.clone(),
            email: member_email.to_string(),
            role: TeamRole::Member,
        });
        team.updated_at = Some(Utc::now());
        team.clone()
    };
    set_user_team(state, &member.uid, member_email, Some(team_id));
    Ok(updated)
}

fn set_user_team(state: &mut DomainStoreState, uid: &str, email: &str, team_id: Option<&str>) {
    if let Some(user) = state.users.get_mut(uid) {
        user.team_id = team_id.map(str::to_string);
        return;
    }
    set_user_team_by_email(state, email, team_id);
}

fn set_user_team_by_email(state: &mut DomainStoreState, email: &str, team_id: Option<&str>) {
    if let Some(user) = state.users.values_mut().find(|user| user.email == email) {
        user.team_id = team_id.map(str::to_string);
    }
}

fn target_summary(
    state: &DomainStoreState,
    target: &PaymentTarget,
) -> Result<PaymentTargetSummary, DomainStoreError> {
    match target {
        PaymentTarget::Registration(id) => {
            let row = state
                .event_registrations
                .get(id)
                .ok_or_else(|| DomainStoreError::NotFound {
                    message: "Registration not found.".to_string(),
                })?;
            Ok(PaymentTargetSummary {
                target: target.clone(),
                event_id: row.event_id,
                leader_email: row.leader_email.clone(),
                participant_count: row.participants.len(),
                paid: row.payment_status == PaymentStatus::Paid,
                pending_order_id: row.pending_order_id.clone(),
            })
        }
        PaymentTarget::EventTeam(id) => {
            let row = state.event_teams.get(id).ok_or_else(team_not_found)?;
            Ok(PaymentTargetSummary {
                target: target.clone(),
                event_id: row.event_id,
                leader_email: row.leader_email.clone(),
                participant_count: row.members.len(),
                paid: row.payment_done,
                pending_order_id: row.pending_order_id.clone(),
            })
        }
    }
}

fn clear_pending(
    order_id: &mut Option<String>,
    amount: &mut Option<u64>,
    created_at: &mut Option<DateTime<Utc>>,
) {
    *order_id = None;
    *amount = None;
    *created_at = None;
}
