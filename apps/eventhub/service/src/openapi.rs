use serde_json::{Map, Value, json};

pub const ROUTE_OPENAPI_JSON: &str = "/openapi.json";
pub const ROUTE_EVENTS: &str = "/api/v1/events";
pub const ROUTE_EVENT_BY_ID: &str = "/api/v1/events/:event_id";
pub const ROUTE_USER_CREATE: &str = "/api/v1/user/create";
pub const ROUTE_USER_UPDATE: &str = "/api/v1/user/update";
pub const ROUTE_USER_PROFILE: &str = "/api/v1/user/profile";
pub const ROUTE_USERS: &str = "/api/v1/users";
pub const ROUTE_USER_EXISTS: &str = "/api/v1/users/:uid/exists";
pub const ROUTE_USERS_CHECK_EMAILS: &str = "/api/v1/users/check-emails";
pub const ROUTE_EVENT_REGISTER: &str = "/api/v1/event/register";
pub const ROUTE_EVENT_LEAVE: &str = "/api/v1/event/leave";
pub const ROUTE_EVENT_MY_REGISTRATIONS: &str = "/api/v1/event/my-registrations";
pub const ROUTE_TEAM_CREATE: &str = "/api/v1/team/create";
pub const ROUTE_TEAM_JOIN: &str = "/api/v1/team/join";
pub const ROUTE_TEAM_GET: &str = "/api/v1/team/get";
pub const ROUTE_TEAM_REMOVE: &str = "/api/v1/team/remove";
pub const ROUTE_TEAM_LEAVE: &str = "/api/v1/team/leave";
pub const ROUTE_TEAM_DELETE: &str = "/api/v1/team/delete";
pub const ROUTE_TEAM_FINALIZE: &str = "/api/v1/team/finalize";
pub const ROUTE_TEAM_DRIVE_LINK: &str = "/api/v1/team/drive-link";
pub const ROUTE_TEAM_INVITE: &str = "/api/v1/team/invite";
pub const ROUTE_TEAM_INVITES: &str = "/api/v1/team/invites";
pub const ROUTE_TEAM_INVITE_ACCEPT: &str = "/api/v1/team/invites/:invite_id/accept";
pub const ROUTE_ADMIN_TEAM_SHORTLIST: &str = "/api/v1/admin/teams/:team_id/shortlist";
pub const ROUTE_EVENT_TEAMS_ME: &str = "/api/v1/events/:event_id/teams/me";
pub const ROUTE_EVENT_TEAMS_CREATE: &str = "/api/v1/events/:event_id/teams/create";
pub const ROUTE_EVENT_TEAMS_JOIN: &str = "/api/v1/events/:event_id/teams/join";
pub const ROUTE_EVENT_TEAM_BY_ID: &str = "/api/v1/events/:event_id/teams/:team_id";
pub const ROUTE_EVENT_TEAM_REMOVE: &str = "/api/v1/events/:event_id/teams/:team_id/remove";
pub const ROUTE_EVENT_TEAM_PAY: &str = "/api/v1/events/:event_id/teams/:team_id/pay";
pub const ROUTE_PAYMENT_CREATE_ORDER: &str = "/api/v1/payment/create-order";
pub const ROUTE_PAYMENT_VERIFY: &str = "/api/v1/payment/verify-payment";
pub const ROUTE_VERIFY_PAYMENT_BY_ORDER: &str = "/api/v1/verify-payment";
pub const ROUTE_PAYMENT_WEBHOOK: &str = "/api/v1/payment/webhook";
pub const ROUTE_PAYMENT_BY_ID: &str = "/api/v1/payment/payments/:payment_id";

#[derive(Clone, Copy)]
struct OpenApiContract {
    method: &'static str,
    route_path: &'static str,
    operation_id: &'static str,
    summary: &'static str,
    tag: &'static str,
    secured: bool,
    success_status: &'static str,
    request_example: Option<&'static str>,
    response_example: Option<&'static str>,
}

const fn contract(
    method: &'static str,
    route_path: &'static str,
    operation_id: &'static str,
    summary: &'static str,
    tag: &'static str,
) -> OpenApiContract {
    OpenApiContract {
        method,
        route_path,
        operation_id,
        summary,
        tag,
        secured: true,
        success_status: "200",
        request_example: None,
        response_example: None,
    }
}

const OPENAPI_CONTRACTS: &[OpenApiContract] = &[
    OpenApiContract {
        secured: false,
        response_example: Some("events"),
        ..contract("get", ROUTE_EVENTS, "listEvents", "List the event catalog.", "events")
    },
    OpenApiContract {
        secured: false,
        ..contract("get", ROUTE_EVENT_BY_ID, "getEvent", "Fetch one catalog event.", "events")
    },
    OpenApiContract {
        success_status: "201",
        response_example: Some("user_create"),
        ..contract(
            "post",
            ROUTE_USER_CREATE,
            "createUser",
            "Create the caller's profile from identity claims if absent.",
            "users",
        )
    },
    OpenApiContract {
        request_example: Some("user_update"),
        ..contract("post", ROUTE_USER_UPDATE, "updateUser", "Update the caller's profile.", "users")
    },
    contract("get", ROUTE_USER_PROFILE, "userProfile", "Fetch the caller's profile.", "users"),
    contract("get", ROUTE_USERS, "listUsers", "List registered users for member pickers.", "users"),
    OpenApiContract {
        secured: false,
        ..contract("get", ROUTE_USER_EXISTS, "userExists", "Check whether a profile exists.", "users")
    },
    OpenApiContract {
        request_example: Some("check_emails"),
        response_example: Some("check_emails"),
        ..contract(
            "post",
            ROUTE_USERS_CHECK_EMAILS,
            "checkEmails",
            "Return the given emails that have no profile.",
            "users",
        )
    },
    OpenApiContract {
        success_status: "201",
        request_example: Some("event_register"),
        response_example: Some("event_register"),
        ..contract(
            "post",
            ROUTE_EVENT_REGISTER,
            "registerEvent",
            "Register the caller (and team members) for an event.",
            "registrations",
        )
    },
    OpenApiContract {
        request_example: Some("event_leave"),
        ..contract(
            "post",
            ROUTE_EVENT_LEAVE,
            "leaveEvent",
            "Withdraw from an event registration.",
            "registrations",
        )
    },
    contract(
        "get",
        ROUTE_EVENT_MY_REGISTRATIONS,
        "myRegistrations",
        "List registrations the caller leads or participates in.",
        "registrations",
    ),
    OpenApiContract {
        success_status: "201",
        request_example: Some("team_create"),
        ..contract("post", ROUTE_TEAM_CREATE, "createTeam", "Create a hackathon team.", "teams")
    },
    OpenApiContract {
        request_example: Some("team_join"),
        ..contract("post", ROUTE_TEAM_JOIN, "joinTeam", "Join a team by its leader's email.", "teams")
    },
    contract("get", ROUTE_TEAM_GET, "getTeam", "Fetch the caller's team.", "teams"),
    OpenApiContract {
        request_example: Some("team_remove"),
        ..contract("post", ROUTE_TEAM_REMOVE, "removeTeamMember", "Remove a team member.", "teams")
    },
    OpenApiContract {
        request_example: Some("team_ref"),
        ..contract("post", ROUTE_TEAM_LEAVE, "leaveTeam", "Leave a team as a member.", "teams")
    },
    OpenApiContract {
        request_example: Some("team_ref"),
        ..contract("post", ROUTE_TEAM_DELETE, "deleteTeam", "Delete a team as its leader.", "teams")
    },
    OpenApiContract {
        request_example: Some("team_ref"),
        ..contract("post", ROUTE_TEAM_FINALIZE, "finalizeTeam", "Lock team membership.", "teams")
    },
    OpenApiContract {
        request_example: Some("team_drive_link"),
        ..contract(
            "post",
            ROUTE_TEAM_DRIVE_LINK,
            "setTeamDriveLink",
            "Attach the team's submission folder.",
            "teams",
        )
    },
    OpenApiContract {
        success_status: "201",
        request_example: Some("team_invite"),
        ..contract("post", ROUTE_TEAM_INVITE, "inviteTeamMember", "Invite an email to the team.", "teams")
    },
    contract("get", ROUTE_TEAM_INVITES, "listTeamInvites", "List the caller's pending invites.", "teams"),
    contract(
        "post",
        ROUTE_TEAM_INVITE_ACCEPT,
        "acceptTeamInvite",
        "Accept a pending team invite.",
        "teams",
    ),
    OpenApiContract {
        request_example: Some("team_shortlist"),
        ..contract(
            "post",
            ROUTE_ADMIN_TEAM_SHORTLIST,
            "shortlistTeam",
            "Mark a team shortlisted (admin only).",
            "admin",
        )
    },
    contract(
        "get",
        ROUTE_EVENT_TEAMS_ME,
        "myEventTeam",
        "Fetch the caller's team for an event.",
        "event-teams",
    ),
    contract(
        "post",
        ROUTE_EVENT_TEAMS_ME,
        "myEventTeamPost",
        "Fetch the caller's team for an event.",
        "event-teams",
    ),
    OpenApiContract {
        success_status: "201",
        response_example: Some("event_team_create"),
        ..contract(
            "post",
            ROUTE_EVENT_TEAMS_CREATE,
            "createEventTeam",
            "Start a team for a team event.",
            "event-teams",
        )
    },
    OpenApiContract {
        request_example: Some("event_team_join"),
        ..contract(
            "post",
            ROUTE_EVENT_TEAMS_JOIN,
            "joinEventTeam",
            "Join an event team by its leader's email.",
            "event-teams",
        )
    },
    contract(
        "delete",
        ROUTE_EVENT_TEAM_BY_ID,
        "disbandEventTeam",
        "Disband an unpaid event team.",
        "event-teams",
    ),
    OpenApiContract {
        request_example: Some("event_team_remove"),
        ..contract(
            "post",
            ROUTE_EVENT_TEAM_REMOVE,
            "removeEventTeamMember",
            "Remove a member from an unregistered event team.",
            "event-teams",
        )
    },
    OpenApiContract {
        request_example: Some("checkout_verify"),
        ..contract(
            "post",
            ROUTE_EVENT_TEAM_PAY,
            "payEventTeam",
            "Confirm the checkout payment for a full event team.",
            "event-teams",
        )
    },
    OpenApiContract {
        request_example: Some("create_order"),
        response_example: Some("create_order"),
        ..contract(
            "post",
            ROUTE_PAYMENT_CREATE_ORDER,
            "createPaymentOrder",
            "Create a gateway order for a registration or event team.",
            "payments",
        )
    },
    OpenApiContract {
        request_example: Some("checkout_verify"),
        response_example: Some("checkout_verify"),
        ..contract(
            "post",
            ROUTE_PAYMENT_VERIFY,
            "verifyPayment",
            "Verify a checkout signature and apply the captured payment.",
            "payments",
        )
    },
    OpenApiContract {
        secured: false,
        response_example: Some("verify_by_order"),
        ..contract(
            "get",
            ROUTE_VERIFY_PAYMENT_BY_ORDER,
            "verifyPaymentByOrder",
            "Query the gateway for an order and apply a capture.",
            "payments",
        )
    },
    OpenApiContract {
        secured: false,
        ..contract(
            "post",
            ROUTE_PAYMENT_WEBHOOK,
            "paymentWebhook",
            "Receive signed gateway webhooks.",
            "payments",
        )
    },
    contract(
        "get",
        ROUTE_PAYMENT_BY_ID,
        "getPayment",
        "Fetch a recorded payment (payer, leader or admin).",
        "payments",
    ),
];

pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    for contract in OPENAPI_CONTRACTS {
        add_operation(&mut paths, contract);
    }

    json!({
        "openapi": "3.0.2",
        "info": {
            "title": "EventHub API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Event registration, hackathon teams and registration-fee payments."
        },
        "paths": Value::Object(paths),
        "components": {
            "securitySchemes": {
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "Firebase ID token"
                },
                "idTokenCookie": {
                    "type": "apiKey",
                    "in": "cookie",
                    "name": "eh_id_token"
                }
            },
            "schemas": {
                "ApiDataEnvelope": {
                    "type": "object",
                    "properties": {
                        "data": { "type": "object", "additionalProperties": true }
                    },
                    "required": ["data"]
                },
                "ApiErrorResponse": {
                    "type": "object",
                    "properties": {
                        "message": { "type": "string" },
                        "error": {
                            "type": "object",
                            "properties": {
                                "code": { "type": "string" },
                                "message": { "type": "string" }
                            },
                            "required": ["code", "message"]
                        },
                        "errors": {
                            "type": "object",
                            "additionalProperties": {
                                "type": "array",
                                "items": { "type": "string" }
                            }
                        }
                    },
                    "required": ["message", "error"]
                }
            },
            "responses": {
                "ErrorEnvelope": {
                    "description": "Error response envelope",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/ApiErrorResponse" },
                            "example": {
                                "message": "Unauthenticated.",
                                "error": {
                                    "code": "unauthorized",
                                    "message": "Unauthenticated."
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

fn add_operation(paths: &mut Map<String, Value>, contract: &OpenApiContract) {
    let path = to_openapi_path(contract.route_path);
    let method = contract.method.to_ascii_lowercase();

    let mut operation = json!({
        "operationId": contract.operation_id,
        "summary": contract.summary,
        "tags": [contract.tag],
        "responses": {
            contract.success_status: {
                "description": "Success",
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ApiDataEnvelope" }
                    }
                }
            },
            "default": { "$ref": "#/components/responses/ErrorEnvelope" }
        },
        "x-rustRoute": contract.route_path,
    });

    if contract.secured {
        operation["security"] = protected_security();
    }

    if let Some(example_key) = contract.request_example {
        let mut request_body = json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "type": "object", "additionalProperties": true }
                }
            }
        });
        if let Some(example) = request_example(example_key) {
            request_body["content"]["application/json"]["example"] = example;
        }
        operation["requestBody"] = request_body;
    }

    if let Some(example_key) = contract.response_example {
        if let Some(example) = response_example(example_key) {
            operation["responses"][contract.success_status]["content"]["application/json"]["example"] =
                example;
        }
    }

    let parameters = path_parameters(contract.route_path);
    if !parameters.is_empty() {
        operation["parameters"] = Value::Array(parameters);
    }

    let path_item = paths
        .entry(path)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(item) = path_item.as_object_mut() {
        item.insert(method, operation);
    }
}

fn protected_security() -> Value {
    json!([
        {"bearerAuth": []},
        {"idTokenCookie": []}
    ])
}

fn to_openapi_path(route_path: &str) -> String {
    route_path
        .split('/')
        .map(|segment| {
            if let Some(parameter) = segment.strip_prefix(':') {
                format!("{{{parameter}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<String>>()
        .join("/")
}

fn path_parameters(route_path: &str) -> Vec<Value> {
    route_path
        .split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .map(|parameter| {
            json!({
                "name": parameter,
                "in": "path",
                "required": true,
                "schema": {"type": "string"}
            })
        })
        .collect()
}

fn request_example(key: &str) -> Option<Value> {
    match key {
        "user_update" => Some(json!({
            "name": "Asha Rao",
            "phone": "+91 99000 00000",
            "college": "NMAMIT",
            "branch": "CSE",
            "year": 3,
            "bio": "Backend and CTF."
        })),
        "check_emails" => Some(json!({
            "emails": ["member@college.edu", "new@college.edu"]
        })),
        "event_register" => Some(json!({
            "event_id": 6,
            "leader_email": "leader@college.edu",
            "type": "team",
            "members": ["member@college.edu"]
        })),
        "event_leave" => Some(json!({ "event_id": 6 })),
        "team_create" => Some(json!({ "team_name": "Null Pointers" })),
        "team_join" => Some(json!({ "leader_email": "leader@college.edu" })),
        "team_remove" => Some(json!({
            "team_id": "team_0f3c",
            "member_email": "member@college.edu"
        })),
        "team_ref" => Some(json!({ "team_id": "team_0f3c" })),
        "team_drive_link" => Some(json!({
            "team_id": "team_0f3c",
            "drive_link": "https://drive.google.com/drive/folders/abc"
        })),
        "team_invite" => Some(json!({
            "team_id": "team_0f3c",
            "email": "member@college.edu"
        })),
        "team_shortlist" => Some(json!({ "shortlisted": true })),
        "event_team_join" => Some(json!({ "leaderEmail": "leader@college.edu" })),
        "event_team_remove" => Some(json!({ "memberEmail": "member@college.edu" })),
        "create_order" => Some(json!({ "target": "registration", "id": "6:leader@college.edu" })),
        "checkout_verify" => Some(json!({
            "razorpay_order_id": "order_Nx1",
            "razorpay_payment_id": "pay_Nx1",
            "razorpay_signature": "5f0c..."
        })),
        _ => None,
    }
}

fn response_example(key: &str) -> Option<Value> {
    match key {
        "events" => Some(json!({
            "data": [{
                "id": 6,
                "title": "Battleground Brawl: BGMI",
                "type": "team",
                "maxTeamSize": 4,
                "amount": 100
            }]
        })),
        "user_create" => Some(json!({
            "data": {
                "created": true,
                "user": {
                    "uid": "uid_123",
                    "name": "leader",
                    "email": "leader@college.edu",
                    "year": 1,
                    "team_id": null
                }
            }
        })),
        "check_emails" => Some(json!({
            "data": { "unregistered": ["new@college.edu"] }
        })),
        "event_register" => Some(json!({
            "data": {
                "registration": {
                    "id": "6:leader@college.edu",
                    "event_id": 6,
                    "participants": ["leader@college.edu", "member@college.edu"],
                    "payment_status": "pending"
                }
            }
        })),
        "event_team_create" => Some(json!({
            "data": { "teamId": "evteam_9a1b" }
        })),
        "create_order" => Some(json!({
            "data": {
                "orderId": "order_Nx1",
                "amount": 10500,
                "currency": "INR",
                "gateway": "razorpay",
                "keyId": "rzp_live_abc"
            }
        })),
        "checkout_verify" => Some(json!({
            "data": {
                "orderId": "order_Nx1",
                "paymentId": "pay_Nx1",
                "status": "paid",
                "result": "applied"
            }
        })),
        "verify_by_order" => Some(json!({
            "data": {
                "orderId": "order_Nx1",
                "amount": 10500,
                "currency": "INR",
                "status": "paid"
            }
        })),
        _ => None,
    }
}
