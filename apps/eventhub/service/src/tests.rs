use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{Request, StatusCode};
use base64::Engine;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

use crate::config::Config;
use crate::observability::{Observability, RecordingAuditSink};
use crate::payments::{MockPaymentGateway, checkout_signature};
use crate::{build_router, build_router_with_gateway};

const LEADER: &str = "leader@college.edu";
const MEMBER: &str = "member@college.edu";
const OTHER: &str = "other@college.edu";
const ADMIN: &str = "admin@eventhub.test";
const CHECKOUT_SECRET: &str = "rzp-test-secret";
const WEBHOOK_SECRET: &str = "rzp-webhook-secret";
const CASHFREE_SECRET: &str = "cf-test-secret";
const PAYMENT_IN_PROGRESS: &str = "A payment is in progress; try again once it completes.";

struct TestApp {
    router: Router,
    gateway: MockPaymentGateway,
    audit: Arc<RecordingAuditSink>,
    observability: Observability,
}

fn test_app() -> TestApp {
    test_app_with_config(Config::for_tests())
}

fn test_app_with_config(config: Config) -> TestApp {
    let gateway = MockPaymentGateway::new(config.razorpay_key_id.clone());
    let audit = Arc::new(RecordingAuditSink::default());
    let observability = Observability::new(audit.clone());
    let router =
        build_router_with_gateway(config, observability.clone(), Arc::new(gateway.clone()));
    TestApp {
        router,
        gateway,
        audit,
        observability,
    }
}

fn token_for(uid: &str, email: &str) -> String {
    format!("mock:{uid}:{email}")
}

fn uid_for(email: &str) -> String {
    format!("uid_{}", email.split('@').next().unwrap_or_default())
}

fn bearer(email: &str) -> String {
    format!("Bearer {}", token_for(&uid_for(email), email))
}

async fn read_json(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = serde_json::from_slice::<Value>(&bytes)?;
    Ok(value)
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let body = read_json(response).await?;
        Ok((status, body))
    }

    async fn get(&self, uri: &str, email: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(email) = email {
            builder = builder.header(AUTHORIZATION, bearer(email));
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn post(&self, uri: &str, email: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.json_request("POST", uri, email, body).await
    }

    async fn json_request(
        &self,
        method: &str,
        uri: &str,
        email: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(email) = email {
            builder = builder.header(AUTHORIZATION, bearer(email));
        }
        self.send(builder.body(Body::from(serde_json::to_vec(&body)?))?)
            .await
    }

    async fn create_profile(&self, email: &str) -> Result<()> {
        let (status, _) = self.post("/api/v1/user/create", Some(email), json!({})).await?;
        assert!(status == StatusCode::CREATED || status == StatusCode::OK);
        Ok(())
    }

    async fn create_order(&self, email: &str, target: &str, id: &str) -> Result<(StatusCode, Value)> {
        self.post(
            "/api/v1/payment/create-order",
            Some(email),
            json!({ "target": target, "id": id }),
        )
        .await
    }

    async fn verify_checkout(
        &self,
        uri: &str,
        email: &str,
        order_id: &str,
        payment_id: &str,
    ) -> Result<(StatusCode, Value)> {
        self.post(
            uri,
            Some(email),
            json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": checkout_signature(CHECKOUT_SECRET, order_id, payment_id),
            }),
        )
        .await
    }

    async fn send_webhook(&self, body: &Value, signature: &str) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/payment/webhook")
            .header(CONTENT_TYPE, "application/json")
            .header("x-razorpay-signature", signature)
            .body(Body::from(serde_json::to_vec(body)?))?;
        self.send(request).await
    }
}

fn expired_hold_app() -> TestApp {
    let mut config = Config::for_tests();
    config.payment_pending_hold_seconds = 0;
    test_app_with_config(config)
}

async fn full_event_team(app: &TestApp) -> Result<String> {
    let (status, body) = app
        .post("/api/v1/events/6/teams/create", Some(LEADER), json!({}))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    for member in ["m1@college.edu", "m2@college.edu", "m3@college.edu"] {
        let (status, _) = app
            .post(
                "/api/v1/events/6/teams/join",
                Some(member),
                json!({ "leaderEmail": LEADER }),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
    }
    Ok(body["data"]["teamId"].as_str().unwrap_or_default().to_string())
}

async fn registered_order(app: &TestApp, event_id: u32) -> Result<String> {
    app.create_profile(LEADER).await?;
    let (status, _) = app
        .post(
            "/api/v1/event/register",
            Some(LEADER),
            json!({ "event_id": event_id, "leader_email": LEADER, "type": "individual" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app
        .create_order(LEADER, "registration", &format!("{event_id}:{LEADER}"))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(body["data"]["orderId"].as_str().unwrap_or_default().to_string())
}

fn webhook_signature(body: &Value) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid webhook secret"))?;
    mac.update(&serde_json::to_vec(body)?);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn captured_webhook(order_id: &str, payment_id: &str, amount: u64) -> Value {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": "captured",
                    "amount": amount,
                    "currency": "INR",
                    "method": "upi"
                }
            }
        }
    })
}

#[tokio::test]
async fn healthz_route_returns_ok() -> Result<()> {
    let app = build_router(Config::for_tests());
    let request = Request::builder().uri("/healthz").body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "eventhub-service");
    assert_eq!(body["auth_provider"], "mock");
    assert_eq!(body["payment_gateway"], "mock");
    Ok(())
}

#[tokio::test]
async fn readyz_reports_unconfigured_gateway() -> Result<()> {
    let ready = build_router(Config::for_tests());
    let response = ready
        .oneshot(Request::builder().uri("/readyz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = Config::for_tests();
    config.payment_gateway_mode = "razorpay".to_string();
    config.razorpay_key_secret = None;
    let not_ready = build_router(config);
    let response = not_ready
        .oneshot(Request::builder().uri("/readyz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["payment_gateway"], "razorpay");
    Ok(())
}

#[tokio::test]
async fn openapi_route_serves_contract_document() -> Result<()> {
    let app = test_app();
    let (status, body) = app.get("/openapi.json", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["openapi"], "3.0.2");
    assert!(body["paths"]["/api/v1/payment/create-order"]["post"].is_object());
    Ok(())
}

#[tokio::test]
async fn responses_carry_request_id_header() -> Result<()> {
    let app = build_router(Config::for_tests());
    let request = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "req_fixed")
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req_fixed")
    );
    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() -> Result<()> {
    let app = build_router(Config::for_tests());
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/event/register")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:3000")
    );
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_identity_token() -> Result<()> {
    let app = test_app();
    let (status, body) = app.get("/api/v1/user/profile", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/api/v1/user/profile")
        .header(AUTHORIZATION, "Bearer not-a-mock-token")
        .body(Body::empty())?;
    let (status, _) = app.send(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn user_create_is_idempotent_and_cookie_auth_works() -> Result<()> {
    let app = test_app();

    let (status, body) = app.post("/api/v1/user/create", Some(LEADER), json!({})).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["user"]["email"], LEADER);
    assert_eq!(body["data"]["user"]["year"], 1);

    let (status, body) = app.post("/api/v1/user/create", Some(LEADER), json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], false);

    let request = Request::builder()
        .uri("/api/v1/user/profile")
        .header(
            COOKIE,
            format!("theme=dark; eh_id_token={}", token_for(&uid_for(LEADER), LEADER)),
        )
        .body(Body::empty())?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["uid"], uid_for(LEADER));

    let created_events = app
        .audit
        .events()
        .into_iter()
        .filter(|event| event.event_name == "user.created")
        .count();
    assert_eq!(created_events, 1);
    Ok(())
}

#[tokio::test]
async fn profile_update_validates_and_persists_fields() -> Result<()> {
    let app = test_app();
    let (status, _) = app
        .post("/api/v1/user/update", Some(LEADER), json!({ "college": "NMAMIT" }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.create_profile(LEADER).await?;
    let (status, body) = app
        .post("/api/v1/user/update", Some(LEADER), json!({ "year": 9 }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["year"].is_array());

    let (status, body) = app
        .post(
            "/api/v1/user/update",
            Some(LEADER),
            json!({ "name": "Asha Rao", "college": "NMAMIT", "branch": "CSE", "year": "3" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["name"], "Asha Rao");
    assert_eq!(body["data"]["user"]["year"], 3);

    let (status, body) = app
        .post(
            "/api/v1/user/update",
            Some(LEADER),
            json!({ "email": "renamed@college.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["email"].is_array());

    let (status, body) = app.get("/api/v1/user/profile", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["college"], "NMAMIT");
    assert_eq!(body["data"]["user"]["email"], LEADER);
    Ok(())
}

#[tokio::test]
async fn user_directory_routes_report_registered_emails() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.create_profile(MEMBER).await?;

    let (status, _) = app
        .get(&format!("/api/v1/users/{}/exists", uid_for(LEADER)), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/v1/users/uid_nobody/exists", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(
            "/api/v1/users/check-emails",
            Some(LEADER),
            json!({ "emails": [" Member@College.edu ", OTHER] }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unregistered"], json!([OTHER]));

    let (status, body) = app.get("/api/v1/users", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn event_catalog_is_public() -> Result<()> {
    let app = test_app();
    let (status, body) = app.get("/api/v1/events", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().is_some_and(|events| !events.is_empty()));

    let (status, body) = app.get("/api/v1/events/6", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "team");
    assert_eq!(body["data"]["maxTeamSize"], 4);

    let (status, _) = app.get("/api/v1/events/404", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn individual_registration_lifecycle() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;

    let (status, body) = app
        .post(
            "/api/v1/event/register",
            Some(LEADER),
            json!({ "event_id": "1", "leader_email": "Leader@College.edu", "type": "individual" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["registration"]["id"], "1:leader@college.edu");
    assert_eq!(body["data"]["registration"]["payment_status"], "pending");
    assert_eq!(body["data"]["paymentRequired"], false);

    let (status, _) = app
        .post(
            "/api/v1/event/register",
            Some(LEADER),
            json!({ "event_id": 1, "leader_email": LEADER, "type": "individual" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.get("/api/v1/event/my-registrations", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registrations"][0]["isLeader"], true);

    let (status, body) = app
        .post("/api/v1/event/leave", Some(LEADER), json!({ "event_id": 1 }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, _) = app
        .post("/api/v1/event/leave", Some(LEADER), json!({ "event_id": 1 }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn registration_checks_run_in_order() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;

    let cases = [
        (
            json!({ "event_id": "six", "leader_email": LEADER, "type": "team" }),
            StatusCode::BAD_REQUEST,
            "The event id must be numeric.",
        ),
        (
            json!({ "event_id": 6, "leader_email": LEADER, "type": "duo" }),
            StatusCode::BAD_REQUEST,
            "Type must be team or individual.",
        ),
        (
            json!({ "event_id": 404, "leader_email": LEADER, "type": "team" }),
            StatusCode::BAD_REQUEST,
            "Unknown event",
        ),
        (
            json!({ "event_id": 6, "leader_email": LEADER, "type": "individual" }),
            StatusCode::BAD_REQUEST,
            "Invalid event type",
        ),
        (
            json!({ "event_id": 6, "leader_email": LEADER, "type": "team", "members": [MEMBER, LEADER] }),
            StatusCode::BAD_REQUEST,
            "Leader cannot be listed as a member.",
        ),
        (
            json!({
                "event_id": 3,
                "leader_email": LEADER,
                "type": "team",
                "members": [MEMBER, OTHER]
            }),
            StatusCode::BAD_REQUEST,
            "Team size cannot exceed 2 participants.",
        ),
        (
            json!({ "event_id": 7, "leader_email": LEADER, "type": "individual", "members": [MEMBER] }),
            StatusCode::BAD_REQUEST,
            "Members not allowed for individual events.",
        ),
        (
            json!({ "event_id": 7, "leader_email": OTHER, "type": "individual" }),
            StatusCode::FORBIDDEN,
            "You can only register with your own email as leader.",
        ),
    ];

    for (payload, expected_status, expected_message) in cases {
        let (status, body) = app
            .post("/api/v1/event/register", Some(LEADER), payload.clone())
            .await?;
        assert_eq!(status, expected_status, "payload {payload}");
        assert_eq!(body["message"], expected_message, "payload {payload}");
    }
    Ok(())
}

#[tokio::test]
async fn team_registration_requires_member_profiles_and_single_participation() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.create_profile(OTHER).await?;

    let payload = json!({
        "event_id": 6,
        "leader_email": LEADER,
        "type": "team",
        "members": [MEMBER, MEMBER]
    });
    let (status, body) = app
        .post("/api/v1/event/register", Some(LEADER), payload.clone())
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some_and(|message| message.contains(MEMBER)));

    app.create_profile(MEMBER).await?;
    let (status, body) = app
        .post("/api/v1/event/register", Some(LEADER), payload)
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["data"]["registration"]["participants"],
        json!([LEADER, MEMBER])
    );

    let (status, _) = app
        .post(
            "/api/v1/event/register",
            Some(OTHER),
            json!({ "event_id": 6, "leader_email": OTHER, "type": "team", "members": [MEMBER] }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.get("/api/v1/event/my-registrations", Some(MEMBER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registrations"][0]["isLeader"], false);
    Ok(())
}

#[tokio::test]
async fn registration_writes_are_throttled_per_identity() -> Result<()> {
    let mut config = Config::for_tests();
    config.throttle_registration_limit = 2;
    let app = test_app_with_config(config);
    app.create_profile(LEADER).await?;

    let payload = json!({ "event_id": 1, "leader_email": LEADER, "type": "individual" });
    let (first, _) = app
        .post("/api/v1/event/register", Some(LEADER), payload.clone())
        .await?;
    let (second, _) = app
        .post("/api/v1/event/register", Some(LEADER), payload.clone())
        .await?;
    let (third, body) = app
        .post("/api/v1/event/register", Some(LEADER), payload)
        .await?;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");

    let (status, _) = app
        .post(
            "/api/v1/event/register",
            Some(MEMBER),
            json!({ "event_id": 2, "leader_email": MEMBER, "type": "individual" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn hackathon_team_lifecycle() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.create_profile(MEMBER).await?;

    let (status, body) = app
        .post("/api/v1/team/create", Some(LEADER), json!({ "team_name": "Null Pointers" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let team_id = body["data"]["team"]["team_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    assert!(!team_id.is_empty());

    let (status, body) = app
        .post("/api/v1/team/create", Some(LEADER), json!({ "team_name": "Second" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You are already part of a team");

    let (status, body) = app
        .post("/api/v1/team/finalize", Some(LEADER), json!({ "team_id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A team needs at least 2 members to finalize.");

    let (status, _) = app
        .post("/api/v1/team/join", Some(MEMBER), json!({ "leader_email": LEADER }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/v1/team/get", Some(MEMBER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_leader"], false);
    assert_eq!(body["data"]["team"]["members"].as_array().map(Vec::len), Some(2));

    let (status, _) = app
        .post(
            "/api/v1/team/drive-link",
            Some(LEADER),
            json!({ "team_id": team_id, "drive_link": "http://example.com/folder" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .post(
            "/api/v1/team/drive-link",
            Some(LEADER),
            json!({ "team_id": team_id, "drive_link": "https://drive.google.com/drive/folders/abc" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["team"]["drive_link"],
        "https://drive.google.com/drive/folders/abc"
    );

    let (status, body) = app
        .post("/api/v1/team/finalize", Some(LEADER), json!({ "team_id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["finalized"], true);

    let (status, _) = app
        .post("/api/v1/team/leave", Some(MEMBER), json!({ "team_id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/api/v1/team/join", Some(OTHER), json!({ "leader_email": LEADER }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn hackathon_team_member_management_is_leader_only() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.create_profile(MEMBER).await?;

    let (_, body) = app
        .post("/api/v1/team/create", Some(LEADER), json!({ "team_name": "Byte Me" }))
        .await?;
    let team_id = body["data"]["team"]["team_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    app.post("/api/v1/team/join", Some(MEMBER), json!({ "leader_email": LEADER }))
        .await?;

    let (status, _) = app
        .post(
            "/api/v1/team/remove",
            Some(MEMBER),
            json!({ "team_id": team_id, "member_email": LEADER }),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/api/v1/team/leave", Some(LEADER), json!({ "team_id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/v1/team/remove",
            Some(LEADER),
            json!({ "team_id": team_id, "member_email": MEMBER }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["members"].as_array().map(Vec::len), Some(1));

    let (status, body) = app
        .post("/api/v1/team/delete", Some(LEADER), json!({ "team_id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, body) = app.get("/api/v1/team/get", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["team"].is_null());
    Ok(())
}

#[tokio::test]
async fn team_invites_can_be_accepted_by_invitee_only() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.create_profile(MEMBER).await?;
    app.create_profile(OTHER).await?;

    let (_, body) = app
        .post("/api/v1/team/create", Some(LEADER), json!({ "team_name": "Stack Smashers" }))
        .await?;
    let team_id = body["data"]["team"]["team_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let (status, body) = app
        .post(
            "/api/v1/team/invite",
            Some(LEADER),
            json!({ "team_id": team_id, "email": MEMBER }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let invite_id = body["data"]["invite"]["invite_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let (status, body) = app.get("/api/v1/team/invites", Some(MEMBER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["invites"].as_array().map(Vec::len), Some(1));

    let accept_uri = format!("/api/v1/team/invites/{invite_id}/accept");
    let (status, _) = app.post(&accept_uri, Some(OTHER), json!({})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post(&accept_uri, Some(MEMBER), json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["data"]["team"]["members"]
            .as_array()
            .is_some_and(|members| members.iter().any(|member| member["email"] == MEMBER))
    );

    let (status, _) = app.post(&accept_uri, Some(MEMBER), json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn shortlisting_requires_admin_email() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    let (_, body) = app
        .post("/api/v1/team/create", Some(LEADER), json!({ "team_name": "Segfaults" }))
        .await?;
    let team_id = body["data"]["team"]["team_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let uri = format!("/api/v1/admin/teams/{team_id}/shortlist");

    let (status, _) = app.post(&uri, None, json!({ "shortlisted": true })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(&uri, Some(LEADER), json!({ "shortlisted": true }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post(&uri, Some(ADMIN), json!({ "shortlisted": true })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["shortlisted"], true);
    assert_eq!(app.observability.counter_value("team.shortlisted"), 1);
    Ok(())
}

#[tokio::test]
async fn event_team_build_then_pay() -> Result<()> {
    let app = test_app();
    let members = ["m1@college.edu", "m2@college.edu", "m3@college.edu"];

    let (status, body) = app
        .post("/api/v1/events/6/teams/create", Some(LEADER), json!({}))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let team_id = body["data"]["teamId"].as_str().unwrap_or_default().to_string();

    let (status, _) = app
        .post("/api/v1/events/6/teams/create", Some(LEADER), json!({}))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/api/v1/events/7/teams/create", Some(OTHER), json!({}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/v1/payment/create-order", Some(LEADER), json!({ "target": "event_team", "id": team_id }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Team must have exactly 4 members before payment.");

    for member in members {
        let (status, _) = app
            .post(
                "/api/v1/events/6/teams/join",
                Some(member),
                json!({ "leaderEmail": LEADER }),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .post(
            "/api/v1/events/6/teams/join",
            Some(OTHER),
            json!({ "leaderEmail": LEADER }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Team is full.");

    let (status, body) = app.get("/api/v1/events/6/teams/me", Some("m2@college.edu")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["team_id"], team_id);
    assert_eq!(body["data"]["isLeader"], false);

    let (status, body) = app.create_order(LEADER, "event_team", &team_id).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 10_500);
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();

    let pay_uri = format!("/api/v1/events/6/teams/{team_id}/pay");
    let (status, _) = app
        .verify_checkout(&pay_uri, "m1@college.edu", &order_id, "pay_team")
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.gateway.capture_amount(&order_id, "pay_short", 100);
    let (status, body) = app
        .verify_checkout(&pay_uri, LEADER, &order_id, "pay_short")
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment not captured or amount mismatch");

    app.gateway.capture(&order_id, "pay_team");
    let (status, body) = app
        .verify_checkout(&pay_uri, LEADER, &order_id, "pay_team")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alreadyPaid"], false);
    assert_eq!(body["data"]["team"]["payment_done"], true);
    assert_eq!(body["data"]["team"]["registered"], true);

    let (status, body) = app
        .verify_checkout(&pay_uri, LEADER, &order_id, "pay_team")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alreadyPaid"], true);

    let (status, _) = app
        .json_request(
            "DELETE",
            &format!("/api/v1/events/6/teams/{team_id}"),
            Some(LEADER),
            json!({}),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(
            &format!("/api/v1/events/6/teams/{team_id}/remove"),
            Some(LEADER),
            json!({ "memberEmail": "m3@college.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot remove members after registration");
    Ok(())
}

#[tokio::test]
async fn event_team_disband_and_remove_rules() -> Result<()> {
    let app = test_app();
    let (_, body) = app
        .post("/api/v1/events/9/teams/create", Some(LEADER), json!({}))
        .await?;
    let team_id = body["data"]["teamId"].as_str().unwrap_or_default().to_string();
    app.post(
        "/api/v1/events/9/teams/join",
        Some(MEMBER),
        json!({ "leaderEmail": LEADER }),
    )
    .await?;

    let remove_uri = format!("/api/v1/events/9/teams/{team_id}/remove");
    let (status, body) = app
        .post(&remove_uri, Some(MEMBER), json!({ "memberEmail": LEADER }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only leader can remove members");

    let (status, body) = app
        .post(&remove_uri, Some(LEADER), json!({ "memberEmail": OTHER }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Member not in team");

    let (status, _) = app
        .post(&remove_uri, Some(LEADER), json!({ "memberEmail": MEMBER }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .json_request(
            "DELETE",
            &format!("/api/v1/events/9/teams/{team_id}"),
            Some(LEADER),
            json!({}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["disbanded"], true);

    let (status, body) = app.get("/api/v1/events/9/teams/me", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["team"].is_null());
    Ok(())
}

#[tokio::test]
async fn registration_payment_verifies_signature_and_applies_once() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 7, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;
    let registration_id = "7:leader@college.edu";

    let (status, _) = app.create_order(MEMBER, "registration", registration_id).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.create_order(LEADER, "registration", registration_id).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 5_250);
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["gateway"], "mock");
    assert_eq!(body["data"]["keyId"], "rzp_test_key");
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();
    app.gateway.capture(&order_id, "pay_reg");

    let (status, body) = app
        .post(
            "/api/v1/payment/verify-payment",
            Some(LEADER),
            json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": "pay_reg",
                "razorpay_signature": "deadbeef",
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "payment_rejected");
    assert_eq!(app.observability.counter_value("payment.signature_rejected"), 1);

    let (status, body) = app
        .verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_reg")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["result"], "applied");

    let (status, body) = app
        .verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_reg")
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "already_applied");
    assert_eq!(app.observability.counter_value("payment.applied"), 1);

    let (status, body) = app.get("/api/v1/event/my-registrations", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    let registration = &body["data"]["registrations"][0]["registration"];
    assert_eq!(registration["payment_status"], "paid");
    assert_eq!(registration["payment_details"]["payment_id"], "pay_reg");
    assert_eq!(registration["payment_details"]["amount_minor"], 5_250);

    let (status, _) = app.create_order(LEADER, "registration", registration_id).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/api/v1/event/leave", Some(LEADER), json!({ "event_id": 7 }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn free_events_do_not_create_orders() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 1, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;

    let (status, body) = app
        .create_order(LEADER, "registration", "1:leader@college.edu")
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This event does not require payment.");

    let (status, _) = app.create_order(LEADER, "invoice", "anything").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn gateway_failures_surface_as_bad_gateway() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 8, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;

    app.gateway.set_failing(true);
    let (status, body) = app
        .create_order(LEADER, "registration", "8:leader@college.edu")
        .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_unavailable");
    Ok(())
}

#[tokio::test]
async fn verify_by_order_confirms_captured_orders() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 8, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;
    let (_, body) = app
        .create_order(LEADER, "registration", "8:leader@college.edu")
        .await?;
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();

    let (status, _) = app.get("/api/v1/verify-payment", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/verify-payment?order_id={order_id}");
    let (status, body) = app.get(&uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "created");
    assert!(body["data"]["result"].is_null());

    app.gateway.capture(&order_id, "pay_query");
    let (status, body) = app.get(&uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["amount"], 5_250);
    assert_eq!(body["data"]["result"], "applied");

    let (status, _) = app
        .get("/api/v1/verify-payment?order_id=order_unknown", None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn webhook_requires_signature_and_applies_capture() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 7, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;
    let (_, body) = app
        .create_order(LEADER, "registration", "7:leader@college.edu")
        .await?;
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();

    let payload = captured_webhook(&order_id, "pay_hook", 5_250);
    let (status, _) = app.send_webhook(&payload, "00").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.observability.counter_value("payment.webhook_rejected"), 1);

    let (status, body) = app
        .send_webhook(&payload, &webhook_signature(&payload)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["event_type"], "payment.captured");
    assert_eq!(body["data"]["result"], "applied");

    let (status, body) = app
        .send_webhook(&payload, &webhook_signature(&payload)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "already_applied");

    let ignored = json!({ "event": "refund.created", "payload": {} });
    let (status, body) = app
        .send_webhook(&ignored, &webhook_signature(&ignored)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "ignored");

    let stray = captured_webhook("order_elsewhere", "pay_stray", 100);
    let (status, body) = app.send_webhook(&stray, &webhook_signature(&stray)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "unknown_order");

    let capture_audits = app
        .audit
        .events()
        .into_iter()
        .filter(|event| event.event_name == "payment.capture")
        .count();
    assert_eq!(capture_audits, 1);
    Ok(())
}

#[tokio::test]
async fn payment_lookup_is_limited_to_payer_and_admin() -> Result<()> {
    let app = test_app();
    app.create_profile(LEADER).await?;
    app.post(
        "/api/v1/event/register",
        Some(LEADER),
        json!({ "event_id": 7, "leader_email": LEADER, "type": "individual" }),
    )
    .await?;
    let (_, body) = app
        .create_order(LEADER, "registration", "7:leader@college.edu")
        .await?;
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();
    app.gateway.capture(&order_id, "pay_lookup");
    app.verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_lookup")
        .await?;

    let uri = "/api/v1/payment/payments/pay_lookup";
    let (status, body) = app.get(uri, Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["status"], "paid");
    assert_eq!(body["data"]["order"]["order_id"], order_id);

    let (status, _) = app.get(uri, Some(OTHER)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(uri, Some(ADMIN)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get("/api/v1/payment/payments/pay_missing", Some(ADMIN))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn order_creation_is_throttled() -> Result<()> {
    let mut config = Config::for_tests();
    config.throttle_payment_limit = 1;
    let app = test_app_with_config(config);

    let (first, _) = app.create_order(LEADER, "registration", "7:nobody").await?;
    let (second, body) = app.create_order(LEADER, "registration", "7:nobody").await?;

    assert_eq!(first, StatusCode::NOT_FOUND);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert!(
        body["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("Too many requests."))
    );
    Ok(())
}

#[tokio::test]
async fn event_team_roster_is_frozen_while_payment_is_open() -> Result<()> {
    let app = test_app();
    let team_id = full_event_team(&app).await?;
    let (_, body) = app.create_order(LEADER, "event_team", &team_id).await?;
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();

    let (status, body) = app
        .post(
            &format!("/api/v1/events/6/teams/{team_id}/remove"),
            Some(LEADER),
            json!({ "memberEmail": "m3@college.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], PAYMENT_IN_PROGRESS);

    let (status, body) = app
        .json_request(
            "DELETE",
            &format!("/api/v1/events/6/teams/{team_id}"),
            Some(LEADER),
            json!({}),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], PAYMENT_IN_PROGRESS);

    app.gateway.capture(&order_id, "pay_frozen");
    let (status, body) = app
        .verify_checkout(
            &format!("/api/v1/events/6/teams/{team_id}/pay"),
            LEADER,
            &order_id,
            "pay_frozen",
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["registered"], true);
    assert_eq!(
        body["data"]["team"]["members"].as_array().map(Vec::len),
        Some(4)
    );
    Ok(())
}

#[tokio::test]
async fn capture_after_roster_change_is_rejected() -> Result<()> {
    let app = expired_hold_app();
    let team_id = full_event_team(&app).await?;
    let (_, body) = app.create_order(LEADER, "event_team", &team_id).await?;
    let order_id = body["data"]["orderId"].as_str().unwrap_or_default().to_string();

    let (status, _) = app
        .post(
            &format!("/api/v1/events/6/teams/{team_id}/remove"),
            Some(LEADER),
            json!({ "memberEmail": "m3@college.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    app.gateway.capture(&order_id, "pay_late");
    let (status, body) = app
        .verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_late")
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "payment_rejected");

    let payload = captured_webhook(&order_id, "pay_late", 10_500);
    let (status, body) = app
        .send_webhook(&payload, &webhook_signature(&payload)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "mismatch");

    let (status, body) = app.get("/api/v1/events/6/teams/me", Some(LEADER)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"]["registered"], false);
    assert_eq!(body["data"]["team"]["payment_done"], false);
    Ok(())
}

#[tokio::test]
async fn withdrawal_is_blocked_while_payment_is_open() -> Result<()> {
    let app = test_app();
    registered_order(&app, 7).await?;

    let (status, body) = app
        .post("/api/v1/event/leave", Some(LEADER), json!({ "event_id": 7 }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], PAYMENT_IN_PROGRESS);

    let (_, body) = app.get("/api/v1/event/my-registrations", Some(LEADER)).await?;
    assert_eq!(body["data"]["registrations"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn capture_after_withdrawal_is_reported_orphaned() -> Result<()> {
    let app = expired_hold_app();
    let order_id = registered_order(&app, 7).await?;

    let (status, _) = app
        .post("/api/v1/event/leave", Some(LEADER), json!({ "event_id": 7 }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    app.gateway.capture(&order_id, "pay_gone");
    let payload = captured_webhook(&order_id, "pay_gone", 5_250);
    let (status, body) = app
        .send_webhook(&payload, &webhook_signature(&payload)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "orphaned");
    assert_eq!(app.observability.counter_value("payment.orphaned"), 1);
    assert_eq!(app.observability.counter_value("payment.applied"), 0);
    assert!(app.audit.events().iter().any(|event| {
        event.event_name == "payment.capture" && event.outcome.as_deref() == Some("orphaned")
    }));

    let (status, body) = app
        .verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_gone")
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["message"],
        "Payment was captured but its registration no longer exists."
    );

    let (status, _) = app
        .get(&format!("/api/v1/verify-payment?order_id={order_id}"), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn cashfree_webhook_applies_capture() -> Result<()> {
    let mut config = Config::for_tests();
    config.payment_gateway_mode = "cashfree".to_string();
    config.cashfree_client_secret = Some(CASHFREE_SECRET.to_string());
    let app = test_app_with_config(config);
    let order_id = registered_order(&app, 7).await?;

    let payload = json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": {
            "order": { "order_id": order_id },
            "payment": {
                "cf_payment_id": 5_114_910_179_u64,
                "payment_status": "SUCCESS",
                "payment_amount": 52.5,
                "payment_currency": "INR",
                "payment_group": "upi"
            },
            "customer_details": { "customer_email": LEADER }
        }
    });
    let body = serde_json::to_vec(&payload)?;
    let timestamp = "1760400000";
    let mut mac = Hmac::<Sha256>::new_from_slice(CASHFREE_SECRET.as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid webhook secret"))?;
    mac.update(timestamp.as_bytes());
    mac.update(&body);
    let signature =
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let (status, _) = app.send_webhook(&payload, &webhook_signature(&payload)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/payment/webhook")
        .header(CONTENT_TYPE, "application/json")
        .header("x-webhook-signature", signature)
        .header("x-webhook-timestamp", timestamp)
        .body(Body::from(body))?;
    let (status, response) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["event_type"], "PAYMENT_SUCCESS_WEBHOOK");
    assert_eq!(response["data"]["result"], "applied");

    let (_, body) = app.get("/api/v1/event/my-registrations", Some(LEADER)).await?;
    let registration = &body["data"]["registrations"][0]["registration"];
    assert_eq!(registration["payment_status"], "paid");
    assert_eq!(registration["payment_details"]["payment_id"], "5114910179");
    Ok(())
}

#[tokio::test]
async fn event_team_pay_validates_fields_before_lookup() -> Result<()> {
    let app = test_app();
    let (status, body) = app
        .post("/api/v1/events/6/teams/evteam_missing/pay", Some(LEADER), json!({}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["razorpay_order_id"].is_array());
    Ok(())
}

#[tokio::test]
async fn payment_unknown_to_gateway_is_bad_gateway() -> Result<()> {
    let app = test_app();
    let order_id = registered_order(&app, 8).await?;

    let (status, body) = app
        .verify_checkout("/api/v1/payment/verify-payment", LEADER, &order_id, "pay_nowhere")
        .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_unavailable");
    Ok(())
}

#[tokio::test]
async fn throttle_sweeps_idle_buckets_of_the_same_gate() -> Result<()> {
    let throttle = crate::ThrottleState::default();
    {
        let mut buckets = throttle.buckets.lock().await;
        for index in 0..2_000 {
            buckets.insert(format!("payment:ip:10.0.0.{index}"), VecDeque::from([0_i64]));
        }
        buckets.insert("registration:ip:old".to_string(), VecDeque::from([0_i64]));
    }

    let result = crate::consume_throttle_token(&throttle, "payment:ip:fresh", 10, 60).await;
    assert!(result.is_ok());

    let buckets = throttle.buckets.lock().await;
    assert_eq!(buckets.len(), 2);
    assert!(buckets.contains_key("payment:ip:fresh"));
    assert!(buckets.contains_key("registration:ip:old"));
    Ok(())
}
