use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

const CAPTURED: &str = "captured";
const CASHFREE_SANDBOX_BASE_URL: &str = "https://sandbox.cashfree.com/pg";
const CASHFREE_PRODUCTION_BASE_URL: &str = "https://api.cashfree.com/pg";
const CASHFREE_FALLBACK_PHONE: &str = "9999999999";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCustomer {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrderRequest {
    /// Our proposed order id. Cashfree keeps it; Razorpay assigns its own.
    pub order_id: String,
    pub amount_minor: u64,
    pub currency: String,
    pub receipt: String,
    pub customer: GatewayCustomer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount_minor: u64,
    pub currency: String,
    pub payment_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayPayment {
    pub payment_id: String,
    pub order_id: String,
    /// Gateway status normalized to lowercase; `captured` means funds settled.
    pub status: String,
    pub amount_minor: u64,
    pub currency: String,
    pub method: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == CAPTURED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOrderState {
    Created,
    Attempted,
    Paid,
    Expired,
    Other,
}

impl GatewayOrderState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Attempted => "attempted",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderStatus {
    pub order_id: String,
    pub status: GatewayOrderState,
    pub amount_minor: u64,
    pub currency: String,
    pub captured_payment: Option<GatewayPayment>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{message}")]
    NotConfigured { message: String },
    #[error("payment gateway request failed: {message}")]
    Transport { message: String },
    #[error("payment gateway returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("invalid payment gateway response: {message}")]
    InvalidResponse { message: String },
    #[error("{message}")]
    Unsupported { message: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Key the browser checkout needs, when the gateway has one.
    fn public_key(&self) -> Option<String>;

    fn is_configured(&self) -> bool {
        true
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError>;
}

pub fn gateway_from_config(config: &Config) -> Arc<dyn PaymentGateway> {
    let http = match reqwest::Client::builder()
        .timeout(Duration::from_millis(config.payment_http_timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            return Arc::new(UnconfiguredGateway {
                name: "unavailable",
                message: format!("Failed to build payment gateway client: {error}"),
            });
        }
    };

    match config.payment_gateway_mode.as_str() {
        "mock" => Arc::new(MockPaymentGateway::new(config.razorpay_key_id.clone())),
        "cashfree" => {
            let (Some(client_id), Some(client_secret)) = (
                config.cashfree_client_id.clone(),
                config.cashfree_client_secret.clone(),
            ) else {
                return Arc::new(UnconfiguredGateway {
                    name: "cashfree",
                    message: "Cashfree credentials are not configured.".to_string(),
                });
            };
            Arc::new(CashfreeGateway {
                client_id,
                client_secret,
                api_version: config.cashfree_api_version.clone(),
                base_url: cashfree_base_url(config),
                return_url: config.payment_return_url.clone(),
                http,
            })
        }
        _ => {
            let (Some(key_id), Some(key_secret)) = (
                config.razorpay_key_id.clone(),
                config.razorpay_key_secret.clone(),
            ) else {
                return Arc::new(UnconfiguredGateway {
                    name: "razorpay",
                    message: "Razorpay credentials are not configured.".to_string(),
                });
            };
            Arc::new(RazorpayGateway {
                key_id,
                key_secret,
                base_url: config.razorpay_api_base_url.clone(),
                http,
            })
        }
    }
}

fn cashfree_base_url(config: &Config) -> String {
    if let Some(base_url) = config.cashfree_api_base_url.as_ref() {
        return base_url.trim_end_matches('/').to_string();
    }
    if config.cashfree_environment == "production" {
        CASHFREE_PRODUCTION_BASE_URL.to_string()
    } else {
        CASHFREE_SANDBOX_BASE_URL.to_string()
    }
}

/// Hex HMAC-SHA256 of `order_id|payment_id`, as returned by Razorpay checkout.
pub fn checkout_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_checkout_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookScheme {
    Razorpay,
    Cashfree,
}

/// Signature material taken from webhook request headers.
#[derive(Debug, Clone, Default)]
pub struct WebhookSignature {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    scheme: WebhookScheme,
    secret: Option<String>,
}

impl WebhookVerifier {
    pub fn from_config(config: &Config) -> Self {
        if config.payment_gateway_mode == "cashfree" {
            return Self {
                scheme: WebhookScheme::Cashfree,
                secret: config.cashfree_client_secret.clone(),
            };
        }
        Self {
            scheme: WebhookScheme::Razorpay,
            secret: config.razorpay_webhook_secret.clone(),
        }
    }

    pub const fn scheme(&self) -> WebhookScheme {
        self.scheme
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, signature: &WebhookSignature, body: &[u8]) -> bool {
        let (Some(secret), Some(provided)) = (self.secret.as_deref(), signature.signature.as_deref())
        else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };

        match self.scheme {
            WebhookScheme::Razorpay => {
                let Ok(expected) = hex::decode(provided.trim()) else {
                    return false;
                };
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            WebhookScheme::Cashfree => {
                let Some(timestamp) = signature.timestamp.as_deref() else {
                    return false;
                };
                let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(provided.trim())
                else {
                    return false;
                };
                mac.update(timestamp.as_bytes());
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Captured {
        event_type: String,
        payment: GatewayPayment,
    },
    Ignored {
        event_type: String,
    },
}

pub fn parse_webhook(scheme: WebhookScheme, body: &[u8]) -> Result<WebhookEvent, GatewayError> {
    let payload: Value = serde_json::from_slice(body).map_err(|error| GatewayError::InvalidResponse {
        message: format!("webhook body is not JSON: {error}"),
    })?;

    match scheme {
        WebhookScheme::Razorpay => parse_razorpay_webhook(&payload),
        WebhookScheme::Cashfree => parse_cashfree_webhook(&payload),
    }
}

fn parse_razorpay_webhook(payload: &Value) -> Result<WebhookEvent, GatewayError> {
    let event_type = payload["event"].as_str().unwrap_or_default().to_string();
    if event_type != "payment.captured" && event_type != "order.paid" {
        return Ok(WebhookEvent::Ignored { event_type });
    }

    let entity = payload["payload"]["payment"]["entity"].clone();
    let payment: RazorpayPayment =
        serde_json::from_value(entity).map_err(|error| GatewayError::InvalidResponse {
            message: format!("webhook payment entity: {error}"),
        })?;
    Ok(WebhookEvent::Captured {
        event_type,
        payment: payment.into_gateway_payment()?,
    })
}

fn parse_cashfree_webhook(payload: &Value) -> Result<WebhookEvent, GatewayError> {
    let event_type = payload["type"].as_str().unwrap_or_default().to_string();
    let data = &payload["data"];
    let payment_status = data["payment"]["payment_status"]
        .as_str()
        .unwrap_or_default();
    if event_type != "PAYMENT_SUCCESS_WEBHOOK" || payment_status != "SUCCESS" {
        return Ok(WebhookEvent::Ignored { event_type });
    }

    let order_id = data["order"]["order_id"]
        .as_str()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GatewayError::InvalidResponse {
            message: "webhook is missing data.order.order_id".to_string(),
        })?;
    let payment_id = json_id(&data["payment"]["cf_payment_id"]).ok_or_else(|| {
        GatewayError::InvalidResponse {
            message: "webhook is missing data.payment.cf_payment_id".to_string(),
        }
    })?;

    Ok(WebhookEvent::Captured {
        event_type,
        payment: GatewayPayment {
            payment_id,
            order_id: order_id.to_string(),
            status: CAPTURED.to_string(),
            amount_minor: rupees_to_minor(data["payment"]["payment_amount"].as_f64().unwrap_or(0.0)),
            currency: data["payment"]["payment_currency"]
                .as_str()
                .unwrap_or("INR")
                .to_string(),
            method: data["payment"]["payment_group"].as_str().map(str::to_string),
            email: data["customer_details"]["customer_email"]
                .as_str()
                .map(str::to_string),
            contact: data["customer_details"]["customer_phone"]
                .as_str()
                .map(str::to_string),
        },
    })
}

fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn rupees_to_minor(amount: f64) -> u64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 100.0).round() as u64
}

fn minor_to_rupees(amount_minor: u64) -> f64 {
    amount_minor as f64 / 100.0
}

pub fn new_order_id() -> String {
    format!("order_{}", Uuid::new_v4().simple())
}

pub fn new_receipt() -> String {
    format!("rcpt_{}", Utc::now().timestamp_millis())
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::NotFound {
            message: format!("{what} not found at payment gateway"),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Upstream {
            status: status.as_u16(),
            message: body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|error| GatewayError::InvalidResponse {
            message: format!("{what}: {error}"),
        })
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        message: error.to_string(),
    }
}

#[derive(Debug, Clone)]
struct UnconfiguredGateway {
    name: &'static str,
    message: String,
}

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    fn public_key(&self) -> Option<String> {
        None
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn create_order(&self, _request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        Err(self.not_configured())
    }

    async fn fetch_payment(&self, _payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        Err(self.not_configured())
    }

    async fn fetch_order(&self, _order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        Err(self.not_configured())
    }
}

impl UnconfiguredGateway {
    fn not_configured(&self) -> GatewayError {
        GatewayError::NotConfigured {
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    #[serde(default)]
    amount_paid: u64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayPayment {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
    amount: u64,
    currency: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    contact: Option<String>,
}

impl RazorpayPayment {
    fn into_gateway_payment(self) -> Result<GatewayPayment, GatewayError> {
        let order_id = self
            .order_id
            .filter(|value| !value.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse {
                message: format!("payment {} has no order id", self.id),
            })?;
        Ok(GatewayPayment {
            payment_id: self.id,
            order_id,
            status: self.status.to_lowercase(),
            amount_minor: self.amount,
            currency: self.currency,
            method: self.method,
            email: self.email,
            contact: self.contact,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayCollection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl RazorpayGateway {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn public_key(&self) -> Option<String> {
        Some(self.key_id.clone())
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .http
            .post(self.url("/v1/orders"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": request.amount_minor,
                "currency": request.currency,
                "receipt": request.receipt,
                "payment_capture": 1,
                "notes": {"customer_email": request.customer.email},
            }))
            .send()
            .await
            .map_err(transport_error)?;
        let order: RazorpayOrder = read_json(response, "order").await?;

        Ok(GatewayOrder {
            order_id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            payment_session_id: None,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/payments/{payment_id}")))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(transport_error)?;
        let payment: RazorpayPayment = read_json(response, "payment").await?;
        payment.into_gateway_payment()
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/orders/{order_id}")))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(transport_error)?;
        let order: RazorpayOrder = read_json(response, "order").await?;

        let status = match order.status.as_str() {
            "created" => GatewayOrderState::Created,
            "attempted" => GatewayOrderState::Attempted,
            "paid" => GatewayOrderState::Paid,
            _ => GatewayOrderState::Other,
        };

        let captured_payment = if status == GatewayOrderState::Paid || order.amount_paid > 0 {
            let response = self
                .http
                .get(self.url(&format!("/v1/orders/{order_id}/payments")))
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .send()
                .await
                .map_err(transport_error)?;
            let payments: RazorpayCollection<RazorpayPayment> =
                read_json(response, "order payments").await?;
            payments
                .items
                .into_iter()
                .find(|payment| payment.status == CAPTURED)
                .map(RazorpayPayment::into_gateway_payment)
                .transpose()?
        } else {
            None
        };

        Ok(GatewayOrderStatus {
            order_id: order.id,
            status,
            amount_minor: order.amount,
            currency: order.currency,
            captured_payment,
        })
    }
}

#[derive(Debug, Clone)]
struct CashfreeGateway {
    client_id: String,
    client_secret: String,
    api_version: String,
    base_url: String,
    return_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CashfreeOrder {
    order_id: String,
    order_amount: f64,
    order_currency: String,
    #[serde(default)]
    order_status: String,
    #[serde(default)]
    payment_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CashfreePayment {
    cf_payment_id: Value,
    #[serde(default)]
    payment_status: String,
    #[serde(default)]
    payment_amount: f64,
    #[serde(default)]
    payment_currency: Option<String>,
    #[serde(default)]
    payment_group: Option<String>,
}

impl CashfreeGateway {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("x-client-id", &self.client_id)
            .header("x-client-secret", &self.client_secret)
            .header("x-api-version", &self.api_version)
    }
}

#[async_trait]
impl PaymentGateway for CashfreeGateway {
    fn name(&self) -> &'static str {
        "cashfree"
    }

    fn public_key(&self) -> Option<String> {
        None
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let phone = request
            .customer
            .phone
            .clone()
            .unwrap_or_else(|| CASHFREE_FALLBACK_PHONE.to_string());
        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&json!({
                "order_id": request.order_id,
                "order_amount": minor_to_rupees(request.amount_minor),
                "order_currency": request.currency,
                "customer_details": {
                    "customer_id": request.customer.customer_id,
                    "customer_name": request.customer.name,
                    "customer_email": request.customer.email,
                    "customer_phone": phone,
                },
                "order_meta": {
                    "return_url": format!("{}?order_id={{order_id}}", self.return_url),
                },
            }))
            .send()
            .await
            .map_err(transport_error)?;
        let order: CashfreeOrder = read_json(response, "order").await?;

        Ok(GatewayOrder {
            order_id: order.order_id,
            amount_minor: rupees_to_minor(order.order_amount),
            currency: order.order_currency,
            payment_session_id: order.payment_session_id,
        })
    }

    async fn fetch_payment(&self, _payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::Unsupported {
            message: "Cashfree payments are verified by order id.".to_string(),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/orders/{order_id}"))
            .send()
            .await
            .map_err(transport_error)?;
        let order: CashfreeOrder = read_json(response, "order").await?;

        let status = match order.order_status.as_str() {
            "ACTIVE" => GatewayOrderState::Created,
            "PAID" => GatewayOrderState::Paid,
            "EXPIRED" | "TERMINATED" => GatewayOrderState::Expired,
            _ => GatewayOrderState::Other,
        };

        let captured_payment = if status == GatewayOrderState::Paid {
            let response = self
                .request(reqwest::Method::GET, &format!("/orders/{order_id}/payments"))
                .send()
                .await
                .map_err(transport_error)?;
            let payments: Vec<CashfreePayment> = read_json(response, "order payments").await?;
            payments
                .into_iter()
                .find(|payment| payment.payment_status == "SUCCESS")
                .and_then(|payment| {
                    Some(GatewayPayment {
                        payment_id: json_id(&payment.cf_payment_id)?,
                        order_id: order.order_id.clone(),
                        status: CAPTURED.to_string(),
                        amount_minor: rupees_to_minor(payment.payment_amount),
                        currency: payment
                            .payment_currency
                            .unwrap_or_else(|| order.order_currency.clone()),
                        method: payment.payment_group,
                        email: None,
                        contact: None,
                    })
                })
        } else {
            None
        };

        Ok(GatewayOrderStatus {
            order_id: order.order_id,
            status,
            amount_minor: rupees_to_minor(order.order_amount),
            currency: order.order_currency,
            captured_payment,
        })
    }
}

#[derive(Debug, Default)]
struct MockGatewayState {
    orders: HashMap<String, GatewayOrderStatus>,
    payments: HashMap<String, GatewayPayment>,
    fail_requests: bool,
}

/// In-memory gateway for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    key_id: Option<String>,
    state: Arc<Mutex<MockGatewayState>>,
}

impl MockPaymentGateway {
    pub fn new(key_id: Option<String>) -> Self {
        Self {
            key_id,
            state: Arc::default(),
        }
    }

    /// Captures the full order amount under `payment_id`.
    pub fn capture(&self, order_id: &str, payment_id: &str) -> Option<GatewayPayment> {
        let amount_minor = lock_or_recover(&self.state)
            .orders
            .get(order_id)
            .map(|order| order.amount_minor)?;
        self.capture_amount(order_id, payment_id, amount_minor)
    }

    pub fn capture_amount(
        &self,
        order_id: &str,
        payment_id: &str,
        amount_minor: u64,
    ) -> Option<GatewayPayment> {
        let mut state = lock_or_recover(&self.state);
        let order = state.orders.get_mut(order_id)?;
        let payment = GatewayPayment {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            status: CAPTURED.to_string(),
            amount_minor,
            currency: order.currency.clone(),
            method: Some("upi".to_string()),
            email: None,
            contact: None,
        };
        order.status = GatewayOrderState::Paid;
        order.captured_payment = Some(payment.clone());
        state.payments.insert(payment_id.to_string(), payment.clone());
        Some(payment)
    }

    /// Registers a payment attempt that has not been captured.
    pub fn authorize(&self, order_id: &str, payment_id: &str) -> Option<GatewayPayment> {
        let mut state = lock_or_recover(&self.state);
        let order = state.orders.get_mut(order_id)?;
        order.status = GatewayOrderState::Attempted;
        let payment = GatewayPayment {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            status: "authorized".to_string(),
            amount_minor: order.amount_minor,
            currency: order.currency.clone(),
            method: Some("card".to_string()),
            email: None,
            contact: None,
        };
        state.payments.insert(payment_id.to_string(), payment.clone());
        Some(payment)
    }

    pub fn set_failing(&self, failing: bool) {
        lock_or_recover(&self.state).fail_requests = failing;
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if lock_or_recover(&self.state).fail_requests {
            return Err(GatewayError::Transport {
                message: "mock gateway unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn public_key(&self) -> Option<String> {
        self.key_id.clone()
    }

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.check_available()?;
        let status = GatewayOrderStatus {
            order_id: request.order_id.clone(),
            status: GatewayOrderState::Created,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            captured_payment: None,
        };
        lock_or_recover(&self.state)
            .orders
            .insert(request.order_id.clone(), status);

        Ok(GatewayOrder {
            order_id: request.order_id.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            payment_session_id: Some(format!("session_{}", request.order_id)),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.check_available()?;
        lock_or_recover(&self.state)
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                message: "payment not found at payment gateway".to_string(),
            })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        self.check_available()?;
        lock_or_recover(&self.state)
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                message: "order not found at payment gateway".to_string(),
            })
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
