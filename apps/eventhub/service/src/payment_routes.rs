use super::*;
use crate::event_team_routes::CheckoutRequestPayload;

const HEADER_RAZORPAY_SIGNATURE: &str = "x-razorpay-signature";
const HEADER_WEBHOOK_SIGNATURE: &str = "x-webhook-signature";
const HEADER_WEBHOOK_TIMESTAMP: &str = "x-webhook-timestamp";

#[derive(Debug, Deserialize)]
pub(super) struct CreateOrderRequestPayload {
    target: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VerifyByOrderQuery {
    order_id: Option<String>,
}

pub(super) async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateOrderRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let id = required_string(payload.id, "id", "The id field is required.")?;
    let target = match payload.target.as_deref().map(str::trim) {
        Some("registration") => PaymentTarget::Registration(id),
        Some("event_team") => PaymentTarget::EventTeam(id),
        _ => {
            return Err(validation_error(
                "target",
                "Target must be registration or event_team.",
            ));
        }
    };

    let summary = state
        .store
        .payment_target_summary(&target)
        .await
        .map_err(map_domain_store_error)?;
    if summary.leader_email != user.email {
        return Err(forbidden_error("Only the leader can pay for this registration."));
    }
    if summary.paid {
        return Err(conflict_error("Payment already completed."));
    }

    let event = catalog_event(&state, summary.event_id)?;
    if !event.is_paid() {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            "This event does not require payment.",
        ));
    }
    if matches!(target, PaymentTarget::EventTeam(_))
        && summary.participant_count != event.team_capacity()
    {
        return Err(error_response(
            ApiErrorCode::InvalidRequest,
            format!(
                "Team must have exactly {} members before payment.",
                event.team_capacity()
            ),
        ));
    }

    let amount_minor = event.charge_amount_minor(state.config.payment_markup_bps);
    let profile = state.store.get_user(&user.uid).await;
    let customer = GatewayCustomer {
        customer_id: user.uid.clone(),
        name: profile
            .as_ref()
            .map(|profile| profile.name.clone())
            .and_then(non_empty)
            .unwrap_or_else(|| user.name.clone()),
        email: user.email.clone(),
        phone: profile
            .map(|profile| profile.phone)
            .and_then(non_empty)
            .or_else(|| user.phone.clone()),
    };

    let gateway = state.reconciler.gateway();
    let order = gateway
        .create_order(&GatewayOrderRequest {
            order_id: new_order_id(),
            amount_minor,
            currency: state.config.payment_currency.clone(),
            receipt: new_receipt(),
            customer,
        })
        .await
        .map_err(map_gateway_error)?;

    let record = state
        .store
        .record_payment_order(CreatePaymentOrderInput {
            order_id: order.order_id.clone(),
            gateway: gateway.name().to_string(),
            target,
            payer_email: user.email.clone(),
            amount_minor,
            currency: order.currency.clone(),
        })
        .await
        .map_err(map_domain_store_error)?;

    let request_id = request_id(&headers);
    state.observability.audit(
        AuditEvent::new("payment.order_created", request_id.clone())
            .with_user_id(user.uid.clone())
            .with_attribute("order_id", record.order_id.clone())
            .with_attribute("target", record.target.kind())
            .with_attribute("target_id", record.target.id())
            .with_attribute("amount_minor", amount_minor.to_string()),
    );
    state
        .observability
        .increment_counter("payment.order_created", &request_id);

    Ok(ok_data(json!({
        "orderId": record.order_id,
        "amount": record.amount_minor,
        "currency": record.currency,
        "gateway": record.gateway,
        "keyId": gateway.public_key(),
        "paymentSessionId": order.payment_session_id,
    })))
}

pub(super) async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let fields = payload.into_fields()?;
    let request_id = request_id(&headers);

    let verification = state
        .reconciler
        .verify_checkout(
            &fields.order_id,
            &fields.payment_id,
            &fields.signature,
            None,
            &request_id,
        )
        .await
        .map_err(map_reconcile_error)?;
    if matches!(verification.outcome, Some(ReconcileOutcome::Orphaned { .. })) {
        return Err(orphaned_capture_error());
    }

    let result = verification
        .outcome
        .as_ref()
        .map_or("pending", |outcome| outcome.label());

    Ok(ok_data(json!({
        "orderId": fields.order_id,
        "paymentId": verification.payment.payment_id,
        "status": verification.payment.status,
        "result": result,
    })))
}

pub(super) async fn verify_payment_by_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VerifyByOrderQuery>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let order_id = required_string(query.order_id, "order_id", "The order_id query is required.")?;
    let request_id = request_id(&headers);

    let confirmation = state
        .reconciler
        .confirm_order(&order_id, &request_id)
        .await
        .map_err(map_reconcile_error)?;
    if matches!(confirmation.outcome, Some(ReconcileOutcome::Orphaned { .. })) {
        return Err(orphaned_capture_error());
    }

    Ok(ok_data(json!({
        "orderId": confirmation.order_id,
        "amount": confirmation.amount_minor,
        "currency": confirmation.currency,
        "status": confirmation.status.as_str(),
        "result": confirmation.outcome.as_ref().map(|outcome| outcome.label()),
    })))
}

pub(super) async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let signature = WebhookSignature {
        signature: header_string(&headers, HEADER_RAZORPAY_SIGNATURE)
            .or_else(|| header_string(&headers, HEADER_WEBHOOK_SIGNATURE)),
        timestamp: header_string(&headers, HEADER_WEBHOOK_TIMESTAMP),
    };
    let request_id = request_id(&headers);

    match state
        .reconciler
        .handle_webhook(&signature, &body, &request_id)
        .await
    {
        Ok(outcome) => Ok(ok_data(outcome)),
        Err(ReconcileError::InvalidSignature) => {
            Err(unauthorized_error("Invalid webhook signature."))
        }
        Err(ReconcileError::Gateway(GatewayError::InvalidResponse { message })) => {
            Err(error_response(ApiErrorCode::InvalidRequest, message))
        }
        Err(error) => Err(map_reconcile_error(error)),
    }
}

pub(super) async fn get_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let payment = state
        .store
        .get_payment(payment_id.trim())
        .await
        .ok_or_else(|| not_found_error("Payment not found."))?;
    let order = state.store.get_payment_order(&payment.order_id).await;

    let mut allowed = state.config.is_admin_email(&user.email);
    if let Some(order) = order.as_ref() {
        if order.payer_email == user.email {
            allowed = true;
        } else if let Ok(summary) = state.store.payment_target_summary(&order.target).await {
            allowed = allowed || summary.leader_email == user.email;
        }
    }
    if !allowed {
        return Err(forbidden_error("Forbidden."));
    }

    Ok(ok_data(json!({ "payment": payment, "order": order })))
}
