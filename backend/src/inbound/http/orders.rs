//! Participant-facing cart validation, order submission, and rule version
//! endpoints.
//!
//! ```text
//! POST /api/v1/cart/validate
//! POST /api/v1/orders
//! GET  /api/v1/rules/version
//! ```

use actix_web::{HttpRequest, HttpResponse, get, http::header, post, web};
use tracing::debug;

use crate::domain::{Error, SubmitOrderRequest, ValidateCartRequest};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::{ParticipantIdentity, client_meta};
use crate::inbound::http::orders_dto::{
    CartRequest, CartValidationBody, OrderResponse, RuleVersionResponse, parse_cart_request,
};
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::state::HttpState;

/// Check a cart against current rules and balances without side effects.
#[utoipa::path(
    post,
    path = "/api/v1/cart/validate",
    request_body = CartRequest,
    params(
        ("X-Account-Id" = String, Header, description = "Participant account forwarded by the gateway")
    ),
    responses(
        (status = 200, description = "Validation report", body = CartValidationBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorised", body = ErrorSchema),
        (status = 404, description = "Unknown account", body = ErrorSchema),
        (status = 503, description = "Service unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["orders"],
    operation_id = "validateCart"
)]
#[post("/cart/validate")]
pub async fn validate_cart(
    state: web::Data<HttpState>,
    identity: ParticipantIdentity,
    req: HttpRequest,
    payload: web::Json<CartRequest>,
) -> ApiResult<web::Json<CartValidationBody>> {
    let parsed = parse_cart_request(payload.into_inner())?;
    let request = ValidateCartRequest {
        account_id: identity.into_account_id(),
        cart: parsed.cart,
        client: client_meta(&req, parsed.rule_version),
    };
    let report = state.submissions.validate_cart(request).await?;
    Ok(web::Json(CartValidationBody::from(report)))
}

/// Validate and atomically commit an order.
///
/// Rejections reuse the validation issue shape under `details.errors`;
/// throttled and contended submissions carry `Retry-After`.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CartRequest,
    params(
        ("X-Account-Id" = String, Header, description = "Participant account forwarded by the gateway")
    ),
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorised", body = ErrorSchema),
        (status = 404, description = "Unknown account", body = ErrorSchema),
        (status = 409, description = "Duplicate submission or account busy", body = ErrorSchema),
        (status = 422, description = "Limit, budget, or availability violation", body = ErrorSchema),
        (status = 429, description = "Too many attempts", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["orders"],
    operation_id = "submitOrder"
)]
#[post("/orders")]
pub async fn submit_order(
    state: web::Data<HttpState>,
    identity: ParticipantIdentity,
    req: HttpRequest,
    payload: web::Json<CartRequest>,
) -> ApiResult<HttpResponse> {
    let parsed = parse_cart_request(payload.into_inner())?;
    let request = SubmitOrderRequest {
        account_id: identity.into_account_id(),
        cart: parsed.cart,
        client: client_meta(&req, parsed.rule_version),
    };
    let receipt = state
        .submissions
        .submit_order(request)
        .await
        .map_err(|rejection| {
            debug!(stage = %rejection.stage(), "order submission rejected");
            Error::from(rejection)
        })?;
    let body = OrderResponse::from(receipt);
    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, format!("/api/v1/orders/{}", body.order_id)))
        .json(body))
}

/// Current rule configuration version for client cache invalidation.
#[utoipa::path(
    get,
    path = "/api/v1/rules/version",
    responses(
        (status = 200, description = "Current rule version", body = RuleVersionResponse),
        (status = 503, description = "Service unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["orders"],
    operation_id = "getRuleVersion"
)]
#[get("/rules/version")]
pub async fn rule_version(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let version = state.submissions.rule_version().await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(RuleVersionResponse::from(version)))
}

#[cfg(test)]
#[path = "orders_tests.rs"]
mod tests;
