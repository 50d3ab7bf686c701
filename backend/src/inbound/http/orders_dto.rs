//! Request and response payloads for the cart and order endpoints.
//!
//! Product attributes are resolved by the catalogue upstream and travel with
//! each cart line, so the payload is self-contained. Amounts are integer
//! cents on the wire.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{
    Cart, CartLine, CartValidationReport, CategoryRef, Error, IssueKind, LedgerBucket, Money,
    OrderReceipt, ProductRef, RuleVersion, ValidationIssue,
};
use crate::inbound::http::validation::{FieldName, negative_amount_error};

/// Category or subcategory reference.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPayload {
    pub id: Uuid,
    #[schema(example = "Dairy")]
    pub name: String,
}

/// Product attributes as resolved by the catalogue.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    pub id: Uuid,
    #[schema(example = "Whole milk 1L")]
    pub name: String,
    pub category: CategoryPayload,
    #[serde(default)]
    pub subcategory: Option<CategoryPayload>,
    /// Unit price in cents.
    #[schema(example = 249)]
    pub unit_price_cents: i64,
    /// Sub-ledger the product is charged against, e.g. `hygiene`.
    #[serde(default)]
    pub ledger_bucket: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

/// One cart line.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLinePayload {
    pub product: ProductPayload,
    #[schema(example = 2)]
    pub quantity: i32,
}

/// Cart submitted for validation or checkout.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartRequest {
    pub lines: Vec<CartLinePayload>,
    /// Rule version the client validated against, if any.
    #[serde(default)]
    pub rule_version: Option<i64>,
}

/// Parsed cart plus the client's declared rule version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedCart {
    pub(crate) cart: Cart,
    pub(crate) rule_version: Option<RuleVersion>,
}

fn category_ref(payload: CategoryPayload) -> CategoryRef {
    CategoryRef {
        id: payload.id,
        name: payload.name,
    }
}

pub(crate) fn parse_cart_request(request: CartRequest) -> Result<ParsedCart, Error> {
    let lines = request
        .lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            let product = line.product;
            if product.unit_price_cents < 0 {
                return Err(negative_amount_error(
                    FieldName::new("unitPriceCents"),
                    index,
                    product.unit_price_cents,
                ));
            }
            Ok(CartLine {
                product: ProductRef {
                    id: product.id,
                    name: product.name,
                    category: category_ref(product.category),
                    subcategory: product.subcategory.map(category_ref),
                    unit_price: Money::from_cents(product.unit_price_cents),
                    ledger_bucket: product
                        .ledger_bucket
                        .filter(|bucket| !bucket.trim().is_empty())
                        .map(LedgerBucket::new),
                    available: product.available,
                },
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(ParsedCart {
        cart: Cart::new(lines),
        rule_version: request.rule_version.map(RuleVersion::new),
    })
}

/// Issue category on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueKindBody {
    Budget,
    Limit,
    Availability,
    System,
}

impl From<IssueKind> for IssueKindBody {
    fn from(value: IssueKind) -> Self {
        match value {
            IssueKind::Budget => Self::Budget,
            IssueKind::Limit => Self::Limit,
            IssueKind::Availability => Self::Availability,
            IssueKind::System => Self::System,
        }
    }
}

/// One validation error or warning.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssueBody {
    #[serde(rename = "type")]
    pub kind: IssueKindBody,
    #[schema(example = "Dairy limit of 4 per household exceeded")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
}

impl From<ValidationIssue> for ValidationIssueBody {
    fn from(value: ValidationIssue) -> Self {
        Self {
            kind: value.kind.into(),
            message: value.message,
            product_id: value.product_id,
        }
    }
}

/// Result of a cart check.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartValidationBody {
    pub valid: bool,
    pub errors: Vec<ValidationIssueBody>,
    pub warnings: Vec<ValidationIssueBody>,
}

impl From<CartValidationReport> for CartValidationBody {
    fn from(value: CartValidationReport) -> Self {
        Self {
            valid: value.valid,
            errors: value.errors.into_iter().map(Into::into).collect(),
            warnings: value.warnings.into_iter().map(Into::into).collect(),
        }
    }
}

/// Money movements of a committed order, in cents.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotalsBody {
    pub total_cents: i64,
    pub budget_portion_cents: i64,
    pub voucher_portion_cents: i64,
    pub forfeited_voucher_cents: i64,
    pub consumed_vouchers: Vec<Uuid>,
}

/// Created order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub totals: OrderTotalsBody,
    /// True when the order went through without lock or dedup protection.
    pub degraded: bool,
    #[schema(example = "2026-03-01T12:00:00+00:00")]
    pub created_at: String,
}

impl From<OrderReceipt> for OrderResponse {
    fn from(value: OrderReceipt) -> Self {
        let totals = value.totals;
        Self {
            order_id: *value.order_id.as_uuid(),
            totals: OrderTotalsBody {
                total_cents: totals.total.cents(),
                budget_portion_cents: totals.budget_portion.cents(),
                voucher_portion_cents: totals.voucher_portion.cents(),
                forfeited_voucher_cents: totals.forfeited_voucher_value.cents(),
                consumed_vouchers: totals
                    .consumed_vouchers
                    .iter()
                    .map(|id| *id.as_uuid())
                    .collect(),
            },
            degraded: value.degraded,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Current rule configuration version.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleVersionResponse {
    #[schema(example = 12)]
    pub rule_version: i64,
}

impl From<RuleVersion> for RuleVersionResponse {
    fn from(value: RuleVersion) -> Self {
        Self {
            rule_version: value.get(),
        }
    }
}
