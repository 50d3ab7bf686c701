//! Staff-only endpoints over the failed order attempt audit trail.

use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, get, web};
use pagination::{Page, PageParams};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::ports::{FailedAttemptQuery, SummaryRequest};
use crate::domain::{
    AccountId, CountedValue, Error, FailedAttemptKey, FailedOrderAttempt, FailureSummary,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::StaffIdentity;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, invalid_limit_error, parse_optional_rfc3339_timestamp, parse_uuid,
};

const MAX_TOP_N: usize = 50;

/// Query parameters for the raw listing.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListFailedAttemptsQuery {
    /// Opaque cursor returned as `nextCursor` by the previous page.
    pub cursor: Option<String>,
    /// Page size. Defaults to 20, maximum 100.
    pub limit: Option<usize>,
    /// Restrict the listing to one account.
    pub account_id: Option<String>,
}

/// Query parameters for the aggregate summary.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummaryQuery {
    /// Inclusive RFC 3339 start. Defaults to thirty days before `to`.
    pub from: Option<String>,
    /// Exclusive RFC 3339 end. Defaults to now.
    pub to: Option<String>,
    /// Number of top messages and accounts. Defaults to 10, maximum 50.
    pub top_n: Option<usize>,
}

/// One failed attempt as shown to staff.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttemptBody {
    pub id: Uuid,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[schema(example = "budget_violation")]
    pub kind: String,
    pub messages: Vec<String>,
    /// Cart exactly as submitted.
    pub cart: serde_json::Value,
    /// Cart total and per-bucket totals in cents.
    pub totals: serde_json::Value,
    /// Balance figures at the time of failure, when they could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub cart_hash: String,
    /// User agent, client address, and declared rule version.
    pub client: serde_json::Value,
    pub created_at: String,
}

impl From<FailedOrderAttempt> for FailedAttemptBody {
    fn from(value: FailedOrderAttempt) -> Self {
        Self {
            id: *value.id.as_uuid(),
            account_id: value.account_id.to_string(),
            trace_id: value.trace_id,
            kind: value.kind.as_str().to_owned(),
            messages: value.messages,
            cart: value.cart,
            totals: serde_json::to_value(&value.totals).unwrap_or_default(),
            balance: value
                .balance
                .and_then(|balance| serde_json::to_value(balance).ok()),
            fingerprint: value.fingerprint,
            cart_hash: value.cart_hash,
            client: serde_json::to_value(&value.client).unwrap_or_default(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Navigation links for a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageLinksBody {
    #[serde(rename = "self")]
    pub current: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// One page of failed attempts, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttemptPageBody {
    pub data: Vec<FailedAttemptBody>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub links: PageLinksBody,
}

impl From<Page<FailedAttemptBody>> for FailedAttemptPageBody {
    fn from(value: Page<FailedAttemptBody>) -> Self {
        Self {
            data: value.data,
            limit: value.limit,
            next_cursor: value.next_cursor,
            links: PageLinksBody {
                current: value.links.current,
                next: value.links.next,
            },
        }
    }
}

/// A value and how often it occurred.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountedValueBody {
    pub value: String,
    pub count: u64,
}

impl From<CountedValue> for CountedValueBody {
    fn from(value: CountedValue) -> Self {
        Self {
            value: value.value,
            count: value.count,
        }
    }
}

/// Aggregate failure statistics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummaryBody {
    pub from: String,
    pub to: String,
    pub total: u64,
    /// Count per failure kind.
    pub by_kind: BTreeMap<String, u64>,
    pub top_messages: Vec<CountedValueBody>,
    pub top_accounts: Vec<CountedValueBody>,
}

impl From<FailureSummary> for FailureSummaryBody {
    fn from(value: FailureSummary) -> Self {
        Self {
            from: value.range.from.to_rfc3339(),
            to: value.range.to.to_rfc3339(),
            total: value.total,
            by_kind: value
                .by_kind
                .into_iter()
                .map(|(kind, count)| (kind.as_str().to_owned(), count))
                .collect(),
            top_messages: value.top_messages.into_iter().map(Into::into).collect(),
            top_accounts: value.top_accounts.into_iter().map(Into::into).collect(),
        }
    }
}

fn parse_page_params(cursor: Option<String>, limit: Option<usize>) -> Result<PageParams, Error> {
    PageParams::new(cursor, limit).map_err(|_| {
        invalid_limit_error(
            FieldName::new("limit"),
            limit.unwrap_or_default(),
            pagination::MAX_LIMIT,
        )
    })
}

fn parse_account_filter(account_id: Option<String>) -> Result<Option<AccountId>, Error> {
    account_id
        .map(|raw| parse_uuid(raw, FieldName::new("accountId")).map(AccountId::from_uuid))
        .transpose()
}

fn parse_top_n(top_n: Option<usize>) -> Result<Option<usize>, Error> {
    match top_n {
        Some(value) if !(1..=MAX_TOP_N).contains(&value) => Err(invalid_limit_error(
            FieldName::new("topN"),
            value,
            MAX_TOP_N,
        )),
        other => Ok(other),
    }
}

/// Page through failed order attempts, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/admin/failed-attempts",
    params(
        ("cursor" = Option<String>, Query, description = "Opaque cursor from the previous page"),
        ("limit" = Option<usize>, Query, description = "Number of records to return, default 20, max 100"),
        ("accountId" = Option<String>, Query, description = "Restrict to one account"),
        ("X-Staff-Role" = String, Header, description = "Must be `staff`")
    ),
    responses(
        (status = 200, description = "Failed attempts", body = FailedAttemptPageBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 403, description = "Staff role required", body = ErrorSchema),
        (status = 503, description = "Service unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["admin"],
    operation_id = "listFailedAttempts"
)]
#[get("/admin/failed-attempts")]
pub async fn list_failed_attempts(
    state: web::Data<HttpState>,
    _staff: StaffIdentity,
    req: HttpRequest,
    query: web::Query<ListFailedAttemptsQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let page = parse_page_params(query.cursor, query.limit)?;
    let account_id = parse_account_filter(query.account_id)?;

    let listing = state
        .analytics
        .list_attempts(FailedAttemptQuery { account_id, page })
        .await?;

    let page = Page::from_overfetched(
        listing.rows,
        &listing.page,
        &req.full_url(),
        |row: &FailedOrderAttempt| FailedAttemptKey::from(row),
    )
    .map_err(|err| Error::internal(format!("failed to encode cursor: {err}")))?
    .map(FailedAttemptBody::from);

    Ok(HttpResponse::Ok().json(FailedAttemptPageBody::from(page)))
}

/// Aggregate failure counts, top messages, and top accounts over a range.
#[utoipa::path(
    get,
    path = "/api/v1/admin/failed-attempts/summary",
    params(
        ("from" = Option<String>, Query, description = "Inclusive RFC 3339 start, default 30 days before `to`"),
        ("to" = Option<String>, Query, description = "Exclusive RFC 3339 end, default now"),
        ("topN" = Option<usize>, Query, description = "Number of top entries, default 10, max 50"),
        ("X-Staff-Role" = String, Header, description = "Must be `staff`")
    ),
    responses(
        (status = 200, description = "Failure summary", body = FailureSummaryBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 403, description = "Staff role required", body = ErrorSchema),
        (status = 503, description = "Service unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["admin"],
    operation_id = "summarizeFailedAttempts"
)]
#[get("/admin/failed-attempts/summary")]
pub async fn failed_attempt_summary(
    state: web::Data<HttpState>,
    _staff: StaffIdentity,
    query: web::Query<FailureSummaryQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let request = SummaryRequest {
        from: parse_optional_rfc3339_timestamp(query.from, FieldName::new("from"))?,
        to: parse_optional_rfc3339_timestamp(query.to, FieldName::new("to"))?,
        top_n: parse_top_n(query.top_n)?,
    };

    let summary = state.analytics.summary(request).await?;
    Ok(HttpResponse::Ok().json(FailureSummaryBody::from(summary)))
}

#[cfg(test)]
#[path = "failed_attempts_tests.rs"]
mod tests;
