//! Caller identity extractors.
//!
//! Authentication happens at the upstream gateway, which forwards the
//! participant account as `X-Account-Id` and staff sessions as
//! `X-Staff-Role: staff`. These extractors keep handlers free of header
//! parsing and turn missing or malformed identity into domain errors.

use std::future::{Ready, ready};

use actix_web::http::header::USER_AGENT;
use actix_web::{FromRequest, HttpRequest, dev::Payload};

use crate::domain::{AccountId, ClientMeta, Error, RuleVersion};

/// Header carrying the authenticated participant account.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
/// Header carrying the caller's role for staff-only endpoints.
pub const STAFF_ROLE_HEADER: &str = "x-staff-role";
const STAFF_ROLE: &str = "staff";

/// Authenticated participant account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantIdentity(AccountId);

impl ParticipantIdentity {
    /// Account the request acts for.
    pub fn account_id(&self) -> &AccountId {
        &self.0
    }

    /// Consume the wrapper.
    pub fn into_account_id(self) -> AccountId {
        self.0
    }

    fn from_http(req: &HttpRequest) -> Result<Self, Error> {
        let raw = req
            .headers()
            .get(ACCOUNT_ID_HEADER)
            .ok_or_else(|| Error::unauthorized("account identity required"))?
            .to_str()
            .map_err(|_| Error::unauthorized("account identity header is not valid text"))?;
        AccountId::new(raw.trim())
            .map(Self)
            .map_err(|err| Error::unauthorized(format!("invalid account identity: {err}")))
    }
}

impl FromRequest for ParticipantIdentity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}

/// Marker proving the caller holds the staff role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffIdentity;

impl StaffIdentity {
    fn from_http(req: &HttpRequest) -> Result<Self, Error> {
        let role = req
            .headers()
            .get(STAFF_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim);
        match role {
            Some(role) if role.eq_ignore_ascii_case(STAFF_ROLE) => Ok(Self),
            _ => Err(Error::forbidden("staff role required")),
        }
    }
}

impl FromRequest for StaffIdentity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}

/// Collect client metadata recorded with failed attempts.
pub fn client_meta(req: &HttpRequest, rule_version: Option<RuleVersion>) -> ClientMeta {
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_owned);
    ClientMeta {
        user_agent,
        ip_address,
        rule_version,
    }
}
