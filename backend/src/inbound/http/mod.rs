//! HTTP inbound adapter exposing REST endpoints.

pub mod error;
pub mod failed_attempts;
pub mod health;
pub mod identity;
pub mod orders;
pub mod orders_dto;
pub mod schemas;
pub mod state;
pub mod validation;

pub use error::ApiResult;
