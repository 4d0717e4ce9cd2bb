//! Culqi gateway client: request validation, payload shaping, response
//! normalization and the resilience wrapped around every call.

pub mod client;
pub mod sanitize;
pub mod types;
pub mod validation;

pub use client::CulqiClient;
pub use types::{
    CardData, Charge, ChargeRequest, ChargeStatus, Customer, PaymentMethod, Refund,
    RefundRequest, TokenData,
};
pub use validation::ChargeLimits;
