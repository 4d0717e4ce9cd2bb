use super::types::{CardData, ChargeRequest};
use crate::error::{PaymentError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

/// Limits applied to inbound charge requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeLimits {
    /// Largest accepted amount, in major units
    #[serde(default = "default_max_amount")]
    pub max_amount: f64,
    /// ISO currency codes accepted by the merchant account
    #[serde(default = "default_allowed_currencies")]
    pub allowed_currencies: Vec<String>,
}

fn default_max_amount() -> f64 {
    10_000.00
}

fn default_allowed_currencies() -> Vec<String> {
    vec!["PEN".to_string(), "USD".to_string()]
}

impl Default for ChargeLimits {
    fn default() -> Self {
        Self {
            max_amount: default_max_amount(),
            allowed_currencies: default_allowed_currencies(),
        }
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^tok_[A-Za-z0-9]+$").expect("valid token regex"))
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

/// Collects field errors so one response reports every problem at once
#[derive(Debug, Default)]
struct FieldErrors(Vec<(&'static str, String)>);

impl FieldErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push((field, message.into()));
    }

    fn into_result(self, what: &str) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        let fields: Vec<&str> = self.0.iter().map(|(field, _)| *field).collect();
        let errors: Vec<_> = self
            .0
            .iter()
            .map(|(field, message)| json!({"field": field, "message": message}))
            .collect();

        Err(PaymentError::Validation {
            message: format!("Invalid {}: {}", what, fields.join(", ")),
            details: Some(json!({ "errors": errors })),
        })
    }
}

fn check_amount(errors: &mut FieldErrors, amount: f64, max_amount: Option<f64>) {
    if !amount.is_finite() {
        errors.push("amount", "amount must be a number");
    } else if amount <= 0.0 {
        errors.push("amount", "amount must be greater than zero");
    } else if (amount * 100.0).round() < 1.0 {
        // Would be sent as zero minor units.
        errors.push("amount", "amount must be at least 0.01");
    } else if (amount * 100.0).round() >= i64::MAX as f64 {
        errors.push("amount", "amount is too large");
    } else if let Some(max) = max_amount {
        if amount > max {
            errors.push("amount", format!("amount must not exceed {:.2}", max));
        }
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.push("email", "email is required");
    } else if !email_pattern().is_match(email) {
        errors.push("email", "email is not a valid address");
    }
}

/// Validate a charge request before anything is sent to Culqi
pub fn validate_charge_request(request: &ChargeRequest, limits: &ChargeLimits) -> Result<()> {
    let mut errors = FieldErrors::default();

    if !token_pattern().is_match(&request.token) {
        errors.push("token", "token must match tok_[A-Za-z0-9]+");
    }

    check_amount(&mut errors, request.amount, Some(limits.max_amount));

    if !limits
        .allowed_currencies
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&request.currency_code))
    {
        errors.push(
            "currency_code",
            format!(
                "currency_code must be one of {}",
                limits.allowed_currencies.join(", ")
            ),
        );
    }

    check_email(&mut errors, &request.email);

    if let Some(antifraud) = &request.antifraud_details {
        if !antifraud.is_object() {
            errors.push("antifraud_details", "antifraud_details must be an object");
        }
    }

    errors.into_result("charge request")
}

/// Validate a refund before anything is sent to Culqi
pub fn validate_refund(charge_id: &str, amount: f64) -> Result<()> {
    let mut errors = FieldErrors::default();

    if charge_id.trim().is_empty() {
        errors.push("charge_id", "charge_id is required");
    }
    check_amount(&mut errors, amount, None);

    errors.into_result("refund request")
}

/// Basic card data checks; Culqi does the real verification
pub fn validate_card(card: &CardData) -> Result<()> {
    let mut errors = FieldErrors::default();

    let number = card.card_number.trim();
    if !(13..=19).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
        errors.push("card_number", "card_number must be 13 to 19 digits");
    }

    let cvv = card.cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        errors.push("cvv", "cvv must be 3 or 4 digits");
    }

    if !(1..=12).contains(&card.expiration_month) {
        errors.push("expiration_month", "expiration_month must be between 1 and 12");
    }

    check_email(&mut errors, &card.email);

    errors.into_result("card data")
}
