//! Request, response and wire types for the Culqi API.
//!
//! Amounts crossing the public API are major units (`150.00` soles); amounts
//! on the wire are integer minor units (`15000` céntimos).

use crate::error::{PaymentError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Refund reason sent with every refund
pub const REFUND_REASON: &str = "solicitud_comprador";

/// Convert a major-unit amount into integer minor units
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert integer minor units back into a major-unit amount with two decimals
pub fn to_major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

fn timestamp_from_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Charge request accepted from callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Card token issued by Culqi (`tok_...`)
    pub token: String,
    /// Amount in major units
    pub amount: f64,
    pub currency_code: String,
    pub email: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub antifraud_details: Option<Value>,
}

impl ChargeRequest {
    /// Build a request from untyped JSON, reporting shape errors as validation errors
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PaymentError::Validation {
            message: format!("Invalid charge request: {}", e),
            details: None,
        })
    }
}

/// Refund request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Amount in major units
    pub amount: f64,
}

/// Card data used to issue a token.
///
/// `Debug` never prints the card number or CVV.
#[derive(Clone, Serialize, Deserialize)]
pub struct CardData {
    pub card_number: String,
    pub cvv: String,
    pub expiration_month: u8,
    pub expiration_year: u16,
    pub email: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl CardData {
    pub fn last_four(&self) -> &str {
        let number = self.card_number.trim();
        let start = number.len().saturating_sub(4);
        number.get(start..).unwrap_or_default()
    }
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("card_number", &format_args!("****{}", self.last_four()))
            .field("cvv", &"***")
            .field("expiration_month", &self.expiration_month)
            .field("expiration_year", &self.expiration_year)
            .field("email", &self.email)
            .finish()
    }
}

/// Normalized charge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Succeeded,
    Failed,
    Pending,
    Voided,
    Unknown,
}

impl ChargeStatus {
    /// Map a Culqi outcome type onto the normalized status
    pub fn from_outcome(outcome: &str) -> Self {
        match outcome {
            "venta_exitosa" => ChargeStatus::Succeeded,
            "venta_rechazada" => ChargeStatus::Failed,
            "venta_pendiente" => ChargeStatus::Pending,
            "venta_anulada" => ChargeStatus::Voided,
            _ => ChargeStatus::Unknown,
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeStatus::Succeeded => "succeeded",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Pending => "pending",
            ChargeStatus::Voided => "voided",
            ChargeStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Normalized charge returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: ChargeStatus,
    pub paid: bool,
    pub payment_method: PaymentMethod,
    pub customer: Customer,
    pub created_at: Option<DateTime<Utc>>,
    pub receipt_url: Option<String>,
    pub metadata: Value,
}

/// Normalized refund returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub charge_id: String,
    pub amount: f64,
    pub reason: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Token data returned to callers and kept in the token cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    pub id: String,
    pub email: Option<String>,
    pub card_brand: Option<String>,
    pub last_four: Option<String>,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

// Outbound payloads

#[derive(Debug, Serialize)]
pub(crate) struct ChargePayload {
    pub amount: i64,
    pub currency_code: String,
    pub email: String,
    pub source_id: String,
    pub capture: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antifraud_details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefundPayload {
    pub charge_id: String,
    pub amount: i64,
    pub reason: &'static str,
}

#[derive(Serialize)]
pub(crate) struct TokenPayload {
    pub card_number: String,
    pub cvv: String,
    pub expiration_month: String,
    pub expiration_year: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl From<&CardData> for TokenPayload {
    fn from(card: &CardData) -> Self {
        Self {
            card_number: card.card_number.trim().to_string(),
            cvv: card.cvv.trim().to_string(),
            expiration_month: format!("{:02}", card.expiration_month),
            expiration_year: card.expiration_year.to_string(),
            email: card.email.trim().to_string(),
            metadata: card.metadata.clone(),
        }
    }
}

// Culqi response bodies

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CulqiOutcome {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CulqiIin {
    #[serde(default)]
    pub card_brand: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CulqiSource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub iin: Option<CulqiIin>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CulqiAntifraud {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CulqiCharge {
    pub id: String,
    pub amount: i64,
    pub currency_code: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub outcome: Option<CulqiOutcome>,
    #[serde(default)]
    pub paid: Option<bool>,
    #[serde(default)]
    pub source: Option<CulqiSource>,
    #[serde(default)]
    pub antifraud_details: Option<CulqiAntifraud>,
    #[serde(default)]
    pub creation_date: Option<i64>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl From<CulqiCharge> for Charge {
    fn from(raw: CulqiCharge) -> Self {
        let status = raw
            .outcome
            .as_ref()
            .and_then(|o| o.kind.as_deref())
            .map(ChargeStatus::from_outcome)
            .unwrap_or(ChargeStatus::Unknown);

        let source = raw.source.unwrap_or_default();
        let last4 = source.last_four.or_else(|| {
            source.card_number.as_deref().and_then(|n| {
                let start = n.len().checked_sub(4)?;
                n.get(start..).map(str::to_string)
            })
        });
        let payment_method = PaymentMethod {
            kind: match source.kind.as_deref() {
                Some("card") | None => "card".to_string(),
                Some(other) => other.to_string(),
            },
            brand: source.iin.and_then(|iin| iin.card_brand),
            last4,
        };

        let antifraud = raw.antifraud_details.unwrap_or_default();
        let customer = Customer {
            email: raw.email,
            first_name: antifraud.first_name,
            last_name: antifraud.last_name,
        };

        Charge {
            id: raw.id,
            amount: to_major_units(raw.amount),
            currency: raw.currency_code,
            paid: raw.paid.unwrap_or(status == ChargeStatus::Succeeded),
            status,
            payment_method,
            customer,
            created_at: timestamp_from_millis(raw.creation_date),
            receipt_url: raw.receipt_url,
            metadata: raw
                .metadata
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CulqiRefund {
    pub id: String,
    pub charge_id: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub creation_date: Option<i64>,
}

impl From<CulqiRefund> for Refund {
    fn from(raw: CulqiRefund) -> Self {
        Refund {
            id: raw.id,
            charge_id: raw.charge_id,
            amount: to_major_units(raw.amount),
            reason: raw.reason.unwrap_or_else(|| REFUND_REASON.to_string()),
            status: "refunded".to_string(),
            created_at: timestamp_from_millis(raw.creation_date),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CulqiToken {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub iin: Option<CulqiIin>,
    #[serde(default)]
    pub creation_date: Option<i64>,
}

impl From<CulqiToken> for TokenData {
    fn from(raw: CulqiToken) -> Self {
        TokenData {
            id: raw.id,
            email: raw.email,
            card_brand: raw.iin.and_then(|iin| iin.card_brand),
            last_four: raw.last_four,
            active: raw.active.unwrap_or(true),
            created_at: timestamp_from_millis(raw.creation_date),
        }
    }
}

/// Error body returned by Culqi
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CulqiErrorBody {
    #[serde(default)]
    pub merchant_message: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_conversion() {
        assert_eq!(to_minor_units(150.00), 15000);
        assert_eq!(to_major_units(15000), 150.00);
        assert_eq!(to_minor_units(19.99), 1999);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(to_major_units(1), 0.01);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ChargeStatus::from_outcome("venta_exitosa"), ChargeStatus::Succeeded);
        assert_eq!(ChargeStatus::from_outcome("venta_rechazada"), ChargeStatus::Failed);
        assert_eq!(ChargeStatus::from_outcome("venta_pendiente"), ChargeStatus::Pending);
        assert_eq!(ChargeStatus::from_outcome("venta_anulada"), ChargeStatus::Voided);
        assert_eq!(ChargeStatus::from_outcome("algo_nuevo"), ChargeStatus::Unknown);
        assert_eq!(
            serde_json::to_value(ChargeStatus::Succeeded).unwrap(),
            json!("succeeded")
        );
    }

    #[test]
    fn test_charge_normalization() {
        let raw: CulqiCharge = serde_json::from_value(json!({
            "object": "charge",
            "id": "chr_live_123",
            "amount": 15000,
            "currency_code": "PEN",
            "email": "cliente@example.com",
            "creation_date": 1_700_000_000_000i64,
            "outcome": {"type": "venta_exitosa", "user_message": "Su compra ha sido exitosa."},
            "source": {
                "object": "token",
                "type": "card",
                "card_number": "411111******1111",
                "last_four": "1111",
                "iin": {"card_brand": "Visa"}
            },
            "antifraud_details": {"first_name": "Ana", "last_name": "Quispe"},
            "metadata": {"order_id": "A-1"}
        }))
        .unwrap();

        let charge = Charge::from(raw);
        assert_eq!(charge.id, "chr_live_123");
        assert_eq!(charge.amount, 150.00);
        assert_eq!(charge.currency, "PEN");
        assert_eq!(charge.status, ChargeStatus::Succeeded);
        assert!(charge.paid);
        assert_eq!(charge.payment_method.brand.as_deref(), Some("Visa"));
        assert_eq!(charge.payment_method.last4.as_deref(), Some("1111"));
        assert_eq!(charge.customer.first_name.as_deref(), Some("Ana"));
        assert_eq!(charge.metadata["order_id"], "A-1");
        assert_eq!(
            charge.created_at.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn test_charge_normalization_with_sparse_body() {
        let raw: CulqiCharge = serde_json::from_value(json!({
            "id": "chr_1",
            "amount": 500,
            "currency_code": "USD",
            "source": {"card_number": "411111******4242"}
        }))
        .unwrap();

        let charge = Charge::from(raw);
        assert_eq!(charge.status, ChargeStatus::Unknown);
        assert!(!charge.paid);
        assert_eq!(charge.payment_method.kind, "card");
        assert_eq!(charge.payment_method.last4.as_deref(), Some("4242"));
        assert_eq!(charge.metadata, json!({}));
        assert!(charge.created_at.is_none());
    }

    #[test]
    fn test_card_data_debug_is_redacted() {
        let card = CardData {
            card_number: "4111111111111111".into(),
            cvv: "123".into(),
            expiration_month: 9,
            expiration_year: 2030,
            email: "cliente@example.com".into(),
            metadata: None,
        };
        let debug = format!("{:?}", card);
        assert!(!debug.contains("4111111111111111"));
        assert!(!debug.contains("123\""));
        assert!(debug.contains("****1111"));

        let payload = TokenPayload::from(&card);
        assert_eq!(payload.expiration_month, "09");
        assert_eq!(payload.expiration_year, "2030");
    }

    #[test]
    fn test_charge_request_from_json_rejects_non_numeric_amount() {
        let err = ChargeRequest::from_json(json!({
            "token": "tok_abc",
            "amount": "ciento",
            "currency_code": "PEN",
            "email": "cliente@example.com"
        }))
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
