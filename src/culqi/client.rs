use super::sanitize::redact;
use super::types::{
    to_minor_units, CardData, Charge, ChargePayload, ChargeRequest, CulqiCharge, CulqiErrorBody,
    CulqiRefund, CulqiToken, Refund, RefundPayload, TokenData, TokenPayload, REFUND_REASON,
};
use super::validation::{validate_card, validate_charge_request, validate_refund, ChargeLimits};
use crate::cache::{CardFingerprint, TokenCache, TokenCacheStats};
use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, RetryContext, RetryExecutor,
};
use crate::config::CulqiConfig;
use crate::error::{PaymentError, Result};
use crate::metrics;
use crate::secrets::SecretString;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const BREAKER_NAME: &str = "culqi";

/// Resilient client for the Culqi API.
///
/// Owns one circuit breaker shared by every endpoint, a retry executor used
/// for charge creation and the token cache.
pub struct CulqiClient {
    http: reqwest::Client,
    base_url: Url,
    secret_key: SecretString,
    public_key: Option<SecretString>,
    default_metadata: Map<String, Value>,
    limits: ChargeLimits,
    circuit_breaker: CircuitBreaker,
    retry: RetryExecutor,
    token_cache: TokenCache,
}

impl std::fmt::Debug for CulqiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CulqiClient")
            .field("base_url", &self.base_url.as_str())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl CulqiClient {
    /// Build a client from configuration
    pub fn new(config: CulqiConfig) -> Result<Self> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| PaymentError::Config("Culqi secret key is not configured".to_string()))?;

        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            PaymentError::Config(format!("Invalid Culqi base URL '{}': {}", config.base_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(PaymentError::Config(format!(
                "Culqi base URL must be an http(s) URL: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PaymentError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %base_url,
            timeout_ms = config.timeout_ms,
            max_retries = config.retry.max_retries,
            "Created Culqi client"
        );

        Ok(Self {
            http,
            base_url,
            secret_key,
            public_key: config.public_key,
            default_metadata: config.default_metadata,
            limits: config.limits,
            circuit_breaker: CircuitBreaker::new(BREAKER_NAME, config.circuit_breaker),
            retry: RetryExecutor::new(config.retry),
            token_cache: TokenCache::new(config.token_cache),
        })
    }

    /// Create a charge, retrying transient failures
    pub async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge> {
        self.create_charge_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Create a charge; `cancel` aborts a pending backoff and returns the last error
    pub async fn create_charge_with_cancel(
        &self,
        request: &ChargeRequest,
        cancel: &CancellationToken,
    ) -> Result<Charge> {
        validate_charge_request(request, &self.limits)?;

        let payload = self.charge_payload(request);
        info!(
            amount = payload.amount,
            currency = %payload.currency_code,
            "Creating charge"
        );
        let body = to_body(&payload)?;

        let client = self;
        let body = &body;
        let raw: CulqiCharge = self
            .retry
            .execute_with_predicate(
                "create_charge",
                move |ctx: RetryContext| async move {
                    if ctx.retry_count > 0 {
                        debug!(
                            retry_count = ctx.retry_count,
                            max_retries = ctx.max_retries,
                            "Retrying charge"
                        );
                    }
                    client
                        .send(Method::POST, &["charges"], Some(body), Credential::Secret, "create_charge")
                        .await
                },
                |e: &PaymentError| {
                    e.is_retryable() && !matches!(e, PaymentError::CircuitOpen { .. })
                },
                cancel,
            )
            .await?;

        let charge = Charge::from(raw);
        info!(charge_id = %charge.id, status = %charge.status, "Charge created");
        Ok(charge)
    }

    /// Fetch a charge by id
    pub async fn get_charge(&self, charge_id: &str) -> Result<Charge> {
        let charge_id = charge_id.trim();
        if charge_id.is_empty() {
            return Err(PaymentError::validation("charge_id is required"));
        }

        let raw: CulqiCharge = self
            .send(Method::GET, &["charges", charge_id], None, Credential::Secret, "get_charge")
            .await?;
        Ok(Charge::from(raw))
    }

    /// Refund part or all of a charge; `amount` is in major units
    pub async fn refund_charge(&self, charge_id: &str, amount: f64) -> Result<Refund> {
        let charge_id = charge_id.trim();
        validate_refund(charge_id, amount)?;

        let payload = RefundPayload {
            charge_id: charge_id.to_string(),
            amount: to_minor_units(amount),
            reason: REFUND_REASON,
        };
        info!(charge_id, amount = payload.amount, "Refunding charge");
        let body = to_body(&payload)?;

        let raw: CulqiRefund = self
            .send(Method::POST, &["refunds"], Some(&body), Credential::Secret, "refund_charge")
            .await?;

        let refund = Refund::from(raw);
        info!(refund_id = %refund.id, charge_id = %refund.charge_id, "Charge refunded");
        Ok(refund)
    }

    /// Issue a card token, served from the cache when the same card was
    /// tokenized within the TTL
    pub async fn create_token(&self, card: &CardData) -> Result<TokenData> {
        validate_card(card)?;

        let fingerprint = CardFingerprint::new(card);
        if let Some(token) = self.token_cache.get(&fingerprint).await {
            debug!(token_id = %token.id, "Returning cached token");
            return Ok(token);
        }

        let body = to_body(&TokenPayload::from(card))?;
        let raw: CulqiToken = self
            .send(Method::POST, &["tokens"], Some(&body), Credential::Public, "create_token")
            .await?;

        let token = TokenData::from(raw);
        info!(token_id = %token.id, last_four = card.last_four(), "Token created");
        self.token_cache.put(fingerprint, token.clone()).await;
        Ok(token)
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    /// Whether calls are currently being rejected; false once the cooldown
    /// has elapsed even if no call has closed the circuit yet
    pub async fn circuit_rejecting(&self) -> bool {
        self.circuit_breaker.is_rejecting().await
    }

    pub async fn circuit_failure_count(&self) -> u32 {
        self.circuit_breaker.failure_count().await
    }

    pub async fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.circuit_breaker.metrics().await
    }

    pub fn token_cache_stats(&self) -> TokenCacheStats {
        self.token_cache.stats()
    }

    /// Outbound charge body. Caller metadata wins over configured defaults.
    fn charge_payload(&self, request: &ChargeRequest) -> ChargePayload {
        let mut metadata = self.default_metadata.clone();
        if let Some(extra) = &request.metadata {
            metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        ChargePayload {
            amount: to_minor_units(request.amount),
            currency_code: request.currency_code.trim().to_ascii_uppercase(),
            email: request.email.trim().to_string(),
            source_id: request.token.clone(),
            capture: true,
            description: request.description.clone(),
            metadata,
            antifraud_details: request.antifraud_details.clone(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PaymentError::Config(format!("Invalid Culqi base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn key(&self, credential: Credential) -> &SecretString {
        match credential {
            Credential::Public => self.public_key.as_ref().unwrap_or(&self.secret_key),
            Credential::Secret => &self.secret_key,
        }
    }

    /// Single guarded round trip: breaker check, request, outcome recorded on
    /// the breaker, response decoded.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
        credential: Credential,
        operation: &'static str,
    ) -> Result<T> {
        if let Err(remaining) = self.circuit_breaker.can_proceed().await {
            warn!(operation, retry_after_ms = remaining.as_millis() as u64, "Circuit open, call rejected");
            return Err(PaymentError::CircuitOpen {
                retry_after_secs: remaining.as_millis().div_ceil(1000) as u64,
            });
        }

        let url = self.endpoint(segments)?;
        let request_id = Uuid::new_v4().to_string();
        let payload = body.map(redact).unwrap_or(Value::Null);
        debug!(
            operation,
            request_id = %request_id,
            method = %method,
            path = url.path(),
            payload = %payload,
            "Calling Culqi"
        );

        let timer = metrics::Timer::new(operation);
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.key(credential).expose_secret())
            .header("x-request-id", &request_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                timer.record(0);
                self.circuit_breaker.record_failure().await;
                let err = network_error(&e);
                warn!(operation, request_id = %request_id, error = %err, "Culqi call failed");
                return Err(err);
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                timer.record(0);
                self.circuit_breaker.record_failure().await;
                let err = PaymentError::Network(format!("Failed to read Culqi response: {}", e));
                warn!(operation, request_id = %request_id, error = %err, "Culqi call failed");
                return Err(err);
            }
        };

        let latency_ms = timer.elapsed() * 1000.0;
        timer.record(status.as_u16());

        if !status.is_success() {
            self.circuit_breaker.record_failure().await;
            let err = culqi_error(status.as_u16(), &bytes);
            warn!(
                operation,
                request_id = %request_id,
                status = status.as_u16(),
                latency_ms,
                error = %err,
                "Culqi returned an error"
            );
            return Err(err);
        }

        self.circuit_breaker.record_success().await;
        debug!(operation, request_id = %request_id, status = status.as_u16(), latency_ms, "Culqi call succeeded");

        serde_json::from_slice(&bytes).map_err(|e| {
            PaymentError::Internal(format!("Unexpected Culqi response for {}: {}", operation, e))
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Credential {
    Secret,
    /// Public key when configured, secret key otherwise
    Public,
}

fn to_body<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| PaymentError::Internal(format!("Failed to encode request: {}", e)))
}

fn network_error(e: &reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::Network(format!("Culqi request timed out: {}", e))
    } else if e.is_connect() {
        PaymentError::Network(format!("Failed to connect to Culqi: {}", e))
    } else {
        PaymentError::Network(format!("Culqi request failed: {}", e))
    }
}

fn culqi_error(status: u16, bytes: &[u8]) -> PaymentError {
    let body: Option<Value> = serde_json::from_slice(bytes).ok();
    let parsed = body
        .as_ref()
        .and_then(|v| serde_json::from_value::<CulqiErrorBody>(v.clone()).ok())
        .unwrap_or_default();

    let message = parsed
        .merchant_message
        .or(parsed.user_message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Culqi request failed with status {}", status));

    PaymentError::Culqi {
        status,
        message,
        details: body.as_ref().map(redact),
    }
}
