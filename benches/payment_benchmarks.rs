use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use culqi_payments::cache::CardFingerprint;
use culqi_payments::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use culqi_payments::culqi::sanitize::redact;
use culqi_payments::culqi::types::to_minor_units;
use culqi_payments::culqi::validation::{validate_charge_request, ChargeLimits};
use culqi_payments::culqi::{CardData, ChargeRequest};
use serde_json::{json, Map};

fn charge_request() -> ChargeRequest {
    let mut metadata = Map::new();
    metadata.insert("order_id".to_string(), json!("A-1"));

    ChargeRequest {
        token: "tok_abc123XYZ".to_string(),
        amount: 150.00,
        currency_code: "PEN".to_string(),
        email: "cliente@example.com".to_string(),
        description: Some("Pedido A-1".to_string()),
        metadata: Some(metadata),
        antifraud_details: Some(json!({"first_name": "Ana"})),
    }
}

fn benchmark_validation(c: &mut Criterion) {
    let limits = ChargeLimits::default();
    let valid = charge_request();
    let mut invalid = charge_request();
    invalid.token = "bad".to_string();
    invalid.amount = -1.0;

    c.bench_function("validate_charge_valid", |b| {
        b.iter(|| validate_charge_request(black_box(&valid), black_box(&limits)))
    });

    c.bench_function("validate_charge_invalid", |b| {
        b.iter(|| validate_charge_request(black_box(&invalid), black_box(&limits)))
    });
}

fn benchmark_amount_conversion(c: &mut Criterion) {
    c.bench_function("to_minor_units", |b| {
        b.iter(|| to_minor_units(black_box(1234.56)))
    });
}

fn benchmark_redaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("redact_payload");

    for items in [1usize, 10, 100] {
        let payload = json!({
            "source_id": "tok_abc123",
            "amount": 15000,
            "metadata": {"token": "tok_xyz", "order": "A-1"},
            "items": (0..items).map(|i| json!({"sku": i, "cvv": "123"})).collect::<Vec<_>>()
        });

        group.bench_with_input(BenchmarkId::from_parameter(items), &payload, |b, payload| {
            b.iter(|| redact(black_box(payload)))
        });
    }

    group.finish();
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let card = CardData {
        card_number: "4111111111111111".to_string(),
        cvv: "123".to_string(),
        expiration_month: 9,
        expiration_year: 2030,
        email: "cliente@example.com".to_string(),
        metadata: None,
    };

    c.bench_function("card_fingerprint", |b| {
        b.iter(|| CardFingerprint::new(black_box(&card)))
    });
}

fn benchmark_breaker_check(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());

    c.bench_function("circuit_breaker_can_proceed", |b| {
        b.to_async(&runtime).iter(|| async {
            let _ = breaker.can_proceed().await;
            breaker.record_success().await;
        })
    });
}

criterion_group!(
    benches,
    benchmark_validation,
    benchmark_amount_conversion,
    benchmark_redaction,
    benchmark_fingerprint,
    benchmark_breaker_check,
);
criterion_main!(benches);
