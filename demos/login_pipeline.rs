//! Login pipeline example demonstrating risk-based decisions.
//!
//! This example shows how to:
//! - Build a security pipeline with a remote provider stage
//! - Protect the remote provider with a circuit breaker
//! - Observe allow, mfa and block decisions
//! - See a collaborator failure fail closed
//!
//! Run with: cargo run --example login_pipeline

use riskgate::backends::{MockBehavior, MockFingerprinter, MockRiskProvider};
use riskgate::core::RemoteProviderResponse;
use riskgate::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn describe(label: &str, result: &SecurityPipelineResult) {
    let assessment = &result.risk_assessment;
    println!(
        "{:<28} action={:<5} score={:>3} level={:<8} rules={:?}",
        label,
        assessment.decision_hint.action.name(),
        assessment.risk_score,
        assessment.risk_level,
        assessment.triggered_rules,
    );
    if let Some(reason) = &assessment.decision_hint.block_reason {
        println!("{:<28} reason: {}", "", reason);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riskgate=info".into()),
        )
        .init();

    println!("=== Login Pipeline Example ===\n");

    let provider = Arc::new(MockRiskProvider::new().with_name("intel"));
    let breaker = Arc::new(BreakerGuard::new(
        "intel",
        CircuitBreakerConfig::new()
            .with_minimum_request_count(2)
            .with_failure_rate_threshold_percent(50.0)
            .with_open_state_cooldown_ms(5_000),
    ));
    let stage = RemoteProviderStage::builder(provider.clone())
        .with_circuit_breaker(breaker.clone())
        .build()?;

    let pipeline = SecurityPipeline::builder()
        .with_fingerprint_provider(MockFingerprinter::new())
        .with_remote_stage(stage)
        .build()?;

    let attempt = LoginAttempt::new()
        .with_user_id("alice")
        .with_ip("203.0.113.7")
        .with_geo(GeoInfo::country("DE").with_city("Berlin"));

    // A clean login
    let result = pipeline.execute(&attempt).await?;
    describe("clean login", &result);

    // Unknown device from a VPN
    provider.set_behavior(MockBehavior::Respond(RemoteProviderResponse {
        is_vpn: Some(true),
        ..Default::default()
    }));
    let result = pipeline
        .execute_with_device(
            &attempt,
            DeviceInfo::new("new-phone", DeviceType::Unknown),
            &CancellationToken::new(),
        )
        .await?;
    describe("unknown device over vpn", &result);

    // Tor exit node
    provider.set_behavior(MockBehavior::Respond(RemoteProviderResponse {
        is_tor: Some(true),
        reputation_score: Some(10.0),
        ..Default::default()
    }));
    let result = pipeline.execute(&attempt).await?;
    describe("tor exit node", &result);

    // The provider goes down; the pipeline fails closed and the breaker opens
    println!("\nProvider outage:");
    provider.set_behavior(MockBehavior::Fail("503 Service Unavailable".to_string()));
    for i in 1..=4 {
        let result = pipeline.execute(&attempt).await?;
        let metrics = breaker.state();
        describe(&format!("  request #{}", i), &result);
        println!(
            "{:<28} circuit={} failures={} provider calls={}",
            "",
            metrics.state.name(),
            metrics.failure_count,
            provider.call_count(),
        );
    }

    // A fingerprint failure fails closed
    println!("\nFingerprint outage:");
    let broken = SecurityPipeline::builder()
        .with_fingerprint_provider(
            MockFingerprinter::new().with_latency(Duration::from_secs(5)),
        )
        .with_config(
            SecurityPipelineConfig::new().with_fingerprint_timeout(Duration::from_millis(200)),
        )
        .build()?;
    let result = broken.execute(&attempt).await?;
    describe("  fingerprint timeout", &result);
    println!("{:<28} device={}", "", result.device_info.device_id);

    println!("\n=== Example Complete ===");
    Ok(())
}
