//! Score Client
//!
//! Generates transaction feature payloads and sends them as NATS requests to
//! the risk scoring service, logging each reply.

use rand::Rng;
use risk_score_service::producer::STATUS_HEADER;
use risk_score_service::types::features::{FeatureVector, TransactionType, FEATURE_NAMES};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Payload generator for exercising the service
struct PayloadGenerator {
    rng: rand::rngs::ThreadRng,
}

impl PayloadGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generate a consistent transaction: balances move by the amount
    fn generate_valid(&mut self) -> FeatureVector {
        let tx_type = TransactionType::ALL[self.rng.gen_range(0..TransactionType::ALL.len())];
        let old_balance_orig: f64 = self.rng.gen_range(0.0..50_000.0);
        let drains_account = self.rng.gen_bool(0.1);
        let amount = if drains_account {
            old_balance_orig
        } else {
            self.rng.gen_range(1.0..5_000.0_f64).min(old_balance_orig.max(1.0))
        };
        let new_balance_orig = (old_balance_orig - amount).max(0.0);
        let old_balance_dest: f64 = self.rng.gen_range(0.0..20_000.0);

        let fv = FeatureVector {
            amount,
            old_balance_orig,
            new_balance_orig,
            old_balance_dest,
            new_balance_dest: old_balance_dest + amount,
            time_diff: self.rng.gen_range(0.0..86_400.0),
            balance_change_ratio: (old_balance_orig - new_balance_orig) / (old_balance_orig + 1e-9),
            amount_vs_median: self.rng.gen_range(0.1..10.0),
            type_cash_in: 0.0,
            type_cash_out: 0.0,
            type_debit: 0.0,
            type_payment: 0.0,
            type_transfer: 0.0,
            account_orig: self.rng.gen_range(1_000_000.0..9_999_999.0_f64).floor(),
            account_dest: self.rng.gen_range(1_000_000.0..9_999_999.0_f64).floor(),
        };

        fv.with_transaction_type(tx_type)
    }

    /// Generate a payload with one field dropped or corrupted
    fn generate_invalid(&mut self) -> Value {
        let mut payload = match serde_json::to_value(self.generate_valid()) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let field = FEATURE_NAMES[self.rng.gen_range(0..FEATURE_NAMES.len())];

        if self.rng.gen_bool(0.5) {
            payload.remove(field);
        } else {
            payload.insert(field.to_string(), Value::String("n/a".to_string()));
        }

        Value::Object(payload)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("score_client=info".parse()?),
        )
        .init();

    info!("Starting Score Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("risk.score");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let invalid_ratio: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        invalid_ratio = invalid_ratio,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, invalid_ratio, delay_ms).await;
        }
    };

    let mut generator = PayloadGenerator::new();
    let mut rng = rand::thread_rng();
    let mut accepted = 0u64;
    let mut rejected = 0u64;

    for i in 0..count {
        let payload = if rng.gen_bool(invalid_ratio) {
            generator.generate_invalid()
        } else {
            serde_json::to_value(generator.generate_valid())?
        };

        let response = client
            .request(subject.to_string(), serde_json::to_vec(&payload)?.into())
            .await?;
        let status = response
            .headers
            .as_ref()
            .and_then(|h| h.get(STATUS_HEADER))
            .map(|v| v.as_str().to_string())
            .unwrap_or_else(|| "?".to_string());
        let body = String::from_utf8_lossy(&response.payload);

        if status == "200" {
            accepted += 1;
            info!(request = i + 1, status = %status, reply = %body, "Scored");
        } else {
            rejected += 1;
            warn!(request = i + 1, status = %status, reply = %body, "Rejected");
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} scored, {} rejected)",
        count, accepted, rejected
    );

    Ok(())
}

async fn run_dry_mode(count: u64, invalid_ratio: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PayloadGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let payload = if rng.gen_bool(invalid_ratio) {
            generator.generate_invalid()
        } else {
            serde_json::to_value(generator.generate_valid())?
        };

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample payload {}:\n{}", i + 1, serde_json::to_string_pretty(&payload)?);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
