//! # Prometheus Metrics
//!
//! Operational metrics for the campaign host, scraped by Prometheus at the
//! `/metrics` endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `crowdx` prefix so they do not collide with any global registry
//! consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crowdx_contracts::{CampaignEvent, EventRecord};

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference-counted internally, so cloning is cheap.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Campaigns registered.
    pub campaigns_created_total: IntCounter,
    /// Accepted contributions.
    pub contributions_total: IntCounter,
    /// Sum of accepted contribution amounts.
    pub contributed_amount_total: IntCounter,
    /// Finalizations, labelled by outcome (`successful` / `failed`).
    pub finalizations_total: IntCounterVec,
    /// Owner withdrawals paid.
    pub withdrawals_total: IntCounter,
    /// Contributor refunds paid.
    pub refunds_total: IntCounter,
    /// Rejected operations, labelled by error code.
    pub rejected_operations_total: IntCounterVec,
    /// Value currently escrowed across all campaigns.
    pub escrow_balance: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("crowdx".into()), None)?;

        let campaigns_created_total =
            IntCounter::new("campaigns_created_total", "Total number of campaigns created")?;
        registry.register(Box::new(campaigns_created_total.clone()))?;

        let contributions_total = IntCounter::new(
            "contributions_total",
            "Total number of accepted contributions",
        )?;
        registry.register(Box::new(contributions_total.clone()))?;

        let contributed_amount_total = IntCounter::new(
            "contributed_amount_total",
            "Sum of all accepted contribution amounts",
        )?;
        registry.register(Box::new(contributed_amount_total.clone()))?;

        let finalizations_total = IntCounterVec::new(
            Opts::new("finalizations_total", "Campaign finalizations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(finalizations_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of owner withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let refunds_total = IntCounter::new("refunds_total", "Total number of refunds paid")?;
        registry.register(Box::new(refunds_total.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Operations rejected by the campaign contracts, by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let escrow_balance = IntGauge::new(
            "escrow_balance",
            "Value currently held in escrow across all campaigns",
        )?;
        registry.register(Box::new(escrow_balance.clone()))?;

        Ok(Self {
            registry,
            campaigns_created_total,
            contributions_total,
            contributed_amount_total,
            finalizations_total,
            withdrawals_total,
            refunds_total,
            rejected_operations_total,
            escrow_balance,
        })
    }

    /// Updates counters for a journaled event.
    pub fn observe(&self, record: &EventRecord) {
        match &record.event {
            CampaignEvent::CampaignCreated { .. } => self.campaigns_created_total.inc(),
            CampaignEvent::ContributionMade { amount, .. } => {
                self.contributions_total.inc();
                self.contributed_amount_total.inc_by(*amount);
            }
            CampaignEvent::CampaignFinalized { final_state, .. } => {
                let outcome = final_state.to_string().to_lowercase();
                self.finalizations_total
                    .with_label_values(&[outcome.as_str()])
                    .inc();
            }
            CampaignEvent::FundsWithdrawn { .. } => self.withdrawals_total.inc(),
            CampaignEvent::RefundClaimed { .. } => self.refunds_total.inc(),
        }
    }

    /// Counts a rejected operation.
    pub fn reject(&self, code: &str) {
        self.rejected_operations_total
            .with_label_values(&[code])
            .inc();
    }

    /// Sets the escrow gauge, clamping at `i64::MAX`.
    pub fn set_escrow(&self, amount: u64) {
        self.escrow_balance
            .set(i64::try_from(amount).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
