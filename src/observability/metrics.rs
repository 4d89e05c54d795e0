use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub position_reports_total: IntCounterVec,
    pub room_broadcasts_total: IntCounterVec,
    pub active_sessions: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Accepted order status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let position_reports_total = IntCounterVec::new(
            Opts::new("position_reports_total", "Position reports by outcome"),
            &["outcome"],
        )
        .expect("valid position_reports_total metric");

        let room_broadcasts_total = IntCounterVec::new(
            Opts::new(
                "room_broadcasts_total",
                "Per-session room deliveries by event and outcome",
            ),
            &["event", "outcome"],
        )
        .expect("valid room_broadcasts_total metric");

        let active_sessions = IntGauge::new("active_sessions", "Currently connected sessions")
            .expect("valid active_sessions metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(position_reports_total.clone()))
            .expect("register position_reports_total");
        registry
            .register(Box::new(room_broadcasts_total.clone()))
            .expect("register room_broadcasts_total");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register active_sessions");

        Self {
            registry,
            order_transitions_total,
            position_reports_total,
            room_broadcasts_total,
            active_sessions,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
