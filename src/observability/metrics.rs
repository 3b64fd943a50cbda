use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub orders_in_queue: IntGauge,
    pub assignment_latency_seconds: HistogramVec,
    pub vehicle_battery_percent: GaugeVec,
    pub missions_finished_total: IntCounterVec,
    pub low_battery_alerts_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Current number of orders in queue")
            .expect("valid orders_in_queue metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let vehicle_battery_percent = GaugeVec::new(
            Opts::new("vehicle_battery_percent", "Vehicle battery level [0..100]"),
            &["vehicle_id"],
        )
        .expect("valid vehicle_battery_percent metric");

        let missions_finished_total = IntCounterVec::new(
            Opts::new("missions_finished_total", "Missions that reached a terminal state"),
            &["outcome"],
        )
        .expect("valid missions_finished_total metric");

        let low_battery_alerts_total =
            IntCounter::new("low_battery_alerts_total", "Low battery alerts raised")
                .expect("valid low_battery_alerts_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(vehicle_battery_percent.clone()))
            .expect("register vehicle_battery_percent");
        registry
            .register(Box::new(missions_finished_total.clone()))
            .expect("register missions_finished_total");
        registry
            .register(Box::new(low_battery_alerts_total.clone()))
            .expect("register low_battery_alerts_total");

        Self {
            registry,
            assignments_total,
            orders_in_queue,
            assignment_latency_seconds,
            vehicle_battery_percent,
            missions_finished_total,
            low_battery_alerts_total,
        }
    }

    pub fn record_assignment(&self, outcome: &str, elapsed_secs: f64) {
        self.assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
        self.assignments_total.with_label_values(&[outcome]).inc();
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
