//! Prometheus metrics of the coordinator

use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Executions currently driven by this process
    pub executions_in_flight: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("exesh_coordinator".to_string()), None)?;

        let executions_in_flight = IntGauge::with_opts(Opts::new(
            "now_executions",
            "Number of executions being scheduled right now",
        ))?;
        registry.register(Box::new(executions_in_flight.clone()))?;

        Ok(Self {
            registry,
            executions_in_flight,
        })
    }

    /// Text exposition of everything registered
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_is_exported_with_prefix() {
        let metrics = Metrics::new().unwrap();
        metrics.executions_in_flight.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("exesh_coordinator_now_executions 3"));
    }
}
