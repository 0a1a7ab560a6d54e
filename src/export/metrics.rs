use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntCounter, Opts, Registry};

use crate::conntrack::protocol_name;
use crate::state::ConnectionTracker;

/// Process counters of the event pipeline.
///
/// Cloning shares the underlying counters.
#[derive(Clone)]
pub struct TrackerMetrics {
    /// Events applied to the tracker.
    pub events: IntCounter,
    /// Events the classifier or tracker ignored.
    pub filtered: IntCounter,
    /// Events lost because the queue was full.
    pub dropped: IntCounter,
    /// Pipeline runs that ended with kernel-side event loss.
    pub buffer_full: IntCounter,
}

impl TrackerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            events: IntCounter::with_opts(Opts::new(
                "down_target_connection_event_count",
                "The count of connection events received by the connection tracker",
            ))?,
            filtered: IntCounter::with_opts(Opts::new(
                "down_target_filtered_connection_event_count",
                "The count of connection events filtered out by the connection tracker",
            ))?,
            dropped: IntCounter::with_opts(Opts::new(
                "down_target_dropped_connection_event_count",
                "The count of connection events dropped because the event queue was full",
            ))?,
            buffer_full: IntCounter::with_opts(Opts::new(
                "down_target_buffer_full_errors",
                "The number of times the receive buffer has filled up and we have dropped some events.",
            ))?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.events.clone()))?;
        registry.register(Box::new(self.filtered.clone()))?;
        registry.register(Box::new(self.dropped.clone()))?;
        registry.register(Box::new(self.buffer_full.clone()))?;
        Ok(())
    }
}

/// Reports the down window at scrape time.
pub struct DownTargetCollector {
    tracker: Arc<ConnectionTracker>,
    targets: GaugeVec,
    ports: GaugeVec,
    // Gauges are rebuilt per scrape; one scrape at a time.
    scrape: Mutex<()>,
}

impl DownTargetCollector {
    pub fn new(tracker: Arc<ConnectionTracker>) -> prometheus::Result<Self> {
        let targets = GaugeVec::new(
            Opts::new(
                "down_target",
                "Reports the value one if the remote target with the provided address could not be reached during a connection attempt in the last minute.",
            ),
            &["ip"],
        )?;
        let ports = GaugeVec::new(
            Opts::new(
                "down_target_ports",
                "Reports the value one if the remote ip, port, and protocol could not be reached during a connection attempt in the last minute.",
            ),
            &["ip", "proto", "port"],
        )?;
        Ok(Self {
            tracker,
            targets,
            ports,
            scrape: Mutex::new(()),
        })
    }
}

impl Collector for DownTargetCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.targets.desc();
        descs.extend(self.ports.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _guard = self.scrape.lock();
        self.targets.reset();
        self.ports.reset();

        for target in self.tracker.snapshot() {
            if target.up {
                continue;
            }
            let ip = target.address.to_string();
            self.targets.with_label_values(&[ip.as_str()]).set(1.0);
            for port in &target.ports {
                let proto = protocol_name(port.protocol);
                let number = port.port.to_string();
                let value = if port.failing { 1.0 } else { 0.0 };
                self.ports
                    .with_label_values(&[ip.as_str(), proto.as_str(), number.as_str()])
                    .set(value);
            }
        }

        let mut families = self.targets.collect();
        families.extend(self.ports.collect());
        families
    }
}

/// Build the registry served on `/metrics`.
pub fn registry(
    tracker: Arc<ConnectionTracker>,
    metrics: &TrackerMetrics,
) -> prometheus::Result<Registry> {
    let registry = Registry::new();
    metrics.register(&registry)?;
    registry.register(Box::new(DownTargetCollector::new(tracker)?))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Limits;
    use std::net::{IpAddr, Ipv4Addr};

    const TCP: u8 = 6;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
        families.iter().find(|f| f.get_name() == name)
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
            .unwrap_or_default()
    }

    #[test]
    fn test_registry_reports_down_targets() {
        let tracker = Arc::new(ConnectionTracker::new(Limits::default()));
        let down = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let recovering = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        tracker.record_failure(down, TCP, 80);
        tracker.record_failure(recovering, TCP, 443);
        tracker.record_failure(recovering, TCP, 8443);
        tracker.flush();
        tracker.record_success(recovering, TCP, 443);
        tracker.flush();

        let metrics = TrackerMetrics::new().unwrap();
        metrics.events.inc_by(3);
        let registry = registry(tracker, &metrics).unwrap();
        let families = registry.gather();

        let targets = family(&families, "down_target").unwrap();
        assert_eq!(targets.get_metric().len(), 1);
        assert_eq!(label(&targets.get_metric()[0], "ip"), "10.0.0.1");

        // Ports of the recovered address are no longer reported.
        let ports = family(&families, "down_target_ports").unwrap();
        assert_eq!(ports.get_metric().len(), 1);
        let port = &ports.get_metric()[0];
        assert_eq!(label(port, "ip"), "10.0.0.1");
        assert_eq!(label(port, "proto"), "tcp");
        assert_eq!(label(port, "port"), "80");
        assert_eq!(port.get_gauge().get_value(), 1.0);

        let events = family(&families, "down_target_connection_event_count").unwrap();
        assert_eq!(events.get_metric()[0].get_counter().get_value(), 3.0);
    }

    #[test]
    fn test_collect_drops_expired_targets() {
        let tracker = Arc::new(ConnectionTracker::new(Limits::default()));
        let address = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        tracker.record_failure(address, TCP, 22);
        tracker.flush();

        let collector = DownTargetCollector::new(tracker.clone()).unwrap();
        assert_eq!(collector.collect()[0].get_metric().len(), 1);

        for _ in 0..3 {
            tracker.flush();
        }
        let families = collector.collect();
        assert!(families.iter().all(|f| f.get_metric().is_empty()));
    }
}
