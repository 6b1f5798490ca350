use address_controller_core::k8s::{Address, Phase};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    addresses: Gauge,
    phases: Family<PhaseLabels, Gauge>,
    ready: Family<ReadyLabels, Gauge>,
    forwarders: Family<ReadyLabels, Gauge>,
    loop_duration: Histogram,
    stale_writes: Counter,
    collected: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PhaseLabels {
    phase: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReadyLabels {
    ready: &'static str,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let addresses = Gauge::default();
        reg.register(
            "addresses",
            "Number of addresses in the address space",
            addresses.clone(),
        );

        let phases = Family::<PhaseLabels, Gauge>::default();
        reg.register(
            "addresses_by_phase",
            "Number of addresses in each phase",
            phases.clone(),
        );

        let ready = Family::<ReadyLabels, Gauge>::default();
        reg.register(
            "addresses_ready",
            "Number of addresses by readiness",
            ready.clone(),
        );

        let forwarders = Family::<ReadyLabels, Gauge>::default();
        reg.register(
            "forwarders",
            "Number of address forwarders by readiness",
            forwarders.clone(),
        );

        let loop_duration = Histogram::new([0.01, 0.1, 0.5, 1.0, 5.0, 30.0]);
        reg.register_with_unit(
            "loop_duration",
            "Time spent reconciling one batch of addresses",
            Unit::Seconds,
            loop_duration.clone(),
        );

        let stale_writes = Counter::default();
        reg.register(
            "stale_writes",
            "Count of status writes skipped because the address was modified concurrently",
            stale_writes.clone(),
        );

        let collected = Counter::default();
        reg.register(
            "garbage_collected",
            "Count of terminating addresses deleted",
            collected.clone(),
        );

        Self {
            addresses,
            phases,
            ready,
            forwarders,
            loop_duration,
            stale_writes,
            collected,
        }
    }

    /// Records the state of a reconciled batch. Readiness is only recorded
    /// when routers reported, since it is meaningless otherwise.
    pub(crate) fn record(&self, batch: &[Address], routers_reported: bool) {
        self.addresses.set(batch.len() as i64);
        for phase in Phase::ALL {
            let count = batch.iter().filter(|a| a.phase() == phase).count();
            self.phases
                .get_or_create(&PhaseLabels {
                    phase: phase.as_str(),
                })
                .set(count as i64);
        }

        if !routers_reported {
            return;
        }
        let ready = batch.iter().filter(|a| a.is_ready()).count();
        self.set_ready(&self.ready, ready, batch.len() - ready);

        let (ready, not_ready) = batch
            .iter()
            .filter_map(|a| a.status())
            .flat_map(|s| s.forwarders.iter())
            .fold((0, 0), |(ready, not_ready), f| {
                if f.ready {
                    (ready + 1, not_ready)
                } else {
                    (ready, not_ready + 1)
                }
            });
        self.set_ready(&self.forwarders, ready, not_ready);
    }

    pub(crate) fn observe_duration(&self, elapsed: time::Duration) {
        self.loop_duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn stale_writes(&self, count: usize) {
        self.stale_writes.inc_by(count as u64);
    }

    pub(crate) fn garbage_collected(&self, count: usize) {
        self.collected.inc_by(count as u64);
    }

    fn set_ready(&self, family: &Family<ReadyLabels, Gauge>, ready: usize, not_ready: usize) {
        family
            .get_or_create(&ReadyLabels { ready: "true" })
            .set(ready as i64);
        family
            .get_or_create(&ReadyLabels { ready: "false" })
            .set(not_ready as i64);
    }
}
