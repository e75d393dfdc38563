//! Bruecke zwischen Relay-Ereignissen und Prometheus-Metriken

use pulse_observability::PulseMetrics;
use pulse_relay::RelayMetrics;

/// Bildet die Relay-Ereignisse auf die `pulse_*`-Metriken ab
#[derive(Clone)]
pub struct PrometheusRelayMetrics(PulseMetrics);

impl PrometheusRelayMetrics {
    pub fn neu(metriken: PulseMetrics) -> Self {
        Self(metriken)
    }
}

impl RelayMetrics for PrometheusRelayMetrics {
    fn zugelassen(&self) {
        self.0.admissions_total.inc();
    }

    fn verdraengt(&self) {
        self.0.evictions_total.inc();
    }

    fn verbundene_clients(&self, anzahl: usize) {
        self.0.connected_clients.set(anzahl as i64);
    }

    fn presence_verteilt(&self, empfaenger: usize) {
        self.0.presence_broadcasts_total.inc_by(empfaenger as u64);
    }

    fn frame_weitergeleitet(&self, typ: &'static str) {
        self.0.frames_relayed_total.with_label_values(&[typ]).inc();
    }

    fn auth_fehlgeschlagen(&self) {
        self.0.auth_failures_total.inc();
    }
}
