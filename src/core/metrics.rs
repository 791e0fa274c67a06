use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn attempt_started() {
    metrics::counter!("exam_attempts_started_total").increment(1);
}

pub(crate) fn attempt_finalized(mode: &'static str) {
    metrics::counter!("exam_attempts_finalized_total", "mode" => mode).increment(1);
}

pub(crate) fn attempt_voided() {
    metrics::counter!("exam_attempts_voided_total").increment(1);
}

pub(crate) fn exam_published() {
    metrics::counter!("exams_published_total").increment(1);
}

pub(crate) fn exam_finalized(trigger: &'static str) {
    metrics::counter!("exams_finalized_total", "trigger" => trigger).increment(1);
}

pub(crate) fn expired_attempts_closed(count: u64) {
    metrics::counter!("expired_attempts_closed_total").increment(count);
}
