/*!
 * Structured Tracing
 * Subscriber setup and timed spans for arena workloads
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Phases slower than this are logged at warn level
const SLOW_PHASE_MS: u128 = 100;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - MEMPOOL_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("MEMPOOL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Timed span around one phase of a workload
pub struct PhaseSpan {
    span: tracing::Span,
    start: Instant,
    phase: &'static str,
}

impl PhaseSpan {
    pub fn new(phase: &'static str) -> Self {
        let span = span!(
            Level::INFO,
            "phase",
            phase,
            duration_us = tracing::field::Empty,
            blocks = tracing::field::Empty,
        );
        debug!(phase, "phase started");
        Self {
            span,
            start: Instant::now(),
            phase,
        }
    }

    /// Record how many blocks the phase touched
    pub fn record_blocks(&self, blocks: usize) {
        self.span.record("blocks", blocks);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PhaseSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();
        if duration.as_millis() > SLOW_PHASE_MS {
            warn!(
                phase = self.phase,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow phase"
            );
        } else {
            debug!(
                phase = self.phase,
                duration_us = duration.as_micros() as u64,
                "phase completed"
            );
        }
    }
}

/// Create a phase span
#[inline]
pub fn span_phase(phase: &'static str) -> PhaseSpan {
    PhaseSpan::new(phase)
}
