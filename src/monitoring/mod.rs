/*!
 * Monitoring
 * Tracing setup for the arena and its workloads
 */

mod tracer;

pub use tracer::{init_tracing, span_phase, PhaseSpan};
