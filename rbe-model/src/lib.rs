//! Data model for reassigned bandwidth-enhanced partials
//!
//! Breakpoints, partials and envelopes shared by analysis, processing,
//! synthesis and file I/O.

mod breakpoint;
mod envelope;
mod error;
mod marker;
mod partial;
pub mod utils;

pub use breakpoint::{wrap_phase, Breakpoint};
pub use envelope::{BreakpointEnvelope, Envelope, LinearEnvelope};
pub use error::ModelError;
pub use marker::{sort_markers_by_name, sort_markers_by_time, Marker};
pub use partial::{Partial, PartialList};
