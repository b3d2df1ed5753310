//! Campaign execution: the sequencer that dials a contact list one call at a
//! time, and the status-reporting seam it drives.

mod sequencer;

pub use sequencer::{NullReporter, PacingConfig, Sequencer, StatusReporter, TraceReporter};
