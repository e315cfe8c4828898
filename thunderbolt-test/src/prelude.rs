//! Common imports for tests.

pub use color_eyre::eyre::{bail, ensure, eyre, Report, Result};
pub use pretty_assertions::{assert_eq, assert_ne};
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};
