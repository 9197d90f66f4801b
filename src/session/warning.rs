use std::fmt;

use tracing::level_filters::LevelFilter;

/// Non-fatal conditions recorded by a session.
///
/// Each one is also emitted as a `warn!` event unless silenced by config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A construction surface was used in a way that will stop being
    /// accepted (e.g. building a session without a config).
    DeprecatedConstruction(String),
    /// The effective log level was coarser than the floor and was raised.
    LoggingFloorRaised { from: LevelFilter, to: LevelFilter },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DeprecatedConstruction(msg) => write!(f, "deprecated: {msg}"),
            Warning::LoggingFloorRaised { from, to } => {
                write!(f, "log level raised from {from} to {to}")
            }
        }
    }
}
