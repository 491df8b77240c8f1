use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Simulation with strategy {strategy} exceeded the time limit of {limit_seconds}s")]
    Timeout {
        strategy: String,
        limit_seconds: f64,
    },

    #[error("Simulation task cancelled: {0}")]
    Cancelled(String),
}

impl SimulationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SimulationError::InvalidConfiguration(message.into())
    }
}
