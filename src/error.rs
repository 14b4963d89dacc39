//! Engine Error Taxonomy
//!
//! Every failure the engine can surface to a caller. Construction-time
//! problems are rejected before any device allocation; device-side contract
//! breaches are detected during kernel result readback and surfaced from
//! `run`. A full tree arena is deliberately *not* an error: the affected
//! tree freezes and the condition is reported in the search diagnostics.

/// Represents an error that occurred while building or running the engine
#[derive(Debug)]
pub enum EngineError {
    /// Invalid construction parameters (board shape, playout count, budgets...)
    Configuration(String),
    /// Device memory budget cannot host even one node per tree
    ResourceExhaustion(String),
    /// The game mechanics adapter produced an illegal action or malformed state
    MechanicsContractViolation(String),
    /// No suitable GPU adapter was found
    NoAdapter(String),
    /// Failed to request a GPU device
    DeviceRequest(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
            EngineError::ResourceExhaustion(msg) => {
                write!(f, "Device memory budget exhausted: {}", msg)
            }
            EngineError::MechanicsContractViolation(msg) => {
                write!(f, "Game mechanics contract violated: {}", msg)
            }
            EngineError::NoAdapter(msg) => write!(f, "No suitable GPU adapter found: {}", msg),
            EngineError::DeviceRequest(msg) => write!(f, "Failed to request GPU device: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
