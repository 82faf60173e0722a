use thiserror::Error;

#[derive(Error, Debug)]
pub enum PKError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid dosing configuration: {0}")]
    InvalidDosing(String),

    #[error("Parameter validation error: {0}")]
    Validation(String),

    #[error("Cubic equation yielded {found} real roots, three required")]
    CubicRoots { found: usize },

    #[error("Root bracket [{lower}, {upper}] does not straddle a sign change")]
    Bracket { lower: f64, upper: f64 },

    #[error("Integration step size collapsed to {step:.3e} at t = {time:.4} min")]
    StepSizeCollapse { time: f64, step: f64 },

    #[error("Integration exceeded {max_steps} steps at t = {time:.4} min")]
    StepBudgetExhausted { time: f64, max_steps: usize },

    #[error("ke0 derivation failed: no strategy produced a finite positive value")]
    Ke0Unavailable,
}

pub type PKResult<T> = Result<T, PKError>;
