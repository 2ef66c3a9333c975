use chrono::NaiveDate;
use thiserror::Error;

/// Typed failures raised by the panel builder and the estimators.
///
/// Every variant is returned straight to the caller of the estimator that
/// detected it; nothing downstream substitutes defaults or retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Malformed or duplicate input rows.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Too few observations for the model's degrees of freedom.
    #[error("insufficient data for {model}: n={n} observations, {params} parameters (need n > {params})")]
    InsufficientData {
        model: &'static str,
        n: usize,
        params: usize,
    },

    /// Collinear or rank-deficient regression design.
    #[error("singular design for {model}: rank {rank} < {params} columns ({detail})")]
    SingularDesign {
        model: &'static str,
        rank: usize,
        params: usize,
        detail: String,
    },

    /// The placebo exclusion buffer left too few candidate cutoffs.
    #[error("insufficient eligible placebo dates: {eligible} eligible, need at least {required}")]
    InsufficientEligibleDates { eligible: usize, required: usize },

    /// A DID group has no observations on one side of the cutoff.
    #[error("unbalanced DID cutoff {cutoff}: {group} group has {pre} pre and {post} post observations")]
    UnbalancedCutoff {
        group: &'static str,
        cutoff: NaiveDate,
        pre: usize,
        post: usize,
    },

    /// A configuration value outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// Process exit code used when this error aborts the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::InvalidConfig(_) => 2,
            AnalysisError::DataIntegrity(_)
            | AnalysisError::InsufficientData { .. }
            | AnalysisError::InsufficientEligibleDates { .. }
            | AnalysisError::UnbalancedCutoff { .. } => 3,
            AnalysisError::SingularDesign { .. } => 4,
        }
    }
}

/// Binary-level error: an exit code plus a printable message.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
