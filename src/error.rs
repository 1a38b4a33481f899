use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `TsirError` and maps to other errors to
/// convert to a `TsirError`
///
/// Optimizer non-convergence and unstable analytic fits are not errors. They are
/// reported on the returned values (see `optimize::OptimizationResult::converged` and
/// `endemic::SusceptibilityReconstruction::success`).
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum TsirError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// The panel or calendar handed to a fit has the wrong shape: missing columns,
    /// an irregular time index, fractions outside [0, 1], or unfilled scenario values.
    InputShapeError(String),
    /// A design matrix or regression problem that cannot be solved.
    NumericDegeneracy(String),
    DateError(String),
    ReportError(String),
    TsirError(String),
}

impl From<io::Error> for TsirError {
    fn from(error: io::Error) -> Self {
        TsirError::IoError(error)
    }
}

impl From<serde_json::Error> for TsirError {
    fn from(error: serde_json::Error) -> Self {
        TsirError::JsonError(error)
    }
}

impl From<csv::Error> for TsirError {
    fn from(error: csv::Error) -> Self {
        TsirError::CSVError(error)
    }
}

impl From<String> for TsirError {
    fn from(error: String) -> Self {
        TsirError::TsirError(error)
    }
}

impl From<&str> for TsirError {
    fn from(error: &str) -> Self {
        TsirError::TsirError(error.to_string())
    }
}

impl std::error::Error for TsirError {}

impl Display for TsirError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TsirError::InputShapeError(msg) => write!(f, "Input shape error: {msg}")?,
            TsirError::NumericDegeneracy(msg) => write!(f, "Numeric degeneracy: {msg}")?,
            TsirError::DateError(msg) => write!(f, "Date error: {msg}")?,
            TsirError::ReportError(msg) => write!(f, "Report error: {msg}")?,
            _ => write!(f, "Error: {self:?}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = TsirError::InputShapeError("missing adjusted_births".to_string());
        assert_eq!(err.to_string(), "Input shape error: missing adjusted_births");

        let err: TsirError = "plain message".into();
        assert!(matches!(err, TsirError::TsirError(ref m) if m == "plain message"));
    }

    #[test]
    fn io_errors_convert() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: TsirError = io.into();
        assert!(matches!(err, TsirError::IoError(_)));
    }
}
