/// Top-level errors. Any of these ends the run with a non-zero exit code.
use crate::config::ConfigError;
use crate::filter::InvalidDate;
use crate::pipeline::FollowError;
use crate::plot::PlotError;
use crate::source::SourceError;

#[derive(Debug)]
pub enum AppError {
    /// `--fromdate` / `--todate` is not `YYYY-MM-DD`.
    InvalidDateFilter(InvalidDate),
    /// The log file is missing or cannot be opened or read.
    SourceUnavailable(SourceError),
    /// `--follow` was combined with standard input.
    FollowStdin,
    Config(ConfigError),
    Follow(FollowError),
    Plot(PlotError),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidDateFilter(e) => write!(f, "{e}"),
            AppError::SourceUnavailable(e) => write!(f, "{e}"),
            AppError::FollowStdin => write!(f, "cannot use --follow with stdin input"),
            AppError::Config(e) => write!(f, "{e}"),
            AppError::Follow(e) => write!(f, "{e}"),
            AppError::Plot(e) => write!(f, "{e}"),
            AppError::Json(e) => write!(f, "failed to write JSON report: {e}"),
            AppError::Io(e) => write!(f, "failed to write report: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::InvalidDateFilter(e) => Some(e),
            AppError::SourceUnavailable(e) => Some(e),
            AppError::FollowStdin => None,
            AppError::Config(e) => Some(e),
            AppError::Follow(e) => Some(e),
            AppError::Plot(e) => Some(e),
            AppError::Json(e) => Some(e),
            AppError::Io(e) => Some(e),
        }
    }
}

impl From<InvalidDate> for AppError {
    fn from(e: InvalidDate) -> Self {
        AppError::InvalidDateFilter(e)
    }
}

impl From<SourceError> for AppError {
    fn from(e: SourceError) -> Self {
        AppError::SourceUnavailable(e)
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<FollowError> for AppError {
    fn from(e: FollowError) -> Self {
        AppError::Follow(e)
    }
}

impl From<PlotError> for AppError {
    fn from(e: PlotError) -> Self {
        AppError::Plot(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e)
    }
}
