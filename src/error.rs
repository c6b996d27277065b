use thiserror::Error;

/// Failures surfaced by the client core.
///
/// Every public operation resolves to one of these and the host shell turns
/// them into inline text. No variant triggers an automatic retry; every retry
/// is a user pressing a button.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} is required")]
    Validation(&'static str),

    #[error("{0} is taking too long, check your connection and try again")]
    Timeout(&'static str),

    #[error("{0}")]
    RemoteRejected(String),

    #[error("you're offline, check your internet connection and try again")]
    NetworkUnreachable,

    #[error("location access denied, please enable location services")]
    PermissionDenied,

    #[error("failed to get your current location, please try again")]
    Unavailable,
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::RemoteRejected(err.to_string())
    }
}
