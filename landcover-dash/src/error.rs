use thiserror::Error;

use crate::geometric::land_cover::ClassCode;
use crate::geometric::layer_registry::LayerKey;

/// Error taxonomy of the dashboard core.
///
/// `UnknownClass`, `UnregisteredLayer` and `DuplicateRegistration` are
/// structural errors: they are surfaced immediately and never retried.
/// `EmptyData`, `InvalidAggregate`, `SourceUnavailable` and `Parse` are data
/// errors: the controller recovers from them by putting the statistics store
/// into its unavailable state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashboardError {
    #[error("unknown land cover class {0}")]
    UnknownClass(ClassCode),

    #[error("layer {0} is not registered")]
    UnregisteredLayer(LayerKey),

    #[error("layer {0} is already registered")]
    DuplicateRegistration(LayerKey),

    #[error("group result is empty or has zero total area")]
    EmptyData,

    #[error("invalid area sum {sum} for class {code}")]
    InvalidAggregate { code: ClassCode, sum: f64 },

    #[error("statistics source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed statistics payload: {0}")]
    Parse(String),

    /// A map callback re-entered the session while it was being updated
    #[error("dashboard is busy applying another update")]
    Busy,
}

impl DashboardError {
    /// Data errors are recovered locally into the "stats unavailable" state.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            DashboardError::EmptyData
                | DashboardError::InvalidAggregate { .. }
                | DashboardError::SourceUnavailable(_)
                | DashboardError::Parse(_)
        )
    }
}

pub type DashResult<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_classification() {
        assert!(DashboardError::EmptyData.is_data_error());
        assert!(DashboardError::SourceUnavailable("offline".into()).is_data_error());
        assert!(!DashboardError::UnknownClass(ClassCode(999)).is_data_error());
        assert!(!DashboardError::DuplicateRegistration(LayerKey::Full).is_data_error());
        assert!(!DashboardError::Busy.is_data_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DashboardError::UnknownClass(ClassCode(999)).to_string(),
            "unknown land cover class 999"
        );
        assert_eq!(
            DashboardError::DuplicateRegistration(LayerKey::Class(ClassCode(10))).to_string(),
            "layer class:10 is already registered"
        );
    }
}
