//! Typed errors for persistence and registry lookups.
//!
//! Accidents are deliberately absent here: they are an in-game outcome
//! carried by [`Accident`](super::accident::Accident), not a failure.

use thiserror::Error;

use super::types::TrainId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("saved state is missing required key `{0}`")]
    MissingKey(String),

    #[error("saved state has invalid value `{value}` for key `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("train control type `{0}` not found")]
    UnknownControl(String),

    #[error("script type `{0}` not found")]
    UnknownScript(String),

    #[error("{0} not found")]
    TrainNotFound(TrainId),
}

/// Shorthand result type for the simulation core.
pub type SimResult<T> = Result<T, SimError>;

/// Reads a required key from a saved map.
pub(crate) fn required<'a>(map: &'a super::types::SaveMap, key: &str) -> SimResult<&'a str> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| SimError::MissingKey(key.to_string()))
}

/// Parses an optional key, falling back to `default` when absent.
pub(crate) fn parse_or<T: std::str::FromStr>(
    map: &super::types::SaveMap,
    key: &str,
    default: T,
) -> SimResult<T> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| SimError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        }),
    }
}
