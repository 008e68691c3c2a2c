//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a one-line message with a stable category prefix.
pub fn map_error(e: &ApiError) -> String {
    let category = match e {
        ApiError::InvalidRequest(_) => "invalid request",
        ApiError::NotFound(_) => "not found",
        ApiError::Refused(_) => "refused",
        ApiError::ConfigError(_) | ApiError::ProviderNotConfigured(_) => "configuration",
        ApiError::StorageError(_) => "storage",
        ApiError::GenerationFailed(_) => "generation",
        ApiError::Protocol(_) => "protocol",
        _ => "provider",
    };
    format!("error ({}): {}", category, e)
}

/// Exit code for a failed command.
pub fn exit_code(e: &ApiError) -> i32 {
    match e {
        ApiError::InvalidRequest(_) | ApiError::Refused(_) => 2,
        ApiError::ConfigError(_) | ApiError::ProviderNotConfigured(_) => 3,
        ApiError::NotFound(_) => 4,
        _ => 1,
    }
}
