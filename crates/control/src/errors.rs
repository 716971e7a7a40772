//! SDK error categorisation
//!
//! Service errors carry a code (`NotFoundException`, `NoSuchEntity`,
//! `ConflictException`, ...). The code decides which [`ForgeError`] variant a
//! failed call turns into; transport failures are always remote failures.

use apigw_forge_common::ForgeError;
use aws_sdk_apigateway::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

/// Coarse category of a service error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    AlreadyExists,
    Other,
}

const NOT_FOUND_PATTERNS: &[&str] = &["NotFound*", "NoSuch*"];
const ALREADY_EXISTS_PATTERNS: &[&str] = &["*AlreadyExists*", "Conflict*"];

/// Categorize a service error code
///
/// Patterns support a leading and/or trailing `*` wildcard:
/// `NoSuch*` is a prefix match, `*AlreadyExists*` a contains match.
pub fn categorize_error_code(code: Option<&str>) -> ErrorCategory {
    match code {
        Some(c) if NOT_FOUND_PATTERNS.iter().any(|p| matches_pattern(c, p)) => {
            ErrorCategory::NotFound
        }
        Some(c) if ALREADY_EXISTS_PATTERNS.iter().any(|p| matches_pattern(c, p)) => {
            ErrorCategory::AlreadyExists
        }
        _ => ErrorCategory::Other,
    }
}

fn matches_pattern(code: &str, pattern: &str) -> bool {
    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');
    let inner = pattern.trim_matches('*');

    match (leading, trailing) {
        (true, true) => code.contains(inner),
        (true, false) => code.ends_with(inner),
        (false, true) => code.starts_with(inner),
        (false, false) => code == inner,
    }
}

/// Convert a failed SDK call into a [`ForgeError`] naming the operation and target
pub(crate) fn sdk_error<E, R>(operation: &str, target: &str, error: SdkError<E, R>) -> ForgeError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = error.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let message = DisplayErrorContext(&error).to_string();
    debug!(operation, target, code = ?code, "control-plane call failed");

    match categorize_error_code(code.as_deref()) {
        ErrorCategory::NotFound => ForgeError::not_found(operation, target),
        ErrorCategory::AlreadyExists => ForgeError::AlreadyExists {
            operation: operation.to_string(),
            target: target.to_string(),
            message,
        },
        ErrorCategory::Other => ForgeError::remote(operation, target, message),
    }
}
