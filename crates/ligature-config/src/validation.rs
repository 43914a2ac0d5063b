//! Engine configuration validation.
//!
//! Every field is checked independently; [`collect`] folds the individual
//! failures into one [`ValidationError`].

use thiserror::Error;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Value outside its allowed range.
    #[error("{field} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path (`section.key`).
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Block sizes must be powers of two.
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Dotted field path (`section.key`).
        field: &'static str,
        /// The rejected value.
        value: u32,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Checks `min <= value <= max`.
pub fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> ValidationResult<()>
where
    T: PartialOrd + Into<f64> + Copy,
{
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

/// Checks that `value` is a non-zero power of two.
pub fn check_power_of_two(field: &'static str, value: u32) -> ValidationResult<()> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::NotPowerOfTwo { field, value })
    }
}

/// Folds individual check results: no failures is `Ok`, one failure is
/// returned as is, several become [`ValidationError::Multiple`].
pub fn collect(results: impl IntoIterator<Item = ValidationResult<()>>) -> ValidationResult<()> {
    let mut errors: Vec<ValidationError> = results.into_iter().filter_map(Result::err).collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
