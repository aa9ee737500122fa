//! Structural errors raised by the nutrient engine.
//!
//! These block the write that triggered them. Statistical degeneracies
//! (empty composites, short series, missing prior bodyweight) are not errors
//! and are reported as `None` or zero results instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A serving was scaled to a non-positive (or non-finite) gram amount.
    #[error("Serving must be a positive number of grams (got {grams})")]
    InvalidServing { grams: f64 },

    /// Adding the ingredient edge would make a food contain itself.
    #[error(
        "Adding food {ingredient_id} to food {composite_id} would create an ingredient cycle"
    )]
    CycleDetected {
        composite_id: i64,
        ingredient_id: i64,
    },

    /// A meal entry is neither a complete food-linked entry nor a manual one.
    #[error("Invalid meal entry: {reason}")]
    MissingVariant { reason: &'static str },
}

impl CoreError {
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, CoreError::CycleDetected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = CoreError::InvalidServing { grams: -5.0 };
        assert_eq!(
            e.to_string(),
            "Serving must be a positive number of grams (got -5)"
        );

        let e = CoreError::CycleDetected {
            composite_id: 1,
            ingredient_id: 2,
        };
        assert!(e.is_cycle());
        assert!(e.to_string().contains("cycle"));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = CoreError::MissingVariant {
            reason: "food-linked entry needs an amount and a unit",
        }
        .into();
        let core = err.downcast_ref::<CoreError>().unwrap();
        assert!(matches!(core, CoreError::MissingVariant { .. }));
    }
}
