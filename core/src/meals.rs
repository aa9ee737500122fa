use serde::Serialize;

use crate::error::CoreError;
use crate::nutrients::NutrientVector;

/// A consumption entry ready for aggregation.
#[derive(Debug, Clone, Copy)]
pub enum ConsumptionItem {
    /// A serving of a food: `amount` of a unit weighing `gram_weight` grams.
    FoodLinked {
        per_100g: NutrientVector,
        amount: f64,
        gram_weight: f64,
    },
    /// Literal amounts, already the whole serving.
    Manual { nutrients: NutrientVector },
}

impl ConsumptionItem {
    #[must_use]
    pub fn grams(&self) -> Option<f64> {
        match self {
            ConsumptionItem::FoodLinked {
                amount,
                gram_weight,
                ..
            } => Some(amount * gram_weight),
            ConsumptionItem::Manual { .. } => None,
        }
    }

    /// A stored serving that weighs nothing, such as a composite whose last
    /// ingredient was removed, contributes zero.
    pub fn contribution(&self) -> Result<NutrientVector, CoreError> {
        match self {
            ConsumptionItem::FoodLinked {
                per_100g,
                amount,
                gram_weight,
            } => {
                let grams = amount * gram_weight;
                if grams.abs() < f64::EPSILON {
                    Ok(NutrientVector::zero())
                } else {
                    per_100g.scale_to_grams(grams)
                }
            }
            ConsumptionItem::Manual { nutrients } => Ok(NutrientVector::zero() + *nutrients),
        }
    }
}

pub fn meal_total(items: &[ConsumptionItem]) -> Result<NutrientVector, CoreError> {
    items.iter().map(ConsumptionItem::contribution).sum()
}

pub fn day_total(meal_totals: impl IntoIterator<Item = NutrientVector>) -> NutrientVector {
    meal_totals.into_iter().sum()
}

/// A validated entry, one variant only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewConsumption {
    FoodLinked {
        food_id: i64,
        amount: f64,
        unit_id: i64,
    },
    Manual {
        description: String,
        nutrients: NutrientVector,
    },
}

/// Raw entry fields as a user filled them in.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionDraft {
    pub food_id: Option<i64>,
    pub amount: Option<f64>,
    pub unit_id: Option<i64>,
    pub description: Option<String>,
    pub nutrients: NutrientVector,
}

impl ConsumptionDraft {
    /// Resolve the draft to exactly one variant.
    ///
    /// Returns `Ok(None)` for a draft with nothing filled in, which callers
    /// drop without error.
    pub fn validate(self) -> Result<Option<NewConsumption>, CoreError> {
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        if let Some(food_id) = self.food_id {
            if description.is_some() {
                return Err(CoreError::MissingVariant {
                    reason: "an entry is either a food or a manual description, not both",
                });
            }
            let (Some(amount), Some(unit_id)) = (self.amount, self.unit_id) else {
                return Err(CoreError::MissingVariant {
                    reason: "a food entry needs both an amount and a unit",
                });
            };
            return Ok(Some(NewConsumption::FoodLinked {
                food_id,
                amount,
                unit_id,
            }));
        }

        if self.amount.is_some() || self.unit_id.is_some() {
            return Err(CoreError::MissingVariant {
                reason: "an amount or unit was given without a food",
            });
        }

        match description {
            Some(description) => Ok(Some(NewConsumption::Manual {
                description,
                nutrients: self.nutrients,
            })),
            None if !self.nutrients.is_empty() => Err(CoreError::MissingVariant {
                reason: "a manual entry needs a description",
            }),
            None => Ok(None),
        }
    }
}
