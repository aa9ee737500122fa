//! FoodData Central response shapes and their conversion into new foods.

use serde::Deserialize;

use crate::models::NewFood;
use crate::nutrients::{Nutrient, NutrientVector};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub foods: Vec<FdcFood>,
}

/// A food from either the search or the details endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdcFood {
    pub fdc_id: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub food_nutrients: Vec<FdcNutrient>,
    #[serde(default)]
    pub food_portions: Vec<FdcPortion>,
    pub serving_size: Option<f64>,
    pub serving_size_unit: Option<String>,
    pub household_serving_full_text: Option<String>,
}

/// Search results carry the number and value inline; the details endpoint
/// nests them under `nutrient` and calls the value `amount`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdcNutrient {
    pub nutrient_number: Option<String>,
    pub value: Option<f64>,
    pub nutrient: Option<FdcNutrientRef>,
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FdcNutrientRef {
    pub number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdcPortion {
    pub gram_weight: Option<f64>,
    pub portion_description: Option<String>,
    pub modifier: Option<String>,
    pub amount: Option<f64>,
}

/// Suggested serving unit for a catalog food.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedUnit {
    pub name: String,
    pub gram_weight: f64,
}

#[derive(Debug, Clone)]
pub struct CatalogFood {
    pub food: NewFood,
    pub default_unit: Option<SuggestedUnit>,
}

/// FDC nutrient number for each tracked nutrient.
#[must_use]
pub fn fdc_number(nutrient: Nutrient) -> &'static str {
    match nutrient {
        Nutrient::Calories => "208",
        Nutrient::Protein => "203",
        Nutrient::Fat => "204",
        Nutrient::Carbs => "205",
        Nutrient::Sugar => "269",
        Nutrient::Fiber => "291",
        Nutrient::Cholesterol => "601",
        Nutrient::Calcium => "301",
        Nutrient::Iron => "303",
        Nutrient::Magnesium => "304",
        Nutrient::Potassium => "306",
        Nutrient::Sodium => "307",
        Nutrient::Zinc => "309",
        Nutrient::VitaminA => "320",
        Nutrient::VitaminB6 => "415",
        Nutrient::VitaminB12 => "418",
        Nutrient::VitaminC => "401",
        Nutrient::VitaminD => "328",
        Nutrient::VitaminE => "323",
    }
}

impl FdcNutrient {
    fn number(&self) -> Option<&str> {
        self.nutrient_number
            .as_deref()
            .or_else(|| self.nutrient.as_ref()?.number.as_deref())
    }

    fn amount(&self) -> Option<f64> {
        self.value.or(self.amount).filter(|v| v.is_finite() && *v >= 0.0)
    }
}

fn nutrients_per_100g(list: &[FdcNutrient]) -> NutrientVector {
    NutrientVector::from_fn(|n| {
        let number = fdc_number(n);
        list.iter()
            .find(|entry| entry.number() == Some(number))
            .and_then(FdcNutrient::amount)
    })
}

fn suggested_unit(food: &FdcFood) -> Option<SuggestedUnit> {
    let portion = food
        .food_portions
        .iter()
        .find(|p| p.gram_weight.is_some_and(|g| g > 0.0));
    if let Some(p) = portion {
        let name = p
            .portion_description
            .clone()
            .or_else(|| {
                p.modifier.as_ref().map(|m| match p.amount {
                    Some(a) if (a - 1.0).abs() > f64::EPSILON => format!("{a} {m}"),
                    _ => m.clone(),
                })
            })
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "serving".to_string());
        return Some(SuggestedUnit {
            name,
            gram_weight: p.gram_weight?,
        });
    }

    let size = food.serving_size.filter(|s| *s > 0.0)?;
    let unit = food.serving_size_unit.as_deref().unwrap_or("g").to_lowercase();
    if !matches!(unit.as_str(), "g" | "grm" | "ml" | "mlt") {
        return None;
    }
    let name = food
        .household_serving_full_text
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "serving".to_string());
    Some(SuggestedUnit {
        name,
        gram_weight: size,
    })
}

/// Convert an FDC food. Foods without a name or an energy value are skipped.
#[must_use]
pub fn fdc_to_food(food: FdcFood) -> Option<CatalogFood> {
    let name = food
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())?
        .to_string();
    let nutrients = nutrients_per_100g(&food.food_nutrients);
    nutrients.calories?;

    let default_unit = suggested_unit(&food);
    Some(CatalogFood {
        food: NewFood {
            name,
            fdc_id: Some(food.fdc_id),
            owner_id: None,
            nutrients,
        },
        default_unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_JSON: &str = r#"{
        "foods": [
            {
                "fdcId": 171688,
                "description": "Apples, raw, with skin",
                "foodNutrients": [
                    {"nutrientId": 1008, "nutrientNumber": "208", "unitName": "KCAL", "value": 52.0},
                    {"nutrientId": 1062, "nutrientNumber": "268", "unitName": "kJ", "value": 218.0},
                    {"nutrientId": 1003, "nutrientNumber": "203", "unitName": "G", "value": 0.26},
                    {"nutrientId": 1162, "nutrientNumber": "401", "unitName": "MG", "value": 4.6}
                ],
                "servingSize": 182.0,
                "servingSizeUnit": "g",
                "householdServingFullText": "1 medium"
            },
            {
                "fdcId": 1,
                "description": "Mystery item",
                "foodNutrients": []
            }
        ]
    }"#;

    const DETAIL_JSON: &str = r#"{
        "fdcId": 173944,
        "description": "Bananas, raw",
        "foodNutrients": [
            {"nutrient": {"id": 1008, "number": "208", "unitName": "kcal"}, "amount": 89.0},
            {"nutrient": {"id": 1092, "number": "306", "unitName": "mg"}, "amount": 358.0}
        ],
        "foodPortions": [
            {"gramWeight": 0.0, "modifier": "bogus"},
            {"gramWeight": 118.0, "modifier": "medium", "amount": 1.0}
        ]
    }"#;

    #[test]
    fn test_search_response_to_foods() {
        let resp: SearchResponse = serde_json::from_str(SEARCH_JSON).unwrap();
        let foods: Vec<CatalogFood> = resp.foods.into_iter().filter_map(fdc_to_food).collect();
        assert_eq!(foods.len(), 1);

        let apple = &foods[0];
        assert_eq!(apple.food.name, "Apples, raw, with skin");
        assert_eq!(apple.food.fdc_id, Some(171_688));
        assert_eq!(apple.food.nutrients.calories, Some(52.0));
        assert_eq!(apple.food.nutrients.protein, Some(0.26));
        assert_eq!(apple.food.nutrients.vitamin_c, Some(4.6));
        assert!(apple.food.nutrients.fat.is_none());
        assert_eq!(
            apple.default_unit,
            Some(SuggestedUnit {
                name: "1 medium".to_string(),
                gram_weight: 182.0,
            })
        );
    }

    #[test]
    fn test_detail_response_to_food() {
        let food: FdcFood = serde_json::from_str(DETAIL_JSON).unwrap();
        let banana = fdc_to_food(food).unwrap();
        assert_eq!(banana.food.nutrients.calories, Some(89.0));
        assert_eq!(banana.food.nutrients.potassium, Some(358.0));
        let unit = banana.default_unit.unwrap();
        assert_eq!(unit.name, "medium");
        assert!((unit.gram_weight - 118.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_description_is_skipped() {
        let food: FdcFood = serde_json::from_str(
            r#"{"fdcId": 5, "description": "  ", "foodNutrients": [{"nutrientNumber": "208", "value": 10.0}]}"#,
        )
        .unwrap();
        assert!(fdc_to_food(food).is_none());
    }

    #[test]
    fn test_fdc_numbers_are_unique() {
        let mut numbers: Vec<&str> = Nutrient::ALL.iter().map(|n| fdc_number(*n)).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), Nutrient::ALL.len());
    }
}
