use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Calories,
    Protein,
    Fat,
    Carbs,
    Sugar,
    Fiber,
    Cholesterol,
    Calcium,
    Iron,
    Magnesium,
    Potassium,
    Sodium,
    Zinc,
    VitaminA,
    VitaminB6,
    VitaminB12,
    VitaminC,
    VitaminD,
    VitaminE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientGroup {
    Macro,
    Mineral,
    Vitamin,
}

impl Nutrient {
    /// Schema order. Database columns and serialized vectors follow it.
    pub const ALL: [Nutrient; 19] = [
        Nutrient::Calories,
        Nutrient::Protein,
        Nutrient::Fat,
        Nutrient::Carbs,
        Nutrient::Sugar,
        Nutrient::Fiber,
        Nutrient::Cholesterol,
        Nutrient::Calcium,
        Nutrient::Iron,
        Nutrient::Magnesium,
        Nutrient::Potassium,
        Nutrient::Sodium,
        Nutrient::Zinc,
        Nutrient::VitaminA,
        Nutrient::VitaminB6,
        Nutrient::VitaminB12,
        Nutrient::VitaminC,
        Nutrient::VitaminD,
        Nutrient::VitaminE,
    ];

    /// Storage key, also the database column name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::Protein => "protein",
            Nutrient::Fat => "fat",
            Nutrient::Carbs => "carbs",
            Nutrient::Sugar => "sugar",
            Nutrient::Fiber => "fiber",
            Nutrient::Cholesterol => "cholesterol",
            Nutrient::Calcium => "calcium",
            Nutrient::Iron => "iron",
            Nutrient::Magnesium => "magnesium",
            Nutrient::Potassium => "potassium",
            Nutrient::Sodium => "sodium",
            Nutrient::Zinc => "zinc",
            Nutrient::VitaminA => "vitamin_a",
            Nutrient::VitaminB6 => "vitamin_b6",
            Nutrient::VitaminB12 => "vitamin_b12",
            Nutrient::VitaminC => "vitamin_c",
            Nutrient::VitaminD => "vitamin_d",
            Nutrient::VitaminE => "vitamin_e",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Nutrient::Calories => "Energy",
            Nutrient::Protein => "Protein",
            Nutrient::Fat => "Total lipid (fat)",
            Nutrient::Carbs => "Carbohydrate, by difference",
            Nutrient::Sugar => "Sugars, total",
            Nutrient::Fiber => "Fiber, total dietary",
            Nutrient::Cholesterol => "Cholesterol",
            Nutrient::Calcium => "Calcium, Ca",
            Nutrient::Iron => "Iron, Fe",
            Nutrient::Magnesium => "Magnesium, Mg",
            Nutrient::Potassium => "Potassium, K",
            Nutrient::Sodium => "Sodium, Na",
            Nutrient::Zinc => "Zinc, Zn",
            Nutrient::VitaminA => "Vitamin A, RAE",
            Nutrient::VitaminB6 => "Vitamin B-6",
            Nutrient::VitaminB12 => "Vitamin B-12",
            Nutrient::VitaminC => "Vitamin C, total ascorbic acid",
            Nutrient::VitaminD => "Vitamin D (D2 + D3)",
            Nutrient::VitaminE => "Vitamin E (alpha-tocopherol)",
        }
    }

    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Nutrient::Calories => "kcal",
            Nutrient::Protein
            | Nutrient::Fat
            | Nutrient::Carbs
            | Nutrient::Sugar
            | Nutrient::Fiber => "g",
            Nutrient::VitaminA | Nutrient::VitaminB12 | Nutrient::VitaminD => "µg",
            _ => "mg",
        }
    }

    #[must_use]
    pub const fn group(self) -> NutrientGroup {
        match self {
            Nutrient::Calories
            | Nutrient::Protein
            | Nutrient::Fat
            | Nutrient::Carbs
            | Nutrient::Sugar
            | Nutrient::Fiber
            | Nutrient::Cholesterol => NutrientGroup::Macro,
            Nutrient::Calcium
            | Nutrient::Iron
            | Nutrient::Magnesium
            | Nutrient::Potassium
            | Nutrient::Sodium
            | Nutrient::Zinc => NutrientGroup::Mineral,
            _ => NutrientGroup::Vitamin,
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.key() == key)
    }
}

/// Fixed-schema nutrient record.
///
/// Attached to a food it means "amount per 100 g"; attached to a manual meal
/// entry it is the absolute amount eaten. A `None` field is unknown and counts
/// as zero in every aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutrientVector {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub sugar: Option<f64>,
    pub fiber: Option<f64>,
    pub cholesterol: Option<f64>,
    pub calcium: Option<f64>,
    pub iron: Option<f64>,
    pub magnesium: Option<f64>,
    pub potassium: Option<f64>,
    pub sodium: Option<f64>,
    pub zinc: Option<f64>,
    pub vitamin_a: Option<f64>,
    pub vitamin_b6: Option<f64>,
    pub vitamin_b12: Option<f64>,
    pub vitamin_c: Option<f64>,
    pub vitamin_d: Option<f64>,
    pub vitamin_e: Option<f64>,
}

impl NutrientVector {
    /// Every field present and zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_fn(|_| Some(0.0))
    }

    pub fn from_fn(mut f: impl FnMut(Nutrient) -> Option<f64>) -> Self {
        let mut v = Self::default();
        for n in Nutrient::ALL {
            *v.slot_mut(n) = f(n);
        }
        v
    }

    #[must_use]
    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        match nutrient {
            Nutrient::Calories => self.calories,
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::Carbs => self.carbs,
            Nutrient::Sugar => self.sugar,
            Nutrient::Fiber => self.fiber,
            Nutrient::Cholesterol => self.cholesterol,
            Nutrient::Calcium => self.calcium,
            Nutrient::Iron => self.iron,
            Nutrient::Magnesium => self.magnesium,
            Nutrient::Potassium => self.potassium,
            Nutrient::Sodium => self.sodium,
            Nutrient::Zinc => self.zinc,
            Nutrient::VitaminA => self.vitamin_a,
            Nutrient::VitaminB6 => self.vitamin_b6,
            Nutrient::VitaminB12 => self.vitamin_b12,
            Nutrient::VitaminC => self.vitamin_c,
            Nutrient::VitaminD => self.vitamin_d,
            Nutrient::VitaminE => self.vitamin_e,
        }
    }

    fn slot_mut(&mut self, nutrient: Nutrient) -> &mut Option<f64> {
        match nutrient {
            Nutrient::Calories => &mut self.calories,
            Nutrient::Protein => &mut self.protein,
            Nutrient::Fat => &mut self.fat,
            Nutrient::Carbs => &mut self.carbs,
            Nutrient::Sugar => &mut self.sugar,
            Nutrient::Fiber => &mut self.fiber,
            Nutrient::Cholesterol => &mut self.cholesterol,
            Nutrient::Calcium => &mut self.calcium,
            Nutrient::Iron => &mut self.iron,
            Nutrient::Magnesium => &mut self.magnesium,
            Nutrient::Potassium => &mut self.potassium,
            Nutrient::Sodium => &mut self.sodium,
            Nutrient::Zinc => &mut self.zinc,
            Nutrient::VitaminA => &mut self.vitamin_a,
            Nutrient::VitaminB6 => &mut self.vitamin_b6,
            Nutrient::VitaminB12 => &mut self.vitamin_b12,
            Nutrient::VitaminC => &mut self.vitamin_c,
            Nutrient::VitaminD => &mut self.vitamin_d,
            Nutrient::VitaminE => &mut self.vitamin_e,
        }
    }

    pub fn set(&mut self, nutrient: Nutrient, value: Option<f64>) {
        *self.slot_mut(nutrient) = value;
    }

    #[must_use]
    pub fn with(mut self, nutrient: Nutrient, value: f64) -> Self {
        self.set(nutrient, Some(value));
        self
    }

    /// Value with missing treated as zero.
    #[must_use]
    pub fn amount(&self, nutrient: Nutrient) -> f64 {
        self.get(nutrient).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Nutrient, Option<f64>)> + '_ {
        Nutrient::ALL.into_iter().map(|n| (n, self.get(n)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }

    /// Multiply every field by `factor`. The result has no missing fields.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_fn(|n| Some(self.amount(n) * factor))
    }

    /// Scale a per-100 g profile to an absolute serving of `grams`.
    pub fn scale_to_grams(&self, grams: f64) -> Result<Self, CoreError> {
        if !grams.is_finite() || grams <= 0.0 {
            return Err(CoreError::InvalidServing { grams });
        }
        Ok(Self::from_fn(|n| Some(self.amount(n) / 100.0 * grams)))
    }

    /// Field-wise comparison with missing treated as zero.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        Nutrient::ALL
            .into_iter()
            .all(|n| (self.amount(n) - other.amount(n)).abs() <= tolerance)
    }

    #[must_use]
    pub fn breakdown(&self) -> NutrientBreakdown {
        let group = |g: NutrientGroup| -> Vec<NutrientAmount> {
            self.iter()
                .filter(|(n, _)| n.group() == g)
                .filter_map(|(n, v)| {
                    v.map(|value| NutrientAmount {
                        key: n.key(),
                        label: n.label(),
                        value,
                        unit: n.unit(),
                    })
                })
                .collect()
        };
        NutrientBreakdown {
            macros: group(NutrientGroup::Macro),
            minerals: group(NutrientGroup::Mineral),
            vitamins: group(NutrientGroup::Vitamin),
        }
    }
}

impl Add for NutrientVector {
    type Output = NutrientVector;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_fn(|n| Some(self.amount(n) + rhs.amount(n)))
    }
}

impl AddAssign for NutrientVector {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for NutrientVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a NutrientVector> for NutrientVector {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// --- View types ---

#[derive(Debug, Clone, Serialize)]
pub struct NutrientAmount {
    pub key: &'static str,
    pub label: &'static str,
    pub value: f64,
    pub unit: &'static str,
}

/// Known nutrients grouped for display.
#[derive(Debug, Clone, Serialize)]
pub struct NutrientBreakdown {
    pub macros: Vec<NutrientAmount>,
    pub minerals: Vec<NutrientAmount>,
    pub vitamins: Vec<NutrientAmount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oats() -> NutrientVector {
        NutrientVector::zero()
            .with(Nutrient::Calories, 389.0)
            .with(Nutrient::Protein, 16.9)
            .with(Nutrient::Fat, 6.9)
            .with(Nutrient::Carbs, 66.3)
            .with(Nutrient::Iron, 4.72)
            .with(Nutrient::VitaminB6, 0.12)
    }

    #[test]
    fn test_scale_to_100g_is_identity() {
        let v = oats();
        let scaled = v.scale_to_grams(100.0).unwrap();
        assert!(scaled.approx_eq(&v, 1e-9));
    }

    #[test]
    fn test_scale_to_grams() {
        let scaled = oats().scale_to_grams(40.0).unwrap();
        assert!((scaled.amount(Nutrient::Calories) - 155.6).abs() < 1e-9);
        assert!((scaled.amount(Nutrient::Protein) - 6.76).abs() < 1e-9);
    }

    #[test]
    fn test_scale_missing_becomes_zero() {
        let v = NutrientVector::default().with(Nutrient::Calories, 200.0);
        let scaled = v.scale_to_grams(50.0).unwrap();
        assert_eq!(scaled.calories, Some(100.0));
        assert_eq!(scaled.sodium, Some(0.0));
        assert!(scaled.iter().all(|(_, v)| v.is_some()));
    }

    #[test]
    fn test_scale_rejects_non_positive_grams() {
        let v = oats();
        assert_eq!(
            v.scale_to_grams(0.0),
            Err(CoreError::InvalidServing { grams: 0.0 })
        );
        assert!(v.scale_to_grams(-10.0).is_err());
        assert!(v.scale_to_grams(f64::NAN).is_err());
    }

    #[test]
    fn test_sum_treats_missing_as_zero() {
        let a = NutrientVector::default().with(Nutrient::Calories, 100.0);
        let b = NutrientVector::default()
            .with(Nutrient::Calories, 50.0)
            .with(Nutrient::Protein, 5.0);
        let total: NutrientVector = [a, b].iter().sum();
        assert_eq!(total.calories, Some(150.0));
        assert_eq!(total.protein, Some(5.0));
        assert_eq!(total.zinc, Some(0.0));
    }

    #[test]
    fn test_empty_sum_is_zero() {
        let total: NutrientVector = Vec::<NutrientVector>::new().into_iter().sum();
        assert_eq!(total, NutrientVector::zero());
    }

    #[test]
    fn test_nutrient_keys_round_trip() {
        for n in Nutrient::ALL {
            assert_eq!(Nutrient::from_key(n.key()), Some(n));
        }
        assert!(Nutrient::from_key("caffeine").is_none());
    }

    #[test]
    fn test_serde_key_matches_storage_key() {
        for n in Nutrient::ALL {
            let json = serde_json::to_string(&n).unwrap();
            assert_eq!(json, format!("\"{}\"", n.key()));
        }
    }

    #[test]
    fn test_breakdown_groups_and_skips_missing() {
        let v = NutrientVector::default()
            .with(Nutrient::Calories, 120.0)
            .with(Nutrient::Sodium, 300.0)
            .with(Nutrient::VitaminC, 12.0);
        let b = v.breakdown();
        assert_eq!(b.macros.len(), 1);
        assert_eq!(b.macros[0].label, "Energy");
        assert_eq!(b.macros[0].unit, "kcal");
        assert_eq!(b.minerals.len(), 1);
        assert_eq!(b.minerals[0].key, "sodium");
        assert_eq!(b.vitamins.len(), 1);
        assert_eq!(b.vitamins[0].unit, "mg");
    }

    #[test]
    fn test_deserialize_partial_vector() {
        let v: NutrientVector = serde_json::from_str(r#"{"calories": 52.0}"#).unwrap();
        assert_eq!(v.calories, Some(52.0));
        assert!(v.protein.is_none());
    }
}
