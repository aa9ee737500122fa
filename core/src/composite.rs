//! Composite ("recipe") foods: per-100 g resolution from ingredient portions
//! and cycle checks over the ingredient graph.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::nutrients::NutrientVector;

pub const GRAMS_UNIT: &str = "grams";
pub const AS_PREPARED_UNIT: &str = "as prepared";

/// One ingredient edge after unit conversion.
#[derive(Debug, Clone, Copy)]
pub struct IngredientPortion {
    pub grams: f64,
    pub per_100g: NutrientVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeProfile {
    pub per_100g: NutrientVector,
    pub total_grams: f64,
    /// `100 / total_grams`, or 0 for an empty batch.
    pub normalization_factor: f64,
}

impl CompositeProfile {
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.total_grams <= 0.0
    }

    /// The derived units every composite carries: one gram, and one whole batch.
    #[must_use]
    pub fn units(&self) -> [(&'static str, f64); 2] {
        [(GRAMS_UNIT, 1.0), (AS_PREPARED_UNIT, self.total_grams)]
    }
}

/// Combine ingredient portions into a per-100 g profile.
///
/// Zero-gram portions are skipped. A batch with no grams at all resolves to
/// an all-zero profile rather than an error.
pub fn resolve(portions: &[IngredientPortion]) -> Result<CompositeProfile, CoreError> {
    let mut sum = NutrientVector::zero();
    let mut total_grams = 0.0;

    for portion in portions {
        if !portion.grams.is_finite() || portion.grams < 0.0 {
            return Err(CoreError::InvalidServing {
                grams: portion.grams,
            });
        }
        if portion.grams <= 0.0 {
            continue;
        }
        sum += portion.per_100g.scale_to_grams(portion.grams)?;
        total_grams += portion.grams;
    }

    if total_grams > 0.0 {
        let normalization_factor = 100.0 / total_grams;
        Ok(CompositeProfile {
            per_100g: sum.scaled(normalization_factor),
            total_grams,
            normalization_factor,
        })
    } else {
        Ok(CompositeProfile {
            per_100g: NutrientVector::zero(),
            total_grams: 0.0,
            normalization_factor: 0.0,
        })
    }
}

/// Directed graph of ingredient edges, composite -> ingredient.
#[derive(Debug, Default, Clone)]
pub struct IngredientGraph {
    children: HashMap<i64, Vec<i64>>,
    parents: HashMap<i64, Vec<i64>>,
}

impl IngredientGraph {
    pub fn from_edges(edges: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut graph = Self::default();
        for (composite, ingredient) in edges {
            graph.add_edge(composite, ingredient);
        }
        graph
    }

    pub fn add_edge(&mut self, composite: i64, ingredient: i64) {
        self.children.entry(composite).or_default().push(ingredient);
        self.parents.entry(ingredient).or_default().push(composite);
    }

    /// True if `to` can be reached from `from` by following ingredient edges.
    #[must_use]
    pub fn reaches(&self, from: i64, to: i64) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.children.get(&node) {
                stack.extend(next.iter().copied().filter(|n| !visited.contains(n)));
            }
        }
        false
    }

    /// Reject an edge that would let `composite` contain itself.
    pub fn check_edge(&self, composite: i64, ingredient: i64) -> Result<(), CoreError> {
        if composite == ingredient || self.reaches(ingredient, composite) {
            return Err(CoreError::CycleDetected {
                composite_id: composite,
                ingredient_id: ingredient,
            });
        }
        Ok(())
    }

    /// `food` followed by every composite that transitively contains it,
    /// ordered so each composite comes after all of its affected ingredients.
    #[must_use]
    pub fn recompute_order(&self, food: i64) -> Vec<i64> {
        let mut visited = HashSet::new();
        let mut post_order = Vec::new();
        self.visit_parents(food, &mut visited, &mut post_order);
        post_order.reverse();
        post_order
    }

    fn visit_parents(&self, node: i64, visited: &mut HashSet<i64>, out: &mut Vec<i64>) {
        if !visited.insert(node) {
            return;
        }
        if let Some(parents) = self.parents.get(&node) {
            for &parent in parents {
                self.visit_parents(parent, visited, out);
            }
        }
        out.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrients::Nutrient;

    fn cal(kcal: f64) -> NutrientVector {
        NutrientVector::default().with(Nutrient::Calories, kcal)
    }

    #[test]
    fn test_resolve_two_halves() {
        let profile = resolve(&[
            IngredientPortion {
                grams: 50.0,
                per_100g: cal(200.0),
            },
            IngredientPortion {
                grams: 50.0,
                per_100g: cal(100.0),
            },
        ])
        .unwrap();
        assert!((profile.total_grams - 100.0).abs() < 1e-9);
        assert!((profile.per_100g.amount(Nutrient::Calories) - 150.0).abs() < 1e-9);
        assert!((profile.normalization_factor - 1.0).abs() < 1e-12);
        assert_eq!(profile.units()[1], (AS_PREPARED_UNIT, 100.0));
    }

    #[test]
    fn test_resolve_normalizes_large_batch() {
        let profile = resolve(&[
            IngredientPortion {
                grams: 300.0,
                per_100g: cal(120.0).with(Nutrient::Protein, 10.0),
            },
            IngredientPortion {
                grams: 200.0,
                per_100g: cal(40.0),
            },
        ])
        .unwrap();
        // (360 + 80) kcal over 500 g
        assert!((profile.per_100g.amount(Nutrient::Calories) - 88.0).abs() < 1e-9);
        assert!((profile.per_100g.amount(Nutrient::Protein) - 6.0).abs() < 1e-9);
        assert!((profile.normalization_factor - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let portions = [
            IngredientPortion {
                grams: 33.3,
                per_100g: cal(217.0).with(Nutrient::Iron, 1.3),
            },
            IngredientPortion {
                grams: 71.9,
                per_100g: cal(52.0).with(Nutrient::VitaminC, 4.6),
            },
        ];
        let a = resolve(&portions).unwrap();
        let b = resolve(&portions).unwrap();
        assert!(a.per_100g.approx_eq(&b.per_100g, 1e-6));
        assert!((a.total_grams - b.total_grams).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_empty_is_degenerate() {
        let profile = resolve(&[]).unwrap();
        assert!(profile.is_degenerate());
        assert_eq!(profile.per_100g, NutrientVector::zero());
        assert!(profile.normalization_factor.abs() < f64::EPSILON);
        assert_eq!(profile.units()[1], (AS_PREPARED_UNIT, 0.0));
    }

    #[test]
    fn test_resolve_skips_zero_gram_portions() {
        let profile = resolve(&[
            IngredientPortion {
                grams: 0.0,
                per_100g: cal(900.0),
            },
            IngredientPortion {
                grams: 80.0,
                per_100g: cal(50.0),
            },
        ])
        .unwrap();
        assert!((profile.total_grams - 80.0).abs() < 1e-9);
        assert!((profile.per_100g.amount(Nutrient::Calories) - 50.0).abs() < 1e-9);

        let all_zero = resolve(&[IngredientPortion {
            grams: 0.0,
            per_100g: cal(900.0),
        }])
        .unwrap();
        assert!(all_zero.is_degenerate());
    }

    #[test]
    fn test_resolve_rejects_negative_grams() {
        let err = resolve(&[IngredientPortion {
            grams: -1.0,
            per_100g: cal(100.0),
        }])
        .unwrap_err();
        assert_eq!(err, CoreError::InvalidServing { grams: -1.0 });
    }

    #[test]
    fn test_check_edge_rejects_cycles() {
        // 1 contains 2, 2 contains 3
        let graph = IngredientGraph::from_edges([(1, 2), (2, 3)]);
        assert!(graph.check_edge(3, 1).unwrap_err().is_cycle());
        assert!(graph.check_edge(2, 1).unwrap_err().is_cycle());
        assert!(graph.check_edge(4, 4).unwrap_err().is_cycle());
        assert!(graph.check_edge(1, 3).is_ok());
        assert!(graph.check_edge(4, 1).is_ok());
    }

    #[test]
    fn test_reaches_terminates_on_diamond() {
        let graph = IngredientGraph::from_edges([(1, 2), (1, 3), (2, 4), (3, 4)]);
        assert!(graph.reaches(1, 4));
        assert!(!graph.reaches(4, 1));
    }

    #[test]
    fn test_recompute_order_puts_ingredients_first() {
        // 10 contains 20 and 30, 20 contains 30, 30 contains 40
        let graph = IngredientGraph::from_edges([(10, 20), (10, 30), (20, 30), (30, 40)]);
        let order = graph.recompute_order(40);
        assert_eq!(order.first(), Some(&40));
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(30) < pos(20));
        assert!(pos(20) < pos(10));
        assert_eq!(order.len(), 4);

        assert_eq!(graph.recompute_order(99), vec![99]);
    }
}
