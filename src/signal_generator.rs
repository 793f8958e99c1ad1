// =============================================================================
// Signal Generator — category table + bound sampling
// =============================================================================
//
// Picks a category uniformly, then draws:
//
//   lower ∈ [low_min, low_max)
//   upper ∈ [lower + min_spread, ceiling)
//
// `min_spread > 0` makes `lower < upper` hold for every draw; the table is
// validated once at construction so generation itself cannot fail.
// =============================================================================

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::random::{uniform, uniform_index, RandomSource};
use crate::runtime_config::{ConfigError, SignalCategory};
use crate::types::Signal;

pub struct SignalGenerator {
    categories: Vec<SignalCategory>,
}

impl SignalGenerator {
    pub fn new(categories: Vec<SignalCategory>) -> Result<Self, ConfigError> {
        if categories.is_empty() {
            return Err(ConfigError::EmptyCategories);
        }
        for category in &categories {
            category.validate()?;
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[SignalCategory] {
        &self.categories
    }

    pub fn generate(&self, source: &mut dyn RandomSource, now: DateTime<Utc>) -> Signal {
        let category = &self.categories[uniform_index(source, self.categories.len())];

        let lower_bound = uniform(source, category.low_min, category.low_max);
        let upper_bound = uniform(source, lower_bound + category.min_spread, category.ceiling);

        Signal {
            id: Uuid::new_v4(),
            label: category.label.clone(),
            lower_bound,
            upper_bound,
            created_at: now,
        }
    }
}
