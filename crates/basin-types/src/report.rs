//! Confirmed-selection artifact handed to report generation
//!
//! The reporting side reads this without re-validating it, so every key is
//! serialized on every call, empty collections included.

use crate::location::Village;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One confirmed village row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedVillage {
    pub id: String,
    pub name: String,
    pub district: String,
    pub sub_district: String,
    pub population: u64,
}

/// Snapshot published on confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedSelection {
    /// State name; distinct states joined with ", " when the selection spans
    /// more than one
    pub state_name: String,
    /// Distinct district names in first-seen order
    pub districts: Vec<String>,
    /// Distinct sub-district names in first-seen order
    pub sub_districts: Vec<String>,
    pub villages: Vec<ConfirmedVillage>,
    pub total_population: u64,
    pub village_count: usize,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmedSelection {
    /// Build the artifact from the selected villages, in the order given.
    pub fn from_villages<'a>(
        villages: impl IntoIterator<Item = &'a Village>,
        confirmed_at: DateTime<Utc>,
    ) -> Self {
        let mut states: Vec<String> = Vec::new();
        let mut districts: Vec<String> = Vec::new();
        let mut sub_districts: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        for v in villages {
            push_distinct(&mut states, &v.state);
            push_distinct(&mut districts, &v.district);
            push_distinct(&mut sub_districts, &v.sub_district);
            rows.push(ConfirmedVillage {
                id: v.id.to_string(),
                name: v.name.clone(),
                district: v.district.clone(),
                sub_district: v.sub_district.clone(),
                population: v.population,
            });
        }

        let total_population = rows.iter().map(|r| r.population).sum();
        Self {
            state_name: states.join(", "),
            districts,
            sub_districts,
            village_count: rows.len(),
            villages: rows,
            total_population,
            confirmed_at,
        }
    }
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
