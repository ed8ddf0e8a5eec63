//! Synthetic person names for load tests and benchmarks.
//!
//! Generators are explicit values handed to a harness, never process-wide
//! state: two harnesses seeded alike replay the same name stream.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::types::EntityRecord;

const GIVEN: &[&str] = &[
    "John", "Maria", "Ahmed", "Wei", "Olga", "Carlos", "Fatima", "Ivan", "Aisha", "David",
    "Elena", "Mohammed", "Yuki", "Pierre", "Ana", "Omar", "Li", "Sergei", "Nadia", "James",
    "Hassan", "Sofia", "Viktor", "Leila", "Jorge", "Amina", "Dmitri", "Chen", "Isabel", "Ali",
];

const FAMILY: &[&str] = &[
    "Smith", "Garcia", "Hassan", "Wang", "Ivanova", "Rodriguez", "Khan", "Petrov", "Nguyen",
    "Müller", "Rossi", "Kim", "Haddad", "Tanaka", "Silva", "Popescu", "Kowalski", "Dubois",
    "Okafor", "Novak", "Yilmaz", "Castillo", "Abdullah", "Sokolov", "Fernandez", "Zhang",
    "Al-Rashid", "O'Brien", "Santos", "Morales",
];

/// Source of query names for a load harness.
pub trait NameGenerator: Send {
    fn next_name(&mut self) -> String;
}

/// Seeded "Given [Middle] Family" generator.
#[derive(Debug, Clone)]
pub struct SyntheticNames {
    rng: StdRng,
    middle_name_ratio: f64,
}

impl SyntheticNames {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            middle_name_ratio: 0.25,
        }
    }

    pub fn with_middle_name_ratio(mut self, ratio: f64) -> Self {
        self.middle_name_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    fn pick(&mut self, pool: &'static [&'static str]) -> &'static str {
        pool.choose(&mut self.rng).copied().unwrap_or("Doe")
    }

    /// `count` watchlist records with ids `syn-0..`.
    pub fn records(&mut self, count: usize) -> Vec<EntityRecord> {
        (0..count)
            .map(|i| {
                EntityRecord::new(
                    format!("syn-{i}"),
                    self.next_name(),
                    serde_json::Value::Null,
                )
            })
            .collect()
    }
}

impl NameGenerator for SyntheticNames {
    fn next_name(&mut self) -> String {
        let given = self.pick(GIVEN);
        let family = self.pick(FAMILY);
        if self.rng.gen_bool(self.middle_name_ratio) {
            let middle = self.pick(GIVEN);
            format!("{given} {middle} {family}")
        } else {
            format!("{given} {family}")
        }
    }
}

impl<F: FnMut() -> String + Send> NameGenerator for F {
    fn next_name(&mut self) -> String {
        self()
    }
}
