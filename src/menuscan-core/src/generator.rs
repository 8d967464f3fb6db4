//! Synthetic restaurant generator.
//!
//! Records are produced in nested groups so that fields have controlled
//! cardinality: every record with the same `index / 10` shares its owner and
//! head chef, `index / 100` its city, `index / 1_000` its state and
//! `index / 10_000` its country.
//!
//! Each record (and each group value) draws from its own RNG seeded from the
//! base seed and its absolute index, so disjoint ranges can be generated on
//! separate workers and still agree on every shared value.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::models::{Address, Chef, MenuItem, Metadata, Owner, Price, Restaurant};

pub const OWNER_GROUP_SIZE: u64 = 10;
pub const CITY_GROUP_SIZE: u64 = 100;
pub const STATE_GROUP_SIZE: u64 = 1_000;
pub const COUNTRY_GROUP_SIZE: u64 = 10_000;

const RESTAURANT_KINDS: [&str; 5] = ["DINER", "CAFE", "BISTRO", "GRILL", "PIZZERIA"];
const MENU_SIZE: usize = 5;
const PLACEHOLDER_DOB: &str = "00-00-0000";

// Salts keep group RNG streams apart from each other and from record streams.
const RECORD_SALT: u64 = 0x5EED_0000_0000_0001;
const OWNER_SALT: u64 = 0x5EED_0000_0000_0010;
const HEAD_CHEF_SALT: u64 = 0x5EED_0000_0000_0100;

/// Deterministic generator for synthetic restaurants
#[derive(Debug, Clone, Copy)]
pub struct RestaurantGenerator {
    seed: u64,
}

impl RestaurantGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate `count` records starting at absolute index `start`
    pub fn generate(&self, start: u64, count: u64) -> Vec<Restaurant> {
        self.records(start, count).collect()
    }

    /// Lazily generate records for the range `start..start + count`
    pub fn records(&self, start: u64, count: u64) -> impl Iterator<Item = Restaurant> + '_ {
        (start..start + count).map(move |index| self.restaurant(index))
    }

    /// Generate the record at absolute index `index`
    pub fn restaurant(&self, index: u64) -> Restaurant {
        let mut rng = self.rng_for(RECORD_SALT, index);

        let name = random_letters(&mut rng, 16);
        let kind = RESTAURANT_KINDS[rng.gen_range(0..RESTAURANT_KINDS.len())];
        let open = rng.gen_range(6..=11);
        let close = rng.gen_range(20..=23);

        let sous_chef = Chef {
            chef_id: random_uuid(&mut rng),
            first_name: random_letters(&mut rng, 16),
            last_name: random_letters(&mut rng, 16),
            dob: PLACEHOLDER_DOB.to_string(),
            is_head_chef: false,
        };

        let menu = (1..=MENU_SIZE)
            .map(|n| MenuItem {
                kind: "DISH".to_string(),
                dish_name: format!("DISH NUMBER {}", n),
                price: Price {
                    dollars: rng.gen_range(1..=30),
                    cents: rng.gen_range(0..100),
                },
            })
            .collect();

        Restaurant {
            restaurant_name: format!("Restaurant {}", name),
            restaurant_id: random_uuid(&mut rng),
            meta_data: Metadata {
                kind: kind.to_string(),
                operating_hours: vec![open, close],
                phone_number: format!("555-{:04}", rng.gen_range(0..10_000)),
                email: format!("{}@example.com", name.to_lowercase()),
                is_active: rng.gen_bool(0.9),
            },
            address: Address {
                address_id: random_uuid(&mut rng),
                city: group_label("CITY", index, CITY_GROUP_SIZE),
                state: group_label("STATE", index, STATE_GROUP_SIZE),
                zip: format!("{:05}", rng.gen_range(0..100_000)),
                country: group_label("COUNTRY", index, COUNTRY_GROUP_SIZE),
            },
            owners: vec![self.owner(index / OWNER_GROUP_SIZE)],
            chefs: vec![self.head_chef(index / OWNER_GROUP_SIZE), sous_chef],
            menu,
        }
    }

    fn owner(&self, group: u64) -> Owner {
        let mut rng = self.rng_for(OWNER_SALT, group);
        Owner {
            owner_id: random_uuid(&mut rng),
            first_name: random_letters(&mut rng, 8),
            last_name: random_letters(&mut rng, 8),
            dob: PLACEHOLDER_DOB.to_string(),
        }
    }

    fn head_chef(&self, group: u64) -> Chef {
        let mut rng = self.rng_for(HEAD_CHEF_SALT, group);
        Chef {
            chef_id: random_uuid(&mut rng),
            first_name: random_letters(&mut rng, 16),
            last_name: random_letters(&mut rng, 16),
            dob: PLACEHOLDER_DOB.to_string(),
            is_head_chef: true,
        }
    }

    fn rng_for(&self, salt: u64, index: u64) -> StdRng {
        let seed = (self.seed ^ salt).wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        StdRng::seed_from_u64(seed)
    }
}

impl Default for RestaurantGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}

/// Label shared by every record in the same group, e.g. `COUNTRY A`
pub fn group_label(prefix: &str, index: u64, group_size: u64) -> String {
    format!("{} {}", prefix, alpha_label(index / group_size))
}

/// Bijective base-26 label: 0 -> A, 25 -> Z, 26 -> AA
pub fn alpha_label(n: u64) -> String {
    let mut n = n + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn random_letters(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect()
}

fn random_uuid(rng: &mut StdRng) -> String {
    uuid::Builder::from_random_bytes(rng.gen())
        .into_uuid()
        .to_string()
}

/// Per-field breakdown of a generated dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBreakdown {
    pub field: String,
    pub group_size: u64,
    pub distinct_values: u64,
}

/// Summary of a generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub documents: u64,
    pub fields: Vec<FieldBreakdown>,
}

impl GenerationSummary {
    /// Breakdown of a dataset of `documents` records generated from index 0
    pub fn for_count(documents: u64) -> Self {
        let fields = [
            ("owners", OWNER_GROUP_SIZE),
            ("address.city", CITY_GROUP_SIZE),
            ("address.state", STATE_GROUP_SIZE),
            ("address.country", COUNTRY_GROUP_SIZE),
        ]
        .into_iter()
        .map(|(field, group_size)| FieldBreakdown {
            field: field.to_string(),
            group_size,
            distinct_values: documents.div_ceil(group_size),
        })
        .collect();

        Self { documents, fields }
    }

    pub fn distinct(&self, field: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.distinct_values)
    }
}
