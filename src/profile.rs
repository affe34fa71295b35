//! Talent profile value types.
//!
//! Profiles are owned by the external HR side of the system; this crate
//! only ever reads them. Sub-lists are kept in a fixed order (see
//! `Store::fetch_profile`) so that document synthesis stays deterministic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub company: Option<String>,
    pub title: Option<String>,
    pub years: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub program: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub biography: Option<String>,
    pub skills: Vec<Skill>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub languages: Vec<String>,
    pub years_of_experience: i64,
}

impl Profile {
    /// Minimal profile with just an identity. Handy in tests and as a
    /// building block for seeded fixtures.
    pub fn bare(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            biography: None,
            skills: vec![],
            experience: vec![],
            education: vec![],
            languages: vec![],
            years_of_experience: 0,
        }
    }
}
