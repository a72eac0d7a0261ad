use serde::{Deserialize, Serialize};

/// A veterinary specialty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specialty {
    /// Identity
    pub id: i64,
    /// Display name
    pub name: String,
}

impl Specialty {
    /// Create a specialty.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A veterinarian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vet {
    /// Identity
    pub id: i64,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Specialties, sorted by name
    pub specialties: Vec<Specialty>,
}

impl Vet {
    /// Create a vet with the given specialties.
    #[must_use]
    pub fn new(
        id: i64,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        mut specialties: Vec<Specialty>,
    ) -> Self {
        specialties.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            specialties,
        }
    }

    /// Number of specialties.
    #[must_use]
    pub fn nr_of_specialties(&self) -> usize {
        self.specialties.len()
    }
}
