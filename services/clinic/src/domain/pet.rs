use super::Visit;
use chrono::NaiveDate;
use clinic_common::Auditable;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Kind of animal, e.g. `cat` or `dog`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PetType {
    /// Identity
    pub id: i64,
    /// Display name
    pub name: String,
}

impl PetType {
    /// Create a pet type.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A pet belonging to an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    /// Identity, `None` before the first save
    pub id: Option<i64>,
    /// Name
    pub name: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Kind of animal
    pub pet_type: PetType,
    /// Owning owner
    pub owner_id: i64,
    /// Visits, populated on reads
    pub visits: Vec<Visit>,
}

impl Pet {
    /// Create an unsaved pet.
    #[must_use]
    pub fn new(name: impl Into<String>, birth_date: NaiveDate, pet_type: PetType, owner_id: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            birth_date,
            pet_type,
            owner_id,
            visits: Vec::new(),
        }
    }

    /// Set the identity.
    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl Auditable for Pet {
    fn entity_type(&self) -> &'static str {
        "Pet"
    }

    fn entity_id(&self) -> Option<i64> {
        self.id
    }

    fn audit_snapshot(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "birthDate": self.birth_date.to_string(),
            "type": self.pet_type.name,
            "ownerId": self.owner_id,
        })
    }
}
