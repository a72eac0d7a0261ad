use super::Pet;
use clinic_common::Auditable;
use clinic_common::masking::{mask_address, mask_telephone};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// A pet owner.
///
/// `Debug` masks the address and telephone so owners can be logged as call
/// arguments.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Owner {
    /// Identity, `None` before the first save
    pub id: Option<i64>,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Street address
    pub address: String,
    /// City
    pub city: String,
    /// Telephone number
    pub telephone: String,
    /// Pets, populated on reads
    pub pets: Vec<Pet>,
}

impl Owner {
    /// Create an unsaved owner.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
        telephone: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            address: address.into(),
            city: city.into(),
            telephone: telephone.into(),
            pets: Vec::new(),
        }
    }

    /// Set the identity.
    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Pet with the given name, case-insensitive.
    #[must_use]
    pub fn pet(&self, name: &str) -> Option<&Pet> {
        self.pets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("address", &mask_address(&self.address))
            .field("city", &self.city)
            .field("telephone", &mask_telephone(&self.telephone))
            .field("pets", &self.pets.len())
            .finish()
    }
}

impl Auditable for Owner {
    fn entity_type(&self) -> &'static str {
        "Owner"
    }

    fn entity_id(&self) -> Option<i64> {
        self.id
    }

    fn audit_snapshot(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "address": mask_address(&self.address),
            "city": self.city,
            "telephone": mask_telephone(&self.telephone),
        })
    }
}
