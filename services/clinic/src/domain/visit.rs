use chrono::NaiveDate;
use clinic_common::Auditable;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A visit of a pet to the clinic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Identity, `None` before the first save
    pub id: Option<i64>,
    /// Day of the visit
    pub date: NaiveDate,
    /// What was done
    pub description: String,
    /// Visited pet
    pub pet_id: i64,
}

impl Visit {
    /// Create an unsaved visit.
    #[must_use]
    pub fn new(date: NaiveDate, description: impl Into<String>, pet_id: i64) -> Self {
        Self {
            id: None,
            date,
            description: description.into(),
            pet_id,
        }
    }
}

impl Auditable for Visit {
    fn entity_type(&self) -> &'static str {
        "Visit"
    }

    fn entity_id(&self) -> Option<i64> {
        self.id
    }

    fn audit_snapshot(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "date": self.date.to_string(),
            "description": self.description,
            "petId": self.pet_id,
        })
    }
}
