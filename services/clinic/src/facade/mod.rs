//! The clinic business facade.
//!
//! [`ClinicService`] is the single entry point to clinic data. The pipeline
//! never looks inside its methods: each call is an [`OperationName`] with
//! arguments ([`ClinicCall`]) and a result ([`ClinicReply`]).

mod call;
mod in_memory;

pub use call::{ClinicCall, ClinicReply};
pub use in_memory::InMemoryClinic;

use crate::domain::{Owner, Page, PageRequest, Pet, PetType, Vet, Visit};
use async_trait::async_trait;
use clinic_common::ClinicError;
use std::fmt;

/// Business facade of the clinic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClinicService: Send + Sync {
    /// All veterinarians.
    async fn find_vets(&self) -> Result<Vec<Vet>, ClinicError>;

    /// All pet types, sorted by name.
    async fn find_pet_types(&self) -> Result<Vec<PetType>, ClinicError>;

    /// Owner with the given id, with pets and visits.
    async fn find_owner_by_id(&self, id: i64) -> Result<Option<Owner>, ClinicError>;

    /// Owners whose last name starts with `last_name`.
    async fn find_owner_by_last_name(
        &self,
        last_name: String,
        page: PageRequest,
    ) -> Result<Page<Owner>, ClinicError>;

    /// Pet with the given id.
    async fn find_pet_by_id(&self, id: i64) -> Result<Pet, ClinicError>;

    /// Insert or update an owner, returning it with its identity.
    async fn save_owner(&self, owner: Owner) -> Result<Owner, ClinicError>;

    /// Insert or update a pet, returning it with its identity.
    async fn save_pet(&self, pet: Pet) -> Result<Pet, ClinicError>;

    /// Insert or update a visit, returning it with its identity.
    async fn save_visit(&self, visit: Visit) -> Result<Visit, ClinicError>;
}

/// Whether an operation changes clinic data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read-only, safe to cache and retry
    Read,
    /// Changes data
    Mutation,
}

/// Name of a facade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationName {
    /// `findVets`
    FindVets,
    /// `findPetTypes`
    FindPetTypes,
    /// `findOwnerById`
    FindOwnerById,
    /// `findOwnerByLastName`
    FindOwnerByLastName,
    /// `findPetById`
    FindPetById,
    /// `saveOwner`
    SaveOwner,
    /// `savePet`
    SavePet,
    /// `saveVisit`
    SaveVisit,
}

impl OperationName {
    /// Every facade operation.
    pub const ALL: [Self; 8] = [
        Self::FindVets,
        Self::FindPetTypes,
        Self::FindOwnerById,
        Self::FindOwnerByLastName,
        Self::FindPetById,
        Self::SaveOwner,
        Self::SavePet,
        Self::SaveVisit,
    ];

    /// Name used in logs, metric labels and policy bindings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FindVets => "findVets",
            Self::FindPetTypes => "findPetTypes",
            Self::FindOwnerById => "findOwnerById",
            Self::FindOwnerByLastName => "findOwnerByLastName",
            Self::FindPetById => "findPetById",
            Self::SaveOwner => "saveOwner",
            Self::SavePet => "savePet",
            Self::SaveVisit => "saveVisit",
        }
    }

    /// Whether the operation reads or changes data.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::SaveOwner | Self::SavePet | Self::SaveVisit => OperationKind::Mutation,
            _ => OperationKind::Read,
        }
    }

    /// Check if the operation changes data.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(self.kind(), OperationKind::Mutation)
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
