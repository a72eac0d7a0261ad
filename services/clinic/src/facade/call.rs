use super::{ClinicService, OperationName};
use crate::domain::{Owner, Page, PageRequest, Pet, PetType, Vet, Visit};
use clinic_common::{AuditAction, Auditable, ClinicError};

/// One facade call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicCall {
    /// `findVets()`
    FindVets,
    /// `findPetTypes()`
    FindPetTypes,
    /// `findOwnerById(id)`
    FindOwnerById(i64),
    /// `findOwnerByLastName(lastName, page)`
    FindOwnerByLastName {
        /// Last name prefix
        last_name: String,
        /// Requested page
        page: PageRequest,
    },
    /// `findPetById(id)`
    FindPetById(i64),
    /// `saveOwner(owner)`
    SaveOwner(Owner),
    /// `savePet(pet)`
    SavePet(Pet),
    /// `saveVisit(visit)`
    SaveVisit(Visit),
}

impl ClinicCall {
    /// Operation invoked by this call.
    #[must_use]
    pub const fn operation(&self) -> OperationName {
        match self {
            Self::FindVets => OperationName::FindVets,
            Self::FindPetTypes => OperationName::FindPetTypes,
            Self::FindOwnerById(_) => OperationName::FindOwnerById,
            Self::FindOwnerByLastName { .. } => OperationName::FindOwnerByLastName,
            Self::FindPetById(_) => OperationName::FindPetById,
            Self::SaveOwner(_) => OperationName::SaveOwner,
            Self::SavePet(_) => OperationName::SavePet,
            Self::SaveVisit(_) => OperationName::SaveVisit,
        }
    }

    /// Stable rendering of the operation and its arguments.
    ///
    /// Used as the result cache key. Owner PII is masked through `Debug`.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::FindVets | Self::FindPetTypes => format!("{}()", self.operation()),
            Self::FindOwnerById(id) | Self::FindPetById(id) => {
                format!("{}({id})", self.operation())
            }
            Self::FindOwnerByLastName { last_name, page } => format!(
                "{}({last_name:?}, page={}, size={})",
                self.operation(),
                page.page,
                page.size
            ),
            Self::SaveOwner(owner) => format!("{}({owner:?})", self.operation()),
            Self::SavePet(pet) => format!("{}({pet:?})", self.operation()),
            Self::SaveVisit(visit) => format!("{}({visit:?})", self.operation()),
        }
    }

    /// Entity passed to a save, as it was before the call.
    #[must_use]
    pub fn entity(&self) -> Option<&(dyn Auditable + Sync)> {
        match self {
            Self::SaveOwner(owner) => Some(owner),
            Self::SavePet(pet) => Some(pet),
            Self::SaveVisit(visit) => Some(visit),
            _ => None,
        }
    }

    /// Audit action implied by the pre-call identity of the saved entity.
    #[must_use]
    pub fn audit_action(&self) -> Option<AuditAction> {
        self.entity().map(AuditAction::for_entity)
    }

    /// Invoke the matching method of `service`.
    ///
    /// # Errors
    ///
    /// Returns the error of the business method.
    pub async fn dispatch(self, service: &dyn ClinicService) -> Result<ClinicReply, ClinicError> {
        match self {
            Self::FindVets => service.find_vets().await.map(ClinicReply::Vets),
            Self::FindPetTypes => service.find_pet_types().await.map(ClinicReply::PetTypes),
            Self::FindOwnerById(id) => service
                .find_owner_by_id(id)
                .await
                .map(ClinicReply::MaybeOwner),
            Self::FindOwnerByLastName { last_name, page } => service
                .find_owner_by_last_name(last_name, page)
                .await
                .map(ClinicReply::Owners),
            Self::FindPetById(id) => service.find_pet_by_id(id).await.map(ClinicReply::Pet),
            Self::SaveOwner(owner) => service.save_owner(owner).await.map(ClinicReply::Owner),
            Self::SavePet(pet) => service.save_pet(pet).await.map(ClinicReply::Pet),
            Self::SaveVisit(visit) => service.save_visit(visit).await.map(ClinicReply::Visit),
        }
    }
}

/// Result of a successful facade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicReply {
    /// Veterinarians
    Vets(Vec<Vet>),
    /// Pet types
    PetTypes(Vec<PetType>),
    /// Owner lookup by id
    MaybeOwner(Option<Owner>),
    /// Owner search page
    Owners(Page<Owner>),
    /// Saved owner
    Owner(Owner),
    /// Found or saved pet
    Pet(Pet),
    /// Saved visit
    Visit(Visit),
}

impl ClinicReply {
    /// Entity returned by a save, with the identity it was given.
    #[must_use]
    pub fn saved_entity(&self) -> Option<&(dyn Auditable + Sync)> {
        match self {
            Self::Owner(owner) => Some(owner),
            Self::Pet(pet) => Some(pet),
            Self::Visit(visit) => Some(visit),
            _ => None,
        }
    }

    /// Reply variant name, for mismatch errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Vets(_) => "Vets",
            Self::PetTypes(_) => "PetTypes",
            Self::MaybeOwner(_) => "MaybeOwner",
            Self::Owners(_) => "Owners",
            Self::Owner(_) => "Owner",
            Self::Pet(_) => "Pet",
            Self::Visit(_) => "Visit",
        }
    }
}
