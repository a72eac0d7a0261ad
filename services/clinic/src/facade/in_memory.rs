//! In-memory clinic backend.
//!
//! Seeded with the classic pet clinic vets and pet types. Failures can be
//! injected per operation to exercise the resilience policies.

use super::{ClinicService, OperationName};
use crate::domain::{Owner, Page, PageRequest, Pet, PetType, Specialty, Vet, Visit};
use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_common::ClinicError;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

type ErrorFactory = fn() -> ClinicError;

#[derive(Debug, Default)]
struct Tables {
    owners: BTreeMap<i64, Owner>,
    pets: BTreeMap<i64, Pet>,
    visits: BTreeMap<i64, Visit>,
    vets: Vec<Vet>,
    pet_types: Vec<PetType>,
    next_id: i64,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn assemble_pet(&self, pet: &Pet) -> Pet {
        let mut pet = pet.clone();
        pet.visits = self
            .visits
            .values()
            .filter(|v| Some(v.pet_id) == pet.id)
            .cloned()
            .collect();
        pet
    }

    fn assemble_owner(&self, owner: &Owner) -> Owner {
        let mut owner = owner.clone();
        owner.pets = self
            .pets
            .values()
            .filter(|p| Some(p.owner_id) == owner.id)
            .map(|p| self.assemble_pet(p))
            .collect();
        owner.pets.sort_by(|a, b| a.name.cmp(&b.name));
        owner
    }
}

/// Clinic backend keeping its data in memory.
#[derive(Debug, Default)]
pub struct InMemoryClinic {
    tables: RwLock<Tables>,
    faults: Mutex<HashMap<OperationName, VecDeque<ErrorFactory>>>,
    calls: Mutex<HashMap<OperationName, u32>>,
    latency: Mutex<Duration>,
}

impl InMemoryClinic {
    /// Create an empty clinic.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clinic with the reference vets, pet types and owners.
    #[must_use]
    pub fn seeded() -> Self {
        let clinic = Self::new();
        {
            let mut t = clinic.tables.write();
            let radiology = Specialty::new(1, "radiology");
            let surgery = Specialty::new(2, "surgery");
            let dentistry = Specialty::new(3, "dentistry");
            t.vets = vec![
                Vet::new(1, "James", "Carter", vec![]),
                Vet::new(2, "Helen", "Leary", vec![radiology.clone()]),
                Vet::new(3, "Linda", "Douglas", vec![surgery.clone(), dentistry]),
                Vet::new(4, "Rafael", "Ortega", vec![surgery]),
                Vet::new(5, "Henry", "Stevens", vec![radiology]),
                Vet::new(6, "Sharon", "Jenkins", vec![]),
            ];
            t.pet_types = ["bird", "cat", "dog", "hamster", "lizard", "snake"]
                .iter()
                .zip(1..)
                .map(|(name, id)| PetType::new(id, *name))
                .collect();

            let owners = [
                ("George", "Franklin", "110 W. Liberty St.", "Madison", "6085551023"),
                ("Betty", "Davis", "638 Cardinal Ave.", "Sun Prairie", "6085551749"),
                ("Eduardo", "Rodriquez", "2693 Commerce St.", "McFarland", "6085558763"),
                ("Harold", "Davis", "563 Friendly St.", "Windsor", "6085553198"),
            ];
            for (first, last, address, city, phone) in owners {
                let id = t.allocate_id();
                t.owners
                    .insert(id, Owner::new(first, last, address, city, phone).with_id(id));
            }

            let cat = t.pet_types[1].clone();
            let dog = t.pet_types[2].clone();
            let seeded_pets = [
                ("Leo", 2020, cat, 1),
                ("Basil", 2022, dog.clone(), 2),
                ("Rosy", 2021, dog, 3),
            ];
            for (name, year, pet_type, owner_id) in seeded_pets {
                let id = t.allocate_id();
                let birth = NaiveDate::from_ymd_opt(year, 9, 7).unwrap_or_default();
                t.pets
                    .insert(id, Pet::new(name, birth, pet_type, owner_id).with_id(id));
            }
        }
        clinic
    }

    /// Make the next `times` calls of `operation` fail with `error()`.
    pub fn fail_next(&self, operation: OperationName, times: u32, error: ErrorFactory) {
        let mut faults = self.faults.lock();
        let queue = faults.entry(operation).or_default();
        for _ in 0..times {
            queue.push_back(error);
        }
    }

    /// Make every call take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of times `operation` reached this backend.
    #[must_use]
    pub fn calls(&self, operation: OperationName) -> u32 {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    async fn enter(&self, operation: OperationName) -> Result<(), ClinicError> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
        let fault = self
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(error) => {
                debug!(operation = %operation, "Injected fault");
                Err(error())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClinicService for InMemoryClinic {
    async fn find_vets(&self) -> Result<Vec<Vet>, ClinicError> {
        self.enter(OperationName::FindVets).await?;
        Ok(self.tables.read().vets.clone())
    }

    async fn find_pet_types(&self) -> Result<Vec<PetType>, ClinicError> {
        self.enter(OperationName::FindPetTypes).await?;
        let mut types = self.tables.read().pet_types.clone();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn find_owner_by_id(&self, id: i64) -> Result<Option<Owner>, ClinicError> {
        self.enter(OperationName::FindOwnerById).await?;
        let t = self.tables.read();
        Ok(t.owners.get(&id).map(|o| t.assemble_owner(o)))
    }

    async fn find_owner_by_last_name(
        &self,
        last_name: String,
        page: PageRequest,
    ) -> Result<Page<Owner>, ClinicError> {
        self.enter(OperationName::FindOwnerByLastName).await?;
        let t = self.tables.read();
        let mut matches: Vec<Owner> = t
            .owners
            .values()
            .filter(|o| o.last_name.starts_with(&last_name))
            .map(|o| t.assemble_owner(o))
            .collect();
        matches.sort_by(|a, b| a.last_name.cmp(&b.last_name).then(a.id.cmp(&b.id)));
        Ok(Page::of(matches, page))
    }

    async fn find_pet_by_id(&self, id: i64) -> Result<Pet, ClinicError> {
        self.enter(OperationName::FindPetById).await?;
        let t = self.tables.read();
        t.pets
            .get(&id)
            .map(|p| t.assemble_pet(p))
            .ok_or_else(|| ClinicError::not_found(format!("pet {id}")))
    }

    async fn save_owner(&self, owner: Owner) -> Result<Owner, ClinicError> {
        self.enter(OperationName::SaveOwner).await?;
        if owner.last_name.trim().is_empty() {
            return Err(ClinicError::invalid_input("owner last name is required"));
        }
        let mut t = self.tables.write();
        let id = match owner.id {
            Some(id) if t.owners.contains_key(&id) => id,
            Some(id) => return Err(ClinicError::not_found(format!("owner {id}"))),
            None => t.allocate_id(),
        };
        let stored = Owner {
            id: Some(id),
            pets: Vec::new(),
            ..owner
        };
        t.owners.insert(id, stored);
        Ok(t.assemble_owner(&t.owners[&id]))
    }

    async fn save_pet(&self, pet: Pet) -> Result<Pet, ClinicError> {
        self.enter(OperationName::SavePet).await?;
        if pet.name.trim().is_empty() {
            return Err(ClinicError::invalid_input("pet name is required"));
        }
        let mut t = self.tables.write();
        if !t.owners.contains_key(&pet.owner_id) {
            return Err(ClinicError::not_found(format!("owner {}", pet.owner_id)));
        }
        let id = match pet.id {
            Some(id) if t.pets.contains_key(&id) => id,
            Some(id) => return Err(ClinicError::not_found(format!("pet {id}"))),
            None => t.allocate_id(),
        };
        let stored = Pet {
            id: Some(id),
            visits: Vec::new(),
            ..pet
        };
        t.pets.insert(id, stored);
        Ok(t.assemble_pet(&t.pets[&id]))
    }

    async fn save_visit(&self, visit: Visit) -> Result<Visit, ClinicError> {
        self.enter(OperationName::SaveVisit).await?;
        let mut t = self.tables.write();
        if !t.pets.contains_key(&visit.pet_id) {
            return Err(ClinicError::not_found(format!("pet {}", visit.pet_id)));
        }
        let id = match visit.id {
            Some(id) if t.visits.contains_key(&id) => id,
            Some(id) => return Err(ClinicError::not_found(format!("visit {id}"))),
            None => t.allocate_id(),
        };
        let stored = Visit {
            id: Some(id),
            ..visit
        };
        t.visits.insert(id, stored.clone());
        Ok(stored)
    }
}
