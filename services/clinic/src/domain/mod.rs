//! Clinic domain model.
//!
//! Entities carry an optional id: `None` until the first save assigns one.

mod owner;
mod page;
mod pet;
mod vet;
mod visit;

pub use owner::Owner;
pub use page::{Page, PageRequest};
pub use pet::{Pet, PetType};
pub use vet::{Specialty, Vet};
pub use visit::Visit;
