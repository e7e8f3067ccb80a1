mod ops;
mod records;

pub use ops::AdoptionCore;
pub use records::{
    collections, counters, Adoption, AdoptionStatus, Application, ApplicationStatus, CartItem,
    Favourite, NewPet, NewPetCondition, Pet, PetCondition, Role, User,
};
