use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Collection names. Every record is keyed by its allocator-issued integer
/// id, never by a store-native identifier, so cross-references stay stable
/// across the store boundary.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PETS: &str = "pets";
    pub const CONDITIONS: &str = "conditions";
    pub const FAVOURITES: &str = "favourites";
    pub const CART: &str = "cart";
    pub const APPLICATIONS: &str = "applications";
    pub const ADOPTIONS: &str = "adoptions";
}

/// Counter names, one per entity type.
pub mod counters {
    pub const USER_ID: &str = "user_id";
    pub const PET_ID: &str = "pet_id";
    pub const PET_CONDITION_ID: &str = "pet_condition_id";
    pub const FAVOURITE_ID: &str = "favourite_id";
    pub const CART_ID: &str = "cart_id";
    pub const APPLICATION_ID: &str = "application_id";
    pub const ADOPTION_ID: &str = "adoption_id";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Adopter,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdoptionStatus {
    Available,
    Pending,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub pet_id: u64,
    pub name: String,
    pub species: String,
    pub breed: String,
    pub gender: String,
    pub age_months: u32,
    pub description: String,
    pub image: Option<String>,
    pub adoption_status: AdoptionStatus,
    pub pet_condition_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetCondition {
    pub pet_condition_id: u64,
    pub weight_kg: f64,
    pub health: String,
    pub sterilised: bool,
    pub adoption_fee: f64,
    pub vaccination_date: Option<NaiveDate>,
    pub previous_owner: bool,
}

/// Pet attributes supplied when an admin lists a new pet; ids and the initial
/// Available status are assigned by the core.
#[derive(Debug, Clone)]
pub struct NewPet {
    pub name: String,
    pub species: String,
    pub breed: String,
    pub gender: String,
    pub age_months: u32,
    pub description: String,
    pub image: Option<String>,
    pub condition: NewPetCondition,
}

#[derive(Debug, Clone)]
pub struct NewPetCondition {
    pub weight_kg: f64,
    pub health: String,
    pub sterilised: bool,
    pub adoption_fee: f64,
    pub vaccination_date: Option<NaiveDate>,
    pub previous_owner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favourite {
    pub favourite_id: u64,
    pub user_id: u64,
    pub pet_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: u64,
    pub user_id: u64,
    pub pet_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub application_id: u64,
    pub user_id: u64,
    pub pet_id: u64,
    pub submitted_at: DateTime<Utc>,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adoption {
    pub adoption_id: u64,
    pub application_id: u64,
    pub pet_id: u64,
    pub user_id: u64,
    pub adopted_at: DateTime<Utc>,
}
