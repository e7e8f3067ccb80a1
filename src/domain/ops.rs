use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::contracts::{CoreError, DomainViolation, SequenceAllocator};
use crate::domain::records::{
    collections, counters, Adoption, AdoptionStatus, Application, ApplicationStatus, CartItem,
    Favourite, NewPet, Pet, PetCondition, Role, User,
};
use crate::store::{CounterAllocator, DocStore, RetryPolicy, Txn, TxnCoordinator};

/// Unique-index key for usernames.
fn uname_key(username: &str) -> String {
    format!("uname:{}", username)
}

/// Unique-index key preventing duplicate favourites per user and pet.
fn fav_key(user_id: u64, pet_id: u64) -> String {
    format!("ufav:{:016x}:{:016x}", user_id, pet_id)
}

/// Unique-index key preventing duplicate cart entries per user and pet.
fn cart_key(user_id: u64, pet_id: u64) -> String {
    format!("ucart:{:016x}:{:016x}", user_id, pet_id)
}

/// The transactional core of the adoption backend.
///
/// Every mutation is a named composite procedure run as one coordinator-
/// managed transaction; new ids come from the counter allocator. The
/// consuming layer (HTTP or otherwise) maps each inbound request to exactly
/// one of these calls or to one of the unguarded reads.
pub struct AdoptionCore {
    store: Arc<DocStore>,
    coordinator: TxnCoordinator,
    allocator: CounterAllocator,
}

impl AdoptionCore {
    /// Opens the core over a store at `path`, with the retry policy taken
    /// from the environment.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::open_with_policy(path, RetryPolicy::from_env())
    }

    pub fn open_with_policy(path: impl AsRef<Path>, policy: RetryPolicy) -> Result<Self, CoreError> {
        let store = Arc::new(DocStore::open(path)?);
        Ok(Self {
            coordinator: TxnCoordinator::new(Arc::clone(&store), policy.clone()),
            allocator: CounterAllocator::new(Arc::clone(&store), policy),
            store,
        })
    }

    /// The id allocator, usable outside any transaction.
    pub fn allocator(&self) -> &dyn SequenceAllocator {
        &self.allocator
    }

    fn require_admin(&self, txn: &Txn<'_>, user_id: u64) -> Result<(), CoreError> {
        let user: User = txn
            .get_doc(collections::USERS, user_id)?
            .ok_or(DomainViolation::NotFound {
                entity: "user",
                id: user_id,
            })?;
        if user.role != Role::Admin {
            return Err(DomainViolation::NotAdmin(user_id).into());
        }
        Ok(())
    }

    fn insert_user(&self, txn: &Txn<'_>, username: &str, password_hash: &str, role: Role) -> Result<User, CoreError> {
        if txn.get_index_for_update(&uname_key(username))?.is_some() {
            return Err(DomainViolation::UsernameTaken(username.to_string()).into());
        }
        let user_id = self.allocator.next(counters::USER_ID)?;
        let user = User {
            user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        };
        txn.put_doc(collections::USERS, user_id, &user)?;
        txn.put_index(&uname_key(username), user_id)?;
        Ok(user)
    }

    /// Registers a new adopter. Of N concurrent registrations of the same
    /// username, exactly one succeeds; the rest observe `UsernameTaken`.
    pub fn register(&self, username: &str, password_hash: &str) -> Result<User, CoreError> {
        self.coordinator
            .run_in_transaction(|txn| self.insert_user(txn, username, password_hash, Role::Adopter))
    }

    /// Creates an admin account. Registration only produces adopters; this is
    /// the seeding path used at deployment time.
    pub fn seed_admin(&self, username: &str, password_hash: &str) -> Result<User, CoreError> {
        self.coordinator
            .run_in_transaction(|txn| self.insert_user(txn, username, password_hash, Role::Admin))
    }

    /// Lists a new pet together with its condition record (admin only).
    pub fn add_pet(&self, admin_id: u64, new_pet: &NewPet) -> Result<Pet, CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            self.require_admin(txn, admin_id)?;

            let pet_condition_id = self.allocator.next(counters::PET_CONDITION_ID)?;
            let pet_id = self.allocator.next(counters::PET_ID)?;

            let condition = PetCondition {
                pet_condition_id,
                weight_kg: new_pet.condition.weight_kg,
                health: new_pet.condition.health.clone(),
                sterilised: new_pet.condition.sterilised,
                adoption_fee: new_pet.condition.adoption_fee,
                vaccination_date: new_pet.condition.vaccination_date,
                previous_owner: new_pet.condition.previous_owner,
            };
            let pet = Pet {
                pet_id,
                name: new_pet.name.clone(),
                species: new_pet.species.clone(),
                breed: new_pet.breed.clone(),
                gender: new_pet.gender.clone(),
                age_months: new_pet.age_months,
                description: new_pet.description.clone(),
                image: new_pet.image.clone(),
                adoption_status: AdoptionStatus::Available,
                pet_condition_id,
            };

            txn.put_doc(collections::CONDITIONS, pet_condition_id, &condition)?;
            txn.put_doc(collections::PETS, pet_id, &pet)?;
            Ok(pet)
        })
    }

    /// Adds a pet to a user's favourites. Duplicate pet-per-user is rejected.
    pub fn add_favourite(&self, user_id: u64, pet_id: u64) -> Result<Favourite, CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            if txn.get_doc::<Pet>(collections::PETS, pet_id)?.is_none() {
                return Err(DomainViolation::NotFound {
                    entity: "pet",
                    id: pet_id,
                }
                .into());
            }
            if txn.get_index_for_update(&fav_key(user_id, pet_id))?.is_some() {
                return Err(DomainViolation::AlreadyFavourited { user_id, pet_id }.into());
            }
            let favourite_id = self.allocator.next(counters::FAVOURITE_ID)?;
            let favourite = Favourite {
                favourite_id,
                user_id,
                pet_id,
            };
            txn.put_doc(collections::FAVOURITES, favourite_id, &favourite)?;
            txn.put_index(&fav_key(user_id, pet_id), favourite_id)?;
            Ok(favourite)
        })
    }

    /// Adds a pet to a user's cart. Duplicate pet-per-user is rejected.
    pub fn add_to_cart(&self, user_id: u64, pet_id: u64) -> Result<CartItem, CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            if txn.get_doc::<Pet>(collections::PETS, pet_id)?.is_none() {
                return Err(DomainViolation::NotFound {
                    entity: "pet",
                    id: pet_id,
                }
                .into());
            }
            if txn.get_index_for_update(&cart_key(user_id, pet_id))?.is_some() {
                return Err(DomainViolation::AlreadyInCart { user_id, pet_id }.into());
            }
            let cart_id = self.allocator.next(counters::CART_ID)?;
            let item = CartItem {
                cart_id,
                user_id,
                pet_id,
            };
            txn.put_doc(collections::CART, cart_id, &item)?;
            txn.put_index(&cart_key(user_id, pet_id), cart_id)?;
            Ok(item)
        })
    }

    /// Removes a pet from a user's cart. A missing entry is an error, not a
    /// silent no-op.
    pub fn remove_from_cart(&self, user_id: u64, pet_id: u64) -> Result<(), CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            let Some(cart_id) = txn.get_index_for_update(&cart_key(user_id, pet_id))? else {
                return Err(DomainViolation::NotInCart { user_id, pet_id }.into());
            };
            txn.delete_doc(collections::CART, cart_id)?;
            txn.delete_index(&cart_key(user_id, pet_id))?;
            Ok(())
        })
    }

    /// Turns a batch of cart pets into pending applications and flips each
    /// pet to Pending, clearing the user's cart entries for them.
    ///
    /// The batch is all-or-nothing: any pet that is not Available aborts the
    /// whole transaction and no application is created. Of two concurrent
    /// reservations for the same pet, exactly one commits; the loser re-runs
    /// on the commit conflict, re-reads the Pending status and surfaces
    /// `PetNotAvailable`.
    pub fn confirm_reservation(
        &self,
        user_id: u64,
        pet_ids: &[u64],
    ) -> Result<Vec<Application>, CoreError> {
        if pet_ids.is_empty() {
            return Err(DomainViolation::EmptyReservation.into());
        }
        self.coordinator.run_in_transaction(|txn| {
            let submitted_at = Utc::now();
            let mut applications = Vec::with_capacity(pet_ids.len());

            for &pet_id in pet_ids {
                let mut pet: Pet = txn
                    .get_doc_for_update(collections::PETS, pet_id)?
                    .ok_or(DomainViolation::NotFound {
                        entity: "pet",
                        id: pet_id,
                    })?;
                if pet.adoption_status != AdoptionStatus::Available {
                    return Err(DomainViolation::PetNotAvailable(pet_id).into());
                }

                let application_id = self.allocator.next(counters::APPLICATION_ID)?;
                let application = Application {
                    application_id,
                    user_id,
                    pet_id,
                    submitted_at,
                    status: ApplicationStatus::Pending,
                };
                txn.put_doc(collections::APPLICATIONS, application_id, &application)?;

                pet.adoption_status = AdoptionStatus::Pending;
                txn.put_doc(collections::PETS, pet_id, &pet)?;

                if let Some(cart_id) = txn.get_index_for_update(&cart_key(user_id, pet_id))? {
                    txn.delete_doc(collections::CART, cart_id)?;
                    txn.delete_index(&cart_key(user_id, pet_id))?;
                }

                applications.push(application);
            }

            Ok(applications)
        })
    }

    /// Deletes a pet and everything referencing it (admin only).
    pub fn delete_pet(&self, admin_id: u64, pet_id: u64) -> Result<(), CoreError> {
        self.coordinator
            .run_in_transaction(|txn| self.delete_pet_in_txn(txn, admin_id, pet_id))
    }

    /// Cascade body: favourites, cart entries and applications first, then
    /// the condition record, then the pet itself.
    fn delete_pet_in_txn(&self, txn: &Txn<'_>, admin_id: u64, pet_id: u64) -> Result<(), CoreError> {
        self.require_admin(txn, admin_id)?;

        let pet: Pet = txn
            .get_doc_for_update(collections::PETS, pet_id)?
            .ok_or(DomainViolation::NotFound {
                entity: "pet",
                id: pet_id,
            })?;

        for (favourite_id, favourite) in txn.scan::<Favourite>(collections::FAVOURITES)? {
            if favourite.pet_id == pet_id {
                txn.delete_doc(collections::FAVOURITES, favourite_id)?;
                txn.delete_index(&fav_key(favourite.user_id, pet_id))?;
            }
        }
        for (cart_id, item) in txn.scan::<CartItem>(collections::CART)? {
            if item.pet_id == pet_id {
                txn.delete_doc(collections::CART, cart_id)?;
                txn.delete_index(&cart_key(item.user_id, pet_id))?;
            }
        }
        for (application_id, application) in txn.scan::<Application>(collections::APPLICATIONS)? {
            if application.pet_id == pet_id {
                txn.delete_doc(collections::APPLICATIONS, application_id)?;
            }
        }

        txn.delete_doc(collections::CONDITIONS, pet.pet_condition_id)?;
        txn.delete_doc(collections::PETS, pet_id)?;
        Ok(())
    }

    /// Moves a pending application to approved or rejected (admin only).
    ///
    /// Approval flips the pet to Unavailable and creates the adoption record,
    /// exactly once per approved application; if the pet was deleted or is
    /// already Unavailable the transaction aborts and no adoption is created.
    /// Rejection re-opens a Pending pet to Available.
    pub fn update_application_status(
        &self,
        admin_id: u64,
        application_id: u64,
        status: ApplicationStatus,
    ) -> Result<Option<Adoption>, CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            self.require_admin(txn, admin_id)?;

            let mut application: Application = txn
                .get_doc_for_update(collections::APPLICATIONS, application_id)?
                .ok_or(DomainViolation::NotFound {
                    entity: "application",
                    id: application_id,
                })?;
            if application.status != ApplicationStatus::Pending {
                return Err(DomainViolation::ApplicationNotOpen(application_id).into());
            }

            match status {
                ApplicationStatus::Approved => {
                    let mut pet: Pet = txn
                        .get_doc_for_update(collections::PETS, application.pet_id)?
                        .ok_or(DomainViolation::NotFound {
                            entity: "pet",
                            id: application.pet_id,
                        })?;
                    if pet.adoption_status == AdoptionStatus::Unavailable {
                        return Err(DomainViolation::PetNotAvailable(application.pet_id).into());
                    }

                    pet.adoption_status = AdoptionStatus::Unavailable;
                    txn.put_doc(collections::PETS, application.pet_id, &pet)?;

                    application.status = ApplicationStatus::Approved;
                    txn.put_doc(collections::APPLICATIONS, application_id, &application)?;

                    let adoption_id = self.allocator.next(counters::ADOPTION_ID)?;
                    let adoption = Adoption {
                        adoption_id,
                        application_id,
                        pet_id: application.pet_id,
                        user_id: application.user_id,
                        adopted_at: Utc::now(),
                    };
                    txn.put_doc(collections::ADOPTIONS, adoption_id, &adoption)?;
                    Ok(Some(adoption))
                }
                ApplicationStatus::Rejected => {
                    application.status = ApplicationStatus::Rejected;
                    txn.put_doc(collections::APPLICATIONS, application_id, &application)?;

                    if let Some(mut pet) =
                        txn.get_doc_for_update::<Pet>(collections::PETS, application.pet_id)?
                    {
                        if pet.adoption_status == AdoptionStatus::Pending {
                            pet.adoption_status = AdoptionStatus::Available;
                            txn.put_doc(collections::PETS, application.pet_id, &pet)?;
                        }
                    }
                    Ok(None)
                }
                ApplicationStatus::Pending => {
                    Err(DomainViolation::InvalidStatusChange(application_id).into())
                }
            }
        })
    }

    /// Approves a pending application, returning the created adoption.
    pub fn approve_application(
        &self,
        admin_id: u64,
        application_id: u64,
    ) -> Result<Adoption, CoreError> {
        self.update_application_status(admin_id, application_id, ApplicationStatus::Approved)?
            .ok_or_else(|| CoreError::Storage("approval produced no adoption record".into()))
    }

    /// Changes a user's role (admin only). Escalating an adopter to admin is
    /// permitted and only logged, matching the upstream behavior.
    pub fn update_user_role(
        &self,
        admin_id: u64,
        user_id: u64,
        role: Role,
    ) -> Result<User, CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            self.require_admin(txn, admin_id)?;

            let mut user: User = txn
                .get_doc_for_update(collections::USERS, user_id)?
                .ok_or(DomainViolation::NotFound {
                    entity: "user",
                    id: user_id,
                })?;
            if user.role == Role::Adopter && role == Role::Admin {
                tracing::warn!(admin_id, user_id, "admin escalated an adopter to admin");
            }
            user.role = role;
            txn.put_doc(collections::USERS, user_id, &user)?;
            Ok(user)
        })
    }

    /// Deletes a user and their favourites and cart entries (admin only).
    /// Applications and adoptions are kept as history.
    pub fn delete_user(&self, admin_id: u64, user_id: u64) -> Result<(), CoreError> {
        self.coordinator.run_in_transaction(|txn| {
            self.require_admin(txn, admin_id)?;

            let user: User = txn
                .get_doc_for_update(collections::USERS, user_id)?
                .ok_or(DomainViolation::NotFound {
                    entity: "user",
                    id: user_id,
                })?;

            for (favourite_id, favourite) in txn.scan::<Favourite>(collections::FAVOURITES)? {
                if favourite.user_id == user_id {
                    txn.delete_doc(collections::FAVOURITES, favourite_id)?;
                    txn.delete_index(&fav_key(user_id, favourite.pet_id))?;
                }
            }
            for (cart_id, item) in txn.scan::<CartItem>(collections::CART)? {
                if item.user_id == user_id {
                    txn.delete_doc(collections::CART, cart_id)?;
                    txn.delete_index(&cart_key(user_id, item.pet_id))?;
                }
            }

            txn.delete_index(&uname_key(&user.username))?;
            txn.delete_doc(collections::USERS, user_id)?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Unguarded reads: one snapshot transaction, no guards, no retry.
    // ------------------------------------------------------------------

    pub fn get_user(&self, user_id: u64) -> Result<Option<User>, CoreError> {
        let txn = self.store.begin();
        txn.get_doc(collections::USERS, user_id)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let txn = self.store.begin();
        match txn.get_index(&uname_key(username))? {
            Some(user_id) => txn.get_doc(collections::USERS, user_id),
            None => Ok(None),
        }
    }

    /// Fetches a pet joined with its condition record.
    pub fn get_pet(&self, pet_id: u64) -> Result<Option<(Pet, Option<PetCondition>)>, CoreError> {
        let txn = self.store.begin();
        let Some(pet) = txn.get_doc::<Pet>(collections::PETS, pet_id)? else {
            return Ok(None);
        };
        let condition = txn.get_doc(collections::CONDITIONS, pet.pet_condition_id)?;
        Ok(Some((pet, condition)))
    }

    /// Lists every pet joined with its condition record.
    pub fn list_pets(&self) -> Result<Vec<(Pet, Option<PetCondition>)>, CoreError> {
        let txn = self.store.begin();
        let mut out = Vec::new();
        for (_, pet) in txn.scan::<Pet>(collections::PETS)? {
            let condition = txn.get_doc(collections::CONDITIONS, pet.pet_condition_id)?;
            out.push((pet, condition));
        }
        Ok(out)
    }

    pub fn favourites_for(&self, user_id: u64) -> Result<Vec<Favourite>, CoreError> {
        let txn = self.store.begin();
        Ok(txn
            .scan::<Favourite>(collections::FAVOURITES)?
            .into_iter()
            .map(|(_, favourite)| favourite)
            .filter(|favourite| favourite.user_id == user_id)
            .collect())
    }

    pub fn cart_for(&self, user_id: u64) -> Result<Vec<CartItem>, CoreError> {
        let txn = self.store.begin();
        Ok(txn
            .scan::<CartItem>(collections::CART)?
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| item.user_id == user_id)
            .collect())
    }

    pub fn get_application(&self, application_id: u64) -> Result<Option<Application>, CoreError> {
        let txn = self.store.begin();
        txn.get_doc(collections::APPLICATIONS, application_id)
    }

    pub fn list_applications(&self) -> Result<Vec<Application>, CoreError> {
        let txn = self.store.begin();
        Ok(txn
            .scan::<Application>(collections::APPLICATIONS)?
            .into_iter()
            .map(|(_, application)| application)
            .collect())
    }

    pub fn get_adoption(&self, adoption_id: u64) -> Result<Option<Adoption>, CoreError> {
        let txn = self.store.begin();
        txn.get_doc(collections::ADOPTIONS, adoption_id)
    }

    pub fn list_adoptions(&self) -> Result<Vec<Adoption>, CoreError> {
        let txn = self.store.begin();
        Ok(txn
            .scan::<Adoption>(collections::ADOPTIONS)?
            .into_iter()
            .map(|(_, adoption)| adoption)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::records::NewPetCondition;

    fn create_core() -> (AdoptionCore, TempDir) {
        let dir = TempDir::new().unwrap();
        let core = AdoptionCore::open_with_policy(
            dir.path(),
            RetryPolicy {
                max_retries: 3,
                delay_ms: 1,
            },
        )
        .unwrap();
        (core, dir)
    }

    fn sample_pet(name: &str) -> NewPet {
        NewPet {
            name: name.to_string(),
            species: "dog".to_string(),
            breed: "corgi".to_string(),
            gender: "female".to_string(),
            age_months: 18,
            description: "short legs, big opinions".to_string(),
            image: None,
            condition: NewPetCondition {
                weight_kg: 11.5,
                health: "healthy".to_string(),
                sterilised: true,
                adoption_fee: 120.0,
                vaccination_date: None,
                previous_owner: false,
            },
        }
    }

    fn seed(core: &AdoptionCore) -> (u64, u64) {
        let admin = core.seed_admin("admin", "hash").unwrap();
        let user = core.register("alice", "hash").unwrap();
        (admin.user_id, user.user_id)
    }

    #[test]
    fn register_assigns_sequential_ids_and_adopter_role() {
        let (core, _dir) = create_core();
        let first = core.register("alice", "h1").unwrap();
        let second = core.register("bob", "h2").unwrap();
        assert_eq!(first.user_id, 1);
        assert_eq!(second.user_id, 2);
        assert_eq!(first.role, Role::Adopter);

        let found = core.find_user_by_username("bob").unwrap().unwrap();
        assert_eq!(found.user_id, 2);
    }

    #[test]
    fn duplicate_username_is_a_domain_error() {
        let (core, _dir) = create_core();
        core.register("alice", "h1").unwrap();
        let err = core.register("alice", "h2").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::UsernameTaken(ref name)) if name == "alice"
        ));
        // The loser's allocation is discarded along with its insert.
        assert!(core.get_user(2).unwrap().is_none());
    }

    #[test]
    fn add_pet_requires_admin() {
        let (core, _dir) = create_core();
        let (_admin_id, user_id) = seed(&core);
        let err = core.add_pet(user_id, &sample_pet("rex")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotAdmin(id)) if id == user_id
        ));
        let err = core.add_pet(999, &sample_pet("rex")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotFound { entity: "user", id: 999 })
        ));
    }

    #[test]
    fn add_pet_creates_pet_and_condition_atomically() {
        let (core, _dir) = create_core();
        let (admin_id, _user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        assert_eq!(pet.pet_id, 1);
        assert_eq!(pet.adoption_status, AdoptionStatus::Available);

        let (fetched, condition) = core.get_pet(pet.pet_id).unwrap().unwrap();
        assert_eq!(fetched.name, "rex");
        assert!(condition.is_some());
    }

    #[test]
    fn favourites_and_cart_reject_duplicates() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();

        core.add_favourite(user_id, pet.pet_id).unwrap();
        let err = core.add_favourite(user_id, pet.pet_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::AlreadyFavourited { .. })
        ));

        core.add_to_cart(user_id, pet.pet_id).unwrap();
        let err = core.add_to_cart(user_id, pet.pet_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::AlreadyInCart { .. })
        ));

        // A different user may favourite the same pet.
        let other = core.register("bob", "h").unwrap();
        core.add_favourite(other.user_id, pet.pet_id).unwrap();
    }

    #[test]
    fn favouriting_a_missing_pet_fails() {
        let (core, _dir) = create_core();
        let (_admin_id, user_id) = seed(&core);
        let err = core.add_favourite(user_id, 42).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotFound { entity: "pet", id: 42 })
        ));
    }

    #[test]
    fn remove_from_cart_errors_on_missing_entry() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();

        let err = core.remove_from_cart(user_id, pet.pet_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotInCart { .. })
        ));

        core.add_to_cart(user_id, pet.pet_id).unwrap();
        core.remove_from_cart(user_id, pet.pet_id).unwrap();
        assert!(core.cart_for(user_id).unwrap().is_empty());
    }

    #[test]
    fn confirm_reservation_creates_application_and_clears_cart() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        core.add_to_cart(user_id, pet.pet_id).unwrap();

        let applications = core.confirm_reservation(user_id, &[pet.pet_id]).unwrap();
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0].status, ApplicationStatus::Pending);

        let (pet, _) = core.get_pet(pet.pet_id).unwrap().unwrap();
        assert_eq!(pet.adoption_status, AdoptionStatus::Pending);
        assert!(core.cart_for(user_id).unwrap().is_empty());
    }

    #[test]
    fn confirm_reservation_batch_is_all_or_nothing() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let first = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let second = core.add_pet(admin_id, &sample_pet("momo")).unwrap();

        // Another adopter reserves the second pet first.
        let rival = core.register("bob", "h").unwrap();
        core.confirm_reservation(rival.user_id, &[second.pet_id])
            .unwrap();

        let err = core
            .confirm_reservation(user_id, &[first.pet_id, second.pet_id])
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::PetNotAvailable(id)) if id == second.pet_id
        ));

        // The first pet was not touched and no application was created for it.
        let (first, _) = core.get_pet(first.pet_id).unwrap().unwrap();
        assert_eq!(first.adoption_status, AdoptionStatus::Available);
        assert_eq!(core.list_applications().unwrap().len(), 1);
    }

    #[test]
    fn empty_reservation_is_rejected() {
        let (core, _dir) = create_core();
        let (_admin_id, user_id) = seed(&core);
        let err = core.confirm_reservation(user_id, &[]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::EmptyReservation)
        ));
    }

    #[test]
    fn delete_pet_cascades_to_all_dependents() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let kept = core.add_pet(admin_id, &sample_pet("momo")).unwrap();

        core.add_favourite(user_id, pet.pet_id).unwrap();
        core.add_favourite(user_id, kept.pet_id).unwrap();
        core.add_to_cart(user_id, pet.pet_id).unwrap();
        let rival = core.register("bob", "h").unwrap();
        core.confirm_reservation(rival.user_id, &[pet.pet_id]).unwrap();

        core.delete_pet(admin_id, pet.pet_id).unwrap();

        assert!(core.get_pet(pet.pet_id).unwrap().is_none());
        assert!(core.list_applications().unwrap().is_empty());
        assert!(core.cart_for(user_id).unwrap().is_empty());
        let favourites = core.favourites_for(user_id).unwrap();
        assert_eq!(favourites.len(), 1);
        assert_eq!(favourites[0].pet_id, kept.pet_id);

        let err = core.add_favourite(user_id, pet.pet_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotFound { entity: "pet", .. })
        ));
    }

    #[test]
    fn delete_pet_on_missing_pet_is_not_silently_ignored() {
        let (core, _dir) = create_core();
        let (admin_id, _user_id) = seed(&core);
        let err = core.delete_pet(admin_id, 42).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotFound { entity: "pet", id: 42 })
        ));
    }

    #[test]
    fn failed_cascade_leaves_every_collection_untouched() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        core.add_favourite(user_id, pet.pet_id).unwrap();
        core.add_to_cart(user_id, pet.pet_id).unwrap();
        let rival = core.register("bob", "h").unwrap();
        core.confirm_reservation(rival.user_id, &[pet.pet_id]).unwrap();

        // Run the cascade but fail the transaction at the last step.
        let result: Result<(), CoreError> = core.coordinator.run_in_transaction(|txn| {
            core.delete_pet_in_txn(txn, admin_id, pet.pet_id)?;
            Err(CoreError::Storage("injected failure".into()))
        });
        assert!(matches!(result, Err(CoreError::Storage(_))));

        // None of the cascade deletes are visible.
        assert!(core.get_pet(pet.pet_id).unwrap().is_some());
        assert_eq!(core.favourites_for(user_id).unwrap().len(), 1);
        assert_eq!(core.cart_for(user_id).unwrap().len(), 1);
        assert_eq!(core.list_applications().unwrap().len(), 1);
    }

    #[test]
    fn approval_creates_exactly_one_adoption() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let applications = core.confirm_reservation(user_id, &[pet.pet_id]).unwrap();
        let application_id = applications[0].application_id;

        let adoption = core.approve_application(admin_id, application_id).unwrap();
        assert_eq!(adoption.pet_id, pet.pet_id);
        assert_eq!(adoption.user_id, user_id);

        let (pet, _) = core.get_pet(pet.pet_id).unwrap().unwrap();
        assert_eq!(pet.adoption_status, AdoptionStatus::Unavailable);
        let application = core.get_application(application_id).unwrap().unwrap();
        assert_eq!(application.status, ApplicationStatus::Approved);

        // A second approval attempt finds the application closed.
        let err = core.approve_application(admin_id, application_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::ApplicationNotOpen(id)) if id == application_id
        ));
        assert_eq!(core.list_adoptions().unwrap().len(), 1);
    }

    #[test]
    fn approval_after_pet_deletion_creates_no_adoption() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let applications = core.confirm_reservation(user_id, &[pet.pet_id]).unwrap();
        let application_id = applications[0].application_id;

        core.delete_pet(admin_id, pet.pet_id).unwrap();

        // The cascade removed the application; approval reports it missing
        // and leaves no adoption behind.
        let err = core.approve_application(admin_id, application_id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotFound { .. })
        ));
        assert!(core.list_adoptions().unwrap().is_empty());
    }

    #[test]
    fn rejection_reopens_the_pet() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let applications = core.confirm_reservation(user_id, &[pet.pet_id]).unwrap();

        let adoption = core
            .update_application_status(
                admin_id,
                applications[0].application_id,
                ApplicationStatus::Rejected,
            )
            .unwrap();
        assert!(adoption.is_none());

        let (pet, _) = core.get_pet(pet.pet_id).unwrap().unwrap();
        assert_eq!(pet.adoption_status, AdoptionStatus::Available);
    }

    #[test]
    fn status_cannot_be_moved_back_to_pending() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        let applications = core.confirm_reservation(user_id, &[pet.pet_id]).unwrap();

        let err = core
            .update_application_status(
                admin_id,
                applications[0].application_id,
                ApplicationStatus::Pending,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::InvalidStatusChange(_))
        ));
    }

    #[test]
    fn role_update_allows_logged_escalation() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);

        let updated = core.update_user_role(admin_id, user_id, Role::Admin).unwrap();
        assert_eq!(updated.role, Role::Admin);

        // A non-admin caller cannot change roles.
        let adopter = core.register("bob", "h").unwrap();
        let err = core
            .update_user_role(adopter.user_id, admin_id, Role::Adopter)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Domain(DomainViolation::NotAdmin(_))
        ));
    }

    #[test]
    fn delete_user_cascades_and_frees_the_username() {
        let (core, _dir) = create_core();
        let (admin_id, user_id) = seed(&core);
        let pet = core.add_pet(admin_id, &sample_pet("rex")).unwrap();
        core.add_favourite(user_id, pet.pet_id).unwrap();
        core.add_to_cart(user_id, pet.pet_id).unwrap();

        core.delete_user(admin_id, user_id).unwrap();

        assert!(core.get_user(user_id).unwrap().is_none());
        assert!(core.find_user_by_username("alice").unwrap().is_none());
        assert!(core.favourites_for(user_id).unwrap().is_empty());
        assert!(core.cart_for(user_id).unwrap().is_empty());

        // The username is free again, but the old id is not reused.
        let reborn = core.register("alice", "h").unwrap();
        assert!(reborn.user_id > user_id);
    }
}
