mod auth;
mod pets;
mod tutores;

pub use auth::{AuthService, Credentials};
pub use pets::{CreatePet, Foto, Pet, PetCompleto, PetFilters, PetsService, UpdatePet};
pub use tutores::{
    CreateTutor, Tutor, TutorCompleto, TutorFilters, TutoresService, UpdateTutor,
};
