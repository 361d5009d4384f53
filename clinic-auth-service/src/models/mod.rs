pub mod availability;
pub mod profile;
pub mod refresh_session;
pub mod review;
pub mod speciality;
pub mod user;
pub mod verification_token;

pub use availability::AvailabilitySlot;
pub use profile::{BloodType, ConsultantProfile, ConsultationType, Gender, PatientProfile, Profile};
pub use refresh_session::RefreshSession;
pub use review::{Review, ReviewResponse};
pub use speciality::Speciality;
pub use user::{normalize_email, NewUser, Role, User, UserResponse};
pub use verification_token::VerificationToken;
