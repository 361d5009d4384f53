pub mod registration;
pub mod session;
pub mod verification;

pub use registration::register;
pub use session::{login, logout, profile, refresh, validate_token};
pub use verification::{resend_verification, send_verification, verify_email};
