//! Business logic of the clinic auth service.
//!
//! The authentication and email-verification core is split into the
//! credential store, the verification ledger, the verification service, the
//! profile provisioner and the authentication service. Profiles, reviews and
//! availability build on the same repository.

pub mod auth;
pub mod cache;
pub mod credentials;
pub mod email;
pub mod error;
pub mod jwt;
pub mod ledger;
pub mod profiles;
pub mod provisioner;
pub mod reviews;
pub mod schedule;
pub mod verification;

pub use auth::{AuthService, AuthSession, RefreshedAccess, Registration};
pub use cache::{CacheStore, MockCache, PresenceEntry, RedisService};
pub use credentials::{CredentialStore, NewAccount};
pub use email::{MockNotifier, Notifier, SmtpNotifier};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenError};
pub use ledger::VerificationLedger;
pub use profiles::ProfileService;
pub use provisioner::ProfileProvisioner;
pub use reviews::ReviewService;
pub use schedule::ScheduleService;
pub use verification::{EmailVerificationService, ResendOutcome, ResendPolicy};
