//! Profile Provisioner: the post-creation step that gives each new user the
//! profile matching its role. It runs once, inside `CredentialStore`'s create
//! path, and its output is persisted in the same transaction as the user.

use crate::models::{Profile, User};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileProvisioner;

impl ProfileProvisioner {
    /// Patients get an empty patient profile, consultants an empty consultant
    /// profile, admins nothing.
    pub fn profile_for(&self, user: &User) -> Option<Profile> {
        let profile = Profile::for_user(user);
        match &profile {
            Some(p) => tracing::debug!(user_id = %p.user_id(), role = %user.role, "Provisioning profile"),
            None => tracing::debug!(user_id = %user.id, role = %user.role, "Role has no profile"),
        }
        profile
    }
}
