use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Newtype for a raw password; `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Password hashing capability. Implementations salt every hash.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error>;

    /// Constant-time check; false for a mismatch or an unparseable hash.
    fn verify(&self, password: &Password, hash: &PasswordHashString) -> bool;
}

/// Argon2id hasher producing PHC strings.
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Memory cost in KiB, iterations, lanes.
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, anyhow::Error> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    fn verify(&self, password: &Password, hash: &PasswordHashString) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash.as_str()) else {
            tracing::warn!("Stored password hash is not a valid PHC string");
            return false;
        };
        // Parameters are read from the PHC string, so hashes made with other
        // costs still verify.
        self.argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        Argon2Hasher::with_cost(8, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(!hash.as_str().contains("mySecurePassword123"));
    }

    #[test]
    fn test_verify_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hasher().verify(&password, &hash));
        assert!(!hasher().verify(&Password::new("wrongPassword".to_string()), &hash));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hasher().hash(&password).unwrap();
        let hash2 = hasher().hash(&password).unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
    }

    #[test]
    fn test_hash_from_other_cost_still_verifies() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = Argon2Hasher::with_cost(16, 2, 1).unwrap().hash(&password).unwrap();
        assert!(hasher().verify(&password, &hash));
    }

    #[test]
    fn test_garbage_hash_does_not_verify() {
        let password = Password::new("pw".to_string());
        assert!(!hasher().verify(&password, &PasswordHashString::new("not-a-hash".into())));
    }

    #[test]
    fn test_debug_redacts_password() {
        let password = Password::new("hunter2".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }
}
