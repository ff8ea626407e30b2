//! One-way password verifiers.
//!
//! The store only ever sees the opaque string returned by
//! [`PasswordVerifier::hash`]; the plaintext never leaves the request.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::PASSWORD_SALT_SIZE;
use crate::error::AccessError;

/// Pluggable one-way verifier.
pub trait PasswordVerifier: Send + Sync {
    /// Produce a stored verifier for `password`.
    fn hash(&self, password: &str) -> Result<String, AccessError>;

    /// Check `password` against a stored verifier. Unknown formats fail.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Argon2id verifier storing PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
///
/// Verification reads the cost parameters from the stored string, so hashes
/// made under older parameters keep working after the defaults change.
#[derive(Clone)]
pub struct Argon2Verifier {
    argon2: Argon2<'static>,
}

impl Argon2Verifier {
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Memory cost in KiB and iteration count, single lane.
    pub fn with_cost(m_cost_kib: u32, t_cost: u32) -> Result<Self, AccessError> {
        let params = Params::new(m_cost_kib, t_cost, 1, None)
            .map_err(|e| AccessError::Hashing(e.to_string()))?;
        Ok(Self::new(params))
    }
}

impl Default for Argon2Verifier {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl std::fmt::Debug for Argon2Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Verifier").finish_non_exhaustive()
    }
}

impl PasswordVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<String, AccessError> {
        let mut salt = [0u8; PASSWORD_SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| AccessError::Hashing(e.to_string()))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccessError::Hashing(e.to_string()))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> Argon2Verifier {
        Argon2Verifier::with_cost(Params::MIN_M_COST, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let v = verifier();
        let stored = v.hash("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(v.verify("hunter2", &stored));
        assert!(!v.verify("hunter3", &stored));
    }

    #[test]
    fn salts_differ() {
        let v = verifier();
        assert_ne!(v.hash("same").unwrap(), v.hash("same").unwrap());
    }

    #[test]
    fn cost_is_read_from_the_stored_hash() {
        let cheap = verifier().hash("pw").unwrap();
        let stronger = Argon2Verifier::with_cost(Params::MIN_M_COST * 2, 2).unwrap();
        assert!(stronger.verify("pw", &cheap));
    }

    #[test]
    fn rejects_unknown_formats() {
        let v = verifier();
        assert!(!v.verify("x", ""));
        assert!(!v.verify("x", "plaintext"));
        assert!(!v.verify("x", "b3$00$00"));
        assert!(!v.verify("x", "$argon2id$v=19$m=8,t=1,p=1$zz$zz"));
    }

    #[test]
    fn invalid_cost_is_an_error() {
        assert!(matches!(
            Argon2Verifier::with_cost(0, 0),
            Err(AccessError::Hashing(_))
        ));
    }
}
