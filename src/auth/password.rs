use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tracing::error;

use crate::config::PasswordConfig;

/// Argon2id hashing with a per-call random salt embedded in the PHC output.
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    // Verified against when a login names an unknown email, so both failure
    // paths pay for one argon2 run.
    decoy_hash: String,
}

impl Passwords {
    pub fn new(cfg: PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let decoy: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let decoy_hash = hash_with(&argon2, &decoy)?;

        Ok(Self { argon2, decoy_hash })
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        hash_with(&self.argon2, plain)
    }

    /// Returns `Ok(false)` on mismatch; only an unparsable stored hash is an
    /// error. The digest comparison inside argon2 is constant time.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn decoy_hash(&self) -> &str {
        &self.decoy_hash
    }
}

fn hash_with(argon2: &Argon2<'_>, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
pub(crate) fn cheap() -> Passwords {
    Passwords::new(PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap argon2 params are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let passwords = cheap();
        let password = "Secur3P@ssw0rd!";
        let hash = passwords.hash(password).expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let passwords = cheap();
        let hash = passwords
            .hash("correct-horse-battery-staple")
            .expect("hashing should succeed");
        assert!(!passwords
            .verify("wrong-password", &hash)
            .expect("verify should not error"));
    }

    #[test]
    fn salts_differ_between_calls() {
        let passwords = cheap();
        let a = passwords.hash("same").unwrap();
        let b = passwords.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(passwords.verify("same", &a).unwrap());
        assert!(passwords.verify("same", &b).unwrap());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = cheap().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn decoy_hash_is_a_valid_hash_that_matches_nothing_guessable() {
        let passwords = cheap();
        assert!(!passwords.verify("", passwords.decoy_hash()).unwrap());
        assert!(!passwords.verify("password", passwords.decoy_hash()).unwrap());
    }
}
