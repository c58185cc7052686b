//! Passwort-Hashing mit Argon2id
//!
//! Dieselben Funktionen hashen auch Verifizierungscodes, damit weder
//! Passwoerter noch Codes im Klartext in der Datenbank landen.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use rand::RngCore;

use crate::error::{AuthError, AuthResult};

/// Argon2id mit 64 MiB Speicher, 3 Iterationen, 1 Thread
fn argon2_instanz() -> AuthResult<Argon2<'static>> {
    let params = Params::new(64 * 1024, 3, 1, None)
        .map_err(|e| AuthError::PasswortHashing(format!("Argon2-Parameter ungueltig: {e}")))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hasht ein Passwort mit Argon2id und einem zufaelligen Salt
///
/// Gibt den PHC-String zurueck (inkl. Algorithmus, Parameter und Salt).
pub fn passwort_hashen(passwort: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    argon2_instanz()?
        .hash_password(passwort.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswortHashing(e.to_string()))
}

/// Verifiziert ein Passwort gegen einen gespeicherten PHC-Hash
///
/// Der Vergleich erfolgt in konstanter Zeit.
pub fn passwort_verifizieren(passwort: &str, hash: &str) -> AuthResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::PasswortHashing(format!("Ungueltiges Hash-Format: {e}")))?;

    match argon2_instanz()?.verify_password(passwort.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::PasswortHashing(e.to_string())),
    }
}

/// Prueft ein neues Passwort gegen die Mindestanforderungen
pub fn passwort_richtlinie_pruefen(passwort: &str, min_laenge: usize) -> AuthResult<()> {
    if passwort.trim().is_empty() {
        return Err(AuthError::validierung("password", "Passwort darf nicht leer sein"));
    }
    if passwort.chars().count() < min_laenge {
        return Err(AuthError::validierung(
            "password",
            format!("Passwort muss mindestens {min_laenge} Zeichen lang sein"),
        ));
    }
    Ok(())
}

/// Erzeugt einen kryptografisch zufaelligen, URL-sicheren Code (32 Byte)
pub fn zufalls_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
