use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};

use crate::error::FieldError;

pub fn validate_registration(name: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !email.contains('@') {
        errors.push(FieldError {
            field: "email",
            message: "invalid email",
        });
    }

    if name.chars().count() <= 2 {
        errors.push(FieldError {
            field: "username",
            message: "username length must be greater than 2",
        });
    }

    // `@` is the email marker at sign-in, so usernames may not contain it.
    if name.contains('@') {
        errors.push(FieldError {
            field: "username",
            message: "username cannot include an @",
        });
    }

    if let Some(error) = validate_password(password) {
        errors.push(error);
    }

    errors
}

pub fn validate_password(password: &str) -> Option<FieldError> {
    if password.chars().count() <= 3 {
        Some(FieldError {
            field: "password",
            message: "password length must be greater than 3",
        })
    } else {
        None
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("password hashing failed: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Name/email collisions at registration surface as a field error, not a
/// store failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<diesel::result::Error>(),
        Some(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_reasonable_registration() {
        assert!(validate_registration("maksales", "maksales@example.com", "hunter2").is_empty());
    }

    #[test]
    fn rejects_bad_fields_one_by_one() {
        let errors = validate_registration("ab", "not-an-email", "abc");
        let fields: Vec<&str> = errors.iter().map(|error| error.field).collect();
        assert_eq!(fields, vec!["email", "username", "password"]);
    }

    #[test]
    fn rejects_at_sign_in_username() {
        let errors = validate_registration("maks@les", "maksales@example.com", "hunter2");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "username");
    }

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
        assert!(!verify_password("not a phc string", "hunter2"));
    }
}
