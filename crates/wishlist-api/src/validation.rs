use crate::error::ApiError;

pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_LOGIN_LEN: usize = 3;
pub const MAX_LOGIN_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Trim and lowercase an email, rejecting anything without exactly one `@`
/// between non-empty parts.
pub fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("invalid email"));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(ApiError::bad_request("invalid email")),
    }
}

pub fn normalize_login(raw: &str) -> Result<String, ApiError> {
    let login = raw.trim();
    let len = login.chars().count();
    if !(MIN_LOGIN_LEN..=MAX_LOGIN_LEN).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "login must be {MIN_LOGIN_LEN}-{MAX_LOGIN_LEN} characters"
        )));
    }
    if !login
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::bad_request(
            "login may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(login.to_string())
}

pub fn check_password(raw: &str) -> Result<(), ApiError> {
    let len = raw.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Character-count bounds for a free-text field.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::bad_request(format!(
            "{field} must be {min}-{max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  Ann@Example.COM ").unwrap(), "ann@example.com");
    }

    #[test]
    fn bad_emails_are_rejected() {
        for bad in ["", "ann", "@example.com", "ann@", "a@b@c", "an n@example.com"] {
            assert!(normalize_email(bad).is_err(), "{bad:?} should fail");
        }
        let long = format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN));
        assert!(normalize_email(&long).is_err());
    }

    #[test]
    fn login_rules() {
        assert_eq!(normalize_login(" ann.b-c_1 ").unwrap(), "ann.b-c_1");
        assert!(normalize_login("an").is_err());
        assert!(normalize_login(&"a".repeat(MAX_LOGIN_LEN + 1)).is_err());
        assert!(normalize_login("ann smith").is_err());
        assert!(normalize_login("ann@x").is_err());
    }

    #[test]
    fn password_length_counts_chars() {
        assert!(check_password("short").is_err());
        assert!(check_password("long enough").is_ok());
        assert!(check_password("ééééééé").is_err());
        assert!(check_password(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(check_length("title", "a", 1, 3).is_ok());
        assert!(check_length("title", "abc", 1, 3).is_ok());
        assert!(check_length("title", "", 1, 3).is_err());
        assert!(check_length("title", "abcd", 1, 3).is_err());
    }
}
