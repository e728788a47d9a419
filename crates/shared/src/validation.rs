//! Common validation utilities.

use validator::ValidationError;

/// Country calling code assumed for bare 10-digit numbers.
const DEFAULT_COUNTRY_CODE: &str = "1";

/// Normalizes a phone number to international dialing format.
///
/// Best effort: an already `+`-prefixed number keeps its digits; a bare
/// 10-digit number is assumed to be in the default country; an 11-digit
/// number starting with the default country code gets a `+`. Anything else
/// is prefixed with `+` as-is. Returns `None` when there are no digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if trimmed.starts_with('+') {
        return Some(format!("+{}", digits));
    }

    match digits.len() {
        10 => Some(format!("+{}{}", DEFAULT_COUNTRY_CODE, digits)),
        11 if digits.starts_with(DEFAULT_COUNTRY_CODE) => Some(format!("+{}", digits)),
        _ => Some(format!("+{}", digits)),
    }
}

/// Validates that a phone number has between 7 and 15 digits.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if (7..=15).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must contain 7 to 15 digits".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ten_digits_assumes_country_code() {
        assert_eq!(normalize_phone("5551234567").as_deref(), Some("+15551234567"));
        assert_eq!(
            normalize_phone("(555) 123-4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn test_normalize_prefixed_passes_through() {
        assert_eq!(
            normalize_phone("+44 20 7946 0958").as_deref(),
            Some("+442079460958")
        );
        assert_eq!(normalize_phone("+15551234567").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn test_normalize_eleven_digits_with_country_code() {
        assert_eq!(normalize_phone("1-555-123-4567").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn test_normalize_other_lengths() {
        assert_eq!(normalize_phone("4930123456789").as_deref(), Some("+4930123456789"));
    }

    #[test]
    fn test_normalize_no_digits() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("call me"), None);
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("555-123-4567").is_ok());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone(&"9".repeat(16)).is_err());
    }
}
