//! Meeting join codes
//!
//! Codes are drawn from a 32 symbol alphabet with the easily confused
//! characters `0 O 1 I` removed. 32 is a power of two, so masking a random
//! byte down to five bits selects every symbol with equal probability.

use rand::rngs::OsRng;
use rand::RngCore;

/// Unambiguous code alphabet (no 0, O, 1 or I)
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default join code length
pub const CODE_LENGTH: usize = 6;

const ALPHABET_MASK: u8 = (CODE_ALPHABET.len() - 1) as u8;

/// Generate `len` characters from [`CODE_ALPHABET`] using the operating
/// system's CSPRNG.
pub fn generate_secure_random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .into_iter()
        .map(|b| CODE_ALPHABET[(b & ALPHABET_MASK) as usize] as char)
        .collect()
}

/// Generate a fresh meeting code of the default length
pub fn generate_meeting_code() -> String {
    generate_secure_random_string(CODE_LENGTH)
}

/// Check the shape of a user-typed code.
///
/// Accepts the full `[A-Za-z0-9]{6}` range, not just the generator
/// alphabet, so older hand-entered codes still validate.
pub fn is_valid_meeting_code_format(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Canonical (uppercase, trimmed) form used for storage and lookup
pub fn normalize_meeting_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_code_uses_alphabet() {
        for _ in 0..200 {
            let code = generate_secure_random_string(6);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(is_valid_meeting_code_format(&code));
        }
    }

    #[test]
    fn test_zero_length_is_empty() {
        assert_eq!(generate_secure_random_string(0), "");
    }

    #[test]
    fn test_codes_are_mostly_unique() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_meeting_code()).collect();
        assert!(codes.len() >= 990, "only {} unique codes", codes.len());
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_code_format_validation() {
        assert!(is_valid_meeting_code_format("abc123"));
        assert!(is_valid_meeting_code_format("ABC123"));
        assert!(!is_valid_meeting_code_format("ABC12"));
        assert!(!is_valid_meeting_code_format("ABC1234"));
        assert!(!is_valid_meeting_code_format("ABC-12"));
        assert!(!is_valid_meeting_code_format(""));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_meeting_code(" abc123 "), "ABC123");
    }
}
