//! PII masking for audit snapshots and logs.

/// Replacement for any non-empty address.
pub const MASKED_ADDRESS: &str = "******";

/// Replacement for telephones too short to keep a visible suffix.
pub const MASKED_SHORT_TELEPHONE: &str = "****";

/// Mask an address completely.
///
/// ```
/// use clinic_common::masking::mask_address;
///
/// assert_eq!(mask_address("221B Baker Street"), "******");
/// assert_eq!(mask_address(""), "");
/// ```
#[must_use]
pub fn mask_address(address: &str) -> String {
    if address.is_empty() {
        String::new()
    } else {
        MASKED_ADDRESS.to_string()
    }
}

/// Mask a telephone number, keeping only its last four characters.
///
/// ```
/// use clinic_common::masking::mask_telephone;
///
/// assert_eq!(mask_telephone("5551234567"), "XXX-XXX-4567");
/// assert_eq!(mask_telephone("123"), "****");
/// ```
#[must_use]
pub fn mask_telephone(telephone: &str) -> String {
    let chars: Vec<char> = telephone.chars().collect();
    match chars.len() {
        0 => String::new(),
        1..=4 => MASKED_SHORT_TELEPHONE.to_string(),
        len => {
            let suffix: String = chars[len - 4..].iter().collect();
            format!("XXX-XXX-{suffix}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_address() {
        assert_eq!(mask_address("221B Baker Street"), "******");
        assert_eq!(mask_address("x"), "******");
        assert_eq!(mask_address(""), "");
    }

    #[test]
    fn test_mask_telephone() {
        assert_eq!(mask_telephone("5551234567"), "XXX-XXX-4567");
        assert_eq!(mask_telephone("12345"), "XXX-XXX-2345");
        assert_eq!(mask_telephone("1234"), "****");
        assert_eq!(mask_telephone(""), "");
    }

    #[test]
    fn test_mask_telephone_multibyte() {
        assert_eq!(mask_telephone("téléphone"), "XXX-XXX-hone");
    }
}
