//! Status classification policy.
//!
//! The only place response status strings are interpreted. Matching is
//! case-insensitive against exactly three values; everything else,
//! including an absent status, is [`RegistrationStatus::Unrecognized`].

/// Classified operation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Device is assigned; the attempt succeeded.
    Assigned,
    /// Service is still working; poll again.
    Assigning,
    /// Service rejected the registration.
    Failed,
    /// Missing or unsupported status value.
    Unrecognized(Option<String>),
}

impl RegistrationStatus {
    /// Classify a raw status string.
    pub fn classify(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.eq_ignore_ascii_case("assigned") => Self::Assigned,
            Some(s) if s.eq_ignore_ascii_case("assigning") => Self::Assigning,
            Some(s) if s.eq_ignore_ascii_case("failed") => Self::Failed,
            other => Self::Unrecognized(other.map(str::to_owned)),
        }
    }

    /// Returns true if no further polling will happen for this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Assigning)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(RegistrationStatus::classify(Some("assigned")), RegistrationStatus::Assigned);
        assert_eq!(RegistrationStatus::classify(Some("ASSIGNING")), RegistrationStatus::Assigning);
        assert_eq!(RegistrationStatus::classify(Some("Failed")), RegistrationStatus::Failed);
    }

    #[test]
    fn missing_status_is_unrecognized() {
        assert_eq!(RegistrationStatus::classify(None), RegistrationStatus::Unrecognized(None));
    }

    #[test]
    fn unknown_status_keeps_raw_value() {
        assert_eq!(
            RegistrationStatus::classify(Some("disabled")),
            RegistrationStatus::Unrecognized(Some("disabled".to_string()))
        );
    }

    #[test]
    fn only_assigning_continues() {
        assert!(!RegistrationStatus::Assigning.is_terminal());
        assert!(RegistrationStatus::Assigned.is_terminal());
        assert!(RegistrationStatus::Failed.is_terminal());
        assert!(RegistrationStatus::Unrecognized(None).is_terminal());
    }

    /// Flip the case of each ASCII letter according to `mask`.
    fn mix_case(word: &str, mask: u16) -> String {
        word.chars()
            .enumerate()
            .map(|(i, c)| if mask & (1 << (i % 16)) != 0 { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_classification_ignores_case(mask in any::<u16>()) {
            prop_assert_eq!(
                RegistrationStatus::classify(Some(&mix_case("assigned", mask))),
                RegistrationStatus::Assigned
            );
            prop_assert_eq!(
                RegistrationStatus::classify(Some(&mix_case("assigning", mask))),
                RegistrationStatus::Assigning
            );
            prop_assert_eq!(
                RegistrationStatus::classify(Some(&mix_case("failed", mask))),
                RegistrationStatus::Failed
            );
        }

        #[test]
        fn prop_other_strings_are_unrecognized(status in "[a-z]{0,12}") {
            prop_assume!(!["assigned", "assigning", "failed"].contains(&status.as_str()));
            prop_assert_eq!(
                RegistrationStatus::classify(Some(&status)),
                RegistrationStatus::Unrecognized(Some(status.clone()))
            );
        }
    }
}
