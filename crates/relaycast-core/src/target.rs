//! Recipient addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::ConfigError;

/// Address suffix for individual contacts.
pub const CONTACT_SUFFIX: &str = "@s.whatsapp.net";

/// Address suffix for groups.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Kind of recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A single contact, addressed by phone number.
    Contact,
    /// A group chat the account participates in.
    Group,
}

/// An addressable recipient. Immutable once a run is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    kind: TargetKind,
    address: String,
}

impl Target {
    /// Build a contact target from a phone number.
    ///
    /// A leading `+` and embedded spaces or dashes are tolerated.
    ///
    /// # Errors
    /// Returns error if anything other than digits remains.
    pub fn contact(phone_number: &str) -> Result<Self, ConfigError> {
        let digits: String = phone_number
            .trim()
            .trim_start_matches('+')
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidTarget(phone_number.to_string()));
        }

        Ok(Self {
            kind: TargetKind::Contact,
            address: format!("{digits}{CONTACT_SUFFIX}"),
        })
    }

    /// Build a group target from a full group address.
    ///
    /// # Errors
    /// Returns error if the address is not a group address.
    pub fn group(address: &str) -> Result<Self, ConfigError> {
        let address = address.trim();
        let id = address.strip_suffix(GROUP_SUFFIX).unwrap_or_default();
        if id.is_empty() {
            return Err(ConfigError::InvalidTarget(address.to_string()));
        }

        Ok(Self {
            kind: TargetKind::Group,
            address: address.to_string(),
        })
    }

    /// The recipient kind.
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    /// The wire address of this recipient.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Group directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Full group address.
    pub id: String,
    /// Human-readable group name.
    pub subject: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_normalizes_number() {
        let target = Target::contact(" +40 748-427-351 ").unwrap();
        assert_eq!(target.address(), "40748427351@s.whatsapp.net");
        assert_eq!(target.kind(), TargetKind::Contact);
    }

    #[test]
    fn test_contact_rejects_letters() {
        assert!(matches!(
            Target::contact("40abc"),
            Err(ConfigError::InvalidTarget(_))
        ));
        assert!(Target::contact("+").is_err());
    }

    #[test]
    fn test_group_requires_suffix() {
        let target = Target::group("1234567890-123456@g.us").unwrap();
        assert_eq!(target.kind(), TargetKind::Group);
        assert_eq!(target.to_string(), "1234567890-123456@g.us");

        assert!(Target::group("1234567890-123456").is_err());
        assert!(Target::group("@g.us").is_err());
    }

    #[test]
    fn test_targets_dedupe_by_normalized_address() {
        let targets: std::collections::HashSet<Target> = [
            Target::contact("40748427351").unwrap(),
            Target::contact("+40 748 427 351").unwrap(),
            Target::group("1234567890-123456@g.us").unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(targets.len(), 2);
    }
}
