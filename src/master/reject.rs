//! Conditional-operation reject rules.
//!
//! A rule set travels with a write, read, or remove and is evaluated
//! against the current version of the object (or
//! `VERSION_NONEXISTENT`). The wire layout is fixed by the RPC format:
//! `given_version: u64` followed by four single-byte flags.

use crate::core::error::{StrataError, StrataResult};
use crate::storage::entry::VERSION_NONEXISTENT;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Serialized length of a rule set.
pub const REJECT_RULES_WIRE_LEN: usize = 12;

/// Independent gates evaluated against an object's current version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRules {
    /// Version operand for the two version gates.
    pub given_version: u64,
    /// Reject if the object does not exist.
    pub doesnt_exist: bool,
    /// Reject if the object exists.
    pub exists: bool,
    /// Reject if the current version is at or below `given_version`.
    pub version_le_given: bool,
    /// Reject if the current version differs from `given_version`.
    pub version_ne_given: bool,
}

impl RejectRules {
    /// Evaluate the rules against the current version.
    ///
    /// A nonexistent object only ever trips the doesnt-exist gate; the
    /// gates on existing objects are checked in declaration order and
    /// the first to fire wins. Errors carry the version the condition
    /// was evaluated against.
    pub fn evaluate(&self, current_version: u64) -> StrataResult<()> {
        if current_version == VERSION_NONEXISTENT {
            if self.doesnt_exist {
                return Err(StrataError::ObjectDoesntExist);
            }
            return Ok(());
        }
        if self.exists {
            return Err(StrataError::ObjectExists { current_version });
        }
        if self.version_le_given && current_version <= self.given_version {
            return Err(StrataError::WrongVersion { current_version });
        }
        if self.version_ne_given && current_version != self.given_version {
            return Err(StrataError::WrongVersion { current_version });
        }
        Ok(())
    }

    /// Serialize to the fixed wire layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REJECT_RULES_WIRE_LEN);
        buf.put_u64_le(self.given_version);
        buf.put_u8(self.doesnt_exist as u8);
        buf.put_u8(self.exists as u8);
        buf.put_u8(self.version_le_given as u8);
        buf.put_u8(self.version_ne_given as u8);
        buf.freeze()
    }

    /// Deserialize from the fixed wire layout.
    pub fn decode(mut raw: Bytes) -> StrataResult<Self> {
        if raw.len() != REJECT_RULES_WIRE_LEN {
            return Err(StrataError::CorruptEntry {
                reason: "reject rules have wrong length",
            });
        }
        Ok(Self {
            given_version: raw.get_u64_le(),
            doesnt_exist: raw.get_u8() != 0,
            exists: raw.get_u8() != 0,
            version_le_given: raw.get_u8() != 0,
            version_ne_given: raw.get_u8() != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rules_always_pass() {
        let rules = RejectRules::default();
        assert!(rules.evaluate(VERSION_NONEXISTENT).is_ok());
        assert!(rules.evaluate(5).is_ok());
    }

    #[test]
    fn test_doesnt_exist_gate() {
        let rules = RejectRules {
            doesnt_exist: true,
            ..Default::default()
        };
        assert!(matches!(
            rules.evaluate(VERSION_NONEXISTENT),
            Err(StrataError::ObjectDoesntExist)
        ));
        assert!(rules.evaluate(1).is_ok());
    }

    #[test]
    fn test_nonexistent_skips_other_gates() {
        let rules = RejectRules {
            exists: true,
            version_le_given: true,
            version_ne_given: true,
            given_version: 100,
            ..Default::default()
        };
        assert!(rules.evaluate(VERSION_NONEXISTENT).is_ok());
    }

    #[test]
    fn test_exists_gate() {
        let rules = RejectRules {
            exists: true,
            ..Default::default()
        };
        assert!(matches!(
            rules.evaluate(3),
            Err(StrataError::ObjectExists { current_version: 3 })
        ));
    }

    #[test]
    fn test_version_le_gate() {
        let rules = RejectRules {
            version_le_given: true,
            given_version: 5,
            ..Default::default()
        };
        assert!(matches!(
            rules.evaluate(5),
            Err(StrataError::WrongVersion { current_version: 5 })
        ));
        assert!(matches!(rules.evaluate(4), Err(StrataError::WrongVersion { .. })));
        assert!(rules.evaluate(6).is_ok());
    }

    #[test]
    fn test_version_ne_gate() {
        let rules = RejectRules {
            version_ne_given: true,
            given_version: 9,
            ..Default::default()
        };
        assert!(matches!(
            rules.evaluate(1),
            Err(StrataError::WrongVersion { current_version: 1 })
        ));
        assert!(rules.evaluate(9).is_ok());
    }

    #[test]
    fn test_wire_roundtrip() {
        let rules = RejectRules {
            given_version: 0xdead_beef,
            doesnt_exist: false,
            exists: true,
            version_le_given: false,
            version_ne_given: true,
        };
        let decoded = RejectRules::decode(rules.encode()).unwrap();
        assert_eq!(decoded, rules);
        assert!(RejectRules::decode(Bytes::from_static(&[0u8; 4])).is_err());
    }
}
