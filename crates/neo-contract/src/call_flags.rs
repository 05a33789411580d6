//! Per-call capability masks.

use crate::error::ContractError;

/// What a frame may do. Calls can only narrow the mask, never widen it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallFlags(u8);

impl CallFlags {
    /// No capabilities.
    pub const NONE: CallFlags = CallFlags(0);
    /// May read contract storage.
    pub const READ_STATES: CallFlags = CallFlags(0x01);
    /// May write contract storage.
    pub const WRITE_STATES: CallFlags = CallFlags(0x02);
    /// May call other contracts.
    pub const ALLOW_CALL: CallFlags = CallFlags(0x04);
    /// May emit notifications.
    pub const ALLOW_NOTIFY: CallFlags = CallFlags(0x08);
    /// Read + write.
    pub const STATES: CallFlags = CallFlags(0x03);
    /// Read + call.
    pub const READ_ONLY: CallFlags = CallFlags(0x05);
    /// Everything.
    pub const ALL: CallFlags = CallFlags(0x0F);

    /// Validate and wrap a raw mask.
    pub fn from_bits(bits: u8) -> Result<Self, ContractError> {
        if bits & !Self::ALL.0 != 0 {
            return Err(ContractError::InvalidArgument(format!(
                "call flags {bits:#04x}"
            )));
        }
        Ok(Self(bits))
    }

    /// The raw mask.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// True when every flag in `required` is present.
    #[must_use]
    pub const fn has(&self, required: CallFlags) -> bool {
        self.0 & required.0 == required.0
    }

    /// Intersection; used when a call narrows its callee's rights.
    #[must_use]
    pub const fn intersect(&self, other: CallFlags) -> CallFlags {
        CallFlags(self.0 & other.0)
    }

    /// Fail unless `required` is fully present.
    pub fn require(&self, required: CallFlags) -> Result<(), ContractError> {
        if self.has(required) {
            Ok(())
        } else {
            Err(ContractError::MissingCallFlags {
                needed: required.0,
                have: self.0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        assert!(CallFlags::ALL.require(CallFlags::WRITE_STATES).is_ok());
        assert!(CallFlags::READ_ONLY.require(CallFlags::WRITE_STATES).is_err());
        assert!(CallFlags::NONE.require(CallFlags::NONE).is_ok());
    }

    #[test]
    fn test_intersect_narrows() {
        let narrowed = CallFlags::ALL.intersect(CallFlags::READ_ONLY);
        assert_eq!(narrowed, CallFlags::READ_ONLY);
        assert!(!narrowed.has(CallFlags::WRITE_STATES));
    }

    #[test]
    fn test_reject_unknown_bits() {
        assert!(CallFlags::from_bits(0x10).is_err());
        assert!(CallFlags::from_bits(0x0F).is_ok());
    }
}
