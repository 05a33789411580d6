//! Execution triggers.

/// Why a script is running. Exposed to scripts and gating the syscall
/// surface: state writes only under `OnPersist` / `PostPersist` /
/// `Application`, witness checks restricted under `Verification`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerType {
    /// Before a block's transactions execute.
    OnPersist = 0x01,
    /// After a block's transactions execute.
    PostPersist = 0x02,
    /// A witness verification script.
    Verification = 0x20,
    /// A transaction's entry script.
    Application = 0x40,
}

impl TriggerType {
    /// True for the two persistence triggers.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, TriggerType::OnPersist | TriggerType::PostPersist)
    }
}
