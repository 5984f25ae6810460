//! Withdrawal phases.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalPhase {
    L2Pending,
    L2Included,
    L2Failed,
    ReadyToFinalize,
    Finalized,
}

impl WithdrawalPhase {
    pub fn rank(&self) -> u8 {
        match self {
            WithdrawalPhase::L2Pending => 0,
            WithdrawalPhase::L2Included | WithdrawalPhase::L2Failed => 1,
            WithdrawalPhase::ReadyToFinalize => 2,
            WithdrawalPhase::Finalized => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalPhase::L2Failed | WithdrawalPhase::Finalized)
    }

    pub fn clamp(self, last: Option<WithdrawalPhase>) -> WithdrawalPhase {
        match last {
            Some(last) if last.rank() > self.rank() => last,
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_later_phase() {
        use WithdrawalPhase::*;
        assert_eq!(L2Included.clamp(Some(ReadyToFinalize)), ReadyToFinalize);
        assert_eq!(Finalized.clamp(Some(ReadyToFinalize)), Finalized);
        assert_eq!(L2Pending.clamp(None), L2Pending);
    }
}
