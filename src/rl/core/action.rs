//! Action Space
//!
//! The closed set of discrete trading decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DqnError;

/// Number of discrete actions
pub const NUM_DISCRETE_ACTIONS: usize = 3;

/// Discrete action space for the DQN agent.
///
/// Indices match the Q-network output slots: 0 = Buy, 1 = Sell, 2 = Hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiscreteAction {
    /// Buy one share
    Buy = 0,
    /// Sell one share
    Sell = 1,
    /// Do nothing
    Hold = 2,
}

impl DiscreteAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Buy),
            1 => Some(Self::Sell),
            2 => Some(Self::Hold),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions, in index order
    pub fn all() -> &'static [DiscreteAction] {
        &[Self::Buy, Self::Sell, Self::Hold]
    }
}

impl TryFrom<usize> for DiscreteAction {
    type Error = DqnError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(DqnError::InvalidAction(index))
    }
}

impl fmt::Display for DiscreteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_action_conversion() {
        for action in DiscreteAction::all() {
            let idx = action.to_index();
            let recovered = DiscreteAction::from_index(idx).unwrap();
            assert_eq!(*action, recovered);
        }
        assert_eq!(DiscreteAction::all().len(), NUM_DISCRETE_ACTIONS);
    }

    #[test]
    fn test_index_layout() {
        assert_eq!(DiscreteAction::try_from(0).unwrap(), DiscreteAction::Buy);
        assert_eq!(DiscreteAction::try_from(1).unwrap(), DiscreteAction::Sell);
        assert_eq!(DiscreteAction::try_from(2).unwrap(), DiscreteAction::Hold);
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        // Never silently mapped to Hold
        let err = DiscreteAction::try_from(3).unwrap_err();
        assert!(matches!(err, DqnError::InvalidAction(3)));
    }
}
