//! Entity lifecycle values reported by the controller.

use serde::{Deserialize, Serialize};

/// Lifecycle of a unit, application, or relation.
///
/// Transitions are monotone: `Alive` -> `Dying` -> `Dead`, never backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    #[default]
    Alive,
    Dying,
    Dead,
}

impl Life {
    /// Whether the monotone lifecycle ordering permits moving to `next`.
    #[must_use]
    pub fn can_become(self, next: Self) -> bool {
        self.rank() <= next.rank()
    }

    #[must_use]
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Alive => 0,
            Self::Dying => 1,
            Self::Dead => 2,
        }
    }
}

impl std::fmt::Display for Life {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Dying => write!(f, "dying"),
            Self::Dead => write!(f, "dead"),
        }
    }
}
