use crate::error::{PerceptionError, PerceptionResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// The maximum number of distinct agent types.
const MAX_AGENT_TYPES: u8 = 32;

/// A tag identifying a class of agents (car, truck, bus, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentType(u8);

/// A set of agent types, stored as a bit mask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentTypeSet(u32);

impl AgentType {
    /// Creates an agent type from its index, which must be less than 32.
    pub fn new(index: u8) -> PerceptionResult<Self> {
        if index >= MAX_AGENT_TYPES {
            return Err(PerceptionError::TooManyAgentTypes(index));
        }
        Ok(Self(index))
    }

    /// The index of the agent type.
    pub fn index(&self) -> u8 {
        self.0
    }

    fn bit(&self) -> u32 {
        1 << self.0
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent type {}", self.0)
    }
}

impl AgentTypeSet {
    /// The set containing every agent type.
    pub const ALL: Self = Self(u32::MAX);

    /// The empty set.
    pub const NONE: Self = Self(0);

    /// Creates a set from the given agent types.
    pub fn of(types: &[AgentType]) -> Self {
        Self(types.iter().fold(0, |mask, ty| mask | ty.bit()))
    }

    /// Whether the set contains the agent type.
    pub fn contains(&self, agent: AgentType) -> bool {
        self.0 & agent.bit() != 0
    }

    /// Returns a copy of the set with the agent type added.
    pub fn with(self, agent: AgentType) -> Self {
        Self(self.0 | agent.bit())
    }

    /// Returns a copy of the set with the agent type removed.
    pub fn without(self, agent: AgentType) -> Self {
        Self(self.0 & !agent.bit())
    }

    /// Whether the set contains no agent types.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for AgentTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentTypeSet({:#034b})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_membership() {
        let car = AgentType::new(0).unwrap();
        let truck = AgentType::new(5).unwrap();
        let set = AgentTypeSet::of(&[car]);
        assert!(set.contains(car));
        assert!(!set.contains(truck));
        assert!(set.with(truck).contains(truck));
        assert!(!AgentTypeSet::ALL.without(car).contains(car));
        assert!(AgentTypeSet::NONE.is_empty());
    }

    #[test]
    fn rejects_large_index() {
        assert!(AgentType::new(31).is_ok());
        assert!(matches!(
            AgentType::new(32),
            Err(PerceptionError::TooManyAgentTypes(32))
        ));
    }
}
