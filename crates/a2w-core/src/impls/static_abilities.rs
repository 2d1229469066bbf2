//! StaticAbilities - a fixed ability list, usually read from configuration.

use crate::ports::{Ability, AbilityRegistry};

#[derive(Debug, Clone, Default)]
pub struct StaticAbilities {
    abilities: Vec<Ability>,
}

impl StaticAbilities {
    pub fn new(abilities: Vec<Ability>) -> Self {
        Self { abilities }
    }
}

impl AbilityRegistry for StaticAbilities {
    fn abilities(&self) -> Vec<Ability> {
        self.abilities.clone()
    }
}
