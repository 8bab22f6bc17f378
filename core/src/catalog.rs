//! Blueprint resolution: filter pattern + generation constraint.

use crate::{
    environment::{Blueprint, SimulationEnvironment},
    error::{ScenarioError, ScenarioResult},
};
use std::str::FromStr;

/// Attribute carrying a blueprint's model generation.
pub const GENERATION_ATTRIBUTE: &str = "generation";

/// Generation constraint applied after the filter pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    All,
    Only(u8),
}

impl FromStr for Generation {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.trim().parse::<u8>() {
            Ok(g @ 1..=3) => Ok(Self::Only(g)),
            _ => Err(ScenarioError::invalid_enum("actor generation", s)),
        }
    }
}

pub struct ActorCatalog;

impl ActorCatalog {
    /// Resolve `pattern` and `generation` into a non-empty candidate set.
    ///
    /// A pattern matching exactly one blueprint ignores the generation.
    /// An unrecognised generation yields no candidates.
    pub fn resolve<E: SimulationEnvironment + ?Sized>(
        env: &E,
        pattern: &str,
        generation: &str,
    ) -> ScenarioResult<Vec<Blueprint>> {
        let candidates = env.filter_blueprints(pattern)?;
        let resolved = Self::apply_generation(candidates, generation);
        if resolved.is_empty() {
            return Err(ScenarioError::configuration(
                pattern,
                format!("no blueprints match generation \"{generation}\""),
            ));
        }
        log::debug!(
            "catalog: pattern={pattern} generation={generation} candidates={}",
            resolved.len()
        );
        Ok(resolved)
    }

    fn apply_generation(candidates: Vec<Blueprint>, generation: &str) -> Vec<Blueprint> {
        let generation = match generation.parse::<Generation>() {
            Ok(g) => g,
            Err(_) => {
                log::warn!("Actor generation \"{generation}\" is not valid, no actor will be spawned");
                return Vec::new();
            }
        };
        if candidates.len() == 1 {
            return candidates;
        }
        match generation {
            Generation::All => candidates,
            Generation::Only(wanted) => candidates
                .into_iter()
                .filter(|bp| {
                    bp.attribute_value(GENERATION_ATTRIBUTE)
                        .and_then(|v| v.trim().parse::<u8>().ok())
                        == Some(wanted)
                })
                .collect(),
        }
    }
}
