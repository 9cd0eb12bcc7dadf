//! Stage registry: the immutable chain of interview stages.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IntakeError};

/// Identifier of an interview stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub u16);

impl StageId {
    pub const GET_FAMILIAR: StageId = StageId(150);
    pub const DEPRESSION_SEVERITY: StageId = StageId(200);
    pub const ILLNESS_HISTORY: StageId = StageId(300);
    pub const ANTIDEPRESSANT_HISTORY: StageId = StageId(400);
    pub const CURRENT_MEDICATIONS: StageId = StageId(500);
    pub const PROCEDURES: StageId = StageId(600);
    pub const SUICIDE_RISK_FACTORS: StageId = StageId(700);
    pub const BIPOLAR_SCREEN: StageId = StageId(800);
    pub const CONVERSATION_COMPLETED: StageId = StageId(900);
    pub const STOP_INTERACTION: StageId = StageId(1000);
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What follows a stage once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    Stage(StageId),
    Terminal,
}

/// One step of the interview.
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub instructions: String,
    pub successor: Successor,
}

/// Raw stage input before validation. `next: None` marks the final stage.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    pub id: StageId,
    pub instructions: String,
    pub next: Option<StageId>,
}

/// Immutable lookup from stage id to stage, validated as a single linear
/// chain ending in exactly one terminal stage.
///
/// An optional stop stage sits outside the chain; alert/stop replies route
/// there instead of following successors.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: HashMap<StageId, Stage>,
    order: Vec<StageId>,
    stop_stage: Option<Stage>,
}

impl StageRegistry {
    /// Build a chain from ordered (id, instructions) pairs, each stage
    /// succeeded by the next one in the list.
    pub fn from_ordered<I, S>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (StageId, S)>,
        S: Into<String>,
    {
        let pairs: Vec<(StageId, String)> =
            pairs.into_iter().map(|(id, text)| (id, text.into())).collect();
        let definitions = pairs
            .iter()
            .enumerate()
            .map(|(i, (id, text))| StageDefinition {
                id: *id,
                instructions: text.clone(),
                next: pairs.get(i + 1).map(|(next, _)| *next),
            })
            .collect();
        Self::from_definitions(definitions)
    }

    /// Build from explicit successor links. The first definition is the
    /// entry stage; walking successors from it must visit every stage once.
    pub fn from_definitions(definitions: Vec<StageDefinition>) -> Result<Self, ConfigError> {
        let first = definitions.first().ok_or(ConfigError::EmptyRegistry)?.id;

        let mut stages = HashMap::with_capacity(definitions.len());
        for def in &definitions {
            let stage = Stage {
                id: def.id,
                instructions: def.instructions.clone(),
                successor: def.next.map_or(Successor::Terminal, Successor::Stage),
            };
            if stages.insert(def.id, stage).is_some() {
                return Err(ConfigError::DuplicateStage { id: def.id });
            }
        }

        for def in &definitions {
            if let Some(next) = def.next {
                if !stages.contains_key(&next) {
                    return Err(ConfigError::UnknownSuccessor { from: def.id, to: next });
                }
            }
        }

        let mut order = Vec::with_capacity(stages.len());
        let mut seen = HashSet::with_capacity(stages.len());
        let mut cursor = Some(first);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(ConfigError::NonLinearChain {
                    reason: format!("cycle through stage {id}"),
                });
            }
            order.push(id);
            cursor = match stages[&id].successor {
                Successor::Stage(next) => Some(next),
                Successor::Terminal => None,
            };
        }

        if order.len() != stages.len() {
            let mut unreachable: Vec<StageId> =
                stages.keys().filter(|id| !seen.contains(id)).copied().collect();
            unreachable.sort();
            let listed: Vec<String> = unreachable.iter().map(ToString::to_string).collect();
            return Err(ConfigError::NonLinearChain {
                reason: format!("stages not reachable from {first}: {}", listed.join(", ")),
            });
        }

        Ok(Self {
            stages,
            order,
            stop_stage: None,
        })
    }

    /// Attach the stop stage used for alert/stop routing.
    pub fn with_stop_stage(
        mut self,
        id: StageId,
        instructions: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if self.stages.contains_key(&id) {
            return Err(ConfigError::DuplicateStage { id });
        }
        self.stop_stage = Some(Stage {
            id,
            instructions: instructions.into(),
            successor: Successor::Terminal,
        });
        Ok(self)
    }

    /// Look up a chain stage or the stop stage.
    pub fn lookup(&self, id: StageId) -> Result<&Stage, IntakeError> {
        self.stages
            .get(&id)
            .or_else(|| self.stop_stage.as_ref().filter(|s| s.id == id))
            .ok_or(IntakeError::StageNotFound { id })
    }

    /// What follows `id` in the chain.
    pub fn successor(&self, id: StageId) -> Result<Successor, IntakeError> {
        Ok(self.lookup(id)?.successor)
    }

    /// Entry stage of the chain.
    pub fn first(&self) -> StageId {
        self.order[0]
    }

    /// Stage ids in chain order.
    pub fn chain(&self) -> &[StageId] {
        &self.order
    }

    pub fn stop_stage(&self) -> Option<&Stage> {
        self.stop_stage.as_ref()
    }

    /// Number of stages in the chain (the stop stage is not counted).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: u16, next: Option<u16>) -> StageDefinition {
        StageDefinition {
            id: StageId(id),
            instructions: format!("stage {id}"),
            next: next.map(StageId),
        }
    }

    #[test]
    fn three_stage_chain_reaches_terminal_in_three_hops() {
        let registry =
            StageRegistry::from_ordered([(StageId(1), "a"), (StageId(2), "b"), (StageId(3), "c")])
                .unwrap();

        let mut current = Successor::Stage(registry.first());
        let mut hops = 0;
        while let Successor::Stage(id) = current {
            current = registry.successor(id).unwrap();
            hops += 1;
        }
        assert_eq!(hops, 3);
        assert_eq!(registry.chain(), &[StageId(1), StageId(2), StageId(3)]);
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let err = StageRegistry::from_ordered([(StageId(1), "a"), (StageId(1), "b")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStage { id } if id == StageId(1)));
    }

    #[test]
    fn empty_registry_is_rejected() {
        let err = StageRegistry::from_ordered(Vec::<(StageId, String)>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRegistry));
    }

    #[test]
    fn cycle_is_rejected() {
        let err =
            StageRegistry::from_definitions(vec![def(1, Some(2)), def(2, Some(1))]).unwrap_err();
        assert!(matches!(err, ConfigError::NonLinearChain { .. }));
    }

    #[test]
    fn branch_with_second_terminal_is_rejected() {
        // 1 -> 2 (terminal), 3 (terminal) is never reached.
        let err = StageRegistry::from_definitions(vec![def(1, Some(2)), def(2, None), def(3, None)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonLinearChain { .. }));
    }

    #[test]
    fn merge_into_shared_successor_is_rejected() {
        // 1 -> 3 and 2 -> 3: stage 2 is unreachable from the entry.
        let err =
            StageRegistry::from_definitions(vec![def(1, Some(3)), def(2, Some(3)), def(3, None)])
                .unwrap_err();
        assert!(matches!(err, ConfigError::NonLinearChain { .. }));
    }

    #[test]
    fn unknown_successor_is_rejected() {
        let err = StageRegistry::from_definitions(vec![def(1, Some(9))]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownSuccessor { from, to } if from == StageId(1) && to == StageId(9)
        ));
    }

    #[test]
    fn explicit_links_may_be_listed_out_of_order() {
        let registry =
            StageRegistry::from_definitions(vec![def(10, Some(30)), def(20, None), def(30, Some(20))])
                .unwrap();
        assert_eq!(registry.chain(), &[StageId(10), StageId(30), StageId(20)]);
    }

    #[test]
    fn lookup_unknown_stage_fails() {
        let registry = StageRegistry::from_ordered([(StageId(1), "a")]).unwrap();
        let err = registry.lookup(StageId(2)).unwrap_err();
        assert!(matches!(err, IntakeError::StageNotFound { id } if id == StageId(2)));
    }

    #[test]
    fn stop_stage_is_outside_the_chain() {
        let registry = StageRegistry::from_ordered([(StageId(1), "a"), (StageId(2), "b")])
            .unwrap()
            .with_stop_stage(StageId(99), "goodbye")
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(StageId(99)).unwrap().instructions, "goodbye");
        assert_eq!(registry.successor(StageId(99)).unwrap(), Successor::Terminal);
        assert_eq!(registry.successor(StageId(2)).unwrap(), Successor::Terminal);
    }

    #[test]
    fn stop_stage_cannot_reuse_a_chain_id() {
        let err = StageRegistry::from_ordered([(StageId(1), "a")])
            .unwrap()
            .with_stop_stage(StageId(1), "x")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStage { .. }));
    }

    #[test]
    fn stage_id_serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&StageId::GET_FAMILIAR).unwrap(), "150");
        assert_eq!(StageId::STOP_INTERACTION.to_string(), "1000");
    }
}
