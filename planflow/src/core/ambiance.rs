//! Ambiance: the execution-context stack of a node execution.
//!
//! Each level records where inside nested stages/step groups a node
//! execution sits. The stack grows as execution descends into children.

use serde::{Deserialize, Serialize};

/// The kind of plan scope a level represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    /// The whole pipeline.
    Pipeline,
    /// A stage within the pipeline.
    Stage,
    /// A group of steps fanned out under one parent.
    StepGroup,
    /// A single step.
    Step,
}

/// One level of the execution-context stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbianceLevel {
    /// The plan node this level corresponds to.
    pub node_id: String,
    /// Display name of the scope.
    pub name: String,
    /// Scope kind.
    pub kind: LevelKind,
}

impl AmbianceLevel {
    /// Creates a new level.
    #[must_use]
    pub fn new(node_id: impl Into<String>, name: impl Into<String>, kind: LevelKind) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Ordered stack of levels describing a node execution's position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiance {
    levels: Vec<AmbianceLevel>,
}

impl Ambiance {
    /// Creates an empty ambiance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with the given level pushed on top.
    #[must_use]
    pub fn descend(&self, level: AmbianceLevel) -> Self {
        let mut levels = self.levels.clone();
        levels.push(level);
        Self { levels }
    }

    /// Returns the innermost level, if any.
    #[must_use]
    pub fn current(&self) -> Option<&AmbianceLevel> {
        self.levels.last()
    }

    /// Returns the nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Returns all levels, outermost first.
    #[must_use]
    pub fn levels(&self) -> &[AmbianceLevel] {
        &self.levels
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ambiance() {
        let ambiance = Ambiance::new();
        assert!(ambiance.is_empty());
        assert!(ambiance.current().is_none());
    }

    #[test]
    fn test_descend_is_ordered() {
        let ambiance = Ambiance::new()
            .descend(AmbianceLevel::new("p1", "pipeline", LevelKind::Pipeline))
            .descend(AmbianceLevel::new("s1", "build", LevelKind::Stage))
            .descend(AmbianceLevel::new("st1", "compile", LevelKind::Step));

        assert_eq!(ambiance.depth(), 3);
        assert_eq!(ambiance.levels()[0].node_id, "p1");
        assert_eq!(ambiance.current().unwrap().node_id, "st1");
    }

    #[test]
    fn test_descend_does_not_mutate_parent() {
        let parent = Ambiance::new().descend(AmbianceLevel::new("s1", "build", LevelKind::Stage));
        let child = parent.descend(AmbianceLevel::new("st1", "compile", LevelKind::Step));

        assert_eq!(parent.depth(), 1);
        assert_eq!(child.depth(), 2);
    }
}
