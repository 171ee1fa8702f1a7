//! Immutable compiled plan: the DAG of nodes the engine walks.
//!
//! Plans are produced by an upstream compiler and never change during
//! execution. Validation here is structural; resolvability of declared
//! facilitator/adviser types against the registries is checked when an
//! execution starts.

use crate::advise::AdviserType;
use crate::core::LevelKind;
use crate::errors::InvalidPlanError;
use crate::facilitate::FacilitatorType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Adviser configuration declared on a plan node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviserSpec {
    /// Which adviser decides this node's post-completion action.
    pub adviser_type: AdviserType,
    /// Opaque adviser-type-specific parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl AdviserSpec {
    /// Creates an adviser spec.
    #[must_use]
    pub fn new(adviser_type: AdviserType, parameters: serde_json::Value) -> Self {
        Self {
            adviser_type,
            parameters,
        }
    }
}

/// One node of a compiled plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    /// Unique node id within the plan.
    pub id: String,
    /// Display name.
    pub name: String,
    /// How this node's work is carried out.
    pub facilitator_type: FacilitatorType,
    /// The scope kind this node represents.
    pub kind: LevelKind,
    /// Parameters handed to the step executor.
    pub step_parameters: Option<serde_json::Value>,
    /// Adviser deciding the post-completion action, if any.
    pub adviser: Option<AdviserSpec>,
    /// Declared next node on the happy path.
    pub next: Option<String>,
    /// Fallback node to proceed to when a failure is ignored.
    pub on_failure_next: Option<String>,
    /// Child node ids for fan-out nodes.
    #[serde(default)]
    pub children: Vec<String>,
}

impl PlanNode {
    /// Creates a new step node with the given facilitator type.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, facilitator_type: FacilitatorType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            facilitator_type,
            kind: LevelKind::Step,
            step_parameters: None,
            adviser: None,
            next: None,
            on_failure_next: None,
            children: Vec::new(),
        }
    }

    /// Sets the scope kind.
    #[must_use]
    pub fn with_kind(mut self, kind: LevelKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the step parameters.
    #[must_use]
    pub fn with_step_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.step_parameters = Some(parameters);
        self
    }

    /// Sets the adviser spec.
    #[must_use]
    pub fn with_adviser(mut self, adviser: AdviserSpec) -> Self {
        self.adviser = Some(adviser);
        self
    }

    /// Sets the declared next node.
    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Sets the failure-fallback node.
    #[must_use]
    pub fn with_on_failure_next(mut self, next: impl Into<String>) -> Self {
        self.on_failure_next = Some(next.into());
        self
    }

    /// Sets the child node ids for a fan-out node.
    #[must_use]
    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }
}

/// An immutable compiled plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Id of the entry node.
    pub entry_node_id: String,
    nodes: HashMap<String, PlanNode>,
}

impl Plan {
    /// Starts building a plan.
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> PlanBuilder {
        PlanBuilder {
            id: id.into(),
            name: name.into(),
            entry_node_id: None,
            nodes: Vec::new(),
        }
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    /// Returns all nodes.
    #[must_use]
    pub fn nodes(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.values()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validates the plan structure.
    ///
    /// Checks: at least one node, the entry node exists, every declared
    /// edge resolves, and the `next`/`children` edges form no cycle.
    pub fn validate(&self) -> Result<(), InvalidPlanError> {
        if self.nodes.is_empty() {
            return Err(InvalidPlanError::new(format!("Plan '{}' has no nodes", self.id)));
        }
        if !self.nodes.contains_key(&self.entry_node_id) {
            return Err(InvalidPlanError::new(format!(
                "Plan '{}' entry node '{}' does not exist",
                self.id, self.entry_node_id
            ))
            .with_nodes(vec![self.entry_node_id.clone()]));
        }

        for node in self.nodes.values() {
            if node.facilitator_type == FacilitatorType::Children && node.children.is_empty() {
                return Err(InvalidPlanError::new(format!(
                    "Fan-out node '{}' declares no children",
                    node.id
                ))
                .with_nodes(vec![node.id.clone()]));
            }
            for edge in node
                .next
                .iter()
                .chain(node.on_failure_next.iter())
                .chain(node.children.iter())
            {
                if !self.nodes.contains_key(edge) {
                    return Err(InvalidPlanError::new(format!(
                        "Node '{}' references unknown node '{}'",
                        node.id, edge
                    ))
                    .with_nodes(vec![node.id.clone(), edge.clone()]));
                }
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), InvalidPlanError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();

        fn visit(
            plan: &Plan,
            id: &str,
            visited: &mut HashSet<String>,
            path: &mut Vec<String>,
        ) -> Result<(), InvalidPlanError> {
            if let Some(pos) = path.iter().position(|p| p == id) {
                let mut cycle: Vec<String> = path[pos..].to_vec();
                cycle.push(id.to_string());
                return Err(InvalidPlanError::new(format!(
                    "Plan contains a cycle: {}",
                    cycle.join(" -> ")
                ))
                .with_nodes(cycle));
            }
            if visited.contains(id) {
                return Ok(());
            }
            path.push(id.to_string());
            if let Some(node) = plan.node(id) {
                for edge in node.next.iter().chain(node.children.iter()) {
                    visit(plan, edge, visited, path)?;
                }
            }
            path.pop();
            visited.insert(id.to_string());
            Ok(())
        }

        for id in self.nodes.keys() {
            visit(self, id, &mut visited, &mut path)?;
        }
        Ok(())
    }
}

/// Builder for [`Plan`].
#[derive(Debug)]
pub struct PlanBuilder {
    id: String,
    name: String,
    entry_node_id: Option<String>,
    nodes: Vec<PlanNode>,
}

impl PlanBuilder {
    /// Adds a node. The first node added becomes the entry node unless
    /// [`PlanBuilder::entry`] is called.
    #[must_use]
    pub fn node(mut self, node: PlanNode) -> Self {
        if self.entry_node_id.is_none() {
            self.entry_node_id = Some(node.id.clone());
        }
        self.nodes.push(node);
        self
    }

    /// Sets the entry node explicitly.
    #[must_use]
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry_node_id = Some(id.into());
        self
    }

    /// Builds and validates the plan.
    pub fn build(self) -> Result<Plan, InvalidPlanError> {
        let entry_node_id = self
            .entry_node_id
            .ok_or_else(|| InvalidPlanError::new(format!("Plan '{}' has no entry node", self.id)))?;

        let mut nodes = HashMap::new();
        for node in self.nodes {
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(InvalidPlanError::new(format!("Duplicate node id '{}'", node.id))
                    .with_nodes(vec![node.id]));
            }
        }

        let plan = Plan {
            id: self.id,
            name: self.name,
            entry_node_id,
            nodes,
        };
        plan.validate()?;
        Ok(plan)
    }
}
