//! Analysis task graph.
//!
//! Subtasks live in a flat arena; dependencies name roles, and validation
//! resolves them to arena indices. The usual shape is a fan-out of leaves
//! joined by one synthesis subtask.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::role::AgentRole;
use crate::core::ResultItem;
use crate::error::AgentError;

/// One node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Role that executes the subtask.
    pub role: AgentRole,
    /// Target-specific framing from the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Roles whose results must be available first.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<AgentRole>,
}

impl Subtask {
    /// A subtask with no dependencies.
    #[must_use]
    pub const fn leaf(role: AgentRole, instructions: Option<String>) -> Self {
        Self {
            role,
            instructions,
            depends_on: BTreeSet::new(),
        }
    }
}

/// Plan for analyzing one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    /// Item being analyzed.
    pub target: ResultItem,
    /// One-line focus statement from the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Subtasks in plan order.
    pub subtasks: Vec<Subtask>,
}

impl AnalysisTask {
    /// Builds the standard fan-out: every leaf runs independently and a
    /// synthesis subtask depends on all of them.
    #[must_use]
    pub fn fan_out(target: ResultItem, leaves: Vec<Subtask>, focus: Option<String>) -> Self {
        let depends_on = leaves.iter().map(|s| s.role).collect();
        let mut subtasks = leaves;
        subtasks.push(Subtask {
            role: AgentRole::Synthesis,
            instructions: None,
            depends_on,
        });
        Self {
            target,
            focus,
            subtasks,
        }
    }

    /// Subtasks without dependencies.
    pub fn leaves(&self) -> impl Iterator<Item = &Subtask> {
        self.subtasks.iter().filter(|s| s.depends_on.is_empty())
    }

    /// Returns the subtask for `role`.
    #[must_use]
    pub fn subtask(&self, role: AgentRole) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.role == role)
    }

    /// Adds a leaf and makes every dependent subtask wait for it.
    ///
    /// Used to fold the vision leaf into an existing plan.
    pub fn add_leaf(&mut self, leaf: Subtask) {
        let role = leaf.role;
        if self.subtask(role).is_some() {
            return;
        }
        for subtask in &mut self.subtasks {
            if !subtask.depends_on.is_empty() {
                subtask.depends_on.insert(role);
            }
        }
        let at = self
            .subtasks
            .iter()
            .position(|s| !s.depends_on.is_empty())
            .unwrap_or(self.subtasks.len());
        self.subtasks.insert(at, leaf);
    }

    /// Checks the graph invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTaskGraph`] if a role appears twice, a
    /// dependency names a missing subtask, or the graph has a cycle.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.waves().map(|_| ())
    }

    /// Groups subtask indices into waves: every subtask's dependencies sit in
    /// earlier waves.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AnalysisTask::validate`].
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, AgentError> {
        let mut index: HashMap<AgentRole, usize> = HashMap::with_capacity(self.subtasks.len());
        for (i, subtask) in self.subtasks.iter().enumerate() {
            if index.insert(subtask.role, i).is_some() {
                return Err(invalid(format!("role '{}' appears twice", subtask.role)));
            }
        }

        let mut pending = vec![0usize; self.subtasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.subtasks.len()];
        for (i, subtask) in self.subtasks.iter().enumerate() {
            for dep in &subtask.depends_on {
                let Some(&j) = index.get(dep) else {
                    return Err(invalid(format!(
                        "'{}' depends on missing subtask '{dep}'",
                        subtask.role
                    )));
                };
                pending[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut waves = Vec::new();
        let mut ready: Vec<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
        let mut placed = 0;
        while !ready.is_empty() {
            let mut next = Vec::new();
            for &i in &ready {
                for &d in &dependents[i] {
                    pending[d] -= 1;
                    if pending[d] == 0 {
                        next.push(d);
                    }
                }
            }
            placed += ready.len();
            waves.push(std::mem::replace(&mut ready, next));
        }

        if placed == self.subtasks.len() {
            Ok(waves)
        } else {
            Err(invalid("dependency cycle".to_string()))
        }
    }
}

fn invalid(message: String) -> AgentError {
    AgentError::InvalidTaskGraph { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceKind;

    fn target() -> ResultItem {
        ResultItem::new(SourceKind::Paper, "1", "Paper")
    }

    fn paper_task() -> AnalysisTask {
        AnalysisTask::fan_out(
            target(),
            vec![
                Subtask::leaf(AgentRole::Method, None),
                Subtask::leaf(AgentRole::Experiment, Some("focus on ablations".to_string())),
                Subtask::leaf(AgentRole::Reviewer, None),
            ],
            None,
        )
    }

    #[test]
    fn test_fan_out_waves() {
        let task = paper_task();
        let waves = task.waves().unwrap_or_default();
        assert_eq!(waves, vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(task.leaves().count(), 3);
    }

    #[test]
    fn test_add_leaf_joins_synthesis() {
        let mut task = paper_task();
        task.add_leaf(Subtask::leaf(AgentRole::Vision, None));
        assert!(task.validate().is_ok());
        let synthesis = task.subtask(AgentRole::Synthesis).map(|s| s.depends_on.len());
        assert_eq!(synthesis, Some(4));
        assert_eq!(task.subtasks.last().map(|s| s.role), Some(AgentRole::Synthesis));
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let mut task = paper_task();
        task.subtasks[0].depends_on.insert(AgentRole::Usage);
        assert!(matches!(task.validate(), Err(AgentError::InvalidTaskGraph { .. })));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut task = paper_task();
        task.subtasks[0].depends_on.insert(AgentRole::Experiment);
        task.subtasks[1].depends_on.insert(AgentRole::Method);
        let err = task.validate();
        assert!(matches!(err, Err(AgentError::InvalidTaskGraph { message }) if message.contains("cycle")));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let mut task = paper_task();
        task.subtasks.insert(0, Subtask::leaf(AgentRole::Method, None));
        assert!(task.validate().is_err());
    }
}
