//! Dependency scheduler over a plan's task DAG
//!
//! Holds the in-memory view of the task graph for one executor loop: forward
//! and reverse adjacency, cycle detection at construction, ready selection,
//! and the status bookkeeping that blocks or re-opens dependents. Durable
//! task state lives in the task service; the executor keeps both in step.

use crate::db::models::{Task, TaskStatus};
use crate::{OrchestratorError, Result};
use std::collections::{HashMap, HashSet};

/// One task with its adjacency sets
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub task: Task,
    pub dependencies: HashSet<String>,
    pub dependents: HashSet<String>,
}

/// In-memory scheduler over a plan's tasks
pub struct TaskScheduler {
    nodes: HashMap<String, TaskNode>,
}

impl TaskScheduler {
    /// Build the graph; fails with a distinct error on dependency cycles
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut nodes: HashMap<String, TaskNode> = tasks
            .into_iter()
            .map(|task| {
                let dependencies: HashSet<String> = task.dependency_ids().into_iter().collect();
                (
                    task.id.clone(),
                    TaskNode {
                        task,
                        dependencies,
                        dependents: HashSet::new(),
                    },
                )
            })
            .collect();

        let edges: Vec<(String, String)> = nodes
            .iter()
            .flat_map(|(id, node)| {
                node.dependencies
                    .iter()
                    .map(move |dep| (dep.clone(), id.clone()))
            })
            .collect();
        for (dep, dependent) in edges {
            if let Some(node) = nodes.get_mut(&dep) {
                node.dependents.insert(dependent);
            }
        }

        let scheduler = Self { nodes };
        scheduler.detect_cycles()?;
        Ok(scheduler)
    }

    fn detect_cycles(&self) -> Result<()> {
        fn visit(
            nodes: &HashMap<String, TaskNode>,
            id: &str,
            visited: &mut HashSet<String>,
            stack: &mut HashSet<String>,
        ) -> bool {
            visited.insert(id.to_string());
            stack.insert(id.to_string());

            if let Some(node) = nodes.get(id) {
                for dep in &node.dependencies {
                    if !nodes.contains_key(dep) {
                        continue;
                    }
                    if !visited.contains(dep) {
                        if visit(nodes, dep, visited, stack) {
                            return true;
                        }
                    } else if stack.contains(dep) {
                        return true;
                    }
                }
            }

            stack.remove(id);
            false
        }

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        for id in self.nodes.keys() {
            if !visited.contains(id) && visit(&self.nodes, id, &mut visited, &mut stack) {
                return Err(OrchestratorError::Validation(
                    "Circular dependency detected".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.nodes.get(id).map(|node| node.task.task_status())
    }

    fn deps_satisfied(&self, node: &TaskNode) -> bool {
        node.dependencies.iter().all(|dep| {
            self.status_of(dep)
                .map(|status| status.is_satisfied())
                // Dangling dependency ids do not gate the task.
                .unwrap_or(true)
        })
    }

    /// Up to `max_count` pending tasks whose dependencies are all satisfied
    pub fn get_ready_tasks(&self, max_count: usize) -> Vec<Task> {
        let mut ready = Vec::new();
        let mut ordered: Vec<&TaskNode> = self.nodes.values().collect();
        ordered.sort_by(|a, b| {
            a.task
                .created_at
                .cmp(&b.task.created_at)
                .then_with(|| a.task.id.cmp(&b.task.id))
        });

        for node in ordered {
            if node.task.task_status() != TaskStatus::Pending {
                continue;
            }
            if !self.deps_satisfied(node) {
                continue;
            }
            ready.push(node.task.clone());
            if ready.len() >= max_count {
                break;
            }
        }
        ready
    }

    /// Record a status locally (durable state is the task service's job)
    pub fn set_status(&mut self, id: &str, status: TaskStatus) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.task.status = status.as_str().to_string();
        }
    }

    /// Mark done; returns formerly blocked dependents that became pending
    pub fn mark_completed(&mut self, id: &str) -> Vec<String> {
        self.mark_satisfied(id, TaskStatus::Done)
    }

    /// Mark skipped; symmetric to [`mark_completed`](Self::mark_completed)
    pub fn mark_skipped(&mut self, id: &str) -> Vec<String> {
        self.mark_satisfied(id, TaskStatus::Skipped)
    }

    fn mark_satisfied(&mut self, id: &str, status: TaskStatus) -> Vec<String> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        self.set_status(id, status);

        let dependents: Vec<String> = self.nodes[id].dependents.iter().cloned().collect();
        let mut unblocked = Vec::new();
        for dependent_id in dependents {
            let Some(node) = self.nodes.get(&dependent_id) else {
                continue;
            };
            if node.task.task_status() != TaskStatus::Blocked {
                continue;
            }
            if self.deps_satisfied(node) {
                self.set_status(&dependent_id, TaskStatus::Pending);
                unblocked.push(dependent_id);
            }
        }
        unblocked
    }

    /// Mark failed; returns pending dependents that became blocked
    pub fn mark_failed(&mut self, id: &str) -> Vec<String> {
        self.mark_dead(id, TaskStatus::Failed)
    }

    /// Mark timed out; blocks dependents like a failure
    pub fn mark_timeout(&mut self, id: &str) -> Vec<String> {
        self.mark_dead(id, TaskStatus::Timeout)
    }

    /// Mark aborted
    pub fn mark_aborted(&mut self, id: &str) {
        self.set_status(id, TaskStatus::Aborted);
    }

    fn mark_dead(&mut self, id: &str, status: TaskStatus) -> Vec<String> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        self.set_status(id, status);

        let dependents: Vec<String> = self.nodes[id].dependents.iter().cloned().collect();
        let mut blocked = Vec::new();
        for dependent_id in dependents {
            if self.status_of(&dependent_id) == Some(TaskStatus::Pending) {
                self.set_status(&dependent_id, TaskStatus::Blocked);
                blocked.push(dependent_id);
            }
        }
        blocked
    }

    /// Every task is done or skipped
    pub fn is_all_done(&self) -> bool {
        self.nodes
            .values()
            .all(|node| node.task.task_status().is_satisfied())
    }

    /// Any task failed
    pub fn has_failed(&self) -> bool {
        self.nodes
            .values()
            .any(|node| node.task.task_status() == TaskStatus::Failed)
    }

    /// Every task reached a terminal or blocked state
    pub fn is_settled(&self) -> bool {
        self.nodes.values().all(|node| {
            let status = node.task.task_status();
            status.is_terminal() || status == TaskStatus::Blocked
        })
    }

    /// Current in-memory view of one task
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.nodes.get(id).map(|node| &node.task)
    }
}
