//! Task status lattice
//!
//! Statuses accumulate as literals on a node; the effective status is the
//! one with the highest priority. This is what lets concurrent deductions
//! within a tick commute: adding a lower-priority status never changes the
//! observable state.

use crate::error::KernelResult;
use kgc_store::{vocab, RdfStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Control-flow state of a workflow node, ordered by priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending = 0,
    Active = 1,
    Waiting = 2,
    Blocked = 3,
    Completed = 4,
    Cancelled = 5,
    Archived = 6,
}

impl TaskStatus {
    /// Priority ordinal used to resolve concurrent deductions
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// No further transitions leave this status
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Cancelled | TaskStatus::Archived)
    }

    /// The highest-priority status among `statuses`, if any
    pub fn highest(statuses: impl IntoIterator<Item = TaskStatus>) -> Option<TaskStatus> {
        statuses.into_iter().max()
    }

    /// Whether a transition to `next` is allowed: equal-or-higher priority,
    /// except that Cancelled is reachable from any non-terminal state
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if next == TaskStatus::Cancelled {
            return !self.is_terminal();
        }
        next.priority() >= self.priority()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Active => "Active",
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Completed => "Completed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::Archived => "Archived",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "Active" => Ok(TaskStatus::Active),
            "Waiting" => Ok(TaskStatus::Waiting),
            "Blocked" => Ok(TaskStatus::Blocked),
            "Completed" => Ok(TaskStatus::Completed),
            "Cancelled" => Ok(TaskStatus::Cancelled),
            "Archived" => Ok(TaskStatus::Archived),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// The effective status of a node: the highest-priority status literal it
/// carries, or `None` for a node with no status at all
pub fn effective_status(
    store: &dyn RdfStore,
    subject: &str,
) -> KernelResult<Option<TaskStatus>> {
    let query = format!(
        "SELECT ?s WHERE {{ <{}> <{}> ?s }}",
        subject,
        vocab::kgc("status")
    );
    let result = store.query(&query)?;
    let statuses = result
        .as_solutions()
        .into_iter()
        .flatten()
        .filter_map(|row| row.get("s"))
        .filter_map(|term| term.as_literal())
        .filter_map(|s| TaskStatus::from_str(s).ok());
    Ok(TaskStatus::highest(statuses))
}
