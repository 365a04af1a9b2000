//! Optimistic board state for drag-and-drop clients.
//!
//! Two explicit layers: the authoritative task list (fetched from the
//! server, never mutated here) and a tentative overlay applied the
//! instant a card is dropped, before the server confirms. Merging is a
//! pure lookup, so rolling back a rejected move is a single clear of
//! the overlay entry — no ad hoc undo. Nothing tentative is ever
//! persisted; a reload shows only authoritative state.
//!
//! State machine per interaction:
//!
//! ```text
//! idle → (drag start) → dragging → (drop on target) → pending → (server resolves) → idle
//! ```

use std::collections::HashMap;

use crate::model::{Task, TaskStatus};

/// Where a card was dropped: a column, or on top of another card
/// (which targets that card's currently-effective status).
#[derive(Debug, Clone)]
pub enum DropTarget {
    Column(TaskStatus),
    Card(String),
}

/// A move the client has applied tentatively and must now confirm
/// with a server-side status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub task_id: String,
    pub target: TaskStatus,
}

#[derive(Debug, Clone)]
struct DragState {
    task_id: String,
}

/// Client-held overlay of tentative task statuses.
#[derive(Debug, Default)]
pub struct BoardOverlay {
    tentative: HashMap<String, TaskStatus>,
    drag: Option<DragState>,
}

impl BoardOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status a card renders with: tentative wins, authoritative
    /// otherwise.
    pub fn effective_status(&self, task: &Task) -> TaskStatus {
        self.tentative.get(&task.id).copied().unwrap_or(task.status)
    }

    /// Capture the card being dragged.
    pub fn begin_drag(&mut self, task: &Task) {
        self.drag = Some(DragState {
            task_id: task.id.clone(),
        });
    }

    /// Abort a drag without a drop (e.g. the pointer left the board).
    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Complete the drag on a target.
    ///
    /// Returns the move the caller must confirm with the server, or
    /// `None` when nothing changed (no drag in flight, unknown card,
    /// or a drop onto the card's current effective status).
    pub fn drop_on(&mut self, tasks: &[Task], target: DropTarget) -> Option<PendingMove> {
        let drag = self.drag.take()?;
        let task = tasks.iter().find(|t| t.id == drag.task_id)?;
        self.request_move(tasks, task, target)
    }

    /// The non-drag quick-status control: same optimistic protocol,
    /// no drag state involved.
    pub fn set_status(&mut self, tasks: &[Task], task: &Task, target: TaskStatus) -> Option<PendingMove> {
        self.request_move(tasks, task, DropTarget::Column(target))
    }

    /// Server accepted the move: drop the overlay entry. The next
    /// authoritative refresh carries the same value, so there is no
    /// visible flicker.
    pub fn resolve_success(&mut self, task_id: &str) {
        self.tentative.remove(task_id);
    }

    /// Server rejected the move: drop the overlay entry, reverting
    /// the card to its authoritative position. The move is discarded,
    /// not retried — retry is a manual user action.
    pub fn resolve_failure(&mut self, task_id: &str) {
        self.tentative.remove(task_id);
    }

    /// Pure merge of both layers into rendered columns.
    pub fn columns<'a>(&self, tasks: &'a [Task]) -> HashMap<TaskStatus, Vec<&'a Task>> {
        let mut columns: HashMap<TaskStatus, Vec<&Task>> = HashMap::new();
        for status in [TaskStatus::ToDo, TaskStatus::InProgress, TaskStatus::Done] {
            columns.insert(status, Vec::new());
        }
        for task in tasks {
            columns
                .entry(self.effective_status(task))
                .or_default()
                .push(task);
        }
        columns
    }

    /// Whether a move is awaiting server confirmation.
    pub fn is_pending(&self, task_id: &str) -> bool {
        self.tentative.contains_key(task_id)
    }

    fn request_move(
        &mut self,
        tasks: &[Task],
        task: &Task,
        target: DropTarget,
    ) -> Option<PendingMove> {
        let target_status = match target {
            DropTarget::Column(status) => status,
            // Dropping on a card targets that card's effective status,
            // tentative-or-authoritative.
            DropTarget::Card(other_id) => {
                let other = tasks.iter().find(|t| t.id == other_id)?;
                self.effective_status(other)
            }
        };

        if self.effective_status(task) == target_status {
            return None;
        }

        self.tentative.insert(task.id.clone(), target_status);
        Some(PendingMove {
            task_id: task.id.clone(),
            target: target_status,
        })
    }
}
