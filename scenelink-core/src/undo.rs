//! Linear undo/redo history.
//!
//! Pushing a new entry always clears the redo stack; there is no branching
//! history. The undo stack is capped, oldest entries dropping off first.

use std::fmt;

use crate::engine::CommandMeta;

type Action<T> = Box<dyn Fn(&mut T) + Send>;

/// A reversible change to a `T`.
pub struct UndoEntry<T> {
    pub meta: Option<CommandMeta>,
    pub label: String,
    undo: Action<T>,
    redo: Action<T>,
}

impl<T> UndoEntry<T> {
    pub fn new(
        label: impl Into<String>,
        meta: Option<CommandMeta>,
        undo: impl Fn(&mut T) + Send + 'static,
        redo: impl Fn(&mut T) + Send + 'static,
    ) -> Self {
        Self {
            meta,
            label: label.into(),
            undo: Box::new(undo),
            redo: Box::new(redo),
        }
    }
}

impl<T> fmt::Debug for UndoEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoEntry")
            .field("label", &self.label)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Undo/redo stacks over a target of type `T`.
pub struct UndoManager<T> {
    undo_stack: Vec<UndoEntry<T>>,
    redo_stack: Vec<UndoEntry<T>>,
    limit: usize,
}

impl<T> UndoManager<T> {
    /// History holding at most `limit` undo entries (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record an already-applied change. Clears redo history.
    pub fn push(&mut self, entry: UndoEntry<T>) {
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.limit {
            let overflow = self.undo_stack.len() - self.limit;
            self.undo_stack.drain(..overflow);
        }
        self.redo_stack.clear();
    }

    /// Revert the newest change. Returns its label, or `None` when empty.
    pub fn undo(&mut self, target: &mut T) -> Option<String> {
        let entry = self.undo_stack.pop()?;
        (entry.undo)(target);
        let label = entry.label.clone();
        self.redo_stack.push(entry);
        Some(label)
    }

    /// Re-apply the newest undone change.
    pub fn redo(&mut self, target: &mut T) -> Option<String> {
        let entry = self.redo_stack.pop()?;
        (entry.redo)(target);
        let label = entry.label.clone();
        self.undo_stack.push(entry);
        Some(label)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty() && self.redo_stack.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<T> fmt::Debug for UndoManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("undo_depth", &self.undo_depth())
            .field("redo_depth", &self.redo_depth())
            .field("limit", &self.limit)
            .finish()
    }
}
