use std::fmt;

use crate::path::TreePath;

/// What happened to an indexing root.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum EventKind {
    /// a new root entered the tree
    Added,
    /// the last owner of a root left and the node was deleted
    Removed,
    /// the derived flags of an existing root changed
    Updated,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RootEvent {
    pub path: TreePath,
    pub kind: EventKind,
}

pub type Handler = Box<dyn FnMut(&RootEvent) -> bool + Send>;

/// Synchronous fan-out of root events to the registered handlers.
///
/// Handlers run on the mutating thread before the mutation returns and
/// must not mutate the tree during delivery; a handler returning `false`
/// is dropped.
#[derive(Default)]
pub struct Notifier {
    handlers: Vec<Handler>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Notifier {
    pub fn add_handler(&mut self, handler: impl FnMut(&RootEvent) -> bool + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn emit(&mut self, event: &RootEvent) {
        self.handlers.retain_mut(|handler| handler(event));
    }
}
