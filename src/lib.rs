use std::fmt;

pub use crate::events::{EventKind, RootEvent};
pub use crate::filter::{FilterKind, FilterPolicy, PatternError};
pub use crate::path::TreePath;
pub use crate::probe::{FileKind, KindProbe};
pub use crate::tree::{DirectoryFlags, RootIter};

use crate::events::Notifier;
use crate::filter::FilterSet;
use crate::tree::RootTree;

mod events;
mod filter;
mod path;
mod probe;
mod tree;

/// The tree of directories registered for indexing.
///
/// Roots are reference counted by owner: a root stays alive while any
/// party that registered it still cares, and its effective flags are
/// derived from all owners combined. Queries consult the root tree, the
/// glob filters and the hidden toggle to decide what the crawler and the
/// monitor should touch; they perform no I/O themselves.
///
/// The structure is single threaded, callers serialise access when
/// sharing it across threads. Handlers registered with
/// [`IndexingTree::add_handler`] run synchronously inside the mutating
/// call, after all structural invariants are restored, and must not
/// mutate the tree.
pub struct IndexingTree {
    roots: RootTree,
    filters: FilterSet,
    notifier: Notifier,
    probe: Box<dyn KindProbe>,
    filter_hidden: bool,
}

impl fmt::Debug for IndexingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexingTree")
            .field("master_root", self.roots.master_root())
            .field("filter_hidden", &self.filter_hidden)
            .finish_non_exhaustive()
    }
}

impl Default for IndexingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingTree {
    pub fn new() -> Self {
        Self::with_root(TreePath::root())
    }

    /// An indexing tree whose master root is `root` instead of `/`. The
    /// master root is fixed for the lifetime of the tree, only paths
    /// inside it can be registered.
    pub fn with_root(root: TreePath) -> Self {
        Self {
            roots: RootTree::new(root),
            filters: FilterSet::new(),
            notifier: Notifier::default(),
            probe: Box::new(()),
            filter_hidden: false,
        }
    }

    /// Installs the collaborator used to resolve file kinds under
    /// `NO_STAT` roots and to spot hidden files. The default probe
    /// resolves nothing and treats leading-dot basenames as hidden.
    pub fn set_kind_probe(&mut self, probe: impl KindProbe) {
        self.probe = Box::new(probe);
    }

    pub fn add_handler(&mut self, handler: impl FnMut(&RootEvent) -> bool + Send + 'static) {
        self.notifier.add_handler(handler);
    }

    /// Registers `owner` on the indexing root at `directory`, creating
    /// the root if needed. See [`RootEvent`] for the events this can
    /// emit.
    pub fn add(&mut self, directory: TreePath, flags: DirectoryFlags, owner: &str) {
        let mut queued = None;
        self.roots
            .add(directory, flags, owner, |event| queued = Some(event));
        self.dispatch(queued);
    }

    /// Drops `owner` from the root at `directory`; the root disappears
    /// when its last owner leaves. Unregistered paths are ignored,
    /// unknown owners are reported through the log and ignored.
    pub fn remove(&mut self, directory: &TreePath, owner: &str) {
        let mut queued = None;
        self.roots
            .remove(directory, owner, |event| queued = Some(event));
        self.dispatch(queued);
    }

    fn dispatch(&mut self, event: Option<RootEvent>) {
        if let Some(event) = event {
            self.notifier.emit(&event);
        }
    }

    /// Adds a glob filter for basenames of the given kind. A glob that is
    /// an absolute path instead matches anything at or beneath it.
    pub fn add_filter(&mut self, kind: FilterKind, glob: &str) -> Result<(), PatternError> {
        self.filters.add(kind, glob)
    }

    pub fn clear_filters(&mut self, kind: FilterKind) {
        self.filters.clear(kind);
    }

    /// Whether `file` matches any filter of the given kind, regardless of
    /// the default policy.
    pub fn matches_filter(&self, kind: FilterKind, file: &TreePath) -> bool {
        self.filters.matches(kind, file)
    }

    /// Sets the default policy for a filter kind. Under [`FilterPolicy::Accept`]
    /// (the default) filters are a blacklist, under [`FilterPolicy::Deny`]
    /// a whitelist.
    pub fn set_default_policy(&mut self, kind: FilterKind, policy: FilterPolicy) {
        self.filters.set_policy(kind, policy);
    }

    pub fn default_policy(&self, kind: FilterKind) -> FilterPolicy {
        self.filters.policy(kind)
    }

    /// When true, files whose basename marks them as hidden are not
    /// indexable unless they are an indexing root themselves. Off by
    /// default.
    pub fn set_filter_hidden(&mut self, filter_hidden: bool) {
        self.filter_hidden = filter_hidden;
    }

    pub fn filter_hidden(&self) -> bool {
        self.filter_hidden
    }

    /// The top of the tree, typically `/`. Not itself an indexing root
    /// unless explicitly added.
    pub fn master_root(&self) -> &TreePath {
        self.roots.master_root()
    }

    /// Whether a root is registered for exactly `path`, shallow or not.
    pub fn is_root(&self, path: &TreePath) -> bool {
        self.roots.find(path).is_some()
    }

    /// The indexing root governing `file` along with its derived flags,
    /// or `None` if `file` lies outside every registered root.
    pub fn get_root(&self, file: &TreePath) -> Option<(&TreePath, DirectoryFlags)> {
        self.roots.effective_root(file)
    }

    /// All registered indexing roots, in no particular order.
    pub fn list_roots(&self) -> RootIter<'_> {
        self.roots.roots()
    }

    /// Whether `file` belongs to the set of resources the indexer must
    /// scan, according to the registered roots, the filters and the
    /// hidden toggle.
    ///
    /// With `FileKind::Unknown` the kind based filters are skipped unless
    /// the governing root carries `NO_STAT`, in which case the kind is
    /// resolved through the probe (the crawler won't stat such files, so
    /// this is the only chance to apply the filters).
    pub fn is_indexable(&self, file: &TreePath, kind: FileKind) -> bool {
        let Some((root, flags)) = self.roots.effective_root(file) else {
            // not under any added directory
            return false;
        };
        if flags.contains(DirectoryFlags::IGNORE) {
            return false;
        }
        let kind = if kind == FileKind::Unknown && flags.contains(DirectoryFlags::NO_STAT) {
            self.probe.path_kind(file)
        } else {
            kind
        };
        let kind_filter = match kind {
            FileKind::File => Some(FilterKind::File),
            FileKind::Directory => Some(FilterKind::Directory),
            FileKind::Unknown => None,
        };
        if let Some(kind_filter) = kind_filter {
            if self.filters.filtered(kind_filter, file) {
                return false;
            }
        }
        if file == root {
            // roots are always indexable when not ignored, hidden or not
            return true;
        }
        if !flags.contains(DirectoryFlags::RECURSE) && !root.is_parent_of(file) {
            // non direct child of a non recursive root
            return false;
        }
        !(self.filter_hidden && self.probe.is_hidden(file))
    }

    /// Whether the directory `parent` should be indexed based on its
    /// contents: it must be indexable itself and no child may be filtered
    /// out under [`FilterKind::ParentDirectory`]. This lets marker files
    /// like `.nomedia` exclude the directory that contains them.
    pub fn parent_is_indexable<'a>(
        &self,
        parent: &TreePath,
        children: impl IntoIterator<Item = &'a TreePath>,
    ) -> bool {
        if !self.is_indexable(parent, FileKind::Directory) {
            return false;
        }
        children
            .into_iter()
            .all(|child| !self.filters.filtered(FilterKind::ParentDirectory, child))
    }
}
