use crate::path::TreePath;

/// File kind as known to the caller, `Unknown` when it has not been
/// determined.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FileKind {
    Unknown,
    File,
    Directory,
}

/// Collaborator answering questions about paths that the engine itself
/// never touches the disk for.
pub trait KindProbe: 'static + Send {
    /// Resolve the kind of `path`. Only consulted for files governed by a
    /// `NO_STAT` root, where the crawler has committed to not stat
    /// contents itself.
    fn path_kind(&self, path: &TreePath) -> FileKind;

    /// Whether `path` counts as hidden. The default treats a leading dot
    /// in the basename as hidden, implementations can layer platform
    /// specific attributes on top.
    fn is_hidden(&self, path: &TreePath) -> bool {
        path.basename().as_encoded_bytes().first() == Some(&b'.')
    }
}

impl KindProbe for () {
    fn path_kind(&self, _path: &TreePath) -> FileKind {
        FileKind::Unknown
    }
}
