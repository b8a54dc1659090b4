use std::ffi::OsStr;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::path::{Path, MAIN_SEPARATOR_STR};

use ecow::EcoVec;
use memchr::memrchr;

#[cfg(unix)]
const PATH_SEPARATOR: u8 = b'/';
#[cfg(windows)]
const PATH_SEPARATOR: u8 = b'\\';

/// A canonical absolute path with some desirable properties:
///
/// * only 2 words in size reducing memory pressure
/// * reference counted, clones and truncations are cheap
/// * never ends with a path separator enabling fast byte-wise
///   containment checks
///
/// The filesystem root is stored as the empty buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct TreePath {
    buf: EcoVec<u8>,
}

impl TreePath {
    /// The filesystem root, the default master root of an indexing tree.
    pub fn root() -> TreePath {
        TreePath { buf: EcoVec::new() }
    }

    pub fn new(path: impl AsRef<Path>) -> TreePath {
        let bytes = path.as_ref().as_os_str().as_encoded_bytes();
        let mut end = bytes.len();
        while end > 0 && bytes[end - 1] == PATH_SEPARATOR {
            end -= 1;
        }
        let mut buf = EcoVec::with_capacity(end);
        buf.extend_from_slice(&bytes[..end]);
        TreePath { buf }
    }

    pub fn is_fs_root(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_std_path(&self) -> &Path {
        if self.buf.is_empty() {
            return Path::new(MAIN_SEPARATOR_STR);
        }
        // safety: the buffer is a prefix of the OsStr encoded bytes it was
        // constructed from, cut at a separator boundary
        Path::new(unsafe { OsStr::from_encoded_bytes_unchecked(&self.buf) })
    }

    /// The trailing path component, empty for the filesystem root.
    pub fn basename(&self) -> &OsStr {
        let start = memrchr(PATH_SEPARATOR, &self.buf).map_or(0, |i| i + 1);
        // safety: see as_std_path, splitting at a separator keeps the
        // encoding intact
        unsafe { OsStr::from_encoded_bytes_unchecked(&self.buf[start..]) }
    }

    /// The containing directory, `None` for the filesystem root.
    pub fn parent(&self) -> Option<TreePath> {
        let i = memrchr(PATH_SEPARATOR, &self.buf)?;
        let mut buf = self.buf.clone();
        buf.truncate(i);
        Some(TreePath { buf })
    }

    /// Strict containment: `other` lies somewhere underneath `self`.
    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        if self.buf.is_empty() {
            return !other.buf.is_empty();
        }
        other.buf.len() > self.buf.len()
            && other.buf.starts_with(&self.buf)
            && other.buf[self.buf.len()] == PATH_SEPARATOR
    }

    /// Non-strict containment, `self` equals or contains `other`.
    pub fn contains(&self, other: &TreePath) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Direct parenthood: `other` is an immediate child of `self`.
    pub fn is_parent_of(&self, other: &TreePath) -> bool {
        let Some(i) = memrchr(PATH_SEPARATOR, &other.buf) else {
            return false;
        };
        &other.buf[..i] == self.as_bytes()
    }

    pub fn join(&self, name: impl AsRef<OsStr>) -> TreePath {
        let mut name = name.as_ref().as_encoded_bytes();
        while name.last() == Some(&PATH_SEPARATOR) {
            name = &name[..name.len() - 1];
        }
        let mut buf = EcoVec::with_capacity(self.buf.len() + name.len() + 1);
        buf.extend_from_slice(&self.buf);
        if name.first() != Some(&PATH_SEPARATOR) {
            buf.push(PATH_SEPARATOR);
        }
        buf.extend_from_slice(name);
        TreePath { buf }
    }
}

impl Hash for TreePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl Debug for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_std_path().fmt(f)
    }
}

impl Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.as_std_path().display(), f)
    }
}
