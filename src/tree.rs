use std::hash::BuildHasher;
use std::mem::take;
use std::ops::{Index, IndexMut};
use std::slice;

use bitflags::bitflags;
use ecow::{EcoString, EcoVec};
use hashbrown::{hash_table, DefaultHashBuilder, HashTable};

use crate::events::{EventKind, RootEvent};
use crate::path::TreePath;

bitflags! {
    /// Per-root configuration switches.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DirectoryFlags: u32 {
        /// watch this root with the filesystem monitor
        const MONITOR = 1;
        /// index the whole subtree instead of only direct children
        const RECURSE = 1 << 1;
        /// compare mtimes against the store when the root is crawled
        const CHECK_MTIME = 1 << 2;
        /// the crawler must not stat contents of this root
        const NO_STAT = 1 << 3;
        /// root survives a reboot, it is not tied to a transient mount
        const PRESERVE = 1 << 4;
        /// internal root, not surfaced to applications
        const PRIVATE = 1 << 5;
        /// explicitly blacklisted, nothing under this root is indexable
        const IGNORE = 1 << 6;
    }
}

/// The party that registered a root: a config entry, an application
/// talking over IPC, the removable media watcher. A root stays alive
/// while any owner still references it.
#[derive(Debug, Clone)]
pub struct Owner {
    name: EcoString,
    flags: DirectoryFlags,
}

/// The union of the owners' flags. `IGNORE` comes from user level
/// blacklisting and beats application monitor requests, so it masks
/// `MONITOR` out; everything else combines by OR.
fn combined_flags(owners: &[Owner]) -> DirectoryFlags {
    let mut flags = owners
        .iter()
        .fold(DirectoryFlags::empty(), |acc, owner| acc | owner.flags);
    if flags.contains(DirectoryFlags::IGNORE) {
        flags.remove(DirectoryFlags::MONITOR);
    }
    flags
}

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(self) -> bool {
        self != Self::NONE
    }

    pub fn idx(self) -> usize {
        debug_assert_ne!(self, Self::NONE);
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        assert!(value < u32::MAX as usize);
        NodeId(value as u32)
    }
}

const MASTER: NodeId = NodeId(0);

#[derive(Debug)]
pub struct Node {
    pub path: TreePath,
    owners: Vec<Owner>,
    /// derived from `owners`, see [`combined_flags`]
    flags: DirectoryFlags,
    /// a structural placeholder rather than a real indexing root, only
    /// ever true for the master root
    shallow: bool,
    parent: NodeId,
    children: EcoVec<NodeId>,
}

impl Node {
    fn new(path: TreePath, parent: NodeId, owner: Owner) -> Node {
        let flags = combined_flags(slice::from_ref(&owner));
        Node {
            path,
            owners: vec![owner],
            flags,
            shallow: false,
            parent,
            children: EcoVec::new(),
        }
    }

    /// Recomputes the derived flags, true if they changed.
    fn update_flags(&mut self) -> bool {
        let new = combined_flags(&self.owners);
        if new == self.flags {
            return false;
        }
        self.flags = new;
        true
    }
}

/// Ordered containment forest of indexing roots.
///
/// The single top node is the master root, fixed at construction. Every
/// other node's path lies strictly inside its parent's path; insertion
/// reparents existing nodes where needed so the tree always encodes the
/// containment partial order exactly. Structural changes are reported
/// through the `emit` callback passed to the mutating operations, after
/// the tree is consistent again.
#[derive(Debug)]
pub struct RootTree {
    path_table: HashTable<NodeId>,
    hasher: DefaultHashBuilder,
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl RootTree {
    pub fn new(master_root: TreePath) -> Self {
        let mut tree = Self {
            path_table: HashTable::with_capacity(64),
            hasher: DefaultHashBuilder::default(),
            nodes: Vec::with_capacity(64),
            free: Vec::new(),
        };
        tree.nodes.push(Node {
            path: master_root,
            owners: Vec::new(),
            flags: DirectoryFlags::empty(),
            shallow: true,
            parent: NodeId::NONE,
            children: EcoVec::new(),
        });
        let (hasher, nodes) = (&tree.hasher, &tree.nodes);
        let hash = hasher.hash_one(&nodes[MASTER.idx()].path);
        tree.path_table
            .insert_unique(hash, MASTER, |&id| hasher.hash_one(&nodes[id.idx()].path));
        tree
    }

    pub fn master_root(&self) -> &TreePath {
        &self.nodes[MASTER.idx()].path
    }

    /// The node registered for exactly `path`, shallow or not.
    pub fn find(&self, path: &TreePath) -> Option<NodeId> {
        let hash = self.hasher.hash_one(path);
        self.path_table
            .find(hash, |&id| self.nodes[id.idx()].path == *path)
            .copied()
    }

    /// Registers `owner` on the root at `path`.
    ///
    /// If a node for `path` already exists the owner is added to it (or,
    /// when the name is already registered, its flags are replaced) and
    /// an `Updated` event fires if the derived flags changed. Otherwise a
    /// new node is created underneath the deepest containing node and an
    /// `Added` event fires.
    pub fn add(
        &mut self,
        path: TreePath,
        flags: DirectoryFlags,
        owner: &str,
        mut emit: impl FnMut(RootEvent),
    ) {
        if owner.is_empty() {
            log::error!("empty owner for {path}");
            return;
        }
        if let Some(id) = self.find(&path) {
            self.add_owner(id, flags, owner, emit);
            return;
        }
        if !self.master_root().contains(&path) {
            log::error!(
                "cannot add {path}: outside the master root {}",
                self.master_root()
            );
            return;
        }
        let parent = self.insertion_parent(&path);
        let id = self.insert_node(Node::new(
            path,
            parent,
            Owner {
                name: owner.into(),
                flags,
            },
        ));
        // children of the insertion parent may lie inside the new root,
        // those move underneath it to keep containment intact
        let siblings = self[parent].children.clone();
        let mut kept = EcoVec::with_capacity(siblings.len() + 1);
        for &child in &siblings {
            if self[id].path.is_ancestor_of(&self[child].path) {
                self[child].parent = id;
                self[id].children.push(child);
            } else {
                kept.push(child);
            }
        }
        kept.push(id);
        self[parent].children = kept;
        emit(RootEvent {
            path: self[id].path.clone(),
            kind: EventKind::Added,
        });
    }

    fn add_owner(
        &mut self,
        id: NodeId,
        flags: DirectoryFlags,
        owner: &str,
        mut emit: impl FnMut(RootEvent),
    ) {
        let node = &mut self.nodes[id.idx()];
        node.shallow = false;
        match node.owners.iter().position(|o| o.name.as_str() == owner) {
            // re-registration with identical flags is idempotent
            Some(pos) if node.owners[pos].flags == flags => return,
            Some(pos) => node.owners[pos].flags = flags,
            None => node.owners.push(Owner {
                name: owner.into(),
                flags,
            }),
        }
        if node.update_flags() {
            log::debug!("updating flags for {} to {:?}", node.path, node.flags);
            emit(RootEvent {
                path: node.path.clone(),
                kind: EventKind::Updated,
            });
        }
    }

    /// Drops `owner` from the root at `path`, deleting the node when the
    /// last owner leaves. Removing an unregistered path is a no-op,
    /// callers issue speculative removes.
    pub fn remove(&mut self, path: &TreePath, owner: &str, mut emit: impl FnMut(RootEvent)) {
        if owner.is_empty() {
            log::error!("empty owner for {path}");
            return;
        }
        let Some(id) = self.find(path) else {
            return;
        };
        let node = &mut self.nodes[id.idx()];
        let Some(pos) = node.owners.iter().position(|o| o.name.as_str() == owner) else {
            log::warn!("unknown owner {owner:?} for {}", node.path);
            return;
        };
        node.owners.remove(pos);
        if !node.owners.is_empty() {
            if node.update_flags() {
                log::debug!("updating flags for {} to {:?}", node.path, node.flags);
                emit(RootEvent {
                    path: node.path.clone(),
                    kind: EventKind::Updated,
                });
            }
            return;
        }
        if id == MASTER {
            // the master root is structural, it reverts to a shallow
            // placeholder instead of disappearing
            node.shallow = true;
            node.flags = DirectoryFlags::empty();
            return;
        }
        self.delete_node(id, &mut emit);
    }

    fn delete_node(&mut self, id: NodeId, emit: &mut impl FnMut(RootEvent)) {
        let parent = self[id].parent;
        let children = take(&mut self[id].children);
        for &child in &children {
            self[child].parent = parent;
        }
        // hand the children back to the parent, undoing the reparent pass
        // their insertion did
        let siblings = take(&mut self[parent].children);
        let mut kept = EcoVec::with_capacity(siblings.len() - 1 + children.len());
        for &child in &siblings {
            if child != id {
                kept.push(child);
            }
        }
        for &child in &children {
            kept.push(child);
        }
        self[parent].children = kept;

        let hash = self.hasher.hash_one(&self[id].path);
        match self.path_table.find_entry(hash, |&tid| tid == id) {
            Ok(entry) => {
                entry.remove();
            }
            // the id came out of the table via find, a miss is impossible
            Err(_) => debug_assert!(false, "node missing from the path table"),
        }
        let path = self[id].path.clone();
        self[id].owners.clear();
        self.free.push(id);
        emit(RootEvent {
            path,
            kind: EventKind::Removed,
        });
    }

    fn insert_node(&mut self, node: Node) -> NodeId {
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.idx()] = node;
                id
            }
            None => {
                let id = NodeId::from(self.nodes.len());
                self.nodes.push(node);
                id
            }
        };
        let (hasher, nodes) = (&self.hasher, &self.nodes);
        let hash = hasher.hash_one(&nodes[id.idx()].path);
        self.path_table
            .insert_unique(hash, id, |&id| hasher.hash_one(&nodes[id.idx()].path));
        id
    }

    /// The deepest existing node whose path contains `path`. The caller
    /// made sure no node for exactly `path` exists and that `path` lies
    /// inside the master root, so the descent always terminates on a
    /// valid parent.
    fn insertion_parent(&self, path: &TreePath) -> NodeId {
        let mut cur = MASTER;
        'descend: loop {
            for &child in &self[cur].children {
                if self[child].path.is_ancestor_of(path) {
                    cur = child;
                    continue 'descend;
                }
            }
            return cur;
        }
    }

    /// The deepest non-shallow node whose path equals or contains `file`,
    /// i.e. the indexing root governing `file`.
    pub fn effective_root(&self, file: &TreePath) -> Option<(&TreePath, DirectoryFlags)> {
        if !self[MASTER].path.contains(file) {
            return None;
        }
        let mut cur = MASTER;
        let mut best = NodeId::NONE;
        loop {
            if !self[cur].shallow {
                best = cur;
            }
            let next = self[cur]
                .children
                .iter()
                .find(|&&child| self[child].path.contains(file));
            match next {
                Some(&next) => cur = next,
                None => break,
            }
        }
        if !best.is_some() {
            return None;
        }
        let node = &self[best];
        Some((&node.path, node.flags))
    }

    /// All non-shallow nodes, in no particular order.
    pub fn roots(&self) -> RootIter<'_> {
        RootIter {
            iter: self.path_table.iter(),
            nodes: &self.nodes,
        }
    }
}

#[derive(Clone)]
pub struct RootIter<'a> {
    iter: hash_table::Iter<'a, NodeId>,
    nodes: &'a [Node],
}

impl<'a> Iterator for RootIter<'a> {
    type Item = (&'a TreePath, DirectoryFlags);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = &self.nodes[self.iter.next()?.idx()];
            if !node.shallow {
                return Some((&node.path, node.flags));
            }
        }
    }
}

impl Index<NodeId> for RootTree {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index.idx()]
    }
}

impl IndexMut<NodeId> for RootTree {
    fn index_mut(&mut self, index: NodeId) -> &mut Self::Output {
        &mut self.nodes[index.idx()]
    }
}

#[cfg(test)]
impl RootTree {
    /// Panics unless every structural invariant holds: containment along
    /// parent edges, unique paths, consistent derived flags, and a tree
    /// shape that mirrors the containment partial order exactly.
    pub fn assert_invariants(&self) {
        let live: Vec<NodeId> = self.path_table.iter().copied().collect();
        assert!(live.contains(&MASTER));
        for &id in &live {
            let node = &self[id];
            assert_eq!(
                node.flags,
                combined_flags(&node.owners),
                "derived flags out of sync for {}",
                node.path
            );
            assert!(
                !node.owners.is_empty() || node.shallow,
                "ownerless non-shallow node {}",
                node.path
            );
            for &child in &node.children {
                assert_eq!(self[child].parent, id);
            }
            if id == MASTER {
                assert!(!node.parent.is_some());
                continue;
            }
            let parent = &self[node.parent];
            assert!(
                parent.path.is_ancestor_of(&node.path),
                "{} not inside its parent {}",
                node.path,
                parent.path
            );
            assert!(parent.children.contains(&id));
        }
        for &a in &live {
            for &b in &live {
                if a == b {
                    continue;
                }
                assert_ne!(self[a].path, self[b].path);
                if self[a].path.is_ancestor_of(&self[b].path) {
                    assert!(
                        self.is_tree_ancestor(a, b),
                        "{} contains {} but is not a tree ancestor",
                        self[a].path,
                        self[b].path
                    );
                }
            }
        }
    }

    fn is_tree_ancestor(&self, a: NodeId, b: NodeId) -> bool {
        let mut cur = self[b].parent;
        while cur.is_some() {
            if cur == a {
                return true;
            }
            cur = self[cur].parent;
        }
        false
    }
}
