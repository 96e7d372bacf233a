//! The B+Tree index.
//!
//! Maps the table's integer primary key to [`RecordId`]s. The tree lives
//! in its own paged file: page 0 holds the header (root page id at
//! offset 0, tree height at offset 4), the first leaf root is page 1,
//! and new pages are allocated off the end of the file, never freed.
//! `tree_height` counts the internal levels above the leaves, so a tree
//! whose root is a leaf has height 0.
//!
//! Inserts only; splits propagate through the recursion stack (there are
//! no parent pointers) as [`Promotion`] values. Within one insert, pages
//! are written sibling first, then the modified page, then the parent
//! path, then the header. None of this is crash-safe: a failure mid
//! insert leaves the file in an undefined state.

use crate::errors::Error;
use crate::storage::node::{InternalNode, LeafNode, Search, MAX_KEYS};
use crate::storage::pagefile::{OpenMode, PageFile, PageId};
use crate::storage::record::RecordId;
use std::path::Path;
use tracing::{debug, trace};

/// Position inside the leaf chain: a leaf page and an entry slot in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCursor {
    pub pid: PageId,
    pub eid: usize,
}

/// Result of a key search: either the entry holding the key, or the
/// position immediately after the largest smaller key.
#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    Exact(IndexCursor),
    Nearest(IndexCursor),
}

impl Lookup {
    pub fn cursor(self) -> IndexCursor {
        match self {
            Lookup::Exact(c) | Lookup::Nearest(c) => c,
        }
    }
}

/// What a recursive insert hands back to its parent level.
enum Promotion {
    None,
    Split {
        mid_key: i32,
        left: PageId,
        right: PageId,
    },
}

const NO_CACHE: PageId = -1;

pub struct BTreeIndex {
    pf: PageFile,
    root_pid: PageId,
    tree_height: i32,
    /// One-slot cache holding the leaf that `locate` landed on, so a
    /// run of `read_forward` calls does not re-read the same page.
    cache: LeafNode,
    cache_pid: PageId,
}

impl BTreeIndex {
    /// Opens the index file; `Write` mode creates it. A zero-length file
    /// is an empty index (no root yet).
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, Error> {
        let pf = PageFile::open(path, mode)?;
        let mut index = BTreeIndex {
            pf,
            root_pid: -1,
            tree_height: 0,
            cache: LeafNode::new(),
            cache_pid: NO_CACHE,
        };
        if index.pf.end_pid() > 0 {
            index.read_info()?;
        }
        Ok(index)
    }

    fn read_info(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; crate::storage::pagefile::PAGE_SIZE];
        self.pf.read(0, &mut buf)?;

        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[0..4]);
        self.root_pid = i32::from_le_bytes(raw);
        raw.copy_from_slice(&buf[4..8]);
        self.tree_height = i32::from_le_bytes(raw);

        if self.root_pid < -1 || self.root_pid == 0 || self.tree_height < 0 {
            return Err(err!(
                Storage,
                "Corrupt index header (root {}, height {})",
                self.root_pid,
                self.tree_height
            ));
        }
        Ok(())
    }

    fn write_info(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; crate::storage::pagefile::PAGE_SIZE];
        buf[0..4].copy_from_slice(&self.root_pid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tree_height.to_le_bytes());
        self.pf.write(0, &buf)
    }

    /// Inserts a `(key, rid)` pair. Any cursor or cached leaf held by a
    /// reader is invalidated.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> Result<(), Error> {
        self.cache_pid = NO_CACHE;

        if self.root_pid < 1 {
            let mut root = LeafNode::new();
            root.insert(key, rid)?;
            root.write(1, &mut self.pf)?;
            self.root_pid = 1;
            self.tree_height = 0;
            debug!(key, "Created leaf root");
        } else {
            match self.rec_insert(key, rid, self.root_pid, 0)? {
                Promotion::None => {}
                Promotion::Split {
                    mid_key,
                    left,
                    right,
                } => {
                    let new_root = self.pf.end_pid();
                    let mut root = InternalNode::new();
                    root.init_root(left, mid_key, right);
                    root.write(new_root, &mut self.pf)?;
                    self.root_pid = new_root;
                    self.tree_height += 1;
                    debug!(
                        root = new_root,
                        height = self.tree_height,
                        mid_key,
                        "Grew a new root"
                    );
                }
            }
        }

        self.write_info()
    }

    fn rec_insert(
        &mut self,
        key: i32,
        rid: RecordId,
        pid: PageId,
        level: i32,
    ) -> Result<Promotion, Error> {
        if level == self.tree_height {
            // Leaf level.
            let mut leaf = LeafNode::new();
            leaf.read(pid, &mut self.pf)?;

            if leaf.key_count() < MAX_KEYS {
                leaf.insert(key, rid)?;
                leaf.write(pid, &mut self.pf)?;
                return Ok(Promotion::None);
            }

            let mut sibling = LeafNode::new();
            let mid_key = leaf.insert_and_split(key, rid, &mut sibling)?;
            let sib_pid = self.pf.end_pid();
            sibling.set_next(leaf.next());
            sibling.write(sib_pid, &mut self.pf)?;
            leaf.set_next(sib_pid);
            leaf.write(pid, &mut self.pf)?;

            debug!(pid, sib_pid, mid_key, "Split leaf");
            Ok(Promotion::Split {
                mid_key,
                left: pid,
                right: sib_pid,
            })
        } else {
            let mut node = InternalNode::new();
            node.read(pid, &mut self.pf)?;
            let child = node.locate_child(key);
            trace!(pid, child, level, "Descending");

            match self.rec_insert(key, rid, child, level + 1)? {
                Promotion::None => Ok(Promotion::None),
                Promotion::Split {
                    mid_key, right, ..
                } => {
                    if node.key_count() < MAX_KEYS {
                        node.insert(mid_key, right)?;
                        node.write(pid, &mut self.pf)?;
                        return Ok(Promotion::None);
                    }

                    let mut sibling = InternalNode::new();
                    let new_mid = node.insert_and_split(mid_key, right, &mut sibling)?;
                    let sib_pid = self.pf.end_pid();
                    sibling.write(sib_pid, &mut self.pf)?;
                    node.write(pid, &mut self.pf)?;

                    debug!(pid, sib_pid, new_mid, "Split internal node");
                    Ok(Promotion::Split {
                        mid_key: new_mid,
                        left: pid,
                        right: sib_pid,
                    })
                }
            }
        }
    }

    /// Walks from the root to the leaf that may hold `search_key` and
    /// loads it into the cache. An empty tree reports `NoSuchRecord`.
    pub fn locate(&mut self, search_key: i32) -> Result<Lookup, Error> {
        if self.root_pid < 1 {
            return Err(Error::NoSuchRecord);
        }

        let mut pid = self.root_pid;
        for _ in 0..self.tree_height {
            let mut node = InternalNode::new();
            node.read(pid, &mut self.pf)?;
            pid = node.locate_child(search_key);
        }

        self.cache.read(pid, &mut self.pf)?;
        self.cache_pid = pid;

        Ok(match self.cache.locate(search_key) {
            Search::Hit(eid) => Lookup::Exact(IndexCursor { pid, eid }),
            Search::Miss(eid) => Lookup::Nearest(IndexCursor { pid, eid }),
        })
    }

    /// Reads the entry under the cursor and advances it by one slot.
    /// `None` means the cursor ran off the current leaf; call
    /// [`advance_leaf`](Self::advance_leaf) to follow the chain.
    pub fn read_forward(
        &mut self,
        cursor: &mut IndexCursor,
    ) -> Result<Option<(i32, RecordId)>, Error> {
        self.ensure_cached(cursor.pid)?;
        match self.cache.read_entry(cursor.eid) {
            Ok((key, rid)) => {
                cursor.eid += 1;
                Ok(Some((key, rid)))
            }
            Err(Error::NoSuchRecord) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Moves the cursor to the start of the next leaf in the chain,
    /// loading it into the cache. Returns `false` at the end of the
    /// chain (a next pointer of 0).
    pub fn advance_leaf(&mut self, cursor: &mut IndexCursor) -> Result<bool, Error> {
        self.ensure_cached(cursor.pid)?;
        let next = self.cache.next();
        if next == 0 {
            return Ok(false);
        }
        self.cache.read(next, &mut self.pf)?;
        self.cache_pid = next;
        cursor.pid = next;
        cursor.eid = 0;
        Ok(true)
    }

    fn ensure_cached(&mut self, pid: PageId) -> Result<(), Error> {
        if self.cache_pid != pid {
            self.cache.read(pid, &mut self.pf)?;
            self.cache_pid = pid;
        }
        Ok(())
    }

    /// Flushes and closes the index file.
    pub fn close(self) -> Result<(), Error> {
        self.pf.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rid(pid: i32, sid: i32) -> RecordId {
        RecordId { pid, sid }
    }

    fn open_fresh(dir: &tempfile::TempDir) -> BTreeIndex {
        BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap()
    }

    #[test]
    fn test_empty_then_one_insert() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        idx.insert(42, rid(7, 3)).unwrap();
        assert_eq!(idx.root_pid, 1);
        assert_eq!(idx.tree_height, 0);

        let lookup = idx.locate(42).unwrap();
        assert!(matches!(lookup, Lookup::Exact(_)));
        let mut cursor = lookup.cursor();
        assert_eq!(cursor, IndexCursor { pid: 1, eid: 0 });

        assert_eq!(idx.read_forward(&mut cursor).unwrap(), Some((42, rid(7, 3))));
        assert_eq!(idx.read_forward(&mut cursor).unwrap(), None);
        assert!(!idx.advance_leaf(&mut cursor).unwrap());
    }

    #[test]
    fn test_locate_on_empty_tree() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);
        assert!(matches!(idx.locate(1), Err(Error::NoSuchRecord)));
    }

    #[test]
    fn test_leaf_split_grows_root() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        for key in 1..=(MAX_KEYS as i32) {
            idx.insert(key, rid(key, 0)).unwrap();
        }
        assert_eq!(idx.tree_height, 0);

        idx.insert(85, rid(85, 0)).unwrap();
        assert_eq!(idx.tree_height, 1);

        // The new root holds exactly the first key of the right leaf:
        // 85 entries split 42/43, so the promoted key is 43.
        let root_pid = idx.root_pid;
        let mut root = InternalNode::new();
        root.read(root_pid, &mut idx.pf).unwrap();
        assert_eq!(root.key_count(), 1);
        assert_eq!(root.entry(0).0, 43);
        assert_eq!(root.locate_child(42), 1);
        assert_ne!(root.locate_child(43), 1);

        // Both halves are reachable through the routing key 43.
        assert!(matches!(idx.locate(42).unwrap(), Lookup::Exact(_)));
        assert!(matches!(idx.locate(43).unwrap(), Lookup::Exact(_)));
        assert!(matches!(idx.locate(85).unwrap(), Lookup::Exact(_)));
    }

    #[test]
    fn test_header_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        let (root, height) = {
            let mut idx = BTreeIndex::open(&path, OpenMode::Write).unwrap();
            for key in 0..200 {
                idx.insert(key, rid(key, 0)).unwrap();
            }
            let state = (idx.root_pid, idx.tree_height);
            idx.close().unwrap();
            state
        };

        let mut idx = BTreeIndex::open(&path, OpenMode::Read).unwrap();
        assert_eq!((idx.root_pid, idx.tree_height), (root, height));
        assert!(matches!(idx.locate(137).unwrap(), Lookup::Exact(_)));
    }

    #[test]
    fn test_leaf_chain_yields_sorted_keys() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        // 389 is coprime with 1000, so this inserts 0..1000 shuffled.
        let n = 1000;
        for i in 0..n {
            let key = (i * 389) % n;
            idx.insert(key, rid(key, 1)).unwrap();
        }

        let mut cursor = idx.locate(0).unwrap().cursor();
        let mut keys = Vec::new();
        loop {
            match idx.read_forward(&mut cursor).unwrap() {
                Some((key, r)) => {
                    assert_eq!(r, rid(key, 1));
                    keys.push(key);
                }
                None => {
                    if !idx.advance_leaf(&mut cursor).unwrap() {
                        break;
                    }
                }
            }
        }

        let expected: Vec<i32> = (0..n).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_tree_invariants_hold_after_many_inserts() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        let n = 3000;
        for i in 0..n {
            let key = (i * 2437) % n;
            idx.insert(key, rid(key, 0)).unwrap();
        }

        let root = idx.root_pid;
        check_subtree(&mut idx, root, 0, i32::MIN, i32::MAX);
    }

    /// Verifies sorted routing keys and subtree key bounds at every
    /// internal node, and sorted entries in every leaf. `low` is an
    /// inclusive bound, `high` an exclusive one; the i32 extremes act
    /// as "unbounded".
    fn check_subtree(idx: &mut BTreeIndex, pid: PageId, level: i32, low: i32, high: i32) {
        if level == idx.tree_height {
            let mut leaf = LeafNode::new();
            leaf.read(pid, &mut idx.pf).unwrap();
            let mut prev = None;
            for eid in 0..leaf.key_count() {
                let (key, _) = leaf.read_entry(eid).unwrap();
                if let Some(p) = prev {
                    assert!(key > p, "leaf {} entry {} out of order", pid, eid);
                }
                assert!(key >= low, "leaf {} underflows bound", pid);
                assert!(key < high || high == i32::MAX, "leaf {} overflows bound", pid);
                prev = Some(key);
            }
            return;
        }

        let mut node = InternalNode::new();
        node.read(pid, &mut idx.pf).unwrap();
        let count = node.key_count();
        assert!(count >= 1);

        let mut bounds = vec![low];
        let mut children = vec![node.first_child()];
        let mut prev = None;
        for eid in 0..count {
            let (key, child) = node.entry(eid);
            if let Some(p) = prev {
                assert!(key > p, "node {} routing keys out of order", pid);
            }
            prev = Some(key);
            bounds.push(key);
            children.push(child);
        }
        bounds.push(high);

        for (i, child) in children.iter().enumerate() {
            check_subtree(idx, *child, level + 1, bounds[i], bounds[i + 1]);
        }
    }

    #[test]
    fn test_cursor_survives_insert_between_reads() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        for key in 0..10 {
            idx.insert(key * 2, rid(key, 0)).unwrap();
        }

        let mut cursor = idx.locate(0).unwrap().cursor();
        assert_eq!(idx.read_forward(&mut cursor).unwrap().unwrap().0, 0);

        // An insert drops the cached leaf; the next read reloads it.
        idx.insert(5, rid(99, 0)).unwrap();
        assert_eq!(idx.read_forward(&mut cursor).unwrap().unwrap().0, 2);
    }

    #[test]
    fn test_duplicate_keys_all_reachable_in_scan() {
        let dir = tempdir().unwrap();
        let mut idx = open_fresh(&dir);

        idx.insert(7, rid(1, 0)).unwrap();
        idx.insert(7, rid(2, 0)).unwrap();
        idx.insert(3, rid(3, 0)).unwrap();

        let mut cursor = idx.locate(0).unwrap().cursor();
        let mut seen = Vec::new();
        while let Some((key, r)) = idx.read_forward(&mut cursor).unwrap() {
            seen.push((key, r));
        }
        assert_eq!(seen, vec![(3, rid(3, 0)), (7, rid(1, 0)), (7, rid(2, 0))]);
    }
}
