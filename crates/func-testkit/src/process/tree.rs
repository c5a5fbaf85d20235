//! Process-tree snapshots and leaf-first termination.
//!
//! A tree is rebuilt for every kill request: every running pid is mapped to
//! its parent through a [`ParentLookup`], and the result is inverted into
//! parent → children. Walking it depth-first and listing children before
//! their parent means no grandchild gets orphaned by killing its parent
//! first.

use crate::platform::{self, ParentLookup};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Parent → children map of the processes alive at snapshot time.
#[derive(Debug, Clone, Default)]
pub struct ProcessTree {
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessTree {
    /// Build a tree from `(pid, parent_pid)` pairs.
    pub fn from_parents<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, parent) in pairs {
            if pid != parent {
                children.entry(parent).or_default().push(pid);
            }
        }
        Self { children }
    }

    /// Resolve the parent of every pid in `pids`. Pids whose parent cannot be
    /// resolved are left out.
    pub fn scan<I>(pids: I, lookup: &dyn ParentLookup) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self::from_parents(
            pids.into_iter()
                .filter_map(|pid| lookup.parent_of(pid).map(|parent| (pid, parent))),
        )
    }

    /// Snapshot the whole OS process table.
    pub fn snapshot(lookup: &dyn ParentLookup) -> Self {
        Self::scan(platform::running_pids(), lookup)
    }

    /// Direct children of `pid`.
    pub fn children(&self, pid: u32) -> &[u32] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or_default()
    }

    /// All descendants of `root`, each listed after its own descendants.
    pub fn descendants(&self, root: u32) -> Vec<u32> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([root]);
        self.collect(root, &mut visited, &mut result);
        result
    }

    /// Descendants leaf-first, then `root` itself.
    pub fn kill_order(&self, root: u32) -> Vec<u32> {
        let mut order = self.descendants(root);
        order.push(root);
        order
    }

    fn collect(&self, pid: u32, visited: &mut HashSet<u32>, result: &mut Vec<u32>) {
        for &child in self.children(pid) {
            // Pid reuse can make the parent map cyclic.
            if !visited.insert(child) {
                continue;
            }
            self.collect(child, visited, result);
            result.push(child);
        }
    }
}

/// Kill every live descendant of `root`, deepest first, using `kill`.
///
/// Pids that are no longer alive when their turn comes are skipped. Kill
/// failures are logged and ignored. Returns the pids that were signalled.
pub fn kill_descendants_with<A, K>(root: u32, tree: &ProcessTree, is_alive: A, mut kill: K) -> Vec<u32>
where
    A: Fn(u32) -> bool,
    K: FnMut(u32) -> crate::Result<bool>,
{
    let mut killed = Vec::new();
    for pid in tree.descendants(root) {
        if !is_alive(pid) {
            continue;
        }
        match kill(pid) {
            Ok(true) => killed.push(pid),
            Ok(false) => debug!("Process {} exited before it could be killed", pid),
            Err(e) => debug!("Failed to kill descendant {} of {}: {}", pid, root, e),
        }
    }
    killed
}

/// Kill every live descendant of `root` on this machine.
pub fn kill_descendants(root: u32) -> Vec<u32> {
    let lookup = platform::platform_lookup();
    let tree = ProcessTree::snapshot(lookup.as_ref());
    kill_descendants_with(root, &tree, platform::is_process_alive, platform::kill_process)
}
