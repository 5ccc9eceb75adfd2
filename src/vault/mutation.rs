//! The batched mutation operations and the copy-on-write "make safe path"
//! protocol that applies them (§4.5).

use super::shard;
use crate::backend::Backend;
use crate::engine::{compile_tree, CompileOptions};
use crate::error::{IndigoError, Result};
use crate::rule::{validate_id, Rule};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One mutation in a batch, applied left-to-right against a working
/// snapshot (§4.5).
pub enum Op<B: Backend> {
    /// Insert `rule` under `parent_id`, subject to shard routing; compile
    /// `rule`'s subtree.
    Add { rule: Rule<B>, parent_id: String },
    /// Replace the existing rule sharing `rule.id`; compile; re-route if
    /// the rule lives in a shard and its routing outcome changed.
    Update { rule: Rule<B> },
    /// Remove the rule with `id`. Fails if `id` is the root.
    Delete { id: String },
    /// Equivalent to `Delete` + `Add` under `new_parent_id`. Fails if
    /// `new_parent_id` is `id` itself or a descendant of it.
    Move { id: String, new_parent_id: String },
    /// Set the vault's `last_update` timestamp explicitly.
    LastUpdate { timestamp: DateTime<Utc> },
}

/// Apply a single op against `root` (the batch's in-progress working
/// tree), cloning ancestor nodes on first touch via `Arc::get_mut`/clone
/// (§9: the "already-copied" set is realized through `Arc` refcounts
/// rather than an explicit keyed set — see DESIGN.md).
pub(crate) fn apply_op<B: Backend>(
    backend: &B,
    compile_opts: &CompileOptions,
    root: &mut Rule<B>,
    op: Op<B>,
) -> Result<Option<DateTime<Utc>>> {
    match op {
        Op::Add { rule, parent_id } => {
            apply_add(backend, compile_opts, root, rule, &parent_id)?;
            Ok(None)
        }
        Op::Update { rule } => {
            apply_update(backend, compile_opts, root, rule)?;
            Ok(None)
        }
        Op::Delete { id } => {
            apply_delete(root, &id)?;
            Ok(None)
        }
        Op::Move { id, new_parent_id } => {
            apply_move(root, &id, &new_parent_id)?;
            Ok(None)
        }
        Op::LastUpdate { timestamp } => Ok(Some(timestamp)),
    }
}

fn apply_add<B: Backend>(
    backend: &B,
    compile_opts: &CompileOptions,
    root: &mut Rule<B>,
    mut rule: Rule<B>,
    parent_id: &str,
) -> Result<()> {
    validate_id(&rule.id)?;
    if find_anywhere(root, &rule.id).is_some() {
        return Err(IndigoError::DuplicateId(rule.id.to_string()));
    }

    let path_ids = path_ids_to(root, parent_id)
        .ok_or_else(|| IndigoError::NotFound(parent_id.to_string()))?;
    compile_tree(backend, &mut rule, compile_opts)?;

    let host = descend_mut(root, &path_ids)?;
    if rule.is_shard_root() {
        if host.shards.iter().any(|s| s.id == rule.id) {
            return Err(IndigoError::DuplicateId(rule.id.to_string()));
        }
        host.shards.push(Arc::new(rule));
    } else {
        let shard_path = shard::route(host, &rule);
        let target = descend_mut(host, &shard_path)?;
        target.children.push(Arc::new(rule));
    }
    Ok(())
}

fn apply_update<B: Backend>(
    backend: &B,
    compile_opts: &CompileOptions,
    root: &mut Rule<B>,
    mut rule: Rule<B>,
) -> Result<()> {
    validate_id(&rule.id)?;
    let trail = find_anywhere(root, &rule.id)
        .ok_or_else(|| IndigoError::NotFound(rule.id.to_string()))?;

    compile_tree(backend, &mut rule, compile_opts)?;

    if trail.len() < 2 {
        // Updating the root itself: no host/shard routing applies.
        *root = rule;
        return Ok(());
    }

    // The "host" is the nearest ancestor reached via an ordinary child
    // link, i.e. the last step in the trail before a contiguous run of
    // shard links leading to the rule (§4.6, open question #3: re-route
    // only when the classifier outcome actually changes).
    let host_idx = host_index(root, &trail);
    let host_path: Vec<Arc<str>> = trail[1..=host_idx].to_vec();
    let old_shard_path: Vec<Arc<str>> = trail[host_idx + 1..trail.len() - 1].to_vec();

    // Remove the old node from its current position.
    {
        let host_mut = descend_mut(root, &host_path)?;
        let old_in_shard = descend_mut(host_mut, &old_shard_path)?;
        remove_child_or_shard(old_in_shard, &rule.id)?;
    }

    let host_mut = descend_mut(root, &host_path)?;
    let new_shard_path = if rule.is_shard_root() {
        Vec::new()
    } else {
        shard::route(host_mut, &rule)
    };

    if rule.is_shard_root() {
        host_mut.shards.push(Arc::new(rule));
        return Ok(());
    }

    if new_shard_path == old_shard_path {
        // Routing outcome unchanged: reinsert at the same position.
        let target = descend_mut(host_mut, &old_shard_path)?;
        target.children.push(Arc::new(rule));
    } else {
        let target = descend_mut(host_mut, &new_shard_path)?;
        target.children.push(Arc::new(rule));
    }
    Ok(())
}

fn apply_delete<B: Backend>(root: &mut Rule<B>, id: &str) -> Result<()> {
    if &*root.id == id {
        return Err(IndigoError::Argument("cannot delete the root rule".to_string()));
    }
    let trail = find_anywhere(root, id).ok_or_else(|| IndigoError::NotFound(id.to_string()))?;
    let parent_path: Vec<Arc<str>> = trail[1..trail.len() - 1].to_vec();
    let parent = descend_mut(root, &parent_path)?;
    remove_child_or_shard(parent, id)
}

fn apply_move<B: Backend>(root: &mut Rule<B>, id: &str, new_parent_id: &str) -> Result<()> {
    if id == new_parent_id {
        return Err(IndigoError::CycleError {
            id: id.to_string(),
            new_parent: new_parent_id.to_string(),
        });
    }
    if &*root.id == id {
        return Err(IndigoError::Argument("cannot move the root rule".to_string()));
    }

    let (subtree, _) = root
        .find(id)
        .ok_or_else(|| IndigoError::NotFound(id.to_string()))?;
    if subtree.find(new_parent_id).is_some() {
        return Err(IndigoError::CycleError {
            id: id.to_string(),
            new_parent: new_parent_id.to_string(),
        });
    }

    let new_parent_path = path_ids_to(root, new_parent_id)
        .ok_or_else(|| IndigoError::NotFound(new_parent_id.to_string()))?;

    // Detach: remove from its current parent, keeping the `Arc` intact
    // (no recompilation — the subtree's content and program are unchanged
    // by a move, only its position, per DESIGN.md).
    let trail = find_anywhere(root, id).expect("already located above");
    let parent_path: Vec<Arc<str>> = trail[1..trail.len() - 1].to_vec();
    let detached = {
        let parent = descend_mut(root, &parent_path)?;
        take_child_or_shard(parent, id)?
    };

    let host = descend_mut(root, &new_parent_path)?;
    if detached.is_shard_root() {
        host.shards.push(detached);
    } else {
        let shard_path = shard::route(host, &detached);
        let target = descend_mut(host, &shard_path)?;
        target.children.push(detached);
    }
    Ok(())
}

/// The ids (root's children and below, not including `root` itself) from
/// `root` down to and including `id`. `descend_mut` walks this path
/// starting from `root`, so it must terminate at `id`'s own node, not its
/// parent.
fn path_ids_to<B: Backend>(root: &Rule<B>, id: &str) -> Option<Vec<Arc<str>>> {
    if &*root.id == id {
        return Some(Vec::new());
    }
    root.find(id).map(|(_, ancestors)| {
        let mut ids: Vec<Arc<str>> = ancestors.into_iter().skip(1).map(|r| r.id.clone()).collect();
        ids.push(Arc::from(id));
        ids
    })
}

/// The full ancestor trail (root, ..., rule's parent) as ids, used so
/// `apply_update`/`apply_delete` can re-derive host/shard boundaries.
fn find_anywhere<B: Backend>(root: &Rule<B>, id: &str) -> Option<Vec<Arc<str>>> {
    root.find(id).map(|(_, ancestors)| {
        let mut ids: Vec<Arc<str>> = ancestors.into_iter().map(|r| r.id.clone()).collect();
        ids.push(Arc::from(id));
        ids
    })
}

/// Index into `trail` (ids from root to the rule, inclusive) of the node
/// that originally routed the rule: the tree always reaches a rule by zero
/// or more ordinary `children` hops down to some node, then zero or more
/// `shards` hops classifying it into a nested shard, then a final
/// `children` hop placing it. The host is the node just before the first
/// `shards` hop, or the rule's immediate parent if no shard hop occurs.
fn host_index<B: Backend>(root: &Rule<B>, trail: &[Arc<str>]) -> usize {
    let mut node = root;
    for i in 0..trail.len() - 1 {
        let next_id = &trail[i + 1];
        if node.shards.iter().any(|s| s.id == *next_id) {
            return i;
        }
        match node.children.iter().find(|c| c.id == *next_id) {
            Some(c) => node = c,
            None => break,
        }
    }
    trail.len() - 2
}

fn descend_mut<'a, B: Backend>(root: &'a mut Rule<B>, path: &[Arc<str>]) -> Result<&'a mut Rule<B>> {
    let mut node = root;
    for id in path {
        node = ensure_mut_child(node, id)?;
    }
    Ok(node)
}

fn ensure_mut_child<'a, B: Backend>(parent: &'a mut Rule<B>, id: &str) -> Result<&'a mut Rule<B>> {
    if let Some(idx) = parent.children.iter().position(|c| &*c.id == id) {
        return ensure_mut_at(&mut parent.children, idx);
    }
    if let Some(idx) = parent.shards.iter().position(|s| &*s.id == id) {
        return ensure_mut_at(&mut parent.shards, idx);
    }
    Err(IndigoError::NotFound(id.to_string()))
}

/// Obtain a mutable reference to `list[idx]`'s node, cloning it first if
/// (and only if) it is still shared with a previously-published snapshot
/// or another live reference — i.e. the make-safe-path clone-on-first-touch
/// (§4.5, §9).
fn ensure_mut_at<B: Backend>(list: &mut [Arc<Rule<B>>], idx: usize) -> Result<&mut Rule<B>> {
    if Arc::get_mut(&mut list[idx]).is_none() {
        let cloned = (*list[idx]).clone();
        list[idx] = Arc::new(cloned);
    }
    Ok(Arc::get_mut(&mut list[idx]).expect("just ensured unique ownership"))
}

fn remove_child_or_shard<B: Backend>(parent: &mut Rule<B>, id: &str) -> Result<()> {
    if let Some(idx) = parent.children.iter().position(|c| &*c.id == id) {
        parent.children.remove(idx);
        return Ok(());
    }
    if let Some(idx) = parent.shards.iter().position(|s| &*s.id == id) {
        parent.shards.remove(idx);
        return Ok(());
    }
    Err(IndigoError::NotFound(id.to_string()))
}

fn take_child_or_shard<B: Backend>(parent: &mut Rule<B>, id: &str) -> Result<Arc<Rule<B>>> {
    if let Some(idx) = parent.children.iter().position(|c| &*c.id == id) {
        return Ok(parent.children.remove(idx));
    }
    if let Some(idx) = parent.shards.iter().position(|s| &*s.id == id) {
        return Ok(parent.shards.remove(idx));
    }
    Err(IndigoError::NotFound(id.to_string()))
}
