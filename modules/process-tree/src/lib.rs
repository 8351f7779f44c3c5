//! Process forest from analysis records.
//!
//! Sources either embed children under [`CHILDREN_FIELD`] or provide flat
//! pid/ppid pairs (or both). Everything is first flattened into an arena,
//! embedded links are kept, the remaining nodes are linked by parent id, and
//! roots are the nodes left without a parent.

use scanview_core::normalize::{self, FieldPurpose};
use scanview_core::{AnalysisRecord, NodeIds, TreeNode};
use serde_json::Value;
use std::collections::HashMap;

/// Reserved field holding embedded child records.
pub const CHILDREN_FIELD: &str = "__children";

struct Slot {
    record: AnalysisRecord,
    pid: Option<i64>,
    ppid: Option<i64>,
    parent: Option<usize>,
}

pub fn build_process_tree(records: &[AnalysisRecord]) -> Vec<TreeNode> {
    let mut arena = Vec::with_capacity(records.len());
    for r in records {
        flatten_into(r, None, &mut arena);
    }
    link_by_id(&mut arena);
    materialize(arena)
}

fn flatten_into(record: &AnalysisRecord, parent: Option<usize>, arena: &mut Vec<Slot>) {
    let mut own = record.clone();
    let embedded = own.remove(CHILDREN_FIELD);
    let idx = arena.len();
    arena.push(Slot {
        pid: normalize::resolve_int(&own, FieldPurpose::ProcessId),
        ppid: normalize::resolve_int(&own, FieldPurpose::ParentId),
        parent,
        record: own,
    });
    if let Some(Value::Array(children)) = embedded {
        for c in children.iter().filter_map(Value::as_object) {
            flatten_into(c, Some(idx), arena);
        }
    }
}

fn link_by_id(arena: &mut [Slot]) {
    // pid reuse: the first occurrence owns the id
    let mut by_pid: HashMap<i64, usize> = HashMap::new();
    for (i, s) in arena.iter().enumerate() {
        if let Some(pid) = s.pid {
            by_pid.entry(pid).or_insert(i);
        }
    }
    for i in 0..arena.len() {
        if arena[i].parent.is_some() {
            continue;
        }
        let Some(ppid) = arena[i].ppid else { continue };
        let Some(&p) = by_pid.get(&ppid) else { continue };
        if !reaches(arena, p, i) {
            arena[i].parent = Some(p);
        }
    }
}

/// True if walking up from `from` hits `target`.
fn reaches(arena: &[Slot], from: usize, target: usize) -> bool {
    let mut cur = Some(from);
    while let Some(c) = cur {
        if c == target {
            return true;
        }
        cur = arena[c].parent;
    }
    false
}

fn materialize(mut arena: Vec<Slot>) -> Vec<TreeNode> {
    let mut kids: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    let mut roots = Vec::new();
    for (i, s) in arena.iter().enumerate() {
        match s.parent {
            Some(p) => kids[p].push(i),
            None => roots.push(i),
        }
    }
    let mut ids = NodeIds::new("pid");
    roots.into_iter().map(|r| make_node(r, &mut arena, &kids, &mut ids)).collect()
}

fn make_node(i: usize, arena: &mut [Slot], kids: &[Vec<usize>], ids: &mut NodeIds) -> TreeNode {
    let record = std::mem::take(&mut arena[i].record);
    let name = normalize::resolve(&record, FieldPurpose::DisplayName).unwrap_or_else(|| "Unknown".to_string());
    let tag = arena[i].pid.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string());
    let id = ids.next(&tag);
    let children: Vec<TreeNode> = kids[i].iter().map(|&c| make_node(c, arena, kids, ids)).collect();
    let mut node = TreeNode::leaf(id, &name, Some(record));
    if !children.is_empty() {
        node.is_container = true;
        node.children = Some(children);
    }
    node
}
