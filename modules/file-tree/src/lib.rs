//! Directory/file tree from analysis records.
//!
//! Two input shapes are accepted: flat records carrying a path string, and
//! records that are already nested (`name`/`type`/`children`), as produced by
//! the server-side recovered-filesystem walk.

use scanview_core::normalize::{self, FieldPurpose};
use scanview_core::{AnalysisRecord, NodeIds, TreeNode};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTreeMode {
    /// Split each record's path into segments and merge them into a tree.
    FlatPaths,
    /// Map an already-nested source structurally.
    Hierarchical,
}

impl FileTreeMode {
    /// Nested sources tag their rows with `type: file|directory`.
    pub fn detect(records: &[AnalysisRecord]) -> Self {
        let nested = records
            .first()
            .and_then(|r| r.get("type"))
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("file") || t.eq_ignore_ascii_case("directory"))
            .unwrap_or(false);
        if nested { FileTreeMode::Hierarchical } else { FileTreeMode::FlatPaths }
    }
}

pub fn build_file_tree(records: &[AnalysisRecord], mode: FileTreeMode) -> Vec<TreeNode> {
    let mut ids = NodeIds::new("node");
    match mode {
        FileTreeMode::FlatPaths => build_from_paths(records, &mut ids),
        FileTreeMode::Hierarchical => records.iter().filter_map(|r| map_nested(r, &mut ids)).collect(),
    }
}

/// Split on backslash; if that yields at most one segment, split on forward
/// slash instead. Empty segments are dropped, as are stray backslashes left
/// around slash-separated segments.
///
/// Known ambiguity: a Windows-style name with a literal `/` and no backslash
/// (`foo/bar`) is split on the slash.
pub fn split_path(path: &str) -> Vec<&str> {
    let parts: Vec<&str> = path.split('\\').filter(|s| !s.is_empty()).collect();
    if parts.len() > 1 {
        return parts;
    }
    path.split('/').map(|s| s.trim_matches('\\')).filter(|s| !s.is_empty()).collect()
}

/// Explicit directory metadata on the record itself.
pub fn marks_directory(record: &AnalysisRecord) -> bool {
    let typed = normalize::resolve(record, FieldPurpose::EntryType)
        .map(|t| t.eq_ignore_ascii_case("dir") || t.eq_ignore_ascii_case("directory"))
        .unwrap_or(false);
    typed
        || normalize::resolve(record, FieldPurpose::Attributes)
            .map(|a| a.to_ascii_lowercase().contains("directory"))
            .unwrap_or(false)
}

fn build_from_paths(records: &[AnalysisRecord], ids: &mut NodeIds) -> Vec<TreeNode> {
    let mut roots = Vec::new();
    for record in records {
        let Some(path) = normalize::resolve(record, FieldPurpose::Path) else { continue };
        let segments = split_path(&path);
        if segments.is_empty() {
            continue;
        }
        insert_path(&mut roots, &segments, record, marks_directory(record), ids);
    }
    roots
}

fn insert_path(roots: &mut Vec<TreeNode>, segments: &[&str], record: &AnalysisRecord, last_is_dir: bool, ids: &mut NodeIds) {
    let mut level = roots;
    for (i, seg) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let container = !last || last_is_dir;
        let pos = match level.iter().position(|n| n.name == *seg) {
            Some(pos) => pos,
            None => {
                let id = ids.next(seg);
                level.push(if container { TreeNode::container(id, seg) } else { TreeNode::leaf(id, seg, None) });
                level.len() - 1
            }
        };
        let node = &mut level[pos];
        if container && !node.is_container {
            node.promote();
        }
        if last {
            // repeated path: last write wins
            node.payload = Some(record.clone());
            return;
        }
        level = node.children.get_or_insert_with(Vec::new);
    }
}

fn map_nested(record: &AnalysisRecord, ids: &mut NodeIds) -> Option<TreeNode> {
    let name = record
        .get("name")
        .and_then(normalize::text_of)
        .or_else(|| {
            record
                .get("path")
                .and_then(normalize::text_of)
                .and_then(|p| split_path(&p).last().map(|s| s.to_string()))
        })?;
    let nested_children = record.get("children").and_then(Value::as_array);
    let is_dir = record
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.eq_ignore_ascii_case("directory") || t.eq_ignore_ascii_case("dir"))
        .unwrap_or(false);

    let mut payload = record.clone();
    payload.remove("children");
    let id = ids.next(&name);
    if !is_dir && nested_children.is_none() {
        return Some(TreeNode::leaf(id, &name, Some(payload)));
    }
    let mut node = TreeNode::container(id, &name);
    node.payload = Some(payload);
    let children = nested_children
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|c| map_nested(c, ids))
        .collect();
    node.children = Some(children);
    Some(node)
}
