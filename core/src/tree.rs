use crate::AnalysisRecord;
use serde::Serialize;

/// Node shape shared by the file and process trees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub is_container: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnalysisRecord>,
}

impl TreeNode {
    pub fn leaf(id: String, name: &str, payload: Option<AnalysisRecord>) -> Self {
        TreeNode { id, name: name.to_string(), is_container: false, children: None, payload }
    }

    pub fn container(id: String, name: &str) -> Self {
        TreeNode { id, name: name.to_string(), is_container: true, children: Some(Vec::new()), payload: None }
    }

    /// Mark as container and open a children slot. Existing children are kept.
    pub fn promote(&mut self) {
        self.is_container = true;
        if self.children.is_none() {
            self.children = Some(Vec::new());
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Number of nodes in this subtree, self included.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(TreeNode::count).sum::<usize>()
    }

    /// Number of payload-bearing nodes in this subtree.
    pub fn payload_count(&self) -> usize {
        usize::from(self.payload.is_some()) + self.children().iter().map(TreeNode::payload_count).sum::<usize>()
    }
}

pub fn forest_count(roots: &[TreeNode]) -> usize {
    roots.iter().map(TreeNode::count).sum()
}

/// Sequential id source. Ids are unique within one build only.
#[derive(Debug)]
pub struct NodeIds {
    prefix: &'static str,
    next: u64,
}

impl NodeIds {
    pub fn new(prefix: &'static str) -> Self {
        NodeIds { prefix, next: 0 }
    }

    pub fn next(&mut self, tag: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{}-{}-{}", self.prefix, n, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_keeps_payload_and_opens_slot() {
        let mut rec = AnalysisRecord::new();
        rec.insert("Path".into(), "A".into());
        let mut n = TreeNode::leaf("x".into(), "A", Some(rec));
        n.promote();
        assert!(n.is_container);
        assert_eq!(n.children, Some(Vec::new()));
        assert!(n.payload.is_some());
    }

    #[test]
    fn counts_walk_subtree() {
        let mut root = TreeNode::container("r".into(), "r");
        root.children.as_mut().unwrap().push(TreeNode::leaf("a".into(), "a", Some(AnalysisRecord::new())));
        root.children.as_mut().unwrap().push(TreeNode::leaf("b".into(), "b", None));
        assert_eq!(root.count(), 3);
        assert_eq!(root.payload_count(), 1);
        assert_eq!(forest_count(&[root.clone(), root]), 6);
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = NodeIds::new("node");
        assert_ne!(ids.next("a"), ids.next("a"));
    }

    #[test]
    fn serializes_camel_case_and_skips_empty() {
        let n = TreeNode::leaf("id".into(), "f", None);
        let s = serde_json::to_string(&n).unwrap();
        assert_eq!(s, r#"{"id":"id","name":"f","isContainer":false}"#);
    }
}
