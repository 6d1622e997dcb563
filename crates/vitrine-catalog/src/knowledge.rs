//! Knowledge-graph translation.
//!
//! Knowledge files are free-form JSON trees (objects of objects, lists and
//! strings). They are turned into a labelled tree first and then flattened
//! into the `{nodes, edges}` shape the graph widget consumes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};

// ============================================================================
// Graph Types
// ============================================================================

/// Position of a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Sub,
    Leaf,
}

/// Labelled tree built from a knowledge file.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: String,
    pub text: String,
    pub level: u32,
    pub kind: NodeKind,
    /// Top-level branch this node hangs off, used for colouring
    pub branch: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn graph_node(&self) -> GraphNode {
        GraphNode {
            id: self.id.clone(),
            data: NodeData {
                branch: self.branch.clone(),
                text: self.text.clone(),
                level: self.level,
                kind: self.kind,
            },
        }
    }

    /// Flattens the tree into pre-order nodes and parent-to-child edges.
    pub fn to_graph(&self) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph {
            nodes: vec![self.graph_node()],
            edges: Vec::new(),
        };
        self.collect_children(&mut graph);
        graph
    }

    fn collect_children(&self, graph: &mut KnowledgeGraph) {
        for child in &self.children {
            graph.nodes.push(child.graph_node());
            graph.edges.push(GraphEdge {
                source: self.id.clone(),
                target: child.id.clone(),
            });
            child.collect_children(graph);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub branch: String,
    pub text: String,
    pub level: u32,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Graph payload: `{"nodes": [...], "edges": [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

// ============================================================================
// Tree Translation
// ============================================================================

/// Builds a tree rooted at `name` from raw knowledge JSON.
pub fn translate_tree(name: &str, raw: &Value) -> TreeNode {
    let mut builder = TreeBuilder { next_id: 0, branch: 0 };
    let mut root = builder.node(name.to_string(), 0, NodeKind::Root);
    builder.branch = 1;
    builder.attach(&mut root, raw, 1);
    root
}

/// Id counter and branch counter for one translation.
struct TreeBuilder {
    next_id: u64,
    branch: u64,
}

impl TreeBuilder {
    fn node(&mut self, text: String, level: u32, kind: NodeKind) -> TreeNode {
        let id = self.next_id.to_string();
        self.next_id += 1;
        TreeNode {
            id,
            text,
            level,
            kind,
            branch: self.branch.to_string(),
            children: Vec::new(),
        }
    }

    fn attach(&mut self, parent: &mut TreeNode, value: &Value, level: u32) {
        match value {
            Value::String(text) => {
                let leaf = self.node(text.trim().to_string(), level, NodeKind::Leaf);
                parent.children.push(leaf);
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Value::String(text) = item {
                        let leaf = self.node(text.trim().to_string(), level, NodeKind::Leaf);
                        parent.children.push(leaf);
                        continue;
                    }
                    let mut sub = self.node(index.to_string(), level, NodeKind::Sub);
                    self.attach(&mut sub, item, level + 1);
                    parent.children.push(sub);
                }
            }
            Value::Object(entries) => {
                for (key, child) in entries {
                    let mut sub = self.node(key.clone(), level, NodeKind::Sub);
                    self.attach(&mut sub, child, level + 1);
                    parent.children.push(sub);
                    if level == 1 {
                        self.branch += 1;
                    }
                }
            }
            other => {
                warn!(value = %other, "Dropping unprocessable knowledge node");
            }
        }
    }
}

// ============================================================================
// Knowledge Graph Service
// ============================================================================

/// Reads knowledge files and translates them, caching parsed JSON by path.
#[derive(Default)]
pub struct KnowledgeGraphService {
    cache: Mutex<HashMap<PathBuf, Arc<Value>>>,
}

impl KnowledgeGraphService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads (or recalls) the raw JSON at `path`.
    pub fn read_raw(&self, path: &Path) -> CatalogResult<Arc<Value>> {
        if let Some(cached) = self.cache.lock().get(path) {
            return Ok(Arc::clone(cached));
        }

        debug!(path = %path.display(), "Reading knowledge file");
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        let value: Value = serde_json::from_str(&text).map_err(|error| CatalogError::Json {
            path: path.to_path_buf(),
            error,
        })?;

        let value = Arc::new(value);
        self.cache
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&value));
        Ok(value)
    }

    /// Builds the graph for object `name` from the knowledge file at `path`.
    pub fn graph_data(&self, name: &str, path: &Path) -> CatalogResult<KnowledgeGraph> {
        let raw = self.read_raw(path)?;
        let tree = translate_tree(name, &raw);
        debug!(
            name,
            top_level = tree.children.len(),
            "Translated knowledge tree"
        );
        Ok(tree.to_graph())
    }

    /// Number of cached files.
    pub fn cached_files(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texts(graph: &KnowledgeGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.data.text.as_str()).collect()
    }

    #[test]
    fn test_root_node() {
        let tree = translate_tree("apple", &json!({}));
        assert_eq!(tree.id, "0");
        assert_eq!(tree.text, "apple");
        assert_eq!(tree.level, 0);
        assert_eq!(tree.kind, NodeKind::Root);
        assert_eq!(tree.branch, "0");
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_object_keys_become_sub_nodes_with_branches() {
        let raw = json!({
            "colour": "red",
            "taste": ["sweet", "sour"],
        });
        let graph = translate_tree("apple", &raw).to_graph();

        assert_eq!(texts(&graph), vec!["apple", "colour", "red", "taste", "sweet", "sour"]);

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5"]);

        let branches: Vec<&str> = graph.nodes.iter().map(|n| n.data.branch.as_str()).collect();
        assert_eq!(branches, vec!["0", "1", "1", "2", "2", "2"]);

        let kinds: Vec<NodeKind> = graph.nodes.iter().map(|n| n.data.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Root,
                NodeKind::Sub,
                NodeKind::Leaf,
                NodeKind::Sub,
                NodeKind::Leaf,
                NodeKind::Leaf
            ]
        );

        let levels: Vec<u32> = graph.nodes.iter().map(|n| n.data.level).collect();
        assert_eq!(levels, vec![0, 1, 2, 1, 2, 2]);
    }

    #[test]
    fn test_edges_link_parent_to_child() {
        let raw = json!({"a": {"b": "leaf"}});
        let graph = translate_tree("x", &raw).to_graph();
        let edges: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(edges, vec![("0", "1"), ("1", "2"), ("2", "3")]);
    }

    #[test]
    fn test_list_items_that_are_not_strings_get_index_nodes() {
        let raw = json!([{"k": "v"}, "plain"]);
        let tree = translate_tree("x", &raw);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].text, "0");
        assert_eq!(tree.children[0].kind, NodeKind::Sub);
        assert_eq!(tree.children[0].children[0].text, "k");
        assert_eq!(tree.children[1].text, "plain");
        assert_eq!(tree.children[1].kind, NodeKind::Leaf);
    }

    #[test]
    fn test_leaf_text_is_trimmed() {
        let tree = translate_tree("x", &json!("  spaced out \n"));
        assert_eq!(tree.children[0].text, "spaced out");
    }

    #[test]
    fn test_nested_keys_do_not_advance_branch() {
        let raw = json!({"a": {"b": "1", "c": "2"}, "d": "3"});
        let graph = translate_tree("x", &raw).to_graph();
        let d = graph.nodes.iter().find(|n| n.data.text == "d").unwrap();
        assert_eq!(d.data.branch, "2");
        let c = graph.nodes.iter().find(|n| n.data.text == "c").unwrap();
        assert_eq!(c.data.branch, "1");
    }

    #[test]
    fn test_unsupported_values_are_dropped() {
        let raw = json!({"n": 42, "flag": true});
        let graph = translate_tree("x", &raw).to_graph();
        assert_eq!(texts(&graph), vec!["x", "n", "flag"]);
    }

    #[test]
    fn test_graph_serialization_shape() {
        let graph = translate_tree("x", &json!("y")).to_graph();
        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            value["nodes"][1],
            json!({"id": "1", "data": {"branch": "1", "text": "y", "level": 1, "type": "leaf"}})
        );
        assert_eq!(value["edges"][0], json!({"source": "0", "target": "1"}));
    }

    #[test]
    fn test_service_caches_parsed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apple_kg.json");
        std::fs::write(&path, r#"{"colour": "red"}"#).unwrap();

        let service = KnowledgeGraphService::new();
        let first = service.graph_data("apple", &path).unwrap();
        assert_eq!(service.cached_files(), 1);

        // Served from cache even after the file disappears
        std::fs::remove_file(&path).unwrap();
        let second = service.graph_data("apple", &path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_service_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken_kg.json");
        std::fs::write(&path, "{not json").unwrap();

        let service = KnowledgeGraphService::new();
        let err = service.graph_data("x", &path).unwrap_err();
        assert!(matches!(err, CatalogError::Json { .. }));
        assert_eq!(service.cached_files(), 0);
    }
}
