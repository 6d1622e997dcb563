//! Vitrine Catalog - Object media on disk
//!
//! Resolves object names to the media the screens show: vector files,
//! subtitled image/video segments and knowledge graphs.
//!
//! - `catalog` - directory scan and per-object lookups
//! - `segments` - subtitle to image/video pairing
//! - `knowledge` - knowledge JSON to graph translation

pub mod catalog;
pub mod error;
pub mod knowledge;
pub mod segments;

pub use catalog::{path_to_url, KnowledgeView, ObjectCatalog};
pub use error::{CatalogError, CatalogResult};
pub use knowledge::{
    translate_tree, GraphEdge, GraphNode, KnowledgeGraph, KnowledgeGraphService, NodeData,
    NodeKind, TreeNode,
};
pub use segments::Segment;
