//! Object catalog - resolves object names to media on disk.
//!
//! The base directory holds one directory per object *variant*, named
//! `<object>_<suffix>` (e.g. `apple_240909103649`). Several variants of the
//! same object may exist; lookups pick one at random.
//!
//! # Failure Policy
//!
//! Missing data never fails a lookup. Unknown names, absent directories and
//! unreadable files are logged at error level and the lookup returns an
//! empty result.
//!
//! # Async Safety
//!
//! All lookups perform blocking I/O. Async callers should run them via
//! `spawn_blocking`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{CatalogError, CatalogResult};
use crate::knowledge::{KnowledgeGraph, KnowledgeGraphService};
use crate::segments::{read_segments, Segment};

/// Directory inside a variant holding square knowledge-graph images.
pub const KNOWLEDGE_IMAGES_DIR: &str = "images_square";

/// Suffix identifying a variant's knowledge file.
pub const KNOWLEDGE_FILE_SUFFIX: &str = "kg.json";

/// Substring identifying a variant's vector file.
pub const VECTOR_FILE_MARKER: &str = "vector";

/// Knowledge graph with its illustrations, taken from a single variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeView {
    pub name: String,
    pub data: Option<KnowledgeGraph>,
    pub images: Vec<String>,
}

/// Scanned catalog of objects and their variant directories.
pub struct ObjectCatalog {
    variants: BTreeMap<String, Vec<PathBuf>>,
    knowledge: KnowledgeGraphService,
}

impl ObjectCatalog {
    /// Scans `base_directory` for object variants.
    ///
    /// Never fails: an absent or unreadable directory yields an empty
    /// catalog and an error log.
    pub fn scan(base_directory: impl Into<PathBuf>) -> Self {
        let base_directory = base_directory.into();
        let variants = match scan_variants(&base_directory) {
            Ok(variants) => variants,
            Err(e) => {
                error!(error = %e, "Object directory scan failed");
                BTreeMap::new()
            }
        };

        info!(
            directory = %base_directory.display(),
            objects = variants.len(),
            variants = variants.values().map(Vec::len).sum::<usize>(),
            "Object catalog scanned"
        );

        Self {
            variants,
            knowledge: KnowledgeGraphService::new(),
        }
    }

    /// All known object names, sorted.
    pub fn object_names(&self) -> BTreeSet<String> {
        self.variants.keys().cloned().collect()
    }

    /// Returns true if `name` has at least one variant.
    pub fn contains(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    /// Variant directories for `name`, in file-name order.
    pub fn variants(&self, name: &str) -> &[PathBuf] {
        self.variants.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of known objects.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Returns true if no objects were found.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Picks one variant of `name` at random.
    fn choose_variant(&self, name: &str) -> CatalogResult<&Path> {
        self.variants(name)
            .choose(&mut rand::rng())
            .map(PathBuf::as_path)
            .ok_or_else(|| CatalogError::UnknownObject(name.to_string()))
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Contents of the vector file of a random variant.
    pub fn vectors(&self, name: &str) -> Option<String> {
        let result = self.choose_variant(name).and_then(|variant| {
            let path = find_file(variant, VECTOR_FILE_MARKER, |f| f.contains(VECTOR_FILE_MARKER))?;
            std::fs::read_to_string(&path).map_err(|e| CatalogError::io(path, e))
        });

        match result {
            Ok(text) => Some(text),
            Err(e) => {
                error!(object = name, error = %e, "Vector lookup failed");
                None
            }
        }
    }

    /// Subtitled segments across every variant of `name`.
    ///
    /// Variants are visited in shuffled order and each segment id is
    /// prefixed with its variant's position, so ids stay unique.
    pub fn segments(&self, name: &str) -> Vec<Segment> {
        let mut rng = rand::rng();
        let mut variants = self.variants(name).to_vec();
        if variants.is_empty() {
            error!(object = name, "Segment lookup for unknown object");
            return Vec::new();
        }
        variants.shuffle(&mut rng);

        let mut segments = Vec::new();
        for (position, variant) in variants.iter().enumerate() {
            match read_segments(variant, &mut rng) {
                Ok(found) => {
                    segments.extend(found.into_iter().map(|mut segment| {
                        segment.id = format!("{position}{}", segment.id);
                        segment
                    }));
                }
                Err(e) => {
                    error!(object = name, error = %e, "Failed to read variant segments");
                }
            }
        }

        debug!(object = name, segments = segments.len(), "Collected segments");
        segments
    }

    /// Knowledge graph of a random variant.
    pub fn knowledge_graph(&self, name: &str) -> Option<KnowledgeGraph> {
        match self.choose_variant(name) {
            Ok(variant) => self.graph_in(name, variant),
            Err(e) => {
                error!(object = name, error = %e, "Knowledge graph lookup failed");
                None
            }
        }
    }

    /// Knowledge-graph image urls of a random variant.
    pub fn knowledge_image_urls(&self, name: &str) -> Vec<String> {
        match self.choose_variant(name) {
            Ok(variant) => images_in(variant),
            Err(e) => {
                error!(object = name, error = %e, "Knowledge image lookup failed");
                Vec::new()
            }
        }
    }

    /// Graph and images drawn from the same random variant.
    pub fn knowledge_view(&self, name: &str) -> KnowledgeView {
        let (data, images) = match self.choose_variant(name) {
            Ok(variant) => (self.graph_in(name, variant), images_in(variant)),
            Err(e) => {
                error!(object = name, error = %e, "Knowledge lookup failed");
                (None, Vec::new())
            }
        };

        KnowledgeView {
            name: name.to_string(),
            data,
            images,
        }
    }

    fn graph_in(&self, name: &str, variant: &Path) -> Option<KnowledgeGraph> {
        let result = find_file(variant, KNOWLEDGE_FILE_SUFFIX, |f| {
            f.ends_with(KNOWLEDGE_FILE_SUFFIX)
        })
        .and_then(|path| self.knowledge.graph_data(name, &path));

        match result {
            Ok(graph) => Some(graph),
            Err(e) => {
                error!(object = name, error = %e, "Failed to build knowledge graph");
                None
            }
        }
    }
}

// ============================================================================
// Blocking Filesystem Operations
// ============================================================================

/// Groups the variant directories under `base` by object name.
fn scan_variants(base: &Path) -> CatalogResult<BTreeMap<String, Vec<PathBuf>>> {
    debug!(directory = %base.display(), "Scanning object directory");
    if !base.is_dir() {
        return Err(CatalogError::MissingDirectory(base.to_path_buf()));
    }

    let mut entries: Vec<(String, PathBuf)> = std::fs::read_dir(base)
        .map_err(|e| CatalogError::io(base, e))?
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| (entry.file_name().to_string_lossy().trim().to_string(), entry.path()))
        .filter(|(file_name, _)| !file_name.starts_with('.'))
        .collect();
    entries.sort();

    let mut variants: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for (file_name, path) in entries {
        let name = file_name.split('_').next().unwrap_or_default();
        if name.is_empty() {
            debug!(entry = %file_name, "Skipping entry without object name");
            continue;
        }
        variants.entry(name.to_string()).or_default().push(path);
    }

    Ok(variants)
}

/// First file (by name) in `dir` accepted by `matches`.
fn find_file(
    dir: &Path,
    kind: &'static str,
    matches: impl Fn(&str) -> bool,
) -> CatalogResult<PathBuf> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|e| CatalogError::io(dir, e))?
        .flatten()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| matches(name))
        .collect();
    names.sort();

    names
        .first()
        .map(|name| dir.join(name))
        .ok_or_else(|| CatalogError::MissingFile {
            kind,
            dir: dir.to_path_buf(),
        })
}

/// Urls of the `.jpg` knowledge images of a variant, sorted.
fn images_in(variant: &Path) -> Vec<String> {
    let dir = variant.join(KNOWLEDGE_IMAGES_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Knowledge image directory not found");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    files.sort();

    files.iter().map(|path| path_to_url(path)).collect()
}

/// Turns a (relative) media path into the url it is served under.
///
/// `static/objects/apple_1/images/1_1.jpg` becomes
/// `/static/objects/apple_1/images/1_1.jpg`.
pub fn path_to_url(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}
