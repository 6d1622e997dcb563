//! Pairing of subtitle files with image and video files.
//!
//! A variant's `images/` directory holds numbered subtitle files (`3.txt`)
//! next to the media for that segment (`3_1.jpg`, `3_2.jpg`, `3_intro.mp4`).

use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{CatalogError, CatalogResult};
use crate::path_to_url;

/// Directory inside a variant holding segment media.
pub const IMAGES_DIR: &str = "images";

/// File name patterns; the first capture group is the segment number.
struct SegmentPatterns {
    subtitle: Regex,
    image: Regex,
    video: Regex,
}

impl SegmentPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            subtitle: Regex::new(r"^(\d+)\.txt$")?,
            image: Regex::new(r"^(\d+)_\d+\.jpg$")?,
            video: Regex::new(r"^(\d+)_.*\.mp4$")?,
        })
    }
}

fn segment_number(pattern: &Regex, file_name: &str) -> Option<String> {
    pattern
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// One subtitle with the media chosen to accompany it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    /// Url of the chosen image
    pub image: String,
    /// Url of the chosen video, empty when the segment has none
    pub video: String,
    pub subtitle: String,
}

#[derive(Default)]
struct SegmentFiles {
    subtitle: Option<String>,
    images: Vec<String>,
    videos: Vec<String>,
}

/// Reads every segment of one variant, ordered by segment number.
///
/// Segments without any image are skipped.
pub fn read_segments<R: Rng + ?Sized>(variant: &Path, rng: &mut R) -> CatalogResult<Vec<Segment>> {
    let dir = variant.join(IMAGES_DIR);
    if !dir.is_dir() {
        return Err(CatalogError::MissingDirectory(dir));
    }

    let patterns = SegmentPatterns::compile()?;
    let entries = std::fs::read_dir(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let mut by_id: BTreeMap<String, SegmentFiles> = BTreeMap::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(id) = segment_number(&patterns.subtitle, &file_name) {
            by_id.entry(id).or_default().subtitle = Some(file_name);
        } else if let Some(id) = segment_number(&patterns.image, &file_name) {
            by_id.entry(id).or_default().images.push(file_name);
        } else if let Some(id) = segment_number(&patterns.video, &file_name) {
            by_id.entry(id).or_default().videos.push(file_name);
        }
    }

    let mut numbered: Vec<(String, SegmentFiles)> = by_id.into_iter().collect();
    numbered.sort_by_key(|(id, _)| id.parse::<u128>().unwrap_or(u128::MAX));

    let mut segments = Vec::new();
    for (id, mut files) in numbered {
        let Some(subtitle_file) = files.subtitle.take() else {
            continue;
        };
        // Directory listing order is platform dependent
        files.images.sort();
        files.videos.sort();

        let Some(image) = files.images.choose(rng) else {
            debug!(segment = %id, dir = %dir.display(), "Skipping segment without images");
            continue;
        };
        let video = files
            .videos
            .choose(rng)
            .map(|v| path_to_url(&dir.join(v)))
            .unwrap_or_default();

        let subtitle_path = dir.join(&subtitle_file);
        let subtitle = match std::fs::read_to_string(&subtitle_path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %subtitle_path.display(), error = %e, "Failed to read subtitle");
                continue;
            }
        };

        segments.push(Segment {
            image: path_to_url(&dir.join(image)),
            video,
            subtitle,
            id,
        });
    }

    Ok(segments)
}
