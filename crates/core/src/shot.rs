//! Shots and the duration / overlap model used by the grouping engine.
//!
//! A [`Shot`] is the atomic narrative unit produced by the script layer.
//! Grouping only reads shots; nothing in this crate mutates them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::ShotId;

/// A single narrative shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: ShotId,
    /// Name of the owning scene. Empty when the script has no scene headings.
    #[serde(default)]
    pub scene_name: String,
    #[serde(default)]
    pub character_ids: Vec<String>,
    /// Duration in seconds. `None` (or a non-positive value) falls back to the
    /// configured default during grouping.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Display-only text.
    #[serde(default)]
    pub action: String,
    /// Display-only text.
    #[serde(default)]
    pub dialogue: String,
}

impl Shot {
    /// Convenience constructor used by tests and tooling.
    pub fn new(id: impl Into<ShotId>, scene_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scene_name: scene_name.into(),
            character_ids: Vec::new(),
            duration_secs: None,
            action: String::new(),
            dialogue: String::new(),
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_characters<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.character_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// The duration grouping should use for `shot`.
///
/// Returns the shot's own duration when it is finite and positive, otherwise
/// `default_secs`.
pub fn effective_duration(shot: &Shot, default_secs: f64) -> f64 {
    match shot.duration_secs {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => default_secs,
    }
}

/// Whether two shots belong to the same scene.
///
/// Scene identity is by name; two unnamed shots are considered the same scene.
pub fn same_scene(a: &Shot, b: &Shot) -> bool {
    a.scene_name.trim() == b.scene_name.trim()
}

/// Jaccard index of the two shots' character sets, in `0.0..=1.0`.
///
/// Two empty casts share no character and yield `0.0`.
pub fn character_overlap(a: &Shot, b: &Shot) -> f64 {
    let left: HashSet<&str> = a.character_ids.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.character_ids.iter().map(String::as_str).collect();

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}
