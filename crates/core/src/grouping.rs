//! Shot grouping engine.
//!
//! Packs an ordered shot sequence into groups in a single greedy
//! left-to-right pass. Scene continuity drives the split, duration and
//! shot-count caps bound each group, and character overlap keeps a
//! recurring cast together across a nominal scene boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::shot::{character_overlap, effective_duration, same_scene, Shot};
use crate::shot_group::ShotGroup;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lower bound of the displayed group duration.
pub const DISPLAY_DURATION_MIN_SECS: f64 = 4.0;

/// Upper bound of the displayed group duration.
pub const DISPLAY_DURATION_MAX_SECS: f64 = 15.0;

/// Below this character overlap a scene change closes the current group.
pub const CHARACTER_OVERLAP_THRESHOLD: f64 = 0.5;

pub const DEFAULT_MAX_DURATION_SECS: f64 = 15.0;
pub const DEFAULT_MAX_SHOTS_PER_GROUP: usize = 4;
pub const DEFAULT_MIN_SHOTS_PER_GROUP: usize = 1;
pub const DEFAULT_SHOT_DURATION_SECS: f64 = 5.0;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub max_duration_secs: f64,
    pub max_shots_per_group: usize,
    pub min_shots_per_group: usize,
    pub default_shot_duration_secs: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            max_shots_per_group: DEFAULT_MAX_SHOTS_PER_GROUP,
            min_shots_per_group: DEFAULT_MIN_SHOTS_PER_GROUP,
            default_shot_duration_secs: DEFAULT_SHOT_DURATION_SECS,
        }
    }
}

impl GroupingConfig {
    /// Reject configurations that cannot produce sensible groups.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return Err(CoreError::Validation(format!(
                "max_duration_secs must be positive, got {}",
                self.max_duration_secs
            )));
        }
        if !self.default_shot_duration_secs.is_finite() || self.default_shot_duration_secs <= 0.0 {
            return Err(CoreError::Validation(format!(
                "default_shot_duration_secs must be positive, got {}",
                self.default_shot_duration_secs
            )));
        }
        if self.max_shots_per_group == 0 {
            return Err(CoreError::Validation(
                "max_shots_per_group must be at least 1".to_string(),
            ));
        }
        if self.min_shots_per_group > self.max_shots_per_group {
            return Err(CoreError::Validation(format!(
                "min_shots_per_group ({}) exceeds max_shots_per_group ({})",
                self.min_shots_per_group, self.max_shots_per_group
            )));
        }
        Ok(())
    }

    /// Copy with out-of-range values replaced so grouping never fails.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let max_shots = self.max_shots_per_group.max(1);
        Self {
            max_duration_secs: if self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0 {
                self.max_duration_secs
            } else {
                defaults.max_duration_secs
            },
            max_shots_per_group: max_shots,
            min_shots_per_group: self.min_shots_per_group.clamp(1, max_shots),
            default_shot_duration_secs: if self.default_shot_duration_secs.is_finite()
                && self.default_shot_duration_secs > 0.0
            {
                self.default_shot_duration_secs
            } else {
                defaults.default_shot_duration_secs
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Clamp a group's summed duration into the displayed range.
///
/// The displayed value can disagree with the literal sum (a single 20s shot
/// displays as 15s); [`ShotGroup::raw_duration_secs`] keeps the real sum.
pub fn clamp_display_duration(total_secs: f64) -> f64 {
    total_secs.clamp(DISPLAY_DURATION_MIN_SECS, DISPLAY_DURATION_MAX_SECS)
}

/// Partition `shots` into groups.
///
/// Never fails: an empty input yields an empty result and a single shot
/// longer than the budget still forms its own group.
pub fn group_shots(shots: &[Shot], config: &GroupingConfig) -> Vec<ShotGroup> {
    let config = config.sanitized();
    let mut groups: Vec<ShotGroup> = Vec::new();
    let mut current: Vec<&Shot> = Vec::new();
    let mut running = 0.0;

    for (i, shot) in shots.iter().enumerate() {
        let duration = effective_duration(shot, config.default_shot_duration_secs);

        if !current.is_empty() && should_flush(&current, running, &shots[i - 1], shot, duration, &config) {
            groups.push(finalize_group(&current, running, groups.len(), shots));
            current.clear();
            running = 0.0;
        }

        current.push(shot);
        running += duration;
    }

    if !current.is_empty() {
        groups.push(finalize_group(&current, running, groups.len(), shots));
    }

    tracing::debug!(
        shots = shots.len(),
        groups = groups.len(),
        "Grouped shot sequence",
    );

    groups
}

/// Decide whether the current group must close before `next` is added.
fn should_flush(
    current: &[&Shot],
    running: f64,
    previous: &Shot,
    next: &Shot,
    next_duration: f64,
    config: &GroupingConfig,
) -> bool {
    if current.len() >= config.max_shots_per_group {
        return true;
    }
    if running + next_duration > config.max_duration_secs {
        return true;
    }
    !same_scene(previous, next)
        && current.len() >= config.min_shots_per_group
        && character_overlap(previous, next) < CHARACTER_OVERLAP_THRESHOLD
}

fn finalize_group(current: &[&Shot], running: f64, index: usize, shots: &[Shot]) -> ShotGroup {
    let mut group = ShotGroup::new(index, current.iter().map(|s| s.id.clone()).collect());
    group.raw_duration_secs = running;
    group.total_duration_secs = clamp_display_duration(running);
    group.name = generate_group_name(&group, shots, index);
    group
}

/// Re-sum the group's duration against a live shot table.
///
/// Shot ids no longer present in `shots` are skipped. Updates both the raw
/// and the displayed duration and returns the displayed value.
pub fn recalc_duration(group: &mut ShotGroup, shots: &[Shot], config: &GroupingConfig) -> f64 {
    let config = config.sanitized();
    let by_id: HashMap<&str, &Shot> = shots.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut total = 0.0;
    for id in &group.shot_ids {
        match by_id.get(id.as_str()) {
            Some(shot) => total += effective_duration(shot, config.default_shot_duration_secs),
            None => tracing::warn!(
                group_id = %group.id,
                shot_id = %id,
                "Shot missing from live table during duration recalculation",
            ),
        }
    }

    group.raw_duration_secs = total;
    group.total_duration_secs = clamp_display_duration(total);
    group.total_duration_secs
}

/// Human label for a group: the first shot's scene plus the 1-based
/// position range of its shots in the full sequence.
///
/// Positions come from `shots`, not from the shot ids, so the label stays
/// stable when shots are inserted elsewhere with arbitrary ids.
pub fn generate_group_name(group: &ShotGroup, shots: &[Shot], index: usize) -> String {
    let position = |id: &str| shots.iter().position(|s| s.id == id).map(|p| p + 1);

    let first = group.shot_ids.first().and_then(|id| position(id));
    let last = group.shot_ids.last().and_then(|id| position(id));

    let scene = first
        .map(|p| shots[p - 1].scene_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Group {}", index + 1));

    match (first, last) {
        (Some(a), Some(b)) if a == b => format!("{scene} · Shot {a}"),
        (Some(a), Some(b)) => format!("{scene} · Shots {a}-{b}"),
        _ => scene,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
