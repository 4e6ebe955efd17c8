//! Arena of shot groups with checked status transitions.
//!
//! Each group sits behind its own mutex. Every status change is a
//! compare-and-swap against the expected current state: a transition
//! attempted from the wrong state is rejected with [`CoreError::Conflict`]
//! and leaves the group untouched. This is what keeps the dispatch
//! pipeline (which owns `generating`) and the calibrator (which owns
//! `calibrating`) from interleaving on the same group.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::assets::AssetRef;
use crate::error::CoreError;
use crate::shot_group::{Calibration, CalibrationStatus, GenerationStatus, ShotGroup};
use crate::types::GroupId;

#[derive(Default)]
struct Arena {
    order: Vec<GroupId>,
    slots: HashMap<GroupId, Arc<Mutex<ShotGroup>>>,
}

/// Shared, thread-safe store of the current grouping result.
#[derive(Default)]
pub struct GroupStore {
    arena: RwLock<Arena>,
}

fn lock(slot: &Mutex<ShotGroup>) -> MutexGuard<'_, ShotGroup> {
    // A panic while holding the lock cannot leave a half-written status:
    // every transition validates before it writes.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GroupStore {
    pub fn new(groups: Vec<ShotGroup>) -> Self {
        let store = Self::default();
        store.replace_all(groups);
        store
    }

    /// Swap in a new grouping result, e.g. after the source shots changed.
    pub fn replace_all(&self, groups: Vec<ShotGroup>) {
        let mut arena = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        arena.order = groups.iter().map(|g| g.id).collect();
        arena.slots = groups
            .into_iter()
            .map(|g| (g.id, Arc::new(Mutex::new(g))))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group ids in grouping order.
    pub fn ids(&self) -> Vec<GroupId> {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// A copy of one group.
    pub fn get(&self, id: GroupId) -> Result<ShotGroup, CoreError> {
        let slot = self.slot(id)?;
        let group = lock(&slot);
        Ok(group.clone())
    }

    /// Copies of every group in grouping order.
    pub fn snapshot(&self) -> Vec<ShotGroup> {
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena
            .order
            .iter()
            .filter_map(|id| arena.slots.get(id))
            .map(|slot| lock(slot).clone())
            .collect()
    }

    // ---- assets ----

    /// Attach a reference asset. Rejected while the group is generating.
    pub fn add_asset(&self, id: GroupId, asset: AssetRef) -> Result<(), CoreError> {
        self.with_group(id, |group| {
            if group.status == GenerationStatus::Generating {
                return Err(CoreError::Conflict(format!(
                    "group {id} is generating; references are locked"
                )));
            }
            group.assets.add(asset)
        })
    }

    /// Detach a reference asset. Rejected while the group is generating.
    pub fn remove_asset(&self, id: GroupId, asset_id: &str) -> Result<AssetRef, CoreError> {
        self.with_group(id, |group| {
            if group.status == GenerationStatus::Generating {
                return Err(CoreError::Conflict(format!(
                    "group {id} is generating; references are locked"
                )));
            }
            group.assets.remove(asset_id).ok_or(CoreError::NotFound {
                entity: "asset",
                id: asset_id.to_string(),
            })
        })
    }

    // ---- generation transitions ----

    /// `Idle | Completed | Failed -> Generating`, recording the prompt.
    ///
    /// Rejected while the group is generating or calibrating. Returns a copy
    /// of the group as it entered `Generating`.
    pub fn begin_generation(&self, id: GroupId, prompt: &str) -> Result<ShotGroup, CoreError> {
        self.with_group(id, |group| {
            if !group.status.can_start() {
                return Err(conflict(id, "generation", group.status.as_str(), "generating"));
            }
            if group.calibration_status() == CalibrationStatus::Calibrating {
                return Err(CoreError::Conflict(format!(
                    "group {id} is calibrating; generation must wait"
                )));
            }
            group.status = GenerationStatus::Generating;
            group.last_prompt = Some(prompt.to_string());
            group.video_url = None;
            group.failure = None;
            Ok(group.clone())
        })
    }

    /// `Generating -> Completed`.
    pub fn complete_generation(&self, id: GroupId, video_url: &str) -> Result<(), CoreError> {
        self.with_group(id, |group| {
            expect_generation(group, id, "completed")?;
            group.status = GenerationStatus::Completed;
            group.video_url = Some(video_url.to_string());
            group.failure = None;
            Ok(())
        })
    }

    /// `Generating -> Failed`.
    pub fn fail_generation(&self, id: GroupId, reason: &str) -> Result<(), CoreError> {
        self.with_group(id, |group| {
            expect_generation(group, id, "failed")?;
            group.status = GenerationStatus::Failed;
            group.failure = Some(reason.to_string());
            Ok(())
        })
    }

    // ---- calibration transitions ----

    /// `Idle | Done | Failed -> Calibrating`. Rejected while generating.
    pub fn begin_calibration(&self, id: GroupId) -> Result<ShotGroup, CoreError> {
        self.with_group(id, |group| {
            if group.status == GenerationStatus::Generating {
                return Err(CoreError::Conflict(format!(
                    "group {id} is generating; calibration must wait"
                )));
            }
            let current = group.calibration_status();
            if current == CalibrationStatus::Calibrating {
                return Err(conflict(id, "calibration", current.as_str(), "calibrating"));
            }
            group.calibration.get_or_insert_with(Calibration::default).status =
                CalibrationStatus::Calibrating;
            Ok(group.clone())
        })
    }

    /// `Calibrating -> Done`, storing the calibrator output.
    pub fn finish_calibration(&self, id: GroupId, result: Calibration) -> Result<(), CoreError> {
        self.with_group(id, |group| {
            expect_calibrating(group, id, "done")?;
            group.calibration = Some(Calibration {
                status: CalibrationStatus::Done,
                ..result
            });
            Ok(())
        })
    }

    /// `Calibrating -> Failed`. Any previous calibration text is kept.
    pub fn fail_calibration(&self, id: GroupId) -> Result<(), CoreError> {
        self.with_group(id, |group| {
            expect_calibrating(group, id, "failed")?;
            if let Some(c) = group.calibration.as_mut() {
                c.status = CalibrationStatus::Failed;
            }
            Ok(())
        })
    }

    // ---- private helpers ----

    fn slot(&self, id: GroupId) -> Result<Arc<Mutex<ShotGroup>>, CoreError> {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "shot_group",
                id: id.to_string(),
            })
    }

    /// Run `f` with exclusive access to one group.
    fn with_group<T>(
        &self,
        id: GroupId,
        f: impl FnOnce(&mut ShotGroup) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let slot = self.slot(id)?;
        let mut group = lock(&slot);
        f(&mut *group)
    }
}

fn conflict(id: GroupId, what: &str, from: &str, to: &str) -> CoreError {
    CoreError::Conflict(format!("group {id}: {what} cannot move from '{from}' to '{to}'"))
}

fn expect_generation(group: &ShotGroup, id: GroupId, to: &str) -> Result<(), CoreError> {
    if group.status != GenerationStatus::Generating {
        return Err(conflict(id, "generation", group.status.as_str(), to));
    }
    Ok(())
}

fn expect_calibrating(group: &ShotGroup, id: GroupId, to: &str) -> Result<(), CoreError> {
    let current = group.calibration_status();
    if current != CalibrationStatus::Calibrating {
        return Err(conflict(id, "calibration", current.as_str(), to));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::assets::{AssetKind, AssetLocator, AssetPurpose};

    fn store_with_one() -> (GroupStore, GroupId) {
        let group = ShotGroup::new(0, vec!["s1".into()]);
        let id = group.id;
        (GroupStore::new(vec![group]), id)
    }

    fn image(id: &str) -> AssetRef {
        AssetRef {
            id: id.into(),
            kind: AssetKind::Image,
            purpose: AssetPurpose::FirstFrame,
            locator: AssetLocator::Http(format!("https://cdn/{id}.png")),
            size_bytes: None,
            duration_secs: None,
        }
    }

    // -- generation --

    #[test]
    fn generation_happy_path() {
        let (store, id) = store_with_one();

        let started = store.begin_generation(id, "a prompt").unwrap();
        assert_eq!(started.status, GenerationStatus::Generating);
        assert_eq!(started.last_prompt.as_deref(), Some("a prompt"));

        store.complete_generation(id, "https://cdn/out.mp4").unwrap();
        let done = store.get(id).unwrap();
        assert_eq!(done.status, GenerationStatus::Completed);
        assert_eq!(done.video_url.as_deref(), Some("https://cdn/out.mp4"));
    }

    #[test]
    fn double_begin_is_rejected() {
        let (store, id) = store_with_one();
        store.begin_generation(id, "p").unwrap();
        assert_matches!(store.begin_generation(id, "p2"), Err(CoreError::Conflict(_)));
        assert_eq!(store.get(id).unwrap().last_prompt.as_deref(), Some("p"));
    }

    #[test]
    fn completing_an_idle_group_is_rejected() {
        let (store, id) = store_with_one();
        assert_matches!(store.complete_generation(id, "u"), Err(CoreError::Conflict(_)));
        assert_matches!(store.fail_generation(id, "x"), Err(CoreError::Conflict(_)));
        assert_eq!(store.get(id).unwrap().status, GenerationStatus::Idle);
    }

    #[test]
    fn failed_group_can_retry_and_clears_failure() {
        let (store, id) = store_with_one();
        store.begin_generation(id, "p").unwrap();
        store.fail_generation(id, "timed out").unwrap();
        assert_eq!(store.get(id).unwrap().failure.as_deref(), Some("timed out"));

        store.begin_generation(id, "p").unwrap();
        assert!(store.get(id).unwrap().failure.is_none());
    }

    #[test]
    fn completed_cannot_be_failed_afterwards() {
        let (store, id) = store_with_one();
        store.begin_generation(id, "p").unwrap();
        store.complete_generation(id, "u").unwrap();
        assert!(store.fail_generation(id, "late").is_err());
        assert_eq!(store.get(id).unwrap().status, GenerationStatus::Completed);
    }

    // -- calibration exclusivity --

    #[test]
    fn calibration_blocks_generation_and_vice_versa() {
        let (store, id) = store_with_one();

        store.begin_calibration(id).unwrap();
        assert_matches!(store.begin_generation(id, "p"), Err(CoreError::Conflict(_)));

        store
            .finish_calibration(
                id,
                Calibration {
                    calibrated_prompt: "better".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let group = store.get(id).unwrap();
        assert_eq!(group.calibration_status(), CalibrationStatus::Done);
        assert_eq!(group.effective_prompt("raw"), "better");

        store.begin_generation(id, "better").unwrap();
        assert_matches!(store.begin_calibration(id), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn calibration_failure_requires_calibrating() {
        let (store, id) = store_with_one();
        assert!(store.fail_calibration(id).is_err());
        store.begin_calibration(id).unwrap();
        store.fail_calibration(id).unwrap();
        assert_eq!(store.get(id).unwrap().calibration_status(), CalibrationStatus::Failed);
        store.begin_calibration(id).unwrap();
    }

    // -- assets --

    #[test]
    fn assets_locked_while_generating() {
        let (store, id) = store_with_one();
        store.add_asset(id, image("a")).unwrap();
        store.begin_generation(id, "p").unwrap();

        assert_matches!(store.add_asset(id, image("b")), Err(CoreError::Conflict(_)));
        assert_matches!(store.remove_asset(id, "a"), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn remove_missing_asset_is_not_found() {
        let (store, id) = store_with_one();
        assert_matches!(store.remove_asset(id, "nope"), Err(CoreError::NotFound { .. }));
    }

    // -- arena --

    #[test]
    fn unknown_group_is_not_found() {
        let (store, _) = store_with_one();
        assert_matches!(
            store.begin_generation(uuid::Uuid::new_v4(), "p"),
            Err(CoreError::NotFound { entity: "shot_group", .. })
        );
    }

    #[test]
    fn replace_all_swaps_the_set_and_keeps_order() {
        let (store, old) = store_with_one();
        let groups: Vec<ShotGroup> = (0..3).map(|i| ShotGroup::new(i, vec![])).collect();
        let expected: Vec<GroupId> = groups.iter().map(|g| g.id).collect();

        store.replace_all(groups);

        assert_eq!(store.ids(), expected);
        assert_eq!(store.len(), 3);
        assert!(store.get(old).is_err());
        let indexes: Vec<usize> = store.snapshot().iter().map(|g| g.index).collect();
        assert_eq!(indexes, [0, 1, 2]);
    }

    #[test]
    fn concurrent_begin_lets_exactly_one_win() {
        let (store, id) = store_with_one();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.begin_generation(id, &format!("p{i}")).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }
}
