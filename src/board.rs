use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use ulid::Ulid;

use crate::catalog::normalize_slot_id;
use crate::engine::Engine;
use crate::model::*;

/// A cached weekly grid for a set of resources.
///
/// The grid is only recomputed on [`SlotBoard::refresh`]; between refreshes
/// it may lag behind the engine, and [`SlotBoard::is_stale`] reports whether
/// any of its resources changed since.
pub struct SlotBoard {
    engine: Arc<Engine>,
    resource_ids: Vec<Ulid>,
    viewer_department: String,
    grid: Vec<WeeklyTimeSlot>,
    receivers: Vec<broadcast::Receiver<Event>>,
    stale: bool,
}

impl SlotBoard {
    pub fn new(engine: Arc<Engine>, resource_ids: Vec<Ulid>, viewer_department: &str) -> Self {
        let receivers = resource_ids.iter().map(|id| engine.notify.subscribe(*id)).collect();
        let mut board = Self {
            engine,
            resource_ids,
            viewer_department: viewer_department.to_string(),
            grid: Vec::new(),
            receivers,
            stale: true,
        };
        board.refresh();
        board
    }

    /// Board over the department's own resources and the shared ones.
    pub fn for_department(engine: Arc<Engine>, department: &str) -> Self {
        let ids = engine
            .get_all_resources()
            .into_iter()
            .filter(|r| r.is_shared() || r.is_owned_by(department))
            .map(|r| r.id)
            .collect();
        Self::new(engine, ids, department)
    }

    /// Recompute the whole grid from the engine.
    pub fn refresh(&mut self) {
        for rx in &mut self.receivers {
            while !matches!(rx.try_recv(), Err(TryRecvError::Empty | TryRecvError::Closed)) {}
        }
        self.grid = self.engine.weekly_slots(&self.resource_ids, &self.viewer_department);
        self.stale = false;
    }

    pub fn is_stale(&mut self) -> bool {
        if !self.stale {
            self.stale = self
                .receivers
                .iter_mut()
                .any(|rx| matches!(rx.try_recv(), Ok(_) | Err(TryRecvError::Lagged(_))));
        }
        self.stale
    }

    pub fn slots(&self) -> &[WeeklyTimeSlot] {
        &self.grid
    }

    pub fn slot(&self, resource_id: Ulid, time_slot_id: &str, day: Day) -> Option<&WeeklyTimeSlot> {
        let time_slot_id = normalize_slot_id(time_slot_id);
        self.grid
            .iter()
            .find(|s| s.resource_id == resource_id && s.day == day && s.time_slot_id == time_slot_id)
    }

    pub fn free_slots(&self, resource_id: Ulid) -> impl Iterator<Item = &WeeklyTimeSlot> {
        self.grid
            .iter()
            .filter(move |s| s.resource_id == resource_id && !s.is_occupied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SlotCatalog;
    use crate::engine::{BookingDraft, HodDecision, ResourceSpec};
    use crate::notify::NotifyHub;

    fn engine(name: &str) -> Arc<Engine> {
        let dir = std::env::temp_dir().join("campus_test_board");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        Arc::new(Engine::new(path, Arc::new(NotifyHub::new()), SlotCatalog::legacy()).unwrap())
    }

    async fn room(engine: &Engine, owner: &Actor) -> Resource {
        engine
            .create_resource(
                owner,
                ResourceSpec {
                    id: Ulid::new(),
                    name: "EE-105".into(),
                    kind: ResourceType::Classroom,
                    capacity: 50,
                    owning_department: Some(owner.department.clone()),
                    building: None,
                    floor: None,
                    location: None,
                    equipment: Vec::new(),
                    facilities: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stale_until_refreshed() {
        let engine = engine("stale.wal");
        let ee_hod = Actor::new("hod-ee", "EE", Role::Hod);
        let me_hod = Actor::new("hod-me", "ME", Role::Hod);
        let ee_room = room(&engine, &ee_hod).await;

        let mut board = SlotBoard::for_department(engine.clone(), "EE");
        assert_eq!(board.slots().len(), 5 * 6);
        assert!(!board.is_stale());
        assert_eq!(board.free_slots(ee_room.id).count(), 30);

        let draft = BookingDraft {
            id: Ulid::new(),
            target_resource_id: ee_room.id,
            time_slot_id: "morning_2".into(),
            day: 4,
            course_name: "Thermodynamics".into(),
            purpose: String::new(),
            expected_attendance: 45,
            designation: None,
        };
        let request = engine.create_request(&me_hod, draft).await.unwrap();
        engine
            .hod_respond(&ee_hod, request.id, HodDecision::Approve, None)
            .await
            .unwrap();

        assert!(board.is_stale());
        assert!(!board.slot(ee_room.id, "2", 4).unwrap().is_occupied());

        board.refresh();
        assert!(!board.is_stale());
        let cell = board.slot(ee_room.id, "morning_2", 4).unwrap();
        assert_eq!(cell.occupied_by.as_ref().unwrap().department, "ME");
        assert_eq!(board.free_slots(ee_room.id).count(), 29);
    }

    #[tokio::test]
    async fn unrelated_resources_do_not_stale() {
        let engine = engine("unrelated.wal");
        let ee_hod = Actor::new("hod-ee", "EE", Role::Hod);
        let me_hod = Actor::new("hod-me", "ME", Role::Hod);
        let ee_room = room(&engine, &ee_hod).await;
        let mut board = SlotBoard::new(engine.clone(), vec![ee_room.id], "EE");

        room(&engine, &me_hod).await;
        assert!(!board.is_stale());
        engine.archive_resource(&ee_hod, ee_room.id).await.unwrap();
        assert!(board.is_stale());
    }
}
