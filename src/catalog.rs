use crate::model::{ClockTime, Day, TimeSlot};

/// Monday through Friday.
pub const WEEKDAYS: [Day; 5] = [1, 2, 3, 4, 5];

pub fn is_weekday(day: Day) -> bool {
    WEEKDAYS.contains(&day)
}

pub fn day_name(day: Day) -> &'static str {
    match day {
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        _ => "Unknown",
    }
}

/// Deprecated slot ids still present on historical booking requests.
const LEGACY_SLOT_IDS: [(&str, &str); 5] = [
    ("morning_1", "1"),
    ("morning_2", "2"),
    ("afternoon_1", "3"),
    ("afternoon_2", "4"),
    ("evening_1", "5"),
];

/// Map a legacy slot id to the current scheme. Anything unmapped passes through.
pub fn normalize_slot_id(id: &str) -> &str {
    LEGACY_SLOT_IDS
        .iter()
        .find(|(legacy, _)| *legacy == id)
        .map_or(id, |(_, current)| *current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    /// Ten one-hour periods, 08:00–18:00.
    Standard,
    /// Six periods with a short break and lunch.
    Legacy,
}

impl CatalogKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Some(CatalogKind::Standard),
            "legacy" => Some(CatalogKind::Legacy),
            _ => None,
        }
    }
}

/// Fixed ordered list of daily windows. Every slot id refers into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCatalog {
    slots: Vec<TimeSlot>,
}

impl Default for SlotCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl SlotCatalog {
    pub fn new(kind: CatalogKind) -> Self {
        match kind {
            CatalogKind::Standard => Self::standard(),
            CatalogKind::Legacy => Self::legacy(),
        }
    }

    pub fn standard() -> Self {
        let slots = (0..10u16)
            .map(|i| {
                let start = ClockTime::new(8 + i, 0);
                let end = ClockTime::new(9 + i, 0);
                TimeSlot::new(
                    &(i + 1).to_string(),
                    start,
                    end,
                    &format!("Period {} ({start}-{end})", i + 1),
                )
            })
            .collect();
        Self { slots }
    }

    pub fn legacy() -> Self {
        let windows = [
            ((9, 0), (10, 0)),
            ((10, 0), (11, 0)),
            ((11, 15), (12, 15)),
            ((12, 15), (13, 15)),
            ((14, 0), (15, 0)),
            ((15, 0), (16, 0)),
        ];
        let slots = windows
            .iter()
            .enumerate()
            .map(|(i, ((sh, sm), (eh, em)))| {
                let start = ClockTime::new(*sh, *sm);
                let end = ClockTime::new(*eh, *em);
                TimeSlot::new(&(i + 1).to_string(), start, end, &format!("{start} - {end}"))
            })
            .collect();
        Self { slots }
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look a slot up by id, accepting legacy ids.
    pub fn get(&self, id: &str) -> Option<&TimeSlot> {
        let id = normalize_slot_id(id);
        self.slots.iter().find(|s| s.id == id)
    }

    /// Slot whose window starts at `start`, if any.
    pub fn starting_at(&self, start: ClockTime) -> Option<&TimeSlot> {
        self.slots.iter().find(|s| s.start == start)
    }
}
