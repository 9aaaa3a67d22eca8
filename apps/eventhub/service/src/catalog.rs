use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;

const MIN_TEAM_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Individual,
    Team,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Team => "team",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "individual" => Some(Self::Individual),
            "team" => Some(Self::Team),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organizer: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub image_src: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_team_size: Option<usize>,
    /// Registration fee in whole rupees. Zero means the event is free.
    #[serde(default)]
    pub amount: u64,
}

impl EventDetail {
    /// Maximum number of participants (leader included) a registration may hold.
    pub fn team_capacity(&self) -> usize {
        match self.kind {
            EventKind::Individual => 1,
            EventKind::Team => self
                .max_team_size
                .unwrap_or(MIN_TEAM_CAPACITY)
                .max(MIN_TEAM_CAPACITY),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.amount > 0
    }

    pub fn charge_amount_minor(&self, markup_bps: u32) -> u64 {
        charge_amount_minor(self.amount, markup_bps)
    }
}

/// Converts a whole-rupee fee into paise with the gateway markup applied,
/// rounding half away from zero.
pub fn charge_amount_minor(amount: u64, markup_bps: u32) -> u64 {
    let base = u128::from(amount) * 100;
    let scaled = base * (10_000 + u128::from(markup_bps));
    let rounded = (scaled + 5_000) / 10_000;
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
pub struct EventCatalog {
    events: Arc<BTreeMap<u32, EventDetail>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read event catalog: {message}")]
    Read { message: String },
    #[error("failed to parse event catalog: {message}")]
    Parse { message: String },
    #[error("duplicate event id {id} in catalog")]
    DuplicateId { id: u32 },
}

impl EventCatalog {
    pub fn from_config(config: &Config) -> Self {
        let Some(path) = config.event_catalog_path.as_ref() else {
            return Self::builtin();
        };

        match Self::load(path) {
            Ok(catalog) => catalog,
            Err(error) => {
                tracing::warn!(
                    target: "eventhub.catalog",
                    path = %path.display(),
                    error = %error,
                    "failed to load event catalog; falling back to builtin events",
                );
                Self::builtin()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|error| CatalogError::Read {
            message: error.to_string(),
        })?;
        let events = serde_json::from_str::<Vec<EventDetail>>(&raw).map_err(|error| {
            CatalogError::Parse {
                message: error.to_string(),
            }
        })?;
        Self::from_events(events)
    }

    pub fn from_events(events: Vec<EventDetail>) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        for event in events {
            let id = event.id;
            if by_id.insert(id, event).is_some() {
                return Err(CatalogError::DuplicateId { id });
            }
        }
        Ok(Self {
            events: Arc::new(by_id),
        })
    }

    pub fn builtin() -> Self {
        let events = builtin_events()
            .into_iter()
            .map(|event| (event.id, event))
            .collect();
        Self {
            events: Arc::new(events),
        }
    }

    pub fn get(&self, id: u32) -> Option<&EventDetail> {
        self.events.get(&id)
    }

    pub fn list(&self) -> Vec<EventDetail> {
        self.events.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

struct BuiltinEvent {
    id: u32,
    title: &'static str,
    caption: &'static str,
    description: &'static str,
    organizer: &'static str,
    date: &'static str,
    time: &'static str,
    image_src: &'static str,
    kind: EventKind,
    max_team_size: Option<usize>,
    amount: u64,
}

const BUILTIN_EVENTS: &[BuiltinEvent] = &[
    BuiltinEvent {
        id: 1,
        title: "CSS Action",
        caption: "Put your web design skills to the test!",
        description: "Join a dynamic web-based competition showcasing stunning UI using HTML and CSS.",
        organizer: "Koshin Hegde - 7899715941",
        date: "8th Nov",
        time: "9:00am - 10:45pm",
        image_src: "/events/CSS_Action.png",
        kind: EventKind::Individual,
        max_team_size: None,
        amount: 0,
    },
    BuiltinEvent {
        id: 2,
        title: "Code Forge",
        caption: "Unleash Your Coding Prowess",
        description: "Take on the ultimate coding challenge against top minds in the field.",
        organizer: "Nithesh Alva - 7483775694",
        date: "8th Nov",
        time: "9:00am - 11:00am",
        image_src: "/events/CodeForge.png",
        kind: EventKind::Individual,
        max_team_size: None,
        amount: 0,
    },
    BuiltinEvent {
        id: 3,
        title: "Bit Breaker",
        caption: "Ready for a mind-bending challenge?",
        description: "Test your problem-solving skills and capture flags in this exciting competition.",
        organizer: "Yash Laxman - 6362072050",
        date: "8th Nov",
        time: "10:30am - 12:00pm",
        image_src: "/events/ctf.jpg",
        kind: EventKind::Team,
        max_team_size: Some(2),
        amount: 0,
    },
    BuiltinEvent {
        id: 5,
        title: "PitchX",
        caption: "Spark Innovation and Inspire Change!",
        description: "Bring your ideas to life and compete in tech & entrepreneurship challenges.",
        organizer: "Apeksha L Naik - 8904315769",
        date: "8th Nov",
        time: "10:30am - 1:30pm",
        image_src: "/events/PitchX.png",
        kind: EventKind::Team,
        max_team_size: Some(3),
        amount: 0,
    },
    BuiltinEvent {
        id: 6,
        title: "Battleground Brawl: BGMI",
        caption: "Dominate the battlefield in our tournament!",
        description: "Showcase your skills and emerge victorious in BGMI matches.",
        organizer: "Advaith S Shetty - 9902698070",
        date: "8th Nov",
        time: "2:00pm - 4:00pm",
        image_src: "/events/BGMI.png",
        kind: EventKind::Team,
        max_team_size: Some(4),
        amount: 100,
    },
    BuiltinEvent {
        id: 7,
        title: "Speed Cuber",
        caption: "Are you a Rubik's Cube prodigy?",
        description: "Race against top competitors in this exhilarating speedcubing contest.",
        organizer: "Manushree P B - 6363316781",
        date: "All Three Days",
        time: "",
        image_src: "/events/Speedcuber.png",
        kind: EventKind::Individual,
        max_team_size: None,
        amount: 50,
    },
    BuiltinEvent {
        id: 8,
        title: "Blazing Fingers",
        caption: "Are you a typing speed demon?",
        description: "Compete in our typing competition for the title of fastest typist!",
        organizer: "Kshama S - 9741433993",
        date: "All Three Days",
        time: "",
        image_src: "/events/BlazingFingers.jpg",
        kind: EventKind::Individual,
        max_team_size: None,
        amount: 50,
    },
    BuiltinEvent {
        id: 9,
        title: "The Surge",
        caption: "Become the ultimate agent in our competition!",
        description: "Outsmart opponents to achieve victory in thrilling Valorant matches.",
        organizer: "Megarth - 9845153931",
        date: "7th Nov",
        time: "11:00am onwards",
        image_src: "/events/surge.jpg",
        kind: EventKind::Team,
        max_team_size: Some(5),
        amount: 100,
    },
];

fn builtin_events() -> Vec<EventDetail> {
    BUILTIN_EVENTS
        .iter()
        .map(|event| EventDetail {
            id: event.id,
            title: event.title.to_string(),
            caption: event.caption.to_string(),
            description: event.description.to_string(),
            organizer: event.organizer.to_string(),
            date: event.date.to_string(),
            time: event.time.to_string(),
            image_src: event.image_src.to_string(),
            kind: event.kind,
            max_team_size: event.max_team_size,
            amount: event.amount,
        })
        .collect()
}
