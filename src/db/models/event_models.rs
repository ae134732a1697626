use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use uuid::Uuid;

/// Lifecycle stage of an event. The ordinals are shared with the
/// processing services and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ProcessingState {
    New = 0,
    Waiting = 1,
    Processing = 2,
    Failed = 3,
    ParameterEstimation = 4,
    UserAnalysis = 5,
    Accepted = 6,
    Deferred = 7,
    Rejected = 8,
    NoSolution = 9,
    NoData = 10,
}

impl TryFrom<i32> for ProcessingState {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::New,
            1 => Self::Waiting,
            2 => Self::Processing,
            3 => Self::Failed,
            4 => Self::ParameterEstimation,
            5 => Self::UserAnalysis,
            6 => Self::Accepted,
            7 => Self::Deferred,
            8 => Self::Rejected,
            9 => Self::NoSolution,
            10 => Self::NoData,
            other => return Err(other),
        })
    }
}

impl From<ProcessingState> for i32 {
    fn from(state: ProcessingState) -> Self {
        state as i32
    }
}

/// Event row as pushed to dashboards. Times are Unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub event_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub approx_trigger_time: Option<f64>,
    pub created_time: Option<f64>,
    pub last_update_time: Option<f64>,
    pub processing_state: i32,
    pub user_viewed: bool,
    pub approx_energy_j: Option<f64>,
    pub location_ecef_m: Option<Vec<Option<f64>>>,
    pub velocity_ecef_m_sec: Option<Vec<Option<f64>>>,
}

/// Select list matching [`Event`]
pub const EVENT_COLUMNS: &str = "event_id, parent_id, \
    approx_trigger_time::float8 AS approx_trigger_time, \
    created_time::float8 AS created_time, \
    last_update_time::float8 AS last_update_time, \
    processing_state::int4 AS processing_state, \
    user_viewed, \
    approx_energy_j::float8 AS approx_energy_j, \
    location_ecef_m::float8[] AS location_ecef_m, \
    velocity_ecef_m_sec::float8[] AS velocity_ecef_m_sec";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub gte: f64,
    #[serde(default)]
    pub lte: f64,
}

/// State filter as sent by dashboards: `enabled` plus one boolean per
/// processing state ordinal, keyed by the ordinal as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub states: BTreeMap<String, bool>,
}

impl StateFilter {
    /// Selected states in ordinal order. Keys that are not a known state are ignored.
    pub fn selected(&self) -> Vec<ProcessingState> {
        let mut selected: Vec<ProcessingState> = self
            .states
            .iter()
            .filter(|(_, on)| **on)
            .filter_map(|(key, _)| key.parse::<i32>().ok())
            .filter_map(|ordinal| ProcessingState::try_from(ordinal).ok())
            .collect();
        selected.sort();
        selected.dedup();
        selected
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub approx_trigger_time: RangeFilter,
    #[serde(default)]
    pub approx_energy_j: RangeFilter,
    #[serde(default)]
    pub state_filter: StateFilter,
    #[serde(default)]
    pub unviewed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageSort {
    DateAsc,
    DateDesc,
    StateAsc,
    StateDesc,
    EnergyAsc,
    EnergyDesc,
}

impl PageSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            PageSort::DateAsc => " ORDER BY approx_trigger_time ASC ",
            PageSort::DateDesc => " ORDER BY approx_trigger_time DESC ",
            PageSort::StateAsc => " ORDER BY processing_state ASC ",
            PageSort::StateDesc => " ORDER BY processing_state DESC ",
            PageSort::EnergyAsc => " ORDER BY approx_energy_j ASC NULLS LAST ",
            PageSort::EnergyDesc => " ORDER BY approx_energy_j DESC NULLS LAST ",
        }
    }
}

/// Event list request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_number: i64,
    pub page_size: i64,
    #[serde(default)]
    pub order_by: Option<PageSort>,
    #[serde(default)]
    pub event_filter: Option<EventFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StateCount {
    pub processing_state: i32,
    pub count: String,
}

/// Event list response. Counts travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub data: Vec<Event>,
    pub total_count: String,
    pub filtered_count: String,
    pub unviewed: String,
    pub page_number: i64,
    pub page_size: i64,
    pub min_date: Option<f64>,
    pub max_date: Option<f64>,
    pub min_energy: Option<f64>,
    pub max_energy: Option<f64>,
    pub state_count: Vec<StateCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub history_id: Uuid,
    pub time: Option<f64>,
    pub entry: Option<String>,
    pub author: Option<String>,
    pub event_id: Uuid,
}

pub const HISTORY_COLUMNS: &str =
    "history_id, time::float8 AS time, entry, author, event_id";

/// Note typed into an event's history by an analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryNote {
    pub entry: String,
    pub author: String,
    pub event_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeRequest {
    pub event_id: Uuid,
    pub state: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_filter_selected_in_ordinal_order() {
        let filter: StateFilter = serde_json::from_value(json!({
            "enabled": true,
            "10": true,
            "2": true,
            "3": false,
            "bogus": true,
            "42": true
        }))
        .unwrap();

        assert!(filter.enabled);
        assert_eq!(
            filter.selected(),
            vec![ProcessingState::Processing, ProcessingState::NoData]
        );
    }

    #[test]
    fn test_page_parses_dashboard_request() {
        let page: Page = serde_json::from_value(json!({
            "pageNumber": 2,
            "pageSize": 25,
            "orderBy": "ENERGY_DESC",
            "eventFilter": {
                "approx_trigger_time": {"enabled": false, "gte": 0, "lte": 10},
                "approx_energy_j": {"enabled": true, "gte": 1.5, "lte": 9.0},
                "state_filter": {"enabled": false, "0": true},
                "unviewed": true
            }
        }))
        .unwrap();

        assert_eq!(page.order_by, Some(PageSort::EnergyDesc));
        let filter = page.event_filter.unwrap();
        assert!(filter.approx_energy_j.enabled);
        assert_eq!(filter.approx_energy_j.gte, 1.5);
        assert!(filter.unviewed);
    }

    #[test]
    fn test_processing_state_round_trip_rejects_unknown() {
        assert_eq!(ProcessingState::try_from(5), Ok(ProcessingState::UserAnalysis));
        assert_eq!(i32::from(ProcessingState::NoSolution), 9);
        assert_eq!(ProcessingState::try_from(11), Err(11));
    }

    #[test]
    fn test_page_data_serializes_camel_case_counts() {
        let page = PageData {
            data: vec![],
            total_count: "3".into(),
            filtered_count: "3".into(),
            unviewed: "1".into(),
            page_number: 0,
            page_size: 10,
            min_date: None,
            max_date: None,
            min_energy: Some(1.0),
            max_energy: Some(2.0),
            state_count: vec![StateCount { processing_state: 0, count: "3".into() }],
        };
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["totalCount"], "3");
        assert_eq!(value["stateCount"][0]["count"], "3");
        assert_eq!(value["minEnergy"], 1.0);
    }
}
