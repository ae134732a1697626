//! Names of every message crossing the hub.

// Inbound from dashboards
pub const GET_EVENT_LIST: &str = "get-event-list";
pub const GET_EVENT_DETAILS: &str = "get-event-details";
pub const GET_POINT_SOURCE_DETAILS: &str = "get-point-source-details";
pub const GET_EVENT_HISTORY: &str = "get-event-history";
pub const PUT_EVENT_HISTORY_NOTE: &str = "put-event-history-note";
pub const CHANGE_PROCESSING_STATE: &str = "change-processing-state";
pub const GET_SENSORS_FOR_EVENT: &str = "get-sensors-for-event";
pub const TOGGLE_EVENT_VIEWED: &str = "toggle-event-viewed";
pub const DELETE_EVENT: &str = "delete-event";
pub const DELETE_VELOCITY: &str = "delete-velocity";
pub const DUPLICATE_EVENT: &str = "duplicate-event";
pub const GET_ALL_PLATFORMS: &str = "get-all-platforms";
pub const GET_POINT_SOURCE_FILTER_EXTENTS: &str = "get-point-source-filter-extents";
pub const CHANGE_POINT_SOURCE_FILTER: &str = "change-point-source-filter";
pub const UPDATE_PLATFORMS: &str = "update-platforms";
pub const SAVE_VIEWER_LOG: &str = "save-viewer-log";

// Outbound to dashboards
pub const EVENT_LIST: &str = "event-list";
pub const EVENT_DETAILS: &str = "event-details";
pub const POINT_SOURCE_DETAILS: &str = "point-source-details";
pub const EVENT_HISTORY: &str = "event-history";
pub const ADD_UPDATE_EVENT_SUMMARY: &str = "add-update-event-summary";
pub const SENSORS_FOR_EVENT: &str = "sensors-for-event";
pub const EVENT_DELETED: &str = "delete-event";
pub const ALL_PLATFORMS: &str = "all-platforms";
pub const UPDATE_SIGHTINGS: &str = "update-sightings";
pub const POINT_SOURCE_FILTER_EXTENTS: &str = "point-source-filter-extents";
pub const TOAST: &str = "toast";
pub const UPDATE_STATUS: &str = "update-status";
pub const HEARTBEAT: &str = "heartbeat";
pub const NEW_EVENT_START: &str = "new-event-start";
pub const NEW_EVENT_FINISH: &str = "new-event-finish";

// Upstream lifecycle feed
pub const FEED_NEW_EVENT_START: &str = "NEW_EVENT_START";
pub const FEED_NEW_EVENT_FINISH: &str = "NEW_EVENT_FINISH";

// Store notification channels
pub const PROCESSING_STATE_CHANGED: &str = "processing_state_changed";
pub const NEW_EVENT_INSERT: &str = "new_event_insert";
pub const NEW_HISTORY_INSERT: &str = "new_history_insert";
