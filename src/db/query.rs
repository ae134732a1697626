//! Dynamic SQL for the event list and the point source filter.
//!
//! Predicates are written with `?` markers. [`render_predicates`] is the
//! only place that turns markers into `$n` placeholders, numbering them from
//! the running count of parameters bound by the enabled predicates before it.

use anyhow::Result;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

use crate::db::models::event_models::{EventFilter, Page, ProcessingState, EVENT_COLUMNS};
use crate::db::models::point_source_models::{PointSourceFilter, POINT_SOURCE_COLUMNS};
use crate::error::Error;

pub const EVENTS_TABLE: &str = " starfall_db_schema.events ";

/// A value bound to a positional placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Float(f64),
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl BindValue {
    fn add_to(&self, args: &mut PgArguments) -> Result<()> {
        let added = match self {
            BindValue::Float(v) => args.add(*v),
            BindValue::Int(v) => args.add(*v),
            BindValue::Text(v) => args.add(v.clone()),
            BindValue::Uuid(v) => args.add(*v),
        };
        added.map_err(|e| Error::Database(format!("Failed to bind query parameter: {}", e)).into())
    }
}

/// Binds `params` in order
pub fn to_arguments(params: &[BindValue]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        param.add_to(&mut args)?;
    }
    Ok(args)
}

/// A candidate clause. One `?` marker per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub template: String,
    pub params: Vec<BindValue>,
    pub enabled: bool,
}

impl Predicate {
    pub fn new(template: impl Into<String>, params: Vec<BindValue>, enabled: bool) -> Self {
        Self {
            template: template.into(),
            params,
            enabled,
        }
    }
}

/// Rendered SQL fragment and the parameters it binds, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// Renders the enabled predicates, numbering placeholders from `first_index`.
/// Each rendered clause is trimmed and the clauses are joined with `separator`.
pub fn render_predicates(predicates: &[Predicate], first_index: usize, separator: &str) -> Rendered {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for predicate in predicates.iter().filter(|p| p.enabled) {
        let clause = instantiate(&predicate.template, first_index + params.len());
        let clause = clause.trim();
        if !clause.is_empty() {
            clauses.push(clause.to_string());
        }
        params.extend(predicate.params.iter().cloned());
    }

    Rendered {
        sql: clauses.join(separator),
        params,
    }
}

fn instantiate(template: &str, first_index: usize) -> String {
    let mut next = first_index;
    let mut out = String::with_capacity(template.len() + 8);
    for c in template.chars() {
        if c == '?' {
            out.push('$');
            out.push_str(&next.to_string());
            next += 1;
        } else {
            out.push(c);
        }
    }
    out
}

/// The FROM clause of the event list, with its WHERE part when filtered
pub fn build_event_filter_query(filter: Option<&EventFilter>) -> Rendered {
    let filter = match filter {
        Some(filter) => filter,
        None => return base_query(),
    };

    let states = filter.state_filter.selected();
    let predicates = [
        Predicate::new(
            " starfall_db_schema.events.approx_energy_j >= ? AND starfall_db_schema.events.approx_energy_j <= ? ",
            vec![
                BindValue::Float(filter.approx_energy_j.gte),
                BindValue::Float(filter.approx_energy_j.lte),
            ],
            filter.approx_energy_j.enabled,
        ),
        Predicate::new(
            " starfall_db_schema.events.approx_trigger_time >= ? AND starfall_db_schema.events.approx_trigger_time <= ? ",
            vec![
                BindValue::Float(filter.approx_trigger_time.gte),
                BindValue::Float(filter.approx_trigger_time.lte),
            ],
            filter.approx_trigger_time.enabled,
        ),
        Predicate::new(
            state_clause(&states),
            Vec::new(),
            filter.state_filter.enabled && !states.is_empty(),
        ),
        Predicate::new(" starfall_db_schema.events.user_viewed = false ", Vec::new(), filter.unviewed),
    ];

    let rendered = render_predicates(&predicates, 1, " AND ");
    if rendered.sql.is_empty() {
        return base_query();
    }

    Rendered {
        sql: format!("{}WHERE {}", EVENTS_TABLE, rendered.sql),
        params: rendered.params,
    }
}

fn base_query() -> Rendered {
    Rendered {
        sql: EVENTS_TABLE.to_string(),
        params: Vec::new(),
    }
}

fn state_clause(states: &[ProcessingState]) -> String {
    let comparisons: Vec<String> = states
        .iter()
        .map(|state| {
            format!(
                " starfall_db_schema.events.processing_state = '{}' ",
                i32::from(*state)
            )
        })
        .collect();
    format!(" ( {} ) ", comparisons.join(" OR "))
}

/// The data query of one event list page: filter parameters followed by
/// page size and offset. Fails when the offset does not fit an `i64`.
pub fn build_page_query(page: &Page) -> Result<Rendered> {
    let offset = page.page_number.checked_mul(page.page_size).ok_or_else(|| {
        Error::InvalidPayload(format!(
            "page {} of size {} is out of range",
            page.page_number, page.page_size
        ))
    })?;
    let filter = build_event_filter_query(page.event_filter.as_ref());
    let order_by = page.order_by.map(|sort| sort.order_by()).unwrap_or("");
    let limit_index = filter.params.len() + 1;

    let mut params = filter.params;
    params.push(BindValue::Int(page.page_size));
    params.push(BindValue::Int(offset));

    Ok(Rendered {
        sql: format!(
            "SELECT {} FROM{}{} LIMIT ${} OFFSET ${} ",
            EVENT_COLUMNS,
            filter.sql,
            order_by,
            limit_index,
            limit_index + 1
        ),
        params,
    })
}

/// Number of rows the page filter matches
pub fn build_filtered_count_query(page: &Page) -> Rendered {
    let filter = build_event_filter_query(page.event_filter.as_ref());
    Rendered {
        sql: format!("SELECT COUNT(*)::text FROM{}", filter.sql),
        params: filter.params,
    }
}

/// Tag predicate for the event detail view. Failed and unsolved events show
/// their raw detections, every other state its accepted point sources.
pub fn detail_tag_selector(state: ProcessingState) -> &'static str {
    match state {
        ProcessingState::Failed | ProcessingState::NoSolution => "(tag = 'GLM' or tag = 'Outlier')",
        _ => "(tag = 'Accepted' or tag = 'Group Accepted')",
    }
}

fn point_source_select() -> String {
    format!(
        "SELECT {} \
         FROM starfall_db_schema.point_sources ps \
         INNER JOIN starfall_db_schema.sightings s ON s.sighting_id = ps.sighting_id \
         INNER JOIN starfall_db_schema.tags ON tags.point_source_id = ps.point_source_id \
         WHERE ps.sighting_id = $1",
        POINT_SOURCE_COLUMNS
    )
}

/// Point sources of one sighting (`$1`) for the event detail view
pub fn build_detail_point_source_query(state: ProcessingState) -> String {
    format!("{} AND {} ORDER BY time", point_source_select(), detail_tag_selector(state))
}

/// Point sources of one sighting (`$1`) narrowed by a point source filter.
/// The returned parameters follow the sighting id.
pub fn build_point_source_filter_query(filter: &PointSourceFilter) -> Rendered {
    let extent = |column: &str, extents: [f64; 2], enabled: bool| {
        Predicate::new(
            format!(" ps.{column} >= ? AND ps.{column} <= ? "),
            vec![BindValue::Float(extents[0]), BindValue::Float(extents[1])],
            enabled,
        )
    };

    let horizon = &filter.horizon;
    let horizon_clause = match (horizon.above, horizon.below) {
        (true, false) => " ps.above_horizon = true ",
        (false, true) => " ps.above_horizon = false ",
        _ => "",
    };

    let geo = &filter.geo;
    let geo_predicate = match (geo.lat, geo.lon, geo.alt, geo.radius) {
        (Some(lat), Some(lon), Some(alt), Some(radius)) if geo.enabled => {
            let [x, y, z] = lla_to_ecef(lat, lon, alt);
            Predicate::new(
                " ST_3DDWithin(los_points_geom, ST_SetSRID(ST_MakePoint(?, ?, ?), 4978), ?) ",
                vec![
                    BindValue::Float(x),
                    BindValue::Float(y),
                    BindValue::Float(z),
                    BindValue::Float(radius),
                ],
                true,
            )
        }
        _ => {
            if geo.enabled {
                log::warn!("Geo filter missing lat, lon, alt or radius");
            }
            Predicate::new("", Vec::new(), false)
        }
    };

    let tags = &filter.tags;
    let tag_markers = vec!["?"; tags.tags.len()].join(", ");

    let predicates = [
        extent("cluster_size", filter.cluster_size.extents, filter.cluster_size.enabled),
        Predicate::new(horizon_clause, Vec::new(), horizon.enabled),
        extent("intensity", filter.intensity.extents, filter.intensity.enabled),
        extent("time", filter.time.extents, filter.time.enabled),
        geo_predicate,
        Predicate::new(
            format!(" tag IN ({}) ", tag_markers),
            tags.tags.iter().cloned().map(BindValue::Text).collect(),
            tags.enabled && !tags.tags.is_empty(),
        ),
    ];

    let rendered = render_predicates(&predicates, 2, " AND ");
    let mut sql = point_source_select();
    if !rendered.sql.is_empty() {
        sql.push_str(" AND ");
        sql.push_str(&rendered.sql);
    }
    sql.push_str(" ORDER BY time");

    Rendered {
        sql,
        params: rendered.params,
    }
}

/// WGS84 geodetic degrees and meters to earth-centered earth-fixed meters
pub fn lla_to_ecef(lat_deg: f64, lon_deg: f64, alt_m: f64) -> [f64; 3] {
    const A: f64 = 6_378_137.0;
    const E2: f64 = 6.694_379_990_14e-3;

    let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
    let n = A / (1.0 - E2 * lat.sin().powi(2)).sqrt();
    [
        (n + alt_m) * lat.cos() * lon.cos(),
        (n + alt_m) * lat.cos() * lon.sin(),
        (n * (1.0 - E2) + alt_m) * lat.sin(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::event_models::{PageSort, RangeFilter, StateFilter};
    use crate::db::models::point_source_models::{ExtentFilter, GeoFilter, HorizonFilter, TagFilter};
    use once_cell::sync::Lazy;
    use regex::Regex;
    use std::collections::BTreeMap;

    static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

    fn placeholders(sql: &str) -> Vec<usize> {
        PLACEHOLDER
            .captures_iter(sql)
            .map(|c| c[1].parse().unwrap())
            .collect()
    }

    fn filter(energy: bool, date: bool, states: &[i32], state_enabled: bool, unviewed: bool) -> EventFilter {
        EventFilter {
            approx_energy_j: RangeFilter { enabled: energy, gte: 1.0, lte: 2.0 },
            approx_trigger_time: RangeFilter { enabled: date, gte: 100.0, lte: 200.0 },
            state_filter: StateFilter {
                enabled: state_enabled,
                states: states.iter().map(|s| (s.to_string(), true)).collect::<BTreeMap<_, _>>(),
            },
            unviewed,
        }
    }

    fn page(filter: Option<EventFilter>) -> Page {
        Page {
            page_number: 3,
            page_size: 20,
            order_by: None,
            event_filter: filter,
        }
    }

    #[test]
    fn test_disabled_filter_is_base_query() {
        let rendered = build_event_filter_query(Some(&filter(false, false, &[1, 2], false, false)));
        assert_eq!(rendered, base_query());
        assert_eq!(rendered.sql, EVENTS_TABLE);
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_enabled_state_filter_without_states_contributes_nothing() {
        let empty = build_event_filter_query(Some(&filter(false, false, &[], true, false)));
        assert_eq!(empty, base_query());

        let with_energy = build_event_filter_query(Some(&filter(true, false, &[], true, false)));
        let disabled = build_event_filter_query(Some(&filter(true, false, &[], false, false)));
        assert_eq!(with_energy, disabled);
    }

    #[test]
    fn test_placeholders_match_params_for_every_subset() {
        for mask in 0..16u8 {
            let f = filter(mask & 1 != 0, mask & 2 != 0, &[0, 5], mask & 4 != 0, mask & 8 != 0);
            let query = build_page_query(&page(Some(f))).unwrap();
            let indices = placeholders(&query.sql);

            assert_eq!(indices.len(), query.params.len(), "mask {mask}: {}", query.sql);
            let expected: Vec<usize> = (1..=query.params.len()).collect();
            assert_eq!(indices, expected, "mask {mask}: {}", query.sql);
        }
    }

    #[test]
    fn test_date_after_disabled_energy_starts_at_one() {
        let rendered = build_event_filter_query(Some(&filter(false, true, &[], false, true)));
        assert_eq!(
            rendered.sql,
            " starfall_db_schema.events WHERE starfall_db_schema.events.approx_trigger_time >= $1 \
             AND starfall_db_schema.events.approx_trigger_time <= $2 AND starfall_db_schema.events.user_viewed = false"
        );
        assert_eq!(rendered.params, vec![BindValue::Float(100.0), BindValue::Float(200.0)]);
    }

    #[test]
    fn test_state_filter_renders_or_chain() {
        let rendered = build_event_filter_query(Some(&filter(true, true, &[5, 3], true, false)));
        assert!(rendered.sql.contains("<= $4 AND ( "));
        assert!(rendered.sql.contains(
            "processing_state = '3'  OR  starfall_db_schema.events.processing_state = '5'"
        ));
        assert!(!rendered.sql.contains(" IN "));
        assert_eq!(rendered.params.len(), 4);
    }

    #[test]
    fn test_page_query_appends_paging_params() {
        let mut request = page(None);
        request.order_by = Some(PageSort::EnergyAsc);
        let query = build_page_query(&request).unwrap();

        assert!(query.sql.ends_with("FROM starfall_db_schema.events  ORDER BY approx_energy_j ASC NULLS LAST  LIMIT $1 OFFSET $2 "));
        assert_eq!(query.params, vec![BindValue::Int(20), BindValue::Int(60)]);
    }

    #[test]
    fn test_page_offset_overflow_is_rejected() {
        let mut request = page(None);
        request.page_number = i64::MAX;
        request.page_size = 10;
        assert!(build_page_query(&request).is_err());
    }

    #[test]
    fn test_filtered_count_shares_filter_params() {
        let request = page(Some(filter(true, false, &[], false, true)));
        let count = build_filtered_count_query(&request);
        assert_eq!(placeholders(&count.sql), vec![1, 2]);
        assert_eq!(count.params.len(), 2);
    }

    #[test]
    fn test_detail_tag_selector() {
        assert_eq!(detail_tag_selector(ProcessingState::Failed), "(tag = 'GLM' or tag = 'Outlier')");
        assert_eq!(detail_tag_selector(ProcessingState::NoSolution), "(tag = 'GLM' or tag = 'Outlier')");
        assert_eq!(
            detail_tag_selector(ProcessingState::Accepted),
            "(tag = 'Accepted' or tag = 'Group Accepted')"
        );
        assert_eq!(
            detail_tag_selector(ProcessingState::New),
            "(tag = 'Accepted' or tag = 'Group Accepted')"
        );
    }

    #[test]
    fn test_point_source_filter_numbers_after_sighting() {
        let filter = PointSourceFilter {
            cluster_size: ExtentFilter { enabled: false, extents: [1.0, 9.0] },
            horizon: HorizonFilter { enabled: true, above: true, below: false },
            intensity: ExtentFilter { enabled: true, extents: [0.1, 0.9] },
            time: ExtentFilter { enabled: true, extents: [10.0, 20.0] },
            geo: GeoFilter { enabled: true, lat: Some(0.0), lon: Some(0.0), alt: Some(0.0), radius: Some(5000.0) },
            tags: TagFilter { enabled: true, tags: vec!["Accepted".into(), "GLM".into()] },
        };

        let rendered = build_point_source_filter_query(&filter);
        let indices = placeholders(&rendered.sql);

        assert_eq!(indices, (1..=rendered.params.len() + 1).collect::<Vec<_>>());
        assert!(rendered.sql.contains("ps.above_horizon = true"));
        assert!(rendered.sql.contains("tag IN ($10, $11)"));
        assert!(rendered.sql.ends_with(" ORDER BY time"));
        assert_eq!(rendered.params[4], BindValue::Float(6_378_137.0));
    }

    #[test]
    fn test_point_source_filter_skips_incomplete_geo_and_both_horizons() {
        let filter = PointSourceFilter {
            horizon: HorizonFilter { enabled: true, above: true, below: true },
            geo: GeoFilter { enabled: true, lat: Some(1.0), lon: None, alt: Some(0.0), radius: Some(1.0) },
            ..Default::default()
        };
        let rendered = build_point_source_filter_query(&filter);
        assert_eq!(placeholders(&rendered.sql), vec![1]);
        assert!(!rendered.sql.contains("above_horizon ="));
        assert!(!rendered.sql.contains("ST_3DDWithin"));
    }

    #[test]
    fn test_lla_to_ecef_poles() {
        let [x, y, z] = lla_to_ecef(90.0, 0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        assert!((z - 6_356_752.314).abs() < 0.01);
    }
}
