//! Light curve blobs stored with sightings and the chart series decoded from them.

use log::warn;
use prost::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, PartialEq, Message)]
pub struct SampleData {
    #[prost(int64, optional, tag = "1")]
    pub delta_time_microsecs: Option<i64>,
    #[prost(double, optional, tag = "2")]
    pub example1_rawi: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub example2_rawi: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub example1_bgsub: Option<f64>,
    #[prost(double, optional, tag = "5")]
    pub example2_bgsub: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AablData {
    #[prost(int64, optional, tag = "1")]
    pub delta_time_microsecs: Option<i64>,
    #[prost(double, optional, tag = "2")]
    pub toe_returns: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub pha_sum: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProcessData {
    #[prost(int64, optional, tag = "1")]
    pub delta_time_microsecs: Option<i64>,
    #[prost(double, optional, tag = "2")]
    pub example1_invfiltered: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub example2_invfiltered: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub integrated_signal: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LightCurve {
    #[prost(string, optional, tag = "1")]
    pub trigger_timestamp: Option<String>,
    #[prost(double, optional, tag = "2")]
    pub coarse_event_time: Option<f64>,
    #[prost(message, repeated, tag = "3")]
    pub samples: Vec<SampleData>,
    #[prost(message, repeated, tag = "4")]
    pub dtoa_data: Vec<AablData>,
    #[prost(message, repeated, tag = "5")]
    pub processed: Vec<ProcessData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LightCurveType {
    Raw = 0,
    BackgroundSubtracted = 1,
    InverseFiltered = 2,
    Integrated = 3,
}

/// One chart series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveSeries {
    #[serde(rename = "triggerTimestamp")]
    pub trigger_timestamp: Option<String>,
    pub sensor_id: Uuid,
    pub title: String,
    pub x: Vec<Option<f64>>,
    pub y_label: String,
    pub y_units: String,
    pub y: Vec<Option<f64>>,
    #[serde(rename = "type")]
    pub curve_type: i32,
}

/// Parses a stored blob, hex text or raw protobuf bytes
pub fn decode_light_curve(data: &[u8]) -> Option<LightCurve> {
    let text = std::str::from_utf8(data).ok().map(str::trim);
    let bytes = match text {
        Some(t) if t.len() % 2 == 0 && t.bytes().all(|b| b.is_ascii_hexdigit()) => match hex::decode(t) {
            Ok(bytes) => bytes,
            Err(_) => data.to_vec(),
        },
        _ => data.to_vec(),
    };

    match LightCurve::decode(bytes.as_slice()) {
        Ok(curve) => Some(curve),
        Err(e) => {
            warn!("Invalid light curve protobuf: {}", e);
            None
        }
    }
}

/// The seven chart series of a light curve blob; none when it cannot be decoded
pub fn translate_light_curves(data: &[u8], sensor_id: Uuid) -> Vec<LightCurveSeries> {
    let curve = match decode_light_curve(data) {
        Some(curve) => curve,
        None => return Vec::new(),
    };

    let sample_x: Vec<Option<f64>> = curve
        .samples
        .iter()
        .map(|s| s.delta_time_microsecs.map(|t| t as f64))
        .collect();
    let processed_x: Vec<Option<f64>> = curve
        .processed
        .iter()
        .map(|p| p.delta_time_microsecs.map(|t| t as f64))
        .collect();

    let series = |title: &str, x: &[Option<f64>], y_label: &str, y_units: &str, y: Vec<Option<f64>>, curve_type: LightCurveType| {
        LightCurveSeries {
            trigger_timestamp: curve.trigger_timestamp.clone(),
            sensor_id,
            title: title.to_string(),
            x: x.to_vec(),
            y_label: y_label.to_string(),
            y_units: y_units.to_string(),
            y,
            curve_type: curve_type as i32,
        }
    };
    let samples = |f: fn(&SampleData) -> Option<f64>| curve.samples.iter().map(f).collect::<Vec<_>>();
    let processed = |f: fn(&ProcessData) -> Option<f64>| curve.processed.iter().map(f).collect::<Vec<_>>();

    vec![
        series("Raw Optical Graph", &sample_x, "Counts", "Counts", samples(|s| s.example1_rawi), LightCurveType::Raw),
        series("Raw Optical Graph", &sample_x, "Counts", "Counts", samples(|s| s.example2_rawi), LightCurveType::Raw),
        series("Background Subtract", &sample_x, "Counts", "Counts", samples(|s| s.example1_bgsub), LightCurveType::BackgroundSubtracted),
        series("Background Subtract Graph", &sample_x, "Counts", "Counts", samples(|s| s.example2_bgsub), LightCurveType::BackgroundSubtracted),
        series("Inverse Filter Graph", &processed_x, "Intensity (GW/sr)", "GW/sr", processed(|p| p.example1_invfiltered), LightCurveType::InverseFiltered),
        series("Inverse Filter Graph", &processed_x, "Intensity (GW/sr)", "GW/sr", processed(|p| p.example2_invfiltered), LightCurveType::InverseFiltered),
        series("Integrated Graph", &processed_x, "Energy (e10 J)", "E10 joules", processed(|p| p.integrated_signal), LightCurveType::Integrated),
    ]
}
