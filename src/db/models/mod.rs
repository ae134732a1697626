pub mod event_models;
pub mod light_curve;
pub mod platform_models;
pub mod point_source_models;
