use sqlx::PgPool;
use std::sync::Arc;

pub mod events;
pub mod platforms;
pub mod point_sources;

use events::EventsRepository;
use platforms::PlatformsRepository;
use point_sources::PointSourcesRepository;

/// The repositories sharing one pool
#[derive(Clone)]
pub struct Repositories {
    pub events: EventsRepository,
    pub point_sources: PointSourcesRepository,
    pub platforms: PlatformsRepository,
}

impl Repositories {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            events: EventsRepository::new(pool.clone()),
            point_sources: PointSourcesRepository::new(pool.clone()),
            platforms: PlatformsRepository::new(pool),
        }
    }
}
