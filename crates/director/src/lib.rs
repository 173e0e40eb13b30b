mod atomic_io;
pub mod bridge;
pub mod classifier;
pub mod config;
mod director;
pub mod features;
pub mod instancing;
pub mod math;
pub mod movement;
pub mod persistence;
pub mod record;
pub mod scheduler;
pub mod waypoint;
pub mod worker;

pub use bridge::{
    spawn_rotation, ActorLayer, CapturedEntity, EntityHandle, ForegroundBridge, PromoteError,
    Promoted,
};
pub use classifier::{classify, classify_record, keeps_foreground, Tier};
pub use config::{
    ConfigError, DirectorConfig, LayerRadii, PerEntityConfig, WorkerConfig,
    MIN_UPDATE_RATE_SECONDS,
};
pub use director::{DirectorError, TickReport, WorldDirector};
pub use features::{sample_polyline, InterestingPlace, RoadPath, WorldFeatures};
pub use instancing::{visible_instances, InstanceTransform};
pub use math::{Rotator, Transform, Vec3};
pub use persistence::{PersistenceError, SaveState, SAVE_VERSION};
pub use record::{ArchetypeId, EntityKind, EntityRecord};
pub use scheduler::{BudgetedCursor, SkipGate};
pub use waypoint::{NavigationService, Resolution, RoadDirection, WaypointResolver};
pub use worker::{
    BackgroundWorker, ExchangeProtocol, MainExchange, PauseGate, PoolSnapshot, TierCounts,
    WorkerError, WorkerMetricsHandle, WorkerMetricsSnapshot, WorkingSet, WORKER_THREAD_NAME,
};
