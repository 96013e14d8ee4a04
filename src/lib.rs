pub mod config;
pub mod dynamic_update;
pub mod error;
pub mod manager;
pub mod record;
pub mod server;
pub mod zone;

pub use config::EngineConfig;
pub use error::{BifrostError, ConfigError, Result};
pub use manager::{SoaUpdate, ZoneManager, ZoneSpec};
pub use record::{Record, RecordData, RecordType};
