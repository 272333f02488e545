//! Slippy map core: coordinate spaces, view state and procedural OSM
//! building meshes.

pub mod building;
pub mod config;
pub mod map;
pub mod system;

pub use building::{Building, BuildingHooks, BuildingManager, BuildingMesh, FootprintSource};
pub use config::MapConfig;
pub use map::{GeoPoint, MapView, MercatorPoint, TilePoint};
pub use system::{FrameReport, MapSystem};
