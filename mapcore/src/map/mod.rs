//! Coordinate spaces, projection and view state

pub mod coords;
pub mod inertia;
pub mod projection;
pub mod rect;
pub mod scene;
pub mod tile;
pub mod view;

pub use coords::{GeoPoint, MercatorPoint, repeat, repeat01, wrap_delta};
pub use inertia::Inertia;
pub use projection::{Projection, SphericalMercator, mercator_to_tile, tile_to_mercator};
pub use rect::{GeoRect, MercatorRect, TileRect, WrappedRect};
pub use scene::{SceneContext, TiledScene};
pub use tile::{TileId, TilePoint};
pub use view::{ChangeFlags, MapView, ViewBounds, ViewChange, ZoomRange};
