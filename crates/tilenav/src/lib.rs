//! Tiled navigation-mesh query engine
//!
//! A navigation mesh is a set of convex polygons stitched into tiles that
//! cover the walkable surface of a 3D world. This crate owns the *query*
//! side: resolving points to polygons, searching the polygon graph for
//! corridors, pulling corridors tight into straight paths, and casting
//! planar rays along the surface. Tiles arrive pre-built as little-endian
//! byte blobs; [`read_tile`] and [`write_tile`] define the wire layout.

mod binary_format;
mod filter;
mod nav_mesh;
mod nav_mesh_query;
mod node_pool;
mod poly_query;
mod status;
mod tile;

#[cfg(test)]
mod test_tile_helpers;

#[cfg(test)]
mod query_scenario_tests;

pub use binary_format::{read_tile, write_tile, TILE_MAGIC, TILE_VERSION};
pub use filter::QueryFilter;
pub use nav_mesh::{NavMesh, NavMeshParams};
pub use nav_mesh_query::{
    MoveAlongSurfaceResult, NavMeshQuery, PolyPath, RaycastHit, RaycastOptions, StraightPath,
    StraightPathFlags, StraightPathOptions, StraightPathPoint, H_SCALE,
};
pub use node_pool::{Node, NodeFlags, NodeIndex, NodePool, NodeQueue};
pub use poly_query::{CollectPolysQuery, FindNearestPolyQuery, PolyQuery};
pub use status::Status;
pub use tile::{
    BVNode, Link, MeshTile, OffMeshConnection, Poly, PolyDetail, PolyType, TileHeader,
};

use bitflags::bitflags;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Number of entries in a query filter's per-area cost table
pub const MAX_AREAS: usize = 64;

/// Marker in a polygon's neighbor array for an edge on the tile border.
/// The low bits carry the compass side (0, 2, 4 or 6).
pub const EXT_LINK: u16 = 0x8000;

/// A polygon's `side` value for links that stay inside one tile
pub const INTERNAL_LINK_SIDE: u8 = 0xff;

/// Reference to a polygon in the navigation mesh.
///
/// Packs (salt, tile index, polygon index); the exact bit split is chosen
/// by the [`NavMesh`] from its tile and polygon capacities. The zero value
/// means *no polygon*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u64);

impl PolyRef {
    /// The null reference
    pub const NONE: PolyRef = PolyRef(0);

    /// Creates a reference from a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id of the reference
    pub const fn id(self) -> u64 {
        self.0
    }

    /// True when the reference is not the null reference
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Reference to a resident tile (the base reference of its polygon 0)
pub type TileRef = PolyRef;

bitflags! {
    /// Per-polygon capability flags matched against the query filter
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PolyFlags: u16 {
        /// Ground the agent can walk on
        const WALK = 0x01;
        /// Water the agent can swim through
        const SWIM = 0x02;
        /// A door that may be open or closed
        const DOOR = 0x04;
        /// An off-mesh jump
        const JUMP = 0x08;
        /// Polygon disabled at runtime
        const DISABLED = 0x10;
        /// All flags set
        const ALL = 0xffff;
    }
}

#[cfg(feature = "serialization")]
impl serde::Serialize for PolyFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

#[cfg(feature = "serialization")]
impl<'de> serde::Deserialize<'de> for PolyFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(PolyFlags::from_bits_truncate(u16::deserialize(deserializer)?))
    }
}
