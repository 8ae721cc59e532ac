//! Tile-resident navigation mesh data
//!
//! A tile is a rectangular patch of navigable mesh: vertices, convex
//! polygons, the directed link graph between polygons, an optional detail
//! mesh for accurate surface heights, an optional bounding-volume tree for
//! spatial lookup, and any off-mesh connections anchored in the tile.

use crate::{PolyFlags, PolyRef, MAX_VERTS_PER_POLY};

/// Polygon kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PolyType {
    /// Regular walkable polygon
    #[default]
    Ground = 0,
    /// Point-to-point jump with two endpoint vertices and no interior
    OffMeshConnection = 1,
}

/// Directed edge in the polygon adjacency graph
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Next link in the owning polygon's chain
    pub next: Option<u32>,
    /// Edge index on the source polygon that owns this link
    pub edge: u8,
    /// Boundary side the link crosses (0, 2, 4 or 6), or 0xff for an
    /// internal edge
    pub side: u8,
    /// Lower bound of the traversable sub-interval of the shared edge,
    /// quantized to [0, 255]
    pub bmin: u8,
    /// Upper bound of the traversable sub-interval
    pub bmax: u8,
}

impl Link {
    /// A detached null link
    pub fn null() -> Self {
        Self {
            reference: PolyRef::NONE,
            next: None,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// Polygon in a navigation mesh tile
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// First link in this polygon's chain
    pub first_link: Option<u32>,
    /// Vertex indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per-edge neighbor codes: 0 = wall, n = internal neighbor `n - 1`,
    /// `EXT_LINK | side` = tile boundary
    pub neighbors: [u16; MAX_VERTS_PER_POLY],
    /// Capability flags
    pub flags: PolyFlags,
    /// Number of vertices used
    pub vert_count: u8,
    /// Area id indexing the filter's cost table
    pub area: u8,
    /// Polygon kind
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates an empty polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: None,
            verts: [0; MAX_VERTS_PER_POLY],
            neighbors: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area,
            poly_type,
        }
    }
}

/// Detail mesh of a polygon: a triangulation with extra interior vertices
/// for accurate surface heights
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    /// First vertex in the tile's detail vertex array
    pub vert_base: u32,
    /// First triangle in the tile's detail triangle array
    pub tri_base: u32,
    /// Number of detail vertices
    pub vert_count: u8,
    /// Number of detail triangles
    pub tri_count: u8,
}

/// Bounding volume tree node with quantized coordinates.
///
/// `i >= 0` marks a leaf holding a polygon index; a negative `i` is an
/// internal node whose negation is the escape offset past its subtree.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    /// Quantized bounding box minimum
    pub bmin: [u16; 3],
    /// Quantized bounding box maximum
    pub bmax: [u16; 3],
    /// Leaf polygon index, or negated escape offset
    pub i: i32,
}

/// Off-mesh connection: a two-endpoint jump anchored in a tile
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshConnection {
    /// Endpoint positions `[sx,sy,sz, ex,ey,ez]`
    pub pos: [f32; 6],
    /// Endpoint snap radius
    pub radius: f32,
    /// Index of the connection's polygon within the tile
    pub poly: u16,
    /// Direction flags; bit 0 set = traversable in both directions
    pub flags: u8,
    /// Boundary side of the far endpoint, or 0xff when it lands in the
    /// same tile
    pub side: u8,
    /// User-assigned id carried through from the build
    pub user_id: u32,
}

impl OffMeshConnection {
    /// Bidirectional traversal flag
    pub const BIDIR: u8 = 0x01;

    /// Start position of the connection
    pub fn start_pos(&self) -> [f32; 3] {
        [self.pos[0], self.pos[1], self.pos[2]]
    }

    /// End position of the connection
    pub fn end_pos(&self) -> [f32; 3] {
        [self.pos[3], self.pos[4], self.pos[5]]
    }

    /// True when the connection can be traversed both ways
    pub fn is_bidirectional(&self) -> bool {
        self.flags & Self::BIDIR != 0
    }
}

/// Tile header information
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileHeader {
    /// Tile grid position
    pub x: i32,
    pub y: i32,
    /// Layer within the grid cell
    pub layer: i32,
    /// User-assigned id carried through from the build
    pub user_id: u32,
    /// Number of polygons
    pub poly_count: i32,
    /// Number of vertices
    pub vert_count: i32,
    /// Capacity of the link pool
    pub max_link_count: i32,
    /// Number of detail meshes
    pub detail_mesh_count: i32,
    /// Number of detail vertices
    pub detail_vert_count: i32,
    /// Number of detail triangles
    pub detail_tri_count: i32,
    /// Number of bounding volume nodes (0 = no tree)
    pub bv_node_count: i32,
    /// Number of off-mesh connections
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: i32,
    /// Agent height the tile was built for
    pub walkable_height: f32,
    /// Agent radius the tile was built for
    pub walkable_radius: f32,
    /// Maximum vertical step the agent can cross
    pub walkable_climb: f32,
    /// World-space bounding box of the tile
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Factor converting tile-local world units into quantized 16-bit
    /// BV coordinates: `q = (world - bmin) * bv_quant_factor`
    pub bv_quant_factor: f32,
}

/// Tile resident in the navigation mesh
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshTile {
    /// Generation counter folded into polygon references; bumped when the
    /// slot is recycled so stale references are rejected
    pub salt: u32,
    /// Header, present while the slot holds tile data
    pub header: Option<TileHeader>,
    /// Vertices `[x,y,z, ...]`
    pub verts: Vec<f32>,
    /// Polygons
    pub polys: Vec<Poly>,
    /// Link pool; chains start at each polygon's `first_link`
    pub links: Vec<Link>,
    /// Detail mesh headers, one per polygon when present
    pub detail_meshes: Vec<PolyDetail>,
    /// Detail vertices `[x,y,z, ...]`
    pub detail_verts: Vec<f32>,
    /// Detail triangles, 4 bytes each (three indices plus edge flags)
    pub detail_tris: Vec<u8>,
    /// Bounding volume tree in traversal order, empty when absent
    pub bv_tree: Vec<BVNode>,
    /// Off-mesh connections anchored in this tile
    pub off_mesh_cons: Vec<OffMeshConnection>,
    /// Head of the link freelist; managed by the store
    pub free_link: Option<u32>,
    /// Next free tile slot; managed by the store
    pub next: Option<usize>,
}

impl MeshTile {
    /// Allocates a link from the tile's freelist
    pub(crate) fn alloc_link(&mut self) -> Option<u32> {
        let idx = self.free_link?;
        self.free_link = self.links[idx as usize].next;
        Some(idx)
    }

    /// Returns a link to the freelist
    pub(crate) fn release_link(&mut self, idx: u32) {
        self.links[idx as usize] = Link::null();
        self.links[idx as usize].next = self.free_link;
        self.free_link = Some(idx);
    }

    /// Rebuilds the link freelist over the whole pool
    pub(crate) fn reset_links(&mut self) {
        let n = self.links.len();
        for i in 0..n {
            self.links[i] = Link::null();
            self.links[i].next = if i + 1 < n { Some(i as u32 + 1) } else { None };
        }
        self.free_link = if n > 0 { Some(0) } else { None };
    }

    /// Position of tile vertex `i`
    pub fn vert(&self, i: usize) -> [f32; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }

    /// Position of detail vertex `i`
    pub fn detail_vert(&self, i: usize) -> [f32; 3] {
        [
            self.detail_verts[i * 3],
            self.detail_verts[i * 3 + 1],
            self.detail_verts[i * 3 + 2],
        ]
    }

    /// Resolves a detail triangle vertex for polygon `poly`: indices below
    /// the polygon's vertex count refer to polygon corners, the rest into
    /// the detail vertex array.
    pub fn detail_tri_vert(&self, poly: &Poly, pd: &PolyDetail, idx: u8) -> [f32; 3] {
        if (idx as usize) < poly.vert_count as usize {
            self.vert(poly.verts[idx as usize] as usize)
        } else {
            self.detail_vert(pd.vert_base as usize + idx as usize - poly.vert_count as usize)
        }
    }
}
