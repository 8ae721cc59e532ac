//! Tile store for the navigation mesh
//!
//! The [`NavMesh`] owns the resident tiles, hands out and validates
//! polygon references, and stitches tiles together: when a tile is added
//! its internal links are rebuilt from the polygon neighbor codes, its
//! off-mesh connections are anchored, and its border edges are connected
//! to already-resident neighbours by portal-slab overlap. Queries only
//! ever read from the store.

use std::collections::HashMap;

use tilenav_common::{vdist_sqr, vlerp, visfinite};

use crate::binary_format::read_tile;
use crate::tile::{Link, MeshTile, Poly, PolyType};
use crate::{PolyRef, Status, TileRef, EXT_LINK, INTERNAL_LINK_SIDE, MAX_VERTS_PER_POLY};

/// Construction parameters of a navigation mesh
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World-space origin of the tile grid
    pub origin: [f32; 3],
    /// Width of each tile along the x axis
    pub tile_width: f32,
    /// Height of each tile along the z axis
    pub tile_height: f32,
    /// Maximum number of resident tiles
    pub max_tiles: i32,
    /// Maximum number of polygons per tile
    pub max_polys_per_tile: i32,
}

/// Returns the side on the other end of a boundary crossing
#[inline]
pub fn opposite_tile(side: i32) -> i32 {
    (side + 4) & 0x7
}

fn get_slab_coord(va: &[f32; 3], side: i32) -> f32 {
    if side == 0 || side == 4 {
        va[0]
    } else if side == 2 || side == 6 {
        va[2]
    } else {
        0.0
    }
}

fn calc_slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: i32) -> ([f32; 2], [f32; 2]) {
    if side == 0 || side == 4 {
        if va[2] < vb[2] {
            ([va[2], va[1]], [vb[2], vb[1]])
        } else {
            ([vb[2], vb[1]], [va[2], va[1]])
        }
    } else if va[0] < vb[0] {
        ([va[0], va[1]], [vb[0], vb[1]])
    } else {
        ([vb[0], vb[1]], [va[0], va[1]])
    }
}

fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    // Check horizontal overlap, shrunk by the padding.
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Heights of both slab segments at the overlap endpoints.
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap.
    if dmin * dmax < 0.0 {
        return true;
    }

    // Overlapping when within the climb threshold.
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

/// Link specification gathered while reading, applied under a single
/// mutable borrow
struct PendingLink {
    poly: usize,
    reference: PolyRef,
    edge: u8,
    side: u8,
    bmin: u8,
    bmax: u8,
}

/// Tile store owning the navigation mesh data
pub struct NavMesh {
    params: NavMeshParams,
    origin: [f32; 3],
    tile_width: f32,
    tile_height: f32,
    tiles: Vec<MeshTile>,
    /// Tile slots resident at each grid cell, one per layer
    pos_lookup: HashMap<(i32, i32), Vec<usize>>,
    next_free: Option<usize>,
    salt_bits: u32,
    tile_bits: u32,
    poly_bits: u32,
}

impl NavMesh {
    /// Creates an empty navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self, Status> {
        if !visfinite(&params.origin)
            || params.tile_width <= 0.0
            || params.tile_height <= 0.0
            || params.max_tiles <= 0
            || params.max_polys_per_tile <= 0
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let tile_bits = (params.max_tiles as u32).next_power_of_two().trailing_zeros();
        let poly_bits = (params.max_polys_per_tile as u32)
            .next_power_of_two()
            .trailing_zeros();
        // Only allow 31 salt bits, since the salt mask is calculated using 32-bit uint.
        let salt_bits = (64 - tile_bits - poly_bits).min(31);
        if salt_bits < 10 {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let max_tiles = params.max_tiles as usize;
        let mut tiles = vec![MeshTile::default(); max_tiles];
        for (i, tile) in tiles.iter_mut().enumerate() {
            tile.salt = 1;
            tile.next = if i + 1 < max_tiles { Some(i + 1) } else { None };
        }

        Ok(Self {
            origin: params.origin,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            tiles,
            pos_lookup: HashMap::new(),
            next_free: Some(0),
            salt_bits,
            tile_bits,
            poly_bits,
            params,
        })
    }

    /// Construction parameters of the mesh
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Maximum number of resident tiles
    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Encodes a polygon reference from its components
    #[inline]
    pub(crate) fn encode_poly_id(&self, salt: u32, it: usize, ip: usize) -> PolyRef {
        PolyRef::new(
            ((salt as u64) << (self.poly_bits + self.tile_bits))
                | ((it as u64) << self.poly_bits)
                | ip as u64,
        )
    }

    /// Decodes a polygon reference into (salt, tile index, polygon index)
    #[inline]
    pub(crate) fn decode_poly_id(&self, reference: PolyRef) -> (u32, usize, usize) {
        let salt_mask = (1u64 << self.salt_bits) - 1;
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        let id = reference.id();
        let salt = ((id >> (self.poly_bits + self.tile_bits)) & salt_mask) as u32;
        let it = ((id >> self.poly_bits) & tile_mask) as usize;
        let ip = (id & poly_mask) as usize;
        (salt, it, ip)
    }

    /// True when the reference points at a live polygon
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        if !reference.is_valid() {
            return false;
        }
        let (salt, it, ip) = self.decode_poly_id(reference);
        if it >= self.tiles.len() {
            return false;
        }
        let tile = &self.tiles[it];
        if tile.salt != salt {
            return false;
        }
        match &tile.header {
            Some(header) => ip < header.poly_count as usize,
            None => false,
        }
    }

    /// Resolves a reference into its tile and polygon
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly), Status> {
        if !self.is_valid_poly_ref(reference) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        let (_, it, ip) = self.decode_poly_id(reference);
        Ok((&self.tiles[it], &self.tiles[it].polys[ip]))
    }

    /// Resolves a reference assumed valid; input checked by the caller
    pub fn get_tile_and_poly_by_ref_unchecked(&self, reference: PolyRef) -> (&MeshTile, &Poly) {
        debug_assert!(self.is_valid_poly_ref(reference));
        let (_, it, ip) = self.decode_poly_id(reference);
        (&self.tiles[it], &self.tiles[it].polys[ip])
    }

    /// Base reference of a tile; polygon refs in the tile are
    /// `base | poly_index`
    pub fn get_poly_ref_base(&self, tile: &MeshTile) -> PolyRef {
        let base = self.tiles.as_ptr() as usize;
        let ptr = tile as *const MeshTile as usize;
        if ptr < base {
            return PolyRef::NONE;
        }
        let it = (ptr - base) / std::mem::size_of::<MeshTile>();
        if it >= self.tiles.len() {
            return PolyRef::NONE;
        }
        self.poly_ref_base_slot(it)
    }

    fn poly_ref_base_slot(&self, slot: usize) -> PolyRef {
        self.encode_poly_id(self.tiles[slot].salt, slot, 0)
    }

    /// Computes the tile grid cell containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.origin[0]) / self.tile_width).floor() as i32;
        let ty = ((pos[2] - self.origin[2]) / self.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Tile at the given grid cell and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.get_tile_slot_at(x, y, layer).map(|s| &self.tiles[s])
    }

    /// All tiles stacked at the given grid cell
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.tile_slots_at(x, y)
            .iter()
            .map(|&s| &self.tiles[s])
            .collect()
    }

    pub(crate) fn tile_slots_at(&self, x: i32, y: i32) -> &[usize] {
        self.pos_lookup
            .get(&(x, y))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn tile_at_slot(&self, slot: usize) -> &MeshTile {
        &self.tiles[slot]
    }

    pub(crate) fn base_ref_at_slot(&self, slot: usize) -> PolyRef {
        self.poly_ref_base_slot(slot)
    }

    fn get_tile_slot_at(&self, x: i32, y: i32, layer: i32) -> Option<usize> {
        self.tile_slots_at(x, y)
            .iter()
            .copied()
            .find(|&s| match &self.tiles[s].header {
                Some(h) => h.layer == layer,
                None => false,
            })
    }

    fn neighbour_tile_slots(&self, x: i32, y: i32, side: i32) -> Vec<usize> {
        let (nx, ny) = match side {
            0 => (x + 1, y),
            1 => (x + 1, y + 1),
            2 => (x, y + 1),
            3 => (x - 1, y + 1),
            4 => (x - 1, y),
            5 => (x - 1, y - 1),
            6 => (x, y - 1),
            _ => (x + 1, y - 1),
        };
        self.tile_slots_at(nx, ny).to_vec()
    }

    /// Adds a pre-built tile blob to the mesh.
    ///
    /// Returns the tile's base reference. Fails with `ALREADY_OCCUPIED`
    /// when the tile's grid location and layer are taken, and
    /// `OUT_OF_MEMORY` when all tile slots are in use.
    pub fn add_tile(&mut self, data: &[u8]) -> Result<TileRef, Status> {
        let mut tile = read_tile(data)?;
        let header = tile.header.clone().expect("read_tile produces a header");

        if self
            .get_tile_slot_at(header.x, header.y, header.layer)
            .is_some()
        {
            return Err(Status::failure_detail(Status::ALREADY_OCCUPIED));
        }

        let slot = self
            .next_free
            .ok_or(Status::failure_detail(Status::OUT_OF_MEMORY))?;
        self.next_free = self.tiles[slot].next;

        // The slot keeps its salt across reuse so stale refs stay invalid.
        tile.salt = self.tiles[slot].salt;
        tile.next = None;
        self.tiles[slot] = tile;
        self.pos_lookup
            .entry((header.x, header.y))
            .or_default()
            .push(slot);

        self.connect_int_links(slot);
        self.base_off_mesh_links(slot);
        self.connect_ext_off_mesh_links(slot, slot, -1);

        // Connect with other layers in the same cell.
        let same: Vec<usize> = self
            .tile_slots_at(header.x, header.y)
            .iter()
            .copied()
            .filter(|&s| s != slot)
            .collect();
        for nei in same {
            self.connect_ext_links(slot, nei, -1);
            self.connect_ext_links(nei, slot, -1);
            self.connect_ext_off_mesh_links(slot, nei, -1);
            self.connect_ext_off_mesh_links(nei, slot, -1);
        }

        // Connect with neighbour tiles on all eight sides.
        for side in 0..8 {
            for nei in self.neighbour_tile_slots(header.x, header.y, side) {
                self.connect_ext_links(slot, nei, side);
                self.connect_ext_links(nei, slot, opposite_tile(side));
                self.connect_ext_off_mesh_links(slot, nei, side);
                self.connect_ext_off_mesh_links(nei, slot, opposite_tile(side));
            }
        }

        Ok(self.poly_ref_base_slot(slot))
    }

    /// Removes a resident tile and invalidates all references into it
    pub fn remove_tile(&mut self, reference: TileRef) -> Result<(), Status> {
        let (salt, slot, _) = self.decode_poly_id(reference);
        if slot >= self.tiles.len()
            || self.tiles[slot].salt != salt
            || self.tiles[slot].header.is_none()
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let header = self.tiles[slot].header.clone().unwrap();

        // Detach links held by neighbouring tiles.
        let mut neighbours: Vec<usize> = self
            .tile_slots_at(header.x, header.y)
            .iter()
            .copied()
            .filter(|&s| s != slot)
            .collect();
        for side in 0..8 {
            neighbours.extend(self.neighbour_tile_slots(header.x, header.y, side));
        }
        for nei in neighbours {
            self.unconnect_links(nei, slot);
        }

        if let Some(slots) = self.pos_lookup.get_mut(&(header.x, header.y)) {
            slots.retain(|&s| s != slot);
            if slots.is_empty() {
                self.pos_lookup.remove(&(header.x, header.y));
            }
        }

        let salt_mask = ((1u64 << self.salt_bits) - 1) as u32;
        let mut salt = (self.tiles[slot].salt + 1) & salt_mask;
        if salt == 0 {
            salt = 1;
        }

        self.tiles[slot] = MeshTile {
            salt,
            next: self.next_free,
            ..MeshTile::default()
        };
        self.next_free = Some(slot);

        Ok(())
    }

    /// Builds the in-tile links from the polygon neighbor codes
    fn connect_int_links(&mut self, slot: usize) {
        let base = self.poly_ref_base_slot(slot);
        let tile = &mut self.tiles[slot];

        for i in 0..tile.polys.len() {
            tile.polys[i].first_link = None;
            if tile.polys[i].poly_type == PolyType::OffMeshConnection {
                continue;
            }

            // Build edge links backwards so the list is in forward order.
            let nv = tile.polys[i].vert_count as usize;
            for j in (0..nv).rev() {
                let nei = tile.polys[i].neighbors[j];
                if nei == 0 || (nei & EXT_LINK) != 0 {
                    continue;
                }
                let Some(idx) = tile.alloc_link() else { continue };
                tile.links[idx as usize] = Link {
                    reference: PolyRef::new(base.id() | (nei as u64 - 1)),
                    next: tile.polys[i].first_link,
                    edge: j as u8,
                    side: INTERNAL_LINK_SIDE,
                    bmin: 0,
                    bmax: 0,
                };
                tile.polys[i].first_link = Some(idx);
            }
        }
    }

    /// Anchors the near endpoint of each off-mesh connection in its tile
    fn base_off_mesh_links(&mut self, slot: usize) {
        let base = self.poly_ref_base_slot(slot);
        let con_count = self.tiles[slot].off_mesh_cons.len();

        for ci in 0..con_count {
            let con = self.tiles[slot].off_mesh_cons[ci];
            let climb = self.tiles[slot].header.as_ref().unwrap().walkable_climb;
            let half_extents = [con.radius, climb, con.radius];

            let start = con.start_pos();
            let Some((nearest_ref, nearest_pt)) =
                self.find_nearest_poly_in_tile(slot, &start, &half_extents)
            else {
                continue;
            };
            // The nearest point may lie past the snap radius.
            let dx = nearest_pt[0] - start[0];
            let dz = nearest_pt[2] - start[2];
            if dx * dx + dz * dz > con.radius * con.radius {
                continue;
            }

            let (_, _, land_ip) = self.decode_poly_id(nearest_ref);
            let con_poly_idx = con.poly as usize;
            let tile = &mut self.tiles[slot];

            // Snap the endpoint vertex onto the mesh.
            let v = tile.polys[con_poly_idx].verts[0] as usize;
            tile.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest_pt);

            // Connection polygon to the landing polygon.
            if let Some(idx) = tile.alloc_link() {
                tile.links[idx as usize] = Link {
                    reference: nearest_ref,
                    next: tile.polys[con_poly_idx].first_link,
                    edge: 0,
                    side: INTERNAL_LINK_SIDE,
                    bmin: 0,
                    bmax: 0,
                };
                tile.polys[con_poly_idx].first_link = Some(idx);
            }

            // The start point always connects back to the connection.
            if let Some(idx) = tile.alloc_link() {
                tile.links[idx as usize] = Link {
                    reference: PolyRef::new(base.id() | con_poly_idx as u64),
                    next: tile.polys[land_ip].first_link,
                    edge: INTERNAL_LINK_SIDE,
                    side: INTERNAL_LINK_SIDE,
                    bmin: 0,
                    bmax: 0,
                };
                tile.polys[land_ip].first_link = Some(idx);
            }
        }
    }

    /// Connects the far endpoints of `target`'s off-mesh connections into
    /// `slot`. `side` is the boundary crossed, or -1 within one cell.
    fn connect_ext_off_mesh_links(&mut self, slot: usize, target: usize, side: i32) {
        let opposite_side = if side == -1 {
            0xff
        } else {
            opposite_tile(side) as u8
        };
        let con_count = self.tiles[target].off_mesh_cons.len();
        let target_base = self.poly_ref_base_slot(target);

        for ci in 0..con_count {
            let con = self.tiles[target].off_mesh_cons[ci];
            if con.side != opposite_side {
                continue;
            }
            let con_poly_idx = con.poly as usize;
            // Skip connections whose start could not be anchored at all.
            if self.tiles[target].polys[con_poly_idx].first_link.is_none() {
                continue;
            }

            let climb = self.tiles[target].header.as_ref().unwrap().walkable_climb;
            let half_extents = [con.radius, climb, con.radius];
            let end = con.end_pos();
            let Some((nearest_ref, nearest_pt)) =
                self.find_nearest_poly_in_tile(slot, &end, &half_extents)
            else {
                continue;
            };
            let dx = nearest_pt[0] - end[0];
            let dz = nearest_pt[2] - end[2];
            if dx * dx + dz * dz > con.radius * con.radius {
                continue;
            }

            // Snap the far vertex onto the landing mesh.
            {
                let t = &mut self.tiles[target];
                let v = t.polys[con_poly_idx].verts[1] as usize;
                t.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest_pt);
            }

            // Connection polygon to the landing polygon.
            {
                let t = &mut self.tiles[target];
                if let Some(idx) = t.alloc_link() {
                    t.links[idx as usize] = Link {
                        reference: nearest_ref,
                        next: t.polys[con_poly_idx].first_link,
                        edge: 1,
                        side: opposite_side,
                        bmin: 0,
                        bmax: 0,
                    };
                    t.polys[con_poly_idx].first_link = Some(idx);
                }
            }

            // Landing polygon back to the connection when bidirectional.
            if con.is_bidirectional() {
                let (_, _, land_ip) = self.decode_poly_id(nearest_ref);
                let link_side = if side == -1 { 0xff } else { side as u8 };
                let t = &mut self.tiles[slot];
                if let Some(idx) = t.alloc_link() {
                    t.links[idx as usize] = Link {
                        reference: PolyRef::new(target_base.id() | con_poly_idx as u64),
                        next: t.polys[land_ip].first_link,
                        edge: INTERNAL_LINK_SIDE,
                        side: link_side,
                        bmin: 0,
                        bmax: 0,
                    };
                    t.polys[land_ip].first_link = Some(idx);
                }
            }
        }
    }

    /// Connects `slot`'s border edges on `side` (-1 = same cell) to
    /// polygons of `target`
    fn connect_ext_links(&mut self, slot: usize, target: usize, side: i32) {
        let mut pending: Vec<PendingLink> = Vec::new();
        {
            let tile = &self.tiles[slot];
            let target_tile = &self.tiles[target];
            if tile.header.is_none() || target_tile.header.is_none() {
                return;
            }
            let target_base = self.poly_ref_base_slot(target);

            for (i, poly) in tile.polys.iter().enumerate() {
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    if (poly.neighbors[j] & EXT_LINK) == 0 {
                        continue;
                    }
                    let dir = (poly.neighbors[j] & 0xff) as i32;
                    if side != -1 && dir != side {
                        continue;
                    }

                    let va = tile.vert(poly.verts[j] as usize);
                    let vb = tile.vert(poly.verts[(j + 1) % nv] as usize);
                    let connections = find_connecting_polys(
                        &va,
                        &vb,
                        target_tile,
                        target_base,
                        opposite_tile(dir),
                        4,
                    );

                    for (nei_ref, amin, amax) in connections {
                        // Compress the traversable sub-interval of the edge.
                        let (mut tmin, mut tmax) = if dir == 0 || dir == 4 {
                            (
                                (amin - va[2]) / (vb[2] - va[2]),
                                (amax - va[2]) / (vb[2] - va[2]),
                            )
                        } else {
                            (
                                (amin - va[0]) / (vb[0] - va[0]),
                                (amax - va[0]) / (vb[0] - va[0]),
                            )
                        };
                        if tmin > tmax {
                            std::mem::swap(&mut tmin, &mut tmax);
                        }
                        pending.push(PendingLink {
                            poly: i,
                            reference: nei_ref,
                            edge: j as u8,
                            side: dir as u8,
                            bmin: (tmin.clamp(0.0, 1.0) * 255.0).round() as u8,
                            bmax: (tmax.clamp(0.0, 1.0) * 255.0).round() as u8,
                        });
                    }
                }
            }
        }

        let tile = &mut self.tiles[slot];
        for new_link in pending {
            let Some(idx) = tile.alloc_link() else { break };
            tile.links[idx as usize] = Link {
                reference: new_link.reference,
                next: tile.polys[new_link.poly].first_link,
                edge: new_link.edge,
                side: new_link.side,
                bmin: new_link.bmin,
                bmax: new_link.bmax,
            };
            tile.polys[new_link.poly].first_link = Some(idx);
        }
    }

    /// Removes all of `slot`'s links that point into `target`
    fn unconnect_links(&mut self, slot: usize, target: usize) {
        let poly_bits = self.poly_bits;
        let tile_bits = self.tile_bits;
        let tile_mask = (1u64 << tile_bits) - 1;
        let decode_tile = |r: PolyRef| ((r.id() >> poly_bits) & tile_mask) as usize;

        let tile = &mut self.tiles[slot];
        if tile.header.is_none() {
            return;
        }

        for i in 0..tile.polys.len() {
            let mut j = tile.polys[i].first_link;
            let mut prev: Option<u32> = None;
            while let Some(cur) = j {
                let next = tile.links[cur as usize].next;
                if decode_tile(tile.links[cur as usize].reference) == target {
                    match prev {
                        None => tile.polys[i].first_link = next,
                        Some(p) => tile.links[p as usize].next = next,
                    }
                    tile.release_link(cur);
                } else {
                    prev = Some(cur);
                }
                j = next;
            }
        }
    }

    /// Collects polygons of one tile whose bounds overlap the query box.
    ///
    /// Used for anchoring off-mesh connections; the filtered, batched
    /// variant for spatial queries lives on the query object.
    pub(crate) fn polys_in_tile_bounds(
        &self,
        slot: usize,
        qmin: &[f32; 3],
        qmax: &[f32; 3],
        max_polys: usize,
    ) -> Vec<PolyRef> {
        use tilenav_common::{overlap_bounds, overlap_quant_bounds, vmax, vmin};

        let tile = &self.tiles[slot];
        let Some(header) = &tile.header else {
            return Vec::new();
        };
        let base = self.poly_ref_base_slot(slot);
        let mut out = Vec::new();

        if !tile.bv_tree.is_empty() {
            let tbmin = &header.bmin;
            let tbmax = &header.bmax;
            let qfac = header.bv_quant_factor;

            // Clamp the query box into the tile and quantize it, widening
            // to even/odd bounds so the integer test stays conservative.
            let minx = qmin[0].clamp(tbmin[0], tbmax[0]) - tbmin[0];
            let miny = qmin[1].clamp(tbmin[1], tbmax[1]) - tbmin[1];
            let minz = qmin[2].clamp(tbmin[2], tbmax[2]) - tbmin[2];
            let maxx = qmax[0].clamp(tbmin[0], tbmax[0]) - tbmin[0];
            let maxy = qmax[1].clamp(tbmin[1], tbmax[1]) - tbmin[1];
            let maxz = qmax[2].clamp(tbmin[2], tbmax[2]) - tbmin[2];
            let bmin = [
                (qfac * minx) as u16 & 0xfffe,
                (qfac * miny) as u16 & 0xfffe,
                (qfac * minz) as u16 & 0xfffe,
            ];
            let bmax = [
                (qfac * maxx + 1.0) as u16 | 1,
                (qfac * maxy + 1.0) as u16 | 1,
                (qfac * maxz + 1.0) as u16 | 1,
            ];

            let mut i = 0usize;
            while i < tile.bv_tree.len() {
                let node = &tile.bv_tree[i];
                let overlap = overlap_quant_bounds(&bmin, &bmax, &node.bmin, &node.bmax);
                let is_leaf = node.i >= 0;
                if is_leaf && overlap && out.len() < max_polys {
                    out.push(PolyRef::new(base.id() | node.i as u64));
                }
                if overlap || is_leaf {
                    i += 1;
                } else {
                    i += (-node.i) as usize;
                }
            }
        } else {
            for (i, poly) in tile.polys.iter().enumerate() {
                if poly.poly_type == PolyType::OffMeshConnection {
                    continue;
                }
                let mut bmin = tile.vert(poly.verts[0] as usize);
                let mut bmax = bmin;
                for k in 1..poly.vert_count as usize {
                    let v = tile.vert(poly.verts[k] as usize);
                    vmin(&mut bmin, &v);
                    vmax(&mut bmax, &v);
                }
                if overlap_bounds(qmin, qmax, &bmin, &bmax) && out.len() < max_polys {
                    out.push(PolyRef::new(base.id() | i as u64));
                }
            }
        }

        out
    }

    /// Nearest polygon of one tile to a point, scored with the climb rule
    fn find_nearest_poly_in_tile(
        &self,
        slot: usize,
        center: &[f32; 3],
        half_extents: &[f32; 3],
    ) -> Option<(PolyRef, [f32; 3])> {
        let bmin = [
            center[0] - half_extents[0],
            center[1] - half_extents[1],
            center[2] - half_extents[2],
        ];
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];
        let climb = self.tiles[slot].header.as_ref()?.walkable_climb;

        let mut nearest: Option<(PolyRef, [f32; 3])> = None;
        let mut nearest_dist_sqr = f32::MAX;
        for reference in self.polys_in_tile_bounds(slot, &bmin, &bmax, 128) {
            let Ok((closest, over_poly)) = self.closest_point_on_poly(reference, center) else {
                continue;
            };
            let d = if over_poly {
                let dy = (center[1] - closest[1]).abs() - climb;
                if dy > 0.0 {
                    dy * dy
                } else {
                    0.0
                }
            } else {
                vdist_sqr(center, &closest)
            };
            if d < nearest_dist_sqr {
                nearest_dist_sqr = d;
                nearest = Some((reference, closest));
            }
        }
        nearest
    }

    /// Closest point on a polygon's surface to a position.
    ///
    /// Returns the point and whether the position is over the polygon on
    /// the XZ plane; when over, the point is the position projected onto
    /// the surface height.
    pub fn closest_point_on_poly(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<([f32; 3], bool), Status> {
        if !self.is_valid_poly_ref(reference) || !visfinite(pos) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        let (_, it, ip) = self.decode_poly_id(reference);
        let tile = &self.tiles[it];
        let poly = &tile.polys[ip];

        let mut closest = *pos;
        if let Some(h) = poly_height_in_tile(tile, ip, pos) {
            closest[1] = h;
            return Ok((closest, true));
        }

        if poly.poly_type == PolyType::OffMeshConnection {
            let v0 = tile.vert(poly.verts[0] as usize);
            let v1 = tile.vert(poly.verts[1] as usize);
            let d0 = tilenav_common::vdist(pos, &v0);
            let d1 = tilenav_common::vdist(pos, &v1);
            let u = d0 / (d0 + d1);
            return Ok((vlerp(&v0, &v1, u), false));
        }

        Ok((closest_point_on_poly_boundary_in_tile(tile, poly, pos), false))
    }

    /// Surface height of a polygon at a position over it
    pub fn get_poly_height(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<f32, Status> {
        if !self.is_valid_poly_ref(reference) || !tilenav_common::visfinite_2d(pos) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        let (_, it, ip) = self.decode_poly_id(reference);
        poly_height_in_tile(&self.tiles[it], ip, pos)
            .ok_or(Status::failure_detail(Status::INVALID_PARAM))
    }

    /// Oriented endpoints of an off-mesh connection polygon.
    ///
    /// `prev_ref` selects the travel direction: the start point is the
    /// endpoint reached from that polygon.
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> Result<([f32; 3], [f32; 3]), Status> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(poly_ref)?;
        if poly.poly_type != PolyType::OffMeshConnection {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let mut idx0 = 0usize;
        let mut idx1 = 1usize;
        let mut j = poly.first_link;
        while let Some(i) = j {
            let link = &tile.links[i as usize];
            if link.edge == 0 {
                if link.reference != prev_ref {
                    idx0 = 1;
                    idx1 = 0;
                }
                break;
            }
            j = link.next;
        }

        Ok((
            tile.vert(poly.verts[idx0] as usize),
            tile.vert(poly.verts[idx1] as usize),
        ))
    }
}

/// Finds polygons of `target` whose matching border edge overlaps the
/// slab spanned by `va -> vb`. Returns refs and the overlap interval.
fn find_connecting_polys(
    va: &[f32; 3],
    vb: &[f32; 3],
    target: &MeshTile,
    target_base: PolyRef,
    side: i32,
    max_connections: usize,
) -> Vec<(PolyRef, f32, f32)> {
    let Some(header) = &target.header else {
        return Vec::new();
    };

    let (amin, amax) = calc_slab_end_points(va, vb, side);
    let apos = get_slab_coord(va, side);
    let m = EXT_LINK | side as u16;
    let mut out = Vec::new();

    for (i, poly) in target.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            if poly.neighbors[j] != m {
                continue;
            }
            let vc = target.vert(poly.verts[j] as usize);
            let vd = target.vert(poly.verts[(j + 1) % nv] as usize);
            let bpos = get_slab_coord(&vc, side);

            // Segments are not close enough.
            if (apos - bpos).abs() > 0.01 {
                continue;
            }

            let (bmin, bmax) = calc_slab_end_points(&vc, &vd, side);
            if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, header.walkable_climb) {
                continue;
            }

            if out.len() < max_connections {
                out.push((
                    PolyRef::new(target_base.id() | i as u64),
                    amin[0].max(bmin[0]),
                    amax[0].min(bmax[0]),
                ));
            }
            break;
        }
    }

    out
}

/// Surface height of polygon `ip` of a tile at `pos`, when `pos` is over
/// the polygon on the XZ plane
pub(crate) fn poly_height_in_tile(tile: &MeshTile, ip: usize, pos: &[f32; 3]) -> Option<f32> {
    let poly = &tile.polys[ip];
    // Heights over off-mesh connections are meaningless.
    if poly.poly_type == PolyType::OffMeshConnection {
        return None;
    }

    let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
    let nv = poly.vert_count as usize;
    for i in 0..nv {
        let v = tile.vert(poly.verts[i] as usize);
        verts[i * 3..i * 3 + 3].copy_from_slice(&v);
    }

    if !tilenav_common::point_in_polygon(pos, &verts, nv) {
        return None;
    }

    // Prefer the detail mesh when the tile carries one.
    if let Some(pd) = tile.detail_meshes.get(ip) {
        if pd.tri_count > 0 {
            for j in 0..pd.tri_count as usize {
                let t = (pd.tri_base as usize + j) * 4;
                let a = tile.detail_tri_vert(poly, pd, tile.detail_tris[t]);
                let b = tile.detail_tri_vert(poly, pd, tile.detail_tris[t + 1]);
                let c = tile.detail_tri_vert(poly, pd, tile.detail_tris[t + 2]);
                if let Some(h) = tilenav_common::closest_height_point_triangle(pos, &a, &b, &c) {
                    return Some(h);
                }
            }
            return Some(nearest_edge_height(&verts, nv, pos));
        }
    }

    // No detail mesh; fan the polygon itself.
    let a: [f32; 3] = verts[0..3].try_into().unwrap();
    for j in 2..nv {
        let b: [f32; 3] = verts[(j - 1) * 3..(j - 1) * 3 + 3].try_into().unwrap();
        let c: [f32; 3] = verts[j * 3..j * 3 + 3].try_into().unwrap();
        if let Some(h) = tilenav_common::closest_height_point_triangle(pos, &a, &b, &c) {
            return Some(h);
        }
    }

    Some(nearest_edge_height(&verts, nv, pos))
}

/// Height on the polygon edge nearest to `pos`; numeric backstop for
/// points that fall between triangle tolerances
fn nearest_edge_height(verts: &[f32], nv: usize, pos: &[f32; 3]) -> f32 {
    use tilenav_common::dist_pt_seg_sqr_2d;

    let mut dmin = f32::MAX;
    let mut height = verts[1];
    let mut j = nv - 1;
    for i in 0..nv {
        let vj: &[f32; 3] = verts[j * 3..j * 3 + 3].try_into().unwrap();
        let vi: &[f32; 3] = verts[i * 3..i * 3 + 3].try_into().unwrap();
        let (d, t) = dist_pt_seg_sqr_2d(pos, vj, vi);
        if d < dmin {
            dmin = d;
            height = vj[1] + (vi[1] - vj[1]) * t;
        }
        j = i;
    }
    height
}

/// Closest point on the polygon's boundary, ignoring the detail mesh
pub(crate) fn closest_point_on_poly_boundary_in_tile(
    tile: &MeshTile,
    poly: &Poly,
    pos: &[f32; 3],
) -> [f32; 3] {
    use tilenav_common::dist_pt_poly_edges_sqr;

    let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
    let nv = poly.vert_count as usize;
    for i in 0..nv {
        let v = tile.vert(poly.verts[i] as usize);
        verts[i * 3..i * 3 + 3].copy_from_slice(&v);
    }

    let mut edge_d = [0.0f32; MAX_VERTS_PER_POLY];
    let mut edge_t = [0.0f32; MAX_VERTS_PER_POLY];
    let inside = dist_pt_poly_edges_sqr(pos, &verts[..nv * 3], nv, &mut edge_d, &mut edge_t);

    if inside {
        return *pos;
    }

    let mut imin = 0;
    for i in 1..nv {
        if edge_d[i] < edge_d[imin] {
            imin = i;
        }
    }
    let va: &[f32; 3] = verts[imin * 3..imin * 3 + 3].try_into().unwrap();
    let vb: &[f32; 3] = verts[((imin + 1) % nv) * 3..((imin + 1) % nv) * 3 + 3]
        .try_into()
        .unwrap();
    vlerp(va, vb, edge_t[imin])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NavMeshParams {
        NavMeshParams {
            origin: [0.0, 0.0, 0.0],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 4,
            max_polys_per_tile: 16,
        }
    }

    #[test]
    fn test_ref_encoding_round_trip() {
        let mesh = NavMesh::new(params()).unwrap();
        let r = mesh.encode_poly_id(7, 3, 11);
        assert!(r.is_valid());
        assert_eq!(mesh.decode_poly_id(r), (7, 3, 11));
    }

    #[test]
    fn test_rejects_bad_params() {
        let mut p = params();
        p.tile_width = 0.0;
        assert!(NavMesh::new(p).is_err());

        let mut p = params();
        p.max_tiles = 0;
        assert!(NavMesh::new(p).is_err());

        let mut p = params();
        p.origin[1] = f32::NAN;
        assert!(NavMesh::new(p).is_err());
    }

    #[test]
    fn test_calc_tile_loc() {
        let mesh = NavMesh::new(params()).unwrap();
        assert_eq!(mesh.calc_tile_loc(&[5.0, 0.0, 5.0]), (0, 0));
        assert_eq!(mesh.calc_tile_loc(&[15.0, 0.0, -5.0]), (1, -1));
        assert_eq!(mesh.calc_tile_loc(&[-0.1, 0.0, 25.0]), (-1, 2));
    }

    #[test]
    fn test_opposite_tile() {
        assert_eq!(opposite_tile(0), 4);
        assert_eq!(opposite_tile(4), 0);
        assert_eq!(opposite_tile(2), 6);
        assert_eq!(opposite_tile(7), 3);
    }

    #[test]
    fn test_invalid_refs_rejected() {
        let mesh = NavMesh::new(params()).unwrap();
        assert!(!mesh.is_valid_poly_ref(PolyRef::NONE));
        // No tile resident at slot 0.
        assert!(!mesh.is_valid_poly_ref(mesh.encode_poly_id(1, 0, 0)));
        // Out-of-range tile index.
        assert!(!mesh.is_valid_poly_ref(mesh.encode_poly_id(1, 99, 0)));
    }
}
