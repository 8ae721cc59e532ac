//! Query engine over a navigation mesh
//!
//! A [`NavMeshQuery`] borrows a read-only [`NavMesh`] and owns the
//! scratch state of one search at a time: the node pool, a tiny pool for
//! local walks, and the open list. Multiple queries may run concurrently
//! over the same mesh, one per query object.

use bitflags::bitflags;

use tilenav_common::{
    dist_pt_seg_sqr_2d, intersect_seg_seg_2d, intersect_segment_poly_2d, point_in_polygon,
    tri_area_2d, vdist, vequal, visfinite, vlerp, vmad, vnormalize, vsub,
};

use crate::nav_mesh::closest_point_on_poly_boundary_in_tile;
use crate::node_pool::{NodeFlags, NodeIndex, NodePool, NodeQueue};
use crate::poly_query::{CollectPolysQuery, FindNearestPolyQuery, PolyQuery};
use crate::tile::{MeshTile, Poly, PolyType};
use crate::{NavMesh, PolyRef, QueryFilter, Status, INTERNAL_LINK_SIDE, MAX_VERTS_PER_POLY};

/// Search heuristic scale: a slight under-estimate keeps A* admissible
/// when area costs sit at 1.0.
pub const H_SCALE: f32 = 0.999;

/// Capacity of the pool backing local surface walks
const TINY_NODE_POOL_SIZE: usize = 64;

/// Breadth-first queue bound for local surface walks
const MAX_LOCAL_STACK: usize = 48;

bitflags! {
    /// Tags on straight-path turn points
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StraightPathFlags: u8 {
        /// The first point of the path
        const START = 0x01;
        /// The last point of the path
        const END = 0x02;
        /// Start of an off-mesh connection jump
        const OFFMESH_CONNECTION = 0x04;
    }
}

bitflags! {
    /// Options for [`NavMeshQuery::find_straight_path`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StraightPathOptions: u32 {
        /// Also emit a vertex wherever the path crosses a portal between
        /// different area ids
        const AREA_CROSSINGS = 0x01;
        /// Also emit a vertex at every portal crossing
        const ALL_CROSSINGS = 0x02;
    }
}

bitflags! {
    /// Options for [`NavMeshQuery::raycast`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RaycastOptions: u32 {
        /// Accumulate the filter's traversal cost along the ray
        const USE_COSTS = 0x01;
    }
}

/// One turn point of a straight path
#[derive(Debug, Clone, Copy)]
pub struct StraightPathPoint {
    /// Position of the point
    pub pos: [f32; 3],
    /// Point tags
    pub flags: StraightPathFlags,
    /// Polygon being entered at this point; NONE at the end point
    pub poly: PolyRef,
}

/// Result of [`NavMeshQuery::find_straight_path`]
#[derive(Debug, Clone)]
pub struct StraightPath {
    pub points: Vec<StraightPathPoint>,
    /// Success status; may carry `PARTIAL_RESULT` or `BUFFER_TOO_SMALL`
    pub status: Status,
}

/// Result of [`NavMeshQuery::find_path`]: a polygon corridor
#[derive(Debug, Clone)]
pub struct PolyPath {
    /// Connected polygon references from the start polygon toward the end
    pub polys: Vec<PolyRef>,
    /// Success status; may carry `PARTIAL_RESULT`, `OUT_OF_NODES` or
    /// `BUFFER_TOO_SMALL`
    pub status: Status,
}

/// Result of [`NavMeshQuery::raycast`]
#[derive(Debug, Clone)]
pub struct RaycastHit {
    /// Hit parameter along the segment; `f32::MAX` when the end was
    /// reached without hitting a wall
    pub t: f32,
    /// Outward normal of the wall segment that was hit
    pub hit_normal: [f32; 3],
    /// Edge index on the final polygon where the wall was hit
    pub hit_edge_index: i32,
    /// Polygons visited along the ray
    pub path: Vec<PolyRef>,
    /// Accumulated traversal cost, when requested
    pub path_cost: f32,
    /// Success status; may carry `BUFFER_TOO_SMALL`
    pub status: Status,
}

impl RaycastHit {
    /// True when the ray stopped at a wall before the end position
    pub fn hit_wall(&self) -> bool {
        self.t < f32::MAX
    }
}

/// Result of [`NavMeshQuery::move_along_surface`]
#[derive(Debug, Clone)]
pub struct MoveAlongSurfaceResult {
    /// Final position, clamped to the walkable surface
    pub result_pos: [f32; 3],
    /// Polygons touched during the move, start first
    pub visited: Vec<PolyRef>,
    /// Success status; may carry `BUFFER_TOO_SMALL`
    pub status: Status,
}

/// Pathfinding and spatial query object over a navigation mesh
pub struct NavMeshQuery<'a> {
    nav: &'a NavMesh,
    node_pool: NodePool,
    tiny_node_pool: NodePool,
    open_list: NodeQueue,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query object with the given search node capacity
    pub fn new(nav: &'a NavMesh, max_nodes: usize) -> Result<Self, Status> {
        if max_nodes == 0 || max_nodes >= NodeIndex::MAX as usize {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        Ok(Self {
            nav,
            node_pool: NodePool::new(max_nodes, Self::hash_size_for(max_nodes)),
            tiny_node_pool: NodePool::new(TINY_NODE_POOL_SIZE, 32),
            open_list: NodeQueue::new(max_nodes),
        })
    }

    /// Re-initializes the query for a new node capacity.
    ///
    /// Grows the pool and open list when the capacity increases, otherwise
    /// clears and reuses the existing memory. Safe between queries.
    pub fn init(&mut self, max_nodes: usize) -> Result<(), Status> {
        if max_nodes == 0 || max_nodes >= NodeIndex::MAX as usize {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        if self.node_pool.max_nodes() < max_nodes {
            self.node_pool = NodePool::new(max_nodes, Self::hash_size_for(max_nodes));
        } else {
            self.node_pool.clear();
        }
        self.tiny_node_pool.clear();
        if self.open_list.capacity() < max_nodes {
            self.open_list = NodeQueue::new(max_nodes);
        } else {
            self.open_list.clear();
        }
        Ok(())
    }

    fn hash_size_for(max_nodes: usize) -> usize {
        (max_nodes / 4).max(1).next_power_of_two()
    }

    /// The navigation mesh this query reads from
    pub fn nav_mesh(&self) -> &NavMesh {
        self.nav
    }

    /// True when the reference is live and passes the filter
    pub fn is_valid_poly_ref(&self, reference: PolyRef, filter: &QueryFilter) -> bool {
        match self.nav.get_tile_and_poly_by_ref(reference) {
            Ok((tile, poly)) => filter.pass_filter(reference, tile, poly),
            Err(_) => false,
        }
    }

    /// Closest point on a polygon, using its detail surface.
    ///
    /// Also reports whether the position lies over the polygon on the XZ
    /// plane; for an interior point the result equals the input with the
    /// height projected onto the surface.
    pub fn closest_point_on_poly(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<([f32; 3], bool), Status> {
        self.nav.closest_point_on_poly(reference, pos)
    }

    /// Closest point on a polygon's boundary, ignoring the detail mesh.
    ///
    /// Much faster than [`Self::closest_point_on_poly`]; a position inside
    /// the polygon's XZ bounds is returned unchanged.
    pub fn closest_point_on_poly_boundary(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<[f32; 3], Status> {
        let (tile, poly) = self.nav.get_tile_and_poly_by_ref(reference)?;
        if !visfinite(pos) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        Ok(closest_point_on_poly_boundary_in_tile(tile, poly, pos))
    }

    /// Surface height at a position over a polygon.
    ///
    /// For an off-mesh connection the height is interpolated along the
    /// connection segment.
    pub fn get_poly_height(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<f32, Status> {
        let (tile, poly) = self.nav.get_tile_and_poly_by_ref(reference)?;
        if !tilenav_common::visfinite_2d(pos) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        if poly.poly_type == PolyType::OffMeshConnection {
            let v0 = tile.vert(poly.verts[0] as usize);
            let v1 = tile.vert(poly.verts[1] as usize);
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v0, &v1);
            return Ok(v0[1] + (v1[1] - v0[1]) * t);
        }
        self.nav.get_poly_height(reference, pos)
    }

    /// Finds the polygon nearest to a point within a search box.
    ///
    /// Returns the polygon, the closest point on it, and whether the
    /// center is over the polygon. The reference is `NONE` when the box
    /// touches no acceptable polygon; that is still a success.
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<(PolyRef, [f32; 3], bool), Status> {
        let mut query = FindNearestPolyQuery::new(self.nav, center);
        self.query_polygons(center, half_extents, filter, &mut query)?;

        let nearest = query.nearest_ref();
        if nearest.is_valid() {
            Ok((nearest, query.nearest_point(), query.is_over_poly()))
        } else {
            Ok((PolyRef::NONE, *center, false))
        }
    }

    /// Collects polygons overlapping a search box, up to `max_polys`.
    ///
    /// The returned status carries `BUFFER_TOO_SMALL` when more polygons
    /// overlapped than fit.
    pub fn query_polygons_collect(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
        max_polys: usize,
    ) -> Result<(Vec<PolyRef>, Status), Status> {
        let mut collector = CollectPolysQuery::new(max_polys);
        self.query_polygons(center, half_extents, filter, &mut collector)?;
        let status = if collector.overflowed() {
            Status::success_detail(Status::BUFFER_TOO_SMALL)
        } else {
            Status::success()
        };
        Ok((collector.into_polys(), status))
    }

    /// Visits all polygons overlapping a search box in batches
    pub fn query_polygons(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
        query: &mut dyn PolyQuery,
    ) -> Result<(), Status> {
        if !visfinite(center) || !visfinite(half_extents) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let bmin = vsub(center, half_extents);
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let (minx, miny) = self.nav.calc_tile_loc(&bmin);
        let (maxx, maxy) = self.nav.calc_tile_loc(&bmax);

        for y in miny..=maxy {
            for x in minx..=maxx {
                for &slot in self.nav.tile_slots_at(x, y) {
                    self.query_polygons_in_tile(slot, &bmin, &bmax, filter, query);
                }
            }
        }

        Ok(())
    }

    /// Visits one tile's polygons overlapping the query box, batching 32
    /// polygons per visitor call
    fn query_polygons_in_tile(
        &self,
        slot: usize,
        qmin: &[f32; 3],
        qmax: &[f32; 3],
        filter: &QueryFilter,
        query: &mut dyn PolyQuery,
    ) {
        use tilenav_common::{overlap_bounds, overlap_quant_bounds, vmax, vmin};

        const BATCH_SIZE: usize = 32;
        let tile = self.nav.tile_at_slot(slot);
        let Some(header) = &tile.header else { return };
        let base = self.nav.base_ref_at_slot(slot);

        let mut batch_refs: Vec<PolyRef> = Vec::with_capacity(BATCH_SIZE);
        let mut batch_polys: Vec<&Poly> = Vec::with_capacity(BATCH_SIZE);

        if !tile.bv_tree.is_empty() {
            let tbmin = &header.bmin;
            let tbmax = &header.bmax;
            let qfac = header.bv_quant_factor;

            // Clamp the query box into the tile's local space and
            // quantize, snapping the minimum down to even and the maximum
            // up to odd so the integer overlap stays conservative.
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

                if is_leaf && overlap {
                    let reference = PolyRef::new(base.id() | node.i as u64);
                    let poly = &tile.polys[node.i as usize];
                    if filter.pass_filter(reference, tile, poly) {
                        batch_refs.push(reference);
                        batch_polys.push(poly);
                        if batch_refs.len() == BATCH_SIZE {
                            query.process(tile, &batch_polys, &batch_refs);
                            batch_refs.clear();
                            batch_polys.clear();
                        }
                    }
                }

                if overlap || is_leaf {
                    i += 1;
                } else {
                    i += (-node.i) as usize;
                }
            }
        } else {
            for (i, poly) in tile.polys.iter().enumerate() {
                // Off-mesh connections have no interior to overlap.
                if poly.poly_type == PolyType::OffMeshConnection {
                    continue;
                }
                let reference = PolyRef::new(base.id() | i as u64);
                if !filter.pass_filter(reference, tile, poly) {
                    continue;
                }
                let mut pbmin = tile.vert(poly.verts[0] as usize);
                let mut pbmax = pbmin;
                for k in 1..poly.vert_count as usize {
                    let v = tile.vert(poly.verts[k] as usize);
                    vmin(&mut pbmin, &v);
                    vmax(&mut pbmax, &v);
                }
                if overlap_bounds(qmin, qmax, &pbmin, &pbmax) {
                    batch_refs.push(reference);
                    batch_polys.push(poly);
                    if batch_refs.len() == BATCH_SIZE {
                        query.process(tile, &batch_polys, &batch_refs);
                        batch_refs.clear();
                        batch_polys.clear();
                    }
                }
            }
        }

        if !batch_refs.is_empty() {
            query.process(tile, &batch_polys, &batch_refs);
        }
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref` with A*.
    ///
    /// When the goal cannot be reached the corridor leads to the polygon
    /// closest to it and the status carries `PARTIAL_RESULT`; an
    /// exhausted node pool adds `OUT_OF_NODES`. A corridor longer than
    /// `max_path` is truncated at the end nearest the start with
    /// `BUFFER_TOO_SMALL`.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_path: usize,
    ) -> Result<PolyPath, Status> {
        let nav = self.nav;

        if !nav.is_valid_poly_ref(start_ref)
            || !nav.is_valid_poly_ref(end_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
            || max_path == 0
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        if start_ref == end_ref {
            return Ok(PolyPath {
                polys: vec![start_ref],
                status: Status::success(),
            });
        }

        self.node_pool.clear();
        self.open_list.clear();

        let start_idx = self
            .node_pool
            .get_node(start_ref, 0)
            .expect("cleared pool has room for the start node");
        {
            let node = self.node_pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.pidx = 0;
            node.cost = 0.0;
            node.total = vdist(start_pos, end_pos) * H_SCALE;
            node.id = start_ref;
            node.flags = NodeFlags::default();
            node.flags.insert(NodeFlags::OPEN);
        }
        self.open_list.push(&mut self.node_pool, start_idx);

        let mut last_best = start_idx;
        let mut last_best_cost = self.node_pool.node(start_idx).total;
        let mut out_of_nodes = false;

        while let Some(best_idx) = self.open_list.pop(&mut self.node_pool) {
            // Move the node from the open to the closed list.
            let (best_ref, best_pos, best_g, best_pidx) = {
                let node = self.node_pool.node_mut(best_idx);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                (node.id, node.pos, node.cost, node.pidx)
            };

            // Reached the goal, stop searching.
            if best_ref == end_ref {
                last_best = best_idx;
                break;
            }

            let (best_tile, best_poly) = nav.get_tile_and_poly_by_ref_unchecked(best_ref);

            let parent_ref = if best_pidx != 0 {
                self.node_pool.node(best_pidx).id
            } else {
                PolyRef::NONE
            };
            let parent = if parent_ref.is_valid() {
                Some(nav.get_tile_and_poly_by_ref_unchecked(parent_ref))
            } else {
                None
            };

            let mut link_idx = best_poly.first_link;
            while let Some(li) = link_idx {
                let link = &best_tile.links[li as usize];
                link_idx = link.next;
                let neighbour_ref = link.reference;

                // Skip dead links; never expand straight back to the parent.
                if !neighbour_ref.is_valid() || neighbour_ref == parent_ref {
                    continue;
                }

                let (neighbour_tile, neighbour_poly) =
                    nav.get_tile_and_poly_by_ref_unchecked(neighbour_ref);
                if !filter.pass_filter(neighbour_ref, neighbour_tile, neighbour_poly) {
                    continue;
                }

                // Crossing a tile boundary keys the node by the side, so
                // the same polygon reached over different boundaries stays
                // a distinct search state.
                let cross_side = if link.side != INTERNAL_LINK_SIDE {
                    link.side >> 1
                } else {
                    0
                };

                let Some(neighbour_idx) = self.node_pool.get_node(neighbour_ref, cross_side)
                else {
                    out_of_nodes = true;
                    continue;
                };

                // First visit: place the node at the portal midpoint.
                if self.node_pool.node(neighbour_idx).flags.is_empty() {
                    if let Ok((left, right)) = portal_points(
                        best_ref,
                        best_poly,
                        best_tile,
                        neighbour_ref,
                        neighbour_poly,
                        neighbour_tile,
                    ) {
                        self.node_pool.node_mut(neighbour_idx).pos = vlerp(&left, &right, 0.5);
                    }
                }

                let neighbour_pos = self.node_pool.node(neighbour_idx).pos;

                let (cost, heuristic) = if neighbour_ref == end_ref {
                    let cur_cost = filter.get_cost(
                        &best_pos,
                        &neighbour_pos,
                        parent,
                        (best_tile, best_poly),
                        Some((neighbour_tile, neighbour_poly)),
                    );
                    let end_cost = filter.get_cost(
                        &neighbour_pos,
                        end_pos,
                        Some((best_tile, best_poly)),
                        (neighbour_tile, neighbour_poly),
                        None,
                    );
                    (best_g + cur_cost + end_cost, 0.0)
                } else {
                    let cur_cost = filter.get_cost(
                        &best_pos,
                        &neighbour_pos,
                        parent,
                        (best_tile, best_poly),
                        Some((neighbour_tile, neighbour_poly)),
                    );
                    (
                        best_g + cur_cost,
                        vdist(&neighbour_pos, end_pos) * H_SCALE,
                    )
                };

                let total = cost + heuristic;

                let node = self.node_pool.node_mut(neighbour_idx);
                // Skip when an open or already expanded node is not improved.
                if node.flags.contains(NodeFlags::OPEN) && total >= node.total {
                    continue;
                }
                if node.flags.contains(NodeFlags::CLOSED) && total >= node.total {
                    continue;
                }

                node.pidx = best_idx;
                node.id = neighbour_ref;
                node.flags.remove(NodeFlags::CLOSED);
                node.cost = cost;
                node.total = total;

                if node.flags.contains(NodeFlags::OPEN) {
                    self.open_list.modify(&mut self.node_pool, neighbour_idx);
                } else {
                    self.node_pool
                        .node_mut(neighbour_idx)
                        .flags
                        .insert(NodeFlags::OPEN);
                    self.open_list.push(&mut self.node_pool, neighbour_idx);
                }

                // Track the best goal approximation seen so far.
                if heuristic < last_best_cost {
                    last_best_cost = heuristic;
                    last_best = neighbour_idx;
                }
            }
        }

        let (polys, mut status) = self.get_path_to_node(last_best, max_path);

        if self.node_pool.node(last_best).id != end_ref {
            status |= Status::PARTIAL_RESULT;
        }
        if out_of_nodes {
            status |= Status::OUT_OF_NODES;
        }

        Ok(PolyPath { polys, status })
    }

    /// Extracts the corridor ending at `end_idx`, truncated to `max_path`
    /// keeping the section nearest the start
    fn get_path_to_node(&self, end_idx: NodeIndex, max_path: usize) -> (Vec<PolyRef>, Status) {
        let mut length = 0usize;
        let mut cur = end_idx;
        loop {
            length += 1;
            cur = self.node_pool.node(cur).pidx;
            if cur == 0 {
                break;
            }
        }

        // Drop nodes from the goal end until the rest fits.
        let mut cur = end_idx;
        let mut write_count = length;
        while write_count > max_path {
            cur = self.node_pool.node(cur).pidx;
            write_count -= 1;
        }

        let mut polys = vec![PolyRef::NONE; write_count];
        for i in (0..write_count).rev() {
            polys[i] = self.node_pool.node(cur).id;
            cur = self.node_pool.node(cur).pidx;
        }
        debug_assert_eq!(cur, 0);

        let status = if length > max_path {
            Status::success_detail(Status::BUFFER_TOO_SMALL)
        } else {
            Status::success()
        };
        (polys, status)
    }

    /// Portal endpoints between two connected polygons, with their types
    pub fn get_portal_points(
        &self,
        from: PolyRef,
        to: PolyRef,
    ) -> Result<([f32; 3], [f32; 3], PolyType, PolyType), Status> {
        let (from_tile, from_poly) = self.nav.get_tile_and_poly_by_ref(from)?;
        let (to_tile, to_poly) = self.nav.get_tile_and_poly_by_ref(to)?;
        let (left, right) = portal_points(from, from_poly, from_tile, to, to_poly, to_tile)?;
        Ok((left, right, from_poly.poly_type, to_poly.poly_type))
    }

    /// Midpoint of the portal between two connected polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3], Status> {
        let (left, right, _, _) = self.get_portal_points(from, to)?;
        Ok(vlerp(&left, &right, 0.5))
    }

    /// Appends a point, coalescing an exact repeat of the previous one
    fn append_vertex(
        &self,
        pos: &[f32; 3],
        flags: StraightPathFlags,
        reference: PolyRef,
        points: &mut Vec<StraightPathPoint>,
        max_points: usize,
    ) -> Status {
        if let Some(last) = points.last_mut() {
            if vequal(&last.pos, pos) {
                // The vertices are equal; update flags and poly.
                last.flags = flags;
                last.poly = reference;
                return Status::in_progress();
            }
        }

        points.push(StraightPathPoint {
            pos: *pos,
            flags,
            poly: reference,
        });

        if points.len() >= max_points {
            return Status::success_detail(Status::BUFFER_TOO_SMALL);
        }
        if flags == StraightPathFlags::END {
            return Status::success();
        }
        Status::in_progress()
    }

    /// Appends portal crossings between two funnel apexes
    #[allow(clippy::too_many_arguments)]
    fn append_portals(
        &self,
        start_idx: usize,
        end_idx: usize,
        end_pos: &[f32; 3],
        path: &[PolyRef],
        points: &mut Vec<StraightPathPoint>,
        max_points: usize,
        options: StraightPathOptions,
    ) -> Status {
        let start_pos = match points.last() {
            Some(p) => p.pos,
            None => return Status::failure_detail(Status::INVALID_PARAM),
        };

        for i in start_idx..end_idx {
            let from = path[i];
            let Ok((from_tile, from_poly)) = self.nav.get_tile_and_poly_by_ref(from) else {
                return Status::failure_detail(Status::INVALID_PARAM);
            };
            let to = path[i + 1];
            let Ok((to_tile, to_poly)) = self.nav.get_tile_and_poly_by_ref(to) else {
                return Status::failure_detail(Status::INVALID_PARAM);
            };

            let Ok((left, right)) = portal_points(from, from_poly, from_tile, to, to_poly, to_tile)
            else {
                break;
            };

            // With only area crossings requested, same-area portals are
            // not emitted.
            if options.contains(StraightPathOptions::AREA_CROSSINGS)
                && from_poly.area == to_poly.area
            {
                continue;
            }

            if let Some((_, t)) = intersect_seg_seg_2d(&start_pos, end_pos, &left, &right) {
                let pt = vlerp(&left, &right, t);
                let status = self.append_vertex(
                    &pt,
                    StraightPathFlags::empty(),
                    path[i + 1],
                    points,
                    max_points,
                );
                if !status.is_in_progress() {
                    return status;
                }
            }
        }
        Status::in_progress()
    }

    /// Pulls a polygon corridor into a straight path of turn points.
    ///
    /// The start and end positions are clamped to the first and last
    /// corridor polygons. Intermediate turn points carry the reference of
    /// the polygon being entered; the end point carries `NONE`.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
        options: StraightPathOptions,
    ) -> Result<StraightPath, Status> {
        if !visfinite(start_pos)
            || !visfinite(end_pos)
            || path.is_empty()
            || !path[0].is_valid()
            || max_points == 0
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let mut points: Vec<StraightPathPoint> = Vec::new();

        let closest_start = self.closest_point_on_poly_boundary(path[0], start_pos)?;
        let mut closest_end = self.closest_point_on_poly_boundary(path[path.len() - 1], end_pos)?;

        // Add the start point.
        let stat = self.append_vertex(
            &closest_start,
            StraightPathFlags::START,
            path[0],
            &mut points,
            max_points,
        );
        if !stat.is_in_progress() {
            return Ok(StraightPath { points, status: stat });
        }

        if path.len() > 1 {
            let mut portal_apex = closest_start;
            let mut portal_left = portal_apex;
            let mut portal_right = portal_apex;
            let mut apex_index = 0usize;
            let mut left_index = 0usize;
            let mut right_index = 0usize;

            let mut left_poly_type = PolyType::Ground;
            let mut right_poly_type = PolyType::Ground;

            let mut left_poly_ref = path[0];
            let mut right_poly_ref = path[0];

            let path_size = path.len();
            let mut i = 0usize;
            while i < path_size {
                let (left, right, to_type) = if i + 1 < path_size {
                    let (l, r, _, t) = match self.get_portal_points(path[i], path[i + 1]) {
                        Ok(portal) => portal,
                        Err(_) => {
                            // path[i+1] is invalid: clamp the end to the
                            // last good polygon and return what we have.
                            closest_end = self
                                .closest_point_on_poly_boundary(path[i], end_pos)
                                .map_err(|_| Status::failure_detail(Status::INVALID_PARAM))?;

                            if options.intersects(
                                StraightPathOptions::AREA_CROSSINGS
                                    | StraightPathOptions::ALL_CROSSINGS,
                            ) {
                                // Result ignored: returning right after.
                                self.append_portals(
                                    apex_index,
                                    i,
                                    &closest_end,
                                    path,
                                    &mut points,
                                    max_points,
                                    options,
                                );
                            }

                            self.append_vertex(
                                &closest_end,
                                StraightPathFlags::empty(),
                                path[i],
                                &mut points,
                                max_points,
                            );

                            let mut status = Status::success_detail(Status::PARTIAL_RESULT);
                            if points.len() >= max_points {
                                status |= Status::BUFFER_TOO_SMALL;
                            }
                            return Ok(StraightPath { points, status });
                        }
                    };

                    // If starting really close to the portal, advance.
                    if i == 0 {
                        let (d, _) = dist_pt_seg_sqr_2d(&portal_apex, &l, &r);
                        if d < 0.001 * 0.001 {
                            i += 1;
                            continue;
                        }
                    }
                    (l, r, t)
                } else {
                    // End of the path.
                    (closest_end, closest_end, PolyType::Ground)
                };

                // Right vertex.
                if tri_area_2d(&portal_apex, &portal_right, &right) <= 0.0 {
                    if vequal(&portal_apex, &portal_right)
                        || tri_area_2d(&portal_apex, &portal_left, &right) > 0.0
                    {
                        portal_right = right;
                        right_poly_ref = if i + 1 < path_size {
                            path[i + 1]
                        } else {
                            PolyRef::NONE
                        };
                        right_poly_type = to_type;
                        right_index = i;
                    } else {
                        // The right side crossed the left: the left vertex
                        // becomes a turn point and the funnel restarts.
                        if options.intersects(
                            StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS,
                        ) {
                            let stat = self.append_portals(
                                apex_index,
                                left_index,
                                &portal_left,
                                path,
                                &mut points,
                                max_points,
                                options,
                            );
                            if !stat.is_in_progress() {
                                return Ok(StraightPath { points, status: stat });
                            }
                        }

                        portal_apex = portal_left;
                        apex_index = left_index;

                        let flags = if !left_poly_ref.is_valid() {
                            StraightPathFlags::END
                        } else if left_poly_type == PolyType::OffMeshConnection {
                            StraightPathFlags::OFFMESH_CONNECTION
                        } else {
                            StraightPathFlags::empty()
                        };

                        let stat = self.append_vertex(
                            &portal_apex,
                            flags,
                            left_poly_ref,
                            &mut points,
                            max_points,
                        );
                        if !stat.is_in_progress() {
                            return Ok(StraightPath { points, status: stat });
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        // Restart the scan from the new apex.
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex.
                if tri_area_2d(&portal_apex, &portal_left, &left) >= 0.0 {
                    if vequal(&portal_apex, &portal_left)
                        || tri_area_2d(&portal_apex, &portal_right, &left) < 0.0
                    {
                        portal_left = left;
                        left_poly_ref = if i + 1 < path_size {
                            path[i + 1]
                        } else {
                            PolyRef::NONE
                        };
                        left_poly_type = to_type;
                        left_index = i;
                    } else {
                        if options.intersects(
                            StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS,
                        ) {
                            let stat = self.append_portals(
                                apex_index,
                                right_index,
                                &portal_right,
                                path,
                                &mut points,
                                max_points,
                                options,
                            );
                            if !stat.is_in_progress() {
                                return Ok(StraightPath { points, status: stat });
                            }
                        }

                        portal_apex = portal_right;
                        apex_index = right_index;

                        let flags = if !right_poly_ref.is_valid() {
                            StraightPathFlags::END
                        } else if right_poly_type == PolyType::OffMeshConnection {
                            StraightPathFlags::OFFMESH_CONNECTION
                        } else {
                            StraightPathFlags::empty()
                        };

                        let stat = self.append_vertex(
                            &portal_apex,
                            flags,
                            right_poly_ref,
                            &mut points,
                            max_points,
                        );
                        if !stat.is_in_progress() {
                            return Ok(StraightPath { points, status: stat });
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }

            // Portals along the final straight segment.
            if options
                .intersects(StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS)
            {
                let stat = self.append_portals(
                    apex_index,
                    path_size - 1,
                    &closest_end,
                    path,
                    &mut points,
                    max_points,
                    options,
                );
                if !stat.is_in_progress() {
                    return Ok(StraightPath { points, status: stat });
                }
            }
        }

        // Result ignored: the end point always terminates the path.
        self.append_vertex(
            &closest_end,
            StraightPathFlags::END,
            PolyRef::NONE,
            &mut points,
            max_points,
        );

        let mut status = Status::success();
        if points.len() >= max_points {
            status |= Status::BUFFER_TOO_SMALL;
        }
        Ok(StraightPath { points, status })
    }

    /// Casts a 2D ray along the mesh surface, walking polygon to polygon
    /// through portal edges.
    ///
    /// Reaching the end position is a success with `t == f32::MAX`;
    /// hitting a wall is a success with `t` in `[0, 1]` and the wall's
    /// outward normal. `prev_ref` seeds the cost context when the ray
    /// continues an earlier movement.
    pub fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        options: RaycastOptions,
        prev_ref: Option<PolyRef>,
        max_path: usize,
    ) -> Result<RaycastHit, Status> {
        let nav = self.nav;

        if !nav.is_valid_poly_ref(start_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
            || prev_ref.is_some_and(|r| !nav.is_valid_poly_ref(r))
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let mut hit = RaycastHit {
            t: 0.0,
            hit_normal: [0.0; 3],
            hit_edge_index: -1,
            path: Vec::new(),
            path_cost: 0.0,
            status: Status::success(),
        };

        let mut cur_pos = *start_pos;
        let dir = vsub(end_pos, start_pos);

        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3 + 3];

        let mut cur_ref = start_ref;
        let (mut tile, mut poly) = nav.get_tile_and_poly_by_ref_unchecked(cur_ref);
        let (mut prev_tile, mut prev_poly) = (tile, poly);
        if let Some(pr) = prev_ref {
            let (t, p) = nav.get_tile_and_poly_by_ref_unchecked(pr);
            prev_tile = t;
            prev_poly = p;
        }

        while cur_ref.is_valid() {
            // Cast the ray against the current polygon.
            let nv = poly.vert_count as usize;
            for i in 0..nv {
                let v = tile.vert(poly.verts[i] as usize);
                verts[i * 3..i * 3 + 3].copy_from_slice(&v);
            }

            let Some((_, tmax, _, seg_max)) =
                intersect_segment_poly_2d(start_pos, end_pos, &verts[..nv * 3], nv)
            else {
                // Could not hit the polygon, keep the old t and report hit.
                return Ok(hit);
            };

            hit.hit_edge_index = seg_max;

            // Keep track of the furthest t so far.
            if tmax > hit.t {
                hit.t = tmax;
            }

            if hit.path.len() < max_path {
                hit.path.push(cur_ref);
            } else {
                hit.status |= Status::BUFFER_TOO_SMALL;
            }

            // The ray end is inside the polygon.
            if seg_max == -1 {
                hit.t = f32::MAX;
                if options.contains(RaycastOptions::USE_COSTS) {
                    hit.path_cost += filter.get_cost(
                        &cur_pos,
                        end_pos,
                        Some((prev_tile, prev_poly)),
                        (tile, poly),
                        Some((tile, poly)),
                    );
                }
                return Ok(hit);
            }

            // Follow the neighbour on the exit edge.
            let mut next_ref = PolyRef::NONE;
            let mut next_tile = tile;
            let mut next_poly = poly;

            let mut link_idx = poly.first_link;
            while let Some(li) = link_idx {
                let link = &tile.links[li as usize];
                link_idx = link.next;

                // Only links crossing the exit edge qualify.
                if link.edge as i32 != seg_max {
                    continue;
                }

                let (candidate_tile, candidate_poly) =
                    nav.get_tile_and_poly_by_ref_unchecked(link.reference);

                // The ray never traverses off-mesh connections.
                if candidate_poly.poly_type == PolyType::OffMeshConnection {
                    continue;
                }

                if !filter.pass_filter(link.reference, candidate_tile, candidate_poly) {
                    continue;
                }

                // Internal edges span the whole edge.
                if link.side == INTERNAL_LINK_SIDE {
                    next_ref = link.reference;
                    next_tile = candidate_tile;
                    next_poly = candidate_poly;
                    break;
                }

                // So does a boundary link covering the full interval.
                if link.bmin == 0 && link.bmax == 255 {
                    next_ref = link.reference;
                    next_tile = candidate_tile;
                    next_poly = candidate_poly;
                    break;
                }

                // Partial links: check that the crossing point lies within
                // the portal's sub-interval along the boundary axis.
                let v0 = poly.verts[link.edge as usize] as usize;
                let v1 = poly.verts[(link.edge as usize + 1) % nv] as usize;
                let left = tile.vert(v0);
                let right = tile.vert(v1);

                if link.side == 0 || link.side == 4 {
                    let s = 1.0 / 255.0;
                    let mut lmin = left[2] + (right[2] - left[2]) * (link.bmin as f32 * s);
                    let mut lmax = left[2] + (right[2] - left[2]) * (link.bmax as f32 * s);
                    if lmin > lmax {
                        std::mem::swap(&mut lmin, &mut lmax);
                    }
                    let z = start_pos[2] + (end_pos[2] - start_pos[2]) * tmax;
                    if z >= lmin && z <= lmax {
                        next_ref = link.reference;
                        next_tile = candidate_tile;
                        next_poly = candidate_poly;
                        break;
                    }
                } else if link.side == 2 || link.side == 6 {
                    let s = 1.0 / 255.0;
                    let mut lmin = left[0] + (right[0] - left[0]) * (link.bmin as f32 * s);
                    let mut lmax = left[0] + (right[0] - left[0]) * (link.bmax as f32 * s);
                    if lmin > lmax {
                        std::mem::swap(&mut lmin, &mut lmax);
                    }
                    let x = start_pos[0] + (end_pos[0] - start_pos[0]) * tmax;
                    if x >= lmin && x <= lmax {
                        next_ref = link.reference;
                        next_tile = candidate_tile;
                        next_poly = candidate_poly;
                        break;
                    }
                }
            }

            if options.contains(RaycastOptions::USE_COSTS) {
                // Cost the segment walked through this polygon, restoring
                // the height at the exit point from the entering edge.
                let last_pos = cur_pos;
                cur_pos = vmad(start_pos, &dir, hit.t);
                let e1: [f32; 3] = verts[seg_max as usize * 3..seg_max as usize * 3 + 3]
                    .try_into()
                    .unwrap();
                let e2_idx = (seg_max as usize + 1) % nv;
                let e2: [f32; 3] = verts[e2_idx * 3..e2_idx * 3 + 3].try_into().unwrap();
                let e_dir = vsub(&e2, &e1);
                let diff = vsub(&cur_pos, &e1);
                let s = if e_dir[0] * e_dir[0] > e_dir[2] * e_dir[2] {
                    diff[0] / e_dir[0]
                } else {
                    diff[2] / e_dir[2]
                };
                cur_pos[1] = e1[1] + e_dir[1] * s;

                hit.path_cost += filter.get_cost(
                    &last_pos,
                    &cur_pos,
                    Some((prev_tile, prev_poly)),
                    (tile, poly),
                    Some((next_tile, next_poly)),
                );
            }

            if !next_ref.is_valid() {
                // No neighbour: the ray hit a wall. Report its outward
                // normal on the XZ plane.
                let a = seg_max as usize;
                let b = if seg_max as usize + 1 < nv {
                    seg_max as usize + 1
                } else {
                    0
                };
                let va: [f32; 3] = verts[a * 3..a * 3 + 3].try_into().unwrap();
                let vb: [f32; 3] = verts[b * 3..b * 3 + 3].try_into().unwrap();
                let dx = vb[0] - va[0];
                let dz = vb[2] - va[2];
                hit.hit_normal = [dz, 0.0, -dx];
                vnormalize(&mut hit.hit_normal);
                return Ok(hit);
            }

            // Advance to the neighbour polygon.
            cur_ref = next_ref;
            prev_tile = tile;
            prev_poly = poly;
            tile = next_tile;
            poly = next_poly;
        }

        Ok(hit)
    }

    /// Walks from a position toward a target along the surface, sliding
    /// along walls, without leaving the polygons accepted by the filter.
    ///
    /// Uses a small breadth-first search over the local neighbourhood; the
    /// visited corridor starts at `start_ref`.
    pub fn move_along_surface(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_visited: usize,
    ) -> Result<MoveAlongSurfaceResult, Status> {
        let nav = self.nav;

        if !nav.is_valid_poly_ref(start_ref) || !visfinite(start_pos) || !visfinite(end_pos) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let mut status = Status::success();

        self.tiny_node_pool.clear();
        let start_idx = self
            .tiny_node_pool
            .get_node(start_ref, 0)
            .expect("cleared tiny pool has room for the start node");
        {
            let node = self.tiny_node_pool.node_mut(start_idx);
            node.pidx = 0;
            node.cost = 0.0;
            node.total = 0.0;
            node.id = start_ref;
            node.flags = NodeFlags::CLOSED;
        }

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_node: Option<NodeIndex> = None;

        // The search is constrained to the circle through start and end.
        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad = vdist(start_pos, end_pos) / 2.0 + 0.001;
        let search_rad_sqr = search_rad * search_rad;

        let mut verts = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let mut queue: Vec<NodeIndex> = Vec::with_capacity(MAX_LOCAL_STACK);
        let mut queue_head = 0usize;
        queue.push(start_idx);

        while queue_head < queue.len() {
            let cur_idx = queue[queue_head];
            queue_head += 1;

            let cur_ref = self.tiny_node_pool.node(cur_idx).id;
            let (cur_tile, cur_poly) = nav.get_tile_and_poly_by_ref_unchecked(cur_ref);
            let nv = cur_poly.vert_count as usize;
            for i in 0..nv {
                let v = cur_tile.vert(cur_poly.verts[i] as usize);
                verts[i * 3..i * 3 + 3].copy_from_slice(&v);
            }

            // The target is inside this polygon: done.
            if point_in_polygon(end_pos, &verts[..nv * 3], nv) {
                best_node = Some(cur_idx);
                best_pos = *end_pos;
                break;
            }

            // Walk the edges: portals feed the queue, walls clamp the
            // target position.
            let mut j = nv - 1;
            for i in 0..nv {
                let mut neis: Vec<PolyRef> = Vec::with_capacity(8);
                if (cur_poly.neighbors[j] & crate::EXT_LINK) != 0 {
                    let mut link_idx = cur_poly.first_link;
                    while let Some(li) = link_idx {
                        let link = &cur_tile.links[li as usize];
                        link_idx = link.next;
                        if link.edge as usize == j && link.reference.is_valid() {
                            let (t, p) = nav.get_tile_and_poly_by_ref_unchecked(link.reference);
                            if filter.pass_filter(link.reference, t, p) && neis.len() < 8 {
                                neis.push(link.reference);
                            }
                        }
                    }
                } else if cur_poly.neighbors[j] != 0 {
                    let idx = (cur_poly.neighbors[j] - 1) as usize;
                    let reference =
                        PolyRef::new(nav.get_poly_ref_base(cur_tile).id() | idx as u64);
                    if filter.pass_filter(reference, cur_tile, &cur_tile.polys[idx]) {
                        neis.push(reference);
                    }
                }

                let vj: [f32; 3] = verts[j * 3..j * 3 + 3].try_into().unwrap();
                let vi: [f32; 3] = verts[i * 3..i * 3 + 3].try_into().unwrap();

                if neis.is_empty() {
                    // Wall edge: clamp the target to the nearest point.
                    let (dist_sqr, tseg) = dist_pt_seg_sqr_2d(end_pos, &vj, &vi);
                    if dist_sqr < best_dist {
                        best_pos = vlerp(&vj, &vi, tseg);
                        best_dist = dist_sqr;
                        best_node = Some(cur_idx);
                    }
                } else {
                    for nei_ref in neis {
                        let Some(nei_idx) = self.tiny_node_pool.get_node(nei_ref, 0) else {
                            continue;
                        };
                        if self
                            .tiny_node_pool
                            .node(nei_idx)
                            .flags
                            .contains(NodeFlags::CLOSED)
                        {
                            continue;
                        }
                        // Skip edges outside the search circle.
                        let (dist_sqr, _) = dist_pt_seg_sqr_2d(&search_pos, &vj, &vi);
                        if dist_sqr > search_rad_sqr {
                            continue;
                        }
                        if queue.len() < MAX_LOCAL_STACK {
                            let node = self.tiny_node_pool.node_mut(nei_idx);
                            node.pidx = cur_idx;
                            node.flags.insert(NodeFlags::CLOSED);
                            queue.push(nei_idx);
                        }
                    }
                }

                j = i;
            }
        }

        let mut visited = Vec::new();
        if let Some(best) = best_node {
            let mut chain = Vec::new();
            let mut cur = best;
            loop {
                chain.push(self.tiny_node_pool.node(cur).id);
                let pidx = self.tiny_node_pool.node(cur).pidx;
                if pidx == 0 {
                    break;
                }
                cur = pidx;
            }
            chain.reverse();
            if chain.len() > max_visited {
                status |= Status::BUFFER_TOO_SMALL;
                chain.truncate(max_visited);
            }
            visited = chain;
        }

        Ok(MoveAlongSurfaceResult {
            result_pos: best_pos,
            visited,
            status,
        })
    }
}

/// Portal endpoints between two polygons connected by a link.
///
/// For a link at a tile boundary the endpoints are clamped to the link's
/// traversable sub-interval; for off-mesh connections both endpoints
/// collapse onto the connection vertex.
fn portal_points(
    from: PolyRef,
    from_poly: &Poly,
    from_tile: &MeshTile,
    to: PolyRef,
    to_poly: &Poly,
    to_tile: &MeshTile,
) -> Result<([f32; 3], [f32; 3]), Status> {
    // Find the link pointing to the 'to' polygon.
    let mut link = None;
    let mut link_idx = from_poly.first_link;
    while let Some(li) = link_idx {
        let l = &from_tile.links[li as usize];
        if l.reference == to {
            link = Some(l);
            break;
        }
        link_idx = l.next;
    }
    let link = link.ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

    // Off-mesh connections collapse the portal onto an endpoint.
    if from_poly.poly_type == PolyType::OffMeshConnection {
        let v = from_tile.vert(from_poly.verts[link.edge as usize] as usize);
        return Ok((v, v));
    }
    if to_poly.poly_type == PolyType::OffMeshConnection {
        let mut link_idx = to_poly.first_link;
        while let Some(li) = link_idx {
            let l = &to_tile.links[li as usize];
            if l.reference == from {
                let v = to_tile.vert(to_poly.verts[l.edge as usize] as usize);
                return Ok((v, v));
            }
            link_idx = l.next;
        }
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }

    // Portal vertices on the shared edge.
    let v0 = from_poly.verts[link.edge as usize] as usize;
    let v1 = from_poly.verts[(link.edge as usize + 1) % from_poly.vert_count as usize] as usize;
    let mut left = from_tile.vert(v0);
    let mut right = from_tile.vert(v1);

    // Boundary links may confine travel to a sub-interval of the edge.
    if link.side != INTERNAL_LINK_SIDE && (link.bmin != 0 || link.bmax != 255) {
        let s = 1.0 / 255.0;
        let tmin = link.bmin as f32 * s;
        let tmax = link.bmax as f32 * s;
        let a = from_tile.vert(v0);
        let b = from_tile.vert(v1);
        left = vlerp(&a, &b, tmin);
        right = vlerp(&a, &b, tmax);
    }

    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_mesh::NavMeshParams;

    #[test]
    fn test_new_rejects_bad_capacity() {
        let mesh = NavMesh::new(NavMeshParams {
            origin: [0.0; 3],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 1,
            max_polys_per_tile: 4,
        })
        .unwrap();

        assert!(NavMeshQuery::new(&mesh, 0).is_err());
        assert!(NavMeshQuery::new(&mesh, usize::from(u16::MAX)).is_err());
        assert!(NavMeshQuery::new(&mesh, 64).is_ok());
    }

    #[test]
    fn test_init_grows_and_reuses() {
        let mesh = NavMesh::new(NavMeshParams {
            origin: [0.0; 3],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 1,
            max_polys_per_tile: 4,
        })
        .unwrap();

        let mut query = NavMeshQuery::new(&mesh, 16).unwrap();
        assert_eq!(query.node_pool.max_nodes(), 16);

        query.init(256).unwrap();
        assert_eq!(query.node_pool.max_nodes(), 256);

        // Shrinking keeps the larger pool.
        query.init(8).unwrap();
        assert_eq!(query.node_pool.max_nodes(), 256);
        assert_eq!(query.node_pool.node_count(), 0);
    }
}
