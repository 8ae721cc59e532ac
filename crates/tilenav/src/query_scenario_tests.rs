//! End-to-end query scenarios on a single two-triangle tile
//!
//! The tile is a 10x10 square on the XZ plane split along the diagonal
//! A=(0,0,0) to C=(10,0,10); polygon 0 holds corner B, polygon 1 holds
//! corner D.

use crate::test_tile_helpers::{default_params, off_mesh_tile, two_triangle_tile};
use crate::{
    NavMesh, NavMeshQuery, PolyRef, QueryFilter, RaycastOptions, Status, StraightPathFlags,
    StraightPathOptions,
};

fn two_triangle_mesh(with_bv: bool) -> (NavMesh, PolyRef, PolyRef) {
    let mut mesh = NavMesh::new(default_params()).unwrap();
    let base = mesh.add_tile(&two_triangle_tile(with_bv)).unwrap();
    let p1 = PolyRef::new(base.id());
    let p2 = PolyRef::new(base.id() | 1);
    (mesh, p1, p2)
}

#[test]
fn test_find_path_across_shared_edge() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let path = query
        .find_path(p1, p2, &[8.0, 0.0, 1.0], &[1.0, 0.0, 9.0], &filter, 16)
        .unwrap();

    assert_eq!(path.polys, vec![p1, p2]);
    assert!(path.status.is_success());
    assert!(!path.status.has_detail(Status::PARTIAL_RESULT));
    assert!(!path.status.has_detail(Status::OUT_OF_NODES));
}

#[test]
fn test_find_path_same_poly_is_trivial() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let path = query
        .find_path(p1, p1, &[8.0, 0.0, 1.0], &[9.0, 0.0, 2.0], &filter, 16)
        .unwrap();
    assert_eq!(path.polys, vec![p1]);
    assert!(path.status.is_success());
}

#[test]
fn test_find_path_rejects_invalid_refs() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let err = query
        .find_path(
            p1,
            PolyRef::new(0xdeadbeef),
            &[8.0, 0.0, 1.0],
            &[1.0, 0.0, 9.0],
            &filter,
            16,
        )
        .unwrap_err();
    assert!(err.is_failure());
    assert!(err.has_detail(Status::INVALID_PARAM));

    let err = query
        .find_path(
            p1,
            p1,
            &[f32::NAN, 0.0, 1.0],
            &[1.0, 0.0, 9.0],
            &filter,
            16,
        )
        .unwrap_err();
    assert!(err.has_detail(Status::INVALID_PARAM));
}

#[test]
fn test_straight_path_needs_no_corner() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    let start = [8.0, 0.0, 1.0];
    let end = [1.0, 0.0, 9.0];
    let result = query
        .find_straight_path(&start, &end, &[p1, p2], 32, StraightPathOptions::empty())
        .unwrap();

    assert!(result.status.is_success());
    assert_eq!(result.points.len(), 2);

    assert_eq!(result.points[0].pos, start);
    assert_eq!(result.points[0].flags, StraightPathFlags::START);
    assert_eq!(result.points[0].poly, p1);

    assert_eq!(result.points[1].pos, end);
    assert_eq!(result.points[1].flags, StraightPathFlags::END);
    assert_eq!(result.points[1].poly, PolyRef::NONE);
}

#[test]
fn test_straight_path_all_crossings_emits_portal_point() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    let start = [8.0, 0.0, 1.0];
    let end = [1.0, 0.0, 9.0];
    let result = query
        .find_straight_path(
            &start,
            &end,
            &[p1, p2],
            32,
            StraightPathOptions::ALL_CROSSINGS,
        )
        .unwrap();

    assert_eq!(result.points.len(), 3);
    let crossing = &result.points[1];
    // The crossing lies on the portal diagonal (x == z) between the
    // endpoints, entering polygon 1.
    assert!((crossing.pos[0] - crossing.pos[2]).abs() < 1e-4);
    assert!(crossing.pos[0] > 1.0 && crossing.pos[0] < 8.0);
    assert_eq!(crossing.poly, p2);
    assert_eq!(crossing.flags, StraightPathFlags::empty());

    // AREA_CROSSINGS alone skips the portal: both polygons share an area.
    let result = query
        .find_straight_path(
            &start,
            &end,
            &[p1, p2],
            32,
            StraightPathOptions::AREA_CROSSINGS,
        )
        .unwrap();
    assert_eq!(result.points.len(), 2);
}

#[test]
fn test_straight_path_clamps_to_buffer() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    let result = query
        .find_straight_path(
            &[8.0, 0.0, 1.0],
            &[1.0, 0.0, 9.0],
            &[p1, p2],
            1,
            StraightPathOptions::empty(),
        )
        .unwrap();
    assert!(result.status.has_detail(Status::BUFFER_TOO_SMALL));
    assert_eq!(result.points.len(), 1);
    assert_eq!(result.points[0].flags, StraightPathFlags::START);
}

#[test]
fn test_straight_path_partial_on_corrupt_corridor() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    // A stale second polygon forces the clamp-to-last-good branch.
    let bogus = PolyRef::new(p2.id() ^ (1 << 20));
    let result = query
        .find_straight_path(
            &[8.0, 0.0, 1.0],
            &[1.0, 0.0, 9.0],
            &[p1, bogus],
            32,
            StraightPathOptions::empty(),
        )
        .unwrap();

    assert!(result.status.is_success());
    assert!(result.status.has_detail(Status::PARTIAL_RESULT));
    // The path ends on polygon 0's boundary.
    let last = result.points.last().unwrap();
    assert!(last.pos[2] <= last.pos[0] + 1e-3);
}

#[test]
fn test_raycast_through_portal_reaches_end() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let hit = query
        .raycast(
            p1,
            &[5.0, 0.0, 2.0],
            &[5.0, 0.0, 8.0],
            &filter,
            RaycastOptions::empty(),
            None,
            16,
        )
        .unwrap();

    assert_eq!(hit.t, f32::MAX);
    assert!(!hit.hit_wall());
    assert_eq!(hit.path, vec![p1, p2]);
}

#[test]
fn test_raycast_hits_wall() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let start = [5.0, 0.0, 2.0];
    let end = [5.0, 0.0, -5.0];
    let hit = query
        .raycast(
            p1,
            &start,
            &end,
            &filter,
            RaycastOptions::empty(),
            None,
            16,
        )
        .unwrap();

    assert!(hit.t > 0.0 && hit.t < 1.0);
    assert!((hit.t - 2.0 / 7.0).abs() < 1e-4);
    assert_eq!(hit.path, vec![p1]);

    // Unit normal facing back against the ray.
    let len = (hit.hit_normal[0] * hit.hit_normal[0]
        + hit.hit_normal[1] * hit.hit_normal[1]
        + hit.hit_normal[2] * hit.hit_normal[2])
        .sqrt();
    assert!((len - 1.0).abs() < 1e-4);
    let dir = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
    let dot = hit.hit_normal[0] * dir[0] + hit.hit_normal[1] * dir[1] + hit.hit_normal[2] * dir[2];
    assert!(dot < 0.0);
}

#[test]
fn test_raycast_degenerate_segment_stays_put() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let p = [8.0, 0.0, 1.0];
    let hit = query
        .raycast(p1, &p, &p, &filter, RaycastOptions::empty(), None, 16)
        .unwrap();
    assert_eq!(hit.t, f32::MAX);
    assert_eq!(hit.path, vec![p1]);
}

#[test]
fn test_raycast_accumulates_costs() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let hit = query
        .raycast(
            p1,
            &[5.0, 0.0, 2.0],
            &[5.0, 0.0, 8.0],
            &filter,
            RaycastOptions::USE_COSTS,
            None,
            16,
        )
        .unwrap();
    // Unit area cost: the accumulated cost equals the walked distance.
    assert!((hit.path_cost - 6.0).abs() < 1e-3);
}

#[test]
fn test_find_nearest_poly_over_surface() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let (nearest, point, over) = query
        .find_nearest_poly(&[5.0, 3.0, 5.0], &[0.5, 5.0, 0.5], &filter)
        .unwrap();

    assert!(nearest == p1 || nearest == p2);
    assert!(over);
    assert!(point[1].abs() < 1e-5);
    assert!((point[0] - 5.0).abs() < 1e-5);
    assert!((point[2] - 5.0).abs() < 1e-5);

    // Iteration order makes the winner deterministic across runs.
    let (again, _, _) = query
        .find_nearest_poly(&[5.0, 3.0, 5.0], &[0.5, 5.0, 0.5], &filter)
        .unwrap();
    assert_eq!(nearest, again);
}

#[test]
fn test_find_nearest_poly_empty_box() {
    let (mesh, _, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let (nearest, _, over) = query
        .find_nearest_poly(&[500.0, 0.0, 500.0], &[1.0, 1.0, 1.0], &filter)
        .unwrap();
    assert_eq!(nearest, PolyRef::NONE);
    assert!(!over);
}

#[test]
fn test_out_of_nodes_reports_partial() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    // A single-node pool fits only the start node.
    let mut query = NavMeshQuery::new(&mesh, 1).unwrap();
    let filter = QueryFilter::default();

    let path = query
        .find_path(p1, p2, &[8.0, 0.0, 1.0], &[1.0, 0.0, 9.0], &filter, 16)
        .unwrap();

    assert!(path.status.is_success());
    assert!(path.status.has_detail(Status::OUT_OF_NODES));
    assert!(path.status.has_detail(Status::PARTIAL_RESULT));
    assert_eq!(path.polys, vec![p1]);
}

#[test]
fn test_closest_point_round_trips_interior_point() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    let p = [8.0, 0.0, 1.0];
    let (closest, over) = query.closest_point_on_poly(p1, &p).unwrap();
    assert_eq!(closest, p);
    assert!(over);

    // Outside the polygon the point clamps to the nearest edge.
    let (closest, over) = query.closest_point_on_poly(p1, &[11.0, 0.0, 1.0]).unwrap();
    assert!(!over);
    assert!((closest[0] - 10.0).abs() < 1e-5);
    assert!((closest[2] - 1.0).abs() < 1e-5);

    let boundary = query
        .closest_point_on_poly_boundary(p1, &[8.0, 0.0, 1.0])
        .unwrap();
    assert_eq!(boundary, [8.0, 0.0, 1.0]);
}

#[test]
fn test_get_poly_height_on_surface() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();

    let h = query.get_poly_height(p1, &[8.0, 5.0, 1.0]).unwrap();
    assert!(h.abs() < 1e-5);

    // Positions outside the polygon's XZ bounds have no height.
    assert!(query.get_poly_height(p1, &[1.0, 0.0, 9.0]).is_err());
}

#[test]
fn test_query_polygons_collect_matches_overlap() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    // Both triangle AABBs span the square, so any in-tile box sees both.
    let (polys, status) = query
        .query_polygons_collect(&[9.0, 0.0, 1.0], &[0.5, 1.0, 0.5], &filter, 8)
        .unwrap();
    assert_eq!(polys.len(), 2);
    assert!(polys.contains(&p1) && polys.contains(&p2));
    assert!(!status.has_detail(Status::BUFFER_TOO_SMALL));

    // A box beyond the tile bounds sees nothing.
    let (polys, _) = query
        .query_polygons_collect(&[12.0, 0.0, 5.0], &[0.5, 1.0, 0.5], &filter, 8)
        .unwrap();
    assert!(polys.is_empty());

    // Overflow keeps as many as fit and flags the truncation.
    let (polys, status) = query
        .query_polygons_collect(&[5.0, 0.0, 5.0], &[6.0, 1.0, 6.0], &filter, 1)
        .unwrap();
    assert_eq!(polys.len(), 1);
    assert!(status.has_detail(Status::BUFFER_TOO_SMALL));
}

#[test]
fn test_bv_tree_and_scan_agree() {
    let (mesh_scan, _, _) = two_triangle_mesh(false);
    let (mesh_bv, _, _) = two_triangle_mesh(true);
    let filter = QueryFilter::default();

    let boxes = [
        ([9.0f32, 0.0, 1.0], [0.5f32, 1.0, 0.5]),
        ([1.0, 0.0, 9.0], [0.5, 1.0, 0.5]),
        ([5.0, 0.0, 5.0], [6.0, 1.0, 6.0]),
        ([50.0, 0.0, 50.0], [1.0, 1.0, 1.0]),
    ];

    for (center, ext) in boxes {
        let scan_query = NavMeshQuery::new(&mesh_scan, 16).unwrap();
        let (scan, _) = scan_query
            .query_polygons_collect(&center, &ext, &filter, 8)
            .unwrap();
        let bv_query = NavMeshQuery::new(&mesh_bv, 16).unwrap();
        let (bv, _) = bv_query
            .query_polygons_collect(&center, &ext, &filter, 8)
            .unwrap();

        // Same tile geometry, so the same polygons come back either way.
        let scan_ids: Vec<u64> = scan.iter().map(|r| r.id() & 0xff).collect();
        let bv_ids: Vec<u64> = bv.iter().map(|r| r.id() & 0xff).collect();
        assert_eq!(scan_ids, bv_ids, "box {center:?}");
    }
}

#[test]
fn test_filter_blocks_path() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();

    let mut filter = QueryFilter::default();
    filter.set_exclude_flags(crate::PolyFlags::WALK);

    // Both polygons are excluded, so the search never leaves the start.
    let path = query
        .find_path(p1, p2, &[8.0, 0.0, 1.0], &[1.0, 0.0, 9.0], &filter, 16)
        .unwrap();
    assert!(path.status.has_detail(Status::PARTIAL_RESULT));
    assert_eq!(path.polys, vec![p1]);
}

#[test]
fn test_area_cost_steers_search() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();

    let mut filter = QueryFilter::default();
    filter.set_area_cost(0, 10.0);

    // Costs scale but the corridor is unchanged on this trivial mesh.
    let path = query
        .find_path(p1, p2, &[8.0, 0.0, 1.0], &[1.0, 0.0, 9.0], &filter, 16)
        .unwrap();
    assert_eq!(path.polys, vec![p1, p2]);
}

#[test]
fn test_move_along_surface_clamps_at_wall() {
    let (mesh, p1, _) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let result = query
        .move_along_surface(p1, &[8.0, 0.0, 1.0], &[8.0, 0.0, -5.0], &filter, 8)
        .unwrap();

    assert_eq!(result.visited, vec![p1]);
    assert!((result.result_pos[0] - 8.0).abs() < 1e-4);
    assert!(result.result_pos[2].abs() < 1e-4);
}

#[test]
fn test_move_along_surface_reaches_target() {
    let (mesh, p1, p2) = two_triangle_mesh(false);
    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let result = query
        .move_along_surface(p1, &[8.0, 0.0, 1.0], &[1.0, 0.0, 9.0], &filter, 8)
        .unwrap();

    assert_eq!(result.result_pos, [1.0, 0.0, 9.0]);
    assert_eq!(result.visited, vec![p1, p2]);
}

#[test]
fn test_off_mesh_connection_in_corridor() {
    let mut mesh = NavMesh::new(default_params()).unwrap();
    let base = mesh.add_tile(&off_mesh_tile()).unwrap();
    let quad1 = PolyRef::new(base.id());
    let quad2 = PolyRef::new(base.id() | 1);
    let con = PolyRef::new(base.id() | 2);

    let mut query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    let path = query
        .find_path(
            quad1,
            quad2,
            &[1.0, 0.0, 1.0],
            &[9.0, 0.0, 2.0],
            &filter,
            16,
        )
        .unwrap();
    assert_eq!(path.polys, vec![quad1, con, quad2]);
    assert!(path.status.is_success());

    // The jump shows up as a tagged turn point at the connection start.
    let straight = query
        .find_straight_path(
            &[1.0, 0.0, 1.0],
            &[9.0, 0.0, 2.0],
            &path.polys,
            32,
            StraightPathOptions::empty(),
        )
        .unwrap();
    let jump = straight
        .points
        .iter()
        .find(|p| p.flags.contains(StraightPathFlags::OFFMESH_CONNECTION))
        .expect("connection turn point present");
    assert_eq!(jump.poly, con);
    assert!((jump.pos[0] - 2.0).abs() < 1e-3);
    assert!((jump.pos[2] - 2.0).abs() < 1e-3);

    // Endpoint query orients by travel direction.
    let (s, e) = mesh
        .get_off_mesh_connection_poly_end_points(quad1, con)
        .unwrap();
    assert!((s[0] - 2.0).abs() < 1e-3);
    assert!((e[0] - 8.0).abs() < 1e-3);
}

#[test]
fn test_raycast_ignores_off_mesh_connections() {
    let mut mesh = NavMesh::new(default_params()).unwrap();
    let base = mesh.add_tile(&off_mesh_tile()).unwrap();
    let quad1 = PolyRef::new(base.id());

    let query = NavMeshQuery::new(&mesh, 128).unwrap();
    let filter = QueryFilter::default();

    // The ray toward the other quad stops at the gap wall.
    let hit = query
        .raycast(
            quad1,
            &[2.0, 0.0, 2.0],
            &[8.0, 0.0, 2.0],
            &filter,
            RaycastOptions::empty(),
            None,
            16,
        )
        .unwrap();
    assert!(hit.hit_wall());
    assert!((hit.t - (2.0 / 6.0)).abs() < 1e-4);
    assert_eq!(hit.path, vec![quad1]);
}
