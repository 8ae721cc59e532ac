//! Tile blob builders for tests
//!
//! All helpers construct tiles through the public serializer, so every
//! test corridor also exercises the wire format. Polygons are wound
//! clockwise when viewed from above (positive signed area on XZ), the
//! winding the clipping and funnel code expects.

use crate::binary_format::write_tile;
use crate::tile::{BVNode, MeshTile, OffMeshConnection, Poly, PolyType, TileHeader};
use crate::{NavMeshParams, PolyFlags, EXT_LINK};

pub fn default_params() -> NavMeshParams {
    NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 8,
        max_polys_per_tile: 32,
    }
}

fn header_at(x: i32, y: i32) -> TileHeader {
    TileHeader {
        x,
        y,
        layer: 0,
        user_id: 0,
        poly_count: 0,
        vert_count: 0,
        max_link_count: 32,
        detail_mesh_count: 0,
        detail_vert_count: 0,
        detail_tri_count: 0,
        bv_node_count: 0,
        off_mesh_con_count: 0,
        off_mesh_base: 0,
        walkable_height: 2.0,
        walkable_radius: 0.6,
        walkable_climb: 0.5,
        bmin: [x as f32 * 10.0, -2.0, y as f32 * 10.0],
        bmax: [x as f32 * 10.0 + 10.0, 2.0, y as f32 * 10.0 + 10.0],
        bv_quant_factor: 0.0,
    }
}

fn ground_poly(verts: &[u16], neighbors: &[u16]) -> Poly {
    let mut poly = Poly::new(0, PolyType::Ground, PolyFlags::WALK);
    for (i, &v) in verts.iter().enumerate() {
        poly.verts[i] = v;
    }
    for (i, &n) in neighbors.iter().enumerate() {
        poly.neighbors[i] = n;
    }
    poly.vert_count = verts.len() as u8;
    poly
}

/// Builds a degenerate-but-valid linear BV tree: a root covering the
/// whole tile followed by one leaf per polygon.
fn attach_bv_tree(tile: &mut MeshTile) {
    let header = tile.header.as_mut().unwrap();
    let extent = (header.bmax[0] - header.bmin[0])
        .max(header.bmax[1] - header.bmin[1])
        .max(header.bmax[2] - header.bmin[2]);
    header.bv_quant_factor = 65535.0 / extent;
    let qfac = header.bv_quant_factor;
    let bmin = header.bmin;

    let quantize = |tile: &MeshTile, poly: &Poly| -> ([u16; 3], [u16; 3]) {
        let mut lo = tile.vert(poly.verts[0] as usize);
        let mut hi = lo;
        for k in 1..poly.vert_count as usize {
            let v = tile.vert(poly.verts[k] as usize);
            tilenav_common::vmin(&mut lo, &v);
            tilenav_common::vmax(&mut hi, &v);
        }
        let q = |w: f32, b: f32, up: bool| -> u16 {
            let v = (w - b) * qfac;
            let v = if up { v.ceil() } else { v.floor() };
            v.clamp(0.0, 65535.0) as u16
        };
        (
            [
                q(lo[0], bmin[0], false),
                q(lo[1], bmin[1], false),
                q(lo[2], bmin[2], false),
            ],
            [
                q(hi[0], bmin[0], true),
                q(hi[1], bmin[1], true),
                q(hi[2], bmin[2], true),
            ],
        )
    };

    let n = tile.polys.len();
    let mut nodes = Vec::with_capacity(n + 1);
    nodes.push(BVNode {
        bmin: [0, 0, 0],
        bmax: [65535, 65535, 65535],
        i: -((n + 1) as i32),
    });
    for (i, poly) in tile.polys.iter().enumerate() {
        let (lo, hi) = quantize(tile, poly);
        nodes.push(BVNode {
            bmin: lo,
            bmax: hi,
            i: i as i32,
        });
    }
    tile.bv_tree = nodes;
    tile.header.as_mut().unwrap().bv_node_count = (n + 1) as i32;
}

/// A 10x10 square on the XZ plane split along the diagonal A-C into two
/// triangles: polygon 0 holds corner B=(10,0,0), polygon 1 holds corner
/// D=(0,0,10). They share the portal edge A=(0,0,0) to C=(10,0,10).
pub fn two_triangle_tile(with_bv: bool) -> Vec<u8> {
    let mut header = header_at(0, 0);
    header.poly_count = 2;
    header.vert_count = 4;

    let mut tile = MeshTile {
        header: Some(header),
        verts: vec![
            0.0, 0.0, 0.0, // A
            10.0, 0.0, 0.0, // B
            10.0, 0.0, 10.0, // C
            0.0, 0.0, 10.0, // D
        ],
        polys: vec![
            // P1 = A, C, B; edge 0 (A->C) is the portal to P2.
            ground_poly(&[0, 2, 1], &[2, 0, 0]),
            // P2 = A, D, C; edge 2 (C->A) is the portal to P1.
            ground_poly(&[0, 3, 2], &[0, 0, 1]),
        ],
        ..MeshTile::default()
    };

    if with_bv {
        attach_bv_tree(&mut tile);
    }
    write_tile(&tile).unwrap()
}

/// A tile at grid cell (tx, ty) filled with a 2x2 grid of 5-unit quads.
/// Border edges carry the compass side markers so neighbouring tiles
/// connect when added. Polygon index is `gz * 2 + gx`.
pub fn grid_tile(tx: i32, ty: i32) -> Vec<u8> {
    let ox = tx as f32 * 10.0;
    let oz = ty as f32 * 10.0;

    // 3x3 vertex lattice.
    let mut verts = Vec::new();
    for iz in 0..3 {
        for ix in 0..3 {
            verts.push(ox + ix as f32 * 5.0);
            verts.push(0.0);
            verts.push(oz + iz as f32 * 5.0);
        }
    }
    let v = |ix: usize, iz: usize| (iz * 3 + ix) as u16;

    let mut polys = Vec::new();
    for gz in 0..2usize {
        for gx in 0..2usize {
            let p = |gx: usize, gz: usize| (gz * 2 + gx + 1) as u16;
            // Edges: 0 west, 1 north (+z), 2 east, 3 south (-z).
            let west = if gx == 0 { EXT_LINK | 4 } else { p(gx - 1, gz) };
            let north = if gz == 1 { EXT_LINK | 2 } else { p(gx, gz + 1) };
            let east = if gx == 1 { EXT_LINK } else { p(gx + 1, gz) };
            let south = if gz == 0 { EXT_LINK | 6 } else { p(gx, gz - 1) };
            polys.push(ground_poly(
                &[
                    v(gx, gz),
                    v(gx, gz + 1),
                    v(gx + 1, gz + 1),
                    v(gx + 1, gz),
                ],
                &[west, north, east, south],
            ));
        }
    }

    let mut header = header_at(tx, ty);
    header.poly_count = polys.len() as i32;
    header.vert_count = 9;

    let tile = MeshTile {
        header: Some(header),
        verts,
        polys,
        ..MeshTile::default()
    };
    write_tile(&tile).unwrap()
}

/// Two disjoint 4-unit quads joined by a bidirectional off-mesh
/// connection from (2,0,2) on quad 0 to (8,0,2) on quad 1. The
/// connection polygon has index 2.
pub fn off_mesh_tile() -> Vec<u8> {
    let mut header = header_at(0, 0);
    header.poly_count = 3;
    header.vert_count = 10;
    header.off_mesh_base = 2;
    header.off_mesh_con_count = 1;

    let mut con_poly = Poly::new(0, PolyType::OffMeshConnection, PolyFlags::JUMP);
    con_poly.verts[0] = 8;
    con_poly.verts[1] = 9;
    con_poly.vert_count = 2;

    let tile = MeshTile {
        header: Some(header),
        verts: vec![
            0.0, 0.0, 0.0, //
            0.0, 0.0, 4.0, //
            4.0, 0.0, 4.0, //
            4.0, 0.0, 0.0, //
            6.0, 0.0, 0.0, //
            6.0, 0.0, 4.0, //
            10.0, 0.0, 4.0, //
            10.0, 0.0, 0.0, //
            2.0, 0.0, 2.0, // connection start
            8.0, 0.0, 2.0, // connection end
        ],
        polys: vec![
            ground_poly(&[0, 1, 2, 3], &[0, 0, 0, 0]),
            ground_poly(&[4, 5, 6, 7], &[0, 0, 0, 0]),
            con_poly,
        ],
        off_mesh_cons: vec![OffMeshConnection {
            pos: [2.0, 0.0, 2.0, 8.0, 0.0, 2.0],
            radius: 1.0,
            poly: 2,
            flags: OffMeshConnection::BIDIR,
            side: 0xff,
            user_id: 7,
        }],
        ..MeshTile::default()
    };
    write_tile(&tile).unwrap()
}
