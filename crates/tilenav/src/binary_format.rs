//! Binary tile format
//!
//! Tiles travel between the builder, disk and the runtime as opaque
//! little-endian blobs. The reader rebuilds a [`MeshTile`] from a blob;
//! the writer is its serialization counterpart. Link *contents* are not
//! part of the wire format — they encode salted references that only
//! exist once a tile is resident — so the header reserves pool capacity
//! and the store builds the links when the tile is added.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::tile::{BVNode, MeshTile, OffMeshConnection, Poly, PolyDetail, PolyType, TileHeader};
use crate::{PolyFlags, Status, MAX_VERTS_PER_POLY};

/// Magic number identifying a tile blob ('TNAV')
pub const TILE_MAGIC: u32 = 0x5641_4E54;

/// Current tile format version
pub const TILE_VERSION: u32 = 1;

type Result<T> = std::result::Result<T, Status>;

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<TileHeader> {
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != TILE_MAGIC {
        return Err(Status::failure_detail(Status::WRONG_MAGIC));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != TILE_VERSION {
        return Err(Status::failure_detail(Status::WRONG_VERSION));
    }

    let x = cursor.read_i32::<LittleEndian>()?;
    let y = cursor.read_i32::<LittleEndian>()?;
    let layer = cursor.read_i32::<LittleEndian>()?;
    let user_id = cursor.read_u32::<LittleEndian>()?;
    let poly_count = cursor.read_i32::<LittleEndian>()?;
    let vert_count = cursor.read_i32::<LittleEndian>()?;
    let max_link_count = cursor.read_i32::<LittleEndian>()?;
    let detail_mesh_count = cursor.read_i32::<LittleEndian>()?;
    let detail_vert_count = cursor.read_i32::<LittleEndian>()?;
    let detail_tri_count = cursor.read_i32::<LittleEndian>()?;
    let bv_node_count = cursor.read_i32::<LittleEndian>()?;
    let off_mesh_con_count = cursor.read_i32::<LittleEndian>()?;
    let off_mesh_base = cursor.read_i32::<LittleEndian>()?;
    let walkable_height = cursor.read_f32::<LittleEndian>()?;
    let walkable_radius = cursor.read_f32::<LittleEndian>()?;
    let walkable_climb = cursor.read_f32::<LittleEndian>()?;

    let mut bmin = [0.0f32; 3];
    for v in &mut bmin {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    let mut bmax = [0.0f32; 3];
    for v in &mut bmax {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    let bv_quant_factor = cursor.read_f32::<LittleEndian>()?;

    if poly_count < 0
        || vert_count < 0
        || max_link_count < 0
        || detail_mesh_count < 0
        || detail_vert_count < 0
        || detail_tri_count < 0
        || bv_node_count < 0
        || off_mesh_con_count < 0
    {
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }

    Ok(TileHeader {
        x,
        y,
        layer,
        user_id,
        poly_count,
        vert_count,
        max_link_count,
        detail_mesh_count,
        detail_vert_count,
        detail_tri_count,
        bv_node_count,
        off_mesh_con_count,
        off_mesh_base,
        walkable_height,
        walkable_radius,
        walkable_climb,
        bmin,
        bmax,
        bv_quant_factor,
    })
}

fn write_header(out: &mut Vec<u8>, header: &TileHeader) -> Result<()> {
    out.write_u32::<LittleEndian>(TILE_MAGIC)?;
    out.write_u32::<LittleEndian>(TILE_VERSION)?;
    out.write_i32::<LittleEndian>(header.x)?;
    out.write_i32::<LittleEndian>(header.y)?;
    out.write_i32::<LittleEndian>(header.layer)?;
    out.write_u32::<LittleEndian>(header.user_id)?;
    out.write_i32::<LittleEndian>(header.poly_count)?;
    out.write_i32::<LittleEndian>(header.vert_count)?;
    out.write_i32::<LittleEndian>(header.max_link_count)?;
    out.write_i32::<LittleEndian>(header.detail_mesh_count)?;
    out.write_i32::<LittleEndian>(header.detail_vert_count)?;
    out.write_i32::<LittleEndian>(header.detail_tri_count)?;
    out.write_i32::<LittleEndian>(header.bv_node_count)?;
    out.write_i32::<LittleEndian>(header.off_mesh_con_count)?;
    out.write_i32::<LittleEndian>(header.off_mesh_base)?;
    out.write_f32::<LittleEndian>(header.walkable_height)?;
    out.write_f32::<LittleEndian>(header.walkable_radius)?;
    out.write_f32::<LittleEndian>(header.walkable_climb)?;
    for v in &header.bmin {
        out.write_f32::<LittleEndian>(*v)?;
    }
    for v in &header.bmax {
        out.write_f32::<LittleEndian>(*v)?;
    }
    out.write_f32::<LittleEndian>(header.bv_quant_factor)?;
    Ok(())
}

fn read_poly(cursor: &mut Cursor<&[u8]>) -> Result<Poly> {
    let mut verts = [0u16; MAX_VERTS_PER_POLY];
    for v in &mut verts {
        *v = cursor.read_u16::<LittleEndian>()?;
    }
    let mut neighbors = [0u16; MAX_VERTS_PER_POLY];
    for n in &mut neighbors {
        *n = cursor.read_u16::<LittleEndian>()?;
    }
    let flags = PolyFlags::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
    let vert_count = cursor.read_u8()?;
    let area_and_type = cursor.read_u8()?;

    if vert_count as usize > MAX_VERTS_PER_POLY {
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }

    let area = area_and_type & 0x3f;
    let poly_type = if (area_and_type >> 6) == 1 {
        PolyType::OffMeshConnection
    } else {
        PolyType::Ground
    };

    let mut poly = Poly::new(area, poly_type, flags);
    poly.verts = verts;
    poly.neighbors = neighbors;
    poly.vert_count = vert_count;
    Ok(poly)
}

fn write_poly(out: &mut Vec<u8>, poly: &Poly) -> Result<()> {
    for v in &poly.verts {
        out.write_u16::<LittleEndian>(*v)?;
    }
    for n in &poly.neighbors {
        out.write_u16::<LittleEndian>(*n)?;
    }
    out.write_u16::<LittleEndian>(poly.flags.bits())?;
    out.write_u8(poly.vert_count)?;
    out.write_u8(poly.area | ((poly.poly_type as u8) << 6))?;
    Ok(())
}

/// Deserializes a tile blob.
///
/// The returned tile is not yet resident: its salt is unset and its link
/// pool is empty capacity; [`crate::NavMesh::add_tile`] finishes both.
pub fn read_tile(data: &[u8]) -> Result<MeshTile> {
    let mut cursor = Cursor::new(data);
    let header = read_header(&mut cursor)?;

    let mut verts = vec![0.0f32; header.vert_count as usize * 3];
    for v in &mut verts {
        *v = cursor.read_f32::<LittleEndian>()?;
    }

    let mut polys = Vec::with_capacity(header.poly_count as usize);
    for _ in 0..header.poly_count {
        polys.push(read_poly(&mut cursor)?);
    }

    let mut detail_meshes = Vec::with_capacity(header.detail_mesh_count as usize);
    for _ in 0..header.detail_mesh_count {
        detail_meshes.push(PolyDetail {
            vert_base: cursor.read_u32::<LittleEndian>()?,
            tri_base: cursor.read_u32::<LittleEndian>()?,
            vert_count: cursor.read_u8()?,
            tri_count: cursor.read_u8()?,
        });
    }

    let mut detail_verts = vec![0.0f32; header.detail_vert_count as usize * 3];
    for v in &mut detail_verts {
        *v = cursor.read_f32::<LittleEndian>()?;
    }

    let mut detail_tris = vec![0u8; header.detail_tri_count as usize * 4];
    for t in &mut detail_tris {
        *t = cursor.read_u8()?;
    }

    let mut bv_tree = Vec::with_capacity(header.bv_node_count as usize);
    for _ in 0..header.bv_node_count {
        let mut node = BVNode::default();
        for v in &mut node.bmin {
            *v = cursor.read_u16::<LittleEndian>()?;
        }
        for v in &mut node.bmax {
            *v = cursor.read_u16::<LittleEndian>()?;
        }
        node.i = cursor.read_i32::<LittleEndian>()?;
        bv_tree.push(node);
    }

    let mut off_mesh_cons = Vec::with_capacity(header.off_mesh_con_count as usize);
    for _ in 0..header.off_mesh_con_count {
        let mut pos = [0.0f32; 6];
        for v in &mut pos {
            *v = cursor.read_f32::<LittleEndian>()?;
        }
        off_mesh_cons.push(OffMeshConnection {
            pos,
            radius: cursor.read_f32::<LittleEndian>()?,
            poly: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u8()?,
            side: cursor.read_u8()?,
            user_id: cursor.read_u32::<LittleEndian>()?,
        });
    }

    let mut tile = MeshTile {
        salt: 0,
        header: Some(header),
        verts,
        polys,
        links: vec![crate::tile::Link::null(); 0],
        detail_meshes,
        detail_verts,
        detail_tris,
        bv_tree,
        off_mesh_cons,
        free_link: None,
        next: None,
    };

    let max_links = tile.header.as_ref().unwrap().max_link_count as usize;
    tile.links = vec![crate::tile::Link::null(); max_links];
    tile.reset_links();

    Ok(tile)
}

/// Serializes a tile into the wire format read by [`read_tile`]
pub fn write_tile(tile: &MeshTile) -> Result<Vec<u8>> {
    let header = tile
        .header
        .as_ref()
        .ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

    let mut out = Vec::new();
    write_header(&mut out, header)?;

    for v in &tile.verts {
        out.write_f32::<LittleEndian>(*v)?;
    }
    for poly in &tile.polys {
        write_poly(&mut out, poly)?;
    }
    for pd in &tile.detail_meshes {
        out.write_u32::<LittleEndian>(pd.vert_base)?;
        out.write_u32::<LittleEndian>(pd.tri_base)?;
        out.write_u8(pd.vert_count)?;
        out.write_u8(pd.tri_count)?;
    }
    for v in &tile.detail_verts {
        out.write_f32::<LittleEndian>(*v)?;
    }
    for t in &tile.detail_tris {
        out.write_u8(*t)?;
    }
    for node in &tile.bv_tree {
        for v in &node.bmin {
            out.write_u16::<LittleEndian>(*v)?;
        }
        for v in &node.bmax {
            out.write_u16::<LittleEndian>(*v)?;
        }
        out.write_i32::<LittleEndian>(node.i)?;
    }
    for con in &tile.off_mesh_cons {
        for v in &con.pos {
            out.write_f32::<LittleEndian>(*v)?;
        }
        out.write_f32::<LittleEndian>(con.radius)?;
        out.write_u16::<LittleEndian>(con.poly)?;
        out.write_u8(con.flags)?;
        out.write_u8(con.side)?;
        out.write_u32::<LittleEndian>(con.user_id)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> MeshTile {
        let header = TileHeader {
            x: 3,
            y: -2,
            layer: 0,
            user_id: 77,
            poly_count: 1,
            vert_count: 3,
            max_link_count: 6,
            detail_mesh_count: 1,
            detail_vert_count: 1,
            detail_tri_count: 1,
            bv_node_count: 1,
            off_mesh_con_count: 1,
            off_mesh_base: 1,
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            bmin: [0.0, -1.0, 0.0],
            bmax: [10.0, 1.0, 10.0],
            bv_quant_factor: 6553.5,
        };

        let mut poly = Poly::new(5, PolyType::Ground, PolyFlags::WALK | PolyFlags::DOOR);
        poly.verts = [0, 1, 2, 0, 0, 0];
        poly.neighbors = [0, crate::EXT_LINK | 2, 0, 0, 0, 0];
        poly.vert_count = 3;

        MeshTile {
            salt: 0,
            header: Some(header),
            verts: vec![0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 0.0, 10.0],
            polys: vec![poly],
            links: Vec::new(),
            detail_meshes: vec![PolyDetail {
                vert_base: 0,
                tri_base: 0,
                vert_count: 1,
                tri_count: 1,
            }],
            detail_verts: vec![5.0, 0.5, 5.0],
            detail_tris: vec![0, 1, 3, 0],
            bv_tree: vec![BVNode {
                bmin: [0, 0, 0],
                bmax: [65535, 65535, 65535],
                i: 0,
            }],
            off_mesh_cons: vec![OffMeshConnection {
                pos: [1.0, 0.0, 1.0, 9.0, 0.0, 9.0],
                radius: 0.5,
                poly: 1,
                flags: OffMeshConnection::BIDIR,
                side: 0xff,
                user_id: 42,
            }],
            free_link: None,
            next: None,
        }
    }

    #[test]
    fn test_round_trip() {
        let tile = sample_tile();
        let blob = write_tile(&tile).unwrap();
        let read = read_tile(&blob).unwrap();

        let h = read.header.as_ref().unwrap();
        assert_eq!(h.x, 3);
        assert_eq!(h.y, -2);
        assert_eq!(h.user_id, 77);
        assert_eq!(h.poly_count, 1);
        assert!((h.bv_quant_factor - 6553.5).abs() < 1e-3);

        assert_eq!(read.verts, tile.verts);
        assert_eq!(read.polys[0].verts, tile.polys[0].verts);
        assert_eq!(read.polys[0].neighbors, tile.polys[0].neighbors);
        assert_eq!(read.polys[0].flags, tile.polys[0].flags);
        assert_eq!(read.polys[0].area, 5);
        assert_eq!(read.polys[0].poly_type, PolyType::Ground);

        assert_eq!(read.detail_meshes.len(), 1);
        assert_eq!(read.detail_verts, tile.detail_verts);
        assert_eq!(read.detail_tris, tile.detail_tris);
        assert_eq!(read.bv_tree.len(), 1);
        assert_eq!(read.bv_tree[0].i, 0);
        assert_eq!(read.off_mesh_cons[0].user_id, 42);
        assert_eq!(read.off_mesh_cons[0].side, 0xff);

        // Link pool is allocated to the reserved capacity, all free.
        assert_eq!(read.links.len(), 6);
        assert_eq!(read.free_link, Some(0));
    }

    #[test]
    fn test_off_mesh_poly_type_round_trip() {
        let mut tile = sample_tile();
        let mut con_poly = Poly::new(0, PolyType::OffMeshConnection, PolyFlags::JUMP);
        con_poly.verts = [3, 4, 0, 0, 0, 0];
        con_poly.vert_count = 2;
        tile.polys.push(con_poly);
        tile.header.as_mut().unwrap().poly_count = 2;

        let blob = write_tile(&tile).unwrap();
        let read = read_tile(&blob).unwrap();
        assert_eq!(read.polys[1].poly_type, PolyType::OffMeshConnection);
        assert_eq!(read.polys[1].vert_count, 2);
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let tile = sample_tile();
        let mut blob = write_tile(&tile).unwrap();

        blob[0] ^= 0xff;
        let err = read_tile(&blob).unwrap_err();
        assert!(err.is_failure());
        assert!(err.has_detail(Status::WRONG_MAGIC));

        let mut blob = write_tile(&tile).unwrap();
        blob[4] = 99;
        let err = read_tile(&blob).unwrap_err();
        assert!(err.has_detail(Status::WRONG_VERSION));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let tile = sample_tile();
        let blob = write_tile(&tile).unwrap();
        let err = read_tile(&blob[..blob.len() / 2]).unwrap_err();
        assert!(err.is_failure());
    }
}
