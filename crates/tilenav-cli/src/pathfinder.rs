//! World-coordinate pathfinding over pre-built navigation mesh tiles
//!
//! Accepts game-world horizontal (x, y) coordinates; the height is
//! resolved from the terrain tiles under `<data-dir>/maps/` and the
//! navigation tiles load on demand from `<data-dir>/mmaps/`. World
//! (x, y, z) maps into mesh space as (y, z, x).

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use tilenav::{NavMesh, NavMeshParams, NavMeshQuery, QueryFilter, StraightPathOptions};
use tilenav_common::vdist;

use crate::terrain::{TerrainMap, INVALID_HEIGHT};

/// Magic number of the navigation tile wrapper header ('TNTL')
const TILE_FILE_MAGIC: u32 = 0x4c54_4e54;
/// Wrapper header version
const TILE_FILE_VERSION: u32 = 1;

/// Width of one world tile in world units
const BLOCK_SIZE: f32 = 533.33333;
/// Grid offset of the world origin
const TILE_ORIGIN: f32 = 32.0;
/// Valid world coordinate range in units from the map center
const WORLD_MAX: f32 = 17066.666;

/// Result buffer bounds for a single path query
const MAX_POLYS: usize = 4096;
/// Search node capacity of the query object
const MAX_NODES: usize = 65534;

/// Search box half-extents for locating the endpoint polygons
const EXTENTS: [f32; 3] = [2.0, 4.0, 2.0];

/// A resolved walkable path in mesh coordinates
pub struct WorldPath {
    /// Straight-path waypoints
    pub points: Vec<[f32; 3]>,
    /// Total walk distance in world units
    pub distance: f32,
}

/// Computes navmesh paths between world coordinates using pre-built
/// tile files
pub struct PathFinder {
    data_dir: PathBuf,
    map_id: u32,
    mesh: NavMesh,
    loaded_nav_tiles: HashSet<(u32, u32)>,
    terrain_tiles: HashMap<(u32, u32), Option<TerrainMap>>,
}

impl PathFinder {
    /// Opens the mesh parameter file for a map and prepares an empty mesh.
    ///
    /// `data_dir` must contain the `mmaps/` and `maps/` subdirectories.
    pub fn new(data_dir: impl Into<PathBuf>, map_id: u32) -> Result<Self> {
        let data_dir = data_dir.into();
        let params_path = data_dir.join("mmaps").join(format!("{map_id:03}.tnav"));
        info!("loading navmesh params: {}", params_path.display());

        let bytes = std::fs::read(&params_path)
            .with_context(|| format!("could not open {}", params_path.display()))?;
        let params = read_params(&bytes)
            .with_context(|| format!("corrupt mesh params in {}", params_path.display()))?;

        info!(
            "navmesh params: orig=({:.2},{:.2},{:.2}) tile={:.2}x{:.2} max_tiles={} max_polys={}",
            params.origin[0],
            params.origin[1],
            params.origin[2],
            params.tile_width,
            params.tile_height,
            params.max_tiles,
            params.max_polys_per_tile
        );

        let mesh = NavMesh::new(params)
            .map_err(|status| anyhow::anyhow!("navmesh init failed: {status}"))?;

        Ok(Self {
            data_dir,
            map_id,
            mesh,
            loaded_nav_tiles: HashSet::new(),
            terrain_tiles: HashMap::new(),
        })
    }

    /// World (x, y, z) -> mesh (y, z, x)
    fn to_mesh(x: f32, y: f32, z: f32) -> [f32; 3] {
        [y, z, x]
    }

    /// Tile grid cell of world (x, y); fails outside the 64x64 grid
    fn world_to_tile(x: f32, y: f32) -> Option<(u32, u32)> {
        let ftx = TILE_ORIGIN - x / BLOCK_SIZE;
        let fty = TILE_ORIGIN - y / BLOCK_SIZE;
        if !(0.0..64.0).contains(&ftx) || !(0.0..64.0).contains(&fty) {
            warn!("coordinates ({x:.2}, {y:.2}) out of world bounds (tile {ftx:.2}, {fty:.2})");
            return None;
        }
        Some((ftx as u32, fty as u32))
    }

    /// Loads one navigation tile if present; missing tiles are not fatal
    fn load_nav_tile(&mut self, tx: u32, ty: u32) -> bool {
        if self.loaded_nav_tiles.contains(&(tx, ty)) {
            return true;
        }

        let path = self
            .data_dir
            .join("mmaps")
            .join(format!("{:03}{:02}{:02}.tntile", self.map_id, tx, ty));
        debug!("loading nav tile ({tx},{ty}): {}", path.display());

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(_) => {
                warn!("nav tile ({tx},{ty}) not found: {}", path.display());
                return false;
            }
        };

        let mut cursor = Cursor::new(bytes.as_slice());
        let (Ok(magic), Ok(version), Ok(_mesh_version), Ok(size), Ok(_liquids)) = (
            cursor.read_u32::<LittleEndian>(),
            cursor.read_u32::<LittleEndian>(),
            cursor.read_u32::<LittleEndian>(),
            cursor.read_u32::<LittleEndian>(),
            cursor.read_u32::<LittleEndian>(),
        ) else {
            warn!("nav tile ({tx},{ty}): truncated header");
            return false;
        };

        if magic != TILE_FILE_MAGIC || version != TILE_FILE_VERSION {
            warn!("nav tile ({tx},{ty}): bad header (magic={magic:#010x} version={version})");
            return false;
        }

        let data = &bytes[20..];
        if data.len() < size as usize {
            warn!("nav tile ({tx},{ty}): truncated data");
            return false;
        }

        match self.mesh.add_tile(&data[..size as usize]) {
            Ok(_) => {
                debug!("nav tile ({tx},{ty}) loaded ({size} bytes)");
                self.loaded_nav_tiles.insert((tx, ty));
                true
            }
            Err(status) => {
                warn!("nav tile ({tx},{ty}): add_tile failed: {status}");
                false
            }
        }
    }

    /// Loads every navigation tile in the rectangle covering both points
    fn ensure_nav_tiles_loaded(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let (Some((tx1, ty1)), Some((tx2, ty2))) =
            (Self::world_to_tile(x1, y1), Self::world_to_tile(x2, y2))
        else {
            return;
        };

        let (tx_min, tx_max) = (tx1.min(tx2), tx1.max(tx2));
        let (ty_min, ty_max) = (ty1.min(ty2), ty1.max(ty2));
        debug!("tile range x:[{tx_min},{tx_max}] y:[{ty_min},{ty_max}]");

        for tx in tx_min..=tx_max {
            for ty in ty_min..=ty_max {
                self.load_nav_tile(tx, ty);
            }
        }
    }

    /// Terrain height at world (x, y), loading the .map tile on demand
    fn terrain_height(&mut self, x: f32, y: f32) -> f32 {
        let Some((tx, ty)) = Self::world_to_tile(x, y) else {
            return INVALID_HEIGHT;
        };

        if !self.terrain_tiles.contains_key(&(tx, ty)) {
            let path = self
                .data_dir
                .join("maps")
                .join(format!("{:03}{:02}{:02}.map", self.map_id, tx, ty));
            debug!("loading terrain tile ({tx},{ty}): {}", path.display());

            let tile = std::fs::read(&path)
                .ok()
                .and_then(|bytes| TerrainMap::load(&bytes));
            if tile.is_none() {
                warn!("terrain tile ({tx},{ty}) failed to load (no .map file?)");
            }
            self.terrain_tiles.insert((tx, ty), tile);
        }

        match self.terrain_tiles.get(&(tx, ty)) {
            Some(Some(tile)) => tile.height(x, y),
            _ => INVALID_HEIGHT,
        }
    }

    /// Finds the walkable path between two world positions.
    ///
    /// Returns `None` when either endpoint cannot be resolved onto the
    /// mesh or no corridor exists.
    pub fn find_world_path(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Option<WorldPath>> {
        debug!("find_world_path ({x1:.4}, {y1:.4}) -> ({x2:.4}, {y2:.4})");

        if x1.abs() > WORLD_MAX
            || y1.abs() > WORLD_MAX
            || x2.abs() > WORLD_MAX
            || y2.abs() > WORLD_MAX
        {
            bail!("coordinates exceed world bounds (\u{00b1}{WORLD_MAX:.0})");
        }

        self.ensure_nav_tiles_loaded(x1, y1, x2, y2);

        let z1 = self.terrain_height(x1, y1);
        let z2 = self.terrain_height(x2, y2);
        if z1 == INVALID_HEIGHT || z2 == INVALID_HEIGHT {
            warn!("terrain height lookup failed (z1={z1:.2} z2={z2:.2})");
            return Ok(None);
        }

        let start_pos = Self::to_mesh(x1, y1, z1);
        let end_pos = Self::to_mesh(x2, y2, z2);
        debug!(
            "mesh start=({:.2},{:.2},{:.2}) end=({:.2},{:.2},{:.2})",
            start_pos[0], start_pos[1], start_pos[2], end_pos[0], end_pos[1], end_pos[2]
        );

        let mut query = NavMeshQuery::new(&self.mesh, MAX_NODES)
            .map_err(|status| anyhow::anyhow!("query init failed: {status}"))?;
        let filter = QueryFilter::default();

        let (start_ref, start_nearest, _) = query
            .find_nearest_poly(&start_pos, &EXTENTS, &filter)
            .map_err(|status| anyhow::anyhow!("find_nearest_poly failed: {status}"))?;
        let (end_ref, end_nearest, _) = query
            .find_nearest_poly(&end_pos, &EXTENTS, &filter)
            .map_err(|status| anyhow::anyhow!("find_nearest_poly failed: {status}"))?;
        debug!("start_ref={start_ref:?} end_ref={end_ref:?}");

        if !start_ref.is_valid() || !end_ref.is_valid() {
            warn!("could not find nearest poly (try widening extents?)");
            return Ok(None);
        }

        let corridor = match query.find_path(
            start_ref,
            end_ref,
            &start_nearest,
            &end_nearest,
            &filter,
            MAX_POLYS,
        ) {
            Ok(path) => path,
            Err(status) => {
                warn!("find_path failed: {status}");
                return Ok(None);
            }
        };
        debug!("find_path: {} polys", corridor.polys.len());

        if corridor.polys.is_empty() {
            return Ok(None);
        }

        // An incomplete corridor clamps the target to the last reachable
        // polygon.
        let mut end_adj = end_nearest;
        if *corridor.polys.last().unwrap() != end_ref {
            debug!("path incomplete, clamping to last reachable poly");
            let (clamped, _) = query
                .closest_point_on_poly(*corridor.polys.last().unwrap(), &end_nearest)
                .map_err(|status| anyhow::anyhow!("closest_point_on_poly failed: {status}"))?;
            end_adj = clamped;
        }

        let straight = match query.find_straight_path(
            &start_nearest,
            &end_adj,
            &corridor.polys,
            MAX_POLYS,
            StraightPathOptions::empty(),
        ) {
            Ok(s) => s,
            Err(status) => {
                warn!("find_straight_path failed: {status}");
                return Ok(None);
            }
        };
        debug!("find_straight_path: {} points", straight.points.len());

        if straight.points.len() < 2 {
            return Ok(None);
        }

        let points: Vec<[f32; 3]> = straight.points.iter().map(|p| p.pos).collect();
        let distance = points.windows(2).map(|w| vdist(&w[0], &w[1])).sum();

        info!("total distance: {distance:.4}");
        Ok(Some(WorldPath { points, distance }))
    }

    /// Walk distance between two world positions, or `None` without a path
    pub fn compute_distance(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Option<f32>> {
        Ok(self.find_world_path(x1, y1, x2, y2)?.map(|p| p.distance))
    }

}

/// Parses the raw little-endian mesh parameter file
fn read_params(bytes: &[u8]) -> Result<NavMeshParams> {
    let mut cursor = Cursor::new(bytes);
    let mut origin = [0.0f32; 3];
    for v in &mut origin {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    Ok(NavMeshParams {
        origin,
        tile_width: cursor.read_f32::<LittleEndian>()?,
        tile_height: cursor.read_f32::<LittleEndian>()?,
        max_tiles: cursor.read_i32::<LittleEndian>()?,
        max_polys_per_tile: cursor.read_i32::<LittleEndian>()?,
    })
}
