//! Terrain height lookup from .map grid tiles
//!
//! Each tile stores ground heights sampled on a 129x129 outer and 128x128
//! inner lattice, in one of four encodings (flat, f32, u16, u8), plus a
//! 16x16 hole mask. The lookup interpolates the triangle of the sample
//! cell containing the query point.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Sentinel returned when no ground height exists at a position
pub const INVALID_HEIGHT: f32 = -200000.0;

const MAP_MAGIC: u32 = 0x5350_414d; // 'MAPS'
const MAP_VERSION_MAGIC: u32 = 0x342e_3173; // 's1.4'
const MAP_HEIGHT_MAGIC: u32 = 0x5447_484d; // 'MHGT'

const HEIGHT_NO_HEIGHT: u32 = 0x0001;
const HEIGHT_AS_INT16: u32 = 0x0002;
const HEIGHT_AS_INT8: u32 = 0x0004;

const GRID_SIZE: f32 = 533.33333;
const MAP_RESOLUTION: usize = 128;
const TILE_ORIGIN: f32 = 32.0;

const HOLETAB_H: [u16; 4] = [0x1111, 0x2222, 0x4444, 0x8888];
const HOLETAB_V: [u16; 4] = [0x000F, 0x00F0, 0x0F00, 0xF000];

/// Height sample grids, one variant per file encoding
enum HeightData {
    /// Whole tile at one height
    Flat,
    Float { v9: Vec<f32>, v8: Vec<f32> },
    U16 { v9: Vec<u16>, v8: Vec<u16> },
    U8 { v9: Vec<u8>, v8: Vec<u8> },
}

/// One terrain tile's height field
pub struct TerrainMap {
    grid_height: f32,
    grid_int_height_multiplier: f32,
    data: HeightData,
    holes: [[u16; 16]; 16],
}

impl TerrainMap {
    /// Parses a .map tile from a byte buffer
    pub fn load(bytes: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(bytes);

        let map_magic = cursor.read_u32::<LittleEndian>().ok()?;
        let version_magic = cursor.read_u32::<LittleEndian>().ok()?;
        if map_magic != MAP_MAGIC || version_magic != MAP_VERSION_MAGIC {
            return None;
        }
        let _area_offset = cursor.read_u32::<LittleEndian>().ok()?;
        let _area_size = cursor.read_u32::<LittleEndian>().ok()?;
        let height_offset = cursor.read_u32::<LittleEndian>().ok()?;
        let _height_size = cursor.read_u32::<LittleEndian>().ok()?;
        let _liquid_offset = cursor.read_u32::<LittleEndian>().ok()?;
        let _liquid_size = cursor.read_u32::<LittleEndian>().ok()?;
        let holes_offset = cursor.read_u32::<LittleEndian>().ok()?;
        let _holes_size = cursor.read_u32::<LittleEndian>().ok()?;

        let mut holes = [[0u16; 16]; 16];
        if holes_offset != 0 {
            cursor.seek(SeekFrom::Start(holes_offset as u64)).ok()?;
            for row in &mut holes {
                for h in row.iter_mut() {
                    *h = cursor.read_u16::<LittleEndian>().ok()?;
                }
            }
        }

        let mut map = Self {
            grid_height: INVALID_HEIGHT,
            grid_int_height_multiplier: 0.0,
            data: HeightData::Flat,
            holes,
        };

        if height_offset != 0 {
            cursor.seek(SeekFrom::Start(height_offset as u64)).ok()?;
            map.load_height_data(&mut cursor)?;
        }

        Some(map)
    }

    fn load_height_data(&mut self, cursor: &mut Cursor<&[u8]>) -> Option<()> {
        let fourcc = cursor.read_u32::<LittleEndian>().ok()?;
        if fourcc != MAP_HEIGHT_MAGIC {
            return None;
        }
        let flags = cursor.read_u32::<LittleEndian>().ok()?;
        let grid_height = cursor.read_f32::<LittleEndian>().ok()?;
        let grid_max_height = cursor.read_f32::<LittleEndian>().ok()?;

        self.grid_height = grid_height;

        if flags & HEIGHT_NO_HEIGHT != 0 {
            self.data = HeightData::Flat;
            return Some(());
        }

        if flags & HEIGHT_AS_INT16 != 0 {
            let mut v9 = vec![0u16; 129 * 129];
            for v in &mut v9 {
                *v = cursor.read_u16::<LittleEndian>().ok()?;
            }
            let mut v8 = vec![0u16; 128 * 128];
            for v in &mut v8 {
                *v = cursor.read_u16::<LittleEndian>().ok()?;
            }
            self.grid_int_height_multiplier = (grid_max_height - grid_height) / 65535.0;
            self.data = HeightData::U16 { v9, v8 };
        } else if flags & HEIGHT_AS_INT8 != 0 {
            let mut v9 = vec![0u8; 129 * 129];
            cursor.read_exact(&mut v9).ok()?;
            let mut v8 = vec![0u8; 128 * 128];
            cursor.read_exact(&mut v8).ok()?;
            self.grid_int_height_multiplier = (grid_max_height - grid_height) / 255.0;
            self.data = HeightData::U8 { v9, v8 };
        } else {
            let mut v9 = vec![0.0f32; 129 * 129];
            for v in &mut v9 {
                *v = cursor.read_f32::<LittleEndian>().ok()?;
            }
            let mut v8 = vec![0.0f32; 128 * 128];
            for v in &mut v8 {
                *v = cursor.read_f32::<LittleEndian>().ok()?;
            }
            self.data = HeightData::Float { v9, v8 };
        }

        Some(())
    }

    fn is_hole(&self, row: usize, col: usize) -> bool {
        let cell_row = row / 8;
        let cell_col = col / 8;
        let hole_row = (row % 8) / 2;
        let hole_col = (col - cell_col * 8) / 2;
        let hole = self.holes[cell_row][cell_col];
        (hole & HOLETAB_H[hole_col] & HOLETAB_V[hole_row]) != 0
    }

    /// Maps world coordinates into the sample lattice: integer cell plus
    /// fractional position inside it
    fn grid_coords(x: f32, y: f32) -> (usize, usize, f32, f32) {
        let gx = MAP_RESOLUTION as f32 * (TILE_ORIGIN - x / GRID_SIZE);
        let gy = MAP_RESOLUTION as f32 * (TILE_ORIGIN - y / GRID_SIZE);

        let xi = gx as i32;
        let yi = gy as i32;
        let fx = gx - xi as f32;
        let fy = gy - yi as f32;

        (
            (xi as usize) & (MAP_RESOLUTION - 1),
            (yi as usize) & (MAP_RESOLUTION - 1),
            fx,
            fy,
        )
    }

    /// Ground height at world (x, y), or [`INVALID_HEIGHT`] over a hole
    /// or when no data exists
    pub fn height(&self, x: f32, y: f32) -> f32 {
        let (xi, yi, fx, fy) = Self::grid_coords(x, y);

        match &self.data {
            HeightData::Flat => self.grid_height,
            HeightData::Float { v9, v8 } => {
                if self.is_hole(xi, yi) {
                    return INVALID_HEIGHT;
                }
                let v9f = |i: usize, j: usize| v9[i * 129 + j];
                let v8f = |i: usize, j: usize| 2.0 * v8[i * 128 + j];
                Self::interpolate(v9f, v8f, xi, yi, fx, fy)
            }
            HeightData::U16 { v9, v8 } => {
                if self.is_hole(xi, yi) {
                    return INVALID_HEIGHT;
                }
                let v9f = |i: usize, j: usize| v9[i * 129 + j] as f32;
                let v8f = |i: usize, j: usize| 2.0 * v8[i * 128 + j] as f32;
                Self::interpolate(v9f, v8f, xi, yi, fx, fy) * self.grid_int_height_multiplier
                    + self.grid_height
            }
            HeightData::U8 { v9, v8 } => {
                if self.is_hole(xi, yi) {
                    return INVALID_HEIGHT;
                }
                let v9f = |i: usize, j: usize| v9[i * 129 + j] as f32;
                let v8f = |i: usize, j: usize| 2.0 * v8[i * 128 + j] as f32;
                Self::interpolate(v9f, v8f, xi, yi, fx, fy) * self.grid_int_height_multiplier
                    + self.grid_height
            }
        }
    }

    /// Barycentric interpolation over the triangle of the sample cell
    /// containing (fx, fy). Each cell is split into four triangles around
    /// the doubled center sample.
    fn interpolate(
        v9: impl Fn(usize, usize) -> f32,
        v8: impl Fn(usize, usize) -> f32,
        xi: usize,
        yi: usize,
        fx: f32,
        fy: f32,
    ) -> f32 {
        let (a, b, c);
        if fx + fy < 1.0 {
            if fx > fy {
                let h1 = v9(xi, yi);
                let h2 = v9(xi + 1, yi);
                let h5 = v8(xi, yi);
                a = h2 - h1;
                b = h5 - h1 - h2;
                c = h1;
            } else {
                let h1 = v9(xi, yi);
                let h3 = v9(xi, yi + 1);
                let h5 = v8(xi, yi);
                a = h5 - h1 - h3;
                b = h3 - h1;
                c = h1;
            }
        } else if fx > fy {
            let h2 = v9(xi + 1, yi);
            let h4 = v9(xi + 1, yi + 1);
            let h5 = v8(xi, yi);
            a = h2 + h4 - h5;
            b = h4 - h2;
            c = h5 - h4;
        } else {
            let h3 = v9(xi, yi + 1);
            let h4 = v9(xi + 1, yi + 1);
            let h5 = v8(xi, yi);
            a = h4 - h3;
            b = h3 + h4 - h5;
            c = h5 - h4;
        }

        a * fx + b * fy + c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    const HEADER_SIZE: u32 = 40;

    fn header(height_offset: u32, holes_offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(MAP_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(MAP_VERSION_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap(); // area offset
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(height_offset).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap(); // liquid offset
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(holes_offset).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out
    }

    fn height_header(out: &mut Vec<u8>, flags: u32, grid_height: f32, grid_max: f32) {
        out.write_u32::<LittleEndian>(MAP_HEIGHT_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(flags).unwrap();
        out.write_f32::<LittleEndian>(grid_height).unwrap();
        out.write_f32::<LittleEndian>(grid_max).unwrap();
    }

    /// Flat-height tile file
    pub fn flat_tile(height: f32) -> Vec<u8> {
        let mut out = header(HEADER_SIZE, 0);
        height_header(&mut out, HEIGHT_NO_HEIGHT, height, height);
        out
    }

    #[test]
    fn test_flat_tile() {
        let map = TerrainMap::load(&flat_tile(42.5)).unwrap();
        assert_eq!(map.height(0.0, 0.0), 42.5);
        assert_eq!(map.height(100.0, -250.0), 42.5);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = flat_tile(0.0);
        bytes[0] ^= 0xff;
        assert!(TerrainMap::load(&bytes).is_none());
    }

    #[test]
    fn test_float_grid_constant_surface() {
        let mut out = header(HEADER_SIZE, 0);
        height_header(&mut out, 0, 0.0, 0.0);
        for _ in 0..129 * 129 {
            out.write_f32::<LittleEndian>(7.0).unwrap();
        }
        // Center samples are stored halved.
        for _ in 0..128 * 128 {
            out.write_f32::<LittleEndian>(3.5).unwrap();
        }

        let map = TerrainMap::load(&out).unwrap();
        // A constant surface interpolates to the constant everywhere.
        for (x, y) in [(0.0, 0.0), (17.0, -123.0), (-333.3, 510.0)] {
            assert!((map.height(x, y) - 7.0).abs() < 1e-4, "at ({x}, {y})");
        }
    }

    #[test]
    fn test_u16_grid_applies_multiplier() {
        let mut out = header(HEADER_SIZE, 0);
        height_header(&mut out, HEIGHT_AS_INT16, 100.0, 165.535);
        // All samples at the full range land on grid_max.
        for _ in 0..129 * 129 {
            out.write_u16::<LittleEndian>(65535).unwrap();
        }
        for _ in 0..128 * 128 {
            out.write_u16::<LittleEndian>(65535 / 2).unwrap();
        }

        let map = TerrainMap::load(&out).unwrap();
        let h = map.height(10.0, 10.0);
        assert!((h - 165.535).abs() < 0.05, "h = {h}");
    }

    #[test]
    fn test_hole_returns_invalid_height() {
        let holes_offset = HEADER_SIZE;
        let height_offset = holes_offset + 16 * 16 * 2;
        let mut out = header(height_offset, holes_offset);
        // Punch every hole in the tile.
        for _ in 0..16 * 16 {
            out.write_u16::<LittleEndian>(0xffff).unwrap();
        }
        height_header(&mut out, 0, 0.0, 0.0);
        for _ in 0..129 * 129 {
            out.write_f32::<LittleEndian>(1.0).unwrap();
        }
        for _ in 0..128 * 128 {
            out.write_f32::<LittleEndian>(0.5).unwrap();
        }

        let map = TerrainMap::load(&out).unwrap();
        assert_eq!(map.height(10.0, 10.0), INVALID_HEIGHT);
        // The flat fallback is unaffected by holes.
        let flat = TerrainMap::load(&flat_tile(3.0)).unwrap();
        assert_eq!(flat.height(10.0, 10.0), 3.0);
    }
}
