//! Visitor interface for spatial polygon queries
//!
//! [`crate::NavMeshQuery::query_polygons`] walks the tiles touching a
//! search box and hands the overlapping polygons to a visitor in batches,
//! amortizing the dispatch cost over 32 polygons at a time.

use tilenav_common::vdist_sqr;

use crate::{MeshTile, NavMesh, Poly, PolyRef};

/// Receives batches of polygons touched by a search area.
///
/// `process` can be called several times for a single query.
pub trait PolyQuery {
    fn process(&mut self, tile: &MeshTile, polys: &[&Poly], refs: &[PolyRef]);
}

/// Collects polygon references up to a fixed capacity
pub struct CollectPolysQuery {
    polys: Vec<PolyRef>,
    max_polys: usize,
    overflow: bool,
}

impl CollectPolysQuery {
    pub fn new(max_polys: usize) -> Self {
        Self {
            polys: Vec::with_capacity(max_polys.min(1024)),
            max_polys,
            overflow: false,
        }
    }

    /// The collected polygon references
    pub fn polys(&self) -> &[PolyRef] {
        &self.polys
    }

    /// Consumes the query, returning the collected references
    pub fn into_polys(self) -> Vec<PolyRef> {
        self.polys
    }

    /// True when more polygons were available than fit
    pub fn overflowed(&self) -> bool {
        self.overflow
    }
}

impl PolyQuery for CollectPolysQuery {
    fn process(&mut self, _tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        let remaining = self.max_polys.saturating_sub(self.polys.len());
        if remaining < refs.len() {
            self.overflow = true;
            self.polys.extend_from_slice(&refs[..remaining]);
        } else {
            self.polys.extend_from_slice(refs);
        }
    }
}

/// Tracks the polygon nearest to a point across all visited batches.
///
/// A candidate directly over a polygon is scored by how far it is above
/// the walkable climb rather than by straight-line distance, so standing
/// slightly above a floor beats a closer wall face.
pub struct FindNearestPolyQuery<'a> {
    mesh: &'a NavMesh,
    center: [f32; 3],
    nearest_distance_sqr: f32,
    nearest_ref: PolyRef,
    nearest_point: [f32; 3],
    over_poly: bool,
}

impl<'a> FindNearestPolyQuery<'a> {
    pub fn new(mesh: &'a NavMesh, center: &[f32; 3]) -> Self {
        Self {
            mesh,
            center: *center,
            nearest_distance_sqr: f32::MAX,
            nearest_ref: PolyRef::NONE,
            nearest_point: [0.0; 3],
            over_poly: false,
        }
    }

    pub fn nearest_ref(&self) -> PolyRef {
        self.nearest_ref
    }

    pub fn nearest_point(&self) -> [f32; 3] {
        self.nearest_point
    }

    pub fn is_over_poly(&self) -> bool {
        self.over_poly
    }
}

impl PolyQuery for FindNearestPolyQuery<'_> {
    fn process(&mut self, tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        for &reference in refs {
            let Ok((closest, over_poly)) = self.mesh.closest_point_on_poly(reference, &self.center)
            else {
                continue;
            };

            let d = if over_poly {
                let climb = tile.header.as_ref().map_or(0.0, |h| h.walkable_climb);
                let dy = (self.center[1] - closest[1]).abs() - climb;
                if dy > 0.0 {
                    dy * dy
                } else {
                    0.0
                }
            } else {
                vdist_sqr(&self.center, &closest)
            };

            if d < self.nearest_distance_sqr {
                self.nearest_distance_sqr = d;
                self.nearest_ref = reference;
                self.nearest_point = closest;
                self.over_poly = over_poly;
            }
        }
    }
}
