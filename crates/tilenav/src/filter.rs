//! Polygon filtering and traversal costs
//!
//! A filter decides which polygons a query may enter and what crossing
//! them costs. The default accepts every flagged polygon and prices travel
//! at distance times the area cost.

use tilenav_common::vdist;

use crate::{MeshTile, Poly, PolyFlags, PolyRef, MAX_AREAS};

/// Configurable polygon predicate and cost function.
///
/// A polygon passes when it shares at least one include flag and no
/// exclude flag. Area costs below 1.0 can make the A* heuristic
/// inadmissible; keep them at or above 1.0 unless shorter-than-distance
/// costs are intended.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    include_flags: PolyFlags,
    exclude_flags: PolyFlags,
    area_cost: [f32; MAX_AREAS],
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::ALL,
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; MAX_AREAS],
        }
    }
}

impl QueryFilter {
    /// Creates the default filter: all flags included, none excluded,
    /// every area cost 1.0
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags a polygon must share at least one of to pass
    pub fn include_flags(&self) -> PolyFlags {
        self.include_flags
    }

    pub fn set_include_flags(&mut self, flags: PolyFlags) {
        self.include_flags = flags;
    }

    /// Flags that reject a polygon outright
    pub fn exclude_flags(&self) -> PolyFlags {
        self.exclude_flags
    }

    pub fn set_exclude_flags(&mut self, flags: PolyFlags) {
        self.exclude_flags = flags;
    }

    /// Traversal cost multiplier for the given area id
    pub fn area_cost(&self, area: u8) -> f32 {
        self.area_cost[area as usize]
    }

    /// Sets the traversal cost multiplier for the given area id
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if (area as usize) < MAX_AREAS {
            self.area_cost[area as usize] = cost;
        }
    }

    /// Returns true when the polygon may be visited
    #[inline]
    pub fn pass_filter(&self, _reference: PolyRef, _tile: &MeshTile, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    /// Cost of moving from `pa` to `pb` across the current polygon.
    ///
    /// The previous and next polygons give context for richer cost models;
    /// the default uses only the current polygon's area.
    #[inline]
    pub fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        _prev: Option<(&MeshTile, &Poly)>,
        cur: (&MeshTile, &Poly),
        _next: Option<(&MeshTile, &Poly)>,
    ) -> f32 {
        vdist(pa, pb) * self.area_cost[cur.1.area as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolyType;

    fn walk_poly() -> Poly {
        Poly::new(0, PolyType::Ground, PolyFlags::WALK)
    }

    #[test]
    fn test_default_filter_accepts_flagged_polys() {
        let filter = QueryFilter::default();
        let tile = MeshTile::default();
        assert!(filter.pass_filter(PolyRef::new(1), &tile, &walk_poly()));

        // A polygon with no flags at all never passes.
        let bare = Poly::new(0, PolyType::Ground, PolyFlags::empty());
        assert!(!filter.pass_filter(PolyRef::new(1), &tile, &bare));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let mut filter = QueryFilter::default();
        filter.set_exclude_flags(PolyFlags::WALK);
        let tile = MeshTile::default();
        assert!(!filter.pass_filter(PolyRef::new(1), &tile, &walk_poly()));

        filter.set_exclude_flags(PolyFlags::empty());
        filter.set_include_flags(PolyFlags::SWIM);
        assert!(!filter.pass_filter(PolyRef::new(1), &tile, &walk_poly()));
    }

    #[test]
    fn test_cost_scales_with_area() {
        let mut filter = QueryFilter::default();
        filter.set_area_cost(3, 2.5);

        let tile = MeshTile::default();
        let mut poly = walk_poly();
        poly.area = 3;

        let a = [0.0, 0.0, 0.0];
        let b = [4.0, 0.0, 0.0];
        let cost = filter.get_cost(&a, &b, None, (&tile, &poly), None);
        assert!((cost - 10.0).abs() < 1e-5);

        // Out-of-range area ids are ignored on write.
        filter.set_area_cost(200, 9.0);
        assert_eq!(filter.area_cost(3), 2.5);
    }
}
