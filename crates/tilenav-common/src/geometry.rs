//! 2D geometry operations for navigation mesh queries
//!
//! Everything here works on the XZ plane of a Y-up coordinate system; the Y
//! component is carried through only where a height needs interpolating.

/// Calculate twice the signed area of a 2D triangle on the XZ plane.
///
/// The sign indicates the winding order:
/// - Positive: clockwise (when looking down the Y axis)
/// - Negative: counter-clockwise
/// - Zero: degenerate (collinear points)
#[inline]
pub fn tri_area_2d(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// 2D perpendicular product on the XZ plane.
#[inline]
pub fn perp_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[2] * v[0] - u[0] * v[2]
}

/// Check if two axis-aligned bounding boxes overlap.
///
/// Boxes touching at a face count as overlapping.
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    for axis in 0..3 {
        if amin[axis] > bmax[axis] || bmin[axis] > amax[axis] {
            return false;
        }
    }
    true
}

/// Check if two quantized bounding boxes overlap.
///
/// Operates on the packed 16-bit tile-local coordinates stored in BV-tree
/// nodes, so the comparison stays in integer arithmetic.
#[inline]
pub fn overlap_quant_bounds(
    amin: &[u16; 3],
    amax: &[u16; 3],
    bmin: &[u16; 3],
    bmax: &[u16; 3],
) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Calculate the squared distance from a point to a segment on the XZ plane.
///
/// Returns the squared distance and the clamped parametric position of the
/// closest point along `a -> b`.
pub fn dist_pt_seg_sqr_2d(p: &[f32; 3], a: &[f32; 3], b: &[f32; 3]) -> (f32, f32) {
    let pqx = b[0] - a[0];
    let pqz = b[2] - a[2];
    let mut dx = p[0] - a[0];
    let mut dz = p[2] - a[2];

    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    dx = a[0] + t * pqx - p[0];
    dz = a[2] + t * pqz - p[2];

    (dx * dx + dz * dz, t)
}

/// Squared distance from a point to a segment in full 3D.
pub fn dist_pt_seg_sqr(p: &[f32; 3], a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ap = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    let d = ab[0] * ab[0] + ab[1] * ab[1] + ab[2] * ab[2];
    let mut t = ab[0] * ap[0] + ab[1] * ap[1] + ab[2] * ap[2];
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    let dx = a[0] + t * ab[0] - p[0];
    let dy = a[1] + t * ab[1] - p[1];
    let dz = a[2] + t * ab[2] - p[2];
    dx * dx + dy * dy + dz * dz
}

/// Point-in-polygon test with per-edge distances.
///
/// `verts` holds the polygon vertices as flat (x, y, z) triples. Returns
/// whether the point is inside on the XZ plane, and fills `edge_d`/`edge_t`
/// with the squared distance and parametric position for every edge
/// `(j, i)` where `j` precedes `i` in winding order.
pub fn dist_pt_poly_edges_sqr(
    pt: &[f32; 3],
    verts: &[f32],
    nverts: usize,
    edge_d: &mut [f32],
    edge_t: &mut [f32],
) -> bool {
    let mut inside = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi: &[f32; 3] = verts[i * 3..i * 3 + 3].try_into().unwrap();
        let vj: &[f32; 3] = verts[j * 3..j * 3 + 3].try_into().unwrap();
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        edge_d[j] = d;
        edge_t[j] = t;
        j = i;
    }
    inside
}

/// Point-in-convex-polygon test on the XZ plane.
pub fn point_in_polygon(pt: &[f32; 3], verts: &[f32], nverts: usize) -> bool {
    let mut inside = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = &verts[i * 3..];
        let vj = &verts[j * 3..];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Intersection of two 2D segments on the XZ plane.
///
/// Returns the parameters `(s, t)` along `ap->aq` and `bp->bq` when the
/// supporting lines intersect; `None` when they are parallel.
pub fn intersect_seg_seg_2d(
    ap: &[f32; 3],
    aq: &[f32; 3],
    bp: &[f32; 3],
    bq: &[f32; 3],
) -> Option<(f32, f32)> {
    let u = [aq[0] - ap[0], 0.0, aq[2] - ap[2]];
    let v = [bq[0] - bp[0], 0.0, bq[2] - bp[2]];
    let w = [ap[0] - bp[0], 0.0, ap[2] - bp[2]];

    let d = perp_2d(&u, &v);
    if d.abs() < 1e-6 {
        return None;
    }
    let s = perp_2d(&v, &w) / d;
    let t = perp_2d(&u, &w) / d;
    Some((s, t))
}

/// Clips a 2D segment against a convex polygon on the XZ plane.
///
/// Returns `(tmin, tmax, seg_min, seg_max)` — the entry/exit parameters
/// along `p0 -> p1` and the indices of the entering and exiting edges
/// (`-1` when the segment starts or ends inside). `None` when the segment
/// misses the polygon entirely.
pub fn intersect_segment_poly_2d(
    p0: &[f32; 3],
    p1: &[f32; 3],
    verts: &[f32],
    nverts: usize,
) -> Option<(f32, f32, i32, i32)> {
    const EPS: f32 = 0.000001;

    let mut tmin = 0.0;
    let mut tmax = 1.0;
    let mut seg_min = -1;
    let mut seg_max = -1;

    let dir = [p1[0] - p0[0], 0.0, p1[2] - p0[2]];

    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi: &[f32; 3] = verts[i * 3..i * 3 + 3].try_into().unwrap();
        let vj: &[f32; 3] = verts[j * 3..j * 3 + 3].try_into().unwrap();
        let edge = [vi[0] - vj[0], 0.0, vi[2] - vj[2]];
        let diff = [p0[0] - vj[0], 0.0, p0[2] - vj[2]];

        let n = perp_2d(&edge, &diff);
        let d = perp_2d(&dir, &edge);
        if d.abs() < EPS {
            // Segment runs parallel to this edge; outside means no hit.
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }

        let t = n / d;
        if d < 0.0 {
            // Entering across this edge.
            if t > tmin {
                tmin = t;
                seg_min = j as i32;
                if tmin > tmax {
                    return None;
                }
            }
        } else {
            // Leaving across this edge.
            if t < tmax {
                tmax = t;
                seg_max = j as i32;
                if tmax < tmin {
                    return None;
                }
            }
        }
        j = i;
    }

    Some((tmin, tmax, seg_min, seg_max))
}

/// Height of a point over a triangle, by barycentric projection on XZ.
///
/// Returns `None` when the point lies outside the triangle (within a small
/// tolerance at the edges).
pub fn closest_height_point_triangle(
    p: &[f32; 3],
    a: &[f32; 3],
    b: &[f32; 3],
    c: &[f32; 3],
) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    // Degenerate triangles get the vertex height.
    let denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];

    if denom < 0.0 {
        u = -u;
        v = -v;
    }
    let denom = denom.abs();

    // Inside the triangle when barycentric coordinates are non-negative.
    if u >= -EPS * denom && v >= -EPS * denom && u + v <= denom * (1.0 + EPS) {
        let u = u / denom;
        let v = v / denom;
        return Some(a[1] + v0[1] * u + v1[1] * v);
    }

    None
}
