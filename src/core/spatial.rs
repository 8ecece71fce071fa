//! Uniform grid over the 2D plane for neighbour queries.
//!
//! The grid is derived state: it is cleared and repopulated from node
//! positions every tick and never patched incrementally. Buckets store the
//! position alongside the id so queries can filter by exact distance without
//! going back to the node array.

use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn dist_sq(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[inline]
    pub fn dist(self, other: Vec2) -> f32 {
        self.dist_sq(other).sqrt()
    }

    #[inline]
    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        Vec2::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Point on the quadratic Bézier `a → ctrl → b` at `t`.
#[inline]
pub fn quad_point(a: Vec2, ctrl: Vec2, b: Vec2, t: f32) -> Vec2 {
    let t = t.clamp(0.0, 1.0);
    let u = 1.0 - t;
    Vec2::new(
        u * u * a.x + 2.0 * u * t * ctrl.x + t * t * b.x,
        u * u * a.y + 2.0 * u * t * ctrl.y + t * t * b.y,
    )
}

#[derive(Debug, Clone, Copy)]
struct GridEntry {
    id: usize,
    pos: Vec2,
}

/// Result of a proximity query: node id and exact distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub dist: f32,
}

pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<GridEntry>>,
    len: usize,
}

impl SpatialGrid {
    /// `cell_size` should equal the largest connection search radius.
    /// Non-positive or non-finite sizes are clamped to 1.
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size >= 1.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cell coordinates saturate at the `i32` range, so far-away points share
    /// the edge cells instead of overflowing.
    #[inline]
    fn cell_of(&self, p: Vec2) -> (i32, i32) {
        (
            cell_coord(p.x, self.cell_size),
            cell_coord(p.y, self.cell_size),
        )
    }

    /// Clear and repopulate from `(id, position)` pairs. O(n).
    pub fn rebuild<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = (usize, Vec2)>,
    {
        // Keep bucket allocations; drop empty buckets so the map doesn't grow
        // with every cell a drifting node ever visited.
        self.cells.retain(|_, bucket| {
            let keep = !bucket.is_empty();
            bucket.clear();
            keep
        });
        self.len = 0;

        for (id, pos) in points {
            let cell = self.cell_of(pos);
            self.cells.entry(cell).or_default().push(GridEntry { id, pos });
            self.len += 1;
        }
    }

    /// Nodes within `radius` of `p` (inclusive), unordered.
    ///
    /// Scans the point's cell and its neighbours; a radius larger than the
    /// cell size widens the ring so results stay exact.
    pub fn query_near(&self, p: Vec2, radius: f32) -> Vec<Neighbor> {
        let mut out = Vec::new();
        self.for_each_near(p, radius, |n| out.push(n));
        out
    }

    pub fn for_each_near<F>(&self, p: Vec2, radius: f32, mut f: F)
    where
        F: FnMut(Neighbor),
    {
        if !(radius.is_finite() && radius >= 0.0) || !(p.x.is_finite() && p.y.is_finite()) {
            return;
        }
        let r2 = radius * radius;
        let mut visit = |bucket: &[GridEntry]| {
            for e in bucket {
                let d2 = e.pos.dist_sq(p);
                if d2 <= r2 {
                    f(Neighbor {
                        id: e.id,
                        dist: d2.sqrt(),
                    });
                }
            }
        };

        let span = ((radius / self.cell_size).ceil() as i64).max(1);
        let side = 2 * span as u128 + 1;
        // Probing more cells than are occupied costs more than a full scan.
        if side * side > self.cells.len() as u128 {
            for bucket in self.cells.values() {
                visit(bucket);
            }
            return;
        }

        let (cx, cy) = self.cell_of(p);
        let (x0, x1) = ring(cx, span);
        let (y0, y1) = ring(cy, span);
        for gy in y0..=y1 {
            for gx in x0..=x1 {
                if let Some(bucket) = self.cells.get(&(gx, gy)) {
                    visit(bucket);
                }
            }
        }
    }
}

#[inline]
fn cell_coord(v: f32, cell_size: f32) -> i32 {
    // Float-to-int `as` saturates; NaN maps to 0.
    (v / cell_size).floor() as i32
}

/// Inclusive cell range `c ± span`, clamped to the `i32` range.
#[inline]
fn ring(c: i32, span: i64) -> (i32, i32) {
    let lo = (c as i64 - span).max(i32::MIN as i64);
    let hi = (c as i64 + span).min(i32::MAX as i64);
    (lo as i32, hi as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    fn brute_force(points: &[(usize, Vec2)], p: Vec2, radius: f32) -> Vec<usize> {
        let mut ids: Vec<usize> = points
            .iter()
            .filter(|(_, q)| q.dist_sq(p) <= radius * radius)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn query_matches_brute_force_on_random_layouts() {
        let mut rng = Prng::new(0xA11CE);
        for round in 0..60 {
            let cell = rng.gen_range_f32(10.0, 120.0);
            let n = rng.gen_range_usize(0, 300);
            let points: Vec<(usize, Vec2)> = (0..n)
                .map(|i| {
                    (
                        i,
                        Vec2::new(rng.gen_range_f32(-50.0, 900.0), rng.gen_range_f32(-50.0, 700.0)),
                    )
                })
                .collect();

            let mut grid = SpatialGrid::new(cell);
            grid.rebuild(points.iter().copied());
            assert_eq!(grid.len(), n);

            for _ in 0..20 {
                let p = Vec2::new(rng.gen_range_f32(-80.0, 950.0), rng.gen_range_f32(-80.0, 750.0));
                // Mostly within the cell size, sometimes wider.
                let r = if round % 4 == 0 {
                    rng.gen_range_f32(0.0, cell * 3.0)
                } else {
                    rng.gen_range_f32(0.0, cell)
                };
                let mut got: Vec<usize> = grid.query_near(p, r).iter().map(|n| n.id).collect();
                got.sort_unstable();
                assert_eq!(got, brute_force(&points, p, r), "round {round} r {r}");
            }
        }
    }

    #[test]
    fn rebuild_replaces_previous_positions() {
        let mut grid = SpatialGrid::new(50.0);
        grid.rebuild([(0, Vec2::new(10.0, 10.0)), (1, Vec2::new(500.0, 500.0))]);
        assert_eq!(grid.query_near(Vec2::new(12.0, 12.0), 10.0).len(), 1);

        grid.rebuild([(0, Vec2::new(300.0, 300.0))]);
        assert!(grid.query_near(Vec2::new(12.0, 12.0), 10.0).is_empty());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn boundary_distance_is_inclusive() {
        let mut grid = SpatialGrid::new(50.0);
        grid.rebuild([(7, Vec2::new(50.0, 0.0))]);
        let hits = grid.query_near(Vec2::new(0.0, 0.0), 50.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 7);
        assert_eq!(hits[0].dist, 50.0);
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        let mut grid = SpatialGrid::new(-4.0);
        assert_eq!(grid.cell_size(), 1.0);
        grid.rebuild([(0, Vec2::new(0.0, 0.0))]);
        assert!(grid.query_near(Vec2::new(0.0, 0.0), f32::NAN).is_empty());
        assert!(grid.query_near(Vec2::new(f32::INFINITY, 0.0), 5.0).is_empty());
    }

    #[test]
    fn far_points_saturate_instead_of_overflowing() {
        let mut grid = SpatialGrid::new(8.0);
        let far = Vec2::new(1e12, 10.0);
        // Enough occupied cells that the query probes its ring, not every bucket.
        let filler = (0..100).map(|i| (10 + i, Vec2::new(i as f32 * 20.0, 0.0)));
        grid.rebuild(
            [
                (0, far),
                (1, Vec2::new(1e12, 13.0)),
                (2, Vec2::new(-1e12, -1e12)),
            ]
            .into_iter()
            .chain(filler),
        );

        let mut ids: Vec<usize> = grid.query_near(far, 5.0).iter().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);

        let ids: Vec<usize> = grid
            .query_near(Vec2::new(-1e12, -1e12), 1.0)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn huge_radius_scans_occupied_cells() {
        let mut rng = Prng::new(5);
        let points: Vec<(usize, Vec2)> = (0..200)
            .map(|i| (i, Vec2::new(rng.gen_range_f32(0.0, 800.0), rng.gen_range_f32(0.0, 600.0))))
            .collect();
        let mut grid = SpatialGrid::new(8.0);
        grid.rebuild(points.iter().copied());

        let p = Vec2::new(400.0, 300.0);
        for radius in [10_000.0, 1e12, f32::MAX] {
            let mut got: Vec<usize> = grid.query_near(p, radius).iter().map(|n| n.id).collect();
            got.sort_unstable();
            assert_eq!(got, brute_force(&points, p, radius));
        }
    }

    #[test]
    fn quad_point_hits_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let c = Vec2::new(5.0, 10.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(quad_point(a, c, b, 0.0), a);
        assert_eq!(quad_point(a, c, b, 1.0), b);
        assert_eq!(quad_point(a, c, b, 0.5), Vec2::new(5.0, 5.0));
    }
}
