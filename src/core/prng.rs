// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives node placement, drift, propagation jitter and packet spawning so a
// seeded engine replays identically.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Derive a stream from a base seed and a set of salts.
    ///
    /// Used for rebuilds: the same (seed, width, height, level) always yields
    /// the same graph.
    pub fn derived(seed: u64, salts: &[u64]) -> Self {
        let mut h = seed ^ 0x9E3779B97F4A7C15;
        for &s in salts {
            // splitmix64 finaliser per salt.
            h = h.wrapping_add(s).wrapping_add(0x9E3779B97F4A7C15);
            h = (h ^ (h >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
            h = (h ^ (h >> 27)).wrapping_mul(0x94D049BB133111EB);
            h ^= h >> 31;
        }
        Self::new(h)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        unit_f32(self.next_u32())
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        let x = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        low + (high - low) * x
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u32;
        let v = self.next_u32() % span;
        low + v as usize
    }

    /// True with probability `p` (clamped to [0,1]).
    #[inline]
    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32_01() < p.clamp(0.0, 1.0)
    }
}

/// Map to [0,1). Only the top 24 bits are kept so the value is exact in an
/// f32 and never rounds up to 1.
#[inline]
fn unit_f32(x: u32) -> f32 {
    (x >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn derived_streams_depend_on_salts() {
        let mut a = Prng::derived(1, &[800, 600, 0]);
        let mut b = Prng::derived(1, &[800, 600, 0]);
        let mut c = Prng::derived(1, &[800, 600, 1]);
        let xa = a.next_u32();
        assert_eq!(xa, b.next_u32());
        assert_ne!(xa, c.next_u32());
    }

    #[test]
    fn ranges_stay_in_bounds() {
        let mut rng = Prng::new(3);
        for _ in 0..1000 {
            let f = rng.gen_range_f32(-2.0, 5.0);
            assert!((-2.0..5.0).contains(&f));
            let d = rng.gen_range_f64(40.0, 220.0);
            assert!((40.0..220.0).contains(&d));
            let u = rng.gen_range_usize(3, 9);
            assert!((3..9).contains(&u));
        }
        assert_eq!(rng.gen_range_usize(4, 4), 4);
    }

    #[test]
    fn unit_float_excludes_one() {
        assert_eq!(unit_f32(0), 0.0);
        assert!(unit_f32(u32::MAX) < 1.0);
        assert!(unit_f32(u32::MAX - 127) < 1.0);
        // high end of a range stays exclusive
        assert!(5.0 * unit_f32(u32::MAX) < 5.0);
    }
}
