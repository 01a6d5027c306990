//! Integer log-space arithmetic.
//!
//! Every score in the DP engine is a scaled log2-odds ratio stored in an `i32`:
//! `round(INTSCALE * log2(p / null))`. Probability zero is the sentinel [`NEG_INF`].
//! Additions go through [`sadd`], which keeps the sentinel absorbing, and
//! probability sums go through [`ilogsum`], which looks up the correction term
//! `log2(1 + 2^-d)` in a table built on first use.
use std::sync::OnceLock;

/// Fixed-point scale of the scores. One bit is `INTSCALE` units.
pub const INTSCALE: f32 = 1000.0;
/// `INTSCALE` as an integer score offset.
pub const INTSCALE_I: i32 = 1000;
/// Log of probability zero.
pub const NEG_INF: i32 = -987_654_321;
/// Size of the logsum correction table. Past this difference the correction is below rounding.
const LOGSUM_TBL: usize = 20_000;

fn logsum_table() -> &'static [i32] {
    static TABLE: OnceLock<Vec<i32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let scale = INTSCALE as f64;
        (0..LOGSUM_TBL)
            .map(|i| {
                let correction = (1f64 + 2f64.powf(-(i as f64) / scale)).log2();
                (scale * correction).round() as i32
            })
            .collect()
    })
}

/// Saturating score addition. Any operand at or below `NEG_INF` yields `NEG_INF`.
#[inline]
pub fn sadd(a: i32, b: i32) -> i32 {
    if a <= NEG_INF || b <= NEG_INF {
        NEG_INF
    } else {
        a.saturating_add(b).max(NEG_INF)
    }
}

/// Saturating sum of three scores.
#[inline]
pub fn sadd3(a: i32, b: i32, c: i32) -> i32 {
    sadd(sadd(a, b), c)
}

/// Approximate `log2(2^a + 2^b)` in scaled integer space.
/// Never smaller than `max(a, b)`, so sums dominate maxima.
#[inline]
pub fn ilogsum(p1: i32, p2: i32) -> i32 {
    let (max, min) = if p1 > p2 { (p1, p2) } else { (p2, p1) };
    if max <= NEG_INF {
        return NEG_INF;
    }
    if min <= NEG_INF {
        return max;
    }
    let diff = (max as i64 - min as i64) as usize;
    if diff >= LOGSUM_TBL {
        max
    } else {
        max.saturating_add(logsum_table()[diff])
    }
}

/// Convert a probability into a scaled log-odds score against `null`.
pub fn prob2score(p: f32, null: f32) -> i32 {
    if p <= 0.0 || null <= 0.0 {
        return NEG_INF;
    }
    let sc = (0.5 + INTSCALE as f64 * (p as f64 / null as f64).log2()).floor();
    (sc as i32).max(NEG_INF + 1)
}

/// Inverse of [`prob2score`].
pub fn score2prob(sc: i32, null: f32) -> f32 {
    if sc <= NEG_INF {
        0.0
    } else {
        null * 2f32.powf(sc as f32 / INTSCALE)
    }
}

/// Convert a scaled score into bits. `NEG_INF` maps to negative infinity.
pub fn scorify(sc: i32) -> f32 {
    if sc <= NEG_INF {
        f32::NEG_INFINITY
    } else {
        sc as f32 / INTSCALE
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn sentinel_absorbs() {
        assert_eq!(sadd(NEG_INF, 1_000_000), NEG_INF);
        assert_eq!(sadd(-5, NEG_INF), NEG_INF);
        assert_eq!(sadd(NEG_INF + 10, -20), NEG_INF);
        assert_eq!(sadd(3, 4), 7);
        assert_eq!(sadd3(1, 2, 3), 6);
    }
    #[test]
    fn logsum_dominates_max() {
        assert_eq!(ilogsum(NEG_INF, NEG_INF), NEG_INF);
        assert_eq!(ilogsum(NEG_INF, 42), 42);
        assert_eq!(ilogsum(-42, NEG_INF), -42);
        // Equal inputs: log2(2) = one bit.
        assert_eq!(ilogsum(0, 0), INTSCALE_I);
        for (a, b) in [(0, -1), (-300, 1200), (5000, -18000), (0, -25000)] {
            assert!(ilogsum(a, b) >= a.max(b));
            assert_eq!(ilogsum(a, b), ilogsum(b, a));
        }
        let exact = ((2f64.powf(1.2) + 2f64.powf(-0.3)).log2() * 1000.0).round() as i32;
        assert!((ilogsum(1200, -300) - exact).abs() <= 1);
    }
    #[test]
    fn prob_score_conversion() {
        assert_eq!(prob2score(0.0, 0.25), NEG_INF);
        assert_eq!(prob2score(0.25, 0.25), 0);
        assert_eq!(prob2score(0.5, 0.25), 1000);
        assert_eq!(prob2score(0.125, 0.25), -1000);
        assert!((score2prob(1000, 0.25) - 0.5).abs() < 1e-6);
        assert_eq!(score2prob(NEG_INF, 0.25), 0.0);
        assert_eq!(scorify(1500), 1.5);
        assert_eq!(scorify(NEG_INF), f32::NEG_INFINITY);
    }
}
