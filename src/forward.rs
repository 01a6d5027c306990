//! Forward and Backward: total probability over all paths, in integer log space.
use crate::alphabet::DigitalSeq;
use crate::dptable::*;
use crate::logsum::*;
use crate::profile::*;

#[inline]
fn logsum4(a: i32, b: i32, c: i32, d: i32) -> i32 {
    ilogsum(ilogsum(a, b), ilogsum(c, d))
}

/// Fill `mx` with the Forward recursion and return the total in scaled units.
pub fn forward_fill(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> i32 {
    let (l, m) = (dsq.len(), profile.m);
    let (tsc, xsc) = (&profile.tsc, &profile.xsc);
    mx.resize(l + 1, m);
    mx.clear_row(0);
    *mx.xmx_mut(0, XMN) = 0;
    *mx.xmx_mut(0, XMB) = xsc[XTN][MOVE];
    for i in 1..=l {
        let x = dsq[i] as usize;
        *mx.mmx_mut(i, 0) = NEG_INF;
        *mx.imx_mut(i, 0) = NEG_INF;
        *mx.dmx_mut(i, 0) = NEG_INF;
        let b_prev = mx.xmx(i - 1, XMB);
        for k in 1..=m {
            let sc = logsum4(
                sadd(mx.mmx(i - 1, k - 1), tsc[TMM][k - 1]),
                sadd(mx.imx(i - 1, k - 1), tsc[TIM][k - 1]),
                sadd(b_prev, profile.bsc[k]),
                sadd(mx.dmx(i - 1, k - 1), tsc[TDM][k - 1]),
            );
            *mx.mmx_mut(i, k) = sadd(sc, profile.msc[x][k]);
            *mx.dmx_mut(i, k) = ilogsum(
                sadd(mx.mmx(i, k - 1), tsc[TMD][k - 1]),
                sadd(mx.dmx(i, k - 1), tsc[TDD][k - 1]),
            );
            *mx.imx_mut(i, k) = if k < m {
                let sc = ilogsum(
                    sadd(mx.mmx(i - 1, k), tsc[TMI][k]),
                    sadd(mx.imx(i - 1, k), tsc[TII][k]),
                );
                sadd(sc, profile.isc[x][k])
            } else {
                NEG_INF
            };
        }
        let e = (1..=m).fold(NEG_INF, |acc, k| {
            ilogsum(acc, sadd(mx.mmx(i, k), profile.esc[k]))
        });
        let n = sadd(mx.xmx(i - 1, XMN), xsc[XTN][LOOP]);
        let j = ilogsum(
            sadd(mx.xmx(i - 1, XMJ), xsc[XTJ][LOOP]),
            sadd(e, xsc[XTE][LOOP]),
        );
        let b = ilogsum(sadd(n, xsc[XTN][MOVE]), sadd(j, xsc[XTJ][MOVE]));
        let c = ilogsum(
            sadd(mx.xmx(i - 1, XMC), xsc[XTC][LOOP]),
            sadd(e, xsc[XTE][MOVE]),
        );
        *mx.xmx_mut(i, XME) = e;
        *mx.xmx_mut(i, XMN) = n;
        *mx.xmx_mut(i, XMJ) = j;
        *mx.xmx_mut(i, XMB) = b;
        *mx.xmx_mut(i, XMC) = c;
    }
    sadd(mx.xmx(l, XMC), xsc[XTC][MOVE])
}

/// Forward score in bits.
pub fn forward(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> f32 {
    scorify(forward_fill(profile, dsq, mx))
}

/// Forward score in bits using only two rows of main-state memory.
pub fn forward_score(profile: &Profile, dsq: &DigitalSeq) -> f32 {
    let (l, m) = (dsq.len(), profile.m);
    let (tsc, xsc) = (&profile.tsc, &profile.xsc);
    let mut mx = DpMatrix::new(2, m);
    mx.clear_row(0);
    *mx.xmx_mut(0, XMN) = 0;
    *mx.xmx_mut(0, XMB) = xsc[XTN][MOVE];
    for i in 1..=l {
        let (cur, prv) = (i % 2, (i + 1) % 2);
        let x = dsq[i] as usize;
        *mx.mmx_mut(cur, 0) = NEG_INF;
        *mx.imx_mut(cur, 0) = NEG_INF;
        *mx.dmx_mut(cur, 0) = NEG_INF;
        let b_prev = mx.xmx(prv, XMB);
        for k in 1..=m {
            let sc = logsum4(
                sadd(mx.mmx(prv, k - 1), tsc[TMM][k - 1]),
                sadd(mx.imx(prv, k - 1), tsc[TIM][k - 1]),
                sadd(b_prev, profile.bsc[k]),
                sadd(mx.dmx(prv, k - 1), tsc[TDM][k - 1]),
            );
            *mx.mmx_mut(cur, k) = sadd(sc, profile.msc[x][k]);
            *mx.dmx_mut(cur, k) = ilogsum(
                sadd(mx.mmx(cur, k - 1), tsc[TMD][k - 1]),
                sadd(mx.dmx(cur, k - 1), tsc[TDD][k - 1]),
            );
            *mx.imx_mut(cur, k) = if k < m {
                let sc = ilogsum(
                    sadd(mx.mmx(prv, k), tsc[TMI][k]),
                    sadd(mx.imx(prv, k), tsc[TII][k]),
                );
                sadd(sc, profile.isc[x][k])
            } else {
                NEG_INF
            };
        }
        let e = (1..=m).fold(NEG_INF, |acc, k| {
            ilogsum(acc, sadd(mx.mmx(cur, k), profile.esc[k]))
        });
        let n = sadd(mx.xmx(prv, XMN), xsc[XTN][LOOP]);
        let j = ilogsum(
            sadd(mx.xmx(prv, XMJ), xsc[XTJ][LOOP]),
            sadd(e, xsc[XTE][LOOP]),
        );
        let b = ilogsum(sadd(n, xsc[XTN][MOVE]), sadd(j, xsc[XTJ][MOVE]));
        let c = ilogsum(
            sadd(mx.xmx(prv, XMC), xsc[XTC][LOOP]),
            sadd(e, xsc[XTE][MOVE]),
        );
        *mx.xmx_mut(cur, XME) = e;
        *mx.xmx_mut(cur, XMN) = n;
        *mx.xmx_mut(cur, XMJ) = j;
        *mx.xmx_mut(cur, XMB) = b;
        *mx.xmx_mut(cur, XMC) = c;
    }
    scorify(sadd(mx.xmx(l % 2, XMC), xsc[XTC][MOVE]))
}

/// Fill `mx` with the Backward recursion and return the total in scaled units.
///
/// Cell (i, s) holds the score of everything after state s at row i. The
/// state's own emission is excluded, so forward + backward - total is the
/// posterior of the state emitting residue i.
pub fn backward_fill(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> i32 {
    let (l, m) = (dsq.len(), profile.m);
    let (tsc, xsc) = (&profile.tsc, &profile.xsc);
    mx.resize(l + 1, m);
    mx.clear_row(l);
    // Row L: only C->T and what leads into it remain.
    *mx.xmx_mut(l, XMC) = xsc[XTC][MOVE];
    *mx.xmx_mut(l, XME) = sadd(xsc[XTC][MOVE], xsc[XTE][MOVE]);
    if l > 0 {
        let e = mx.xmx(l, XME);
        *mx.mmx_mut(l, m) = sadd(e, profile.esc[m]);
        for k in (1..m).rev() {
            *mx.mmx_mut(l, k) = ilogsum(
                sadd(e, profile.esc[k]),
                sadd(mx.dmx(l, k + 1), tsc[TMD][k]),
            );
            *mx.dmx_mut(l, k) = sadd(mx.dmx(l, k + 1), tsc[TDD][k]);
        }
    }
    for i in (0..l).rev() {
        let x = dsq[i + 1] as usize;
        mx.clear_row(i);
        let b = (1..=m).fold(NEG_INF, |acc, k| {
            ilogsum(
                acc,
                sadd3(mx.mmx(i + 1, k), profile.bsc[k], profile.msc[x][k]),
            )
        });
        let j = ilogsum(
            sadd(mx.xmx(i + 1, XMJ), xsc[XTJ][LOOP]),
            sadd(b, xsc[XTJ][MOVE]),
        );
        let c = sadd(mx.xmx(i + 1, XMC), xsc[XTC][LOOP]);
        let e = ilogsum(sadd(j, xsc[XTE][LOOP]), sadd(c, xsc[XTE][MOVE]));
        let n = ilogsum(
            sadd(mx.xmx(i + 1, XMN), xsc[XTN][LOOP]),
            sadd(b, xsc[XTN][MOVE]),
        );
        *mx.xmx_mut(i, XMB) = b;
        *mx.xmx_mut(i, XMJ) = j;
        *mx.xmx_mut(i, XMC) = c;
        *mx.xmx_mut(i, XME) = e;
        *mx.xmx_mut(i, XMN) = n;
        // No main state sits at row 0.
        if i == 0 {
            continue;
        }
        *mx.mmx_mut(i, m) = sadd(e, profile.esc[m]);
        for k in (1..m).rev() {
            let next_m = sadd(mx.mmx(i + 1, k + 1), profile.msc[x][k + 1]);
            let next_i = sadd(mx.imx(i + 1, k), profile.isc[x][k]);
            *mx.dmx_mut(i, k) = ilogsum(
                sadd(next_m, tsc[TDM][k]),
                sadd(mx.dmx(i, k + 1), tsc[TDD][k]),
            );
            *mx.imx_mut(i, k) = ilogsum(sadd(next_m, tsc[TIM][k]), sadd(next_i, tsc[TII][k]));
            *mx.mmx_mut(i, k) = logsum4(
                sadd(next_m, tsc[TMM][k]),
                sadd(next_i, tsc[TMI][k]),
                sadd(e, profile.esc[k]),
                sadd(mx.dmx(i, k + 1), tsc[TMD][k]),
            );
        }
    }
    mx.xmx(0, XMN)
}

/// Backward score in bits.
pub fn backward(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> f32 {
    scorify(backward_fill(profile, dsq, mx))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::gen_seq::*;
    use crate::viterbi::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn forward_bounds_viterbi() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(310);
        let abc = Alphabet::dna();
        let mut fwd = DpMatrix::new(0, 0);
        let mut vit = DpMatrix::new(0, 0);
        for mode in [AlignMode::Glocal, AlignMode::default()] {
            for _ in 0..20 {
                let (model, prof) = random_model_profile(&mut rng, &abc, 10, mode);
                let seq = sample_with_flanks(&model, &mut rng, 8);
                let dsq = abc.digitize(&seq).unwrap();
                let f = forward_fill(&prof, &dsq, &mut fwd);
                let v = viterbi_fill(&prof, &dsq, &mut vit);
                assert!(f >= v, "{} < {}", f, v);
                let random = abc.digitize(&generate_seq(&mut rng, &abc, 30)).unwrap();
                let f = forward_fill(&prof, &random, &mut fwd);
                let v = viterbi_fill(&prof, &random, &mut vit);
                assert!(f >= v, "{} < {}", f, v);
            }
        }
    }
    #[test]
    fn two_row_forward_matches_full() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(311);
        let abc = Alphabet::amino();
        let mut mx = DpMatrix::new(0, 0);
        for _ in 0..10 {
            let (model, prof) = random_model_profile(&mut rng, &abc, 20, AlignMode::default());
            let dsq = abc.digitize(&sample_with_flanks(&model, &mut rng, 10)).unwrap();
            assert_eq!(forward(&prof, &dsq, &mut mx), forward_score(&prof, &dsq));
        }
    }
    #[test]
    fn backward_agrees_with_forward() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(312);
        let abc = Alphabet::dna();
        let mut fwd = DpMatrix::new(0, 0);
        let mut bck = DpMatrix::new(0, 0);
        for mode in [AlignMode::Global, AlignMode::Glocal, AlignMode::default()] {
            for _ in 0..10 {
                let (model, prof) = random_model_profile(&mut rng, &abc, 12, mode);
                let seq = match mode {
                    AlignMode::Global => sample_domain(&model, &mut rng),
                    _ => sample_with_flanks(&model, &mut rng, 6),
                };
                let dsq = abc.digitize(&seq).unwrap();
                let f = forward(&prof, &dsq, &mut fwd);
                let b = backward(&prof, &dsq, &mut bck);
                assert!(f.is_finite());
                assert!((f - b).abs() < 0.5, "{} vs {}", f, b);
            }
        }
    }
}
