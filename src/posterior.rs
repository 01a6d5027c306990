//! Posterior decoding and optimal-accuracy alignment.
//!
//! The posterior matrix holds, in scaled log space, the probability that a state
//! emitted residue i. Optimal accuracy then runs the Viterbi recursion over
//! posterior mass instead of log-odds, which maximizes the expected number of
//! correctly aligned residues.
use crate::dptable::*;
use crate::logsum::*;
use crate::profile::*;
use crate::trace::Trace;
use crate::viterbi::{fill, traceback, ScoreSystem, Span};

/// Fill `post` from a Forward and a Backward matrix over the same `l` residues.
/// `total` is the Forward score in scaled units. Only emitting states get a value:
/// M, I and the N, C, J loops. Everything else is `NEG_INF`, and so is every
/// cell when `total` is `NEG_INF`.
pub fn posterior(
    profile: &Profile,
    fwd: &DpMatrix,
    bck: &DpMatrix,
    l: usize,
    total: i32,
    post: &mut DpMatrix,
) {
    let m = profile.m;
    post.resize(l + 1, m);
    post.clear_row(0);
    if total <= NEG_INF {
        (1..=l).for_each(|i| post.clear_row(i));
        return;
    }
    let odds = |f: i32, b: i32| sadd(sadd(f, b), -total);
    for i in 1..=l {
        post.clear_row(i);
        for k in 1..=m {
            *post.mmx_mut(i, k) = odds(fwd.mmx(i, k), bck.mmx(i, k));
            if k < m {
                *post.imx_mut(i, k) = odds(fwd.imx(i, k), bck.imx(i, k));
            }
        }
        for (s, x) in [(XMN, XTN), (XMC, XTC), (XMJ, XTJ)] {
            let f = sadd(fwd.xmx(i - 1, s), profile.xsc[x][LOOP]);
            *post.xmx_mut(i, s) = odds(f, bck.xmx(i, s));
        }
    }
}

/// Posterior as a probability.
pub fn posterior_prob(sc: i32) -> f32 {
    score2prob(sc, 1f32).min(1f32)
}

// Posterior mass scaled to INTSCALE, or NEG_INF where the state is impossible.
fn mass(sc: i32) -> i32 {
    if sc <= NEG_INF {
        NEG_INF
    } else {
        (posterior_prob(sc) * INTSCALE).round() as i32
    }
}

/// Posterior mass as a score system: emissions are posterior probabilities, and a
/// transition is free where the profile allows it and forbidden where it does not.
struct Accuracy<'a> {
    profile: &'a Profile,
    post: &'a DpMatrix,
    l: usize,
}

impl<'a> Accuracy<'a> {
    fn gate(sc: i32) -> i32 {
        if sc > NEG_INF {
            0
        } else {
            NEG_INF
        }
    }
}

impl<'a> ScoreSystem for Accuracy<'a> {
    fn nodes(&self) -> usize {
        self.profile.m
    }
    fn rows(&self) -> usize {
        self.l
    }
    fn msc(&self, i: usize, k: usize) -> i32 {
        mass(self.post.mmx(i, k))
    }
    fn isc(&self, i: usize, k: usize) -> i32 {
        mass(self.post.imx(i, k))
    }
    fn tsc(&self, t: usize, k: usize) -> i32 {
        Self::gate(self.profile.tsc[t][k])
    }
    fn bsc(&self, k: usize) -> i32 {
        Self::gate(self.profile.bsc[k])
    }
    fn esc(&self, k: usize) -> i32 {
        Self::gate(self.profile.esc[k])
    }
    fn xsc(&self, x: usize, t: usize) -> i32 {
        Self::gate(self.profile.xsc[x][t])
    }
    fn xemit(&self, i: usize, s: usize) -> i32 {
        mass(self.post.xmx(i, s))
    }
    fn unfold_begin(&self, k: usize) -> bool {
        self.profile.unfold_begin(k)
    }
    fn unfold_end(&self, k: usize) -> bool {
        self.profile.unfold_end(k)
    }
}

/// Fill `oa` with the optimal-accuracy recursion over `post` and return the
/// expected number of correctly aligned residues.
pub fn optimal_accuracy(
    profile: &Profile,
    post: &DpMatrix,
    l: usize,
    oa: &mut DpMatrix,
) -> f32 {
    let sys = Accuracy { profile, post, l };
    let sc = fill(&sys, oa, Span::Full);
    if sc <= NEG_INF {
        f32::NEG_INFINITY
    } else {
        sc as f32 / INTSCALE
    }
}

/// Traceback of a matrix filled by [`optimal_accuracy`].
pub fn optimal_accuracy_trace(
    profile: &Profile,
    post: &DpMatrix,
    oa: &DpMatrix,
    l: usize,
) -> Option<Trace> {
    traceback(&Accuracy { profile, post, l }, oa, Span::Full)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::forward::*;
    use crate::gen_seq::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn rows_sum_to_one() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(520);
        let abc = Alphabet::dna();
        let mut fwd = DpMatrix::new(0, 0);
        let mut bck = DpMatrix::new(0, 0);
        let mut post = DpMatrix::new(0, 0);
        for _ in 0..10 {
            let (model, prof) = random_model_profile(&mut rng, &abc, 10, AlignMode::default());
            let dsq = abc.digitize(&sample_with_flanks(&model, &mut rng, 5)).unwrap();
            let l = dsq.len();
            let total = forward_fill(&prof, &dsq, &mut fwd);
            backward_fill(&prof, &dsq, &mut bck);
            posterior(&prof, &fwd, &bck, l, total, &mut post);
            for i in 1..=l {
                let main: f32 = (1..=prof.m)
                    .map(|k| posterior_prob(post.mmx(i, k)) + posterior_prob(post.imx(i, k)))
                    .sum();
                let flank: f32 = [XMN, XMC, XMJ]
                    .iter()
                    .map(|&s| posterior_prob(post.xmx(i, s)))
                    .sum();
                assert!((main + flank - 1f32).abs() < 0.05, "row {}: {}", i, main + flank);
                assert_eq!(post.xmx(i, XMB), NEG_INF);
                assert_eq!(post.xmx(i, XME), NEG_INF);
                assert_eq!(post.imx(i, prof.m), NEG_INF);
            }
        }
    }
    #[test]
    fn optimal_accuracy_traces() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(521);
        let abc = Alphabet::amino();
        let (mut fwd, mut bck, mut post, mut oa) = (
            DpMatrix::new(0, 0),
            DpMatrix::new(0, 0),
            DpMatrix::new(0, 0),
            DpMatrix::new(0, 0),
        );
        for mode in [AlignMode::Glocal, AlignMode::default()] {
            for _ in 0..10 {
                let (model, prof) = random_model_profile(&mut rng, &abc, 15, mode);
                let dsq = abc.digitize(&sample_with_flanks(&model, &mut rng, 7)).unwrap();
                let l = dsq.len();
                let total = forward_fill(&prof, &dsq, &mut fwd);
                backward_fill(&prof, &dsq, &mut bck);
                posterior(&prof, &fwd, &bck, l, total, &mut post);
                let acc = optimal_accuracy(&prof, &post, l, &mut oa);
                assert!(acc > 0f32 && acc <= l as f32 + 0.01, "{} of {}", acc, l);
                let tr = optimal_accuracy_trace(&prof, &post, &oa, l).unwrap();
                if let Err(why) = tr.validate(prof.m, l) {
                    panic!("{}\n{}", why, tr);
                }
            }
        }
    }
    #[test]
    fn unalignable_sequence_has_no_posterior() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(522);
        let abc = Alphabet::dna();
        let mut prof = random_profile(&mut rng, &abc, 6, AlignMode::default());
        prof.msc[2].iter_mut().for_each(|x| *x = NEG_INF);
        prof.isc[2].iter_mut().for_each(|x| *x = NEG_INF);
        let mut fwd = DpMatrix::new(0, 0);
        let mut bck = DpMatrix::new(0, 0);
        let mut post = DpMatrix::new(0, 0);
        // Leave finite values behind first.
        let dsq = abc.digitize(b"ACTTA").unwrap();
        let total = forward_fill(&prof, &dsq, &mut fwd);
        backward_fill(&prof, &dsq, &mut bck);
        posterior(&prof, &fwd, &bck, dsq.len(), total, &mut post);
        assert!(post.mmx(3, 1) > NEG_INF);
        let dsq = abc.digitize(b"GGGG").unwrap();
        let total = forward_fill(&prof, &dsq, &mut fwd);
        assert!(total <= NEG_INF);
        backward_fill(&prof, &dsq, &mut bck);
        posterior(&prof, &fwd, &bck, 4, total, &mut post);
        for i in 0..=4 {
            for k in 1..=prof.m {
                assert_eq!(post.mmx(i, k), NEG_INF);
                assert_eq!(post.imx(i, k), NEG_INF);
            }
            for s in [XMN, XMC, XMJ] {
                assert_eq!(post.xmx(i, s), NEG_INF);
            }
        }
        let mut oa = DpMatrix::new(0, 0);
        assert_eq!(optimal_accuracy(&prof, &post, 4, &mut oa), f32::NEG_INFINITY);
        assert!(optimal_accuracy_trace(&prof, &post, &oa, 4).is_none());
    }
}
