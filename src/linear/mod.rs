//! Viterbi under a memory ceiling.
//!
//! A full Viterbi matrix costs O(LM). When that does not fit the budget,
//! [`small_viterbi`] first finds the hits with the two-row parser, then aligns
//! each hit on its own: in a full matrix when the hit is small enough, by
//! recursive bisection otherwise. The flanks between hits need no DP at all.
use crate::alphabet::DigitalSeq;
use crate::dptable::DpMatrix;
use crate::logsum::*;
use crate::profile::Profile;
use crate::trace::{State, Trace};
use crate::viterbi::viterbi_core;
use serde::{Deserialize, Serialize};
pub mod bisection;
pub mod parsing;
pub use bisection::{bisection_viterbi, TiedMidpoint};
pub use parsing::{parsing_viterbi, CollapsedTrace, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Configurations
pub struct AlignConfig {
    /// Largest full Viterbi matrix, in MB, before switching to linear memory.
    pub ram_limit_mb: usize,
    /// Extra rows allocated whenever the matrix grows.
    pub pad_rows: usize,
    /// Extra nodes allocated whenever the matrix grows.
    pub pad_nodes: usize,
}

impl AlignConfig {
    pub fn new(ram_limit_mb: usize, pad_rows: usize, pad_nodes: usize) -> Self {
        Self {
            ram_limit_mb,
            pad_rows,
            pad_nodes,
        }
    }
    pub fn ram_limit(mut self, ram_limit_mb: usize) -> Self {
        self.ram_limit_mb = ram_limit_mb;
        self
    }
    pub fn padding(mut self, pad_rows: usize, pad_nodes: usize) -> Self {
        self.pad_rows = pad_rows;
        self.pad_nodes = pad_nodes;
        self
    }
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self::new(32, 0, 0)
    }
}

/// Estimated size in MB of a full Viterbi matrix for `l` residues and `m` nodes:
/// three main planes, row bookkeeping and the five special columns.
pub fn viterbi_size_mb(l: usize, m: usize) -> f64 {
    let rows = l + 1;
    let bytes = std::mem::size_of::<DpMatrix>()
        + 3 * rows * (m + 2) * std::mem::size_of::<i32>()
        + 4 * rows * std::mem::size_of::<usize>()
        + 5 * rows * std::mem::size_of::<i32>();
    bytes as f64 / (1 << 20) as f64
}

/// Whether full Viterbi for `l` residues and `m` nodes is affordable: either
/// `mx` already covers it, or the estimate fits the budget.
pub fn viterbi_space_ok(l: usize, m: usize, mx: &DpMatrix, config: &AlignConfig) -> bool {
    mx.covers(l + 1, m) || viterbi_size_mb(l, m) <= config.ram_limit_mb as f64
}

/// Memory strategy for one alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Full O(LM) matrix.
    Full,
    /// Parse, then align each hit separately.
    Linear,
}

impl Strategy {
    pub fn choose(l: usize, m: usize, mx: &DpMatrix, config: &AlignConfig) -> Self {
        if viterbi_space_ok(l, m, mx, config) {
            Strategy::Full
        } else {
            Strategy::Linear
        }
    }
}

// Flank run: the entry cell, then one cell per residue in `from..=to`.
fn push_flank(tr: &mut Trace, state: State, from: usize, to: usize) {
    tr.push(state, 0, 0);
    (from..=to).for_each(|i| tr.push(state, 0, i));
}

/// Viterbi in memory bounded by `config`. Returns the same score and trace as
/// the full matrix, or no trace if `dsq` cannot be aligned at all. `mx` is
/// reused for hits small enough to align directly. A hit with more than one
/// best path is aligned in a temporary full matrix, which may exceed the budget.
pub fn small_viterbi(
    profile: &Profile,
    dsq: &DigitalSeq,
    mx: &mut DpMatrix,
    config: &AlignConfig,
) -> (f32, Option<Trace>) {
    let (l, m) = (dsq.len(), profile.m);
    let parse = match parsing_viterbi(profile, dsq) {
        Some(parse) => parse,
        None => return (f32::NEG_INFINITY, None),
    };
    debug!("parsed {} residues into {} hit(s)", l, parse.segments.len());
    let mut tr = Trace::with_capacity(2 * (l + m) + 4 * parse.segments.len() + 4);
    tr.push(State::S, 0, 0);
    let mut last = 0;
    for (idx, seg) in parse.segments.iter().enumerate() {
        let flank = if idx == 0 { State::N } else { State::J };
        push_flank(&mut tr, flank, last + 1, seg.begin);
        let len = seg.len();
        let sub = dsq.subseq(seg.begin + 1, seg.end);
        let core = if len == 1 {
            trace!("hit {}..{}: single residue", seg.begin, seg.end);
            viterbi_core(profile, &sub, &mut DpMatrix::new(2, m))
        } else if viterbi_space_ok(len, m, mx, config) {
            trace!("hit {}..{}: full matrix", seg.begin, seg.end);
            viterbi_core(profile, &sub, mx)
        } else {
            trace!("hit {}..{}: bisection", seg.begin, seg.end);
            match bisection_viterbi(profile, &sub) {
                Ok(core) => core,
                Err(tie) => {
                    debug!(
                        "hit {}..{}: tied at row {}, aligning in a full matrix",
                        seg.begin,
                        seg.end,
                        seg.begin + tie.row
                    );
                    viterbi_core(profile, &sub, &mut DpMatrix::new(len + 1, m))
                }
            }
        };
        match core {
            Some((_, core_tr)) => tr.extend_from(&core_tr, seg.begin),
            None => panic!(
                "hit {}..{} from the parse has no single-hit alignment",
                seg.begin, seg.end
            ),
        }
        last = seg.end;
    }
    push_flank(&mut tr, State::C, last + 1, l);
    tr.push(State::T, 0, 0);
    (scorify(parse.score), Some(tr))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::gen_seq::*;
    use crate::profile::*;
    use crate::viterbi::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn size_estimate() {
        let small = viterbi_size_mb(100, 100);
        assert!(small > 0f64 && small < 1f64);
        assert!(viterbi_size_mb(10_000, 500) > 32f64);
        let config = AlignConfig::default().ram_limit(0);
        let mut mx = DpMatrix::new(0, 0);
        assert!(!viterbi_space_ok(50, 10, &mx, &config));
        assert_eq!(Strategy::choose(50, 10, &mx, &config), Strategy::Linear);
        mx.resize(51, 10);
        assert!(viterbi_space_ok(50, 10, &mx, &config));
        assert_eq!(Strategy::choose(50, 10, &mx, &AlignConfig::default()), Strategy::Full);
    }
    #[test]
    fn strategies_agree() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4820);
        let abc = Alphabet::amino();
        let mut full = DpMatrix::new(0, 0);
        let mut reused = DpMatrix::new(0, 0);
        let tight = AlignConfig::default().ram_limit(0);
        for mode in [AlignMode::Glocal, AlignMode::default(), AlignMode::Global] {
            for _ in 0..15 {
                let (model, prof) = random_model_profile(&mut rng, &abc, 25, mode);
                let seq = match mode {
                    AlignMode::Global => sample_domain(&model, &mut rng),
                    _ => sample_multi_domain(&model, &mut rng, 2, 10),
                };
                let dsq = abc.digitize(&seq).unwrap();
                let sc = viterbi_fill(&prof, &dsq, &mut full);
                let full_tr = viterbi_trace(&prof, &dsq, &full);
                // An empty matrix under the tight budget forces bisection.
                let mut empty = DpMatrix::new(0, 0);
                let runs = [(tight, &mut empty), (AlignConfig::default(), &mut reused)];
                for (config, mx) in runs {
                    let (small_sc, tr) = small_viterbi(&prof, &dsq, mx, &config);
                    assert_eq!(small_sc, scorify(sc));
                    assert_eq!(tr, full_tr);
                    let tr = tr.unwrap();
                    if let Err(why) = tr.validate(prof.m, dsq.len()) {
                        panic!("{}\n{}", why, tr);
                    }
                    assert_eq!(tr.score(&prof, &dsq), sc);
                }
            }
        }
    }
    #[test]
    fn same_trace_on_consensus() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4821);
        let abc = Alphabet::amino();
        let mut mx = DpMatrix::new(0, 0);
        let tight = AlignConfig::default().ram_limit(0);
        for m in [3, 12, 40] {
            let (model, prof) = random_model_profile(&mut rng, &abc, m, AlignMode::Glocal);
            let dsq = abc.digitize(&consensus(&model)).unwrap();
            viterbi_fill(&prof, &dsq, &mut mx);
            let full = viterbi_trace(&prof, &dsq, &mx).unwrap();
            let (_, small) = small_viterbi(&prof, &dsq, &mut DpMatrix::new(0, 0), &tight);
            assert_eq!(small.unwrap(), full);
        }
    }
    #[test]
    fn single_residue_hit() {
        let prof = crate::viterbi::test::two_node_profile();
        let abc = Alphabet::dna();
        let dsq = abc.digitize(b"A").unwrap();
        let mut mx = DpMatrix::new(0, 0);
        let tight = AlignConfig::default().ram_limit(0);
        let (sc, tr) = small_viterbi(&prof, &dsq, &mut mx, &tight);
        assert_eq!(sc, scorify(1640));
        let tr = tr.unwrap();
        assert_eq!(
            tr.states(),
            vec![State::S, State::N, State::B, State::M, State::E, State::C, State::T]
        );
        assert_eq!(tr.score(&prof, &dsq), 1640);
    }
    #[test]
    fn tied_hit_keeps_full_trace() {
        let prof = crate::viterbi::test::tied_profile();
        let dsq = Alphabet::dna().digitize(b"AAA").unwrap();
        let mut full = DpMatrix::new(0, 0);
        let sc = viterbi(&prof, &dsq, &mut full);
        let expected = viterbi_trace(&prof, &dsq, &full).unwrap();
        let tight = AlignConfig::default().ram_limit(0);
        let mut mx = DpMatrix::new(0, 0);
        let (small_sc, small) = small_viterbi(&prof, &dsq, &mut mx, &tight);
        assert_eq!(small_sc, sc);
        assert_eq!(small.unwrap(), expected);
        // The temporary matrix is dropped; the reused one is left alone.
        assert_eq!(mx.rows(), 0);
    }
    #[test]
    fn single_node_model() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4822);
        let abc = Alphabet::dna();
        let tight = AlignConfig::default().ram_limit(0);
        let mut mx = DpMatrix::new(0, 0);
        for _ in 0..10 {
            let (model, prof) = random_model_profile(&mut rng, &abc, 1, AlignMode::default());
            let dsq = abc.digitize(&sample_multi_domain(&model, &mut rng, 3, 4)).unwrap();
            let sc = viterbi(&prof, &dsq, &mut mx);
            let tr = viterbi_trace(&prof, &dsq, &mx).unwrap();
            tr.validate(1, dsq.len()).unwrap();
            let mut empty = DpMatrix::new(0, 0);
            let (small_sc, small_tr) = small_viterbi(&prof, &dsq, &mut empty, &tight);
            assert_eq!(sc, small_sc);
            assert_eq!(small_tr, Some(tr));
        }
    }
    #[test]
    fn unalignable_gives_none() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4823);
        let abc = Alphabet::dna();
        let mut prof = random_profile(&mut rng, &abc, 5, AlignMode::Glocal);
        prof.msc[1].iter_mut().for_each(|x| *x = NEG_INF);
        prof.isc[1].iter_mut().for_each(|x| *x = NEG_INF);
        let dsq = abc.digitize(b"CCCCCCC").unwrap();
        let config = AlignConfig::default();
        let (sc, tr) = small_viterbi(&prof, &dsq, &mut DpMatrix::new(0, 0), &config);
        assert_eq!(sc, f32::NEG_INFINITY);
        assert!(tr.is_none());
    }
}
