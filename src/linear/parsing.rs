//! Two-row Viterbi that recovers only where each hit begins and ends.
//!
//! Alongside the scores, every main-state cell carries the row of the B state its
//! best path entered from, and every row keeps the position where the path
//! through its B state left the previous hit. Tracing these pointers back from
//! C(L) yields the hits without any per-node detail.
use crate::alphabet::DigitalSeq;
use crate::dptable::*;
use crate::logsum::*;
use crate::profile::*;
use serde::{Deserialize, Serialize};

/// One hit of a parse: B sits at row `begin`, E at row `end`, and the hit
/// emits residues `begin + 1..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub begin: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }
    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }
}

/// Collapsed trace: the Viterbi score and the hits in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapsedTrace {
    pub score: i32,
    pub segments: Vec<Segment>,
}

impl CollapsedTrace {
    /// B and E positions, alternating.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().flat_map(|s| [s.begin, s.end])
    }
}

// B-row pointers carried by the main states of the rolling rows.
struct Pointers {
    mtr: Vec<usize>,
    itr: Vec<usize>,
    dtr: Vec<usize>,
    stride: usize,
}

impl Pointers {
    fn new(m: usize) -> Self {
        let stride = m + 2;
        Self {
            mtr: vec![0; 2 * stride],
            itr: vec![0; 2 * stride],
            dtr: vec![0; 2 * stride],
            stride,
        }
    }
}

/// Viterbi in O(M + L) memory. Returns `None` if no path exists.
pub fn parsing_viterbi(profile: &Profile, dsq: &DigitalSeq) -> Option<CollapsedTrace> {
    let (l, m) = (dsq.len(), profile.m);
    let (tsc, xsc) = (&profile.tsc, &profile.xsc);
    let mut mx = DpMatrix::new(2, m);
    let mut tr = Pointers::new(m);
    let st = tr.stride;
    // btr[i]: E row of the previous hit when B(i) came from J, else 0.
    // etr[i]: B row of the hit whose E is at row i.
    let mut btr = vec![0usize; l + 1];
    let mut etr = vec![0usize; l + 1];
    // J and C pointers roll with the rows: E row their run was entered from.
    let (mut jtr, mut ctr) = ([0usize; 2], [0usize; 2]);
    mx.clear_row(0);
    *mx.xmx_mut(0, XMN) = 0;
    *mx.xmx_mut(0, XMB) = xsc[XTN][MOVE];
    for v in [&mut tr.mtr, &mut tr.itr, &mut tr.dtr] {
        v[..st].iter_mut().for_each(|x| *x = 0);
    }
    for i in 1..=l {
        let (cur, prv) = (i % 2, (i + 1) % 2);
        let x = dsq[i] as usize;
        *mx.mmx_mut(cur, 0) = NEG_INF;
        *mx.imx_mut(cur, 0) = NEG_INF;
        *mx.dmx_mut(cur, 0) = NEG_INF;
        let b_prev = mx.xmx(prv, XMB);
        for k in 1..=m {
            let (c, p) = (cur * st + k, prv * st + k);
            let (mut sc, mut ptr) = (NEG_INF, 0);
            let candidates = [
                (sadd(mx.mmx(prv, k - 1), tsc[TMM][k - 1]), tr.mtr[p - 1]),
                (sadd(mx.imx(prv, k - 1), tsc[TIM][k - 1]), tr.itr[p - 1]),
                (sadd(b_prev, profile.bsc[k]), i - 1),
                (sadd(mx.dmx(prv, k - 1), tsc[TDM][k - 1]), tr.dtr[p - 1]),
            ];
            for (cand, from) in candidates {
                if cand > sc {
                    sc = cand;
                    ptr = from;
                }
            }
            *mx.mmx_mut(cur, k) = sadd(sc, profile.msc[x][k]);
            tr.mtr[c] = ptr;

            let (mut sc, mut ptr) = (NEG_INF, 0);
            let candidates = [
                (sadd(mx.mmx(cur, k - 1), tsc[TMD][k - 1]), tr.mtr[c - 1]),
                (sadd(mx.dmx(cur, k - 1), tsc[TDD][k - 1]), tr.dtr[c - 1]),
            ];
            for (cand, from) in candidates {
                if cand > sc {
                    sc = cand;
                    ptr = from;
                }
            }
            *mx.dmx_mut(cur, k) = sc;
            tr.dtr[c] = ptr;

            if k < m {
                let (mut sc, mut ptr) = (NEG_INF, 0);
                let candidates = [
                    (sadd(mx.mmx(prv, k), tsc[TMI][k]), tr.mtr[p]),
                    (sadd(mx.imx(prv, k), tsc[TII][k]), tr.itr[p]),
                ];
                for (cand, from) in candidates {
                    if cand > sc {
                        sc = cand;
                        ptr = from;
                    }
                }
                *mx.imx_mut(cur, k) = sadd(sc, profile.isc[x][k]);
                tr.itr[c] = ptr;
            } else {
                *mx.imx_mut(cur, k) = NEG_INF;
                tr.itr[c] = 0;
            }
        }
        let n = sadd(mx.xmx(prv, XMN), xsc[XTN][LOOP]);
        let mut e = NEG_INF;
        for k in 1..=m {
            let sc = sadd(mx.mmx(cur, k), profile.esc[k]);
            if sc > e {
                e = sc;
                etr[i] = tr.mtr[cur * st + k];
            }
        }
        let mut j = sadd(mx.xmx(prv, XMJ), xsc[XTJ][LOOP]);
        jtr[cur] = jtr[prv];
        if sadd(e, xsc[XTE][LOOP]) > j {
            j = sadd(e, xsc[XTE][LOOP]);
            jtr[cur] = i;
        }
        let mut b = sadd(n, xsc[XTN][MOVE]);
        btr[i] = 0;
        if sadd(j, xsc[XTJ][MOVE]) > b {
            b = sadd(j, xsc[XTJ][MOVE]);
            btr[i] = jtr[cur];
        }
        let mut c = sadd(mx.xmx(prv, XMC), xsc[XTC][LOOP]);
        ctr[cur] = ctr[prv];
        if sadd(e, xsc[XTE][MOVE]) > c {
            c = sadd(e, xsc[XTE][MOVE]);
            ctr[cur] = i;
        }
        *mx.xmx_mut(cur, XMN) = n;
        *mx.xmx_mut(cur, XME) = e;
        *mx.xmx_mut(cur, XMJ) = j;
        *mx.xmx_mut(cur, XMB) = b;
        *mx.xmx_mut(cur, XMC) = c;
    }
    let score = sadd(mx.xmx(l % 2, XMC), xsc[XTC][MOVE]);
    if score <= NEG_INF {
        return None;
    }
    let mut segments = vec![];
    let mut end = ctr[l % 2];
    while end > 0 {
        let begin = etr[end];
        segments.push(Segment { begin, end });
        end = btr[begin];
    }
    segments.reverse();
    Some(CollapsedTrace { score, segments })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::gen_seq::*;
    use crate::trace::State;
    use crate::viterbi::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn parse_matches_full_viterbi() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(7010);
        let abc = Alphabet::dna();
        let mut mx = DpMatrix::new(0, 0);
        for mode in [AlignMode::Glocal, AlignMode::default(), AlignMode::Global] {
            for _ in 0..20 {
                let (model, prof) = random_model_profile(&mut rng, &abc, 10, mode);
                let seq = match mode {
                    AlignMode::Global => sample_domain(&model, &mut rng),
                    _ => sample_multi_domain(&model, &mut rng, 3, 6),
                };
                let dsq = abc.digitize(&seq).unwrap();
                let sc = viterbi_fill(&prof, &dsq, &mut mx);
                let parse = parsing_viterbi(&prof, &dsq).unwrap();
                assert_eq!(parse.score, sc);
                let tr = viterbi_trace(&prof, &dsq, &mx).unwrap();
                let full: Vec<_> = tr
                    .domains()
                    .iter()
                    .map(|&(start, end)| (start - 1, end))
                    .collect();
                let parsed: Vec<_> = parse.segments.iter().map(|s| (s.begin, s.end)).collect();
                assert_eq!(full, parsed);
                let pos: Vec<_> = parse.positions().collect();
                assert_eq!(pos.len(), 2 * parse.segments.len());
                assert!(parse.segments.iter().all(|s| !s.is_empty()));
                let covered: usize = parse.segments.iter().map(|s| s.len()).sum();
                let in_hits = tr
                    .cells()
                    .iter()
                    .filter(|c| matches!(c.state, State::M | State::I))
                    .count();
                assert_eq!(covered, in_hits);
                assert!(pos.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
    #[test]
    fn parse_unalignable() {
        let abc = Alphabet::dna();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(7011);
        let mut prof = random_profile(&mut rng, &abc, 6, AlignMode::Glocal);
        prof.msc[3].iter_mut().for_each(|x| *x = NEG_INF);
        prof.isc[3].iter_mut().for_each(|x| *x = NEG_INF);
        let dsq = abc.digitize(b"TTTT").unwrap();
        assert!(parsing_viterbi(&prof, &dsq).is_none());
    }
}
