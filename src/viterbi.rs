//! Viterbi: the best-scoring path and its traceback.
//!
//! The fill and the traceback are written once over [`ScoreSystem`], so the
//! same recursion serves raw log-odds scores and posterior-accuracy scores.
//! Both visit predecessors in the same fixed order and the first candidate that
//! reaches the maximum wins:
//!
//! - M: M(i-1,k-1), I(i-1,k-1), B(i-1), D(i-1,k-1)
//! - D: M(i,k-1), D(i,k-1)
//! - I: M(i-1,k), I(i-1,k)
//! - E: M(i,k) for k ascending
//! - J: J(i-1), E(i); B: N(i), J(i); C: C(i-1), E(i)
use crate::alphabet::DigitalSeq;
use crate::dptable::*;
use crate::logsum::*;
use crate::profile::*;
use crate::trace::{State, Trace};

/// Emission and transition scores seen by the max-product recursion.
/// Row `i` is the i-th residue (or alignment column).
pub trait ScoreSystem {
    /// Model length.
    fn nodes(&self) -> usize;
    /// Sequence length.
    fn rows(&self) -> usize;
    fn msc(&self, i: usize, k: usize) -> i32;
    fn isc(&self, i: usize, k: usize) -> i32;
    fn tsc(&self, t: usize, k: usize) -> i32;
    fn bsc(&self, k: usize) -> i32;
    fn esc(&self, k: usize) -> i32;
    fn xsc(&self, x: usize, t: usize) -> i32;
    /// Score of residue `i` emitted by the N, C or J loop (`s` is a special column).
    fn xemit(&self, _i: usize, _s: usize) -> i32 {
        0
    }
    fn unfold_begin(&self, k: usize) -> bool;
    fn unfold_end(&self, k: usize) -> bool;
}

/// A profile against a digitized sequence.
#[derive(Debug, Clone, Copy)]
pub struct ProfileScores<'a> {
    pub profile: &'a Profile,
    pub dsq: &'a DigitalSeq,
}

impl<'a> ProfileScores<'a> {
    pub fn new(profile: &'a Profile, dsq: &'a DigitalSeq) -> Self {
        Self { profile, dsq }
    }
}

impl<'a> ScoreSystem for ProfileScores<'a> {
    fn nodes(&self) -> usize {
        self.profile.m
    }
    fn rows(&self) -> usize {
        self.dsq.len()
    }
    #[inline]
    fn msc(&self, i: usize, k: usize) -> i32 {
        self.profile.msc[self.dsq[i] as usize][k]
    }
    #[inline]
    fn isc(&self, i: usize, k: usize) -> i32 {
        self.profile.isc[self.dsq[i] as usize][k]
    }
    #[inline]
    fn tsc(&self, t: usize, k: usize) -> i32 {
        self.profile.tsc[t][k]
    }
    #[inline]
    fn bsc(&self, k: usize) -> i32 {
        self.profile.bsc[k]
    }
    #[inline]
    fn esc(&self, k: usize) -> i32 {
        self.profile.esc[k]
    }
    #[inline]
    fn xsc(&self, x: usize, t: usize) -> i32 {
        self.profile.xsc[x][t]
    }
    fn unfold_begin(&self, k: usize) -> bool {
        self.profile.unfold_begin(k)
    }
    fn unfold_end(&self, k: usize) -> bool {
        self.profile.unfold_end(k)
    }
}

/// Which paths a fill admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// S..T with flanks and any number of hits.
    Full,
    /// Exactly one hit covering the whole sequence: B before residue 1, E
    /// after residue L, no N, J or C.
    Core,
}

// Keep the first candidate unless a later one is strictly better.
#[inline]
fn best(candidates: &[i32]) -> i32 {
    candidates
        .iter()
        .copied()
        .fold(NEG_INF, |acc, x| if x > acc { x } else { acc })
}

/// Fill `mx` with the max-product recursion and return the total score:
/// C(L)->T for [`Span::Full`], E(L) for [`Span::Core`].
pub fn fill<S: ScoreSystem>(sys: &S, mx: &mut DpMatrix, span: Span) -> i32 {
    let (l, m) = (sys.rows(), sys.nodes());
    mx.resize(l + 1, m);
    mx.clear_row(0);
    match span {
        Span::Full => {
            *mx.xmx_mut(0, XMN) = 0;
            *mx.xmx_mut(0, XMB) = sys.xsc(XTN, MOVE);
        }
        Span::Core => *mx.xmx_mut(0, XMB) = 0,
    }
    for i in 1..=l {
        *mx.mmx_mut(i, 0) = NEG_INF;
        *mx.imx_mut(i, 0) = NEG_INF;
        *mx.dmx_mut(i, 0) = NEG_INF;
        let b_prev = mx.xmx(i - 1, XMB);
        for k in 1..=m {
            let sc = best(&[
                sadd(mx.mmx(i - 1, k - 1), sys.tsc(TMM, k - 1)),
                sadd(mx.imx(i - 1, k - 1), sys.tsc(TIM, k - 1)),
                sadd(b_prev, sys.bsc(k)),
                sadd(mx.dmx(i - 1, k - 1), sys.tsc(TDM, k - 1)),
            ]);
            *mx.mmx_mut(i, k) = sadd(sc, sys.msc(i, k));
            *mx.dmx_mut(i, k) = best(&[
                sadd(mx.mmx(i, k - 1), sys.tsc(TMD, k - 1)),
                sadd(mx.dmx(i, k - 1), sys.tsc(TDD, k - 1)),
            ]);
            *mx.imx_mut(i, k) = if k < m {
                let sc = best(&[
                    sadd(mx.mmx(i - 1, k), sys.tsc(TMI, k)),
                    sadd(mx.imx(i - 1, k), sys.tsc(TII, k)),
                ]);
                sadd(sc, sys.isc(i, k))
            } else {
                NEG_INF
            };
        }
        let e = (1..=m).fold(NEG_INF, |acc, k| {
            let sc = sadd(mx.mmx(i, k), sys.esc(k));
            if sc > acc {
                sc
            } else {
                acc
            }
        });
        *mx.xmx_mut(i, XME) = e;
        match span {
            Span::Full => {
                let n = sadd3(mx.xmx(i - 1, XMN), sys.xsc(XTN, LOOP), sys.xemit(i, XMN));
                let j = best(&[
                    sadd3(mx.xmx(i - 1, XMJ), sys.xsc(XTJ, LOOP), sys.xemit(i, XMJ)),
                    sadd(e, sys.xsc(XTE, LOOP)),
                ]);
                let b = best(&[sadd(n, sys.xsc(XTN, MOVE)), sadd(j, sys.xsc(XTJ, MOVE))]);
                let c = best(&[
                    sadd3(mx.xmx(i - 1, XMC), sys.xsc(XTC, LOOP), sys.xemit(i, XMC)),
                    sadd(e, sys.xsc(XTE, MOVE)),
                ]);
                *mx.xmx_mut(i, XMN) = n;
                *mx.xmx_mut(i, XMJ) = j;
                *mx.xmx_mut(i, XMB) = b;
                *mx.xmx_mut(i, XMC) = c;
            }
            Span::Core => {
                for s in [XMN, XMJ, XMB, XMC] {
                    *mx.xmx_mut(i, s) = NEG_INF;
                }
            }
        }
    }
    match span {
        Span::Full => sadd(mx.xmx(l, XMC), sys.xsc(XTC, MOVE)),
        Span::Core => mx.xmx(l, XME),
    }
}

fn unalignable<S: ScoreSystem>(sys: &S, st: State, i: usize, k: usize, sc: i32) -> ! {
    panic!(
        "traceback: no predecessor of {}{} at row {} matches score {} (M={}, L={})",
        st,
        k,
        i,
        sc,
        sys.nodes(),
        sys.rows()
    )
}

/// Walk a filled matrix back to S (or to B for [`Span::Core`]). Returns
/// `None` when the path runs into a `NEG_INF` cell.
pub fn traceback<S: ScoreSystem>(sys: &S, mx: &DpMatrix, span: Span) -> Option<Trace> {
    use State::*;
    let (l, m) = (sys.rows(), sys.nodes());
    let mut tr = Trace::with_capacity(2 * (l + m) + 6);
    match span {
        Span::Full => {
            if sadd(mx.xmx(l, XMC), sys.xsc(XTC, MOVE)) <= NEG_INF {
                return None;
            }
            tr.push(T, 0, 0);
            tr.push(C, 0, 0);
        }
        Span::Core => tr.push(E, 0, 0),
    }
    // Row and node of the most recently pushed cell.
    let (mut i, mut k) = (l, 0);
    loop {
        let st = match tr.last() {
            Some(cell) => cell.state,
            None => return None,
        };
        match st {
            S => break,
            B if span == Span::Core => break,
            M => {
                let sc = mx.mmx(i, k);
                if sc <= NEG_INF {
                    return None;
                }
                let emit = sys.msc(i, k);
                if sc == sadd3(mx.mmx(i - 1, k - 1), sys.tsc(TMM, k - 1), emit) {
                    tr.push(M, k - 1, i - 1);
                    k -= 1;
                } else if sc == sadd3(mx.imx(i - 1, k - 1), sys.tsc(TIM, k - 1), emit) {
                    tr.push(I, k - 1, i - 1);
                    k -= 1;
                } else if sc == sadd3(mx.xmx(i - 1, XMB), sys.bsc(k), emit) {
                    if sys.unfold_begin(k) {
                        for d in (1..k).rev() {
                            tr.push(D, d, 0);
                        }
                    }
                    tr.push(B, 0, 0);
                    k = 0;
                } else if sc == sadd3(mx.dmx(i - 1, k - 1), sys.tsc(TDM, k - 1), emit) {
                    tr.push(D, k - 1, 0);
                    k -= 1;
                } else {
                    unalignable(sys, M, i, k, sc)
                }
                i -= 1;
            }
            D => {
                let sc = mx.dmx(i, k);
                if sc <= NEG_INF {
                    return None;
                }
                if sc == sadd(mx.mmx(i, k - 1), sys.tsc(TMD, k - 1)) {
                    tr.push(M, k - 1, i);
                } else if sc == sadd(mx.dmx(i, k - 1), sys.tsc(TDD, k - 1)) {
                    tr.push(D, k - 1, 0);
                } else {
                    unalignable(sys, D, i, k, sc)
                }
                k -= 1;
            }
            I => {
                let sc = mx.imx(i, k);
                if sc <= NEG_INF {
                    return None;
                }
                let emit = sys.isc(i, k);
                if sc == sadd3(mx.mmx(i - 1, k), sys.tsc(TMI, k), emit) {
                    tr.push(M, k, i - 1);
                } else if sc == sadd3(mx.imx(i - 1, k), sys.tsc(TII, k), emit) {
                    tr.push(I, k, i - 1);
                } else {
                    unalignable(sys, I, i, k, sc)
                }
                i -= 1;
            }
            N => {
                let sc = mx.xmx(i, XMN);
                if sc <= NEG_INF {
                    return None;
                }
                let stay = sys.xsc(XTN, LOOP);
                if i == 0 && sc == 0 {
                    tr.push(S, 0, 0);
                } else if i > 0 && sc == sadd3(mx.xmx(i - 1, XMN), stay, sys.xemit(i, XMN)) {
                    tr.set_last_pos(i);
                    tr.push(N, 0, 0);
                    i -= 1;
                } else {
                    unalignable(sys, N, i, 0, sc)
                }
            }
            B => {
                let sc = mx.xmx(i, XMB);
                if sc <= NEG_INF {
                    return None;
                }
                if sc == sadd(mx.xmx(i, XMN), sys.xsc(XTN, MOVE)) {
                    tr.push(N, 0, 0);
                } else if sc == sadd(mx.xmx(i, XMJ), sys.xsc(XTJ, MOVE)) {
                    tr.push(J, 0, 0);
                } else {
                    unalignable(sys, B, i, 0, sc)
                }
            }
            E => {
                let sc = mx.xmx(i, XME);
                if sc <= NEG_INF {
                    return None;
                }
                match (1..=m).find(|&k| sc == sadd(mx.mmx(i, k), sys.esc(k))) {
                    Some(end) => {
                        if sys.unfold_end(end) {
                            for d in (end + 1..=m).rev() {
                                tr.push(D, d, 0);
                            }
                        }
                        tr.push(M, end, i);
                        k = end;
                    }
                    None => unalignable(sys, E, i, 0, sc),
                }
            }
            C | J => {
                let (col, xt) = if st == C { (XMC, XTC) } else { (XMJ, XTJ) };
                let sc = mx.xmx(i, col);
                if sc <= NEG_INF {
                    return None;
                }
                let stay = sys.xsc(xt, LOOP);
                let leave = if st == C { MOVE } else { LOOP };
                if i > 0 && sc == sadd3(mx.xmx(i - 1, col), stay, sys.xemit(i, col)) {
                    tr.set_last_pos(i);
                    tr.push(st, 0, 0);
                    i -= 1;
                } else if sc == sadd(mx.xmx(i, XME), sys.xsc(XTE, leave)) {
                    tr.push(E, 0, 0);
                } else {
                    unalignable(sys, st, i, 0, sc)
                }
            }
            T => unalignable(sys, T, i, k, NEG_INF),
        }
    }
    tr.reverse();
    Some(tr)
}

/// Fill the full matrix and return the Viterbi score in scaled units.
pub fn viterbi_fill(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> i32 {
    fill(&ProfileScores::new(profile, dsq), mx, Span::Full)
}

/// Viterbi score in bits. `mx` is grown as needed and holds the filled matrix.
pub fn viterbi(profile: &Profile, dsq: &DigitalSeq, mx: &mut DpMatrix) -> f32 {
    scorify(viterbi_fill(profile, dsq, mx))
}

/// Traceback of a matrix filled by [`viterbi`] on the same inputs.
pub fn viterbi_trace(profile: &Profile, dsq: &DigitalSeq, mx: &DpMatrix) -> Option<Trace> {
    traceback(&ProfileScores::new(profile, dsq), mx, Span::Full)
}

/// Best single hit spanning all of `dsq`: B, then residues 1..=L, then E.
/// Returns the score from B to E and the trace `B .. E`.
pub fn viterbi_core(
    profile: &Profile,
    dsq: &DigitalSeq,
    mx: &mut DpMatrix,
) -> Option<(i32, Trace)> {
    let sys = ProfileScores::new(profile, dsq);
    let sc = fill(&sys, mx, Span::Core);
    if sc <= NEG_INF {
        return None;
    }
    traceback(&sys, mx, Span::Core).map(|tr| (sc, tr))
}
