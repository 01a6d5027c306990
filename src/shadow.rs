//! Viterbi of a profile against a multiple alignment, column by column.
//!
//! Each alignment column is summarized by its weighted residue frequencies and
//! its occupancy (weighted fraction of rows with a residue). The fill stores a
//! predecessor tag for every cell in a [`ShadowMatrix`], and the traceback
//! simply follows the tags.
use crate::alphabet::{Alphabet, AlphabetKind};
use crate::dptable::*;
use crate::error::{Plan7Error, Result};
use crate::logsum::*;
use crate::profile::*;
use crate::trace::{State, Trace};
use crate::viterbi::ScoreSystem;
use serde::{Deserialize, Serialize};

/// Column summary of a weighted alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub alphabet: AlphabetKind,
    /// `con[i][x]`: frequency of canonical symbol `x` among the residues of
    /// column `i` (0-based), weighted.
    pub con: Vec<Vec<f32>>,
    /// `mocc[i]`: weighted fraction of rows with a residue in column `i`.
    pub mocc: Vec<f32>,
}

impl Consensus {
    /// Summarize aligned text rows. Gap bytes are `-` or `.`; a wildcard
    /// residue counts evenly toward every canonical symbol.
    pub fn from_alignment<T: AsRef<[u8]>>(
        alphabet: &Alphabet,
        rows: &[T],
        weights: &[f32],
    ) -> Result<Self> {
        let first = rows.first().ok_or(Plan7Error::EmptyAlignment)?;
        if weights.len() != rows.len() {
            return Err(Plan7Error::WeightCount {
                weights: weights.len(),
                rows: rows.len(),
            });
        }
        let ncol = first.as_ref().len();
        if ncol == 0 {
            return Err(Plan7Error::EmptyAlignment);
        }
        let ragged = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.as_ref().len() != ncol);
        if let Some((row, r)) = ragged {
            return Err(Plan7Error::RaggedAlignment {
                row,
                len: r.as_ref().len(),
                expected: ncol,
            });
        }
        let k = alphabet.size();
        let mut con = vec![vec![0f32; k]; ncol];
        let mut occ = vec![0f32; ncol];
        for (row, &w) in rows.iter().zip(weights.iter()) {
            for (col, &byte) in row.as_ref().iter().enumerate() {
                let code = alphabet.encode(byte).ok_or(Plan7Error::InvalidResidue {
                    byte: byte as char,
                    pos: col + 1,
                })?;
                if code == alphabet.gap() {
                    continue;
                }
                occ[col] += w;
                if code == alphabet.wildcard() {
                    con[col].iter_mut().for_each(|x| *x += w / k as f32);
                } else {
                    con[col][code as usize] += w;
                }
            }
        }
        let total: f32 = weights.iter().sum();
        for (freq, &o) in con.iter_mut().zip(occ.iter()) {
            if o > 0f32 {
                freq.iter_mut().for_each(|x| *x /= o);
            }
        }
        let mocc = occ
            .iter()
            .map(|&o| if total > 0f32 { o / total } else { 0f32 })
            .collect();
        Ok(Self {
            alphabet: alphabet.kind(),
            con,
            mocc,
        })
    }
    /// Number of columns.
    pub fn len(&self) -> usize {
        self.con.len()
    }
    pub fn is_empty(&self) -> bool {
        self.con.is_empty()
    }
    /// Score of column `i` (1-based) against node `k` of an emission table:
    /// the expected score over the column's residues, scaled by occupancy.
    /// `NEG_INF` if any observed residue cannot be emitted.
    pub fn score(&self, i: usize, table: &[Vec<i32>], k: usize) -> i32 {
        let mocc = self.mocc[i - 1];
        if mocc <= 0f32 {
            return 0;
        }
        let mut sc = 0f32;
        for (x, &freq) in self.con[i - 1].iter().enumerate() {
            if freq > 0f32 {
                if table[x][k] <= NEG_INF {
                    return NEG_INF;
                }
                sc += freq * table[x][k] as f32;
            }
        }
        (mocc * sc).round() as i32
    }
}

// Column emission scores computed once, `(ncol + 1) x (m + 1)`.
struct ColumnScores<'a> {
    profile: &'a Profile,
    msc: Vec<i32>,
    isc: Vec<i32>,
    ncol: usize,
}

impl<'a> ColumnScores<'a> {
    fn new(profile: &'a Profile, consensus: &Consensus) -> Self {
        let (n, m) = (consensus.len(), profile.m);
        let mut msc = vec![NEG_INF; (n + 1) * (m + 1)];
        let mut isc = vec![NEG_INF; (n + 1) * (m + 1)];
        for i in 1..=n {
            for k in 1..=m {
                msc[i * (m + 1) + k] = consensus.score(i, &profile.msc, k);
                if k < m {
                    isc[i * (m + 1) + k] = consensus.score(i, &profile.isc, k);
                }
            }
        }
        Self {
            profile,
            msc,
            isc,
            ncol: n,
        }
    }
}

impl<'a> ScoreSystem for ColumnScores<'a> {
    fn nodes(&self) -> usize {
        self.profile.m
    }
    fn rows(&self) -> usize {
        self.ncol
    }
    fn msc(&self, i: usize, k: usize) -> i32 {
        self.msc[i * (self.profile.m + 1) + k]
    }
    fn isc(&self, i: usize, k: usize) -> i32 {
        self.isc[i * (self.profile.m + 1) + k]
    }
    fn tsc(&self, t: usize, k: usize) -> i32 {
        self.profile.tsc[t][k]
    }
    fn bsc(&self, k: usize) -> i32 {
        self.profile.bsc[k]
    }
    fn esc(&self, k: usize) -> i32 {
        self.profile.esc[k]
    }
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

// Best of the tagged candidates; the first one wins ties.
#[inline]
fn argmax(candidates: &[(i32, State)]) -> (i32, State) {
    candidates
        .iter()
        .fold((NEG_INF, candidates[0].1), |acc, &(sc, st)| {
            if sc > acc.0 {
                (sc, st)
            } else {
                acc
            }
        })
}

fn shadow_fill<S: ScoreSystem>(sys: &S, mx: &mut DpMatrix, tb: &mut ShadowMatrix) -> i32 {
    use State::*;
    let (l, m) = (sys.rows(), sys.nodes());
    mx.resize(l + 1, m);
    mx.clear_row(0);
    *mx.xmx_mut(0, XMN) = 0;
    *mx.xmx_mut(0, XMB) = sys.xsc(XTN, MOVE);
    tb.set_xtb(0, XMN, S);
    tb.set_xtb(0, XMB, N);
    for i in 1..=l {
        *mx.mmx_mut(i, 0) = NEG_INF;
        *mx.imx_mut(i, 0) = NEG_INF;
        *mx.dmx_mut(i, 0) = NEG_INF;
        let b_prev = mx.xmx(i - 1, XMB);
        for k in 1..=m {
            let (sc, st) = argmax(&[
                (sadd(mx.mmx(i - 1, k - 1), sys.tsc(TMM, k - 1)), M),
                (sadd(mx.imx(i - 1, k - 1), sys.tsc(TIM, k - 1)), I),
                (sadd(b_prev, sys.bsc(k)), B),
                (sadd(mx.dmx(i - 1, k - 1), sys.tsc(TDM, k - 1)), D),
            ]);
            *mx.mmx_mut(i, k) = sadd(sc, sys.msc(i, k));
            tb.set_mtb(i, k, st);
            let (sc, st) = argmax(&[
                (sadd(mx.mmx(i, k - 1), sys.tsc(TMD, k - 1)), M),
                (sadd(mx.dmx(i, k - 1), sys.tsc(TDD, k - 1)), D),
            ]);
            *mx.dmx_mut(i, k) = sc;
            tb.set_dtb(i, k, st);
            if k < m {
                let (sc, st) = argmax(&[
                    (sadd(mx.mmx(i - 1, k), sys.tsc(TMI, k)), M),
                    (sadd(mx.imx(i - 1, k), sys.tsc(TII, k)), I),
                ]);
                *mx.imx_mut(i, k) = sadd(sc, sys.isc(i, k));
                tb.set_itb(i, k, st);
            } else {
                *mx.imx_mut(i, k) = NEG_INF;
            }
        }
        let mut e = NEG_INF;
        for k in 1..=m {
            let sc = sadd(mx.mmx(i, k), sys.esc(k));
            if sc > e {
                e = sc;
                tb.set_etb(i, k);
            }
        }
        *mx.xmx_mut(i, XME) = e;
        let n = sadd(mx.xmx(i - 1, XMN), sys.xsc(XTN, LOOP));
        tb.set_xtb(i, XMN, N);
        let (j, st) = argmax(&[
            (sadd(mx.xmx(i - 1, XMJ), sys.xsc(XTJ, LOOP)), J),
            (sadd(e, sys.xsc(XTE, LOOP)), E),
        ]);
        tb.set_xtb(i, XMJ, st);
        let (b, st) = argmax(&[
            (sadd(n, sys.xsc(XTN, MOVE)), N),
            (sadd(j, sys.xsc(XTJ, MOVE)), J),
        ]);
        tb.set_xtb(i, XMB, st);
        let (c, st) = argmax(&[
            (sadd(mx.xmx(i - 1, XMC), sys.xsc(XTC, LOOP)), C),
            (sadd(e, sys.xsc(XTE, MOVE)), E),
        ]);
        tb.set_xtb(i, XMC, st);
        *mx.xmx_mut(i, XMN) = n;
        *mx.xmx_mut(i, XMJ) = j;
        *mx.xmx_mut(i, XMB) = b;
        *mx.xmx_mut(i, XMC) = c;
    }
    sadd(mx.xmx(l, XMC), sys.xsc(XTC, MOVE))
}

fn shadow_traceback<S: ScoreSystem>(sys: &S, tb: &ShadowMatrix) -> Trace {
    use State::*;
    let (l, m) = (sys.rows(), sys.nodes());
    let mut tr = Trace::with_capacity(2 * (l + m) + 6);
    tr.push(T, 0, 0);
    tr.push(C, 0, 0);
    let (mut i, mut k) = (l, 0);
    while let Some(&cell) = tr.last() {
        match cell.state {
            S => break,
            M => {
                match tb.mtb(i, k) {
                    B => {
                        if sys.unfold_begin(k) {
                            (1..k).rev().for_each(|d| tr.push(D, d, 0));
                        }
                        tr.push(B, 0, 0);
                    }
                    D => tr.push(D, k - 1, 0),
                    st => tr.push(st, k - 1, i - 1),
                }
                k -= 1;
                i -= 1;
            }
            D => {
                match tb.dtb(i, k) {
                    M => tr.push(M, k - 1, i),
                    _ => tr.push(D, k - 1, 0),
                }
                k -= 1;
            }
            I => {
                tr.push(tb.itb(i, k), k, i - 1);
                i -= 1;
            }
            N if i == 0 => tr.push(S, 0, 0),
            N => {
                tr.set_last_pos(i);
                tr.push(N, 0, 0);
                i -= 1;
            }
            B => tr.push(tb.xtb(i, XMB), 0, 0),
            E => {
                let end = tb.etb(i);
                if sys.unfold_end(end) {
                    (end + 1..=m).rev().for_each(|d| tr.push(D, d, 0));
                }
                tr.push(M, end, i);
                k = end;
            }
            C | J => {
                let col = if cell.state == C { XMC } else { XMJ };
                match tb.xtb(i, col) {
                    E => tr.push(E, 0, 0),
                    st => {
                        tr.set_last_pos(i);
                        tr.push(st, 0, 0);
                        i -= 1;
                    }
                }
            }
            T => panic!("shadow traceback: T in the middle of a trace"),
        }
    }
    tr.reverse();
    tr
}

/// Viterbi of `profile` against the columns of `consensus`. Returns the score in
/// bits and the trace over columns, or `None` if no path exists.
pub fn viterbi_align_alignment(profile: &Profile, consensus: &Consensus) -> (f32, Option<Trace>) {
    assert_eq!(
        profile.alphabet, consensus.alphabet,
        "profile and alignment use different alphabets"
    );
    let sys = ColumnScores::new(profile, consensus);
    let mut mx = DpMatrix::new(0, 0);
    let mut tb = ShadowMatrix::new(consensus.len() + 1, profile.m);
    let sc = shadow_fill(&sys, &mut mx, &mut tb);
    if sc <= NEG_INF {
        return (f32::NEG_INFINITY, None);
    }
    (scorify(sc), Some(shadow_traceback(&sys, &tb)))
}
