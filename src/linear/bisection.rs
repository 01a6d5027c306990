//! Divide-and-conquer Viterbi for a single hit in O(M) memory.
//!
//! The segment is aligned as one B..E hit covering every residue, so each row
//! is emitted by exactly one M or I state on the best path. For two fixed
//! points of that path (anchors), a forward pass from the left one and a
//! backward pass from the right one meet at the middle row. The emitting cell
//! with the best combined score there is a new anchor, and both halves are
//! solved the same way until the anchors sit on consecutive rows. Consecutive
//! anchors are joined directly.
use crate::alphabet::DigitalSeq;
use crate::dptable::DpMatrix;
use crate::logsum::*;
use crate::profile::*;
use crate::trace::{State, Trace};
use crate::viterbi::{ProfileScores, ScoreSystem};

/// A fixed point of the path. Row 0 is B, row L + 1 is E, and M/I anchors
/// emit the residue of their row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    B,
    M(usize),
    I(usize),
    E,
}

#[inline]
fn best(candidates: &[i32]) -> i32 {
    candidates
        .iter()
        .copied()
        .fold(NEG_INF, |acc, x| if x > acc { x } else { acc })
}

/// Forward from `from` at row `r1` through row `r2`. Cells include their own
/// emission but not the anchor's.
fn forward_pass(sys: &ProfileScores, from: Anchor, r1: usize, r2: usize, mx: &mut DpMatrix) {
    let m = sys.nodes();
    let row = r1 % 2;
    mx.clear_row(row);
    match from {
        Anchor::B => {}
        Anchor::M(k1) => {
            *mx.mmx_mut(row, k1) = 0;
            for k in k1 + 1..=m {
                *mx.dmx_mut(row, k) = best(&[
                    sadd(mx.mmx(row, k - 1), sys.tsc(TMD, k - 1)),
                    sadd(mx.dmx(row, k - 1), sys.tsc(TDD, k - 1)),
                ]);
            }
        }
        Anchor::I(k1) => *mx.imx_mut(row, k1) = 0,
        Anchor::E => panic!("bisection: forward pass cannot start at E"),
    }
    for i in r1 + 1..=r2 {
        let (cur, prv) = (i % 2, (i + 1) % 2);
        // B only precedes the first residue.
        let b_prev = if i == 1 && from == Anchor::B { 0 } else { NEG_INF };
        *mx.mmx_mut(cur, 0) = NEG_INF;
        *mx.imx_mut(cur, 0) = NEG_INF;
        *mx.dmx_mut(cur, 0) = NEG_INF;
        for k in 1..=m {
            let sc = best(&[
                sadd(mx.mmx(prv, k - 1), sys.tsc(TMM, k - 1)),
                sadd(mx.imx(prv, k - 1), sys.tsc(TIM, k - 1)),
                sadd(b_prev, sys.bsc(k)),
                sadd(mx.dmx(prv, k - 1), sys.tsc(TDM, k - 1)),
            ]);
            *mx.mmx_mut(cur, k) = sadd(sc, sys.msc(i, k));
            *mx.dmx_mut(cur, k) = best(&[
                sadd(mx.mmx(cur, k - 1), sys.tsc(TMD, k - 1)),
                sadd(mx.dmx(cur, k - 1), sys.tsc(TDD, k - 1)),
            ]);
            *mx.imx_mut(cur, k) = if k < m {
                let sc = best(&[
                    sadd(mx.mmx(prv, k), sys.tsc(TMI, k)),
                    sadd(mx.imx(prv, k), sys.tsc(TII, k)),
                ]);
                sadd(sc, sys.isc(i, k))
            } else {
                NEG_INF
            };
        }
    }
}

/// Backward from `to` at row `r3` down to row `r2`. Cells exclude their own
/// emission and include the anchor's.
fn backward_pass(sys: &ProfileScores, to: Anchor, r3: usize, r2: usize, mx: &mut DpMatrix) {
    let (m, l) = (sys.nodes(), sys.rows());
    // Row the recursion starts from.
    let start = match to {
        Anchor::E => {
            let row = l % 2;
            mx.clear_row(row);
            for k in 1..=m {
                *mx.mmx_mut(row, k) = sys.esc(k);
            }
            l
        }
        Anchor::M(k3) => {
            mx.clear_row(r3 % 2);
            *mx.mmx_mut(r3 % 2, k3) = 0;
            r3
        }
        Anchor::I(k3) => {
            mx.clear_row(r3 % 2);
            *mx.imx_mut(r3 % 2, k3) = 0;
            r3
        }
        Anchor::B => panic!("bisection: backward pass cannot start at B"),
    };
    for i in (r2..start).rev() {
        let (cur, nxt) = (i % 2, (i + 1) % 2);
        mx.clear_row(cur);
        for k in (1..m).rev() {
            let next_m = sadd(mx.mmx(nxt, k + 1), sys.msc(i + 1, k + 1));
            let next_i = sadd(mx.imx(nxt, k), sys.isc(i + 1, k));
            *mx.dmx_mut(cur, k) = best(&[
                sadd(next_m, sys.tsc(TDM, k)),
                sadd(mx.dmx(cur, k + 1), sys.tsc(TDD, k)),
            ]);
            *mx.imx_mut(cur, k) = best(&[
                sadd(next_m, sys.tsc(TIM, k)),
                sadd(next_i, sys.tsc(TII, k)),
            ]);
            *mx.mmx_mut(cur, k) = best(&[
                sadd(next_m, sys.tsc(TMM, k)),
                sadd(next_i, sys.tsc(TMI, k)),
                sadd(mx.dmx(cur, k + 1), sys.tsc(TMD, k)),
            ]);
        }
    }
}

/// Best emitting cell of row `r` (M before I, nodes ascending, first wins),
/// and whether another cell of the row reaches the same score.
fn midpoint(m: usize, fwd: &DpMatrix, bck: &DpMatrix, r: usize) -> (i32, Anchor, bool) {
    let row = r % 2;
    let cells = (1..=m)
        .map(|k| (sadd(fwd.mmx(row, k), bck.mmx(row, k)), Anchor::M(k)))
        .chain((1..m).map(|k| (sadd(fwd.imx(row, k), bck.imx(row, k)), Anchor::I(k))));
    let mut best = (NEG_INF, Anchor::M(1), false);
    for (sc, cell) in cells {
        if sc > best.0 {
            best = (sc, cell, false);
        } else if sc == best.0 && sc > NEG_INF {
            best.2 = true;
        }
    }
    best
}

/// Two emitting cells of `row` reach the best score, so the segment has more
/// than one optimal path. Align it in a full matrix to get the traceback's pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiedMidpoint {
    /// Midpoint row, counted within the segment.
    pub row: usize,
    /// Score of the best hit.
    pub score: i32,
}

/// Append the states strictly after anchor `a` up to and including anchor `b`
/// at row `row`.
fn connect(profile: &Profile, tr: &mut Trace, a: Anchor, b: Anchor, row: usize) {
    match (a, b) {
        (Anchor::B, Anchor::M(k)) => {
            if profile.unfold_begin(k) {
                (1..k).for_each(|d| tr.push(State::D, d, 0));
            }
            tr.push(State::M, k, row);
        }
        (Anchor::M(k1), Anchor::M(k2)) if k2 > k1 => {
            (k1 + 1..k2).for_each(|d| tr.push(State::D, d, 0));
            tr.push(State::M, k2, row);
        }
        (Anchor::M(k1), Anchor::I(k2)) | (Anchor::I(k1), Anchor::I(k2)) if k1 == k2 => {
            tr.push(State::I, k2, row);
        }
        (Anchor::I(k1), Anchor::M(k2)) if k2 == k1 + 1 => tr.push(State::M, k2, row),
        (Anchor::M(k), Anchor::E) => {
            if profile.unfold_end(k) {
                (k + 1..=profile.m).for_each(|d| tr.push(State::D, d, 0));
            }
            tr.push(State::E, 0, 0);
        }
        _ => panic!(
            "bisection: anchors {:?} and {:?} at rows {} and {} do not connect",
            a,
            b,
            row - 1,
            row
        ),
    }
}

/// Best single hit spanning all of `dsq` (B before residue 1, E after residue
/// L), in two rows of memory. Returns the score and the trace `B .. E`, or
/// `None` if no such hit exists. When the best hit is not unique the trace is
/// not built and [`TiedMidpoint`] is returned.
///
/// Panics on segments of one residue or less; route those to a small full matrix.
pub fn bisection_viterbi(
    profile: &Profile,
    dsq: &DigitalSeq,
) -> Result<Option<(i32, Trace)>, TiedMidpoint> {
    let (l, m) = (dsq.len(), profile.m);
    assert!(l > 1, "bisection needs more than one residue, got {}", l);
    let sys = ProfileScores::new(profile, dsq);
    let mut fwd = DpMatrix::new(2, m);
    let mut bck = DpMatrix::new(2, m);
    let mut anchors: Vec<Option<Anchor>> = vec![None; l + 2];
    anchors[0] = Some(Anchor::B);
    anchors[l + 1] = Some(Anchor::E);
    let mut score = None;
    // Right halves wait on the stack while left halves are split, so it holds
    // O(log L) entries.
    let mut stack = vec![((0, Anchor::B), (l + 1, Anchor::E))];
    while let Some(((r1, a1), (r3, a3))) = stack.pop() {
        if r3 - r1 < 2 {
            continue;
        }
        let r2 = r1 + (r3 - r1) / 2;
        forward_pass(&sys, a1, r1, r2, &mut fwd);
        backward_pass(&sys, a3, r3, r2, &mut bck);
        let (sc, mid, tied) = midpoint(m, &fwd, &bck, r2);
        if sc <= NEG_INF {
            match score {
                None => return Ok(None),
                Some(_) => panic!(
                    "bisection: no path between {:?}@{} and {:?}@{}",
                    a1, r1, a3, r3
                ),
            }
        }
        let total = *score.get_or_insert(sc);
        if tied {
            return Err(TiedMidpoint { row: r2, score: total });
        }
        anchors[r2] = Some(mid);
        stack.push(((r2, mid), (r3, a3)));
        stack.push(((r1, a1), (r2, mid)));
    }
    let path: Vec<Anchor> = anchors.into_iter().flatten().collect();
    assert_eq!(path.len(), l + 2, "bisection left rows without an anchor");
    let mut tr = Trace::with_capacity(2 * (l + m) + 2);
    tr.push(State::B, 0, 0);
    for (row, w) in path.windows(2).enumerate() {
        connect(profile, &mut tr, w[0], w[1], row + 1);
    }
    Ok(score.map(|sc| (sc, tr)))
}
