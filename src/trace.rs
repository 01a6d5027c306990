//! Alignment paths through the Plan7 state graph.
use crate::alphabet::DigitalSeq;
use crate::error::TraceError;
use crate::logsum::*;
use crate::profile::Profile;
use serde::{Deserialize, Serialize};

/// Plan7 states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    S,
    N,
    B,
    M,
    D,
    I,
    E,
    C,
    J,
    T,
}

impl State {
    /// States that carry a model node.
    pub fn is_main(self) -> bool {
        matches!(self, State::M | State::D | State::I)
    }
    /// Flanking states that emit on their self-loop.
    pub fn is_flank(self) -> bool {
        matches!(self, State::N | State::C | State::J)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let c = match self {
            State::S => 'S',
            State::N => 'N',
            State::B => 'B',
            State::M => 'M',
            State::D => 'D',
            State::I => 'I',
            State::E => 'E',
            State::C => 'C',
            State::J => 'J',
            State::T => 'T',
        };
        write!(f, "{}", c)
    }
}

/// One step of a trace. `node` is 0 outside M/D/I, and `pos` is 0 for
/// cells that emit nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceCell {
    pub state: State,
    pub node: usize,
    pub pos: usize,
}

/// A path from S to T.
///
/// The first N, C or J of a run records position 0 since it is entered by a
/// non-emitting transition. Each following cell of the run emits one residue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    cells: Vec<TraceCell>,
}

impl Trace {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            cells: Vec::with_capacity(len),
        }
    }
    pub fn push(&mut self, state: State, node: usize, pos: usize) {
        self.cells.push(TraceCell { state, node, pos });
    }
    pub fn reverse(&mut self) {
        self.cells.reverse();
    }
    pub fn cells(&self) -> &[TraceCell] {
        &self.cells
    }
    pub fn len(&self) -> usize {
        self.cells.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
    pub fn last(&self) -> Option<&TraceCell> {
        self.cells.last()
    }
    /// Record that the most recently pushed cell emits residue `pos`.
    pub(crate) fn set_last_pos(&mut self, pos: usize) {
        if let Some(cell) = self.cells.last_mut() {
            cell.pos = pos;
        }
    }
    pub(crate) fn extend_from(&mut self, other: &Trace, offset: usize) {
        self.cells.extend(other.cells.iter().map(|c| TraceCell {
            pos: if c.pos > 0 { c.pos + offset } else { 0 },
            ..*c
        }));
    }
    /// The state sequence, handy for comparing paths.
    pub fn states(&self) -> Vec<State> {
        self.cells.iter().map(|c| c.state).collect()
    }
    /// (first, last) residue of each domain, in order.
    pub fn domains(&self) -> Vec<(usize, usize)> {
        let mut domains = vec![];
        let mut current: Option<(usize, usize)> = None;
        for cell in self.cells.iter() {
            match cell.state {
                State::B => current = None,
                State::M | State::I => {
                    current = match current {
                        Some((start, _)) => Some((start, cell.pos)),
                        None => Some((cell.pos, cell.pos)),
                    }
                }
                State::E => domains.extend(current.take()),
                _ => {}
            }
        }
        domains
    }
    /// Check that this is a well-formed path for a model of length `m` over a
    /// sequence of length `l`.
    pub fn validate(&self, m: usize, l: usize) -> Result<(), TraceError> {
        use State::*;
        let cells = &self.cells;
        if cells.len() < 6 {
            return Err(TraceError::TooShort);
        }
        let n = cells.len();
        if cells[0].state != S
            || cells[1].state != N
            || cells[n - 2].state != C
            || cells[n - 1].state != T
        {
            return Err(TraceError::BadTerminals);
        }
        let mut next_residue = 1;
        for (index, cell) in cells.iter().enumerate() {
            if cell.state.is_main() && !(1..=m).contains(&cell.node) {
                return Err(TraceError::NodeOutOfRange {
                    index,
                    state: cell.state,
                    node: cell.node,
                    m,
                });
            }
            if cell.state == I && cell.node == m {
                return Err(TraceError::NodeOutOfRange {
                    index,
                    state: I,
                    node: m,
                    m: m.saturating_sub(1),
                });
            }
            let prev = index.checked_sub(1).map(|i| cells[i]);
            let emits = match cell.state {
                M | I => true,
                N | C | J => prev.map(|p| p.state == cell.state).unwrap_or(false),
                _ => false,
            };
            let expected = if emits { next_residue } else { 0 };
            if cell.pos != expected {
                return Err(TraceError::Position {
                    index,
                    state: cell.state,
                    expected,
                    found: cell.pos,
                });
            }
            if emits {
                next_residue += 1;
            }
            if let Some(prev) = prev {
                if !legal(prev, *cell, m) {
                    return Err(TraceError::IllegalTransition {
                        index,
                        from: prev.state,
                        from_node: prev.node,
                        to: cell.state,
                        to_node: cell.node,
                    });
                }
            }
        }
        if next_residue != l + 1 {
            return Err(TraceError::Unaccounted {
                emitted: next_residue - 1,
                len: l,
            });
        }
        Ok(())
    }
    /// Re-score the path. Delete runs that hang off B or lead into E are the
    /// unfolded wings and are scored through the folded `bsc`/`esc`.
    pub fn score(&self, profile: &Profile, dsq: &DigitalSeq) -> i32 {
        use State::*;
        let cells = &self.cells;
        let mut sc = 0;
        let mut t = 0;
        while t + 1 < cells.len() {
            let cell = cells[t];
            match cell.state {
                M => sc = sadd(sc, profile.msc[dsq[cell.pos] as usize][cell.node]),
                I => sc = sadd(sc, profile.isc[dsq[cell.pos] as usize][cell.node]),
                _ => {}
            }
            let run_end = (t + 1..cells.len())
                .find(|&u| cells[u].state != D)
                .unwrap_or(cells.len() - 1);
            let next = if cells[t + 1].state == D && matches!(cell.state, B | M) {
                match (cell.state, cells[run_end].state) {
                    (B, M) => {
                        sc = sadd(sc, profile.bsc[cells[run_end].node]);
                        Some(run_end)
                    }
                    (M, E) => {
                        sc = sadd(sc, profile.esc[cell.node]);
                        Some(run_end)
                    }
                    _ => None,
                }
            } else {
                None
            };
            match next {
                Some(u) => t = u,
                None => {
                    let to = cells[t + 1];
                    sc = sadd(
                        sc,
                        profile.transition_score(cell.state, cell.node, to.state, to.node),
                    );
                    t += 1;
                }
            }
        }
        sc
    }
}

fn legal(from: TraceCell, to: TraceCell, m: usize) -> bool {
    use State::*;
    let (k1, k2) = (from.node, to.node);
    match (from.state, to.state) {
        (S, N) | (N, N) | (N, B) | (J, J) | (J, B) | (C, C) | (C, T) | (E, C) | (E, J) => true,
        (B, M) => true,
        (B, D) => k2 == 1,
        (M, M) | (M, D) | (I, M) | (D, M) | (D, D) => k2 == k1 + 1,
        (M, I) | (I, I) => k2 == k1,
        (M, E) => true,
        (D, E) => k1 == m,
        _ => false,
    }
}

impl std::fmt::Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "st  node   pos")?;
        for cell in self.cells.iter() {
            writeln!(f, "{}  {:>5} {:>5}", cell.state, cell.node, cell.pos)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::profile::*;
    fn trace_of(cells: &[(State, usize, usize)]) -> Trace {
        let mut tr = Trace::with_capacity(cells.len());
        for &(s, k, i) in cells {
            tr.push(s, k, i);
        }
        tr
    }
    use State::*;
    #[test]
    fn validate_good_trace() {
        let tr = trace_of(&[
            (S, 0, 0),
            (N, 0, 0),
            (N, 0, 1),
            (B, 0, 0),
            (M, 1, 2),
            (I, 1, 3),
            (M, 2, 4),
            (D, 3, 0),
            (M, 4, 5),
            (E, 0, 0),
            (J, 0, 0),
            (J, 0, 6),
            (B, 0, 0),
            (D, 1, 0),
            (M, 2, 7),
            (E, 0, 0),
            (C, 0, 0),
            (C, 0, 8),
            (T, 0, 0),
        ]);
        tr.validate(4, 8).unwrap();
        assert_eq!(tr.domains(), vec![(2, 5), (7, 7)]);
        assert!(format!("{}", tr).contains("M      4     5"));
    }
    #[test]
    fn validate_catches_defects() {
        let base = [
            (S, 0, 0),
            (N, 0, 0),
            (B, 0, 0),
            (M, 1, 1),
            (M, 2, 2),
            (E, 0, 0),
            (C, 0, 0),
            (T, 0, 0),
        ];
        trace_of(&base).validate(2, 2).unwrap();
        let mut skipped = base;
        skipped[4] = (M, 3, 2);
        assert!(matches!(
            trace_of(&skipped).validate(3, 2),
            Err(TraceError::IllegalTransition { index: 4, .. })
        ));
        let mut misplaced = base;
        misplaced[4] = (M, 2, 3);
        assert!(matches!(
            trace_of(&misplaced).validate(2, 3),
            Err(TraceError::Position { index: 4, .. })
        ));
        assert!(matches!(
            trace_of(&base).validate(2, 3),
            Err(TraceError::Unaccounted { emitted: 2, len: 3 })
        ));
        let mut backwards = base;
        backwards[3] = (M, 2, 1);
        backwards[4] = (M, 1, 2);
        assert!(trace_of(&backwards).validate(2, 2).is_err());
        assert_eq!(
            trace_of(&base[1..]).validate(2, 2),
            Err(TraceError::BadTerminals)
        );
    }
    #[test]
    fn score_folds_wings() {
        let abc = Alphabet::dna();
        let mut prof = Profile::empty(&abc, 3);
        prof.msc[0][3] = 700;
        prof.msc[2][1] = 300;
        prof.bsc[3] = -500;
        prof.esc[1] = -800;
        prof.esc[3] = 0;
        prof.xsc[XTN] = [-10, -1];
        prof.xsc[XTE] = [-20, -30];
        prof.xsc[XTC] = [-40, -2];
        prof.xsc[XTJ] = [-50, -3];
        // B D1 D2 M3, then M1 D2 D3 E in a second domain.
        let dsq = abc.digitize(b"AG").unwrap();
        let tr = trace_of(&[
            (S, 0, 0),
            (N, 0, 0),
            (B, 0, 0),
            (D, 1, 0),
            (D, 2, 0),
            (M, 3, 1),
            (E, 0, 0),
            (J, 0, 0),
            (B, 0, 0),
            (M, 1, 2),
            (D, 2, 0),
            (D, 3, 0),
            (E, 0, 0),
            (C, 0, 0),
            (T, 0, 0),
        ]);
        tr.validate(3, 2).unwrap();
        prof.bsc[1] = -100;
        let expected = -10 - 500 + 700 + 0 - 30 - 50 - 100 + 300 - 800 - 20 - 40;
        assert_eq!(tr.score(&prof, &dsq), expected);
    }
}
