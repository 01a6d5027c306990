//! Plan7 models: the probability form and the log-odds profile the DP runs on.
//!
//! A [`Plan7Model`] is what a model-construction stage hands over. It is
//! configured into one of the [`AlignMode`]s, which fixes entry/exit and the
//! special N, E, C, J transitions, and then converted once into a [`Profile`]
//! of integer scores. The profile folds the terminal delete states into the
//! begin and end scores, so B->D1 and D_M->E never appear in a recursion.
use crate::alphabet::{Alphabet, AlphabetKind};
use crate::error::{Plan7Error, Result};
use crate::logsum::*;
use crate::trace::State;
use serde::{Deserialize, Serialize};

// Node transitions.
pub const TMM: usize = 0;
pub const TMI: usize = 1;
pub const TMD: usize = 2;
pub const TIM: usize = 3;
pub const TII: usize = 4;
pub const TDM: usize = 5;
pub const TDD: usize = 6;
pub const NTRANS: usize = 7;

// Special states with a loop/move choice.
pub const XTN: usize = 0;
pub const XTE: usize = 1;
pub const XTC: usize = 2;
pub const XTJ: usize = 3;
pub const MOVE: usize = 0;
pub const LOOP: usize = 1;

/// How a model may align to a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlignMode {
    /// The whole model against the whole sequence, once.
    Global,
    /// The whole model, any number of times, with unaligned flanks.
    Glocal,
    /// Model fragments, any number of times. `entry` and `exit` are the total
    /// probabilities of entering after node 1 and leaving before node M.
    Local { entry: f32, exit: f32 },
    /// One model fragment.
    LocalSingle { entry: f32, exit: f32 },
}

impl Default for AlignMode {
    fn default() -> Self {
        AlignMode::Local {
            entry: 0.5,
            exit: 0.5,
        }
    }
}

/// Probability form of a Plan7 model.
/// Node-indexed vectors have `m + 1` entries; index 0 is unused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan7Model {
    pub alphabet: AlphabetKind,
    pub m: usize,
    /// `t[k]`: transitions out of node k, in the order MM, MI, MD, IM, II, DM, DD.
    /// Only `1..m` are used.
    pub t: Vec<[f32; NTRANS]>,
    /// `mat[k][x]`: match emissions, `1..=m`.
    pub mat: Vec<Vec<f32>>,
    /// `ins[k][x]`: insert emissions, `1..m`.
    pub ins: Vec<Vec<f32>>,
    /// B->D1.
    pub tbd1: f32,
    /// B->M_k.
    pub begin: Vec<f32>,
    /// M_k->E.
    pub end: Vec<f32>,
    /// `xt[XTN|XTE|XTC|XTJ][MOVE|LOOP]`.
    pub xt: [[f32; 2]; 4],
    /// Null model residue frequencies.
    pub null: Vec<f32>,
    /// Null model self-loop.
    pub p1: f32,
}

impl Plan7Model {
    /// An all-zero model with a uniform null model.
    pub fn new(alphabet: &Alphabet, m: usize) -> Self {
        let k = alphabet.size();
        Self {
            alphabet: alphabet.kind(),
            m,
            t: vec![[0f32; NTRANS]; m + 1],
            mat: vec![vec![0f32; k]; m + 1],
            ins: vec![vec![0f32; k]; m + 1],
            tbd1: 0f32,
            begin: vec![0f32; m + 1],
            end: vec![0f32; m + 1],
            xt: [[0f32; 2]; 4],
            null: vec![1f32 / k as f32; k],
            p1: 350f32 / 351f32,
        }
    }
    /// Set the null self-loop from an expected sequence length.
    pub fn set_null_length(&mut self, len: f32) {
        self.p1 = len / (len + 1f32);
    }
    /// Fix entry, exit and the special transitions for `mode`.
    pub fn configure(&mut self, mode: AlignMode) {
        let (m, p1) = (self.m, self.p1);
        let flank = [1f32 - p1, p1];
        self.begin.iter_mut().for_each(|x| *x = 0f32);
        self.end.iter_mut().for_each(|x| *x = 0f32);
        self.end[m] = 1f32;
        match mode {
            AlignMode::Global => {
                self.xt = [[1f32, 0f32]; 4];
                self.begin[1] = 1f32 - self.tbd1;
            }
            AlignMode::Glocal => {
                self.xt = [flank, [0.5, 0.5], flank, flank];
                self.begin[1] = 1f32 - self.tbd1;
            }
            AlignMode::Local { entry, exit } | AlignMode::LocalSingle { entry, exit } => {
                let e = match mode {
                    AlignMode::LocalSingle { .. } => [1f32, 0f32],
                    _ => [0.5, 0.5],
                };
                self.xt = [flank, e, flank, flank];
                if m > 1 {
                    self.begin[1] = (1f32 - entry) * (1f32 - self.tbd1);
                    let internal_entry = entry * (1f32 - self.tbd1) / (m - 1) as f32;
                    self.begin[2..=m].iter_mut().for_each(|x| *x = internal_entry);
                    let internal_exit = exit / (m - 1) as f32;
                    self.end[1..m].iter_mut().for_each(|x| *x = internal_exit);
                } else {
                    self.begin[1] = 1f32 - self.tbd1;
                }
            }
        }
        self.renormalize_exits();
    }
    /// Rescale M_k->{M,I,D} so that together with M_k->E they sum to one.
    fn renormalize_exits(&mut self) {
        for k in 1..self.m {
            let sum: f32 = self.t[k][TMM..=TMD].iter().sum();
            if sum > 0f32 {
                let scale = (1f32 - self.end[k]) / sum;
                self.t[k][TMM..=TMD].iter_mut().for_each(|x| *x *= scale);
            }
        }
    }
    /// Check dimensions and that every distribution is a distribution.
    pub fn validate(&self) -> Result<()> {
        const TOL: f32 = 1e-3;
        let m = self.m;
        if m == 0 {
            return Err(Plan7Error::EmptyModel);
        }
        let k = Alphabet::from_kind(self.alphabet).size();
        let shapes = [
            ("t", self.t.len(), m + 1),
            ("mat", self.mat.len(), m + 1),
            ("ins", self.ins.len(), m + 1),
            ("begin", self.begin.len(), m + 1),
            ("end", self.end.len(), m + 1),
            ("null", self.null.len(), k),
        ];
        for (what, len, expected) in shapes {
            if len != expected {
                return Err(Plan7Error::Shape(format!(
                    "{} has {} entries, expected {}",
                    what, len, expected
                )));
            }
        }
        if let Some(row) = self.mat.iter().chain(self.ins.iter()).find(|r| r.len() != k) {
            return Err(Plan7Error::Shape(format!(
                "emission row has {} entries, expected {}",
                row.len(),
                k
            )));
        }
        let check = |what: &'static str, node: usize, xs: &[f32]| -> Result<()> {
            if let Some(&value) = xs.iter().find(|&&x| !(0f32..=1f32).contains(&x)) {
                return Err(Plan7Error::InvalidProbability { what, node, value });
            }
            Ok(())
        };
        let normalized = |what: &'static str, node: usize, sum: f32| -> Result<()> {
            if (sum - 1f32).abs() > TOL {
                Err(Plan7Error::Unnormalized { what, node, sum })
            } else {
                Ok(())
            }
        };
        check("null", 0, &self.null)?;
        normalized("null", 0, self.null.iter().sum())?;
        check("p1", 0, &[self.p1, self.tbd1])?;
        for node in 1..=m {
            check("match emissions", node, &self.mat[node])?;
            normalized("match emissions", node, self.mat[node].iter().sum())?;
            check("begin/end", node, &[self.begin[node], self.end[node]])?;
            if node < m {
                let t = &self.t[node];
                check("transitions", node, t)?;
                check("insert emissions", node, &self.ins[node])?;
                normalized("insert emissions", node, self.ins[node].iter().sum())?;
                normalized("match transitions", node, t[TMM] + t[TMI] + t[TMD] + self.end[node])?;
                normalized("insert transitions", node, t[TIM] + t[TII])?;
                normalized("delete transitions", node, t[TDM] + t[TDD])?;
            }
        }
        normalized("begin", 0, self.begin.iter().sum::<f32>() + self.tbd1)?;
        for (node, xt) in self.xt.iter().enumerate() {
            check("special transitions", node, xt)?;
        }
        Ok(())
    }
}

/// How the D1 and D_M wings are folded into begin/end scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldMode {
    /// Keep the better of the direct and the wing path. Use with Viterbi.
    Max,
    /// Sum both paths. Use with Forward/Backward.
    Sum,
}

/// Log-odds scores of a Plan7 model.
///
/// Node-indexed tables have `m + 1` entries and index 0 is always `NEG_INF`.
/// Emission tables are indexed `[symbol][node]` over the canonical symbols
/// plus the wildcard. There is no insert state at node `m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub alphabet: AlphabetKind,
    pub m: usize,
    pub msc: Vec<Vec<i32>>,
    pub isc: Vec<Vec<i32>>,
    /// `tsc[t][k]` for `t` in `TMM..=TDD`.
    pub tsc: Vec<Vec<i32>>,
    /// B->M_k, with B->D1..D_{k-1}->M_k folded in.
    pub bsc: Vec<i32>,
    /// M_k->E, with M_k->D_{k+1}..D_M->E folded in.
    pub esc: Vec<i32>,
    /// B->M_k without the wing.
    pub bsc_direct: Vec<i32>,
    /// M_k->E without the wing.
    pub esc_direct: Vec<i32>,
    pub xsc: [[i32; 2]; 4],
}

fn ln(p: f32) -> f64 {
    if p > 0f32 {
        (p as f64).ln()
    } else {
        f64::NEG_INFINITY
    }
}

fn ln_add(a: f64, b: f64, fold: FoldMode) -> f64 {
    match fold {
        FoldMode::Max => a.max(b),
        FoldMode::Sum if a == f64::NEG_INFINITY => b,
        FoldMode::Sum if b == f64::NEG_INFINITY => a,
        FoldMode::Sum => a.max(b) + (1f64 + (-(a - b).abs()).exp()).ln(),
    }
}

// Natural-log probability ratio into a scaled log2 score.
fn ln2score(lnp: f64) -> i32 {
    if lnp == f64::NEG_INFINITY {
        NEG_INF
    } else {
        let sc = (0.5 + INTSCALE as f64 * std::f64::consts::LOG2_E * lnp).floor();
        (sc as i32).max(NEG_INF + 1)
    }
}

impl Profile {
    /// A profile with every score at `NEG_INF`.
    pub fn empty(alphabet: &Alphabet, m: usize) -> Self {
        let nsym = alphabet.score_size();
        Self {
            alphabet: alphabet.kind(),
            m,
            msc: vec![vec![NEG_INF; m + 1]; nsym],
            isc: vec![vec![NEG_INF; m + 1]; nsym],
            tsc: vec![vec![NEG_INF; m + 1]; NTRANS],
            bsc: vec![NEG_INF; m + 1],
            esc: vec![NEG_INF; m + 1],
            bsc_direct: vec![NEG_INF; m + 1],
            esc_direct: vec![NEG_INF; m + 1],
            xsc: [[NEG_INF; 2]; 4],
        }
    }
    /// Set B->M_k to `sc`, all of it from the direct transition.
    pub fn set_entry(&mut self, k: usize, sc: i32) {
        self.bsc[k] = sc;
        self.bsc_direct[k] = sc;
    }
    /// Set M_k->E to `sc`, all of it from the direct transition.
    pub fn set_exit(&mut self, k: usize, sc: i32) {
        self.esc[k] = sc;
        self.esc_direct[k] = sc;
    }
    /// Convert a configured model.
    pub fn from_model(model: &Plan7Model, fold: FoldMode) -> Result<Self> {
        model.validate()?;
        let alphabet = Alphabet::from_kind(model.alphabet);
        let (m, nsym) = (model.m, alphabet.size());
        let wildcard = alphabet.wildcard() as usize;
        let mut prof = Self::empty(&alphabet, m);
        let null_total: f32 = model.null.iter().sum();
        let p1 = model.p1;
        for k in 1..=m {
            for x in 0..nsym {
                prof.msc[x][k] = prob2score(model.mat[k][x], model.null[x]);
            }
            prof.msc[wildcard][k] = prob2score(model.mat[k].iter().sum(), null_total);
            if k < m {
                for x in 0..nsym {
                    prof.isc[x][k] = prob2score(model.ins[k][x], model.null[x]);
                }
                prof.isc[wildcard][k] = prob2score(model.ins[k].iter().sum(), null_total);
                let t = &model.t[k];
                prof.tsc[TMM][k] = prob2score(t[TMM], p1);
                prof.tsc[TMI][k] = prob2score(t[TMI], p1);
                prof.tsc[TMD][k] = prob2score(t[TMD], 1f32);
                prof.tsc[TIM][k] = prob2score(t[TIM], p1);
                prof.tsc[TII][k] = prob2score(t[TII], p1);
                prof.tsc[TDM][k] = prob2score(t[TDM], p1);
                prof.tsc[TDD][k] = prob2score(t[TDD], 1f32);
            }
            prof.bsc_direct[k] = prob2score(model.begin[k], p1);
            prof.esc_direct[k] = prob2score(model.end[k], 1f32);
        }
        // B->D1->...->D_{k-1}->M_k
        let mut accum = ln(model.tbd1);
        for k in 1..=m {
            let mut tbm = ln(model.begin[k]);
            if k > 1 {
                tbm = ln_add(tbm, accum + ln(model.t[k - 1][TDM]), fold);
                accum += ln(model.t[k - 1][TDD]);
            }
            prof.bsc[k] = ln2score(tbm - ln(p1));
        }
        // M_k->D_{k+1}->...->D_M->E
        prof.esc[m] = 0;
        let mut accum = 0f64;
        for k in (1..m).rev() {
            let tme = ln_add(ln(model.end[k]), accum + ln(model.t[k][TMD]), fold);
            accum += ln(model.t[k][TDD]);
            prof.esc[k] = ln2score(tme);
        }
        let xt = &model.xt;
        prof.xsc[XTN][LOOP] = prob2score(xt[XTN][LOOP], p1);
        prof.xsc[XTN][MOVE] = prob2score(xt[XTN][MOVE], 1f32);
        prof.xsc[XTE][LOOP] = prob2score(xt[XTE][LOOP], 1f32);
        prof.xsc[XTE][MOVE] = prob2score(xt[XTE][MOVE], 1f32);
        prof.xsc[XTC][LOOP] = prob2score(xt[XTC][LOOP], p1);
        prof.xsc[XTC][MOVE] = prob2score(xt[XTC][MOVE], 1f32 - p1);
        prof.xsc[XTJ][LOOP] = prob2score(xt[XTJ][LOOP], p1);
        prof.xsc[XTJ][MOVE] = prob2score(xt[XTJ][MOVE], 1f32);
        Ok(prof)
    }
    /// True when B->M_k owes at least one bit to the D1 wing, so a traceback
    /// through it should spell out the delete states.
    pub fn unfold_begin(&self, k: usize) -> bool {
        sadd(self.bsc_direct[k], INTSCALE_I) <= self.bsc[k]
    }
    /// Same as [`Profile::unfold_begin`] for M_k->E and the D_M wing.
    pub fn unfold_end(&self, k: usize) -> bool {
        sadd(self.esc_direct[k], INTSCALE_I) <= self.esc[k]
    }
    /// Score of a single Plan7 transition. Wing transitions (B->D, D->E) and the
    /// S/T edges score zero; callers handle folded wings themselves.
    pub fn transition_score(&self, from: State, k1: usize, to: State, k2: usize) -> i32 {
        use State::*;
        match (from, to) {
            (S, N) | (B, D) | (D, E) => 0,
            (N, N) => self.xsc[XTN][LOOP],
            (N, B) => self.xsc[XTN][MOVE],
            (B, M) => self.bsc[k2],
            (M, M) => self.tsc[TMM][k1],
            (M, I) => self.tsc[TMI][k1],
            (M, D) => self.tsc[TMD][k1],
            (M, E) => self.esc[k1],
            (I, M) => self.tsc[TIM][k1],
            (I, I) => self.tsc[TII][k1],
            (D, M) => self.tsc[TDM][k1],
            (D, D) => self.tsc[TDD][k1],
            (E, C) => self.xsc[XTE][MOVE],
            (E, J) => self.xsc[XTE][LOOP],
            (J, B) => self.xsc[XTJ][MOVE],
            (J, J) => self.xsc[XTJ][LOOP],
            (C, C) => self.xsc[XTC][LOOP],
            (C, T) => self.xsc[XTC][MOVE],
            _ => NEG_INF,
        }
    }
}
