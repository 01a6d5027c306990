//! DP matrices: score planes for the Plan7 recursions and the shadow matrix of
//! predecessor tags.
//!
//! Each plane is one flat vector of fixed-stride rows. A matrix only ever
//! grows, so a caller aligning many sequences allocates once for the largest.
use crate::logsum::NEG_INF;
use crate::trace::State;

// Columns of the special plane.
pub const XMB: usize = 0;
pub const XME: usize = 1;
pub const XMC: usize = 2;
pub const XMJ: usize = 3;
pub const XMN: usize = 4;
pub const NSPECIAL: usize = 5;

/// Match, insert, delete and special score planes.
/// Rows are sequence positions, columns are nodes `0..=m` plus one spare.
#[derive(Debug, Clone)]
pub struct DpMatrix {
    mmx: Vec<i32>,
    imx: Vec<i32>,
    dmx: Vec<i32>,
    xmx: Vec<i32>,
    // Allocated rows.
    rows: usize,
    // Allocated row width, m + 2.
    stride: usize,
    // Extra rows/nodes allocated whenever the matrix has to grow.
    pad_rows: usize,
    pad_nodes: usize,
}

impl DpMatrix {
    pub fn new(rows: usize, m: usize) -> Self {
        Self::with_padding(rows, m, 0, 0)
    }
    pub fn with_padding(rows: usize, m: usize, pad_rows: usize, pad_nodes: usize) -> Self {
        let stride = m + 2;
        Self {
            mmx: vec![NEG_INF; rows * stride],
            imx: vec![NEG_INF; rows * stride],
            dmx: vec![NEG_INF; rows * stride],
            xmx: vec![NEG_INF; rows * NSPECIAL],
            rows,
            stride,
            pad_rows,
            pad_nodes,
        }
    }
    /// Make room for `rows` rows and `m` nodes. Never shrinks; a dimension
    /// that has to grow gets the padding on top. Cell contents are
    /// unspecified afterwards.
    pub fn resize(&mut self, rows: usize, m: usize) {
        if self.covers(rows, m) {
            return;
        }
        if rows > self.rows {
            self.rows = rows + self.pad_rows;
        }
        if m + 2 > self.stride {
            self.stride = m + 2 + self.pad_nodes;
        }
        let cells = self.rows * self.stride;
        for plane in [&mut self.mmx, &mut self.imx, &mut self.dmx] {
            plane.clear();
            plane.resize(cells, NEG_INF);
        }
        self.xmx.clear();
        self.xmx.resize(self.rows * NSPECIAL, NEG_INF);
    }
    /// True if `rows x m` fits without growing.
    pub fn covers(&self, rows: usize, m: usize) -> bool {
        rows <= self.rows && m + 2 <= self.stride
    }
    pub fn rows(&self) -> usize {
        self.rows
    }
    /// Largest model length the matrix holds.
    pub fn nodes(&self) -> usize {
        self.stride - 2
    }
    #[inline]
    fn idx(&self, i: usize, k: usize) -> usize {
        debug_assert!(i < self.rows && k < self.stride);
        i * self.stride + k
    }
    #[inline]
    pub fn mmx(&self, i: usize, k: usize) -> i32 {
        self.mmx[self.idx(i, k)]
    }
    #[inline]
    pub fn imx(&self, i: usize, k: usize) -> i32 {
        self.imx[self.idx(i, k)]
    }
    #[inline]
    pub fn dmx(&self, i: usize, k: usize) -> i32 {
        self.dmx[self.idx(i, k)]
    }
    #[inline]
    pub fn xmx(&self, i: usize, s: usize) -> i32 {
        self.xmx[i * NSPECIAL + s]
    }
    #[inline]
    pub fn mmx_mut(&mut self, i: usize, k: usize) -> &mut i32 {
        let idx = self.idx(i, k);
        &mut self.mmx[idx]
    }
    #[inline]
    pub fn imx_mut(&mut self, i: usize, k: usize) -> &mut i32 {
        let idx = self.idx(i, k);
        &mut self.imx[idx]
    }
    #[inline]
    pub fn dmx_mut(&mut self, i: usize, k: usize) -> &mut i32 {
        let idx = self.idx(i, k);
        &mut self.dmx[idx]
    }
    #[inline]
    pub fn xmx_mut(&mut self, i: usize, s: usize) -> &mut i32 {
        &mut self.xmx[i * NSPECIAL + s]
    }
    /// Match scores of row `i`, nodes `0..=m`.
    pub fn mmx_row(&self, i: usize) -> &[i32] {
        &self.mmx[i * self.stride..(i + 1) * self.stride - 1]
    }
    /// Set every main-state cell of row `i` to `NEG_INF`.
    pub fn clear_row(&mut self, i: usize) {
        let range = i * self.stride..(i + 1) * self.stride;
        for plane in [&mut self.mmx, &mut self.imx, &mut self.dmx] {
            plane[range.clone()].iter_mut().for_each(|x| *x = NEG_INF);
        }
        self.xmx[i * NSPECIAL..(i + 1) * NSPECIAL]
            .iter_mut()
            .for_each(|x| *x = NEG_INF);
    }
}

/// Predecessor tags for each cell, filled alongside a score matrix, so the
/// traceback does not recompute candidate scores.
#[derive(Debug, Clone)]
pub struct ShadowMatrix {
    mtb: Vec<State>,
    itb: Vec<State>,
    dtb: Vec<State>,
    xtb: Vec<State>,
    // Node of the M state feeding E, per row.
    etb: Vec<usize>,
    rows: usize,
    stride: usize,
}

impl ShadowMatrix {
    pub fn new(rows: usize, m: usize) -> Self {
        let stride = m + 2;
        Self {
            mtb: vec![State::S; rows * stride],
            itb: vec![State::S; rows * stride],
            dtb: vec![State::S; rows * stride],
            xtb: vec![State::S; rows * NSPECIAL],
            etb: vec![0; rows],
            rows,
            stride,
        }
    }
    pub fn rows(&self) -> usize {
        self.rows
    }
    #[inline]
    pub fn mtb(&self, i: usize, k: usize) -> State {
        self.mtb[i * self.stride + k]
    }
    #[inline]
    pub fn itb(&self, i: usize, k: usize) -> State {
        self.itb[i * self.stride + k]
    }
    #[inline]
    pub fn dtb(&self, i: usize, k: usize) -> State {
        self.dtb[i * self.stride + k]
    }
    #[inline]
    pub fn xtb(&self, i: usize, s: usize) -> State {
        self.xtb[i * NSPECIAL + s]
    }
    #[inline]
    pub fn etb(&self, i: usize) -> usize {
        self.etb[i]
    }
    pub fn set_mtb(&mut self, i: usize, k: usize, st: State) {
        self.mtb[i * self.stride + k] = st;
    }
    pub fn set_itb(&mut self, i: usize, k: usize, st: State) {
        self.itb[i * self.stride + k] = st;
    }
    pub fn set_dtb(&mut self, i: usize, k: usize, st: State) {
        self.dtb[i * self.stride + k] = st;
    }
    pub fn set_xtb(&mut self, i: usize, s: usize, st: State) {
        self.xtb[i * NSPECIAL + s] = st;
    }
    pub fn set_etb(&mut self, i: usize, k: usize) {
        self.etb[i] = k;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn grows_never_shrinks() {
        let mut mx = DpMatrix::with_padding(10, 5, 4, 2);
        assert!(mx.covers(10, 5));
        assert!(!mx.covers(11, 5));
        mx.resize(3, 2);
        assert_eq!((mx.rows(), mx.nodes()), (10, 5));
        mx.resize(12, 5);
        assert_eq!((mx.rows(), mx.nodes()), (16, 5));
        mx.resize(12, 6);
        assert_eq!((mx.rows(), mx.nodes()), (16, 8));
        assert!(mx.covers(16, 8));
        *mx.mmx_mut(15, 9) = 3;
        *mx.xmx_mut(15, XMN) = 4;
        assert_eq!(mx.mmx(15, 9), 3);
        assert_eq!(mx.xmx(15, XMN), 4);
        assert_eq!(mx.mmx_row(15).len(), 9);
        mx.clear_row(15);
        assert_eq!(mx.mmx(15, 9), NEG_INF);
        assert_eq!(mx.xmx(15, XMN), NEG_INF);
    }
    #[test]
    fn shadow_tags() {
        let mut tb = ShadowMatrix::new(3, 4);
        tb.set_mtb(2, 4, State::D);
        tb.set_xtb(1, XMC, State::E);
        tb.set_etb(1, 3);
        assert_eq!(tb.mtb(2, 4), State::D);
        assert_eq!(tb.xtb(1, XMC), State::E);
        assert_eq!(tb.etb(1), 3);
        assert_eq!(tb.itb(0, 0), State::S);
    }
}
