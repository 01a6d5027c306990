//! Residue alphabets and digitized sequences.
//!
//! An [`Alphabet`] is an immutable value: pass it to whatever needs to map bytes
//! to symbol indices. Canonical residues take codes `0..K`. Every ambiguity code
//! collapses to the wildcard `K`, and alignment gaps take `K + 1`.
use crate::error::{Plan7Error, Result};
use serde::{Deserialize, Serialize};

/// Marker for a byte outside the alphabet.
const UNKNOWN: u8 = 0xFE;
/// Value stored at positions `0` and `L + 1` of a [`DigitalSeq`].
pub const SENTINEL: u8 = 0xFF;

const DNA_SYMBOLS: &[u8] = b"ACGT";
const DNA_DEGENERATE: &[u8] = b"NRYMKSWHBVDX";
const AMINO_SYMBOLS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
const AMINO_DEGENERATE: &[u8] = b"XBZJUO*";

const fn lookup_table(symbols: &[u8], degenerate: &[u8], extra: &[(u8, u8)]) -> [u8; 256] {
    let mut slots = [UNKNOWN; 256];
    let wildcard = symbols.len() as u8;
    let mut i = 0;
    while i < symbols.len() {
        slots[symbols[i] as usize] = i as u8;
        slots[symbols[i].to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    let mut i = 0;
    while i < degenerate.len() {
        slots[degenerate[i] as usize] = wildcard;
        slots[degenerate[i].to_ascii_lowercase() as usize] = wildcard;
        i += 1;
    }
    let mut i = 0;
    while i < extra.len() {
        slots[extra[i].0 as usize] = extra[i].1;
        slots[extra[i].0.to_ascii_lowercase() as usize] = extra[i].1;
        i += 1;
    }
    slots[b'-' as usize] = wildcard + 1;
    slots[b'.' as usize] = wildcard + 1;
    slots
}

// RNA U reads as T.
const DNA_TABLE: [u8; 256] = lookup_table(DNA_SYMBOLS, DNA_DEGENERATE, &[(b'U', 3)]);
const AMINO_TABLE: [u8; 256] = lookup_table(AMINO_SYMBOLS, AMINO_DEGENERATE, &[]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlphabetKind {
    Dna,
    Amino,
}

/// Immutable residue alphabet.
#[derive(Debug, Clone)]
pub struct Alphabet {
    kind: AlphabetKind,
    symbols: &'static [u8],
    wildcard: u8,
    table: &'static [u8; 256],
}

impl Alphabet {
    pub fn dna() -> Self {
        Self {
            kind: AlphabetKind::Dna,
            symbols: DNA_SYMBOLS,
            wildcard: b'N',
            table: &DNA_TABLE,
        }
    }
    pub fn amino() -> Self {
        Self {
            kind: AlphabetKind::Amino,
            symbols: AMINO_SYMBOLS,
            wildcard: b'X',
            table: &AMINO_TABLE,
        }
    }
    pub fn from_kind(kind: AlphabetKind) -> Self {
        match kind {
            AlphabetKind::Dna => Self::dna(),
            AlphabetKind::Amino => Self::amino(),
        }
    }
    pub fn kind(&self) -> AlphabetKind {
        self.kind
    }
    /// Number of canonical symbols, `K`.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }
    /// Number of symbols a profile scores: canonical ones plus the wildcard.
    pub fn score_size(&self) -> usize {
        self.symbols.len() + 1
    }
    /// Digital code of the wildcard.
    pub fn wildcard(&self) -> u8 {
        self.symbols.len() as u8
    }
    /// Digital code of an alignment gap.
    pub fn gap(&self) -> u8 {
        self.symbols.len() as u8 + 1
    }
    /// Digital code of `byte`, gaps included.
    pub fn encode(&self, byte: u8) -> Option<u8> {
        match self.table[byte as usize] {
            UNKNOWN => None,
            code => Some(code),
        }
    }
    pub fn decode(&self, code: u8) -> u8 {
        match code as usize {
            x if x < self.symbols.len() => self.symbols[x],
            x if x == self.symbols.len() => self.wildcard,
            _ => b'-',
        }
    }
    /// Digitize a raw sequence. Gaps and unknown bytes are rejected.
    pub fn digitize(&self, seq: &[u8]) -> Result<DigitalSeq> {
        let mut dsq = Vec::with_capacity(seq.len() + 2);
        dsq.push(SENTINEL);
        for (pos, &byte) in seq.iter().enumerate() {
            match self.encode(byte) {
                Some(code) if code <= self.wildcard() => dsq.push(code),
                _ => {
                    return Err(Plan7Error::InvalidResidue {
                        byte: byte as char,
                        pos: pos + 1,
                    })
                }
            }
        }
        dsq.push(SENTINEL);
        Ok(DigitalSeq { dsq })
    }
    /// Text form of a digitized sequence.
    pub fn textize(&self, dsq: &DigitalSeq) -> Vec<u8> {
        dsq.residues().iter().map(|&x| self.decode(x)).collect()
    }
}

/// A 1-indexed digitized sequence with sentinels at `0` and `L + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigitalSeq {
    dsq: Vec<u8>,
}

impl DigitalSeq {
    /// Wrap digital codes, which are not checked against any alphabet.
    pub fn from_codes(codes: &[u8]) -> Self {
        let mut dsq = Vec::with_capacity(codes.len() + 2);
        dsq.push(SENTINEL);
        dsq.extend_from_slice(codes);
        dsq.push(SENTINEL);
        Self { dsq }
    }
    pub fn len(&self) -> usize {
        self.dsq.len() - 2
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Residues `1..=L` without sentinels.
    pub fn residues(&self) -> &[u8] {
        &self.dsq[1..self.dsq.len() - 1]
    }
    /// Residues `start..=end` (1-indexed) as a new padded sequence.
    pub fn subseq(&self, start: usize, end: usize) -> Self {
        assert!(
            1 <= start && start <= end + 1 && end <= self.len(),
            "subsequence {}..={} out of 1..={}",
            start,
            end,
            self.len()
        );
        Self::from_codes(&self.dsq[start..=end])
    }
}

impl std::ops::Index<usize> for DigitalSeq {
    type Output = u8;
    fn index(&self, i: usize) -> &u8 {
        &self.dsq[i]
    }
}
