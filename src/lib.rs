//! Dynamic programming for Plan7 profile HMMs: Forward, Backward, Viterbi with
//! traceback, posterior decoding, and Viterbi in linear memory.
#[macro_use]
extern crate log;
pub mod aligner;
pub mod alphabet;
pub mod dptable;
pub mod error;
pub mod forward;
pub mod gen_seq;
pub mod linear;
pub mod logsum;
pub mod posterior;
pub mod profile;
pub mod shadow;
pub mod trace;
pub mod viterbi;

pub use aligner::{viterbi_batch, Aligner, Decoding};
pub use alphabet::{Alphabet, AlphabetKind, DigitalSeq};
pub use dptable::{DpMatrix, ShadowMatrix};
pub use error::{Plan7Error, TraceError};
pub use linear::{small_viterbi, AlignConfig, Strategy};
pub use profile::{AlignMode, FoldMode, Plan7Model, Profile};
pub use shadow::{viterbi_align_alignment, Consensus};
pub use trace::{State, Trace, TraceCell};
