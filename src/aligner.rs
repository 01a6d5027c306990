//! A reusable aligner: configuration plus the matrices it grows over time.
use crate::alphabet::DigitalSeq;
use crate::dptable::DpMatrix;
use crate::forward::*;
use crate::linear::*;
use crate::logsum::*;
use crate::posterior::*;
use crate::profile::Profile;
use crate::trace::Trace;
use crate::viterbi::*;
use rayon::prelude::*;

/// Result of posterior decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoding {
    /// Forward score in bits.
    pub forward: f32,
    /// Expected number of correctly aligned residues on the optimal-accuracy path.
    pub accuracy: f32,
    pub trace: Option<Trace>,
}

/// Aligns sequences one after another against any profile, keeping its
/// matrices between calls. Not shared between threads; give each worker its own.
#[derive(Debug, Clone)]
pub struct Aligner {
    config: AlignConfig,
    mx: DpMatrix,
    bck: DpMatrix,
    post: DpMatrix,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        let new_mx = || DpMatrix::with_padding(0, 0, config.pad_rows, config.pad_nodes);
        Self {
            config,
            mx: new_mx(),
            bck: new_mx(),
            post: new_mx(),
        }
    }
    /// Viterbi score in bits, and the trace when `want_trace` is set and the
    /// sequence aligns. Falls back to linear memory when a full matrix would
    /// exceed the budget.
    pub fn viterbi(
        &mut self,
        profile: &Profile,
        dsq: &DigitalSeq,
        want_trace: bool,
    ) -> (f32, Option<Trace>) {
        let (l, m) = (dsq.len(), profile.m);
        let strategy = Strategy::choose(l, m, &self.mx, &self.config);
        debug!(
            "viterbi L={} M={}: {:?} ({:.2}MB for a full matrix, limit {}MB)",
            l,
            m,
            strategy,
            viterbi_size_mb(l, m),
            self.config.ram_limit_mb
        );
        match (strategy, want_trace) {
            (Strategy::Full, _) => {
                let sc = viterbi(profile, dsq, &mut self.mx);
                let tr = if want_trace {
                    viterbi_trace(profile, dsq, &self.mx)
                } else {
                    None
                };
                (sc, tr)
            }
            (Strategy::Linear, true) => small_viterbi(profile, dsq, &mut self.mx, &self.config),
            (Strategy::Linear, false) => match parsing_viterbi(profile, dsq) {
                Some(parse) => (scorify(parse.score), None),
                None => (f32::NEG_INFINITY, None),
            },
        }
    }
    /// Forward score in bits, in two rows when the full matrix does not fit.
    pub fn forward(&mut self, profile: &Profile, dsq: &DigitalSeq) -> f32 {
        match Strategy::choose(dsq.len(), profile.m, &self.mx, &self.config) {
            Strategy::Full => forward(profile, dsq, &mut self.mx),
            Strategy::Linear => forward_score(profile, dsq),
        }
    }
    /// Backward score in bits. Always fills the full matrix.
    pub fn backward(&mut self, profile: &Profile, dsq: &DigitalSeq) -> f32 {
        backward(profile, dsq, &mut self.bck)
    }
    /// Forward, Backward, posterior decoding and the optimal-accuracy trace.
    /// Full matrices are used regardless of the memory budget. The posterior
    /// matrix stays available through [`Aligner::posterior_matrix`].
    pub fn posterior_decode(&mut self, profile: &Profile, dsq: &DigitalSeq) -> Decoding {
        let l = dsq.len();
        let total = forward_fill(profile, dsq, &mut self.mx);
        if total <= NEG_INF {
            return Decoding {
                forward: f32::NEG_INFINITY,
                accuracy: f32::NEG_INFINITY,
                trace: None,
            };
        }
        backward_fill(profile, dsq, &mut self.bck);
        posterior(profile, &self.mx, &self.bck, l, total, &mut self.post);
        // The Forward matrix is spent; reuse it for the accuracy fill.
        let accuracy = optimal_accuracy(profile, &self.post, l, &mut self.mx);
        let trace = optimal_accuracy_trace(profile, &self.post, &self.mx, l);
        trace!("posterior decoding L={}: forward {}, accuracy {}", l, total, accuracy);
        Decoding {
            forward: scorify(total),
            accuracy,
            trace,
        }
    }
    /// Posterior matrix of the last [`Aligner::posterior_decode`].
    pub fn posterior_matrix(&self) -> &DpMatrix {
        &self.post
    }
}

/// Viterbi for each sequence in parallel, one [`Aligner`] per worker. Output
/// order follows `seqs`.
pub fn viterbi_batch(
    config: &AlignConfig,
    profile: &Profile,
    seqs: &[DigitalSeq],
    want_trace: bool,
) -> Vec<(f32, Option<Trace>)> {
    debug!("aligning {} sequences against M={}", seqs.len(), profile.m);
    seqs.par_iter()
        .map_init(
            || Aligner::new(*config),
            |aligner, dsq| aligner.viterbi(profile, dsq, want_trace),
        )
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::gen_seq::*;
    use crate::profile::*;
    use crate::trace::State;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn budget_does_not_change_alignments() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3020);
        let abc = Alphabet::amino();
        let mut roomy = Aligner::new(AlignConfig::default().padding(10, 5));
        let mut tight = Aligner::new(AlignConfig::default().ram_limit(0));
        for _ in 0..10 {
            let (model, prof) = random_model_profile(&mut rng, &abc, 30, AlignMode::default());
            let dsq = abc.digitize(&sample_multi_domain(&model, &mut rng, 2, 15)).unwrap();
            let (sc, tr) = roomy.viterbi(&prof, &dsq, true);
            let (tight_sc, tight_tr) = tight.viterbi(&prof, &dsq, true);
            assert_eq!(sc, tight_sc);
            assert_eq!(tr, tight_tr);
            let (no_trace_sc, none) = tight.viterbi(&prof, &dsq, false);
            assert_eq!(no_trace_sc, sc);
            assert!(none.is_none());
            assert!((roomy.forward(&prof, &dsq) - tight.forward(&prof, &dsq)).abs() < 1e-3);
        }
        // Two best paths: the tight aligner still reports the full traceback's pick.
        let prof = crate::viterbi::test::tied_profile();
        let dsq = Alphabet::dna().digitize(b"AAA").unwrap();
        let (sc, tr) = roomy.viterbi(&prof, &dsq, true);
        assert_eq!(tight.viterbi(&prof, &dsq, true), (sc, tr.clone()));
        let nodes: Vec<_> = tr.unwrap().cells().iter().map(|c| (c.state, c.node)).collect();
        let expected = [(State::M, 1), (State::I, 1), (State::M, 2)];
        assert_eq!(nodes[3..6], expected);
    }
    #[test]
    fn decoding() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3021);
        let abc = Alphabet::dna();
        let mut aligner = Aligner::new(AlignConfig::default());
        for _ in 0..5 {
            let (model, prof) = random_model_profile(&mut rng, &abc, 20, AlignMode::Glocal);
            let dsq = abc.digitize(&sample_with_flanks(&model, &mut rng, 10)).unwrap();
            let decoded = aligner.posterior_decode(&prof, &dsq);
            let vit = aligner.viterbi(&prof, &dsq, false).0;
            assert!(decoded.forward >= vit);
            assert!((aligner.backward(&prof, &dsq) - decoded.forward).abs() < 0.5);
            decoded.trace.unwrap().validate(prof.m, dsq.len()).unwrap();
            assert!(aligner.posterior_matrix().rows() > dsq.len());
        }
    }
    #[test]
    fn batch_keeps_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3022);
        let abc = Alphabet::dna();
        let (model, prof) = random_model_profile(&mut rng, &abc, 15, AlignMode::default());
        let seqs: Vec<_> = (0..40)
            .map(|_| abc.digitize(&sample_with_flanks(&model, &mut rng, 20)).unwrap())
            .collect();
        let config = AlignConfig::default();
        let batch = viterbi_batch(&config, &prof, &seqs, true);
        let mut aligner = Aligner::new(config);
        for (dsq, (sc, tr)) in seqs.iter().zip(batch) {
            let (expected, expected_tr) = aligner.viterbi(&prof, dsq, true);
            assert_eq!(sc, expected);
            assert_eq!(tr, expected_tr);
        }
    }
}
