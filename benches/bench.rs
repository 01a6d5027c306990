#![feature(test)]
extern crate test;
use plan7::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
const SEED: u64 = 1293890;
const MODEL_LEN: usize = 200;
const FLANK: usize = 100;

fn setup() -> (Profile, DigitalSeq) {
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(SEED);
    let abc = Alphabet::amino();
    let mode = AlignMode::default();
    let (model, prof) = gen_seq::random_model_profile(&mut rng, &abc, MODEL_LEN, mode);
    let seq = gen_seq::sample_multi_domain(&model, &mut rng, 2, FLANK);
    (prof, abc.digitize(&seq).unwrap())
}

#[bench]
fn viterbi_full(b: &mut test::Bencher) {
    let (prof, dsq) = setup();
    let mut mx = DpMatrix::new(0, 0);
    b.iter(|| {
        viterbi::viterbi(&prof, &dsq, &mut mx);
        viterbi::viterbi_trace(&prof, &dsq, &mx)
    });
}

#[bench]
fn viterbi_linear(b: &mut test::Bencher) {
    let (prof, dsq) = setup();
    let config = AlignConfig::default().ram_limit(0);
    b.iter(|| small_viterbi(&prof, &dsq, &mut DpMatrix::new(0, 0), &config));
}

#[bench]
fn parse_only(b: &mut test::Bencher) {
    let (prof, dsq) = setup();
    b.iter(|| linear::parsing_viterbi(&prof, &dsq));
}

#[bench]
fn forward_two_rows(b: &mut test::Bencher) {
    let (prof, dsq) = setup();
    b.iter(|| forward::forward_score(&prof, &dsq));
}

#[bench]
fn posterior_decoding(b: &mut test::Bencher) {
    let (prof, dsq) = setup();
    let mut aligner = Aligner::new(AlignConfig::default());
    b.iter(|| aligner.posterior_decode(&prof, &dsq));
}
