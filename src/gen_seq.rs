//! This module is to generate random models and sequences sampled from them.
//! Usually, it would not be used in real applications. Tests and benchmarks use it.
use crate::alphabet::Alphabet;
use crate::profile::*;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

// Index drawn in proportion to `weights`.
fn pick<R: Rng>(rng: &mut R, weights: &[f32]) -> usize {
    match WeightedIndex::new(weights) {
        Ok(dist) => dist.sample(rng),
        Err(why) => panic!("cannot sample from {:?}: {}", weights, why),
    }
}

fn normalized<R: Rng>(rng: &mut R, len: usize, peak: Option<usize>) -> Vec<f32> {
    let mut xs: Vec<f32> = (0..len).map(|_| rng.gen_range(0.05f32..1f32)).collect();
    if let Some(p) = peak {
        xs[p] += len as f32 * 0.5;
    }
    let sum: f32 = xs.iter().sum();
    xs.iter_mut().for_each(|x| *x /= sum);
    xs
}

/// Random residues drawn uniformly from the canonical symbols.
pub fn generate_seq<R: Rng>(rng: &mut R, alphabet: &Alphabet, len: usize) -> Vec<u8> {
    let k = alphabet.size() as u8;
    (0..len).map(|_| alphabet.decode(rng.gen_range(0..k))).collect()
}

/// A random, unconfigured model of length `m`. Every probability is positive, so
/// any sequence can be aligned once the model is configured. Match states favor
/// one residue each.
pub fn random_model<R: Rng>(rng: &mut R, alphabet: &Alphabet, m: usize) -> Plan7Model {
    let k = alphabet.size();
    let mut model = Plan7Model::new(alphabet, m);
    for node in 1..=m {
        let peak = rng.gen_range(0..k);
        model.mat[node] = normalized(rng, k, Some(peak));
        if node < m {
            model.ins[node] = normalized(rng, k, None);
            let mm = rng.gen_range(0.7f32..0.95);
            let mi = rng.gen_range(0.2f32..0.8) * (1f32 - mm);
            let im = rng.gen_range(0.4f32..0.9);
            let dm = rng.gen_range(0.4f32..0.9);
            model.t[node] = [mm, mi, 1f32 - mm - mi, im, 1f32 - im, dm, 1f32 - dm];
        }
    }
    model.tbd1 = rng.gen_range(0.01f32..0.2);
    model.set_null_length(350f32);
    model
}

/// A random model configured for `mode`, with its Viterbi profile.
pub fn random_model_profile<R: Rng>(
    rng: &mut R,
    alphabet: &Alphabet,
    m: usize,
    mode: AlignMode,
) -> (Plan7Model, Profile) {
    let mut model = random_model(rng, alphabet, m);
    model.configure(mode);
    match Profile::from_model(&model, FoldMode::Max) {
        Ok(prof) => (model, prof),
        Err(why) => panic!("random model failed to convert: {}", why),
    }
}

/// Viterbi profile of a random model configured for `mode`.
pub fn random_profile<R: Rng>(
    rng: &mut R,
    alphabet: &Alphabet,
    m: usize,
    mode: AlignMode,
) -> Profile {
    random_model_profile(rng, alphabet, m, mode).1
}

/// The most likely residue of each match state.
pub fn consensus(model: &Plan7Model) -> Vec<u8> {
    let abc = Alphabet::from_kind(model.alphabet);
    model.mat[1..]
        .iter()
        .map(|probs| {
            let (best, _) = probs.iter().enumerate().fold((0, f32::MIN), |acc, (x, &p)| {
                if p > acc.1 {
                    (x, p)
                } else {
                    acc
                }
            });
            abc.decode(best as u8)
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Node {
    M(usize),
    I(usize),
    D(usize),
    E,
}

/// Residues of one pass from B to E through a configured model. Paths that
/// emit nothing are resampled.
pub fn sample_domain<R: Rng>(model: &Plan7Model, rng: &mut R) -> Vec<u8> {
    let abc = Alphabet::from_kind(model.alphabet);
    let m = model.m;
    loop {
        let mut seq = vec![];
        let mut entry = vec![model.tbd1];
        entry.extend_from_slice(&model.begin[1..]);
        let mut node = match pick(rng, &entry) {
            0 => Node::D(1),
            k => Node::M(k),
        };
        loop {
            node = match node {
                Node::M(k) => {
                    seq.push(abc.decode(pick(rng, &model.mat[k]) as u8));
                    if k == m {
                        Node::E
                    } else {
                        let t = &model.t[k];
                        match pick(rng, &[t[TMM], t[TMI], t[TMD], model.end[k]]) {
                            0 => Node::M(k + 1),
                            1 => Node::I(k),
                            2 => Node::D(k + 1),
                            _ => Node::E,
                        }
                    }
                }
                Node::I(k) => {
                    seq.push(abc.decode(pick(rng, &model.ins[k]) as u8));
                    match pick(rng, &[model.t[k][TIM], model.t[k][TII]]) {
                        0 => Node::M(k + 1),
                        _ => Node::I(k),
                    }
                }
                Node::D(k) if k == m => Node::E,
                Node::D(k) => match pick(rng, &[model.t[k][TDM], model.t[k][TDD]]) {
                    0 => Node::M(k + 1),
                    _ => Node::D(k + 1),
                },
                Node::E => break,
            };
        }
        if !seq.is_empty() {
            return seq;
        }
    }
}

fn background<R: Rng>(model: &Plan7Model, rng: &mut R, len: usize) -> Vec<u8> {
    let abc = Alphabet::from_kind(model.alphabet);
    (0..len)
        .map(|_| abc.decode(pick(rng, &model.null) as u8))
        .collect()
}

/// One domain between random background flanks of up to `flank` residues each.
pub fn sample_with_flanks<R: Rng>(model: &Plan7Model, rng: &mut R, flank: usize) -> Vec<u8> {
    sample_multi_domain(model, rng, 1, flank)
}

/// `domains` domains separated by, and flanked with, up to `flank` background
/// residues.
pub fn sample_multi_domain<R: Rng>(
    model: &Plan7Model,
    rng: &mut R,
    domains: usize,
    flank: usize,
) -> Vec<u8> {
    let mut seq = vec![];
    for _ in 0..domains {
        let len = rng.gen_range(0..=flank);
        seq.extend(background(model, rng, len));
        seq.extend(sample_domain(model, rng));
    }
    let len = rng.gen_range(0..=flank);
    seq.extend(background(model, rng, len));
    seq
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn sampled_models_are_valid() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(1);
        let abc = Alphabet::amino();
        for m in [1, 3, 40] {
            let (model, _) = random_model_profile(&mut rng, &abc, m, AlignMode::Glocal);
            model.validate().unwrap();
            assert_eq!(consensus(&model).len(), m);
            let seq = sample_multi_domain(&model, &mut rng, 3, 5);
            assert!(abc.digitize(&seq).is_ok());
        }
    }
    #[test]
    fn pick_follows_weights() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(2);
        let mut counts = [0; 3];
        for _ in 0..3000 {
            counts[pick(&mut rng, &[0.1, 0f32, 0.9])] += 1;
        }
        assert_eq!(counts[1], 0);
        assert!(counts[2] > counts[0] * 4);
    }
    #[test]
    #[should_panic]
    fn pick_needs_some_weight() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3);
        pick(&mut rng, &[0f32, 0f32]);
    }
}
