use crate::domain::model::Subsample;
use crate::domain::ports::DataSampler;
use crate::utils::error::{EnsembleError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub const SAMPLER_NAMES: [&str; 3] = ["bootstrap", "subsample", "stratified"];

pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

pub fn get_data_sampler(name: &str, n_samples: usize) -> Result<Box<dyn DataSampler>> {
    match name {
        "bootstrap" => Ok(Box::new(BootstrapSampler::new(n_samples))),
        "subsample" => Ok(Box::new(SubSampler::new(n_samples))),
        "stratified" => Ok(Box::new(StratifiedSampler::new(n_samples))),
        other => Err(EnsembleError::UnknownSamplerError(other.to_string())),
    }
}

fn check_inputs(x: &ArrayView2<f64>, y: &ArrayView1<usize>) -> Result<usize> {
    if x.nrows() != y.len() {
        return Err(EnsembleError::ShapeError {
            message: format!("x has {} rows but y has {} labels", x.nrows(), y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(EnsembleError::DataError {
            message: "cannot sample from an empty dataset".to_string(),
        });
    }
    Ok(x.nrows())
}

fn gather(x: ArrayView2<f64>, y: ArrayView1<usize>, indices: Vec<usize>) -> Subsample {
    Subsample {
        x: x.select(Axis(0), &indices),
        y: indices.iter().map(|&i| y[i]).collect::<Array1<usize>>(),
        indices,
    }
}

/// Uniform draws with replacement.
#[derive(Debug, Clone)]
pub struct BootstrapSampler {
    n_samples: usize,
}

impl BootstrapSampler {
    pub fn new(n_samples: usize) -> Self {
        Self { n_samples }
    }
}

impl DataSampler for BootstrapSampler {
    fn sample(&self, x: ArrayView2<f64>, y: ArrayView1<usize>, rng: &mut StdRng) -> Result<Subsample> {
        let n = check_inputs(&x, &y)?;
        let take = self.n_samples.min(n);
        let indices = (0..take).map(|_| rng.random_range(0..n)).collect();
        Ok(gather(x, y, indices))
    }

    fn name(&self) -> &'static str {
        "bootstrap"
    }
}

/// Uniform draws without replacement.
#[derive(Debug, Clone)]
pub struct SubSampler {
    n_samples: usize,
}

impl SubSampler {
    pub fn new(n_samples: usize) -> Self {
        Self { n_samples }
    }
}

impl DataSampler for SubSampler {
    fn sample(&self, x: ArrayView2<f64>, y: ArrayView1<usize>, rng: &mut StdRng) -> Result<Subsample> {
        let n = check_inputs(&x, &y)?;
        let take = self.n_samples.min(n);
        let indices = rand::seq::index::sample(rng, n, take).into_vec();
        Ok(gather(x, y, indices))
    }

    fn name(&self) -> &'static str {
        "subsample"
    }
}

/// Draws without replacement, keeping class proportions. Every class gets at
/// least one row whenever the draw is at least as large as the class count.
#[derive(Debug, Clone)]
pub struct StratifiedSampler {
    n_samples: usize,
}

impl StratifiedSampler {
    pub fn new(n_samples: usize) -> Self {
        Self { n_samples }
    }
}

impl DataSampler for StratifiedSampler {
    fn sample(&self, x: ArrayView2<f64>, y: ArrayView1<usize>, rng: &mut StdRng) -> Result<Subsample> {
        let n = check_inputs(&x, &y)?;
        let take = self.n_samples.min(n);

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in y.iter().enumerate() {
            groups.entry(label).or_default().push(i);
        }

        let mut used = vec![false; n];
        let mut representatives = Vec::with_capacity(groups.len());
        let mut quota_rows = Vec::with_capacity(take);
        for rows in groups.values_mut() {
            rows.shuffle(rng);
            let quota = (take * rows.len() / n).max(1).min(rows.len());
            representatives.push(rows[0]);
            quota_rows.extend_from_slice(&rows[1..quota]);
            for &i in &rows[..quota] {
                used[i] = true;
            }
        }
        // Representatives go first so truncation never drops a class.
        representatives.shuffle(rng);
        quota_rows.shuffle(rng);
        let mut chosen = representatives;
        chosen.extend(quota_rows);

        if chosen.len() < take {
            let mut rest: Vec<usize> = (0..n).filter(|&i| !used[i]).collect();
            rest.shuffle(rng);
            let missing = take - chosen.len();
            chosen.extend(rest.into_iter().take(missing));
        }
        chosen.truncate(take);
        chosen.shuffle(rng);

        Ok(gather(x, y, chosen))
    }

    fn name(&self) -> &'static str {
        "stratified"
    }
}
