use crate::model::{Agent, Kind};
use serde::{Deserialize, Serialize};

/// Phenotype tally of the roster at the end of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    pub tick: u64,
    pub n_predator: usize,
    pub n_prey: usize,
    pub n_light: usize,
    pub n_dark: usize,
}

impl Census {
    pub fn take(tick: u64, roster: &[Agent]) -> Self {
        let mut census = Census {
            tick,
            ..Census::default()
        };
        for agt in roster.iter().filter(|agt| !agt.is_caught()) {
            match agt.kind() {
                Kind::Predator => census.n_predator += 1,
                Kind::Prey => {
                    census.n_prey += 1;
                    match agt.phenotype() {
                        Some(phe) if phe.is_light() => census.n_light += 1,
                        Some(_) => census.n_dark += 1,
                        None => {}
                    }
                }
            }
        }
        census
    }

    pub fn light_fraction(&self) -> Option<f64> {
        (self.n_prey > 0).then(|| self.n_light as f64 / self.n_prey as f64)
    }
}

/// Collects one [`Census`] per tick until drained.
///
/// Nothing is discarded on its own: callers that only advance the engine
/// keep every census in memory and must drain periodically.
#[derive(Debug, Default)]
pub struct Collector {
    census_vec: Vec<Census>,
}

impl Collector {
    pub fn sample(&mut self, tick: u64, roster: &[Agent]) -> Census {
        let census = Census::take(tick, roster);
        self.census_vec.push(census);
        census
    }

    pub fn latest(&self) -> Option<&Census> {
        self.census_vec.last()
    }

    pub fn drain(&mut self) -> Vec<Census> {
        std::mem::take(&mut self.census_vec)
    }
}

pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
        }
    }

    /// Add a value using Welford's online update.
    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    pub is_equil: bool,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        if self.vals.is_empty() {
            return TimeSeriesReport {
                mean: f64::NAN,
                std_dev: f64::NAN,
                sem: f64::NAN,
                is_equil: false,
            };
        }
        let i_equil = compute_opt_i_equil(&self.vals);
        let equil_time_series = &self.vals[i_equil..];
        TimeSeriesReport {
            mean: compute_mean(equil_time_series),
            std_dev: compute_var(equil_time_series).sqrt(),
            sem: compute_sem(equil_time_series),
            is_equil: i_equil != self.vals.len() / 2,
        }
    }
}

fn compute_mean(time_series: &[f64]) -> f64 {
    if time_series.is_empty() {
        return f64::NAN;
    }
    time_series.iter().sum::<f64>() / time_series.len() as f64
}

fn compute_var(time_series: &[f64]) -> f64 {
    let n_vals = time_series.len();
    if n_vals < 2 {
        return f64::NAN;
    }
    let mean = compute_mean(time_series);
    time_series
        .iter()
        .map(|&val| (val - mean).powi(2))
        .sum::<f64>()
        / (n_vals - 1) as f64
}

/// Compute the standard error of the mean (SEM) using the Flyvbjerg-Petersen blocking method
fn compute_sem(time_series: &[f64]) -> f64 {
    let mut blk_time_series = time_series.to_vec();
    let mut n_vals = blk_time_series.len();
    let mut sem2_ests = Vec::new();
    let mut sem2_errs = Vec::new();

    while n_vals >= 2 {
        let sem2_est = compute_var(&blk_time_series) / n_vals as f64;
        let sem2_err = sem2_est * (2.0 / (n_vals as f64 - 1.0)).sqrt();
        sem2_ests.push(sem2_est);
        sem2_errs.push(sem2_err);

        blk_time_series = blk_time_series
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
        n_vals = blk_time_series.len();
    }

    for (idx, &sem2_est) in sem2_ests.iter().enumerate() {
        let max_low = sem2_ests[idx..]
            .iter()
            .zip(sem2_errs[idx..].iter())
            .map(|(s, e)| s - e)
            .fold(f64::NEG_INFINITY, f64::max);

        if sem2_est > max_low {
            return sem2_est.sqrt();
        }
    }

    sem2_ests.last().copied().unwrap_or(f64::NAN).sqrt()
}

/// Compute the optimal equilibration index using the marginal standard error rule
fn compute_opt_i_equil(time_series: &[f64]) -> usize {
    let n_vals = time_series.len();
    let mut min_mse = f64::INFINITY;
    let mut opt_i_equil = n_vals / 2;
    let n_idxs = n_vals.ilog2() + 1;
    let i_equils: Vec<_> = (0..n_idxs)
        .map(|idx| n_vals / 2_usize.pow(n_idxs - idx))
        .collect();

    for i_equil in i_equils {
        let aux_time_series = &time_series[i_equil..];
        let n_aux = aux_time_series.len();

        let var = compute_var(aux_time_series);
        let mse = var * (n_aux - 1) as f64 / n_aux.pow(2) as f64;

        if mse < min_mse {
            min_mse = mse;
            opt_i_equil = i_equil;
        }
    }

    opt_i_equil
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetics::{Allele, Genotype};
    use crate::model::{AgentConfig, Sex};
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn roster() -> Vec<Agent> {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let genotypes = [
            (Allele::Dominant, Allele::Recessive),
            (Allele::Recessive, Allele::Recessive),
            (Allele::Dominant, Allele::Dominant),
        ];
        let mut roster: Vec<_> = genotypes
            .into_iter()
            .map(|(a, b)| {
                let cfg = AgentConfig {
                    sex: Sex::F,
                    genotype: Some(Genotype::new(a, b)),
                    ..AgentConfig::default()
                };
                Agent::new(cfg, &mut rng).unwrap()
            })
            .collect();
        let cfg = AgentConfig {
            kind: Kind::Predator,
            ..AgentConfig::default()
        };
        roster.push(Agent::new(cfg, &mut rng).unwrap());
        roster
    }

    #[test]
    fn census_tallies_phenotypes_of_prey() {
        let census = Census::take(4, &roster());
        assert_eq!(
            census,
            Census {
                tick: 4,
                n_predator: 1,
                n_prey: 3,
                n_light: 2,
                n_dark: 1,
            }
        );
        assert_eq!(census.light_fraction(), Some(2.0 / 3.0));
        assert_eq!(Census::default().light_fraction(), None);
    }

    #[test]
    fn collector_drains_samples_in_order() {
        let roster = roster();
        let mut collector = Collector::default();
        collector.sample(0, &roster);
        collector.sample(1, &roster[..1]);
        assert_eq!(collector.latest().map(|census| census.n_prey), Some(1));

        let census_vec = collector.drain();
        assert_eq!(census_vec.len(), 2);
        assert_eq!(census_vec[0].tick, 0);
        assert_eq!(census_vec[1].tick, 1);
        assert!(collector.drain().is_empty());
        assert!(collector.latest().is_none());
    }

    #[test]
    fn accumulator_matches_direct_estimates() {
        let mut acc = Accumulator::new();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        let report = acc.report();
        assert_eq!(report.n_vals, 8);
        assert!((report.mean - 5.0).abs() < 1e-12);
        assert!((report.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(Accumulator::new().report().mean.is_nan());
    }

    #[test]
    fn time_series_of_constant_values_has_zero_spread() {
        let mut time_series = TimeSeries::new();
        for _ in 0..64 {
            time_series.push(3.0);
        }
        let report = time_series.report();
        assert_eq!(report.mean, 3.0);
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.sem, 0.0);
    }

    #[test]
    fn empty_time_series_reports_nan() {
        let report = TimeSeries::new().report();
        assert!(report.mean.is_nan());
        assert!(!report.is_equil);
    }
}
