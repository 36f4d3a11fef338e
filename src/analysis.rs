use crate::config::Config;
use crate::engine::Frame;
use crate::stats::{Accumulator, TimeSeries, TimeSeriesReport};
use anyhow::{Context, Result};
use rmp_serde::decode;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

pub trait Obs {
    fn update(&mut self, frame: &Frame) -> Result<()>;
    fn report(&self) -> Result<(String, toml::Value)>;
}

pub struct PopCounts {
    n_predator: TimeSeries,
    n_prey: TimeSeries,
    n_light: TimeSeries,
    n_dark: TimeSeries,
}

#[derive(Serialize)]
struct PopCountsReport {
    n_predator: TimeSeriesReport,
    n_prey: TimeSeriesReport,
    n_light: TimeSeriesReport,
    n_dark: TimeSeriesReport,
}

impl PopCounts {
    pub fn new() -> Self {
        Self {
            n_predator: TimeSeries::new(),
            n_prey: TimeSeries::new(),
            n_light: TimeSeries::new(),
            n_dark: TimeSeries::new(),
        }
    }
}

impl Obs for PopCounts {
    fn update(&mut self, frame: &Frame) -> Result<()> {
        for census in &frame.census_vec {
            self.n_predator.push(census.n_predator as f64);
            self.n_prey.push(census.n_prey as f64);
            self.n_light.push(census.n_light as f64);
            self.n_dark.push(census.n_dark as f64);
        }
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let report = PopCountsReport {
            n_predator: self.n_predator.report(),
            n_prey: self.n_prey.report(),
            n_light: self.n_light.report(),
            n_dark: self.n_dark.report(),
        };
        Ok(("pop_counts".to_string(), toml::Value::try_from(report)?))
    }
}

pub struct LightFraction {
    acc: Accumulator,
}

impl LightFraction {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for LightFraction {
    fn update(&mut self, frame: &Frame) -> Result<()> {
        for census in &frame.census_vec {
            if let Some(frac) = census.light_fraction() {
                self.acc.add(frac);
            }
        }
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let report = self.acc.report();
        Ok(("light_fraction".to_string(), toml::Value::try_from(report)?))
    }
}

pub struct Extinction {
    n_ticks: u64,
    tick: Option<u64>,
}

#[derive(Serialize)]
struct ExtinctionReport {
    n_ticks: u64,
    extinct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
}

impl Extinction {
    pub fn new() -> Self {
        Self {
            n_ticks: 0,
            tick: None,
        }
    }
}

impl Obs for Extinction {
    fn update(&mut self, frame: &Frame) -> Result<()> {
        for census in &frame.census_vec {
            self.n_ticks += 1;
            if self.tick.is_none() && census.n_prey == 0 {
                self.tick = Some(census.tick);
            }
        }
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let report = ExtinctionReport {
            n_ticks: self.n_ticks,
            extinct: self.tick.is_some(),
            tick: self.tick,
        };
        Ok(("prey_extinction".to_string(), toml::Value::try_from(report)?))
    }
}

pub struct Analyzer {
    cfg: Config,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: Config) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(PopCounts::new()),
            Box::new(LightFraction::new()),
            Box::new(Extinction::new()),
        ];
        Self { cfg, obs_ptr_vec }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        for _ in 0..self.cfg.output.saves_per_file {
            let frame = decode::from_read(&mut reader).context("failed to read frame")?;
            self.add_frame(&frame)?;
        }
        Ok(())
    }

    pub fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(frame).context("failed to update observable")?;
        }
        Ok(())
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();

        let mut table = toml::Table::new();
        for obs in &self.obs_ptr_vec {
            let (key, val) = obs.report().context("failed to report observable")?;
            table.insert(key, val);
        }
        let contents = toml::to_string(&table).context("failed to serialize results")?;

        fs::write(file, contents).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Census;

    fn frame(counts: &[(u64, usize, usize)]) -> Frame {
        Frame {
            census_vec: counts
                .iter()
                .map(|&(tick, n_light, n_dark)| Census {
                    tick,
                    n_predator: 2,
                    n_prey: n_light + n_dark,
                    n_light,
                    n_dark,
                })
                .collect(),
            snapshot: None,
        }
    }

    #[test]
    fn light_fraction_skips_empty_populations() {
        let mut obs = LightFraction::new();
        obs.update(&frame(&[(0, 3, 1), (1, 0, 0), (2, 1, 3)])).unwrap();
        let report = obs.acc.report();
        assert_eq!(report.n_vals, 2);
        assert!((report.mean - 0.5).abs() < 1e-12);
    }

    #[test]
    fn extinction_records_first_empty_tick() {
        let mut obs = Extinction::new();
        obs.update(&frame(&[(0, 3, 1), (1, 1, 0)])).unwrap();
        assert_eq!(obs.tick, None);
        obs.update(&frame(&[(2, 0, 0), (3, 0, 0)])).unwrap();
        assert_eq!(obs.tick, Some(2));
        assert_eq!(obs.n_ticks, 4);

        let (key, val) = obs.report().unwrap();
        assert_eq!(key, "prey_extinction");
        assert_eq!(val.get("extinct").and_then(|val| val.as_bool()), Some(true));
        assert_eq!(val.get("tick").and_then(|val| val.as_integer()), Some(2));
    }

    #[test]
    fn pop_counts_report_every_series() {
        let mut obs = PopCounts::new();
        obs.update(&frame(&[(0, 3, 1), (1, 4, 2), (2, 5, 3), (3, 6, 4)]))
            .unwrap();
        let (key, val) = obs.report().unwrap();
        assert_eq!(key, "pop_counts");
        for series in ["n_predator", "n_prey", "n_light", "n_dark"] {
            assert!(val.get(series).is_some(), "missing {series}");
        }
        let n_predator = val.get("n_predator").unwrap();
        assert_eq!(n_predator.get("mean").and_then(|val| val.as_float()), Some(2.0));
    }
}
