use crate::config::{Config, OutputConfig};
use crate::genetics::Genotype;
use crate::model::{Agent, AgentConfig, AgentView, Habitat, Kind, Sex, hunt, procreate};
use crate::stats::{Census, Collector};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Record written to a trajectory file at every save.
///
/// Contains the censuses of all ticks since the previous save
/// and, optionally, a snapshot of the roster.
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    pub census_vec: Vec<Census>,
    pub snapshot: Option<Vec<AgentView>>,
}

/// Entry of the next roster, in the order agents were processed.
enum Slot {
    Kept(usize),
    Born(Agent),
}

/// Simulation engine.
///
/// Owns the roster of living agents and the random number generator,
/// and advances the population one tick at a time.
pub struct Engine<R = ChaCha12Rng> {
    habitat: Habitat,
    predators_age: bool,
    roster: Vec<Agent>,
    tick: u64,
    collector: Collector,
    rng: R,
}

impl Engine<ChaCha12Rng> {
    /// Create a new `Engine` with the given configuration and a random initial population.
    pub fn generate_initial_condition(cfg: &Config, seed: u64) -> Result<Self> {
        let mut engine = Self::new(cfg.habitat, ChaCha12Rng::seed_from_u64(seed))?;
        engine.set_predators_age(cfg.model.predators_age);

        for _ in 0..cfg.init.n_prey {
            let genotype = Genotype::random(cfg.init.prob_dominant, &mut engine.rng)?;
            let agt_cfg = AgentConfig {
                habitat: cfg.habitat,
                kind: Kind::Prey,
                sex: Sex::random(&mut engine.rng),
                traits: cfg.prey.clone(),
                genotype: Some(genotype),
            };
            let agt = Agent::new(agt_cfg, &mut engine.rng).context("failed to create prey")?;
            engine.add_agent(agt)?;
        }

        for _ in 0..cfg.init.n_predator {
            let agt_cfg = AgentConfig {
                habitat: cfg.habitat,
                kind: Kind::Predator,
                sex: Sex::random(&mut engine.rng),
                traits: cfg.predator.clone(),
                genotype: None,
            };
            let agt = Agent::new(agt_cfg, &mut engine.rng).context("failed to create predator")?;
            engine.add_agent(agt)?;
        }

        Ok(engine)
    }
}

impl<R: Rng> Engine<R> {
    /// Create an empty `Engine` for the given habitat.
    pub fn new(habitat: Habitat, rng: R) -> Result<Self> {
        habitat.validate().context("invalid habitat")?;
        Ok(Self {
            habitat,
            predators_age: false,
            roster: Vec::new(),
            tick: 0,
            collector: Collector::default(),
            rng,
        })
    }

    pub fn set_predators_age(&mut self, predators_age: bool) {
        self.predators_age = predators_age;
    }

    pub fn add_agent(&mut self, agent: Agent) -> Result<()> {
        if agent.habitat() != &self.habitat {
            bail!(
                "agent habitat {:?} differs from engine habitat {:?}",
                agent.habitat(),
                self.habitat
            );
        }
        self.roster.push(agent);
        Ok(())
    }

    pub fn roster(&self) -> &[Agent] {
        &self.roster
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Take every census sampled since the previous call.
    pub fn drain_censuses(&mut self) -> Vec<Census> {
        self.collector.drain()
    }

    /// Views of all living agents.
    pub fn snapshot(&self) -> Vec<AgentView> {
        self.roster
            .iter()
            .filter(|agt| !agt.is_caught())
            .map(AgentView::from)
            .collect()
    }

    /// Run `n_ticks` ticks, sampling a census after each one.
    ///
    /// Censuses pile up in the collector until [`Engine::drain_censuses`] is called.
    pub fn advance(&mut self, n_ticks: u64) -> Result<()> {
        for _ in 0..n_ticks {
            self.perform_tick()
                .with_context(|| format!("failed to perform tick {}", self.tick))?;
        }
        Ok(())
    }

    /// Advance the simulation and save the resulting frames to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P, output: &OutputConfig) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        for i_save in 0..output.saves_per_file {
            self.advance(output.ticks_per_save)?;

            if let Some(census) = self.collector().latest() {
                log::debug!("last census before save: {census:?}");
            }

            let frame = Frame {
                census_vec: self.drain_censuses(),
                snapshot: output.snapshots.then(|| self.snapshot()),
            };
            encode::write(&mut writer, &frame).context("failed to serialize frame")?;

            let progress = 100.0 * (i_save + 1) as f64 / output.saves_per_file as f64;
            log::info!(
                "completed {progress:06.2}% ({} agents at tick {})",
                self.roster().len(),
                self.tick()
            );
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    fn perform_tick(&mut self) -> Result<()> {
        let tick = self.tick;
        let mut slots = Vec::with_capacity(self.roster.len());

        for i_agt in 0..self.roster.len() {
            self.roster[i_agt].roam(&mut self.rng);

            let kind = self.roster[i_agt].kind();
            if kind == Kind::Prey || self.predators_age {
                self.roster[i_agt].grow_older();
                if self.roster[i_agt].is_dead() {
                    continue;
                }
            }

            match kind {
                Kind::Prey => {
                    let litter = procreate(&mut self.roster, i_agt, tick, &mut self.rng)
                        .context("failed to procreate")?;
                    slots.push(Slot::Kept(i_agt));
                    slots.extend(litter.into_iter().map(Slot::Born));
                }
                Kind::Predator => {
                    hunt(&mut self.roster, i_agt);
                    slots.push(Slot::Kept(i_agt));
                }
            }
        }

        // Caught prey are dropped only now, so they stay visible for the whole tick.
        let mut roster: Vec<_> = std::mem::take(&mut self.roster)
            .into_iter()
            .map(Some)
            .collect();
        self.roster = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Kept(i_agt) => roster[i_agt].take(),
                Slot::Born(agt) => Some(agt),
            })
            .filter(|agt| !agt.is_caught())
            .collect();

        let census = self.collector.sample(tick, &self.roster);
        log::debug!("{census:?}");

        self.tick += 1;

        Ok(())
    }
}
