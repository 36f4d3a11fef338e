use crate::genetics::{Genotype, Phenotype, derive_offspring_allele};
use crate::utils::check_num;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Litter tick assigned to founders and newborns.
pub const INITIAL_LAST_LITTER_TICK: u64 = 1;

const MAX_HABITAT_SIZE: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Predator,
    Prey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    M,
    F,
}

impl Sex {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) { Sex::M } else { Sex::F }
    }
}

/// Bounds of the rectangular habitat, `[0, xmax] x [0, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Habitat {
    pub xmax: i64,
    pub ymax: i64,
}

impl Default for Habitat {
    fn default() -> Self {
        Self { xmax: 100, ymax: 100 }
    }
}

impl Habitat {
    pub fn validate(&self) -> Result<()> {
        check_num(self.xmax, 1..=MAX_HABITAT_SIZE).context("invalid habitat width")?;
        check_num(self.ymax, 1..=MAX_HABITAT_SIZE).context("invalid habitat height")?;
        Ok(())
    }

    #[cfg(test)]
    pub fn contains(&self, position: [i64; 2]) -> bool {
        (0..=self.xmax).contains(&position[0]) && (0..=self.ymax).contains(&position[1])
    }

    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> [i64; 2] {
        [rng.random_range(0..=self.xmax), rng.random_range(0..=self.ymax)]
    }
}

/// Per-agent behavioral parameters.
///
/// `catch_radius` only matters for predators, `mate_range`, `gestation`,
/// `saturation_pop` and the litter parameters only for prey.
/// `shape` and `color` are presentation hints.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Traits {
    pub age_limit: u32,
    pub catch_radius: f64,
    pub mate_range: f64,
    pub gestation: u64,
    pub saturation_pop: f64,
    pub litter_mean: f64,
    pub litter_std_dev: f64,
    pub step_range: i64,
    pub shape: String,
    pub color: String,
}

impl Default for Traits {
    fn default() -> Self {
        Self {
            age_limit: 50,
            catch_radius: 10.0,
            mate_range: 5.0,
            gestation: 8,
            saturation_pop: 150.0,
            litter_mean: 7.0,
            litter_std_dev: 1.0,
            step_range: 7,
            shape: "o".to_string(),
            color: "saddlebrown".to_string(),
        }
    }
}

impl Traits {
    pub fn validate(&self, habitat: &Habitat) -> Result<()> {
        check_num(self.age_limit, 1..).context("invalid age limit")?;
        check_num(self.catch_radius, 0.0..).context("invalid catch radius")?;
        check_num(self.mate_range, 0.0..).context("invalid mate range")?;
        check_num(self.gestation, 1..).context("invalid gestation")?;
        check_num(self.saturation_pop, f64::MIN_POSITIVE..)
            .context("invalid saturation population")?;
        check_num(self.litter_mean, 0.0..1_000.0).context("invalid litter mean")?;
        check_num(self.litter_std_dev, 0.0..1_000.0).context("invalid litter standard deviation")?;
        check_num(self.step_range, 1..=MAX_HABITAT_SIZE).context("invalid step range")?;

        // Reflection keeps agents inside only if a doubled step fits in the habitat.
        let min_size = habitat.xmax.min(habitat.ymax);
        if 2 * self.step_range > min_size {
            bail!(
                "habitat size {min_size} must be at least twice the step range {}",
                self.step_range
            );
        }
        Ok(())
    }
}

/// Options recognized when constructing an [`Agent`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub habitat: Habitat,
    pub kind: Kind,
    pub sex: Sex,
    pub traits: Traits,
    pub genotype: Option<Genotype>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            habitat: Habitat::default(),
            kind: Kind::Prey,
            sex: Sex::M,
            traits: Traits::default(),
            genotype: None,
        }
    }
}

/// Single organism living in the habitat.
#[derive(Debug, Clone)]
pub struct Agent {
    kind: Kind,
    sex: Sex,
    habitat: Habitat,
    traits: Traits,
    genotype: Option<Genotype>,

    position: [i64; 2],
    age: u32,
    last_litter_tick: u64,
    is_caught: bool,
}

impl Agent {
    /// Create a new agent at a random position of its habitat.
    ///
    /// # Errors
    /// Returns an error if the habitat or traits are invalid,
    /// or if a prey agent is given no genotype.
    pub fn new<R: Rng + ?Sized>(cfg: AgentConfig, rng: &mut R) -> Result<Self> {
        cfg.habitat.validate().context("invalid habitat")?;
        cfg.traits
            .validate(&cfg.habitat)
            .context("invalid traits")?;
        if cfg.kind == Kind::Prey && cfg.genotype.is_none() {
            bail!("prey agents require a genotype");
        }

        let position = cfg.habitat.random_position(rng);
        Ok(Self {
            kind: cfg.kind,
            sex: cfg.sex,
            habitat: cfg.habitat,
            traits: cfg.traits,
            genotype: cfg.genotype,
            position,
            age: 0,
            last_litter_tick: INITIAL_LAST_LITTER_TICK,
            is_caught: false,
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn habitat(&self) -> &Habitat {
        &self.habitat
    }

    #[cfg(test)]
    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    pub fn genotype(&self) -> Option<&Genotype> {
        self.genotype.as_ref()
    }

    pub fn phenotype(&self) -> Option<Phenotype> {
        self.genotype().map(|genotype| genotype.phenotype())
    }

    pub fn position(&self) -> [i64; 2] {
        self.position
    }

    #[cfg(test)]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[cfg(test)]
    pub fn last_litter_tick(&self) -> u64 {
        self.last_litter_tick
    }

    pub fn is_caught(&self) -> bool {
        self.is_caught
    }

    /// Move the agent to a given position inside its habitat.
    #[cfg(test)]
    pub fn place(&mut self, position: [i64; 2]) -> Result<()> {
        if !self.habitat.contains(position) {
            bail!("position {position:?} is outside {:?}", self.habitat);
        }
        self.position = position;
        Ok(())
    }

    /// Take one random step, drawn per axis from `[-step_range, step_range)`.
    ///
    /// A step that would leave the habitat is applied negated instead.
    pub fn roam<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let step_range = self.traits.step_range;
        let max = [self.habitat.xmax, self.habitat.ymax];
        for (coord, max) in self.position.iter_mut().zip(max) {
            let delta = rng.random_range(-step_range..step_range);
            let moved = *coord + delta;
            if moved > max || moved < 0 {
                *coord -= delta;
            } else {
                *coord = moved;
            }
        }
    }

    pub fn grow_older(&mut self) {
        self.age += 1;
    }

    pub fn is_dead(&self) -> bool {
        self.age > self.traits.age_limit
    }

    pub fn distance(&self, other: &Agent) -> f64 {
        let dx = (self.position[0] - other.position[0]) as f64;
        let dy = (self.position[1] - other.position[1]) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    fn is_catchable(&self) -> bool {
        self.kind == Kind::Prey && self.age < self.traits.age_limit && !self.is_caught
    }

    fn is_gestation_over(&self, tick: u64) -> bool {
        tick.abs_diff(self.last_litter_tick) % self.traits.gestation == 0
    }

    /// Newborns copy the mother's habitat and traits rather than the defaults.
    fn give_birth<R: Rng + ?Sized>(&self, genotype: Genotype, rng: &mut R) -> Self {
        Self {
            kind: Kind::Prey,
            sex: Sex::random(rng),
            habitat: self.habitat,
            traits: self.traits.clone(),
            genotype: Some(genotype),
            position: self.habitat.random_position(rng),
            age: 0,
            last_litter_tick: INITIAL_LAST_LITTER_TICK,
            is_caught: false,
        }
    }
}

/// Read-only view of a living agent, handed out to renderers and samplers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub kind: Kind,
    pub sex: Sex,
    pub position: [i64; 2],
    pub phenotype: Option<Phenotype>,
}

impl From<&Agent> for AgentView {
    fn from(agt: &Agent) -> Self {
        Self {
            kind: agt.kind(),
            sex: agt.sex(),
            position: agt.position(),
            phenotype: agt.phenotype(),
        }
    }
}

pub fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Let the predator at `i_hunter` catch the first catchable prey within its radius.
///
/// Marks the prey as caught and returns its index.
pub fn hunt(roster: &mut [Agent], i_hunter: usize) -> Option<usize> {
    let hunter = &roster[i_hunter];
    if hunter.kind != Kind::Predator {
        return None;
    }
    let i_prey = roster
        .iter()
        .position(|agt| agt.is_catchable() && hunter.distance(agt) < hunter.traits.catch_radius)?;
    roster[i_prey].is_caught = true;
    Some(i_prey)
}

/// Let the female prey at `i_mother` attempt to produce a litter.
///
/// The saturation draw is taken once on entry, whether or not the attempt qualifies.
pub fn procreate<R: Rng + ?Sized>(
    roster: &mut [Agent],
    i_mother: usize,
    tick: u64,
    rng: &mut R,
) -> Result<Vec<Agent>> {
    let draw = rng.random::<f64>();
    procreate_with_draw(roster, i_mother, tick, draw, rng)
}

/// Same as [`procreate`] with the saturation draw supplied by the caller.
///
/// The attempt passes the density check only if `draw > logistic(n_agt / saturation_pop)`.
pub fn procreate_with_draw<R: Rng + ?Sized>(
    roster: &mut [Agent],
    i_mother: usize,
    tick: u64,
    draw: f64,
    rng: &mut R,
) -> Result<Vec<Agent>> {
    let n_agt = roster.len() as f64;
    let mother = &roster[i_mother];
    if mother.kind != Kind::Prey || mother.sex != Sex::F || !mother.is_gestation_over(tick) {
        return Ok(Vec::new());
    }

    let Some(mate) = roster.iter().find(|agt| {
        agt.kind == Kind::Prey
            && agt.sex == Sex::M
            && mother.distance(agt) <= mother.traits.mate_range
    }) else {
        return Ok(Vec::new());
    };

    if draw <= logistic(n_agt / mother.traits.saturation_pop) {
        return Ok(Vec::new());
    }

    let mother_genotype = mother.genotype.context("mother has no genotype")?;
    let father_genotype = mate.genotype.context("mate has no genotype")?;

    let litter_dist = Normal::new(mother.traits.litter_mean, mother.traits.litter_std_dev)?;
    let n_born = litter_size(litter_dist.sample(rng));

    let mut litter = Vec::with_capacity(n_born);
    for _ in 0..n_born {
        let from_mother = derive_offspring_allele(&mother_genotype, rng);
        let from_father = derive_offspring_allele(&father_genotype, rng);
        litter.push(mother.give_birth(Genotype::new(from_father, from_mother), rng));
    }

    roster[i_mother].last_litter_tick = tick;
    Ok(litter)
}

fn litter_size(sample: f64) -> usize {
    let n_born = sample.round();
    if n_born > 0.0 { n_born as usize } else { 0 }
}
