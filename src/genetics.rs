//! Single-locus, two-allele inheritance of fur color.
//!
//! Light fur is dominant: any genotype carrying at least one dominant allele
//! expresses the light phenotype.

use crate::utils::check_prob;
use anyhow::{Context, Error, Result, bail};
use rand::prelude::*;
use rand_distr::Bernoulli;
use serde::{Deserialize, Serialize};

/// Catch probability attached to the light phenotype.
///
/// No current rule consumes it; hunting depends on distance only.
pub const LIGHT_CATCH_PROBABILITY: f64 = 0.95;

/// Trait value inherited from one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Allele {
    Recessive,
    Dominant,
}

impl Allele {
    pub fn value(self) -> u8 {
        match self {
            Allele::Recessive => 0,
            Allele::Dominant => 1,
        }
    }
}

impl TryFrom<u8> for Allele {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self> {
        match val {
            0 => Ok(Allele::Recessive),
            1 => Ok(Allele::Dominant),
            _ => bail!("allele must be 0 or 1, but is {val}"),
        }
    }
}

impl From<Allele> for u8 {
    fn from(allele: Allele) -> Self {
        allele.value()
    }
}

/// Pair of alleles, one received from each parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genotype {
    pub from_father: Allele,
    pub from_mother: Allele,
}

impl Genotype {
    pub fn new(from_father: Allele, from_mother: Allele) -> Self {
        Self {
            from_father,
            from_mother,
        }
    }

    /// Draw a founder genotype where each allele is dominant with probability `prob_dominant`.
    pub fn random<R: Rng + ?Sized>(prob_dominant: f64, rng: &mut R) -> Result<Self> {
        check_prob(prob_dominant).context("invalid dominant allele probability")?;
        let allele_dist = Bernoulli::new(prob_dominant)?;
        let mut alleles = [Allele::Recessive; 2];
        for allele in &mut alleles {
            if allele_dist.sample(rng) {
                *allele = Allele::Dominant;
            }
        }
        Ok(Self::new(alleles[0], alleles[1]))
    }

    pub fn phenotype(&self) -> Phenotype {
        derive_phenotype(self.from_father, self.from_mother)
    }
}

/// Observable fur color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Phenotype {
    Dark,
    Light { catch_probability: f64 },
}

impl Phenotype {
    pub fn is_light(&self) -> bool {
        matches!(self, Phenotype::Light { .. })
    }
}

pub fn derive_phenotype(a: Allele, b: Allele) -> Phenotype {
    if a.value() + b.value() >= 1 {
        Phenotype::Light {
            catch_probability: LIGHT_CATCH_PROBABILITY,
        }
    } else {
        Phenotype::Dark
    }
}

/// Pick which of the parent's two alleles is passed on, each with probability 0.5.
pub fn derive_offspring_allele<R: Rng + ?Sized>(parent: &Genotype, rng: &mut R) -> Allele {
    if rng.random_bool(0.5) {
        parent.from_mother
    } else {
        parent.from_father
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha12Rng;

    use Allele::{Dominant, Recessive};

    #[test]
    fn light_is_dominant() {
        assert_eq!(derive_phenotype(Recessive, Recessive), Phenotype::Dark);
        for (a, b) in [(Recessive, Dominant), (Dominant, Recessive), (Dominant, Dominant)] {
            assert_eq!(
                derive_phenotype(a, b),
                Phenotype::Light {
                    catch_probability: LIGHT_CATCH_PROBABILITY
                }
            );
        }
    }

    #[test]
    fn allele_conversion_rejects_values_above_one() {
        assert_eq!(Allele::try_from(0).unwrap(), Recessive);
        assert_eq!(Allele::try_from(1).unwrap(), Dominant);
        assert!(Allele::try_from(2).is_err());
        assert_eq!(u8::from(Dominant), 1);
    }

    #[test]
    fn homozygous_parent_always_passes_its_allele() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let father = Genotype::new(Dominant, Dominant);
        let mother = Genotype::new(Recessive, Recessive);
        for _ in 0..100 {
            let child = Genotype::new(
                derive_offspring_allele(&father, &mut rng),
                derive_offspring_allele(&mother, &mut rng),
            );
            assert_eq!(child, Genotype::new(Dominant, Recessive));
            assert!(child.phenotype().is_light());
        }
    }

    #[test]
    fn heterozygous_parent_segregates_evenly() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let parent = Genotype::new(Dominant, Recessive);
        let n_draws = 10_000;
        let n_dominant = (0..n_draws)
            .filter(|_| derive_offspring_allele(&parent, &mut rng) == Dominant)
            .count();
        let freq = n_dominant as f64 / n_draws as f64;
        assert!((0.47..0.53).contains(&freq), "frequency was {freq}");
    }

    #[test]
    fn random_genotype_respects_extreme_frequencies() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let genotype = Genotype::random(1.0, &mut rng).unwrap();
        assert_eq!(genotype, Genotype::new(Dominant, Dominant));
        let genotype = Genotype::random(0.0, &mut rng).unwrap();
        assert_eq!(genotype.phenotype(), Phenotype::Dark);
        assert!(Genotype::random(1.5, &mut rng).is_err());
    }
}
