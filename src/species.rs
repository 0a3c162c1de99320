use gas_common::SpeciesConfig;
use serde::{Deserialize, Serialize};

use crate::error::{GasError, Result};

/// Dense index into the species table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpeciesId(pub u16);

impl SpeciesId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Physical constants shared by every molecule of a species.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub name: String,
    pub mass: f64,
    pub radius: f64,
}

/// Immutable registry of species, built once at startup.
#[derive(Debug, Clone)]
pub struct SpeciesTable {
    species: Vec<Species>,
    max_radius: f64,
}

impl SpeciesTable {
    /// Builds the table from config entries, in order. Ids follow entry order.
    pub fn from_config(entries: &[SpeciesConfig]) -> Result<Self> {
        if entries.len() > u16::MAX as usize {
            return Err(GasError::invalid(format!(
                "too many species ({}), at most {} are supported",
                entries.len(),
                u16::MAX
            )));
        }

        let mut species: Vec<Species> = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(GasError::invalid("species name must not be empty"));
            }
            if !entry.mass.is_finite() || entry.mass <= 0.0 {
                return Err(GasError::invalid(format!(
                    "species '{}': mass must be finite and > 0 (got {})",
                    entry.name, entry.mass
                )));
            }
            if !entry.radius.is_finite() || entry.radius <= 0.0 {
                return Err(GasError::invalid(format!(
                    "species '{}': radius must be finite and > 0 (got {})",
                    entry.name, entry.radius
                )));
            }
            if species.iter().any(|s| s.name == entry.name) {
                return Err(GasError::invalid(format!("species '{}' is defined twice", entry.name)));
            }
            species.push(Species {
                name: entry.name.clone(),
                mass: entry.mass,
                radius: entry.radius,
            });
        }

        let max_radius = species.iter().map(|s| s.radius).fold(0.0, f64::max);
        Ok(Self { species, max_radius })
    }

    pub fn lookup(&self, id: SpeciesId) -> Result<&Species> {
        self.species
            .get(id.index())
            .ok_or_else(|| GasError::UnknownSpecies(format!("id {}", id.0)))
    }

    /// Finds the id registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<SpeciesId> {
        self.species
            .iter()
            .position(|s| s.name == name)
            .map(|idx| SpeciesId(idx as u16))
            .ok_or_else(|| GasError::UnknownSpecies(name.to_string()))
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, &Species)> {
        self.species.iter().enumerate().map(|(idx, s)| (SpeciesId(idx as u16), s))
    }
}
