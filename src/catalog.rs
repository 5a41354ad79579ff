// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The instrument catalog.
//!
//! An instrument configuration describes how many strings an instrument has,
//! the pitch ratio of each string relative to the shared sample, and which
//! trigger key plays each string. Configurations are immutable once built;
//! a session selects one, it never mutates one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Errors produced while building or looking up instrument configurations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("instrument '{id}' has {ratios} pitch ratios and {keys} keys; both must equal the string count")]
    MismatchedStringCount {
        id: String,
        ratios: usize,
        keys: usize,
    },

    #[error("instrument '{id}' binds key '{key}' to more than one string")]
    DuplicateKey { id: String, key: String },

    #[error("instrument '{id}' has a non-positive or non-finite pitch ratio: {ratio}")]
    InvalidRatio { id: String, ratio: f32 },

    #[error("instrument '{id}' has no strings")]
    Empty { id: String },
}

/// A named instrument configuration.
///
/// Invariant: `ratios.len() == keys.len() == string_count()`, keys unique
/// within the configuration. Enforced by [`InstrumentConfig::new`]; an index
/// outside `0..string_count()` never reaches playback.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Identifier used for selection, e.g. "6-string".
    id: String,
    /// Human-readable display name.
    name: String,
    /// Per-string playback rate multipliers, low string first.
    ratios: Vec<f32>,
    /// Per-string trigger keys, normalized to lowercase.
    keys: Vec<String>,
    /// Descriptive text shown in listings.
    description: String,
}

impl InstrumentConfig {
    /// Builds a configuration, validating the catalog invariants.
    pub fn new(
        id: &str,
        name: &str,
        ratios: Vec<f32>,
        keys: Vec<&str>,
        description: &str,
    ) -> Result<InstrumentConfig, CatalogError> {
        if ratios.is_empty() {
            return Err(CatalogError::Empty { id: id.to_string() });
        }
        if ratios.len() != keys.len() {
            return Err(CatalogError::MismatchedStringCount {
                id: id.to_string(),
                ratios: ratios.len(),
                keys: keys.len(),
            });
        }
        if let Some(ratio) = ratios
            .iter()
            .find(|ratio| !ratio.is_finite() || **ratio <= 0.0)
        {
            return Err(CatalogError::InvalidRatio {
                id: id.to_string(),
                ratio: *ratio,
            });
        }

        let keys: Vec<String> = keys
            .into_iter()
            .map(|key| normalize_key(key))
            .collect();
        let mut seen: HashSet<&str> = HashSet::new();
        for key in keys.iter() {
            if !seen.insert(key.as_str()) {
                return Err(CatalogError::DuplicateKey {
                    id: id.to_string(),
                    key: key.clone(),
                });
            }
        }

        Ok(InstrumentConfig {
            id: id.to_string(),
            name: name.to_string(),
            ratios,
            keys,
            description: description.to_string(),
        })
    }

    /// The identifier used to select this instrument.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of strings.
    pub fn string_count(&self) -> usize {
        self.ratios.len()
    }

    /// The per-string pitch ratios.
    pub fn ratios(&self) -> &[f32] {
        &self.ratios
    }

    /// The pitch ratio for the given string, if in range.
    pub fn ratio(&self, string: usize) -> Option<f32> {
        self.ratios.get(string).copied()
    }

    /// The per-string trigger keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Maps a key identifier to a string index. Unmatched keys return None.
    pub fn string_for_key(&self, key: &str) -> Option<usize> {
        let key = normalize_key(key);
        self.keys.iter().position(|candidate| *candidate == key)
    }

    /// The descriptive text.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for InstrumentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} strings, keys: {})",
            self.name(),
            self.id(),
            self.string_count(),
            self.keys().join(" ")
        )
    }
}

/// Normalizes a physical key identifier for lookup.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// A read-only registry of instrument configurations.
pub struct Catalog {
    instruments: Vec<Arc<InstrumentConfig>>,
}

impl Catalog {
    /// The built-in instrument configurations.
    ///
    /// Ratios are semitone steps relative to the shared sample's native
    /// pitch, rounded to three decimals. Keys are laid out on letter rows so
    /// neighboring strings sit under neighboring fingers.
    pub fn built_in() -> Catalog {
        let instruments = vec![
            InstrumentConfig::new(
                "3-string",
                "Mountain Trio",
                vec![0.794, 1.0, 1.26],
                vec!["j", "k", "l"],
                "Three drone strings. Sparse, open, hard to play badly.",
            ),
            InstrumentConfig::new(
                "4-string",
                "Parlor Four",
                vec![0.794, 0.891, 1.0, 1.122],
                vec!["h", "j", "k", "l"],
                "A compact four-string tuned in whole steps.",
            ),
            InstrumentConfig::new(
                "6-string",
                "Standard Six",
                vec![0.707, 0.794, 0.891, 1.0, 1.122, 1.26],
                vec!["a", "s", "d", "f", "g", "h"],
                "The familiar six-string layout across the home row.",
            ),
            InstrumentConfig::new(
                "12-string",
                "Grand Twelve",
                vec![
                    0.561, 0.63, 0.707, 0.794, 0.891, 1.0, 1.122, 1.26, 1.414, 1.587, 1.782, 2.0,
                ],
                vec!["q", "w", "e", "r", "t", "y", "u", "i", "o", "p", "z", "x"],
                "Twelve strings spanning two octaves for full-width strums.",
            ),
        ];

        Catalog {
            instruments: instruments
                .into_iter()
                .map(|instrument| {
                    Arc::new(instrument.expect("built-in instrument must be valid"))
                })
                .collect(),
        }
    }

    /// Adds an instrument, replacing any existing instrument with the same id.
    pub fn add(&mut self, instrument: InstrumentConfig) {
        self.instruments
            .retain(|existing| existing.id() != instrument.id());
        self.instruments.push(Arc::new(instrument));
    }

    /// Looks up an instrument by id.
    pub fn get(&self, id: &str) -> Option<Arc<InstrumentConfig>> {
        self.instruments
            .iter()
            .find(|instrument| instrument.id() == id)
            .cloned()
    }

    /// All instruments in catalog order.
    pub fn list(&self) -> &[Arc<InstrumentConfig>] {
        &self.instruments
    }
}
