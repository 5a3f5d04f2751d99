// src/criteria.rs
//! Search criteria and the accumulate/overwrite merge.
//!
//! Every facet has a fixed merge policy, listed in [`Facet::policy`]:
//!
//! | facet                                                        | policy    |
//! |--------------------------------------------------------------|-----------|
//! | type, breed, color, age, size, gender, coat, good_with       | union     |
//! | house_trained, declawed, location, distance                  | overwrite |
//!
//! Union facets only ever grow. Overwrite facets are replaced when the
//! incoming criteria sets them and left alone when it does not.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::CriteriaMergeError;

/// Largest search radius (miles) the remote service accepts.
pub const MAX_DISTANCE: u32 = 500;

/// Tags accepted by the `good_with` facet.
pub const GOOD_WITH_TAGS: [&str; 3] = ["children", "cats", "dogs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Union,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Type,
    Breed,
    Color,
    Age,
    Size,
    Gender,
    Coat,
    GoodWith,
    HouseTrained,
    Declawed,
    Location,
    Distance,
}

impl Facet {
    pub const ALL: [Facet; 12] = [
        Facet::Type,
        Facet::Breed,
        Facet::Color,
        Facet::Age,
        Facet::Size,
        Facet::Gender,
        Facet::Coat,
        Facet::GoodWith,
        Facet::HouseTrained,
        Facet::Declawed,
        Facet::Location,
        Facet::Distance,
    ];

    pub const fn policy(self) -> MergePolicy {
        match self {
            Facet::Type
            | Facet::Breed
            | Facet::Color
            | Facet::Age
            | Facet::Size
            | Facet::Gender
            | Facet::Coat
            | Facet::GoodWith => MergePolicy::Union,
            Facet::HouseTrained | Facet::Declawed | Facet::Location | Facet::Distance => {
                MergePolicy::Overwrite
            }
        }
    }

    /// Facets whose tokens come from a closed lowercase vocabulary and are
    /// folded on merge. Breed, color and the rest keep their case.
    pub const fn folds_case(self) -> bool {
        matches!(self, Facet::Type | Facet::GoodWith)
    }

    /// Wire name, shared by the config file format and the query string.
    pub const fn name(self) -> &'static str {
        match self {
            Facet::Type => "type",
            Facet::Breed => "breed",
            Facet::Color => "color",
            Facet::Age => "age",
            Facet::Size => "size",
            Facet::Gender => "gender",
            Facet::Coat => "coat",
            Facet::GoodWith => "good_with",
            Facet::HouseTrained => "house_trained",
            Facet::Declawed => "declawed",
            Facet::Location => "location",
            Facet::Distance => "distance",
        }
    }
}

/// Filter describing the animals we are looking for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Criteria {
    #[serde(rename = "type", skip_serializing_if = "BTreeSet::is_empty")]
    pub animal_type: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub breed: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub color: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub age: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub size: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub gender: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub coat: BTreeSet<String>,
    /// Subset of [`GOOD_WITH_TAGS`].
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub good_with: BTreeSet<String>,
    /// `None` means "not specified"; only `Some` overwrites on merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_trained: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declawed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Search radius in miles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token set backing a union facet; `None` for overwrite facets.
    pub fn tokens(&self, facet: Facet) -> Option<&BTreeSet<String>> {
        match facet {
            Facet::Type => Some(&self.animal_type),
            Facet::Breed => Some(&self.breed),
            Facet::Color => Some(&self.color),
            Facet::Age => Some(&self.age),
            Facet::Size => Some(&self.size),
            Facet::Gender => Some(&self.gender),
            Facet::Coat => Some(&self.coat),
            Facet::GoodWith => Some(&self.good_with),
            Facet::HouseTrained | Facet::Declawed | Facet::Location | Facet::Distance => None,
        }
    }

    fn tokens_mut(&mut self, facet: Facet) -> Option<&mut BTreeSet<String>> {
        match facet {
            Facet::Type => Some(&mut self.animal_type),
            Facet::Breed => Some(&mut self.breed),
            Facet::Color => Some(&mut self.color),
            Facet::Age => Some(&mut self.age),
            Facet::Size => Some(&mut self.size),
            Facet::Gender => Some(&mut self.gender),
            Facet::Coat => Some(&mut self.coat),
            Facet::GoodWith => Some(&mut self.good_with),
            Facet::HouseTrained | Facet::Declawed | Facet::Location | Facet::Distance => None,
        }
    }

    /// Copy an overwrite facet from `incoming` if it was supplied there.
    fn overwrite_from(&mut self, facet: Facet, incoming: &Criteria) {
        match facet {
            Facet::HouseTrained => overwrite(&mut self.house_trained, &incoming.house_trained),
            Facet::Declawed => overwrite(&mut self.declawed, &incoming.declawed),
            Facet::Location => {
                let trimmed = incoming.location.as_deref().map(|l| l.trim().to_string());
                overwrite(&mut self.location, &trimmed);
            }
            Facet::Distance => overwrite(&mut self.distance, &incoming.distance),
            _ => {}
        }
    }

    /// Builder helper: add tokens to a union facet. Ignored for overwrite facets.
    pub fn with_tokens<I, S>(mut self, facet: Facet, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(set) = self.tokens_mut(facet) {
            set.extend(tokens.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_distance(mut self, miles: u32) -> Self {
        self.distance = Some(miles);
        self
    }

    pub fn with_house_trained(mut self, value: bool) -> Self {
        self.house_trained = Some(value);
        self
    }

    pub fn with_declawed(mut self, value: bool) -> Self {
        self.declawed = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Criteria::default()
    }

    /// Check that every supplied value fits its facet.
    pub fn validate(&self) -> Result<(), CriteriaMergeError> {
        for facet in Facet::ALL {
            if let Some(set) = self.tokens(facet) {
                if set.iter().any(|t| t.trim().is_empty()) {
                    return Err(CriteriaMergeError::BlankToken {
                        facet: facet.name(),
                    });
                }
            }
        }
        if let Some(tag) = self
            .good_with
            .iter()
            .find(|t| !GOOD_WITH_TAGS.contains(&t.trim().to_ascii_lowercase().as_str()))
        {
            return Err(CriteriaMergeError::UnknownGoodWith(tag.clone()));
        }
        if matches!(self.location.as_deref(), Some(l) if l.trim().is_empty()) {
            return Err(CriteriaMergeError::BlankLocation);
        }
        if let Some(d) = self.distance {
            if d == 0 || d > MAX_DISTANCE {
                return Err(CriteriaMergeError::DistanceOutOfRange(d));
            }
        }
        Ok(())
    }

    /// Query parameters for the animal search endpoint.
    ///
    /// Union facets are sent comma-separated; `good_with` expands to one
    /// `good_with_<tag>=true` flag per tag.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut q = Vec::new();
        for facet in Facet::ALL {
            match facet {
                Facet::GoodWith => {
                    for tag in &self.good_with {
                        q.push((format!("good_with_{tag}"), "true".to_string()));
                    }
                }
                Facet::HouseTrained => push_opt(&mut q, facet, self.house_trained),
                Facet::Declawed => push_opt(&mut q, facet, self.declawed),
                Facet::Location => push_opt(&mut q, facet, self.location.as_deref()),
                Facet::Distance => push_opt(&mut q, facet, self.distance),
                _ => {
                    if let Some(set) = self.tokens(facet).filter(|s| !s.is_empty()) {
                        let joined = set.iter().map(String::as_str).collect::<Vec<_>>().join(",");
                        q.push((facet.name().to_string(), joined));
                    }
                }
            }
        }
        q
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(v) = incoming {
        *slot = Some(v.clone());
    }
}

fn push_opt<T: ToString>(q: &mut Vec<(String, String)>, facet: Facet, value: Option<T>) {
    if let Some(v) = value {
        q.push((facet.name().to_string(), v.to_string()));
    }
}

/// Fold `incoming` into `current` and return the merged criteria.
///
/// Neither input is modified. On error nothing is produced, so callers can
/// commit the result all-or-nothing.
pub fn merge(current: &Criteria, incoming: &Criteria) -> Result<Criteria, CriteriaMergeError> {
    incoming.validate()?;

    let mut merged = current.clone();
    for facet in Facet::ALL {
        match facet.policy() {
            MergePolicy::Union => {
                let (Some(src), Some(dst)) = (incoming.tokens(facet), merged.tokens_mut(facet))
                else {
                    continue;
                };
                let lower = facet.folds_case();
                dst.extend(src.iter().map(|t| {
                    let t = t.trim();
                    if lower {
                        t.to_ascii_lowercase()
                    } else {
                        t.to_string()
                    }
                }));
            }
            MergePolicy::Overwrite => merged.overwrite_from(facet, incoming),
        }
    }
    Ok(merged)
}
