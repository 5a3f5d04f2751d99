// src/pfclient/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One adoptable animal as returned by the listing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub id: i64,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub animal_type: String,
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub breeds: AnimalBreeds,
    #[serde(default)]
    pub colors: Colors,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub size: String,
    pub coat: Option<String>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default, deserialize_with = "de_published_at")]
    pub published_at: Option<DateTime<Utc>>,
    /// Miles from the searched location; absent when no location was given.
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimalBreeds {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub mixed: bool,
    pub unknown: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Colors {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub tertiary: Option<String>,
}

/// The size variants of a single photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Photo {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
    pub full: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub spayed_neutered: bool,
    pub house_trained: bool,
    pub declawed: Option<bool>,
    pub special_needs: bool,
    pub shots_current: bool,
}

/// Ideal home; `None` when the shelter did not say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub children: Option<bool>,
    pub dogs: Option<bool>,
    pub cats: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub count_per_page: i64,
    pub total_count: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// A single page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalPage {
    pub animals: Vec<Animal>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// An animal type and the attribute values the service accepts for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalType {
    pub name: String,
    #[serde(default)]
    pub coats: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub genders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breed {
    pub name: String,
}

#[derive(Deserialize)]
pub(crate) struct TypesResponse {
    pub types: Vec<AnimalType>,
}

#[derive(Deserialize)]
pub(crate) struct TypeResponse {
    #[serde(rename = "type")]
    pub animal_type: AnimalType,
}

#[derive(Deserialize)]
pub(crate) struct BreedsResponse {
    pub breeds: Vec<Breed>,
}

/// The service sends `2018-09-04T14:49:09+0000`, which is not strict RFC 3339.
fn de_published_at<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    parse_timestamp(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("bad published_at `{raw}`")))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
