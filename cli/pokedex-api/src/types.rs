//! Wire types of the Pokédex API.
//!
//! The structs mirror the JSON documents exchanged with the backend.
//! A few inherent methods derive the values a detail view displays
//! (padded numbers, metric measurements, stat labels), so every front end
//! formats them the same way.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stats are displayed relative to the highest base stat any creature can have.
pub const MAX_BASE_STAT: u32 = 255;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Username and password submitted to `POST /auth/login/json`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check the required-field constraints a login form enforces.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        Ok(())
    }
}

// Never print the password, not even in debug logs.
impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username is required")]
    MissingUsername,
    #[error("password is required")]
    MissingPassword,
}

/// Token issued by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The authenticated user as returned by `GET /auth/me`.
///
/// Timestamps are kept verbatim; the backend emits them without a timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Order in which the backend returns list pages.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// National dex number
    #[default]
    #[display("id")]
    Id,
    #[display("name")]
    Name,
}

/// Query parameters of `GET /pokemon`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRequest {
    pub offset: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortKey>,
}

/// A creature as shown in the paginated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonListItem {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Thumbnail reference
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

impl PokemonListItem {
    pub fn display_number(&self) -> String {
        display_number(self.id)
    }

    pub fn primary_type(&self) -> Option<PokemonType> {
        self.types.first().map(|name| PokemonType::from_name(name))
    }
}

/// One page of `GET /pokemon`.
///
/// `next` is the only reliable indicator that another page exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonListResponse {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<PokemonListItem>,
}

impl PokemonListResponse {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

// ---------------------------------------------------------------------------
// Details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonSprites {
    #[serde(default)]
    pub front_default: Option<String>,
    #[serde(default)]
    pub other: OtherSprites,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherSprites {
    #[serde(default, rename = "official-artwork", alias = "official_artwork")]
    pub official_artwork: Artwork,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    #[serde(default)]
    pub front_default: Option<String>,
}

/// A named reference, as used for types, abilities and stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonTypeSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonAbility {
    pub ability: NamedResource,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonStat {
    pub base_stat: u32,
    #[serde(default)]
    pub effort: u32,
    pub stat: NamedResource,
}

impl PokemonStat {
    /// Human readable stat name, e.g. `special-attack` becomes `Sp. Attack`.
    pub fn label(&self) -> String {
        let name = self.stat.name.replacen("special-", "Sp. ", 1).replacen('-', " ", 1);
        capitalize_words(&name)
    }

    /// Base stat as a percentage of [MAX_BASE_STAT].
    pub fn percentage(&self) -> f64 {
        f64::from(self.base_stat) / f64::from(MAX_BASE_STAT) * 100.0
    }
}

/// A fully populated creature record from `GET /pokemon/{name_or_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonDetails {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub sprites: PokemonSprites,
    #[serde(default)]
    pub types: Vec<PokemonTypeSlot>,
    /// Decimetres
    pub height: u32,
    /// Hectograms
    pub weight: u32,
    #[serde(default)]
    pub abilities: Vec<PokemonAbility>,
    #[serde(default)]
    pub stats: Vec<PokemonStat>,
}

impl PokemonDetails {
    pub fn display_number(&self) -> String {
        display_number(self.id)
    }

    pub fn height_meters(&self) -> f64 {
        f64::from(self.height) / 10.0
    }

    pub fn weight_kilograms(&self) -> f64 {
        f64::from(self.weight) / 10.0
    }

    pub fn primary_type(&self) -> Option<PokemonType> {
        self.types
            .first()
            .map(|slot| PokemonType::from_name(&slot.kind.name))
    }

    /// Names of the abilities that are not hidden.
    pub fn visible_abilities(&self) -> Vec<&str> {
        self.abilities
            .iter()
            .filter(|ability| !ability.is_hidden)
            .map(|ability| ability.ability.name.as_str())
            .collect()
    }

    /// The best available image: official artwork, then the default sprite,
    /// then the list thumbnail.
    pub fn artwork_url(&self) -> Option<&str> {
        self.sprites
            .other
            .official_artwork
            .front_default
            .as_deref()
            .or(self.sprites.front_default.as_deref())
            .or(self.sprite.as_deref())
    }
}

/// Dex numbers are shown zero-padded to three digits, e.g. `#025`.
pub fn display_number(id: u32) -> String {
    format!("#{id:03}")
}

fn capitalize_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

// ---------------------------------------------------------------------------
// Creature types
// ---------------------------------------------------------------------------

/// Elemental type of a creature.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub enum PokemonType {
    #[display("bug")]
    Bug,
    #[display("dark")]
    Dark,
    #[display("dragon")]
    Dragon,
    #[display("electric")]
    Electric,
    #[display("fairy")]
    Fairy,
    #[display("fighting")]
    Fighting,
    #[display("fire")]
    Fire,
    #[display("flying")]
    Flying,
    #[display("ghost")]
    Ghost,
    #[display("grass")]
    Grass,
    #[display("ground")]
    Ground,
    #[display("ice")]
    Ice,
    #[display("normal")]
    Normal,
    #[display("poison")]
    Poison,
    #[display("psychic")]
    Psychic,
    #[display("rock")]
    Rock,
    #[display("steel")]
    Steel,
    #[display("water")]
    Water,
    /// A type this client doesn't know about yet
    #[display("{_0}")]
    Unknown(String),
}

impl PokemonType {
    pub const KNOWN: [PokemonType; 18] = [
        PokemonType::Bug,
        PokemonType::Dark,
        PokemonType::Dragon,
        PokemonType::Electric,
        PokemonType::Fairy,
        PokemonType::Fighting,
        PokemonType::Fire,
        PokemonType::Flying,
        PokemonType::Ghost,
        PokemonType::Grass,
        PokemonType::Ground,
        PokemonType::Ice,
        PokemonType::Normal,
        PokemonType::Poison,
        PokemonType::Psychic,
        PokemonType::Rock,
        PokemonType::Steel,
        PokemonType::Water,
    ];

    pub fn from_name(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        Self::KNOWN
            .iter()
            .find(|known| known.to_string() == lowered)
            .cloned()
            .unwrap_or(PokemonType::Unknown(lowered))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, PokemonType::Unknown(_))
    }
}

impl FromStr for PokemonType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}
