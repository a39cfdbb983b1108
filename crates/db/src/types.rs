use std::fmt;

use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use svix_ksuid::KsuidLike;

#[derive(DieselNewType, Debug, Hash, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct DbId(String);

impl Default for DbId {
    fn default() -> Self {
        DbId(svix_ksuid::Ksuid::new(None, None).to_string())
    }
}

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DbId {
    fn from(string: String) -> Self {
        DbId(string)
    }
}

impl From<svix_ksuid::Ksuid> for DbId {
    fn from(id: svix_ksuid::Ksuid) -> Self {
        DbId(id.to_string())
    }
}

/// The only two vote values that exist. Raw integers never cross the API
/// boundary; conversion to ±1 happens where the vote is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(&self) -> i32 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }
}
