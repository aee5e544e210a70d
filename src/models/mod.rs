//! Domain model module declarations.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod audit;
pub mod event;
pub mod raw;

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01).
const PLATFORM_EPOCH_MS: i64 = 1_420_070_400_000;

/// Platform identifier with an embedded creation timestamp.
///
/// Serialized as a decimal string; deserializes from either a string or
/// a number since gateway and REST payloads disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Time at which the identified object was created.
    #[must_use]
    pub fn created_at(self) -> DateTime<Utc> {
        let offset = i64::try_from(self.0 >> 22).unwrap_or(i64::MAX - PLATFORM_EPOCH_MS);
        Utc.timestamp_millis_opt(PLATFORM_EPOCH_MS + offset)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Smallest snowflake created at `time`; the low 22 bits are zero.
    #[must_use]
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        let millis = u64::try_from(time.timestamp_millis() - PLATFORM_EPOCH_MS).unwrap_or(0);
        Self(millis << 22)
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Number(number) => Ok(Self(number)),
        }
    }
}

/// Guild (collection) identifier.
pub type GuildId = Snowflake;
