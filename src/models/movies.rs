use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::validator::{unique, Validator};

/// Earliest year a film can have been released
pub const MIN_MOVIE_YEAR: i32 = 1888;

/// Movie runtime in minutes
///
/// Serialized as the string `"<n> mins"`. Accepts that form, or a bare
/// integer, when deserializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuntimeVisitor;

        impl de::Visitor<'_> for RuntimeVisitor {
            type Value = Runtime;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(r#"a runtime such as "102 mins""#)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Runtime, E> {
                let minutes = value
                    .strip_suffix(" mins")
                    .and_then(|n| n.parse::<i32>().ok())
                    .ok_or_else(|| E::custom("invalid runtime format"))?;
                Ok(Runtime(minutes))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Runtime, E> {
                i32::try_from(value)
                    .map(Runtime)
                    .map_err(|_| E::custom("invalid runtime format"))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Runtime, E> {
                i32::try_from(value)
                    .map(Runtime)
                    .map_err(|_| E::custom("invalid runtime format"))
            }
        }

        deserializer.deserialize_any(RuntimeVisitor)
    }
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero_runtime")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    /// Incremented on every successful update, used to detect edit conflicts
    pub version: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn is_zero_runtime(r: &Runtime) -> bool {
    r.0 == 0
}

impl Movie {
    /// Build a movie that has not been stored yet
    pub fn new(title: String, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    let current_year = Utc::now().year();
    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= MIN_MOVIE_YEAR, "year", "must be greater than 1888");
    v.check(movie.year <= current_year, "year", "must not be in the future");

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(movie.genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}
