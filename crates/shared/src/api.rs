//! Shared API request/response types used by clients and the API server.

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Earliest year a movie can be released in (the first film).
pub const MIN_MOVIE_YEAR: i32 = 1888;
/// Max genres per movie.
const MAX_GENRES: usize = 5;
/// Length of a hex-encoded 16-byte token plaintext.
pub const TOKEN_PLAINTEXT_LEN: usize = 32;

// ============================================================================
// Runtime
// ============================================================================

/// Movie running time in minutes. Encoded in JSON as `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Runtime(pub i32);

/// Returned when a runtime string is not of the form `"<n> mins"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRuntimeFormat;

impl fmt::Display for InvalidRuntimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid runtime format")
    }
}

impl std::error::Error for InvalidRuntimeFormat {}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (minutes, unit) = s.split_once(' ').ok_or(InvalidRuntimeFormat)?;
        if unit != "mins" {
            return Err(InvalidRuntimeFormat);
        }
        minutes
            .parse::<i32>()
            .map(Runtime)
            .map_err(|_| InvalidRuntimeFormat)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Movie types
// ============================================================================

/// Movie fields as submitted by a client. Validated against the current year.
///
/// Also used to re-validate a stored movie after a partial update has been
/// merged into it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[garde(context(i32))]
#[serde(deny_unknown_fields)]
pub struct MoviePayload {
    #[garde(length(min = 1, max = 500))]
    pub title: String,
    #[garde(custom(validate_year))]
    pub year: i32,
    #[garde(custom(validate_runtime))]
    pub runtime: Runtime,
    #[garde(length(min = 1, max = MAX_GENRES), custom(validate_unique_genres))]
    pub genres: Vec<String>,
}

fn validate_year(value: &i32, current_year: &i32) -> garde::Result {
    if *value < MIN_MOVIE_YEAR {
        return Err(garde::Error::new("must be greater than 1888"));
    }
    if value > current_year {
        return Err(garde::Error::new("must not be in the future"));
    }
    Ok(())
}

fn validate_runtime(value: &Runtime, _: &i32) -> garde::Result {
    if value.0 <= 0 {
        return Err(garde::Error::new("must be a positive integer"));
    }
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn validate_unique_genres(value: &Vec<String>, _: &i32) -> garde::Result {
    let unique: HashSet<&str> = value.iter().map(String::as_str).collect();
    if unique.len() != value.len() {
        return Err(garde::Error::new("must not contain duplicate values"));
    }
    Ok(())
}

/// Partial movie update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMoviePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

/// A movie as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieView {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovieResponse {
    pub movie: MovieView,
}

/// Pagination details for list endpoints. Empty when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_page: u32,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub total_records: u64,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

impl Metadata {
    /// Computes pagination metadata for `total_records` matches.
    pub fn calculate(total_records: u64, page: u32, page_size: u32) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(u64::from(page_size)) as u32,
            total_records,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovieListResponse {
    pub metadata: Metadata,
    pub movies: Vec<MovieView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// User and token types
// ============================================================================

/// Register a new account.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserPayload {
    #[garde(length(min = 1, max = 500))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 72))]
    pub password: String,
}

/// Activate an account with the token received by email.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserPayload {
    #[garde(length(min = TOKEN_PLAINTEXT_LEN, max = TOKEN_PLAINTEXT_LEN), pattern(r"^[0-9a-f]+$"))]
    pub token: String,
}

/// Exchange credentials for an authentication token.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateAuthTokenPayload {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 72))]
    pub password: String,
}

/// A user as returned by the API. Never carries the password hash or version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserView,
}

/// A freshly issued token. The plaintext is only ever shown here.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenView {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub authentication_token: TokenView,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    pub system_info: SystemInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_movie() -> MoviePayload {
        MoviePayload {
            title: "Moana".into(),
            year: 2016,
            runtime: Runtime(107),
            genres: vec!["animation".into(), "adventure".into()],
        }
    }

    mod runtime {
        use super::*;

        #[test]
        fn serializes_with_unit() {
            let json = serde_json::to_string(&Runtime(102)).unwrap();
            assert_eq!(json, r#""102 mins""#);
        }

        #[test]
        fn parses_minutes() {
            let runtime: Runtime = serde_json::from_str(r#""95 mins""#).unwrap();
            assert_eq!(runtime, Runtime(95));
        }

        #[test]
        fn rejects_bare_number() {
            assert!(serde_json::from_str::<Runtime>("95").is_err());
        }

        #[test]
        fn rejects_wrong_unit() {
            assert_eq!("95 minutes".parse::<Runtime>(), Err(InvalidRuntimeFormat));
            assert_eq!("ninety mins".parse::<Runtime>(), Err(InvalidRuntimeFormat));
        }
    }

    mod movie_payload {
        use super::*;

        #[test]
        fn accepts_valid_movie() {
            assert!(valid_movie().validate_with(&2024).is_ok());
        }

        #[test]
        fn rejects_empty_title() {
            let payload = MoviePayload {
                title: String::new(),
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_future_year() {
            let payload = MoviePayload {
                year: 2031,
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_year_before_cinema() {
            let payload = MoviePayload {
                year: 1700,
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_non_positive_runtime() {
            let payload = MoviePayload {
                runtime: Runtime(0),
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_duplicate_genres() {
            let payload = MoviePayload {
                genres: vec!["drama".into(), "drama".into()],
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_too_many_genres() {
            let payload = MoviePayload {
                genres: (0..6).map(|i| format!("genre-{i}")).collect(),
                ..valid_movie()
            };
            assert!(payload.validate_with(&2024).is_err());
        }

        #[test]
        fn rejects_unknown_fields() {
            let json = r#"{"title":"x","year":2000,"runtime":"90 mins","genres":["a"],"rating":5}"#;
            assert!(serde_json::from_str::<MoviePayload>(json).is_err());
        }
    }

    mod user_payloads {
        use super::*;

        #[test]
        fn rejects_short_password() {
            let payload = RegisterUserPayload {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                password: "short".into(),
            };
            assert!(payload.validate().is_err());
        }

        #[test]
        fn rejects_invalid_email() {
            let payload = CreateAuthTokenPayload {
                email: "not-an-email".into(),
                password: "pa55word1234".into(),
            };
            assert!(payload.validate().is_err());
        }

        #[test]
        fn rejects_malformed_activation_token() {
            let payload = ActivateUserPayload {
                token: "Z".repeat(TOKEN_PLAINTEXT_LEN),
            };
            assert!(payload.validate().is_err());
        }

        #[test]
        fn accepts_hex_activation_token() {
            let payload = ActivateUserPayload {
                token: "ab".repeat(TOKEN_PLAINTEXT_LEN / 2),
            };
            assert!(payload.validate().is_ok());
        }
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let metadata = Metadata::calculate(41, 2, 20);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.current_page, 2);
    }

    #[test]
    fn metadata_is_empty_without_records() {
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
        let json = serde_json::to_string(&Metadata::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
