//! Common serde utilities for human-readable durations across configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Custom serde functions for Duration that support human-readable strings
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '500ms', '5s', '2m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_f64<E>(self, seconds: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Duration::try_from_secs_f64(seconds)
                    .map_err(|e| de::Error::custom(format!("Invalid duration {seconds}: {e}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value.trim())
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "super::duration")]
        timeout: Duration,
    }

    #[test]
    fn parses_human_readable_and_numeric_durations() {
        let human: Wrapper = toml::from_str(r#"timeout = "1m30s""#).unwrap();
        assert_eq!(human.timeout, Duration::from_secs(90));

        let numeric: Wrapper = toml::from_str("timeout = 4").unwrap();
        assert_eq!(numeric.timeout, Duration::from_secs(4));

        let millis: Wrapper = toml::from_str(r#"timeout = "250ms""#).unwrap();
        assert_eq!(millis.timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_garbage_duration() {
        let result: Result<Wrapper, _> = toml::from_str(r#"timeout = "soon""#);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_as_humantime_string() {
        let wrapper = Wrapper {
            timeout: Duration::from_secs(300),
        };
        let out = toml::to_string(&wrapper).unwrap();
        assert!(out.contains("timeout = \"5m\""), "unexpected output: {out}");
    }
}
