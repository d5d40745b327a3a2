//! Duration Values
//!
//! Cooldown lengths in the config accept integer seconds or strings such as
//! `"90s"`, `"2m"`, `"1h30m"` or `"500ms"`.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a duration string like "1m30s" or "2h" into a Duration
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(stripped) = s.strip_suffix("ms") {
        return stripped.trim().parse::<u64>().ok().map(Duration::from_millis);
    }

    // Compound forms ("1m30s", "2h30m")
    if s.contains('h') || (s.contains('m') && s.contains('s')) {
        let mut total_secs = 0u64;
        let mut current_num = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_num.push(c);
            } else if !current_num.is_empty() {
                let n = current_num.parse::<u64>().ok()?;
                match c {
                    'h' => total_secs = total_secs.checked_add(n.checked_mul(3600)?)?,
                    'm' => total_secs = total_secs.checked_add(n.checked_mul(60)?)?,
                    's' => total_secs = total_secs.checked_add(n)?,
                    _ => return None,
                }
                current_num.clear();
            } else if !c.is_whitespace() {
                return None;
            }
        }

        // trailing digits without a unit
        if !current_num.is_empty() {
            return None;
        }
        return Some(Duration::from_secs(total_secs));
    }

    if let Some(stripped) = s.strip_suffix('s') {
        return stripped
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
    }
    if let Some(stripped) = s.strip_suffix('m') {
        return stripped
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|mins| mins.checked_mul(60))
            .map(Duration::from_secs);
    }

    // bare number = seconds
    s.parse::<u64>().ok().map(Duration::from_secs)
}

/// Render a duration the way the parser reads it back
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// serde adapter: `#[serde(with = "crate::config::duration")]`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration_string(&text).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid duration '{}', expected e.g. \"90s\", \"2m\", \"4h\" or \"1h30m\"",
                text
            ))
        }),
    }
}

/// serde adapter: `#[serde(with = "crate::config::duration")]`
pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*value))
}
