//! User configuration submitted to `POST /process`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Form field carrying the session identifier
pub const SESSION_ID_FIELD: &str = "session_id";

/// Form field selecting the translation backend
pub const TRANSLATION_ENGINE_FIELD: &str = "translation_engine";

/// Flat mapping of form field name to string value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessConfig(BTreeMap<String, String>);

impl ProcessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn translation_engine(&self) -> Option<&str> {
        self.get(TRANSLATION_ENGINE_FIELD)
    }

    /// Parse a `key=value` pair as given on the command line
    pub fn parse_assignment(pair: &str) -> Result<(String, String), String> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty field name in '{}'", pair));
        }
        Ok((key.to_string(), value.to_string()))
    }

    /// Copy of this config carrying `session_id`.
    ///
    /// Any caller-supplied `session_id` field is overwritten.
    pub fn stamped(&self, session_id: &str) -> Self {
        let mut stamped = self.clone();
        stamped.set(SESSION_ID_FIELD, session_id);
        stamped
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamping_overwrites_session_id() {
        let config = ProcessConfig::new()
            .with("translation_engine", "deepl")
            .with("session_id", "stale");

        let stamped = config.stamped("s1");
        assert_eq!(stamped.get("session_id"), Some("s1"));
        assert_eq!(stamped.translation_engine(), Some("deepl"));
        // Original untouched
        assert_eq!(config.get("session_id"), Some("stale"));
    }

    #[test]
    fn test_serializes_flat() {
        let config: ProcessConfig = [("whisperModel", "base"), ("audioSource", "audio_0")]
            .into_iter()
            .collect();
        let json = serde_json::to_value(config.stamped("s9")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"whisperModel": "base", "audioSource": "audio_0", "session_id": "s9"})
        );
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            ProcessConfig::parse_assignment("translation_engine=google").unwrap(),
            ("translation_engine".to_string(), "google".to_string())
        );
        assert_eq!(
            ProcessConfig::parse_assignment("deepl_key=a=b").unwrap().1,
            "a=b"
        );
        assert!(ProcessConfig::parse_assignment("novalue").is_err());
        assert!(ProcessConfig::parse_assignment("=x").is_err());
    }
}
