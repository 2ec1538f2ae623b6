//! Required-claim policy for the generic JWKS-JWT provider.
//!
//! A policy maps claim names to the value a verified token must carry.
//! It is parsed once from configuration (`key1=value1,key2=value2`).

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a claim policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimPolicyError {
    #[error("should be key/value separated with '=': {0}")]
    MissingSeparator(String),

    #[error("claim name must not be empty: {0}")]
    EmptyKey(String),
}

/// Mapping from claim name to required value.
///
/// Matching rules:
/// - `iss`: exact string equality
/// - `aud`: the token audience equals the value, or is a list containing it
/// - anything else: exact equality with the decoded claim value
///
/// A claim absent from the token never matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimPolicy {
    required: BTreeMap<String, Value>,
}

impl ClaimPolicy {
    /// Parse a comma-separated `key=value` list.
    ///
    /// Whitespace around keys and values is trimmed. Empty (or whitespace
    /// only) input yields an empty policy.
    ///
    /// # Errors
    ///
    /// Returns `ClaimPolicyError` when a pair has no `=` or an empty key.
    pub fn parse(input: &str) -> Result<Self, ClaimPolicyError> {
        let mut required = BTreeMap::new();
        if input.trim().is_empty() {
            return Ok(Self { required });
        }

        for pair in input.split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ClaimPolicyError::MissingSeparator(pair.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ClaimPolicyError::EmptyKey(pair.to_string()));
            }
            required.insert(key.to_string(), Value::String(value.trim().to_string()));
        }

        Ok(Self { required })
    }

    /// Add a required claim with an arbitrary JSON value.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.required.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.required.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.required.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check every required claim against a verified claim set.
    ///
    /// # Errors
    ///
    /// Returns the name of the first claim that is missing or mismatched.
    pub fn check(&self, claims: &Map<String, Value>) -> Result<(), String> {
        for (name, expected) in &self.required {
            let matched = match name.as_str() {
                "iss" => issuer_matches(claims, expected),
                "aud" => audience_matches(claims, expected),
                _ => claims.get(name) == Some(expected),
            };
            if !matched {
                return Err(name.clone());
            }
        }
        Ok(())
    }
}

impl FromStr for ClaimPolicy {
    type Err = ClaimPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `iss` must be a string equal to the expected string.
pub(crate) fn issuer_matches(claims: &Map<String, Value>, expected: &Value) -> bool {
    match (claims.get("iss").and_then(Value::as_str), expected.as_str()) {
        (Some(actual), Some(expected)) => actual == expected,
        _ => false,
    }
}

/// `aud` may be a single string or a list of strings.
pub(crate) fn audience_matches(claims: &Map<String, Value>, expected: &Value) -> bool {
    let Some(expected) = expected.as_str() else {
        return false;
    };
    match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(expected)),
        _ => false,
    }
}
