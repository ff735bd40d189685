// ── Tool parameters ──
//
// Untyped JSON parameters in, typed values out. Every accessor reports a
// bad value as a validation error on that parameter's name.

use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use strum::VariantNames;

use crate::error::{CoreError, FieldIssue};

/// Parameters one operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl ParamSpec {
    pub const NONE: Self = Self::new(&[], &[]);

    pub const fn new(required: &'static [&'static str], optional: &'static [&'static str]) -> Self {
        Self { required, optional }
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.required.contains(&name) || self.optional.contains(&name)
    }

    fn names(&self) -> Vec<&'static str> {
        self.required.iter().chain(self.optional).copied().collect()
    }
}

/// A JSON object of named parameters. `null` values count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Accepts an object, or `null` for no parameters.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::validation(
                "params",
                format!("must be a JSON object, got {}", type_name(&other)),
            )),
        }
    }

    /// Every missing required parameter and every unknown one, in one error.
    pub fn check(&self, spec: &ParamSpec) -> Result<(), CoreError> {
        let mut issues: Vec<FieldIssue> = spec
            .required
            .iter()
            .filter(|name| self.get(name).is_none())
            .map(|name| FieldIssue::new(*name, "required"))
            .collect();

        let accepted = spec.names();
        for name in self.0.keys().filter(|k| !spec.accepts(k)) {
            let message = if accepted.is_empty() {
                "unknown parameter; this operation takes none".to_owned()
            } else {
                format!("unknown parameter; expected one of: {}", accepted.join(", "))
            };
            issues.push(FieldIssue::new(name.clone(), message));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid_fields("invalid parameters", issues))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Value::is_null)
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn required(&self, name: &str) -> Result<&Value, CoreError> {
        self.get(name)
            .ok_or_else(|| CoreError::validation(name, "required"))
    }

    // ── Strings ──────────────────────────────────────────────────────

    pub fn str(&self, name: &str) -> Result<&str, CoreError> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| CoreError::validation(name, "must be a string"))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, CoreError> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.str(name).map(Some),
        }
    }

    /// A list of strings. A single string is split on commas.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, CoreError> {
        match self.required(name)? {
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| CoreError::validation(name, "must contain only strings"))
                })
                .collect(),
            _ => Err(CoreError::validation(
                name,
                "must be a list of strings or a comma-separated string",
            )),
        }
    }

    pub fn opt_string_list(&self, name: &str) -> Result<Option<Vec<String>>, CoreError> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.string_list(name).map(Some),
        }
    }

    // ── Scalars ──────────────────────────────────────────────────────

    pub fn bool(&self, name: &str) -> Result<bool, CoreError> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| CoreError::validation(name, "must be true or false"))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>, CoreError> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.bool(name).map(Some),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.opt_bool(name)?.unwrap_or(false))
    }

    pub fn opt_u32(&self, name: &str) -> Result<Option<u32>, CoreError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| CoreError::validation(name, "must be a non-negative integer"))
    }

    pub fn opt_u64(&self, name: &str) -> Result<Option<u64>, CoreError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .as_u64()
            .map(Some)
            .ok_or_else(|| CoreError::validation(name, "must be a non-negative integer"))
    }

    // ── Enumerations and structures ──────────────────────────────────

    /// One of a fixed set of names. The error lists the accepted values.
    pub fn choice<T: FromStr + VariantNames>(&self, name: &str) -> Result<T, CoreError> {
        let raw = self.str(name)?;
        raw.parse().map_err(|_| {
            CoreError::validation(
                name,
                format!("unknown value '{raw}'; expected one of: {}", T::VARIANTS.join(", ")),
            )
        })
    }

    pub fn opt_choice<T: FromStr + VariantNames>(
        &self,
        name: &str,
    ) -> Result<Option<T>, CoreError> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.choice(name).map(Some),
        }
    }

    /// A structured value decoded with serde.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Result<T, CoreError> {
        T::deserialize(self.required(name)?)
            .map_err(|e| CoreError::validation(name, e.to_string()))
    }

    pub fn opt_decode<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CoreError> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.decode(name).map(Some),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
