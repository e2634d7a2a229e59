use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::map::PLANE_COUNT;

/// Roster entry used by the group for shared storage. Never has a position.
pub const SHARED_MEMBER_NAME: &str = "@SHARED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
}

impl Member {
    pub fn is_shared(&self) -> bool {
        self.name == SHARED_MEMBER_NAME
    }
}

/// A world position as reported by the live-tracking integration.
///
/// Fields stay `f64` so that partial or garbled payloads survive parsing;
/// consumers gate on [`Coordinates::is_valid`] before using them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub plane: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64, plane: f64) -> Self {
        Self { x, y, plane }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.plane_index().is_some()
    }

    pub fn plane_index(&self) -> Option<u8> {
        let plane = self.plane;
        if plane.is_finite() && plane.fract() == 0.0 && plane >= 0.0 && plane < PLANE_COUNT as f64 {
            Some(plane as u8)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateUpdate {
    pub name: String,
    pub coordinates: Coordinates,
}

/// Why an inbound payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("expected an array of members, got {0}")]
    NotAnArray(&'static str),
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("payload has no usable `name`")]
    MissingName,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn name_of(value: &Value) -> Option<&str> {
    value
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn number_or_nan(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Parse a member-list event. Entries without a usable name are skipped.
pub fn parse_member_list(value: &Value) -> Result<Vec<Member>, Rejection> {
    let Value::Array(entries) = value else {
        return Err(Rejection::NotAnArray(kind(value)));
    };
    Ok(entries
        .iter()
        .filter_map(|entry| {
            name_of(entry).map(|name| Member {
                name: name.to_string(),
            })
        })
        .collect())
}

/// Parse a per-player coordinate event `{ name, x, y, plane }`.
///
/// Missing or non-numeric coordinates become NaN rather than a rejection.
pub fn parse_coordinate_update(value: &Value) -> Result<CoordinateUpdate, Rejection> {
    if !value.is_object() {
        return Err(Rejection::NotAnObject(kind(value)));
    }
    let name = name_of(value).ok_or(Rejection::MissingName)?;
    Ok(CoordinateUpdate {
        name: name.to_string(),
        coordinates: Coordinates {
            x: number_or_nan(value.get("x")),
            y: number_or_nan(value.get("y")),
            plane: number_or_nan(value.get("plane")),
        },
    })
}
