// Identifier and geometry types shared by the codec, the relay and clients.
//
// `ViobId` and `BoardId` are opaque strings on the wire. The relay never
// interprets them; they are newtypes only so the two cannot be mixed up in
// Rust code. Freehand point lists stay opaque inside `Message` as well, with
// `encode_points`/`decode_points` for the endpoints that draw them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Identifier of a drawable visual object, minted by whichever endpoint
/// creates the object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViobId(pub String);

impl ViobId {
    /// Mint a fresh random identifier (UUID v4).
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a room ("board"). Every connection starts in [`BoardId::DEFAULT`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub String);

impl BoardId {
    pub const DEFAULT: &'static str = "default";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoardId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A vertex of a freehand path, in the Y-up scene coordinate system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// Render points as space-separated `hexX,hexY` pairs.
pub fn encode_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", hex(p.x), hex(p.y)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a space-separated list of `hexX,hexY` pairs.
pub fn decode_points(text: &str) -> Result<Vec<Point>, ProtocolError> {
    text.split_whitespace()
        .map(|pair| {
            let bad = || ProtocolError::InvalidPoint(pair.to_owned());
            let (x, y) = pair.split_once(',').ok_or_else(bad)?;
            Ok(Point {
                x: i64::from_str_radix(x, 16).map_err(|_| bad())?,
                y: i64::from_str_radix(y, 16).map_err(|_| bad())?,
            })
        })
        .collect()
}

fn hex(v: i64) -> String {
    if v < 0 {
        format!("-{:x}", v.unsigned_abs())
    } else {
        format!("{v:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_viob_ids_differ() {
        let a = ViobId::random();
        let b = ViobId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn default_board_name() {
        assert_eq!(BoardId::default().as_str(), "default");
    }

    #[test]
    fn encode_points_as_hex_pairs() {
        let points = [Point { x: 10, y: 255 }, Point { x: 0, y: -2 }];
        assert_eq!(encode_points(&points), "a,ff 0,-2");
        assert_eq!(decode_points("a,ff 0,-2").unwrap(), points);
    }

    #[test]
    fn empty_point_list() {
        assert_eq!(encode_points(&[]), "");
        assert!(decode_points("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_malformed_pairs() {
        assert_eq!(
            decode_points("1,2 zz"),
            Err(ProtocolError::InvalidPoint("zz".into()))
        );
        assert_eq!(
            decode_points("1,g"),
            Err(ProtocolError::InvalidPoint("1,g".into()))
        );
    }
}
