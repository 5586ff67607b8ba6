// Structured messages and their text record encoding.
//
// A record is `/`-separated fields whose first field is the command tag:
//
//   <join/board_id
//   <colupd/viob_id/color
//   <posupd/viob_id/ll_x/ll_y/ur_x/ur_y
//   <newrec/viob_id/ll_x/ll_y/ur_x/ur_y/color
//   <newtxt/viob_id/ll_x/ll_y/text/color/font/size/weight
//   <newfre/viob_id/color/lwidth/points
//   <erase/viob_id
//
// String fields are escaped with `escape::escape` and numeric fields are
// decimal integers. Identifiers go through the same escaping, which is a
// no-op for the UUIDs clients mint but keeps any id round-trippable.
// Coordinates are lower-left/upper-right corners in a Y-up system.
//
// Only `join` means anything to the relay. Every other message is payload the
// relay stores and forwards without looking inside.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::escape::{escape, unescape};
use crate::framing::{FIELD_SEPARATOR, frame};
use crate::types::{BoardId, ViobId};

/// Command tags, the first field of every record.
pub mod tags {
    pub const JOIN: &str = "<join";
    pub const COLOR_UPDATE: &str = "<colupd";
    pub const POSITION_UPDATE: &str = "<posupd";
    pub const CREATE_RECT: &str = "<newrec";
    pub const CREATE_TEXT: &str = "<newtxt";
    pub const CREATE_FREEHAND: &str = "<newfre";
    pub const ERASE: &str = "<erase";
}

/// One decoded record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Move the sender to another room. Client to relay only.
    Join { board_id: BoardId },
    /// An object's fill color changed.
    ColorUpdate { viob_id: ViobId, color: String },
    /// An object's bounding box changed.
    PositionUpdate {
        viob_id: ViobId,
        ll_x: i64,
        ll_y: i64,
        ur_x: i64,
        ur_y: i64,
    },
    CreateRect {
        viob_id: ViobId,
        ll_x: i64,
        ll_y: i64,
        ur_x: i64,
        ur_y: i64,
        color: String,
    },
    CreateText {
        viob_id: ViobId,
        ll_x: i64,
        ll_y: i64,
        text: String,
        color: String,
        font: String,
        size: i64,
        weight: String,
    },
    /// `points` is the opaque `hexX,hexY` list; see `types::decode_points`.
    CreateFreehand {
        viob_id: ViobId,
        color: String,
        lwidth: i64,
        points: String,
    },
    Erase { viob_id: ViobId },
    /// A record whose tag this codec does not know. Carries only the tag.
    Unknown { command: String },
}

impl Message {
    /// Decode one record (without its separator).
    ///
    /// Fields beyond those the command needs are ignored. A missing field or
    /// a non-numeric numeric field is an error; nothing here panics.
    pub fn parse(record: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(record).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut parts = text.split(FIELD_SEPARATOR);
        let tag = parts.next().unwrap_or_default();

        let command = match tag {
            tags::JOIN => tags::JOIN,
            tags::COLOR_UPDATE => tags::COLOR_UPDATE,
            tags::POSITION_UPDATE => tags::POSITION_UPDATE,
            tags::CREATE_RECT => tags::CREATE_RECT,
            tags::CREATE_TEXT => tags::CREATE_TEXT,
            tags::CREATE_FREEHAND => tags::CREATE_FREEHAND,
            tags::ERASE => tags::ERASE,
            other => {
                return Ok(Message::Unknown {
                    command: other.to_owned(),
                });
            }
        };
        let mut f = Fields { command, parts };

        let msg = match command {
            tags::JOIN => Message::Join {
                board_id: BoardId(f.text("board_id")?),
            },
            tags::COLOR_UPDATE => Message::ColorUpdate {
                viob_id: f.viob_id()?,
                color: f.text("color")?,
            },
            tags::POSITION_UPDATE => Message::PositionUpdate {
                viob_id: f.viob_id()?,
                ll_x: f.int("ll_x")?,
                ll_y: f.int("ll_y")?,
                ur_x: f.int("ur_x")?,
                ur_y: f.int("ur_y")?,
            },
            tags::CREATE_RECT => Message::CreateRect {
                viob_id: f.viob_id()?,
                ll_x: f.int("ll_x")?,
                ll_y: f.int("ll_y")?,
                ur_x: f.int("ur_x")?,
                ur_y: f.int("ur_y")?,
                color: f.text("color")?,
            },
            tags::CREATE_TEXT => Message::CreateText {
                viob_id: f.viob_id()?,
                ll_x: f.int("ll_x")?,
                ll_y: f.int("ll_y")?,
                text: f.text("text")?,
                color: f.text("color")?,
                font: f.text("font")?,
                size: f.int("size")?,
                weight: f.text("weight")?,
            },
            tags::CREATE_FREEHAND => Message::CreateFreehand {
                viob_id: f.viob_id()?,
                color: f.text("color")?,
                lwidth: f.int("lwidth")?,
                points: f.text("points")?,
            },
            _ => Message::Erase {
                viob_id: f.viob_id()?,
            },
        };
        Ok(msg)
    }

    /// Encode as a record, without the trailing separator.
    pub fn serialize(&self) -> Vec<u8> {
        let fields: Vec<String> = match self {
            Message::Join { board_id } => vec![tags::JOIN.into(), escape(board_id.as_str())],
            Message::ColorUpdate { viob_id, color } => vec![
                tags::COLOR_UPDATE.into(),
                escape(viob_id.as_str()),
                escape(color),
            ],
            Message::PositionUpdate {
                viob_id,
                ll_x,
                ll_y,
                ur_x,
                ur_y,
            } => vec![
                tags::POSITION_UPDATE.into(),
                escape(viob_id.as_str()),
                ll_x.to_string(),
                ll_y.to_string(),
                ur_x.to_string(),
                ur_y.to_string(),
            ],
            Message::CreateRect {
                viob_id,
                ll_x,
                ll_y,
                ur_x,
                ur_y,
                color,
            } => vec![
                tags::CREATE_RECT.into(),
                escape(viob_id.as_str()),
                ll_x.to_string(),
                ll_y.to_string(),
                ur_x.to_string(),
                ur_y.to_string(),
                escape(color),
            ],
            Message::CreateText {
                viob_id,
                ll_x,
                ll_y,
                text,
                color,
                font,
                size,
                weight,
            } => vec![
                tags::CREATE_TEXT.into(),
                escape(viob_id.as_str()),
                ll_x.to_string(),
                ll_y.to_string(),
                escape(text),
                escape(color),
                escape(font),
                size.to_string(),
                escape(weight),
            ],
            Message::CreateFreehand {
                viob_id,
                color,
                lwidth,
                points,
            } => vec![
                tags::CREATE_FREEHAND.into(),
                escape(viob_id.as_str()),
                escape(color),
                lwidth.to_string(),
                escape(points),
            ],
            Message::Erase { viob_id } => vec![tags::ERASE.into(), escape(viob_id.as_str())],
            Message::Unknown { command } => vec![command.clone()],
        };
        fields.join("/").into_bytes()
    }

    /// Encode as a record followed by the separator, ready to write.
    pub fn to_frame(&self) -> Vec<u8> {
        frame(&self.serialize())
    }

    /// The command tag of this message.
    pub fn command(&self) -> &str {
        match self {
            Message::Join { .. } => tags::JOIN,
            Message::ColorUpdate { .. } => tags::COLOR_UPDATE,
            Message::PositionUpdate { .. } => tags::POSITION_UPDATE,
            Message::CreateRect { .. } => tags::CREATE_RECT,
            Message::CreateText { .. } => tags::CREATE_TEXT,
            Message::CreateFreehand { .. } => tags::CREATE_FREEHAND,
            Message::Erase { .. } => tags::ERASE,
            Message::Unknown { command } => command,
        }
    }

    /// The object this message is about, if any.
    pub fn viob_id(&self) -> Option<&ViobId> {
        match self {
            Message::ColorUpdate { viob_id, .. }
            | Message::PositionUpdate { viob_id, .. }
            | Message::CreateRect { viob_id, .. }
            | Message::CreateText { viob_id, .. }
            | Message::CreateFreehand { viob_id, .. }
            | Message::Erase { viob_id } => Some(viob_id),
            Message::Join { .. } | Message::Unknown { .. } => None,
        }
    }
}

/// Sequential field reader for one record.
struct Fields<'a> {
    command: &'static str,
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn raw(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.parts.next().ok_or(ProtocolError::MissingField {
            command: self.command,
            field,
        })
    }

    fn text(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        self.raw(field).map(unescape)
    }

    fn viob_id(&mut self) -> Result<ViobId, ProtocolError> {
        self.text("viob_id").map(ViobId)
    }

    fn int(&mut self, field: &'static str) -> Result<i64, ProtocolError> {
        let value = self.raw(field)?;
        value.parse().map_err(|_| ProtocolError::InvalidNumber {
            command: self.command,
            field,
            value: value.to_owned(),
        })
    }
}
