//! Attachment model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of media a note attachment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
}

impl AttachmentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(Error::InvalidInput(format!(
                "unknown attachment kind '{other}'"
            ))),
        }
    }
}

/// Reference to media stored elsewhere; the note only carries its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Media kind
    pub kind: AttachmentKind,
    /// Location of the media (remote URL or local file URI)
    pub url: String,
}

impl Attachment {
    /// Build an attachment reference, rejecting blank locations.
    pub fn new(kind: AttachmentKind, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("attachment url cannot be empty".into()));
        }
        Ok(Self {
            kind,
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_kind_parses_case_insensitively() {
        assert_eq!("Image".parse::<AttachmentKind>().unwrap(), AttachmentKind::Image);
        assert_eq!(" audio ".parse::<AttachmentKind>().unwrap(), AttachmentKind::Audio);
        assert!("video".parse::<AttachmentKind>().is_err());
    }

    #[test]
    fn attachment_rejects_blank_url() {
        assert!(Attachment::new(AttachmentKind::Image, "  ").is_err());
        let attachment = Attachment::new(AttachmentKind::Audio, " file:///tmp/a.m4a ").unwrap();
        assert_eq!(attachment.url, "file:///tmp/a.m4a");
    }

    #[test]
    fn attachment_serializes_kind_lowercase() {
        let attachment = Attachment::new(AttachmentKind::Image, "https://cdn/x.png").unwrap();
        let json = serde_json::to_string(&attachment).unwrap();
        assert!(json.contains("\"kind\":\"image\""));
    }
}
