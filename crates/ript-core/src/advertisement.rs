//! Media capability advertisements.
//!
//! An advertisement is a newline separated list of capabilities:
//!
//! ```text
//! <id> <in|out>: <codec>[; <codec>]*;
//! ```
//!
//! Tokens are separated by single spaces. Blank lines are skipped.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{GrammarError, GrammarResult};

/// Direction of a media stream, seen from the advertising party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Media flowing into the advertiser.
    In,
    /// Media flowing out of the advertiser.
    Out,
}

impl Direction {
    /// Returns the grammar token for this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            _ => Err(()),
        }
    }
}

/// A codec offered for one capability.
///
/// Codec parameters are not negotiated; two codecs match when their names
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecInfo {
    pub codec: String,
}

impl CodecInfo {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }

    /// Returns true if both codecs carry the same name.
    pub fn matches(&self, other: &CodecInfo) -> bool {
        self.codec == other.codec
    }
}

impl fmt::Display for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codec)
    }
}

/// One numbered, directional media capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Stream/source identifier, unique per direction within an advertisement.
    pub id: u32,
    pub direction: Direction,
    /// Codecs in order of preference.
    pub codecs: Vec<CodecInfo>,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:", self.id, self.direction)?;
        for codec in &self.codecs {
            write!(f, " {};", codec)?;
        }
        Ok(())
    }
}

/// A parsed advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementInfo {
    pub caps: Vec<Capability>,
}

impl AdvertisementInfo {
    /// Returns the capabilities declared with the given direction.
    pub fn with_direction(&self, direction: Direction) -> impl Iterator<Item = &Capability> {
        self.caps.iter().filter(move |c| c.direction == direction)
    }

    /// Renders the capabilities back into advertisement text.
    pub fn to_advertisement(&self) -> Advertisement {
        Advertisement(self.to_string())
    }
}

impl fmt::Display for AdvertisementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cap in &self.caps {
            writeln!(f, "{}", cap)?;
        }
        Ok(())
    }
}

/// Raw advertisement text as exchanged on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Advertisement(String);

impl Advertisement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the text into its capabilities.
    ///
    /// Codec tokens only lose their trailing `;`, so a doubled space yields
    /// an empty codec name rather than an error.
    pub fn parse(&self) -> GrammarResult<AdvertisementInfo> {
        let mut info = AdvertisementInfo::default();
        let mut seen = HashSet::new();

        for (line_no, line) in self.0.split('\n').enumerate() {
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(' ').collect();
            trace!(line = line_no, ?parts, "Parsing capability line");

            if parts.len() < 3 {
                return Err(GrammarError::MissingSlots {
                    line: line_no,
                    found: parts.len(),
                });
            }

            let id = parts[0]
                .parse::<u32>()
                .map_err(|source| GrammarError::InvalidCapabilityId {
                    line: line_no,
                    token: parts[0].to_string(),
                    source,
                })?;

            let direction_token = parts[1].trim_end_matches(':');
            let direction = direction_token.parse::<Direction>().map_err(|()| {
                GrammarError::InvalidDirection {
                    line: line_no,
                    token: direction_token.to_string(),
                }
            })?;

            if !seen.insert((id, direction)) {
                return Err(GrammarError::DuplicateCapability {
                    line: line_no,
                    id,
                    direction,
                });
            }

            let codecs = parts[2..]
                .iter()
                .map(|token| CodecInfo::new(token.trim_end_matches(';')))
                .collect();

            info.caps.push(Capability {
                id,
                direction,
                codecs,
            });
        }

        if info.caps.is_empty() {
            return Err(GrammarError::EmptyAdvertisement);
        }

        Ok(info)
    }
}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Advertisement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Advertisement {
    fn from(text: String) -> Self {
        Self(text)
    }
}
