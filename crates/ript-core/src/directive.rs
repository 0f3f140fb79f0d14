//! Negotiated media directives.
//!
//! A directive binds one source capability to one sink capability with a
//! single codec: `<n> to <m>:<codec>;`. The server-facing form writes the
//! source first, the client-facing form writes the sink first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::advertisement::CodecInfo;
use crate::error::{GrammarError, GrammarResult};

/// Raw directive text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directive(String);

impl Directive {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a server-facing directive (`<source> to <sink>:<codec>;`).
    pub fn parse(&self) -> GrammarResult<DirectiveInfo> {
        let (first, second, codec) = self.split()?;
        Ok(DirectiveInfo {
            source_id: first,
            sink_id: second,
            codec,
        })
    }

    /// Parses a client-facing directive (`<sink> to <source>:<codec>;`).
    pub fn parse_client(&self) -> GrammarResult<DirectiveInfo> {
        let (first, second, codec) = self.split()?;
        Ok(DirectiveInfo {
            source_id: second,
            sink_id: first,
            codec,
        })
    }

    fn split(&self) -> GrammarResult<(u32, u32, CodecInfo)> {
        let (endpoints, codec) = self
            .0
            .split_once(':')
            .ok_or_else(|| GrammarError::MissingCodecSeparator(self.0.clone()))?;

        let (first, second) = endpoints
            .split_once("to")
            .ok_or_else(|| GrammarError::MissingTo(self.0.clone()))?;

        let codec = codec.trim().trim_end_matches(';');
        Ok((parse_endpoint(first)?, parse_endpoint(second)?, CodecInfo::new(codec)))
    }
}

fn parse_endpoint(token: &str) -> GrammarResult<u32> {
    let token = token.trim();
    token
        .parse::<u32>()
        .map_err(|source| GrammarError::InvalidEndpoint {
            token: token.to_string(),
            source,
        })
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Directive {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A single negotiated media path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveInfo {
    /// Capability id on the offering side.
    pub source_id: u32,
    /// Capability id on the answering side.
    pub sink_id: u32,
    pub codec: CodecInfo,
}

impl DirectiveInfo {
    pub fn new(source_id: u32, sink_id: u32, codec: impl Into<String>) -> Self {
        Self {
            source_id,
            sink_id,
            codec: CodecInfo::new(codec),
        }
    }

    /// Directive handed to the client: sink id first.
    pub fn client_directive(&self) -> Directive {
        Directive(format!("{} to {}:{};", self.sink_id, self.source_id, self.codec))
    }

    /// Directive kept by the server: source id first.
    pub fn server_directive(&self) -> Directive {
        Directive(format!("{} to {}:{};", self.source_id, self.sink_id, self.codec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_both_forms() {
        let info = DirectiveInfo::new(1, 2, "opus");
        insta::assert_snapshot!(info.server_directive().as_str(), @"1 to 2:opus;");
        insta::assert_snapshot!(info.client_directive().as_str(), @"2 to 1:opus;");
    }

    #[test]
    fn parse_server_directive() {
        let info = Directive::new("1 to 2:opus;").parse().unwrap();
        assert_eq!(info, DirectiveInfo::new(1, 2, "opus"));
    }

    #[test]
    fn parse_client_directive_swaps_endpoints() {
        let info = Directive::new("2 to 1:opus;").parse_client().unwrap();
        assert_eq!(info, DirectiveInfo::new(1, 2, "opus"));
    }

    #[test]
    fn generated_directives_parse_back() {
        let info = DirectiveInfo::new(12, 4, "PCMU");
        assert_eq!(info.server_directive().parse().unwrap(), info);
        assert_eq!(info.client_directive().parse_client().unwrap(), info);
    }

    #[test]
    fn parse_tolerates_spacing_around_codec() {
        let info = Directive::new("3 to 4: g722;").parse().unwrap();
        assert_eq!(info, DirectiveInfo::new(3, 4, "g722"));
    }

    #[test]
    fn parse_missing_colon_fails() {
        let err = Directive::new("1 to 2 opus").parse().unwrap_err();
        assert!(matches!(err, GrammarError::MissingCodecSeparator(_)));
    }

    #[test]
    fn parse_missing_to_fails() {
        let err = Directive::new("1 2:opus;").parse().unwrap_err();
        assert!(matches!(err, GrammarError::MissingTo(_)));
    }

    #[test]
    fn parse_non_numeric_endpoint_fails() {
        let err = Directive::new("a to 2:opus;").parse().unwrap_err();
        assert!(matches!(
            err,
            GrammarError::InvalidEndpoint { ref token, .. } if token == "a"
        ));

        let err = Directive::new("1 to b:opus;").parse().unwrap_err();
        assert!(matches!(err, GrammarError::InvalidEndpoint { .. }));
    }
}
