//! Capability matching between an offer and an answer.
//!
//! Every offer capability is compared with every answer capability of the
//! same direction. For each offer codec the first answer codec with the same
//! name yields one directive; declaration order is the only tie-break.

use tracing::debug;

use crate::advertisement::{Advertisement, AdvertisementInfo};
use crate::directive::DirectiveInfo;
use crate::error::NegotiationError;

/// Parses both advertisements and matches them.
///
/// Grammar errors on either side are propagated; an empty result is reported
/// as [`NegotiationError::NoCapabilityMatch`].
pub fn match_advertisements(
    offer: &Advertisement,
    answer: &Advertisement,
) -> Result<Vec<DirectiveInfo>, NegotiationError> {
    let offer = offer.parse()?;
    let answer = answer.parse()?;
    match_capabilities(&offer, &answer)
}

/// Matches two already parsed advertisements.
pub fn match_capabilities(
    offer: &AdvertisementInfo,
    answer: &AdvertisementInfo,
) -> Result<Vec<DirectiveInfo>, NegotiationError> {
    let mut directives = Vec::new();

    for offer_cap in &offer.caps {
        for answer_cap in answer.with_direction(offer_cap.direction) {
            for offer_codec in &offer_cap.codecs {
                if answer_cap.codecs.iter().any(|c| offer_codec.matches(c)) {
                    directives.push(DirectiveInfo {
                        source_id: offer_cap.id,
                        sink_id: answer_cap.id,
                        codec: offer_codec.clone(),
                    });
                }
            }
        }
    }

    debug!(matched = directives.len(), "Matched capabilities");

    if directives.is_empty() {
        return Err(NegotiationError::NoCapabilityMatch);
    }
    Ok(directives)
}
