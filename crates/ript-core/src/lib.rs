//! Capability grammar and negotiation for the RIPT relay.
//!
//! - [`Advertisement`]: a party's numbered, directional media capabilities
//! - [`Directive`]: one negotiated source-to-sink codec binding
//! - [`match_advertisements`]: turns an offer and an answer into directives
//!
//! ```rust
//! use ript_core::{Advertisement, match_advertisements};
//!
//! let offer = Advertisement::new("1 out: opus;\n2 out: opus;\n");
//! let answer = Advertisement::new("1 in: opus;\n2 out: opus;\n");
//! let directives = match_advertisements(&offer, &answer).unwrap();
//! assert_eq!(directives[0].server_directive().as_str(), "1 to 2:opus;");
//! ```

pub mod advertisement;
pub mod directive;
pub mod error;
pub mod matcher;
pub mod tracing;

pub use advertisement::{Advertisement, AdvertisementInfo, Capability, CodecInfo, Direction};
pub use directive::{Directive, DirectiveInfo};
pub use error::{GrammarError, GrammarResult, NegotiationError};
pub use matcher::{match_advertisements, match_capabilities};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
