//! Line classification for the runner's stdout.
//!
//! Lines that do not start with `{` are never parsed: they are free-form
//! process output. Lines that do start with `{` but fail to parse are
//! protocol noise and are dropped without aborting the stream.

use tracing::trace;

use crate::envelope::{Envelope, RawEnvelope};

/// Classification of one stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// Empty after trimming.
    Blank,
    /// Free-form process output, trimmed.
    Text(String),
    /// A protocol envelope of a kind the correlator consumes.
    Envelope(Box<Envelope>),
    /// Parsed as an envelope, but of a kind nobody consumes.
    Ignored,
    /// Started with `{` but was not a decodable envelope.
    Noise,
}

impl DecodedLine {
    #[must_use]
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Self::Envelope(envelope) => Some(*envelope),
            _ => None,
        }
    }
}

#[must_use]
pub fn decode_line(line: &str) -> DecodedLine {
    let data = line.trim();
    if data.is_empty() {
        return DecodedLine::Blank;
    }
    if !data.starts_with('{') {
        return DecodedLine::Text(data.to_owned());
    }

    match serde_json::from_str::<RawEnvelope>(data) {
        Ok(raw) => raw
            .into_envelope()
            .map_or(DecodedLine::Ignored, |envelope| {
                DecodedLine::Envelope(Box::new(envelope))
            }),
        Err(err) => {
            trace!(error = %err, "dropping undecodable protocol line");
            DecodedLine::Noise
        }
    }
}
