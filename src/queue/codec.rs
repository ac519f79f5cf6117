//! Binary payload format for queued events.

use crate::domain::EnrichedLogEntry;

pub(crate) fn encode(entry: &EnrichedLogEntry) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(entry, bincode::config::standard())
}

pub(crate) fn decode(payload: &[u8]) -> Result<EnrichedLogEntry, bincode::error::DecodeError> {
    let (entry, _read) = bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    Ok(entry)
}
