//! JSONL event input (one event object per line)

use crate::error::CoreError;
use crate::types::Event;

/// Parse and validate one JSONL line
pub fn parse_jsonl_event(line: &str) -> Result<Event, CoreError> {
    let event: Event = serde_json::from_str(line.trim())
        .map_err(|e| CoreError::InvalidEvent(format!("malformed event line: {}", e)))?;
    event.validate()?;
    Ok(event)
}
