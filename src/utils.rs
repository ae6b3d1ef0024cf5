use serde::Serialize;
use serde_json::Value;

use crate::protocol::Message;

/// Encodes outbound messages as the JSON array Bayeux servers expect in a POST body.
pub(crate) fn encode_messages<T: Serialize>(messages: &[T]) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(messages)?;
    log::trace!("--> {}", &body);
    Ok(body)
}

/// Decodes a response body: an array of messages, a single message, or nothing.
pub(crate) fn decode_messages(data: &[u8]) -> Result<Vec<Message>, serde_json::Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    log::trace!("<-- {}", String::from_utf8_lossy(data));

    match serde_json::from_slice::<Value>(data)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect(),
        value => Ok(vec![serde_json::from_value(value)?]),
    }
}
