use serde_json::Value;

pub const QUEUE_NAME: &str = "query_queue";
pub const DEFAULT_SEPARATOR: char = '\\';

/// The body carried on the worker queue. Two shapes: an `execute`
/// intent (the common case) and a reserved `workflow` intent that
/// executors not implementing workflows must explicitly FAIL rather
/// than silently ack.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueMessage {
  Execute {
    request_id: i64,
    dataset: String,
    product: String,
    query: Value,
    format: String,
  },
  Workflow { request_id: i64, tasks: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum MessageCodecError {
  #[error("message body is not valid UTF-8")]
  InvalidUtf8,
  #[error("expected 5 '{separator}'-delimited fields, found {found}")]
  WrongFieldCount { separator: char, found: usize },
  #[error("request_id field is not a valid integer: {0}")]
  InvalidRequestId(String),
  #[error("query field is not valid JSON: {0}")]
  InvalidQueryJson(String),
  #[error(
    "encoded query contains the literal separator '{0}' and cannot be represented without escaping"
  )]
  SeparatorCollision(char),
}

/// Encodes an execute intent as
/// `<request_id><sep><dataset><sep><product><sep><query_json><sep><format>`.
/// There is no escaping: if the compact JSON encoding of `query`
/// happens to contain a raw separator byte, encoding fails rather than
/// silently producing an ambiguous message.
pub fn encode(
  message: &QueueMessage,
  separator: char,
) -> Result<String, MessageCodecError> {
  let (request_id, dataset, product, query, format) = match message {
    QueueMessage::Execute {
      request_id,
      dataset,
      product,
      query,
      format,
    } => (*request_id, dataset.as_str(), product.as_str(), query, format.as_str()),
    QueueMessage::Workflow { request_id, tasks } => {
      (*request_id, "", "workflow", tasks, "")
    }
  };

  let query_json = serde_json::to_string(query)
    .map_err(|e| MessageCodecError::InvalidQueryJson(e.to_string()))?;
  if query_json.contains(separator) {
    return Err(MessageCodecError::SeparatorCollision(separator));
  }

  Ok(format!(
    "{request_id}{separator}{dataset}{separator}{product}{separator}{query_json}{separator}{format}"
  ))
}

/// Decodes a message body produced by [`encode`]. A `product` field of
/// literal `"workflow"` is decoded as [`QueueMessage::Workflow`].
pub fn decode(
  body: &[u8],
  separator: char,
) -> Result<QueueMessage, MessageCodecError> {
  let raw =
    std::str::from_utf8(body).map_err(|_| MessageCodecError::InvalidUtf8)?;
  let parts: Vec<&str> = raw.split(separator).collect();
  if parts.len() != 5 {
    return Err(MessageCodecError::WrongFieldCount {
      separator,
      found: parts.len(),
    });
  }
  let [request_id, dataset, product, query_json, format] =
    [parts[0], parts[1], parts[2], parts[3], parts[4]];

  let request_id: i64 = request_id
    .parse()
    .map_err(|_| MessageCodecError::InvalidRequestId(request_id.to_string()))?;

  let query: Value = serde_json::from_str(query_json)
    .map_err(|e| MessageCodecError::InvalidQueryJson(e.to_string()))?;

  if product == "workflow" {
    return Ok(QueueMessage::Workflow { request_id, tasks: query });
  }

  Ok(QueueMessage::Execute {
    request_id,
    dataset: dataset.to_string(),
    product: product.to_string(),
    query,
    format: format.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn execute_message_roundtrips() {
    let msg = QueueMessage::Execute {
      request_id: 42,
      dataset: "era5".to_string(),
      product: "reanalysis".to_string(),
      query: serde_json::json!({"variable": "t2m"}),
      format: "netcdf".to_string(),
    };
    let encoded = encode(&msg, DEFAULT_SEPARATOR).unwrap();
    let decoded = decode(encoded.as_bytes(), DEFAULT_SEPARATOR).unwrap();
    assert_eq!(decoded, msg);
  }

  #[test]
  fn workflow_message_roundtrips() {
    let msg = QueueMessage::Workflow {
      request_id: 7,
      tasks: serde_json::json!([{"id": "a", "op": "subset", "use": [], "args": {}}]),
    };
    let encoded = encode(&msg, DEFAULT_SEPARATOR).unwrap();
    let decoded = decode(encoded.as_bytes(), DEFAULT_SEPARATOR).unwrap();
    assert_eq!(decoded, msg);
  }

  #[test]
  fn wrong_field_count_is_rejected() {
    assert!(matches!(
      decode(b"only\\two", DEFAULT_SEPARATOR),
      Err(MessageCodecError::WrongFieldCount { .. })
    ));
  }
}
