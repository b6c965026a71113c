// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use anyhow::{Context, Result, bail};
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on the header block of a single message.
pub const LSP_MAX_HEADER_BYTES: usize = 16 * 1024;

/// JSON-RPC error code for methods the client does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code servers use for requests abandoned after
/// `$/cancelRequest`.
pub const REQUEST_CANCELLED: i64 = -32800;

fn default_null() -> Value {
    Value::Null
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: Value,
}

impl RequestMessage {
    pub fn new(id: RequestId, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ResponseMessage {
    /// An error response for a request the client cannot serve.
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("Method '{method}' not supported by client"),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: Value,
}

impl NotificationMessage {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A decoded message from the server, classified by shape.
#[derive(Debug)]
pub enum IncomingMessage {
    /// The server is asking the client for something.
    Request(RequestMessage),
    /// Answer to one of our requests.
    Response(ResponseMessage),
    Notification(NotificationMessage),
}

impl IncomingMessage {
    /// Classifies a raw JSON-RPC body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not JSON or matches no message shape.
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).context("Message body is not JSON")?;
        let has_method = value.get("method").is_some_and(Value::is_string);
        let has_id = value.get("id").is_some();
        match (has_method, has_id) {
            (true, true) => Ok(Self::Request(
                serde_json::from_value(value).context("Malformed request")?,
            )),
            (true, false) => Ok(Self::Notification(
                serde_json::from_value(value).context("Malformed notification")?,
            )),
            (false, true) => Ok(Self::Response(
                serde_json::from_value(value).context("Malformed response")?,
            )),
            (false, false) => bail!("Unknown message format: {body}"),
        }
    }
}

/// Frames a message with its `Content-Length` header.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_string(message)?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(body.as_bytes());
    Ok(framed)
}

/// Helper to parse the Content-Length header and body from a buffer
///
/// # Errors
///
/// Returns an error if the header block is oversized, not UTF-8, or
/// carries no usable `Content-Length`.
pub fn try_parse_message(buffer: &mut BytesMut) -> Result<Option<String>> {
    let Some(separator) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
        if buffer.len() > LSP_MAX_HEADER_BYTES {
            bail!("Header block exceeds {LSP_MAX_HEADER_BYTES} bytes");
        }
        return Ok(None);
    };
    if separator > LSP_MAX_HEADER_BYTES {
        bail!("Header block exceeds {LSP_MAX_HEADER_BYTES} bytes");
    }

    let headers =
        std::str::from_utf8(&buffer[..separator]).context("Failed to parse headers as UTF-8")?;
    let mut content_length = None;
    for line in headers.lines() {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .context("Invalid Content-Length")?,
            );
        }
    }
    let content_length = content_length.context("Missing Content-Length header")?;

    let header_len = separator + 4;
    if buffer.len() < header_len + content_length {
        return Ok(None);
    }
    buffer.advance(header_len);
    let body = buffer.split_to(content_length);
    Ok(Some(String::from_utf8(body.to_vec())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    #[test]
    fn parses_complete_message() -> Result<()> {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let raw = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut buffer = BytesMut::from(raw.as_str());

        assert_eq!(try_parse_message(&mut buffer)?, Some(body.to_string()));
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn waits_for_incomplete_input() -> Result<()> {
        let mut header_only = BytesMut::from("Content-Length: 10\r\n");
        assert_eq!(try_parse_message(&mut header_only)?, None);

        let mut partial_body = BytesMut::from("Content-Length: 100\r\n\r\n{\"partial\":");
        assert_eq!(try_parse_message(&mut partial_body)?, None);
        Ok(())
    }

    #[test]
    fn parses_back_to_back_messages() -> Result<()> {
        let first = r#"{"jsonrpc":"2.0","id":1}"#;
        let second = r#"{"jsonrpc":"2.0","id":2}"#;
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&encode_message(&serde_json::from_str::<Value>(first)?)?);
        buffer.extend_from_slice(&encode_message(&serde_json::from_str::<Value>(second)?)?);

        assert_eq!(try_parse_message(&mut buffer)?, Some(first.to_string()));
        assert_eq!(try_parse_message(&mut buffer)?, Some(second.to_string()));
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn header_name_is_case_insensitive() -> Result<()> {
        let body = r#"{"test":true}"#;
        let raw = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc\r\n\r\n{}",
            body.len(),
            body
        );
        let mut buffer = BytesMut::from(raw.as_str());
        assert_eq!(try_parse_message(&mut buffer)?, Some(body.to_string()));
        Ok(())
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut buffer = BytesMut::from("X".repeat(LSP_MAX_HEADER_BYTES + 1).as_str());
        assert!(try_parse_message(&mut buffer).is_err());
    }

    #[test]
    fn missing_length_is_rejected() {
        let mut buffer = BytesMut::from("Content-Type: json\r\n\r\n{}");
        assert!(try_parse_message(&mut buffer).is_err());
    }

    #[test]
    fn classifies_incoming_messages() -> Result<()> {
        let request = IncomingMessage::parse(
            r#"{"jsonrpc":"2.0","id":"abc","method":"workspace/configuration"}"#,
        )?;
        let IncomingMessage::Request(request) = request else {
            anyhow::bail!("expected a request");
        };
        assert_eq!(request.id, RequestId::String("abc".to_string()));

        let response = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)?;
        let IncomingMessage::Response(response) = response else {
            anyhow::bail!("expected a response");
        };
        assert!(response.result.is_none());

        let notification = IncomingMessage::parse(
            r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"message":"hi"}}"#,
        )?;
        assert!(matches!(notification, IncomingMessage::Notification(_)));
        assert!(IncomingMessage::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
        Ok(())
    }

    #[test]
    fn method_not_found_response_shape() -> Result<()> {
        let response = ResponseMessage::method_not_found(RequestId::Number(7), "client/register");
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["error"]["code"], json!(METHOD_NOT_FOUND));
        assert!(value.get("result").is_none());
        let message = value["error"]["message"].as_str().context("no message")?;
        assert!(message.contains("client/register"));
        Ok(())
    }
}
