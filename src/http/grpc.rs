//! gRPC unary calls
//!
//! Calls go through `tonic`, so `grpc-status` is read from the trailers of
//! the response. Request messages are written as JSON and encoded to
//! protobuf without a schema: object keys are field numbers, optionally
//! named (`"service:1"`), and a message with a single field may use its
//! bare name (`{"name": "World"}` is field 1).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::encoding::{encode_key, encode_varint, WireType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Status};
use tracing::debug;

use super::HttpError;

/// `grpc-status` of a successful call
pub const OK_STATUS: &str = "0";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcRequest {
    /// Method path, e.g. `/helloworld.Greeter/SayHello`
    pub path: String,

    /// Request message as JSON; empty for an empty message
    #[serde(default)]
    pub message: String,
}

impl GrpcRequest {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Protobuf encoding of the message
    pub fn encode(&self) -> Result<Bytes, HttpError> {
        let message = self.message.trim();
        if message.is_empty() {
            return Ok(Bytes::new());
        }

        let value: Value = serde_json::from_str(message)
            .map_err(|e| HttpError::InvalidRequest(format!("gRPC message is not JSON: {e}")))?;
        let Value::Object(fields) = value else {
            return Err(HttpError::InvalidRequest(
                "gRPC message must be a JSON object".to_string(),
            ));
        };

        let mut buf = BytesMut::new();
        encode_message(&fields, &mut buf)?;
        Ok(buf.freeze())
    }
}

#[derive(Clone, Debug)]
pub struct GrpcResponse {
    /// `grpc-status` as a decimal string
    pub status: String,
    pub message: Option<String>,

    /// Response message, empty unless the call succeeded
    pub body: Bytes,
    pub duration_ms: u64,
}

impl GrpcResponse {
    pub(crate) fn from_result(result: Result<tonic::Response<Bytes>, Status>, duration_ms: u64) -> Self {
        match result {
            Ok(response) => Self {
                status: OK_STATUS.to_string(),
                message: None,
                body: response.into_inner(),
                duration_ms,
            },
            Err(status) => Self {
                status: (status.code() as i32).to_string(),
                message: Some(status.message().to_string()).filter(|m| !m.is_empty()),
                body: Bytes::new(),
                duration_ms,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OK_STATUS
    }
}

/// Open a channel to `url`; `https` URLs use TLS with the webpki roots
pub(crate) async fn connect(url: &str, timeout: Duration) -> Result<Channel, HttpError> {
    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?
        .connect_timeout(timeout)
        .timeout(timeout);

    if url.starts_with("https://") {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_webpki_roots())
            .map_err(|e| HttpError::Client(format!("TLS setup for {url}: {e}")))?;
    }

    endpoint
        .connect()
        .await
        .map_err(|e| HttpError::ConnectionRefused(format!("{url}: {e}")))
}

/// One unary call on an open channel
pub(crate) async fn unary(channel: Channel, request: &GrpcRequest) -> Result<GrpcResponse, HttpError> {
    let path: PathAndQuery = request
        .path
        .parse()
        .map_err(|e| HttpError::InvalidRequest(format!("Invalid gRPC method path '{}': {e}", request.path)))?;
    let message = request.encode()?;

    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| HttpError::RequestFailed(format!("gRPC channel not ready: {e}")))?;

    let start = std::time::Instant::now();
    let result = grpc.unary(tonic::Request::new(message), path, BytesCodec).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Err(status) = &result {
        // The load balancer or the connection gave up, not the service
        if status.code() == Code::Unavailable {
            return Err(HttpError::RequestFailed(format!(
                "{} unavailable: {}",
                request.path,
                status.message()
            )));
        }
    }

    let response = GrpcResponse::from_result(result, duration_ms);
    debug!("gRPC {} answered {} in {}ms", request.path, response.status, duration_ms);
    Ok(response)
}

fn encode_message(fields: &Map<String, Value>, buf: &mut BytesMut) -> Result<(), HttpError> {
    let sole_field = fields.len() == 1;
    for (key, value) in fields {
        let tag = field_tag(key, sole_field)?;
        encode_field(tag, value, buf)?;
    }
    Ok(())
}

fn field_tag(key: &str, sole_field: bool) -> Result<u32, HttpError> {
    let number = key.rsplit_once(':').map_or(key, |(_, number)| number);
    match number.trim().parse::<u32>() {
        Ok(tag) if tag > 0 => Ok(tag),
        _ if sole_field && !key.contains(':') => Ok(1),
        _ => Err(HttpError::InvalidRequest(format!(
            "gRPC field '{key}' needs a field number, e.g. '{key}:1'"
        ))),
    }
}

fn encode_field(tag: u32, value: &Value, buf: &mut BytesMut) -> Result<(), HttpError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            encode_key(tag, WireType::Varint, buf);
            encode_varint(u64::from(*b), buf);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                encode_key(tag, WireType::Varint, buf);
                encode_varint(i as u64, buf);
            } else if let Some(u) = n.as_u64() {
                encode_key(tag, WireType::Varint, buf);
                encode_varint(u, buf);
            } else if let Some(f) = n.as_f64() {
                encode_key(tag, WireType::SixtyFourBit, buf);
                buf.put_f64_le(f);
            }
        }
        Value::String(s) => encode_bytes(tag, s.as_bytes(), buf),
        Value::Array(items) => {
            for item in items {
                encode_field(tag, item, buf)?;
            }
        }
        Value::Object(fields) => {
            let mut nested = BytesMut::new();
            encode_message(fields, &mut nested)?;
            encode_bytes(tag, &nested, buf);
        }
    }
    Ok(())
}

fn encode_bytes(tag: u32, bytes: &[u8], buf: &mut BytesMut) {
    encode_key(tag, WireType::LengthDelimited, buf);
    encode_varint(bytes.len() as u64, buf);
    buf.put_slice(bytes);
}

/// Passes message bytes through untouched
#[derive(Clone, Copy, Debug, Default)]
struct BytesCodec;

impl Codec for BytesCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = BytesCodec;
    type Decoder = BytesCodec;

    fn encoder(&mut self) -> Self::Encoder {
        BytesCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        BytesCodec
    }
}

impl Encoder for BytesCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for BytesCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_single_named_field() {
        // HelloRequest { name = 1 }
        let request = GrpcRequest::new("/helloworld.Greeter/SayHello", r#"{"name": "World"}"#);
        assert_eq!(&request.encode().unwrap()[..], b"\x0a\x05World");
    }

    #[test]
    fn test_encode_numbered_fields() {
        let request = GrpcRequest::new("/pkg.Svc/Call", r#"{"id:2": 150, "inner:3": {"flag:1": true}, "name:1": "a"}"#);
        let encoded = request.encode().unwrap();
        assert_eq!(&encoded[..], b"\x10\x96\x01\x1a\x02\x08\x01\x0a\x01a");
    }

    #[test]
    fn test_encode_rejects_ambiguous_fields() {
        let request = GrpcRequest::new("/pkg.Svc/Call", r#"{"a": 1, "b": 2}"#);
        assert!(matches!(request.encode(), Err(HttpError::InvalidRequest(_))));

        let not_object = GrpcRequest::new("/pkg.Svc/Call", "[1, 2]");
        assert!(not_object.encode().is_err());

        assert!(GrpcRequest::new("/grpc.health.v1.Health/Check", "").encode().unwrap().is_empty());
    }

    #[test]
    fn test_status_from_result() {
        let ok = GrpcResponse::from_result(Ok(tonic::Response::new(Bytes::from_static(b"\x08\x01"))), 3);
        assert!(ok.is_ok());
        assert_eq!(&ok.body[..], b"\x08\x01");

        let failed = GrpcResponse::from_result(Err(Status::internal("boom")), 3);
        assert_eq!(failed.status, "13");
        assert_eq!(failed.message.as_deref(), Some("boom"));
        assert!(!failed.is_ok());
    }
}
