//! Wire frame layout.
//!
//! ```text
//! request  := correlation[16] deadline-ms:u64 flags:u8
//!             trace(u16+bytes) type:varstr id:varstr method:varstr
//!             chain-count:u16 { type:varstr id:varstr }* args(u32+bytes)
//! response := correlation[16] status:u8
//!             status=0 -> payload(u32+bytes)
//!             else     -> message:varstr retry-after-ms:u64
//! varstr   := len:u16 utf8-bytes
//! ```
//!
//! Any reliable, ordered, bidirectional byte channel can carry these frames;
//! the loopback transport round-trips every request through them so the
//! layout is exercised even in-process.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use crate::error::{ErrorKind, InvokeError};
use crate::util::{ActorKey, CorrelationId};

/// The request expects no payload in the response.
pub const FLAG_ONE_WAY: u8 = 0b0000_0001;
/// The request is a stream-event delivery; `method` holds the subject
/// namespace and the actor id holds the subject key.
pub const FLAG_STREAM_EVENT: u8 = 0b0000_0010;

/// One invocation request on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Matches the response to this request.
    pub correlation_id: CorrelationId,
    /// Absolute deadline in epoch milliseconds; 0 means none.
    pub deadline_ms: u64,
    /// Flag bits (`FLAG_*`).
    pub flags: u8,
    /// Opaque trace-context bytes.
    pub trace: Bytes,
    /// Target actor type name.
    pub actor_type: String,
    /// Target actor id.
    pub actor_id: String,
    /// Method name (or subject namespace for stream events).
    pub method: String,
    /// Call chain propagated for the reentrancy guard.
    pub chain: Vec<ActorKey>,
    /// Opaque argument payload.
    pub args: Bytes,
}

impl WireRequest {
    /// Create a request with a fresh correlation id and no deadline.
    pub fn call(
        actor_type: impl Into<String>,
        actor_id: impl Into<String>,
        method: impl Into<String>,
        args: Bytes,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            deadline_ms: 0,
            flags: 0,
            trace: Bytes::new(),
            actor_type: actor_type.into(),
            actor_id: actor_id.into(),
            method: method.into(),
            chain: Vec::new(),
            args,
        }
    }

    /// The deadline as a timestamp, if one is set.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if self.deadline_ms == 0 {
            None
        } else {
            DateTime::<Utc>::from_timestamp_millis(self.deadline_ms as i64)
        }
    }

    /// Set the deadline from a timestamp.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline_ms = deadline.timestamp_millis().max(0) as u64;
        self
    }

    /// Encode into a frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.trace.len() + self.args.len());
        buf.put_slice(self.correlation_id.as_bytes());
        buf.put_u64(self.deadline_ms);
        buf.put_u8(self.flags);
        put_blob16(&mut buf, &self.trace);
        put_varstr(&mut buf, &self.actor_type);
        put_varstr(&mut buf, &self.actor_id);
        put_varstr(&mut buf, &self.method);
        buf.put_u16(self.chain.len() as u16);
        for key in &self.chain {
            put_varstr(&mut buf, key.type_name());
            put_varstr(&mut buf, key.id());
        }
        buf.put_u32(self.args.len() as u32);
        buf.put_slice(&self.args);
        buf.freeze()
    }

    /// Decode from a frame.
    pub fn decode(mut frame: Bytes) -> Result<Self, InvokeError> {
        let correlation_id = get_correlation(&mut frame)?;
        let deadline_ms = get_u64(&mut frame)?;
        let flags = get_u8(&mut frame)?;
        let trace = get_blob16(&mut frame)?;
        let actor_type = get_varstr(&mut frame)?;
        let actor_id = get_varstr(&mut frame)?;
        let method = get_varstr(&mut frame)?;

        let chain_len = get_u16(&mut frame)? as usize;
        let mut chain = Vec::with_capacity(chain_len.min(64));
        for _ in 0..chain_len {
            let type_name = get_varstr(&mut frame)?;
            let id = get_varstr(&mut frame)?;
            chain.push(ActorKey::new(type_name, id));
        }

        let args_len = get_u32(&mut frame)? as usize;
        if frame.remaining() < args_len {
            return Err(truncated("args"));
        }
        let args = frame.copy_to_bytes(args_len);

        Ok(Self {
            correlation_id,
            deadline_ms,
            flags,
            trace,
            actor_type,
            actor_id,
            method,
            chain,
            args,
        })
    }
}

/// One response on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// Correlation id copied from the request.
    pub correlation_id: CorrelationId,
    /// 0 for success, otherwise an [`ErrorKind`] code.
    pub status: u8,
    /// Result payload (success only).
    pub payload: Bytes,
    /// Error message (failure only).
    pub message: String,
    /// Retry-after hint in milliseconds; 0 means none.
    pub retry_after_ms: u64,
}

impl WireResponse {
    /// Build a success response.
    pub fn ok(correlation_id: CorrelationId, payload: Bytes) -> Self {
        Self {
            correlation_id,
            status: 0,
            payload,
            message: String::new(),
            retry_after_ms: 0,
        }
    }

    /// Build a failure response from a tagged error.
    pub fn error(correlation_id: CorrelationId, error: &InvokeError) -> Self {
        Self {
            correlation_id,
            status: error.kind().code(),
            payload: Bytes::new(),
            message: error.message().to_string(),
            retry_after_ms: error
                .retry_after()
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }

    /// Convert back into the caller-facing result.
    pub fn into_result(self) -> Result<Bytes, InvokeError> {
        if self.status == 0 {
            return Ok(self.payload);
        }
        let kind = ErrorKind::from_code(self.status).unwrap_or(ErrorKind::RemoteException);
        let mut error = InvokeError::new(kind, self.message);
        if self.retry_after_ms > 0 {
            error = error.with_retry_after(std::time::Duration::from_millis(self.retry_after_ms));
        }
        Err(error)
    }

    /// Encode into a frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32 + self.payload.len() + self.message.len());
        buf.put_slice(self.correlation_id.as_bytes());
        buf.put_u8(self.status);
        if self.status == 0 {
            buf.put_u32(self.payload.len() as u32);
            buf.put_slice(&self.payload);
        } else {
            put_varstr(&mut buf, &self.message);
            buf.put_u64(self.retry_after_ms);
        }
        buf.freeze()
    }

    /// Decode from a frame.
    pub fn decode(mut frame: Bytes) -> Result<Self, InvokeError> {
        let correlation_id = get_correlation(&mut frame)?;
        let status = get_u8(&mut frame)?;
        if status == 0 {
            let len = get_u32(&mut frame)? as usize;
            if frame.remaining() < len {
                return Err(truncated("payload"));
            }
            let payload = frame.copy_to_bytes(len);
            Ok(Self::ok(correlation_id, payload))
        } else {
            let message = get_varstr(&mut frame)?;
            let retry_after_ms = get_u64(&mut frame)?;
            Ok(Self {
                correlation_id,
                status,
                payload: Bytes::new(),
                message,
                retry_after_ms,
            })
        }
    }
}

fn truncated(what: &str) -> InvokeError {
    InvokeError::marshalling(format!("truncated frame while reading {what}"))
}

fn put_varstr(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

fn put_blob16(buf: &mut BytesMut, value: &Bytes) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
}

fn get_correlation(frame: &mut Bytes) -> Result<CorrelationId, InvokeError> {
    if frame.remaining() < 16 {
        return Err(truncated("correlation id"));
    }
    let mut raw = [0u8; 16];
    frame.copy_to_slice(&mut raw);
    Ok(CorrelationId::from_bytes(raw))
}

fn get_u8(frame: &mut Bytes) -> Result<u8, InvokeError> {
    if frame.remaining() < 1 {
        return Err(truncated("u8"));
    }
    Ok(frame.get_u8())
}

fn get_u16(frame: &mut Bytes) -> Result<u16, InvokeError> {
    if frame.remaining() < 2 {
        return Err(truncated("u16"));
    }
    Ok(frame.get_u16())
}

fn get_u32(frame: &mut Bytes) -> Result<u32, InvokeError> {
    if frame.remaining() < 4 {
        return Err(truncated("u32"));
    }
    Ok(frame.get_u32())
}

fn get_u64(frame: &mut Bytes) -> Result<u64, InvokeError> {
    if frame.remaining() < 8 {
        return Err(truncated("u64"));
    }
    Ok(frame.get_u64())
}

fn get_varstr(frame: &mut Bytes) -> Result<String, InvokeError> {
    let len = get_u16(frame)? as usize;
    if frame.remaining() < len {
        return Err(truncated("string"));
    }
    let raw = frame.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| InvokeError::marshalling("frame string is not valid utf-8"))
}

fn get_blob16(frame: &mut Bytes) -> Result<Bytes, InvokeError> {
    let len = get_u16(frame)? as usize;
    if frame.remaining() < len {
        return Err(truncated("blob"));
    }
    Ok(frame.copy_to_bytes(len))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = WireRequest {
            correlation_id: CorrelationId::new(),
            deadline_ms: 1_700_000_000_123,
            flags: FLAG_STREAM_EVENT,
            trace: Bytes::from_static(b"trace-ctx"),
            actor_type: "Counter".to_string(),
            actor_id: "k-1".to_string(),
            method: "Increment".to_string(),
            chain: vec![ActorKey::new("A", "1"), ActorKey::new("B", "2")],
            args: Bytes::from_static(b"{\"delta\":1}"),
        };

        let decoded = WireRequest::decode(request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_empty_fields() {
        let request = WireRequest::call("T", "id", "M", Bytes::new());
        let decoded = WireRequest::decode(request.encode()).unwrap();
        assert_eq!(decoded, request);
        assert!(decoded.deadline().is_none());
    }

    #[test]
    fn test_response_ok_roundtrip() {
        let response = WireResponse::ok(CorrelationId::new(), Bytes::from_static(b"4"));
        let decoded = WireResponse::decode(response.encode()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(&decoded.into_result().unwrap()[..], b"4");
    }

    #[test]
    fn test_response_error_roundtrip() {
        let error = InvokeError::new(ErrorKind::NotOwner, "owned by s2")
            .with_retry_after(std::time::Duration::from_millis(50));
        let response = WireResponse::error(CorrelationId::new(), &error);

        let decoded = WireResponse::decode(response.encode()).unwrap();
        let err = decoded.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotOwner);
        assert_eq!(err.message(), "owned by s2");
        assert_eq!(
            err.retry_after(),
            Some(std::time::Duration::from_millis(50))
        );
    }

    #[test]
    fn test_decode_truncated_frame() {
        let request = WireRequest::call("T", "id", "M", Bytes::from_static(b"xyz"));
        let frame = request.encode();
        let cut = frame.slice(0..frame.len() - 2);

        let err = WireRequest::decode(cut).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Marshalling);
    }

    #[test]
    fn test_unknown_status_maps_to_remote_exception() {
        let response = WireResponse {
            correlation_id: CorrelationId::new(),
            status: 250,
            payload: Bytes::new(),
            message: "???".to_string(),
            retry_after_ms: 0,
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteException);
    }

    #[test]
    fn test_deadline_accessors() {
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        let request = WireRequest::call("T", "id", "M", Bytes::new()).with_deadline(deadline);
        let parsed = request.deadline().unwrap();
        assert_eq!(parsed.timestamp_millis(), deadline.timestamp_millis());
    }
}
