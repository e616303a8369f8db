//! CBOR-framed transport implementation.
//!
//! Each call is encoded as a [`RequestFrame`] and answered with a
//! [`ResponseFrame`]. The byte channel is abstracted via a trait so the
//! same transport runs over a socket, a pipe or an in-process server.

use crate::error::{EngineError, EngineResult};
use crate::transport::RpcTransport;
use mapisync_codec::{Decode, Encode};
use mapisync_protocol::{RequestFrame, ResponseFrame, RpcRequest, RpcResponse};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Byte channel abstraction.
///
/// Implement this trait to provide the actual network transport.
pub trait RpcChannel: Send + Sync {
    /// Sends one request frame and returns the response frame.
    fn exchange(&self, frame: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the channel is healthy.
    fn is_healthy(&self) -> bool;
}

/// Transport that frames calls with CBOR over an [`RpcChannel`].
pub struct FramedTransport<C: RpcChannel> {
    channel: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: RpcChannel> FramedTransport<C> {
    /// Creates a new framed transport.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns the last channel error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

impl<C: RpcChannel> RpcTransport for FramedTransport<C> {
    fn call(&self, session: u64, request: &RpcRequest) -> EngineResult<RpcResponse> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }

        let frame = RequestFrame {
            session,
            request: request.clone(),
        }
        .encode()?;
        trace!(call = request.name(), bytes = frame.len(), "sending frame");

        let reply = self.channel.exchange(frame).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            EngineError::transport(e)
        })?;
        *self.last_error.write() = None;

        ResponseFrame::decode(&reply)?
            .into_result()
            .map_err(|code| EngineError::server(request.name(), code))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.channel.is_healthy()
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for servers that can answer frames in-process.
pub trait LoopbackServer {
    /// Handles one request frame and returns the response frame.
    fn handle_frame(&self, frame: &[u8]) -> Result<Vec<u8>, String>;
}

/// A channel that routes frames directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackChannel<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackChannel<S> {
    /// Creates a channel connected to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> RpcChannel for LoopbackChannel<S> {
    fn exchange(&self, frame: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_frame(&frame)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_codec::ErrorCode;
    use mapisync_protocol::{RowCountResponse, TableId};

    struct TestChannel {
        response: RwLock<Option<Vec<u8>>>,
        healthy: AtomicBool,
    }

    impl TestChannel {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                healthy: AtomicBool::new(true),
            }
        }

        fn set_response(&self, frame: &ResponseFrame) {
            *self.response.write() = Some(frame.encode().unwrap());
        }
    }

    impl RpcChannel for TestChannel {
        fn exchange(&self, frame: Vec<u8>) -> Result<Vec<u8>, String> {
            RequestFrame::decode(&frame).map_err(|e| e.to_string())?;
            self.response
                .read()
                .clone()
                .ok_or_else(|| "connection reset".to_string())
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn transport_disconnect() {
        let transport = FramedTransport::new(TestChannel::new());
        assert!(transport.is_connected());
        transport.close().unwrap();
        assert!(!transport.is_connected());
        let result = transport.call(1, &RpcRequest::TableClose(TableId(1)));
        assert_eq!(result.unwrap_err(), EngineError::NotConnected);
    }

    #[test]
    fn transport_unhealthy_channel() {
        let channel = TestChannel::new();
        channel.healthy.store(false, Ordering::SeqCst);
        assert!(!FramedTransport::new(channel).is_connected());
    }

    #[test]
    fn decodes_answer() {
        let channel = TestChannel::new();
        let answer = RpcResponse::RowCount(RowCountResponse {
            count: 12,
            position: 3,
        });
        channel.set_response(&ResponseFrame::ok(answer.clone()));
        let transport = FramedTransport::new(channel);

        let result = transport.call(9, &RpcRequest::TableGetRowCount(TableId(4)));
        assert_eq!(result.unwrap(), answer);
    }

    #[test]
    fn server_failure_keeps_call_name() {
        let channel = TestChannel::new();
        channel.set_response(&ResponseFrame::error(ErrorCode::END_OF_SESSION));
        let transport = FramedTransport::new(channel);

        let err = transport
            .call(9, &RpcRequest::TableGetRowCount(TableId(4)))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::server("table_get_row_count", ErrorCode::END_OF_SESSION)
        );
        assert!(err.is_session_lost());
    }

    #[test]
    fn channel_failure_is_recorded() {
        let transport = FramedTransport::new(TestChannel::new());
        let err = transport
            .call(9, &RpcRequest::TableClose(TableId(4)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport { .. }));
        assert_eq!(transport.last_error().as_deref(), Some("connection reset"));
        assert!(transport.is_connected());
    }
}
