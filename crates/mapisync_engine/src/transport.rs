//! Transport layer abstraction for RPC calls.

use crate::error::{EngineError, EngineResult};
use mapisync_codec::ErrorCode;
use mapisync_protocol::{LogonResponse, RpcRequest, RpcResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An RPC transport carries one call to the server and returns its answer.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (framed channel, in-process server, mock for testing).
/// A failure reported by the server surfaces as [`EngineError::Server`]; a
/// failure of the channel itself as [`EngineError::Transport`].
pub trait RpcTransport: Send + Sync {
    /// Performs one call within `session` (zero before logon).
    fn call(&self, session: u64, request: &RpcRequest) -> EngineResult<RpcResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> EngineResult<()>;
}

/// A mock transport for testing.
///
/// Answers logons by itself and every other call from a script, in order.
/// Every call is recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    next_session: AtomicU64,
    script: Mutex<VecDeque<Result<RpcResponse, ErrorCode>>>,
    calls: Mutex<Vec<(u64, RpcRequest)>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_session: AtomicU64::new(1),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful answer.
    pub fn push_response(&self, response: RpcResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_error(&self, code: ErrorCode) {
        self.script.lock().push_back(Err(code));
    }

    /// Returns the recorded calls, logons included.
    pub fn calls(&self) -> Vec<(u64, RpcRequest)> {
        self.calls.lock().clone()
    }

    /// Returns the recorded calls other than logons.
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, request)| !matches!(request, RpcRequest::Logon(_)))
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Number of scripted answers not yet consumed.
    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl RpcTransport for MockTransport {
    fn call(&self, session: u64, request: &RpcRequest) -> EngineResult<RpcResponse> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        self.calls.lock().push((session, request.clone()));
        if let RpcRequest::Logon(_) = request {
            let session = self.next_session.fetch_add(1, Ordering::SeqCst);
            return Ok(RpcResponse::Logon(LogonResponse { session }));
        }
        match self.script.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(code)) => Err(EngineError::server(request.name(), code)),
            None => Err(EngineError::transport(format!(
                "no mock response for {}",
                request.name()
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
