//! Logged-on session shared by every engine and table of one connection.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::names::NamedPropResolver;
use crate::transport::RpcTransport;
use mapisync_core::PropertyName;
use mapisync_protocol::{
    GetIdsFromNamesRequest, GetNamesFromIdsRequest, LogonRequest, RpcRequest, RpcResponse,
    WireName,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters kept per session.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Calls sent, logons included.
    pub rpc_calls: u64,
    /// Successful logons.
    pub logons: u64,
    /// Object loads and reloads.
    pub loads: u64,
    /// Saves that reached the server.
    pub saves: u64,
    /// Saves skipped because nothing was pending.
    pub saves_skipped: u64,
    /// Single-property demand loads.
    pub demand_loads: u64,
    /// Calls resent after re-authentication.
    pub session_retries: u64,
    /// Saves resent with the single-instance body.
    pub instance_retries: u64,
    /// Table batches sent.
    pub table_flushes: u64,
    /// Tables reopened after a reconnect.
    pub table_replays: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// A logged-on connection.
///
/// Owns the transport, the session handle and the named-property memo.
/// A lost session is re-established at most once per call.
pub struct Session<T: RpcTransport> {
    config: EngineConfig,
    transport: T,
    handle: AtomicU64,
    generation: AtomicU64,
    stats: RwLock<EngineStats>,
    names: NamedPropResolver,
}

impl<T: RpcTransport> Session<T> {
    /// Logs on through `transport`.
    pub fn connect(config: EngineConfig, transport: T) -> EngineResult<Arc<Self>> {
        let session = Self {
            config,
            transport,
            handle: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            stats: RwLock::new(EngineStats::default()),
            names: NamedPropResolver::new(),
        };
        session.logon()?;
        Ok(Arc::new(session))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the current session handle.
    pub fn handle(&self) -> u64 {
        self.handle.load(Ordering::SeqCst)
    }

    /// Number of logons so far. Server-side handles from an older
    /// generation are gone.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Gets the current stats.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Returns the named-property memo.
    pub fn names(&self) -> &NamedPropResolver {
        &self.names
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut EngineStats)) {
        update(&mut self.stats.write());
    }

    fn logon(&self) -> EngineResult<()> {
        let request = RpcRequest::Logon(LogonRequest {
            user: self.config.user.clone(),
            client_version: self.config.client_version.clone(),
        });
        let response = self.call_once_with(0, &request)?.into_logon()?;
        self.handle.store(response.session, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(|s| s.logons += 1);
        debug!(session = response.session, generation, "logged on");
        Ok(())
    }

    /// Drops the current session and logs on again.
    pub fn reconnect(&self) -> EngineResult<()> {
        self.handle.store(0, Ordering::SeqCst);
        self.logon()
    }

    fn call_once_with(&self, handle: u64, request: &RpcRequest) -> EngineResult<RpcResponse> {
        self.record(|s| s.rpc_calls += 1);
        self.transport.call(handle, request).map_err(|err| {
            self.record(|s| s.last_error = Some(err.to_string()));
            err
        })
    }

    /// Sends one call without any retry.
    pub fn call_once(&self, request: &RpcRequest) -> EngineResult<RpcResponse> {
        self.call_once_with(self.handle(), request)
    }

    /// Sends one call, re-authenticating and resending it once if the
    /// session was lost.
    pub fn call(&self, request: &RpcRequest) -> EngineResult<RpcResponse> {
        match self.call_once(request) {
            Err(err) if err.is_session_lost() && self.config.retry_on_session_expiry => {
                warn!(call = request.name(), error = %err, "session lost, logging on again");
                self.reconnect()?;
                self.record(|s| s.session_retries += 1);
                self.call_once(request)
            }
            other => other,
        }
    }

    /// Resolves property names to ids.
    ///
    /// Well-known and memoised names are answered locally; the rest go to
    /// the server in one call. `None` marks a name the server does not know.
    pub fn get_ids_from_names(
        &self,
        names: &[PropertyName],
        create: bool,
    ) -> EngineResult<Vec<Option<u16>>> {
        let mut ids: Vec<Option<u16>> = names.iter().map(|name| self.names.lookup(name)).collect();
        let missing: Vec<usize> = (0..names.len()).filter(|&i| ids[i].is_none()).collect();
        if missing.is_empty() {
            return Ok(ids);
        }

        let request = RpcRequest::GetIdsFromNames(GetIdsFromNamesRequest {
            names: missing.iter().map(|&i| WireName::from(&names[i])).collect(),
            create,
        });
        let response = self.call(&request)?.into_ids()?;
        if response.ids.len() != missing.len() {
            return Err(EngineError::invalid_state(format!(
                "server resolved {} of {} names",
                response.ids.len(),
                missing.len()
            )));
        }
        for (&index, &id) in missing.iter().zip(&response.ids) {
            if id != 0 {
                self.names.remember(names[index].clone(), id);
                ids[index] = Some(id);
            }
        }
        Ok(ids)
    }

    /// Resolves ids to property names, asking the server for unknown ids.
    pub fn get_names_from_ids(&self, ids: &[u16]) -> EngineResult<Vec<Option<PropertyName>>> {
        let mut names: Vec<Option<PropertyName>> = ids.iter().map(|&id| self.names.name_of(id)).collect();
        let missing: Vec<usize> = (0..ids.len()).filter(|&i| names[i].is_none()).collect();
        if missing.is_empty() {
            return Ok(names);
        }

        let request = RpcRequest::GetNamesFromIds(GetNamesFromIdsRequest {
            ids: missing.iter().map(|&i| ids[i]).collect(),
        });
        let response = self.call(&request)?.into_names()?;
        for (&index, wire) in missing.iter().zip(&response.names) {
            if let Some(wire) = wire {
                let name = PropertyName::from(wire);
                self.names.remember(name.clone(), ids[index]);
                names[index] = Some(name);
            }
        }
        Ok(names)
    }

    /// Closes the transport.
    pub fn close(&self) -> EngineResult<()> {
        self.transport.close()
    }
}
