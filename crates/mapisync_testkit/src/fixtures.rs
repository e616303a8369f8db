//! Test fixtures and session helpers.
//!
//! Provides a ready-made session against an in-memory server and a few
//! property builders used throughout the tests.

use crate::server::{MemoryServer, MemoryTransport};
use mapisync_codec::{tags, Prop, PropertyValue};
use mapisync_engine::{
    EngineConfig, FramedTransport, LoopbackChannel, ObjectSyncEngine, OpenMode, Session,
};
use mapisync_entryid::ObjectType;
use std::sync::Arc;

/// A logged-on session against a fresh [`MemoryServer`].
pub struct TestHarness {
    /// The session.
    pub session: Arc<Session<MemoryTransport>>,
}

impl TestHarness {
    /// Creates a harness with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a harness with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_server(config, MemoryServer::new())
    }

    /// Creates a harness talking to a pre-populated server.
    pub fn with_server(config: EngineConfig, server: MemoryServer) -> Self {
        let transport = FramedTransport::new(LoopbackChannel::new(server));
        let session = Session::connect(config, transport).expect("Failed to log on");
        Self { session }
    }

    /// Returns the server behind the session.
    pub fn server(&self) -> &MemoryServer {
        self.session.transport().channel().server()
    }

    /// Opens an existing object.
    pub fn open(&self, entry_id: &[u8], mode: OpenMode) -> ObjectSyncEngine<MemoryTransport> {
        ObjectSyncEngine::open_entry(Arc::clone(&self.session), entry_id.to_vec(), mode)
            .expect("Failed to open object")
    }

    /// Starts a new object under `parent`.
    pub fn create(
        &self,
        object_type: ObjectType,
        parent: &[u8],
    ) -> ObjectSyncEngine<MemoryTransport> {
        ObjectSyncEngine::create(Arc::clone(&self.session), object_type, parent.to_vec())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHarness {
    type Target = Session<MemoryTransport>;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

/// Engine configuration used by tests.
pub fn test_config() -> EngineConfig {
    EngineConfig::new("tester").with_client_version("mapisync-testkit")
}

/// A subject property.
pub fn subject(text: &str) -> Prop {
    Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode(text.to_owned()))
}

/// A body property.
pub fn body(text: &str) -> Prop {
    Prop::new(tags::PR_BODY, PropertyValue::Unicode(text.to_owned()))
}

/// A message-flags property.
pub fn message_flags(flags: i32) -> Prop {
    Prop::new(tags::PR_MESSAGE_FLAGS, PropertyValue::Long(flags))
}
