//! Scanner contract.
//!
//! Two capability families feed the engine:
//! - [`DiscoveryScanner`]: called once with no input; yields nodes and facts.
//! - [`ProbeScanner`]: called once per known node whose kind is in
//!   [`ProbeScanner::applicable_kinds`]; yields facts about that node.
//!
//! Both yield the same item shapes ([`ScanItem`] / [`ProbeFact`]), so the
//! engine dispatches on what was produced, never on which scanner produced it.

pub mod arp;
pub mod cloud;
pub mod connections;
pub mod login;
pub mod static_list;

use std::sync::Arc;

use async_trait::async_trait;

use topomap_core::{Node, NodeKind, ProbeFact, ScanItem};

use crate::error::{DiscoverError, Result};
use crate::remote::RemoteExecutor;

pub use arp::ArpScanner;
pub use cloud::CloudScanner;
pub use connections::ConnectionScanner;
pub use login::LoginScanner;
pub use static_list::StaticListScanner;

/// Enumerates nodes from an external source.
#[async_trait]
pub trait DiscoveryScanner: Send + Sync {
    fn name(&self) -> &str;

    /// Errors abort the run.
    async fn list(&self) -> Result<Vec<ScanItem>>;
}

/// Discovers relationships of one already-known node.
#[async_trait]
pub trait ProbeScanner: Send + Sync {
    fn name(&self) -> &str;

    /// Node kinds this scanner accepts.
    fn applicable_kinds(&self) -> &[NodeKind];

    /// Per-node filter applied after the kind filter.
    fn accepts(&self, _node: &Node) -> bool {
        true
    }

    /// Errors are contained by the engine and count as zero facts.
    async fn list(&self, node: &Node) -> Result<Vec<ProbeFact>>;
}

/// Host probes that run one remote command and parse its output.
pub(crate) struct RemoteCommand {
    pub executor: Arc<dyn RemoteExecutor>,
}

impl RemoteCommand {
    /// Open a session to `node` and run `command`.
    pub async fn run(&self, node: &Node, command: &str) -> Result<String> {
        let endpoint = node.endpoint().ok_or_else(|| DiscoverError::Remote {
            host: node.id().to_string(),
            message: "node has no connection endpoint".to_string(),
        })?;

        let mut session = self.executor.open(endpoint).await?;
        session.run(command).await
    }
}

/// Kind set shared by every SSH-backed probe.
pub(crate) const HOSTS_ONLY: &[NodeKind] = &[NodeKind::Host];

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory executor used by probe scanner tests.

    use std::collections::HashMap;

    use async_trait::async_trait;
    use topomap_core::HostEndpoint;

    use crate::error::{DiscoverError, Result};
    use crate::remote::{RemoteExecutor, RemoteSession};

    /// Replays canned output keyed by `(address, command)`.
    #[derive(Default)]
    pub struct FakeExecutor {
        outputs: HashMap<(String, String), String>,
        unreachable: Vec<String>,
    }

    impl FakeExecutor {
        pub fn with_output(mut self, address: &str, command: &str, output: &str) -> Self {
            self.outputs
                .insert((address.to_string(), command.to_string()), output.to_string());
            self
        }

        pub fn with_unreachable(mut self, address: &str) -> Self {
            self.unreachable.push(address.to_string());
            self
        }
    }

    struct FakeSession {
        address: String,
        outputs: HashMap<(String, String), String>,
    }

    #[async_trait]
    impl RemoteExecutor for FakeExecutor {
        async fn open(&self, endpoint: &HostEndpoint) -> Result<Box<dyn RemoteSession>> {
            if self.unreachable.contains(&endpoint.address) {
                return Err(DiscoverError::Connect {
                    host: endpoint.address.clone(),
                    message: "Connection refused".to_string(),
                });
            }
            Ok(Box::new(FakeSession {
                address: endpoint.address.clone(),
                outputs: self.outputs.clone(),
            }))
        }
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn run(&mut self, command: &str) -> Result<String> {
            self.outputs
                .get(&(self.address.clone(), command.to_string()))
                .cloned()
                .ok_or_else(|| DiscoverError::Remote {
                    host: self.address.clone(),
                    message: format!("`{command}` exited with code 127: command not found"),
                })
        }
    }
}
