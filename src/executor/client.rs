//! Address-only load balancer client.
//!
//! For callers that dispatch requests themselves but still want server selection,
//! URI reconstruction and stats accounting.

use hyper::Uri;
use std::future::Future;
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::executor::{reconstruct, ExecuteError};
use crate::load_balancer::{ServerDirectory, ServerIdentity};
use crate::stats::ServerStatsRegistry;

#[derive(Clone)]
pub struct LoadBalancerClient {
    directory: Arc<dyn ServerDirectory>,
    stats: Arc<ServerStatsRegistry>,
    store: Arc<ConfigStore>,
}

impl LoadBalancerClient {
    pub fn new(
        directory: Arc<dyn ServerDirectory>,
        stats: Arc<ServerStatsRegistry>,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            directory,
            stats,
            store,
        }
    }

    /// Pick a server for `service` without dispatching anything.
    pub async fn choose(&self, service: &str) -> Option<ServerIdentity> {
        self.directory.choose(service).await
    }

    /// Rewrite `original` onto `server`, honoring the service's `is_secure` setting.
    pub fn reconstruct_uri(
        &self,
        service: &str,
        server: &ServerIdentity,
        original: &Uri,
    ) -> Result<Uri, ExecuteError> {
        let configured = self.store.settings_for(service).is_secure();
        reconstruct::reconstruct_uri(server, original, reconstruct::is_secure(server, configured))
    }

    /// Choose a server and run `call` against it, recording the attempt in the stats.
    ///
    /// The attempt is closed even if `call` fails, panics or is cancelled.
    pub async fn execute_with<F, Fut, T, E>(&self, service: &str, call: F) -> Result<T, E>
    where
        F: FnOnce(ServerIdentity) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ExecuteError>,
    {
        let server = self.choose(service).await.ok_or_else(|| ExecuteError::NoServerAvailable {
            service: service.to_string(),
        })?;

        let guard = self.stats.start_attempt(&server);
        let result = call(server).await;
        guard.finish(result.is_ok());
        result
    }
}
