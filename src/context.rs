use crate::compliance::RouteComplianceChecker;
use crate::network::Network;
use log::debug;

/// A road network together with the route compliance cache derived from it.
///
/// The context is shared read-only by every agent's perception window during a tick.
/// Mutating the network through [Self::update_network] discards the cached results.
#[derive(Debug, Default)]
pub struct NetworkContext {
    network: Network,
    compliance: RouteComplianceChecker,
}

impl NetworkContext {
    /// Creates a context for the given network.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            compliance: RouteComplianceChecker::new(),
        }
    }

    /// The road network.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The route compliance checker for the network.
    pub fn compliance(&self) -> &RouteComplianceChecker {
        &self.compliance
    }

    /// Mutates the network, then invalidates everything derived from it.
    ///
    /// Perception windows built before the change should be rebuilt by their owners.
    pub fn update_network<T>(&mut self, f: impl FnOnce(&mut Network) -> T) -> T {
        let result = f(&mut self.network);
        debug!(
            "network updated to version {}, invalidating {} route compliance results",
            self.network.version(),
            self.compliance.cached()
        );
        self.compliance.invalidate();
        result
    }

    /// Consumes the context, returning the network.
    pub fn into_network(self) -> Network {
        self.network
    }
}
