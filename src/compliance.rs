//! Route compliance: whether staying on a lane still allows an agent to complete its route.
//!
//! The search runs over the static network rather than over any agent's perception window,
//! so results can be shared between agents. They are cached per lane, route, agent type and
//! whether the search starts at the lane's end. The cache is tagged with the network's
//! topology version and flushed when the version changes.

use crate::agent::AgentType;
use crate::debug::debug_compliance;
use crate::error::PerceptionResult;
use crate::network::{DirectedLane, LinkKind, Network, Side};
use crate::route::Route;
use crate::NodeId;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    lane: DirectedLane,
    route: Route,
    agent: AgentType,
    at_end: bool,
}

#[derive(Debug, Default)]
struct Cache {
    /// The network version the entries were computed for.
    version: u64,
    entries: FxHashMap<CacheKey, bool>,
}

/// Answers route compliance queries, caching the results.
#[derive(Debug, Default)]
pub struct RouteComplianceChecker {
    cache: RwLock<Cache>,
    /// The number of lanes expanded by searches, for diagnostics.
    lanes_visited: AtomicUsize,
}

impl RouteComplianceChecker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether following `lane` from its start still allows completing `route`.
    /// Any lane complies with a `None` route.
    pub fn allows_route(
        &self,
        network: &Network,
        lane: DirectedLane,
        route: Option<&Route>,
        agent: AgentType,
    ) -> PerceptionResult<bool> {
        self.query(network, lane, route, agent, false)
    }

    /// Whether following `lane` from its end, where lane changes on its link are no longer
    /// possible, still allows completing `route`.
    pub fn allows_route_at_end(
        &self,
        network: &Network,
        lane: DirectedLane,
        route: Option<&Route>,
        agent: AgentType,
    ) -> PerceptionResult<bool> {
        self.query(network, lane, route, agent, true)
    }

    /// Discards all cached results.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.entries.clear();
    }

    /// The number of cached results.
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// The total number of lanes expanded by searches so far.
    pub fn lanes_visited(&self) -> usize {
        self.lanes_visited.load(Ordering::Relaxed)
    }

    fn query(
        &self,
        network: &Network,
        lane: DirectedLane,
        route: Option<&Route>,
        agent: AgentType,
        at_end: bool,
    ) -> PerceptionResult<bool> {
        let Some(route) = route else {
            return Ok(true);
        };
        network.segment(lane.segment)?;

        let key = CacheKey {
            lane,
            route: route.clone(),
            agent,
            at_end,
        };
        if let Some(hit) = self.lookup(network, &key) {
            return Ok(hit);
        }

        route.validate(network)?;
        let before = self.lanes_visited();
        let search = Search {
            network,
            route,
            agent,
            visited: &self.lanes_visited,
        };
        let result = match route.step_index(network.from_node(lane), network.to_node(lane)) {
            Some(_) => search.follow_route(lane, at_end),
            None => search.leads_to_route(lane),
        };

        debug_compliance(
            &format!("{:?}", lane),
            at_end,
            result,
            self.lanes_visited() - before,
        );
        self.store(network, key, result);
        Ok(result)
    }

    fn lookup(&self, network: &Network, key: &CacheKey) -> Option<bool> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        if cache.version != network.version() {
            return None;
        }
        cache.entries.get(key).copied()
    }

    fn store(&self, network: &Network, key: CacheKey, result: bool) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.version != network.version() {
            trace!(
                "network changed from version {} to {}, flushing {} route compliance results",
                cache.version,
                network.version(),
                cache.entries.len()
            );
            cache.entries.clear();
            cache.version = network.version();
        }
        cache.entries.insert(key, result);
    }
}

/// A single uncached compliance search.
struct Search<'a> {
    network: &'a Network,
    route: &'a Route,
    agent: AgentType,
    visited: &'a AtomicUsize,
}

impl Search<'_> {
    /// Searches from a lane whose from/to nodes are a step of the route.
    ///
    /// Moves layer by layer along the route. Each layer is widened laterally over legal
    /// lane changes, then followed downstream onto lanes ending at the next route node.
    fn follow_route(&self, lane: DirectedLane, at_end: bool) -> bool {
        let mut seen = FxHashSet::default();
        seen.insert(lane);
        let mut layer = vec![lane];
        let mut longitudinal = at_end;

        loop {
            if longitudinal {
                let mut next_layer = vec![];
                for lane in &layer {
                    let to = self.network.to_node(*lane);
                    let Some(idx) = self.route.index_of(to) else {
                        continue;
                    };
                    if idx + 1 == self.route.len() {
                        return true;
                    }
                    let target = self.route.node(idx + 1);
                    for next in self.network.downstream(*lane, self.agent) {
                        self.count();
                        if self.is_destination_connector(next, to) {
                            return true;
                        }
                        if Some(self.network.to_node(next)) == target && seen.insert(next) {
                            next_layer.push(next);
                        }
                    }
                }
                if next_layer.is_empty() {
                    return false;
                }
                layer = next_layer;
            }
            longitudinal = true;

            // Widen the layer over legal lane changes
            let mut idx = 0;
            while idx < layer.len() {
                for side in [Side::Left, Side::Right] {
                    let mut cursor = layer[idx];
                    while let Some(adj) = self.network.legal_lateral(cursor, side, self.agent) {
                        if !seen.insert(adj) {
                            break;
                        }
                        self.count();
                        layer.push(adj);
                        cursor = adj;
                    }
                }
                idx += 1;
            }

            // Every lane of the link can follow the route from here on
            if layer.len() >= self.network.lane_count(layer[0], self.agent) {
                return true;
            }
        }
    }

    /// Searches downstream from a lane that isn't on the route, for a lane that is on the
    /// route and complies with it.
    fn leads_to_route(&self, start: DirectedLane) -> bool {
        let mut seen = FxHashSet::default();
        seen.insert(start);
        let mut queue = VecDeque::from([start]);

        while let Some(lane) = queue.pop_front() {
            let to = self.network.to_node(lane);
            for next in self.network.downstream(lane, self.agent) {
                self.count();
                if next == start {
                    trace!("route search from {:?} looped back onto itself", start);
                    continue;
                }
                if !seen.insert(next) {
                    continue;
                }
                if self.is_destination_connector(next, to) {
                    return true;
                }
                let from = self.network.from_node(next);
                if self.route.step_index(from, self.network.to_node(next)).is_some()
                    && self.follow_route(next, false)
                {
                    return true;
                }
                queue.push_back(next);
            }
        }
        false
    }

    /// Whether `lane` lies on a connector from `from` straight to the route's destination.
    fn is_destination_connector(&self, lane: DirectedLane, from: NodeId) -> bool {
        self.network.link_of(lane).kind() == LinkKind::Connector
            && self.network.from_node(lane) == from
            && self.network.to_node(lane) == self.route.destination()
    }

    fn count(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }
}
