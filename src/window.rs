//! An agent's rolling perception window over the road network.
//!
//! The window is a graph of [LaneRecord]s around the agent, bounded by a horizon ahead of
//! and behind the agent. It's built once with [PerceptionWindow::build], then shifted with
//! [PerceptionWindow::advance] as the agent moves, rather than rebuilt every step.
//!
//! Records grow from the agent's own cross-section (the root record and the records
//! laterally adjacent to it) in both longitudinal directions. Records ahead of the
//! cross-section only grow downstream, records behind it only grow upstream, and every
//! record grows sideways. Lanes merging into records ahead, or splitting off records
//! behind, are perceived too, but nothing grows from them. Ends reaching the horizon are
//! cut off there. Before any
//! operation returns, every record end has either neighbours, a cut-off, or is a dead end.

use crate::context::NetworkContext;
use crate::debug::debug_window;
use crate::distance::{change_start_distance_source, update_start_distance, RecordLink};
use crate::error::{PerceptionError, PerceptionResult};
use crate::network::{DirectedLane, Network, Side};
use crate::record::{End, Heading, LaneRecord};
use crate::route::Route;
use crate::util::Interval;
use crate::{AgentType, RecordId, RecordSet};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// The attributes of a perception window.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowAttributes {
    /// How far ahead of the agent lanes are perceived, in m.
    pub horizon_ahead: f64,
    /// How far behind the agent lanes are perceived, in m.
    pub horizon_behind: f64,
}

impl Default for WindowAttributes {
    fn default() -> Self {
        Self {
            horizon_ahead: 250.0,
            horizon_behind: 100.0,
        }
    }
}

impl WindowAttributes {
    fn validate(&self) -> PerceptionResult<()> {
        let valid = |d: f64| d.is_finite() && d >= 0.0;
        if valid(self.horizon_ahead) && valid(self.horizon_behind) {
            Ok(())
        } else {
            Err(PerceptionError::InvalidHorizon {
                ahead: self.horizon_ahead,
                behind: self.horizon_behind,
            })
        }
    }

    /// The perceived range of distances relative to the agent.
    fn horizon(&self) -> Interval<f64> {
        Interval::new(-self.horizon_behind, self.horizon_ahead)
    }
}

/// The location of an agent in the network.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentPosition {
    /// The lane the agent is on.
    pub lane: DirectedLane,
    /// The distance travelled along the lane, in m.
    pub position: f64,
}

/// An agent's rolling perception window.
#[derive(Clone, Debug)]
pub struct PerceptionWindow {
    /// The records of the perceived lanes.
    records: RecordSet,
    /// The record of each perceived lane.
    lanes: FxHashMap<DirectedLane, RecordId>,
    /// The record of the lane the agent is on.
    root: RecordId,
    /// The agent's position along the root lane, in m.
    position: f64,
    agent: AgentType,
    attributes: WindowAttributes,
    /// The route used to choose between lanes at splits.
    route: Option<Route>,
}

impl PerceptionWindow {
    /// Builds a perception window around an agent.
    pub fn build(
        ctx: &NetworkContext,
        agent: AgentType,
        position: AgentPosition,
        attributes: WindowAttributes,
    ) -> PerceptionResult<Self> {
        attributes.validate()?;
        let network = ctx.network();
        let lane = position.lane;
        let segment = network.segment(lane.segment)?;
        if !segment.is_permitted(lane.direction, agent) {
            return Err(PerceptionError::NotPermitted {
                segment: lane.segment,
                agent: agent.index(),
            });
        }
        if !Interval::new(0.0, segment.length()).contains(position.position) {
            return Err(PerceptionError::PositionOutOfRange {
                segment: lane.segment,
                position: position.position,
                length: segment.length(),
            });
        }

        let mut records = RecordSet::with_key();
        let root = records.insert(LaneRecord::new(network, lane, RecordLink::Cross, Heading::Root));
        let mut window = Self {
            records,
            lanes: FxHashMap::from_iter([(lane, root)]),
            root,
            position: position.position,
            agent,
            attributes,
            route: None,
        };
        window.update_start_distance(window.fraction());
        window.grow(network, VecDeque::from([root]))?;
        window.resolve(network)?;

        debug!(
            "built perception window of {} records around {:?}",
            window.records.len(),
            lane
        );
        debug_window("build", &window.records, window.root, 0);
        Ok(window)
    }

    /// Moves the agent `delta` m further along its lanes and shifts the window.
    ///
    /// When the agent passes the end of its lane it continues onto a downstream lane:
    /// the first one that follows the window's route, or the first one if none does.
    /// If there's no downstream lane, [PerceptionError::DeadEnd] is returned and the
    /// agent stays where it was.
    pub fn advance(&mut self, ctx: &NetworkContext, delta: f64) -> PerceptionResult<()> {
        if !(delta.is_finite() && delta >= 0.0) {
            return Err(PerceptionError::InvalidAdvance(delta));
        }
        let network = ctx.network();

        // Find the lane the agent ends up on
        let mut root = self.root;
        let mut position = self.position + delta;
        while position > self.records[root].length() {
            if self.records[root].is_cut_off_end() {
                self.records[root].clear_cut_off(End::End);
                let mut queue = VecDeque::new();
                self.grow_end(network, root, End::End, &mut queue, false)?;
                self.grow(network, queue)?;
                self.resolve(network)?;
            }
            let next = self.choose_next(ctx, root)?;
            position -= self.records[root].length();
            root = next;
        }

        let mut queue = VecDeque::new();
        if root != self.root {
            trace!(
                "agent moved from {:?} to {:?}",
                self.records[self.root].lane(),
                self.records[root].lane()
            );
            self.root = root;
            // Records may now grow ends that were never perceived
            queue.extend(self.reanchor());
        }
        self.position = position;
        self.update_start_distance(self.fraction());

        let pruned = self.prune();
        queue.extend(self.refresh_edges()?);
        self.grow(network, queue)?;
        self.resolve(network)?;

        debug_window("advance", &self.records, self.root, pruned);
        Ok(())
    }

    /// Moves the agent onto the lane beside it, at the same fractional position.
    /// The window is rebuilt around the new lane.
    pub fn change_lane(&mut self, ctx: &NetworkContext, side: Side) -> PerceptionResult<()> {
        let root = &self.records[self.root];
        let target = root
            .lateral(side)
            .filter(|_| root.legal(side))
            .ok_or(PerceptionError::NoAdjacentLane(root.segment()))?;
        let target = &self.records[target];
        let position = AgentPosition {
            lane: target.lane(),
            position: self.fraction() * target.length(),
        };

        let mut window = Self::build(ctx, self.agent, position, self.attributes)?;
        window.route = self.route.take();
        *self = window;
        Ok(())
    }

    /// Recomputes the start distances of all records for the given fractional position
    /// of the agent along its lane.
    pub fn update_start_distance(&mut self, fraction: f64) {
        update_start_distance(&mut self.records, self.root, fraction);
    }

    /// Sets the route the agent follows at splits.
    pub fn set_route(&mut self, route: Option<Route>) {
        self.route = route;
    }

    /// The route the agent follows at splits.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Whether following the given record's lane allows the agent to complete its route.
    pub fn allows_route(&self, ctx: &NetworkContext, id: RecordId) -> PerceptionResult<bool> {
        self.records
            .get(id)
            .ok_or(PerceptionError::UnknownRecord(id))?
            .allows_route(ctx, self.route.as_ref(), self.agent)
    }

    /// The record of the lane the agent is on.
    pub fn root(&self) -> RecordId {
        self.root
    }

    /// The record of the lane the agent is on.
    pub fn root_record(&self) -> &LaneRecord {
        &self.records[self.root]
    }

    /// Gets a record by its ID.
    pub fn record(&self, id: RecordId) -> Option<&LaneRecord> {
        self.records.get(id)
    }

    /// The record of a lane, if the lane is perceived.
    pub fn record_for(&self, lane: DirectedLane) -> Option<RecordId> {
        self.lanes.get(&lane).copied()
    }

    /// All the records in the window.
    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Returns an iterator over the records in the window.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &LaneRecord)> {
        self.records.iter()
    }

    /// The number of records in the window.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false, as the window contains at least the agent's own lane.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The agent's position along its lane, in m.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// The agent's fractional position along its lane.
    pub fn fraction(&self) -> f64 {
        self.position / self.records[self.root].length()
    }

    pub fn agent(&self) -> AgentType {
        self.agent
    }

    pub fn attributes(&self) -> &WindowAttributes {
        &self.attributes
    }

    /// Grows the window from the queued records, queueing every record it creates.
    fn grow(&mut self, network: &Network, mut queue: VecDeque<RecordId>) -> PerceptionResult<()> {
        while let Some(id) = queue.pop_front() {
            if !self.records.contains_key(id) {
                continue;
            }
            for side in [Side::Left, Side::Right] {
                self.grow_lateral(network, id, side, &mut queue);
            }
            for end in [End::End, End::Start] {
                let heading = self.records[id].heading;
                if heading.grows(end) {
                    self.grow_end(network, id, end, &mut queue, true)?;
                } else if heading.branches(end) {
                    self.grow_branches(network, id, end)?;
                }
            }
        }
        Ok(())
    }

    fn grow_lateral(
        &mut self,
        network: &Network,
        id: RecordId,
        side: Side,
        queue: &mut VecDeque<RecordId>,
    ) {
        let record = &self.records[id];
        let Some(link) = record.heading.lateral_link() else {
            return;
        };
        let Some(adj) = network.adjacent(record.lane(), side) else {
            return;
        };
        if !network.is_permitted(adj, self.agent) {
            return;
        }
        let target = match self.lanes.get(&adj).copied() {
            Some(target) => target,
            None => {
                let heading = record.heading;
                let target = self.create(network, adj, id, link, heading);
                queue.push_back(target);
                target
            }
        };
        self.records[id].set_lateral(side, Some(target), self.agent);
        self.records[target].set_lateral(side.flip(), Some(id), self.agent);
    }

    /// Grows one end of a record. Unless `bounded` is false, an end beyond the horizon
    /// is cut off instead.
    fn grow_end(
        &mut self,
        network: &Network,
        id: RecordId,
        end: End,
        queue: &mut VecDeque<RecordId>,
        bounded: bool,
    ) -> PerceptionResult<()> {
        let record = &mut self.records[id];
        if record.is_cut_off(end) {
            return Ok(());
        }

        // Stop at the horizon
        let horizon = self.attributes.horizon();
        let beyond = match end {
            End::End => (record.end_distance() >= horizon.max).then_some(horizon.max),
            End::Start => (record.start_distance() <= horizon.min).then_some(horizon.min),
        };
        let beyond = beyond.filter(|_| bounded);
        if let Some(distance) = beyond {
            if record.neighbours(end).is_empty() {
                match end {
                    End::End => record.set_cut_off_end(distance)?,
                    End::Start => record.set_cut_off_start(distance)?,
                }
            }
            return Ok(());
        }

        let lane = record.lane();
        let lanes: SmallVec<[DirectedLane; 2]> = match end {
            End::End => network.downstream(lane, self.agent).collect(),
            End::Start => network.upstream(lane, self.agent).collect(),
        };
        for other in lanes {
            let other_id = match self.lanes.get(&other).copied() {
                Some(other_id) => other_id,
                None => {
                    let (link, heading) = match end {
                        End::End => (RecordLink::Down, Heading::Downstream),
                        End::Start => (RecordLink::Up, Heading::Upstream),
                    };
                    let other_id = self.create(network, other, id, link, heading);
                    queue.push_back(other_id);
                    other_id
                }
            };
            if !bounded && self.records[other_id].neighbours(end.flip()).is_empty() {
                self.records[other_id].clear_cut_off(end.flip());
            }
            match end {
                End::End => self.link_longitudinal(id, other_id)?,
                End::Start => self.link_longitudinal(other_id, id)?,
            };
        }
        Ok(())
    }

    /// Links the given end of a record to all of the lanes on that end, perceiving those
    /// that aren't yet as branches.
    fn grow_branches(&mut self, network: &Network, id: RecordId, end: End) -> PerceptionResult<()> {
        let record = &self.records[id];
        if record.is_cut_off(end) {
            return Ok(());
        }
        let lane = record.lane();
        let (lanes, link): (SmallVec<[DirectedLane; 2]>, _) = match end {
            End::End => (network.downstream(lane, self.agent).collect(), RecordLink::Down),
            End::Start => (network.upstream(lane, self.agent).collect(), RecordLink::Up),
        };
        for other in lanes {
            let other_id = match self.lanes.get(&other).copied() {
                Some(other_id) => other_id,
                None => self.create(network, other, id, link, Heading::Branch),
            };
            match end {
                End::End => self.link_longitudinal(id, other_id)?,
                End::Start => self.link_longitudinal(other_id, id)?,
            };
        }
        Ok(())
    }

    /// Creates a record whose start distance derives from `source`.
    fn create(
        &mut self,
        network: &Network,
        lane: DirectedLane,
        source: RecordId,
        link: RecordLink,
        heading: Heading,
    ) -> RecordId {
        let id = self.records.insert(LaneRecord::new(network, lane, link, heading));
        self.lanes.insert(lane, id);
        change_start_distance_source(&mut self.records, id, Some(source), link);
        let fraction = self.fraction();
        update_start_distance(&mut self.records, id, fraction);
        id
    }

    /// Links `up` to `down` longitudinally, unless either of the ends is cut off.
    fn link_longitudinal(&mut self, up: RecordId, down: RecordId) -> PerceptionResult<bool> {
        if self.records[up].is_cut_off_end() || self.records[down].is_cut_off_start() {
            return Ok(false);
        }
        self.records[up].add_next(down)?;
        self.records[down].add_prev(up)?;
        Ok(true)
    }

    /// Resolves every record end that has neither neighbours nor a cut-off: it's linked
    /// to perceived neighbours, cut off if the network continues beyond the window,
    /// or left as a dead end. Ends that may grow are cut off no further than the horizon.
    fn resolve(&mut self, network: &Network) -> PerceptionResult<()> {
        let horizon = self.attributes.horizon();
        let ids = self.records.keys().collect::<Vec<_>>();
        for id in ids {
            for end in [End::Start, End::End] {
                let record = &self.records[id];
                if record.is_cut_off(end) || !record.neighbours(end).is_empty() {
                    continue;
                }
                let lane = record.lane();
                let lanes: SmallVec<[DirectedLane; 2]> = match end {
                    End::End => network.downstream(lane, self.agent).collect(),
                    End::Start => network.upstream(lane, self.agent).collect(),
                };
                if lanes.is_empty() {
                    continue;
                }

                let mut linked = false;
                for other in lanes {
                    if let Some(other_id) = self.lanes.get(&other).copied() {
                        linked |= match end {
                            End::End => self.link_longitudinal(id, other_id)?,
                            End::Start => self.link_longitudinal(other_id, id)?,
                        };
                    }
                }
                if !linked {
                    let record = &mut self.records[id];
                    let grows = record.grows(end);
                    match end {
                        End::End => {
                            let distance = record.end_distance();
                            let distance = if grows { distance.min(horizon.max) } else { distance };
                            record.set_cut_off_end(distance)?
                        }
                        End::Start => {
                            let distance = record.start_distance();
                            let distance = if grows { distance.max(horizon.min) } else { distance };
                            record.set_cut_off_start(distance)?
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Picks the lane the agent continues onto after the given record.
    fn choose_next(&self, ctx: &NetworkContext, id: RecordId) -> PerceptionResult<RecordId> {
        let record = &self.records[id];
        let Some(first) = record.next().first().copied() else {
            return Err(PerceptionError::DeadEnd(record.segment()));
        };
        let Some(route) = self.route.as_ref() else {
            return Ok(first);
        };
        for next in record.next() {
            if self.records[*next].allows_route(ctx, Some(route), self.agent)? {
                return Ok(*next);
            }
        }
        Ok(first)
    }

    /// Rebuilds the dependency forest from the current root, following the same rules
    /// the window grows by. Records no longer reachable under those rules are removed.
    /// Returns the records whose heading changed.
    fn reanchor(&mut self) -> Vec<RecordId> {
        let mut tree = FxHashMap::default();
        tree.insert(self.root, (None, RecordLink::Cross, Heading::Root));
        let mut queue = VecDeque::from([self.root]);

        while let Some(id) = queue.pop_front() {
            let heading: Heading = tree[&id].2;
            let record = &self.records[id];
            for side in [Side::Left, Side::Right] {
                let (Some(adj), Some(link)) = (record.lateral(side), heading.lateral_link()) else {
                    continue;
                };
                if !tree.contains_key(&adj) {
                    tree.insert(adj, (Some(id), link, heading));
                    queue.push_back(adj);
                }
            }
            for (end, link, child) in [
                (End::End, RecordLink::Down, Heading::Downstream),
                (End::Start, RecordLink::Up, Heading::Upstream),
            ] {
                if !heading.grows(end) {
                    continue;
                }
                for other in record.neighbours(end) {
                    if !tree.contains_key(other) {
                        tree.insert(*other, (Some(id), link, child));
                        queue.push_back(*other);
                    }
                }
            }
        }

        // Lanes merging ahead and splitting behind
        let mut branches = vec![];
        for (id, (_, _, heading)) in &tree {
            for (end, link) in [(End::Start, RecordLink::Up), (End::End, RecordLink::Down)] {
                if heading.branches(end) {
                    let others = self.records[*id].neighbours(end).iter();
                    branches.extend(others.map(|other| (*other, *id, link)));
                }
            }
        }
        for (other, id, link) in branches {
            tree.entry(other).or_insert((Some(id), link, Heading::Branch));
        }

        let unreachable = self
            .records
            .keys()
            .filter(|id| !tree.contains_key(id))
            .collect::<Vec<_>>();
        for id in unreachable {
            self.remove(id);
        }
        let mut changed = vec![];
        for (id, (source, link, heading)) in tree {
            let record = &mut self.records[id];
            if record.heading != heading {
                record.heading = heading;
                changed.push(id);
            }
            if record.source != source || record.link != link {
                change_start_distance_source(&mut self.records, id, source, link);
            }
        }
        changed
    }

    /// Removes records entirely outside the horizon, along with their dependents.
    /// Returns the number of records removed.
    fn prune(&mut self) -> usize {
        let horizon = self.attributes.horizon();
        let mut stack = self
            .records
            .iter()
            .filter(|(id, _)| *id != self.root)
            .filter(|(_, r)| {
                !horizon.overlaps(&Interval::new(r.start_distance(), r.end_distance()))
            })
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        let mut doomed = FxHashSet::default();
        while let Some(id) = stack.pop() {
            if id != self.root && doomed.insert(id) {
                stack.extend(self.records[id].dependents().iter().copied());
            }
        }
        for id in &doomed {
            self.remove(*id);
        }
        if !doomed.is_empty() {
            trace!("pruned {} records beyond the horizon", doomed.len());
        }
        doomed.len()
    }

    /// Moves the cut-offs of ends that may grow along with the horizon. Cut-offs of
    /// ends now within the horizon are cleared, and the records concerned returned.
    fn refresh_edges(&mut self) -> PerceptionResult<Vec<RecordId>> {
        let horizon = self.attributes.horizon();
        let mut uncut = vec![];
        for (id, record) in self.records.iter_mut() {
            let mut grow = false;
            if record.grows(End::End) && record.is_cut_off_end() {
                record.clear_cut_off(End::End);
                if record.end_distance() < horizon.max {
                    grow = true;
                } else {
                    record.set_cut_off_end(horizon.max)?;
                }
            }
            if record.grows(End::Start) && record.is_cut_off_start() {
                record.clear_cut_off(End::Start);
                if record.start_distance() > horizon.min {
                    grow = true;
                } else {
                    record.set_cut_off_start(horizon.min)?;
                }
            }
            if grow {
                uncut.push(id);
            }
        }
        Ok(uncut)
    }

    /// Removes a record and every reference to it.
    fn remove(&mut self, id: RecordId) {
        let Some(record) = self.records.remove(id) else {
            return;
        };
        if self.lanes.get(&record.lane()) == Some(&id) {
            self.lanes.remove(&record.lane());
        }
        let neighbours = record
            .next()
            .iter()
            .chain(record.prev())
            .copied()
            .chain(record.left())
            .chain(record.right());
        for other in neighbours {
            if let Some(other) = self.records.get_mut(other) {
                other.forget(id);
            }
        }
        if let Some(source) = record.source().and_then(|src| self.records.get_mut(src)) {
            source.dependents.retain(|dep| *dep != id);
        }
        for dep in record.dependents() {
            if let Some(dep) = self.records.get_mut(*dep) {
                if dep.source == Some(id) {
                    dep.source = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_must_be_non_negative() {
        let attributes = WindowAttributes::default();
        assert!(attributes.validate().is_ok());
        assert_eq!(attributes.horizon(), Interval::new(-100.0, 250.0));

        for (ahead, behind) in [(-1.0, 10.0), (10.0, f64::INFINITY), (f64::NAN, 0.0)] {
            let attributes = WindowAttributes {
                horizon_ahead: ahead,
                horizon_behind: behind,
            };
            assert!(matches!(attributes.validate(), Err(PerceptionError::InvalidHorizon { .. })));
        }
    }
}
