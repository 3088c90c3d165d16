//! Records of the lanes in an agent's perception window.

use crate::agent::{AgentType, AgentTypeSet};
use crate::context::NetworkContext;
use crate::distance::RecordLink;
use crate::error::{ConstructionError, PerceptionResult};
use crate::network::{DirectedLane, Direction, Network, Side};
use crate::route::Route;
use crate::{NodeId, RecordId, RecordSet, SegmentId};
use itertools::Itertools;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// The direction in which the window grows from a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Heading {
    /// The agent's own cross-section; grows both ways.
    Root,
    /// Ahead of the agent; grows downstream.
    Downstream,
    /// Behind the agent; grows upstream.
    Upstream,
    /// Another lane merging into a record ahead, or splitting off a record behind.
    /// Perceived so merges and splits can be told apart, but never grown from.
    Branch,
}

impl Heading {
    /// Whether records with this heading grow the window on the given end.
    pub(crate) fn grows(self, end: End) -> bool {
        matches!(
            (self, end),
            (Heading::Root, _) | (Heading::Downstream, End::End) | (Heading::Upstream, End::Start)
        )
    }

    /// Whether the lanes on the given end of records with this heading are perceived as
    /// branches: the start of records ahead, and the end of records behind.
    pub(crate) fn branches(self, end: End) -> bool {
        matches!(
            (self, end),
            (Heading::Downstream, End::Start) | (Heading::Upstream, End::End)
        )
    }

    /// How records grown sideways from a record with this heading derive their distance.
    /// Branches aren't grown sideways.
    pub(crate) fn lateral_link(self) -> Option<RecordLink> {
        match self {
            Heading::Root => Some(RecordLink::Cross),
            Heading::Downstream => Some(RecordLink::LateralStart),
            Heading::Upstream => Some(RecordLink::LateralEnd),
            Heading::Branch => None,
        }
    }
}

/// A lane in an agent's perception window.
///
/// Records are owned by a [PerceptionWindow](crate::PerceptionWindow) and refer to each other
/// by [RecordId]. The `left`/`right`/`next`/`prev` adjacency may contain cycles (ring roads),
/// whereas the `source`/`dependents` relation used to derive distances is always a forest.
#[derive(Clone, Debug)]
pub struct LaneRecord {
    /// The lane and the direction it's travelled in.
    lane: DirectedLane,
    /// The length of the lane in m.
    length: f64,
    /// The node at which the lane starts.
    from: NodeId,
    /// The node at which the lane ends.
    to: NodeId,
    /// Agent types that may cross the left and right markings, in the direction of travel.
    lane_change: [AgentTypeSet; 2],
    /// Whether there is a lane to the left, regardless of whether it's perceived.
    physical_left: bool,
    /// Whether there is a lane to the right, regardless of whether it's perceived.
    physical_right: bool,
    left: Option<RecordId>,
    right: Option<RecordId>,
    legal_left: bool,
    legal_right: bool,
    next: SmallVec<[RecordId; 2]>,
    prev: SmallVec<[RecordId; 2]>,
    /// Distance from the agent's reference point to the start of the lane, in m.
    pub(crate) start_distance: f64,
    /// Cut-off positions, relative to the start of the lane.
    cut_off_start: Option<f64>,
    cut_off_end: Option<f64>,
    /// The record this record's start distance is derived from.
    pub(crate) source: Option<RecordId>,
    /// How the start distance is derived from `source`.
    pub(crate) link: RecordLink,
    /// The records whose start distance is derived from this one.
    pub(crate) dependents: SmallVec<[RecordId; 4]>,
    pub(crate) heading: Heading,
}

impl LaneRecord {
    /// Creates an unlinked record for a lane.
    pub(crate) fn new(
        network: &Network,
        lane: DirectedLane,
        link: RecordLink,
        heading: Heading,
    ) -> Self {
        let segment = network.lane_segment(lane.segment);
        Self {
            lane,
            length: segment.length(),
            from: network.from_node(lane),
            to: network.to_node(lane),
            lane_change: segment.lane_change_sets(lane.direction),
            physical_left: segment.adjacent(lane.direction, Side::Left).is_some(),
            physical_right: segment.adjacent(lane.direction, Side::Right).is_some(),
            left: None,
            right: None,
            legal_left: false,
            legal_right: false,
            next: SmallVec::new(),
            prev: SmallVec::new(),
            start_distance: 0.0,
            cut_off_start: None,
            cut_off_end: None,
            source: None,
            link,
            dependents: SmallVec::new(),
            heading,
        }
    }

    /// The lane this record represents.
    pub fn lane(&self) -> DirectedLane {
        self.lane
    }

    /// The lane segment this record represents.
    pub fn segment(&self) -> SegmentId {
        self.lane.segment
    }

    /// The direction the lane is travelled in.
    pub fn direction(&self) -> Direction {
        self.lane.direction
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The node at which the lane starts, in the direction of travel.
    pub fn from_node(&self) -> NodeId {
        self.from
    }

    /// The node at which the lane ends, in the direction of travel.
    pub fn to_node(&self) -> NodeId {
        self.to
    }

    /// The record to the left, in the direction of travel.
    pub fn left(&self) -> Option<RecordId> {
        self.left
    }

    /// The record to the right, in the direction of travel.
    pub fn right(&self) -> Option<RecordId> {
        self.right
    }

    /// The record on the given side.
    pub fn lateral(&self, side: Side) -> Option<RecordId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// The downstream records. More than one only at splits.
    pub fn next(&self) -> &[RecordId] {
        &self.next
    }

    /// The upstream records. More than one only at merges.
    pub fn prev(&self) -> &[RecordId] {
        &self.prev
    }

    /// Whether the agent may legally change to the left record.
    pub fn legal_left(&self) -> bool {
        self.legal_left
    }

    /// Whether the agent may legally change to the right record.
    pub fn legal_right(&self) -> bool {
        self.legal_right
    }

    /// Whether the agent may legally change to the record on the given side.
    pub fn legal(&self, side: Side) -> bool {
        match side {
            Side::Left => self.legal_left,
            Side::Right => self.legal_right,
        }
    }

    /// Whether the network has a lane to the left, perceived or not.
    pub fn physical_left(&self) -> bool {
        self.physical_left
    }

    /// Whether the network has a lane to the right, perceived or not.
    pub fn physical_right(&self) -> bool {
        self.physical_right
    }

    /// The distance from the agent's reference point to the start of the lane, in m.
    /// Negative if the lane starts behind the agent.
    pub fn start_distance(&self) -> f64 {
        self.start_distance
    }

    /// The distance from the agent's reference point to the end of the lane, in m.
    pub fn end_distance(&self) -> f64 {
        self.start_distance + self.length
    }

    /// The record this record's start distance is derived from.
    pub fn source(&self) -> Option<RecordId> {
        self.source
    }

    /// How this record's start distance is derived from its source.
    pub fn record_link(&self) -> RecordLink {
        self.link
    }

    /// The records whose start distance is derived from this one.
    pub fn dependents(&self) -> &[RecordId] {
        &self.dependents
    }

    /// Sets the left record, and whether moving onto it is legal for the agent type.
    pub fn set_left(&mut self, left: Option<RecordId>, agent: AgentType) {
        self.left = left;
        self.legal_left = left.is_some() && self.lane_change[0].contains(agent);
    }

    /// Sets the right record, and whether moving onto it is legal for the agent type.
    pub fn set_right(&mut self, right: Option<RecordId>, agent: AgentType) {
        self.right = right;
        self.legal_right = right.is_some() && self.lane_change[1].contains(agent);
    }

    /// Sets the record on the given side.
    pub(crate) fn set_lateral(&mut self, side: Side, record: Option<RecordId>, agent: AgentType) {
        match side {
            Side::Left => self.set_left(record, agent),
            Side::Right => self.set_right(record, agent),
        }
    }

    /// Adds a downstream record. Fails if the end is cut off.
    pub fn add_next(&mut self, record: RecordId) -> Result<(), ConstructionError> {
        if self.cut_off_end.is_some() {
            return Err(ConstructionError::NextAfterCutOff);
        }
        if !self.next.contains(&record) {
            self.next.push(record);
        }
        Ok(())
    }

    /// Adds an upstream record. Fails if the start is cut off.
    pub fn add_prev(&mut self, record: RecordId) -> Result<(), ConstructionError> {
        if self.cut_off_start.is_some() {
            return Err(ConstructionError::PrevAfterCutOff);
        }
        if !self.prev.contains(&record) {
            self.prev.push(record);
        }
        Ok(())
    }

    /// Marks the end as cut off at the given distance from the agent's reference point.
    /// Fails if there are downstream records.
    pub fn set_cut_off_end(&mut self, distance: f64) -> Result<(), ConstructionError> {
        if !self.next.is_empty() {
            return Err(ConstructionError::CutOffWithNext);
        }
        self.cut_off_end = Some(distance - self.start_distance);
        Ok(())
    }

    /// Marks the start as cut off at the given distance from the agent's reference point.
    /// Fails if there are upstream records.
    pub fn set_cut_off_start(&mut self, distance: f64) -> Result<(), ConstructionError> {
        if !self.prev.is_empty() {
            return Err(ConstructionError::CutOffWithPrev);
        }
        self.cut_off_start = Some(distance - self.start_distance);
        Ok(())
    }

    /// Whether the end is cut off at the window's horizon.
    pub fn is_cut_off_end(&self) -> bool {
        self.cut_off_end.is_some()
    }

    /// Whether the start is cut off at the window's horizon.
    pub fn is_cut_off_start(&self) -> bool {
        self.cut_off_start.is_some()
    }

    /// The distance from the agent's reference point at which the end is cut off.
    pub fn cut_off_end(&self) -> Option<f64> {
        self.cut_off_end.map(|d| self.start_distance + d)
    }

    /// The distance from the agent's reference point at which the start is cut off.
    pub fn cut_off_start(&self) -> Option<f64> {
        self.cut_off_start.map(|d| self.start_distance + d)
    }

    /// Whether the lane ends without a successor, as opposed to being cut off.
    pub fn is_dead_end(&self) -> bool {
        self.cut_off_end.is_none() && self.next.is_empty()
    }

    /// Whether this cross-section is the start of a link that lanes from several links
    /// merge into. Always false if the start is cut off.
    pub fn is_link_merge(&self, records: &RecordSet) -> bool {
        if self.is_cut_off_start() {
            return false;
        }
        self.cross_section(records)
            .flat_map(|record| record.prev.iter())
            .map(|id| records[*id].from)
            .unique()
            .count()
            > 1
    }

    /// Whether this cross-section is the end of a link whose lanes lead to several links.
    /// Always false if the end is cut off.
    pub fn is_link_split(&self, records: &RecordSet) -> bool {
        if self.is_cut_off_end() {
            return false;
        }
        self.cross_section(records)
            .flat_map(|record| record.next.iter())
            .map(|id| records[*id].to)
            .unique()
            .count()
            > 1
    }

    /// Whether following this lane still allows the agent to complete its route.
    /// A `None` route is always followed.
    pub fn allows_route(
        &self,
        ctx: &NetworkContext,
        route: Option<&Route>,
        agent: AgentType,
    ) -> PerceptionResult<bool> {
        ctx.compliance().allows_route(ctx.network(), self.lane, route, agent)
    }

    /// Like [Self::allows_route], but from the end of the lane, where changing lanes
    /// on the current link is no longer possible.
    pub fn allows_route_at_end(
        &self,
        ctx: &NetworkContext,
        route: Option<&Route>,
        agent: AgentType,
    ) -> PerceptionResult<bool> {
        ctx.compliance().allows_route_at_end(ctx.network(), self.lane, route, agent)
    }

    /// This record followed by the records reachable along its left and right chains.
    fn cross_section<'a>(
        &'a self,
        records: &'a RecordSet,
    ) -> impl Iterator<Item = &'a LaneRecord> + 'a {
        let mut seen = FxHashSet::default();
        let mut chain = |start: Option<RecordId>, side: Side| {
            let mut out = Vec::new();
            let mut cursor = start;
            while let Some(id) = cursor.filter(|id| seen.insert(*id)) {
                let record = &records[id];
                out.push(record);
                cursor = record.lateral(side);
            }
            out
        };
        let left = chain(self.left, Side::Left);
        let right = chain(self.right, Side::Right);
        std::iter::once(self).chain(left).chain(right)
    }

    /// Whether the heading grows the window on the given end.
    pub(crate) fn grows(&self, end: End) -> bool {
        self.heading.grows(end)
    }

    /// The records on the given end.
    pub(crate) fn neighbours(&self, end: End) -> &[RecordId] {
        match end {
            End::Start => &self.prev,
            End::End => &self.next,
        }
    }

    pub(crate) fn is_cut_off(&self, end: End) -> bool {
        match end {
            End::Start => self.is_cut_off_start(),
            End::End => self.is_cut_off_end(),
        }
    }

    /// Removes a cut-off so the end can be grown further.
    pub(crate) fn clear_cut_off(&mut self, end: End) {
        match end {
            End::Start => self.cut_off_start = None,
            End::End => self.cut_off_end = None,
        }
    }

    /// Drops every reference to `record` from the adjacency of this record.
    pub(crate) fn forget(&mut self, record: RecordId) {
        self.next.retain(|id| *id != record);
        self.prev.retain(|id| *id != record);
        if self.left == Some(record) {
            self.left = None;
            self.legal_left = false;
        }
        if self.right == Some(record) {
            self.right = None;
            self.legal_right = false;
        }
    }
}

/// One of the two longitudinal ends of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum End {
    Start,
    End,
}

impl End {
    /// The opposite end.
    pub(crate) fn flip(self) -> Self {
        match self {
            End::Start => End::End,
            End::End => End::Start,
        }
    }
}
