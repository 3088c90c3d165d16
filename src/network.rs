//! The road network that perception windows are built over.
//!
//! A network is made of nodes, links between pairs of nodes, and lane segments.
//! Each link holds its lanes ordered left-to-right in its design direction, and
//! the lanes of a link are physically adjacent to one another. Lanes of
//! consecutive links are joined with [Network::connect].
//!
//! Every mutation bumps the network's topology [version](Network::version),
//! which caches derived from the network use to detect staleness.

use crate::agent::{AgentType, AgentTypeSet};
use crate::error::{PerceptionError, PerceptionResult};
use crate::route::Route;
use crate::{LinkId, NodeId, SegmentId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

/// The kind of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkKind {
    /// An ordinary stretch of road.
    Road,
    /// A virtual link joining the road network to a zone, off-ramp end or sink.
    Connector,
}

/// A direction of travel along a lane segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// From the link's from-node to its to-node.
    Forward,
    /// From the link's to-node to its from-node.
    Backward,
}

/// A side of a lane, relative to the direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Left,
    Right,
}

/// A lane segment travelled in a specific direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DirectedLane {
    pub segment: SegmentId,
    pub direction: Direction,
}

/// A node of the network.
#[derive(Clone, Debug, Default)]
pub struct Node {
    /// Links starting at this node.
    links_out: Vec<LinkId>,
    /// Links ending at this node.
    links_in: Vec<LinkId>,
}

/// A link between two nodes, holding one or more lanes.
#[derive(Clone, Debug)]
pub struct Link {
    id: LinkId,
    from: NodeId,
    to: NodeId,
    kind: LinkKind,
    /// The lanes, ordered left-to-right in the forward direction.
    lanes: Vec<SegmentId>,
}

/// An atomic stretch of a single lane between the two nodes of its link.
#[derive(Clone, Debug)]
pub struct LaneSegment {
    id: SegmentId,
    link: LinkId,
    /// Length in m.
    length: f64,
    /// Agent types permitted to travel, indexed by [Direction].
    permitted: [AgentTypeSet; 2],
    /// Agent types permitted to cross the left and right lane markings,
    /// as seen in the forward direction.
    lane_change: [AgentTypeSet; 2],
    /// The physically adjacent lane on the left, in the forward direction.
    left: Option<SegmentId>,
    /// The physically adjacent lane on the right, in the forward direction.
    right: Option<SegmentId>,
    /// The lanes that succeed this one, in the forward direction.
    next: SmallVec<[SegmentId; 2]>,
    /// The lanes that precede this one, in the forward direction.
    prev: SmallVec<[SegmentId; 2]>,
}

/// The attributes of a lane segment.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneAttributes {
    /// The length of the lane in m.
    pub length: f64,
    /// The agent types that may travel in the forward direction.
    pub permitted: AgentTypeSet,
    /// The agent types that may travel in the backward direction.
    pub permitted_backward: AgentTypeSet,
    /// The agent types that may cross the left lane marking (forward direction).
    pub change_left: AgentTypeSet,
    /// The agent types that may cross the right lane marking (forward direction).
    pub change_right: AgentTypeSet,
}

impl LaneAttributes {
    /// A one-way lane of the given length, open to every agent type,
    /// with broken lane markings on both sides.
    pub fn new(length: f64) -> Self {
        Self {
            length,
            permitted: AgentTypeSet::ALL,
            permitted_backward: AgentTypeSet::NONE,
            change_left: AgentTypeSet::ALL,
            change_right: AgentTypeSet::ALL,
        }
    }
}

impl Direction {
    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
        }
    }
}

impl Side {
    /// The opposite side.
    pub fn flip(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// The side as seen when travelling in the forward direction.
    fn forward(self, direction: Direction) -> Self {
        match direction {
            Direction::Forward => self,
            Direction::Backward => self.flip(),
        }
    }
}

impl DirectedLane {
    /// The segment travelled in its design direction.
    pub fn forward(segment: SegmentId) -> Self {
        Self {
            segment,
            direction: Direction::Forward,
        }
    }

    /// The segment travelled against its design direction.
    pub fn backward(segment: SegmentId) -> Self {
        Self {
            segment,
            direction: Direction::Backward,
        }
    }

    fn with_segment(self, segment: SegmentId) -> Self {
        Self { segment, ..self }
    }
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn from_node(&self) -> NodeId {
        self.from
    }

    pub fn to_node(&self) -> NodeId {
        self.to
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// The lanes of the link, left-to-right in the forward direction.
    pub fn lanes(&self) -> &[SegmentId] {
        &self.lanes
    }
}

impl LaneSegment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// The link the lane belongs to.
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Whether the agent type may travel along the lane in the given direction.
    pub fn is_permitted(&self, direction: Direction, agent: AgentType) -> bool {
        self.permitted[direction.index()].contains(agent)
    }

    /// Whether the lane markings allow the agent type to move to the given side,
    /// when travelling in the given direction.
    pub fn can_change(&self, direction: Direction, side: Side, agent: AgentType) -> bool {
        let idx = match side.forward(direction) {
            Side::Left => 0,
            Side::Right => 1,
        };
        self.lane_change[idx].contains(agent)
    }

    /// The agent types permitted to cross the left and right markings,
    /// as seen in the given direction.
    pub(crate) fn lane_change_sets(&self, direction: Direction) -> [AgentTypeSet; 2] {
        match direction {
            Direction::Forward => self.lane_change,
            Direction::Backward => [self.lane_change[1], self.lane_change[0]],
        }
    }

    /// The physically adjacent segment on the given side, as seen in the given direction.
    pub fn adjacent(&self, direction: Direction, side: Side) -> Option<SegmentId> {
        match side.forward(direction) {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// The segments downstream of this one, in the given direction.
    pub fn successors(&self, direction: Direction) -> &[SegmentId] {
        match direction {
            Direction::Forward => &self.next,
            Direction::Backward => &self.prev,
        }
    }

    /// The segments upstream of this one, in the given direction.
    pub fn predecessors(&self, direction: Direction) -> &[SegmentId] {
        self.successors(direction.flip())
    }
}

/// A road network.
#[derive(Clone, Debug, Default)]
pub struct Network {
    nodes: SlotMap<NodeId, Node>,
    links: SlotMap<LinkId, Link>,
    segments: SlotMap<SegmentId, LaneSegment>,
    /// Incremented on every mutation.
    version: u64,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// The topology version, which changes whenever the network is mutated.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adds a node to the network.
    pub fn add_node(&mut self) -> NodeId {
        self.version += 1;
        self.nodes.insert(Node::default())
    }

    /// Adds a link from one node to another. Lanes are added with [Self::add_lane].
    pub fn add_link(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: LinkKind,
    ) -> PerceptionResult<LinkId> {
        for node in [from, to] {
            if !self.nodes.contains_key(node) {
                return Err(PerceptionError::UnknownNode(node));
            }
        }
        let id = self.links.insert_with_key(|id| Link {
            id,
            from,
            to,
            kind,
            lanes: vec![],
        });
        self.nodes[from].links_out.push(id);
        self.nodes[to].links_in.push(id);
        self.version += 1;
        Ok(id)
    }

    /// Adds a lane to the right-hand side (in the forward direction) of a link.
    pub fn add_lane(
        &mut self,
        link: LinkId,
        attributes: &LaneAttributes,
    ) -> PerceptionResult<SegmentId> {
        if !self.links.contains_key(link) {
            return Err(PerceptionError::UnknownLink(link));
        }
        if !(attributes.length.is_finite() && attributes.length > 0.0) {
            return Err(PerceptionError::InvalidLength(attributes.length));
        }

        let left = self.links[link].lanes.last().copied();
        let id = self.segments.insert_with_key(|id| LaneSegment {
            id,
            link,
            length: attributes.length,
            permitted: [attributes.permitted, attributes.permitted_backward],
            lane_change: [attributes.change_left, attributes.change_right],
            left,
            right: None,
            next: SmallVec::new(),
            prev: SmallVec::new(),
        });
        if let Some(left) = left {
            self.segments[left].right = Some(id);
        }
        self.links[link].lanes.push(id);
        self.version += 1;
        Ok(id)
    }

    /// Specifies that the end of the `from` lane connects to the start of the `to` lane.
    pub fn connect(&mut self, from: SegmentId, to: SegmentId) -> PerceptionResult<()> {
        let from_link = self.segment(from)?.link;
        let to_link = self.segment(to)?.link;
        if self.links[from_link].to != self.links[to_link].from {
            return Err(PerceptionError::DisconnectedLanes { from, to });
        }
        if !self.segments[from].next.contains(&to) {
            self.segments[from].next.push(to);
            self.segments[to].prev.push(from);
        }
        self.version += 1;
        Ok(())
    }

    /// Whether the node exists in the network.
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Gets the link with the given ID.
    pub fn link(&self, id: LinkId) -> PerceptionResult<&Link> {
        self.links.get(id).ok_or(PerceptionError::UnknownLink(id))
    }

    /// Gets the lane segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> PerceptionResult<&LaneSegment> {
        self.segments.get(id).ok_or(PerceptionError::UnknownSegment(id))
    }

    /// Gets a lane segment by an ID known to belong to this network.
    pub(crate) fn lane_segment(&self, id: SegmentId) -> &LaneSegment {
        &self.segments[id]
    }

    /// Returns an iterator over all the links in the network.
    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Returns an iterator over all the lane segments in the network.
    pub fn iter_segments(&self) -> impl Iterator<Item = &LaneSegment> {
        self.segments.values()
    }

    /// The length of a lane in m.
    pub fn length(&self, lane: DirectedLane) -> f64 {
        self.segments[lane.segment].length
    }

    /// The link a lane belongs to.
    pub(crate) fn link_of(&self, lane: DirectedLane) -> &Link {
        &self.links[self.segments[lane.segment].link]
    }

    /// The node at which a lane starts, in its direction of travel.
    pub fn from_node(&self, lane: DirectedLane) -> NodeId {
        let link = self.link_of(lane);
        match lane.direction {
            Direction::Forward => link.from,
            Direction::Backward => link.to,
        }
    }

    /// The node at which a lane ends, in its direction of travel.
    pub fn to_node(&self, lane: DirectedLane) -> NodeId {
        let link = self.link_of(lane);
        match lane.direction {
            Direction::Forward => link.to,
            Direction::Backward => link.from,
        }
    }

    /// Whether the agent type may travel along the lane.
    pub fn is_permitted(&self, lane: DirectedLane, agent: AgentType) -> bool {
        self.segments[lane.segment].is_permitted(lane.direction, agent)
    }

    /// The lanes downstream of `lane` that the agent type may travel on.
    pub fn downstream(
        &self,
        lane: DirectedLane,
        agent: AgentType,
    ) -> impl Iterator<Item = DirectedLane> + '_ {
        self.segments[lane.segment]
            .successors(lane.direction)
            .iter()
            .map(move |id| lane.with_segment(*id))
            .filter(move |next| self.is_permitted(*next, agent))
    }

    /// The lanes upstream of `lane` that the agent type may travel on.
    pub fn upstream(
        &self,
        lane: DirectedLane,
        agent: AgentType,
    ) -> impl Iterator<Item = DirectedLane> + '_ {
        self.segments[lane.segment]
            .predecessors(lane.direction)
            .iter()
            .map(move |id| lane.with_segment(*id))
            .filter(move |prev| self.is_permitted(*prev, agent))
    }

    /// The physically adjacent lane on the given side, travelled in the same direction.
    pub fn adjacent(&self, lane: DirectedLane, side: Side) -> Option<DirectedLane> {
        self.segments[lane.segment]
            .adjacent(lane.direction, side)
            .map(|id| lane.with_segment(id))
    }

    /// Whether the lane markings on the given side allow the agent type to change lanes.
    pub fn can_change(&self, lane: DirectedLane, side: Side, agent: AgentType) -> bool {
        self.segments[lane.segment].can_change(lane.direction, side, agent)
    }

    /// The adjacent lane on the given side, if the agent type may legally move onto it.
    pub fn legal_lateral(
        &self,
        lane: DirectedLane,
        side: Side,
        agent: AgentType,
    ) -> Option<DirectedLane> {
        self.adjacent(lane, side)
            .filter(|_| self.can_change(lane, side, agent))
            .filter(|adj| self.is_permitted(*adj, agent))
    }

    /// The number of lanes of `lane`'s link the agent type may travel on in `lane`'s direction.
    pub fn lane_count(&self, lane: DirectedLane, agent: AgentType) -> usize {
        self.link_of(lane)
            .lanes
            .iter()
            .filter(|id| self.is_permitted(lane.with_segment(**id), agent))
            .count()
    }

    /// Finds the shortest route (by lane length) between two nodes for an agent type.
    pub fn plan_route(
        &self,
        from: NodeId,
        to: NodeId,
        agent: AgentType,
    ) -> PerceptionResult<Route> {
        for node in [from, to] {
            if !self.contains_node(node) {
                return Err(PerceptionError::UnknownNode(node));
            }
        }
        let (nodes, _) = pathfinding::directed::dijkstra::dijkstra(
            &from,
            |node| self.node_successors(*node, agent),
            |node| *node == to,
        )
        .ok_or(PerceptionError::NoRoute { from, to })?;
        Route::new(nodes)
    }

    /// The nodes reachable over a single link from `node`, with their cost in mm.
    fn node_successors(&self, node: NodeId, agent: AgentType) -> Vec<(NodeId, u64)> {
        let node = &self.nodes[node];
        let forward = node.links_out.iter().map(|id| (id, Direction::Forward));
        let backward = node.links_in.iter().map(|id| (id, Direction::Backward));
        forward
            .chain(backward)
            .filter_map(|(id, direction)| {
                let link = &self.links[*id];
                let length = link
                    .lanes
                    .iter()
                    .map(|lane| &self.segments[*lane])
                    .filter(|lane| lane.is_permitted(direction, agent))
                    .map(|lane| lane.length)
                    .reduce(f64::min)?;
                let target = match direction {
                    Direction::Forward => link.to,
                    Direction::Backward => link.from,
                };
                Some((target, (1000.0 * length).round() as u64))
            })
            .collect()
    }
}
