//! Error types for network construction, record construction and window maintenance.

use crate::{LinkId, NodeId, RecordId, SegmentId};
use thiserror::Error;

/// A violation of the cut-off/neighbour exclusivity of a [LaneRecord](crate::LaneRecord) end.
///
/// These are programming errors. The offending call returns before mutating the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("cannot add a next record to a record whose end is cut off")]
    NextAfterCutOff,

    #[error("cannot add a previous record to a record whose start is cut off")]
    PrevAfterCutOff,

    #[error("cannot cut off the end of a record that has next records")]
    CutOffWithNext,

    #[error("cannot cut off the start of a record that has previous records")]
    CutOffWithPrev,
}

/// Errors produced while building networks, routes and perception windows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerceptionError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("route has no destination node")]
    EmptyRoute,

    #[error("node {0:?} not found in network")]
    UnknownNode(NodeId),

    #[error("link {0:?} not found in network")]
    UnknownLink(LinkId),

    #[error("lane segment {0:?} not found in network")]
    UnknownSegment(SegmentId),

    #[error("lane {from:?} ends at a different node than where lane {to:?} starts")]
    DisconnectedLanes { from: SegmentId, to: SegmentId },

    #[error("agent type {agent} may not travel on lane {segment:?}")]
    NotPermitted { segment: SegmentId, agent: u8 },

    #[error("lane length must be finite and positive, got {0} m")]
    InvalidLength(f64),

    #[error("position {position} m is outside lane {segment:?} of length {length} m")]
    PositionOutOfRange {
        segment: SegmentId,
        position: f64,
        length: f64,
    },

    #[error("horizon distances must be finite and non-negative (ahead {ahead}, behind {behind})")]
    InvalidHorizon { ahead: f64, behind: f64 },

    #[error("cannot advance by {0} m; distances must be finite and non-negative")]
    InvalidAdvance(f64),

    #[error("record {0:?} is not part of the perception window")]
    UnknownRecord(RecordId),

    #[error("lane {0:?} is a dead end")]
    DeadEnd(SegmentId),

    #[error("no route from {from:?} to {to:?}")]
    NoRoute { from: NodeId, to: NodeId },

    #[error("no legal adjacent lane next to {0:?}")]
    NoAdjacentLane(SegmentId),

    #[error("agent type index {0} exceeds the supported 32 agent types")]
    TooManyAgentTypes(u8),
}

pub type PerceptionResult<T> = Result<T, PerceptionError>;
