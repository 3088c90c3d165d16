pub use agent::{AgentType, AgentTypeSet};
pub use compliance::RouteComplianceChecker;
pub use context::NetworkContext;
#[cfg(feature = "debug")]
pub use debug::take_debug_frame;
pub use distance::{change_start_distance_source, update_start_distance, RecordLink};
pub use error::{ConstructionError, PerceptionError, PerceptionResult};
pub use network::{
    DirectedLane, Direction, LaneAttributes, LaneSegment, Link, LinkKind, Network, Side,
};
pub use record::LaneRecord;
pub use route::Route;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use window::{AgentPosition, PerceptionWindow, WindowAttributes};

mod agent;
mod compliance;
mod context;
mod debug;
mod distance;
mod error;
mod network;
mod record;
mod route;
mod util;
mod window;

new_key_type! {
    /// Unique ID of a node of the [Network].
    pub struct NodeId;
    /// Unique ID of a [Link].
    pub struct LinkId;
    /// Unique ID of a [LaneSegment].
    pub struct SegmentId;
    /// Unique ID of a [LaneRecord] within a [PerceptionWindow].
    pub struct RecordId;
}

/// The records of a perception window.
pub type RecordSet = SlotMap<RecordId, LaneRecord>;
