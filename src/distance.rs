//! Incremental recomputation of record distances.
//!
//! Every record except the window's root derives its start distance from a single
//! source record through a [RecordLink]. When the agent moves, only the root's distance
//! changes directly; the new distances cascade through the dependency forest.

use crate::record::LaneRecord;
use crate::{RecordId, RecordSet};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a record's start distance derives from its source record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordLink {
    /// The record lies upstream of its source.
    Up,
    /// The record lies downstream of its source.
    Down,
    /// The record lies alongside its source, aligned at the lane ends.
    LateralEnd,
    /// The record lies alongside its source, aligned at the lane starts.
    LateralStart,
    /// The record is in the agent's cross-section; its distance follows from the
    /// agent's fractional position.
    Cross,
}

impl RecordLink {
    /// Computes a record's start distance.
    ///
    /// # Parameters
    /// * `source` - The start distance and length of the source record, if any
    /// * `length` - The length of the record itself
    /// * `fraction` - The agent's fractional position along its lane
    pub fn start_distance(
        self,
        source: Option<(f64, f64)>,
        length: f64,
        fraction: f64,
    ) -> Option<f64> {
        use RecordLink::*;
        match (self, source) {
            (Cross, _) => Some(-length * fraction),
            (Up, Some((start, _))) => Some(start - length),
            (Down, Some((start, src_len))) => Some(start + src_len),
            (LateralEnd, Some((start, src_len))) => Some(start + src_len - length),
            (LateralStart, Some((start, _))) => Some(start),
            (_, None) => None,
        }
    }
}

/// Recomputes the start distance of a record from its source, then does the same
/// for all its dependents, parents before children.
///
/// A record without a source and a link other than [RecordLink::Cross] keeps its distance.
pub fn update_start_distance(records: &mut RecordSet, id: RecordId, fraction: f64) {
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        let Some(record) = records.get(id) else {
            continue;
        };
        let source = record
            .source
            .and_then(|src| records.get(src))
            .map(|src| (src.start_distance, src.length()));
        let start = record.link.start_distance(source, record.length(), fraction);

        let record = &mut records[id];
        if let Some(start) = start {
            record.start_distance = start;
        }
        stack.extend(record.dependents.iter().copied());
    }
}

/// Changes the source a record derives its start distance from.
///
/// The record is removed from the old source's dependents and added to the new source's
/// dependents in the same call. The caller must keep the source relation acyclic.
pub fn change_start_distance_source(
    records: &mut RecordSet,
    id: RecordId,
    source: Option<RecordId>,
    link: RecordLink,
) {
    let old = records[id].source;
    if old == source {
        records[id].link = link;
        return;
    }
    if let Some(old) = old.and_then(|old| records.get_mut(old)) {
        old.dependents.retain(|dep| *dep != id);
    }
    if let Some(new) = source.and_then(|src| records.get_mut(src)) {
        if !new.dependents.contains(&id) {
            new.dependents.push(id);
        }
    }
    let record: &mut LaneRecord = &mut records[id];
    record.source = source;
    record.link = link;
}
