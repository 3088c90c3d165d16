//! Network builders and window checks shared by the integration tests.

#![allow(dead_code)]

use assert_approx_eq::assert_approx_eq;
use lane_perception::{
    AgentType, LaneAttributes, LinkKind, Network, NodeId, PerceptionWindow, RecordLink, SegmentId,
};

pub fn car() -> AgentType {
    AgentType::new(0).unwrap()
}

/// A chain of single-lane links with the given lane lengths, connected end to end.
pub fn chain(net: &mut Network, lengths: &[f64]) -> (Vec<NodeId>, Vec<SegmentId>) {
    let mut nodes = vec![net.add_node()];
    let mut lanes: Vec<SegmentId> = vec![];
    for length in lengths {
        let node = net.add_node();
        let link = net.add_link(*nodes.last().unwrap(), node, LinkKind::Road).unwrap();
        let lane = net.add_lane(link, &LaneAttributes::new(*length)).unwrap();
        if let Some(prev) = lanes.last() {
            net.connect(*prev, lane).unwrap();
        }
        nodes.push(node);
        lanes.push(lane);
    }
    (nodes, lanes)
}

/// A one-way ring of single-lane links of equal length.
pub fn ring(net: &mut Network, size: usize, length: f64) -> (Vec<NodeId>, Vec<SegmentId>) {
    let nodes = (0..size).map(|_| net.add_node()).collect::<Vec<_>>();
    let lanes = (0..size)
        .map(|i| {
            let link = net.add_link(nodes[i], nodes[(i + 1) % size], LinkKind::Road).unwrap();
            net.add_lane(link, &LaneAttributes::new(length)).unwrap()
        })
        .collect::<Vec<_>>();
    for i in 0..size {
        net.connect(lanes[i], lanes[(i + 1) % size]).unwrap();
    }
    (nodes, lanes)
}

/// Checks the structural invariants every window holds between operations.
pub fn assert_consistent(window: &PerceptionWindow, net: &Network) {
    let agent = window.agent();
    for (id, record) in window.iter() {
        // Neighbours are perceived and link back
        for next in record.next() {
            assert!(window.record(*next).unwrap().prev().contains(&id));
        }
        for prev in record.prev() {
            assert!(window.record(*prev).unwrap().next().contains(&id));
        }
        for left in record.left() {
            assert_eq!(window.record(left).unwrap().right(), Some(id));
        }

        // Every end is linked, cut off, or a dead end of the network
        assert!(!(record.is_cut_off_end() && !record.next().is_empty()));
        assert!(!(record.is_cut_off_start() && !record.prev().is_empty()));
        if record.next().is_empty() && !record.is_cut_off_end() {
            assert_eq!(net.downstream(record.lane(), agent).count(), 0);
        }
        if record.prev().is_empty() && !record.is_cut_off_start() {
            assert_eq!(net.upstream(record.lane(), agent).count(), 0);
        }

        // Distances follow the record's source
        match (record.source(), record.record_link()) {
            (None, _) => assert_eq!(id, window.root()),
            (Some(src), RecordLink::Down) => {
                let src = window.record(src).unwrap();
                assert_approx_eq!(record.start_distance(), src.end_distance());
            }
            (Some(src), RecordLink::Up) => {
                let src = window.record(src).unwrap();
                assert_approx_eq!(record.end_distance(), src.start_distance());
            }
            (Some(src), RecordLink::LateralStart) => {
                let src = window.record(src).unwrap();
                assert_approx_eq!(record.start_distance(), src.start_distance());
            }
            (Some(src), RecordLink::LateralEnd) => {
                let src = window.record(src).unwrap();
                assert_approx_eq!(record.end_distance(), src.end_distance());
            }
            (Some(_), RecordLink::Cross) => {
                assert_approx_eq!(record.start_distance(), -record.length() * window.fraction());
            }
        }
    }

    // The root is the only record without a source, so the sources form a tree
    let root = window.root_record();
    assert_eq!(root.source(), None);
    assert_approx_eq!(root.start_distance(), -window.position());
    for (id, _) in window.iter() {
        let mut cursor = id;
        for _ in 0..window.len() {
            match window.record(cursor).unwrap().source() {
                Some(src) => cursor = src,
                None => break,
            }
        }
        assert_eq!(cursor, window.root());
    }
}
