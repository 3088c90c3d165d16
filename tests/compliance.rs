//! Tests of route compliance queries against the static network.

mod common;

use common::{car, ring};
use lane_perception::{
    AgentPosition, AgentTypeSet, DirectedLane, LaneAttributes, LinkKind, Network, NetworkContext,
    NodeId, PerceptionError, PerceptionWindow, Route, RouteComplianceChecker, SegmentId,
    WindowAttributes,
};

/// A 3-lane highway from `a` to `b`, where the left two lanes continue to `c`
/// and the rightmost lane, behind a solid line, exits to `d`.
struct Highway {
    net: Network,
    nodes: [NodeId; 4],
    highway: [SegmentId; 3],
    continuation: [SegmentId; 2],
    exit: SegmentId,
}

fn highway() -> Highway {
    let mut net = Network::new();
    let nodes = [net.add_node(), net.add_node(), net.add_node(), net.add_node()];
    let [a, b, c, d] = nodes;

    let link = net.add_link(a, b, LinkKind::Road).unwrap();
    let solid_right = LaneAttributes {
        change_right: AgentTypeSet::NONE,
        ..LaneAttributes::new(300.0)
    };
    let solid_left = LaneAttributes {
        change_left: AgentTypeSet::NONE,
        ..LaneAttributes::new(300.0)
    };
    let highway = [
        net.add_lane(link, &LaneAttributes::new(300.0)).unwrap(),
        net.add_lane(link, &solid_right).unwrap(),
        net.add_lane(link, &solid_left).unwrap(),
    ];

    let link = net.add_link(b, c, LinkKind::Road).unwrap();
    let continuation = [
        net.add_lane(link, &LaneAttributes::new(500.0)).unwrap(),
        net.add_lane(link, &LaneAttributes::new(500.0)).unwrap(),
    ];
    let link = net.add_link(b, d, LinkKind::Road).unwrap();
    let exit = net.add_lane(link, &LaneAttributes::new(200.0)).unwrap();

    net.connect(highway[0], continuation[0]).unwrap();
    net.connect(highway[1], continuation[1]).unwrap();
    net.connect(highway[2], exit).unwrap();

    Highway {
        net,
        nodes,
        highway,
        continuation,
        exit,
    }
}

#[test]
fn solid_line_separates_exit_lane() {
    let Highway { net, nodes, highway, .. } = highway();
    let [a, b, c, _] = nodes;
    let ctx = NetworkContext::new(net);
    let route = Route::new(vec![a, b, c]).unwrap();

    let position = AgentPosition {
        lane: DirectedLane::forward(highway[0]),
        position: 100.0,
    };
    let attributes = WindowAttributes::default();
    let mut window = PerceptionWindow::build(&ctx, car(), position, attributes).unwrap();
    window.set_route(Some(route));

    let allows = |lane: SegmentId| {
        let id = window.record_for(DirectedLane::forward(lane)).unwrap();
        window.allows_route(&ctx, id).unwrap()
    };
    assert!(allows(highway[0]));
    assert!(allows(highway[1]));
    assert!(!allows(highway[2]));
    assert!(window.root_record().is_link_split(window.records()));
}

#[test]
fn every_lane_allows_no_route() {
    let Highway { net, highway, .. } = highway();
    let ctx = NetworkContext::new(net);
    let position = AgentPosition {
        lane: DirectedLane::forward(highway[1]),
        position: 100.0,
    };
    let attributes = WindowAttributes::default();
    let window = PerceptionWindow::build(&ctx, car(), position, attributes).unwrap();

    assert!(window.len() > 3);
    for (id, record) in window.iter() {
        assert!(record.allows_route(&ctx, None, car()).unwrap());
        assert!(record.allows_route_at_end(&ctx, None, car()).unwrap());
        assert!(window.allows_route(&ctx, id).unwrap());
    }
    assert_eq!(ctx.compliance().lanes_visited(), 0);
}

#[test]
fn final_link_allows_route() {
    let Highway {
        net,
        nodes,
        continuation,
        exit,
        ..
    } = highway();
    let [a, b, c, d] = nodes;
    let ctx = NetworkContext::new(net);
    let checker = ctx.compliance();

    let route = Route::new(vec![a, b, c]).unwrap();
    for lane in continuation {
        let lane = DirectedLane::forward(lane);
        assert!(checker.allows_route(ctx.network(), lane, Some(&route), car()).unwrap());
        assert!(checker.allows_route_at_end(ctx.network(), lane, Some(&route), car()).unwrap());
    }

    let route = Route::new(vec![a, b, d]).unwrap();
    let exit = DirectedLane::forward(exit);
    assert!(checker.allows_route(ctx.network(), exit, Some(&route), car()).unwrap());
    assert!(checker.allows_route_at_end(ctx.network(), exit, Some(&route), car()).unwrap());
}

#[test]
fn lane_change_before_the_split() {
    let Highway {
        net,
        nodes,
        highway,
        ..
    } = highway();
    let [a, b, _, d] = nodes;
    let ctx = NetworkContext::new(net);
    let checker = ctx.compliance();
    let route = Route::new(vec![a, b, d]).unwrap();

    // The solid line keeps the left lanes from reaching the exit
    for lane in &highway[..2] {
        let lane = DirectedLane::forward(*lane);
        assert!(!checker.allows_route(ctx.network(), lane, Some(&route), car()).unwrap());
    }
    let exit_lane = DirectedLane::forward(highway[2]);
    assert!(checker.allows_route(ctx.network(), exit_lane, Some(&route), car()).unwrap());
}

#[test]
fn no_lane_changes_at_lane_end() {
    let Highway {
        net,
        nodes,
        highway,
        ..
    } = highway();
    let [a, b, c, _] = nodes;
    let ctx = NetworkContext::new(net);
    let checker = ctx.compliance();
    let route = Route::new(vec![a, b, c]).unwrap();
    let lane = DirectedLane::forward(highway[1]);

    assert!(checker.allows_route_at_end(ctx.network(), lane, Some(&route), car()).unwrap());
    let lane = DirectedLane::forward(highway[2]);
    assert!(!checker.allows_route_at_end(ctx.network(), lane, Some(&route), car()).unwrap());
}

/// A search from a ring disjoint from the route terminates after visiting each
/// ring lane once.
#[test]
fn disjoint_ring_terminates() {
    let mut net = Network::new();
    let (_, lanes) = ring(&mut net, 4, 100.0);
    let x = net.add_node();
    let y = net.add_node();
    let link = net.add_link(x, y, LinkKind::Road).unwrap();
    net.add_lane(link, &LaneAttributes::new(100.0)).unwrap();
    let ctx = NetworkContext::new(net);
    let route = Route::new(vec![x, y]).unwrap();

    let checker = ctx.compliance();
    let lane = DirectedLane::forward(lanes[0]);
    assert!(!checker.allows_route(ctx.network(), lane, Some(&route), car()).unwrap());
    let visited = checker.lanes_visited();
    assert!(visited > 0 && visited <= 2 * lanes.len());

    // Answered from the cache the second time
    assert!(!checker.allows_route(ctx.network(), lane, Some(&route), car()).unwrap());
    assert_eq!(checker.lanes_visited(), visited);
    assert_eq!(checker.cached(), 1);
}

#[test]
fn ring_leading_to_route() {
    let mut net = Network::new();
    let (nodes, lanes) = ring(&mut net, 4, 100.0);
    let exit = net.add_node();
    let link = net.add_link(nodes[2], exit, LinkKind::Road).unwrap();
    let lane = net.add_lane(link, &LaneAttributes::new(100.0)).unwrap();
    net.connect(lanes[1], lane).unwrap();
    let ctx = NetworkContext::new(net);
    let route = Route::new(vec![nodes[2], exit]).unwrap();

    for lane in &lanes {
        let lane = DirectedLane::forward(*lane);
        let allowed = ctx.compliance().allows_route(ctx.network(), lane, Some(&route), car());
        assert!(allowed.unwrap());
    }
}

#[test]
fn side_road_leads_onto_route() {
    let mut net = Network::new();
    let nodes = [net.add_node(), net.add_node(), net.add_node()];
    let [a, b, other] = nodes;
    let road = net.add_link(a, b, LinkKind::Road).unwrap();
    let road = net.add_lane(road, &LaneAttributes::new(100.0)).unwrap();
    let side = net.add_link(other, a, LinkKind::Road).unwrap();
    let side = net.add_lane(side, &LaneAttributes::new(100.0)).unwrap();
    net.connect(side, road).unwrap();
    let ctx = NetworkContext::new(net);

    let route = Route::new(vec![a, b]).unwrap();
    let lane = DirectedLane::forward(side);
    assert!(ctx.compliance().allows_route(ctx.network(), lane, Some(&route), car()).unwrap());
}

/// A lane leading straight onto a connector to the destination complies, even though
/// the route continues through another node.
#[test]
fn connector_to_destination_complies() {
    let allows = |kind: LinkKind| {
        let mut net = Network::new();
        let [a, b, x, zone] = [net.add_node(), net.add_node(), net.add_node(), net.add_node()];
        let road = net.add_link(a, b, LinkKind::Road).unwrap();
        let road = net.add_lane(road, &LaneAttributes::new(100.0)).unwrap();
        let through = net.add_link(b, x, LinkKind::Road).unwrap();
        net.add_lane(through, &LaneAttributes::new(100.0)).unwrap();
        let last = net.add_link(x, zone, kind).unwrap();
        net.add_lane(last, &LaneAttributes::new(100.0)).unwrap();
        let shortcut = net.add_link(b, zone, kind).unwrap();
        let shortcut = net.add_lane(shortcut, &LaneAttributes::new(5.0)).unwrap();
        net.connect(road, shortcut).unwrap();
        let ctx = NetworkContext::new(net);

        let route = Route::new(vec![a, b, x, zone]).unwrap();
        let lane = DirectedLane::forward(road);
        let checker = ctx.compliance();
        let allowed = checker.allows_route_at_end(ctx.network(), lane, Some(&route), car());
        allowed.unwrap()
    };
    assert!(allows(LinkKind::Connector));
    assert!(!allows(LinkKind::Road));
}

#[test]
fn cache_is_invalidated_by_network_updates() {
    let Highway {
        net,
        nodes,
        highway,
        continuation,
        ..
    } = highway();
    let [a, b, c, _] = nodes;
    let mut ctx = NetworkContext::new(net);
    let route = Route::new(vec![a, b, c]).unwrap();
    let lane = DirectedLane::forward(highway[2]);

    let allows = |ctx: &NetworkContext| {
        ctx.compliance()
            .allows_route(ctx.network(), lane, Some(&route), car())
            .unwrap()
    };
    assert!(!allows(&ctx));
    assert_eq!(ctx.compliance().cached(), 1);

    // Let the exit lane continue straight on as well
    ctx.update_network(|net| net.connect(highway[2], continuation[1])).unwrap();
    assert_eq!(ctx.compliance().cached(), 0);
    assert!(allows(&ctx));
}

#[test]
fn concurrent_lookups_share_the_cache() {
    fn assert_shared<T: Send + Sync>() {}
    assert_shared::<Network>();
    assert_shared::<RouteComplianceChecker>();
    assert_shared::<NetworkContext>();

    let Highway { net, nodes, highway, .. } = highway();
    let [a, b, c, _] = nodes;
    let ctx = NetworkContext::new(net);
    let route = Route::new(vec![a, b, c]).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let allowed = highway.map(|lane| {
                        let lane = DirectedLane::forward(lane);
                        let checker = ctx.compliance();
                        checker.allows_route(ctx.network(), lane, Some(&route), car()).unwrap()
                    });
                    assert_eq!(allowed, [true, true, false]);
                }
            });
        }
    });
    assert_eq!(ctx.compliance().cached(), 3);
}

#[test]
fn unknown_lanes_and_nodes_are_reported() {
    let Highway { net, nodes, highway, .. } = highway();
    let ctx = NetworkContext::new(net);
    let lane = DirectedLane::forward(highway[0]);

    let route = Route::new(vec![nodes[0], NodeId::default()]).unwrap();
    let result = ctx.compliance().allows_route(ctx.network(), lane, Some(&route), car());
    assert!(matches!(result, Err(PerceptionError::UnknownNode(_))));

    assert_eq!(Route::new(vec![]), Err(PerceptionError::EmptyRoute));
}

#[test]
fn plans_shortest_route() {
    let Highway { net, nodes, .. } = highway();
    let [a, b, c, d] = nodes;

    let route = net.plan_route(a, c, car()).unwrap();
    assert_eq!(route.nodes(), &[a, b, c]);
    assert_eq!(route.origin(), a);
    assert_eq!(route.destination(), c);

    let result = net.plan_route(d, a, car());
    assert_eq!(result, Err(PerceptionError::NoRoute { from: d, to: a }));
}
