use std::time::Instant;

use lane_perception::{
    AgentPosition, AgentType, DirectedLane, LaneAttributes, LinkKind, Network, NetworkContext,
    NodeId, PerceptionError, PerceptionResult, PerceptionWindow, SegmentId, WindowAttributes,
};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const NUM_AGENTS: usize = 200;
const NUM_FRAMES: usize = 1000;
const DT: f64 = 0.1;

/// A two-lane highway with an exit ramp, feeding into a one-lane ring road.
struct Demo {
    ctx: NetworkContext,
    /// The lanes agents spawn on.
    entry: Vec<SegmentId>,
    /// The zone at the end of the exit ramp.
    exit: NodeId,
    /// A node on the ring road.
    ring: NodeId,
}

struct Agent {
    window: PerceptionWindow,
    speed: f64,
}

fn build_network() -> PerceptionResult<Demo> {
    let mut net = Network::new();

    // Highway
    let nodes = (0..4).map(|_| net.add_node()).collect::<Vec<_>>();
    let mut highway = vec![];
    for pair in nodes.windows(2) {
        let link = net.add_link(pair[0], pair[1], LinkKind::Road)?;
        let lanes = [
            net.add_lane(link, &LaneAttributes::new(400.0))?,
            net.add_lane(link, &LaneAttributes::new(400.0))?,
        ];
        highway.push(lanes);
    }
    for pair in highway.windows(2) {
        net.connect(pair[0][0], pair[1][0])?;
        net.connect(pair[0][1], pair[1][1])?;
    }

    // Exit ramp off the right lane of the first link
    let ramp_end = net.add_node();
    let exit = net.add_node();
    let ramp = net.add_link(nodes[1], ramp_end, LinkKind::Road)?;
    let ramp = net.add_lane(ramp, &LaneAttributes::new(200.0))?;
    net.connect(highway[0][1], ramp)?;
    let connector = net.add_link(ramp_end, exit, LinkKind::Connector)?;
    let connector = net.add_lane(connector, &LaneAttributes::new(10.0))?;
    net.connect(ramp, connector)?;

    // Ring road at the end of the highway
    let ring = (0..4).map(|_| net.add_node()).collect::<Vec<_>>();
    let approach = net.add_link(nodes[3], ring[0], LinkKind::Road)?;
    let approach = net.add_lane(approach, &LaneAttributes::new(100.0))?;
    for lane in highway[2] {
        net.connect(lane, approach)?;
    }
    let mut ring_lanes = vec![];
    for i in 0..ring.len() {
        let link = net.add_link(ring[i], ring[(i + 1) % ring.len()], LinkKind::Road)?;
        ring_lanes.push(net.add_lane(link, &LaneAttributes::new(150.0))?);
    }
    net.connect(approach, ring_lanes[0])?;
    for i in 0..ring_lanes.len() {
        net.connect(ring_lanes[i], ring_lanes[(i + 1) % ring_lanes.len()])?;
    }

    Ok(Demo {
        ctx: NetworkContext::new(net),
        entry: highway[0].to_vec(),
        exit,
        ring: ring[2],
    })
}

fn spawn(
    demo: &Demo,
    agent_type: AgentType,
    rng: &mut StdRng,
    speeds: &Normal<f64>,
) -> PerceptionResult<Agent> {
    let lane = DirectedLane::forward(demo.entry[rng.gen_range(0..demo.entry.len())]);
    let position = AgentPosition {
        lane,
        position: rng.gen_range(0.0..50.0),
    };
    let attributes = WindowAttributes::default();
    let mut window = PerceptionWindow::build(&demo.ctx, agent_type, position, attributes)?;
    let origin = demo.ctx.network().from_node(lane);
    let destination = if rng.gen_bool(0.5) { demo.exit } else { demo.ring };
    let route = demo.ctx.network().plan_route(origin, destination, agent_type)?;
    window.set_route(Some(route));
    Ok(Agent {
        window,
        speed: speeds.sample(rng).max(1.0),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let demo = build_network()?;
    let car = AgentType::new(0)?;
    let mut rng = StdRng::seed_from_u64(0);
    let speeds = Normal::new(25.0, 3.0)?;

    let mut agents = (0..NUM_AGENTS)
        .map(|_| spawn(&demo, car, &mut rng, &speeds))
        .collect::<PerceptionResult<Vec<_>>>()?;
    info!("spawned {} agents", agents.len());

    println!("Simulating...");
    let start = Instant::now();
    let mut respawned = 0;
    for frame in 0..NUM_FRAMES {
        for agent in agents.iter_mut() {
            match agent.window.advance(&demo.ctx, agent.speed * DT) {
                Ok(()) => {}
                Err(PerceptionError::DeadEnd(segment)) => {
                    info!("agent reached the end of {:?}, respawning", segment);
                    *agent = spawn(&demo, car, &mut rng, &speeds)?;
                    respawned += 1;
                }
                Err(err) => {
                    warn!("failed to advance agent: {}", err);
                    *agent = spawn(&demo, car, &mut rng, &speeds)?;
                }
            }
        }

        if (frame + 1) % 100 == 0 {
            let records: usize = agents.iter().map(|agent| agent.window.len()).sum();
            println!(
                "Frame {}: {:.1} records per window, {} respawned, {} cached, {} lanes searched",
                frame + 1,
                records as f64 / agents.len() as f64,
                respawned,
                demo.ctx.compliance().cached(),
                demo.ctx.compliance().lanes_visited(),
            );
        }
    }
    println!(
        "Avg. frame: {:?} for {} agents",
        start.elapsed() / NUM_FRAMES as u32,
        agents.len()
    );
    Ok(())
}
