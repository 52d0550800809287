use std::collections::BTreeMap;

use simgrid_engine::{
    Action, Condition, Environment, Firing, Molecule, NeighborhoodRule, Reaction, RunControl,
    SimpleReaction, Simulation, SimulationSnapshot, SimulationSpec, Termination,
    TerminationReason, TimeDistribution,
};

fn gossip_spec() -> SimulationSpec {
    serde_json::from_value(serde_json::json!({
        "dimensions": 2,
        "neighborhood": {"type": "connect_within_distance", "range": 0.6},
        "deployments": [
            {
                "shape": {"type": "circle", "count": 40, "center": [0.0, 0.0], "radius": 2.0, "seed": 3},
                "molecules": {"token": 4.0}
            }
        ],
        "reactions": [
            {
                "name": "spread",
                "conditions": [{"type": "molecule_at_least", "molecule": "token", "amount": 1.0}],
                "actions": [{"type": "send_to_neighbors", "molecule": "token", "amount": 0.01}],
                "distribution": {"type": "exponential", "rate": 1.0}
            },
            {
                "name": "wander",
                "actions": [{"type": "move_by", "delta": [0.05, -0.02]}],
                "distribution": {"type": "exponential", "rate": 0.5}
            }
        ]
    }))
    .unwrap()
}

fn run_trace(seed: u64, steps: u64) -> Vec<Firing> {
    let mut sim = gossip_spec()
        .build(seed, Termination::after_steps(steps))
        .unwrap()
        .with_trace(true);
    sim.run(&RunControl::default()).unwrap().firings
}

#[test]
fn test_same_seed_same_firing_sequence() {
    let first = run_trace(11, 500);
    let second = run_trace(11, 500);
    assert_eq!(first.len(), 500);
    assert_eq!(first, second);
}

#[test]
fn test_different_seeds_differ() {
    assert_ne!(run_trace(11, 200), run_trace(12, 200));
}

#[test]
fn test_firings_ordered_in_time() {
    let trace = run_trace(5, 400);
    assert!(trace.windows(2).all(|w| w[0].time <= w[1].time));
    assert!(trace.windows(2).all(|w| w[0].step + 1 == w[1].step));
}

#[test]
fn test_snapshot_resumes_identical_schedule() {
    let spec = gossip_spec();
    let mut uninterrupted = spec
        .build(21, Termination::after_steps(300))
        .unwrap()
        .with_trace(true);
    let full = uninterrupted.run(&RunControl::default()).unwrap().firings;

    let mut first_half = spec
        .build(21, Termination::after_steps(150))
        .unwrap()
        .with_trace(true);
    let head = first_half.run(&RunControl::default()).unwrap().firings;

    let bytes = first_half.snapshot().encode().unwrap();
    let snapshot = SimulationSnapshot::decode(&bytes).unwrap();
    let (_, placed) = spec.build_environment().unwrap();
    let reactions = spec.build_reactions(&placed).unwrap();
    let mut resumed = Simulation::restore(snapshot, reactions, Termination::after_steps(300))
        .unwrap()
        .with_trace(true);
    let tail = resumed.run(&RunControl::default()).unwrap().firings;

    let mut stitched = head;
    stitched.extend(tail);
    assert_eq!(stitched, full);
    assert_eq!(resumed.environment(), uninterrupted.environment());
}

#[test]
fn test_snapshot_with_mismatched_reactions_rejected() {
    let spec = gossip_spec();
    let sim = spec.build(1, Termination::after_steps(10)).unwrap();
    let snapshot = sim.snapshot();
    assert!(Simulation::restore(snapshot, Vec::new(), Termination::default()).is_err());
}

/// 行走节点进入范围后, 依赖邻域的反应被重新调度
#[test]
fn test_neighborhood_change_reschedules_dependents() {
    let mut env = Environment::with_rule(1, NeighborhoodRule::ConnectWithinDistance { range: 1.0 });
    let beacon = env
        .add_node(
            env.make_position(&[0.0]).unwrap(),
            BTreeMap::from([(Molecule::from("signal"), 1.0)]),
        )
        .unwrap();
    let walker = env
        .add_node(env.make_position(&[3.5]).unwrap(), BTreeMap::new())
        .unwrap();

    let reactions: Vec<Box<dyn Reaction>> = vec![
        Box::new(
            SimpleReaction::new("approach", walker, TimeDistribution::DiracComb { period: 1.0 })
                .when(Condition::MoleculeBelow {
                    molecule: "heard".into(),
                    amount: 1.0,
                })
                .then(Action::MoveBy { delta: vec![-1.0] }),
        ),
        Box::new(
            SimpleReaction::new("listen", walker, TimeDistribution::DiracComb { period: 0.25 })
                .when(Condition::NeighborHas {
                    molecule: "signal".into(),
                    amount: 1.0,
                })
                .when(Condition::MoleculeBelow {
                    molecule: "heard".into(),
                    amount: 1.0,
                })
                .then(Action::Set {
                    molecule: "heard".into(),
                    value: 1.0,
                }),
        ),
    ];

    let mut sim = Simulation::new(env, reactions, 0, Termination::at_time(10.0))
        .unwrap()
        .with_trace(true);
    let outcome = sim.run(&RunControl::default()).unwrap();

    // 第3次移动后 walker 位于 x=0.5, 进入 beacon 范围
    let names: Vec<usize> = outcome.firings.iter().map(|f| f.reaction).collect();
    assert_eq!(names, vec![0, 0, 0, 1]);
    assert_eq!(outcome.firings[3].time.as_f64(), 3.25);
    assert_eq!(outcome.reason, TerminationReason::Exhausted);
    assert_eq!(
        sim.environment().concentration(walker, &Molecule::from("heard")),
        1.0
    );
    assert!(sim.environment().neighbors(beacon).unwrap().contains(&walker));
}
