use std::io;

use assertables::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::*;
use tracing_test::traced_test;

use super::*;
use crate::sink::MemorySink;

/// Keeps the global emission order, which per-unit streams lose.
#[derive(Default)]
struct OrderedSink {
    units: usize,
    events: Vec<(UnitId, TxRecord)>,
}

impl TraceSink for OrderedSink {
    fn begin(&mut self, header: &TraceHeader) -> io::Result<()> {
        self.units = header.units.len();
        Ok(())
    }

    fn append(&mut self, unit: UnitId, record: &TxRecord) -> io::Result<()> {
        self.events.push((unit, *record));
        Ok(())
    }
}

struct FailingSink;

impl TraceSink for FailingSink {
    fn begin(&mut self, _: &TraceHeader) -> io::Result<()> {
        Ok(())
    }

    fn append(&mut self, _: UnitId, _: &TxRecord) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[derive(Clone, Copy)]
struct Replayed {
    active: bool,
    home_unit: UnitId,
    access_point: Option<usize>,
}

/// Re-apply a trace record by record, checking every transition is legal, and return the final states.
fn replay(topology: &Topology, events: &[(UnitId, TxRecord)]) -> Vec<Replayed> {
    let mut states: Vec<_> = (0..topology.entity_total())
        .map(|id| Replayed { active: false, home_unit: topology.native_unit(id), access_point: None })
        .collect();

    for &(unit, record) in events {
        let state = &mut states[record.entity()];
        match record {
            TxRecord::Activate { entity, access_point } => {
                assert!(!state.active, "double activation of {entity}");
                assert_eq!(state.home_unit, unit);
                if let Some(previous) = state.access_point {
                    assert_eq!(previous, access_point, "{entity} reactivated somewhere else");
                }
                assert!(topology.access_point_range(unit).contains(&access_point));
                state.active = true;
                state.access_point = Some(access_point);
            },
            TxRecord::Deactivate { entity } => {
                assert!(state.active, "deactivation of inactive {entity}");
                assert_eq!(state.home_unit, unit);
                state.active = false;
            },
            TxRecord::Handover { entity, access_point, kind } => {
                assert!(state.active, "handover of inactive {entity}");
                assert!(topology.access_point_range(unit).contains(&access_point));
                assert_ne!(state.access_point, Some(access_point), "{entity} handed over to where it already is");
                match kind {
                    HandoverKind::Local => {
                        assert_eq!(state.home_unit, unit);
                    },
                    HandoverKind::Fetch => {
                        assert!(topology.is_movable(entity));
                        assert_eq!(state.home_unit, topology.native_unit(entity), "{entity} fetched while away");
                        assert_eq!(topology.next_unit(unit), topology.native_unit(entity));
                        assert_eq!(access_point, topology.fetch_destination(entity));
                    },
                    HandoverKind::Return => {
                        assert!(topology.is_movable(entity));
                        assert_ne!(state.home_unit, unit, "{entity} returned while at home");
                        assert_eq!(topology.native_unit(entity), unit);
                        assert_eq!(access_point, topology.preset_access_point(entity));
                    },
                }
                state.home_unit = unit;
                state.access_point = Some(access_point);
            },
        }
    }
    states
}

fn config(unit_total: usize, node_total: usize, tx_total: usize) -> TraceConfig {
    TraceConfig {
        node_total,
        unit_total,
        entity_total: 100 * unit_total,
        access_point_total: 10 * unit_total,
        p_handovers: 0.1,
        p_remote: 0.2,
        p_moving_fraction: 0.05,
        tx_total,
        seed: None,
    }
}

#[fixture]
fn scenario() -> TraceConfig {
    config(3, 3, 5000)
}

#[rstest]
fn test_reference_scenario(scenario: TraceConfig) {
    let topology = Topology::new(&scenario).unwrap();
    let mut sink = MemorySink::default();
    let mut generator =
        TraceGenerator::new(&topology, &scenario, StdRng::seed_from_u64(1), &mut sink).with_invariant_checks(true);

    let stats = generator.run().unwrap();
    let store = generator.store();
    assert_eq!(store.active_len(), 0);
    assert_eq!(store.movable_active_len(), 0);
    assert_eq!(store.displaced_count(), 0);
    for id in 0..300 {
        assert!(!store.entity(id).active);
        assert_eq!(store.entity(id).home_unit, topology.native_unit(id));
    }

    assert_eq!(stats.total(), 5000);
    assert_eq!(sink.len(), 5000);
    assert_eq!(sink.units.len(), 3);
    for unit in 0..3 {
        let records = sink.records(unit);
        assert!(!records.is_empty());

        let preset: Vec<_> = topology
            .movable_range(unit)
            .map(|entity| TxRecord::Activate { entity, access_point: topology.preset_access_point(entity) })
            .collect();
        assert_eq!(preset.len(), 5);
        assert_eq!(&records[..5], preset.as_slice());
    }
}

#[rstest]
#[case::one_unit_per_node(config(3, 3, 5000), 3)]
#[case::two_units_per_node(config(6, 2, 8000), 5)]
#[case::four_nodes(config(8, 4, 20000), 11)]
#[case::no_movers(TraceConfig { p_moving_fraction: 0.0, ..config(2, 1, 3000) }, 2)]
#[case::remote_heavy(TraceConfig { p_handovers: 0.5, p_remote: 0.9, ..config(4, 4, 6000) }, 9)]
fn test_closure_and_legality(#[case] cfg: TraceConfig, #[case] seed: u64) {
    let topology = Topology::new(&cfg).unwrap();
    let mut generator = TraceGenerator::new(&topology, &cfg, StdRng::seed_from_u64(seed), OrderedSink::default())
        .with_invariant_checks(true);
    generator.run().unwrap();
    let sink = generator.into_sink();

    assert_eq!(sink.events.len(), cfg.tx_total);
    assert_eq!(sink.units, cfg.unit_total);

    let finals = replay(&topology, &sink.events);
    for (id, state) in finals.iter().enumerate() {
        assert!(!state.active, "{id} still active");
        assert_eq!(state.home_unit, topology.native_unit(id));
    }
}

#[rstest]
fn test_exact_length_under_tight_budgets(#[values(9, 10, 11, 13, 20, 50)] tx_total: usize) {
    let cfg = TraceConfig {
        node_total: 2,
        unit_total: 2,
        entity_total: 20,
        access_point_total: 4,
        p_handovers: 0.4,
        p_remote: 0.5,
        p_moving_fraction: 0.2,
        tx_total,
        seed: None,
    };
    let topology = Topology::new(&cfg).unwrap();

    for seed in 0..30 {
        let mut generator =
            TraceGenerator::new(&topology, &cfg, StdRng::seed_from_u64(seed), OrderedSink::default());
        generator.run().unwrap();
        let sink = generator.into_sink();

        assert_eq!(sink.events.len(), tx_total, "seed {seed}");
        assert!(replay(&topology, &sink.events).iter().all(|s| !s.active));
    }
}

#[rstest]
fn test_cleanup_order(scenario: TraceConfig) {
    let topology = Topology::new(&scenario).unwrap();
    let mut generator =
        TraceGenerator::new(&topology, &scenario, StdRng::seed_from_u64(5), OrderedSink::default());
    let stats = generator.run().unwrap();
    let events = generator.into_sink().events;

    // the tail is: restorations, then movable deactivations in id order, then local deactivations
    let movable: Vec<_> = (0..3).flat_map(|unit| topology.movable_range(unit)).collect();
    let locals_left = events
        .iter()
        .rev()
        .take_while(|(_, r)| matches!(r, TxRecord::Deactivate { entity } if !topology.is_movable(*entity)))
        .count();
    let tail_start = events.len() - locals_left - movable.len();
    let deactivated: Vec<_> = events[tail_start..events.len() - locals_left].iter().map(|(_, r)| *r).collect();
    let expected: Vec<_> = movable.iter().map(|&entity| TxRecord::Deactivate { entity }).collect();
    assert_eq!(deactivated, expected);

    let restorations = &events[tail_start - stats.restorations..tail_start];
    assert!(restorations
        .iter()
        .all(|(_, r)| matches!(r, TxRecord::Handover { kind: HandoverKind::Return, .. })));
}

#[rstest]
fn test_fetches_and_returns_balance_per_unit(scenario: TraceConfig) {
    let topology = Topology::new(&scenario).unwrap();

    for seed in 0..50 {
        let mut generator =
            TraceGenerator::new(&topology, &scenario, StdRng::seed_from_u64(seed), OrderedSink::default());
        generator.run().unwrap();
        let events = generator.into_sink().events;

        // running balance of each unit's entities: fetched out minus returned home
        let mut away = vec![0i64; scenario.unit_total];
        for (_, record) in &events {
            let TxRecord::Handover { entity, kind, .. } = *record else { continue };
            let native = topology.native_unit(entity);
            match kind {
                HandoverKind::Fetch => away[native] += 1,
                HandoverKind::Return => away[native] -= 1,
                HandoverKind::Local => continue,
            }
            assert!((0..=5).contains(&away[native]), "seed {seed}: unit {native} balance {}", away[native]);
        }
        assert!(away.iter().all(|&n| n == 0), "seed {seed}: {away:?}");
        replay(&topology, &events);
    }
}

#[rstest]
fn test_forced_handover_falls_back_to_movable(scenario: TraceConfig) {
    let topology = Topology::new(&scenario).unwrap();
    let mut generator =
        TraceGenerator::new(&topology, &scenario, StdRng::seed_from_u64(8), OrderedSink::default());
    generator.preset().unwrap();
    assert_eq!(generator.store().active_len(), 0);

    generator.forced_local_handover().unwrap();
    assert_eq!(generator.stats().local_handovers, 1);
    assert_eq!(generator.store().displaced_count(), 0);

    let events = generator.into_sink().events;
    let (unit, record) = events.last().copied().unwrap();
    let TxRecord::Handover { entity, access_point, kind: HandoverKind::Local } = record else {
        panic!("expected a local handover, got {record:?}");
    };
    assert!(topology.is_movable(entity));
    assert_eq!(unit, topology.native_unit(entity));
    assert_ne!(access_point, topology.preset_access_point(entity));
    replay(&topology, &events);
}

#[rstest]
fn test_rate_conformance() {
    let cfg = TraceConfig { entity_total: 4000, access_point_total: 80, ..config(4, 4, 200_000) };
    let stats = generate(&TraceConfig { seed: Some(3), ..cfg }, MemorySink::default()).unwrap();

    assert_eq!(stats.total(), 200_000);
    assert_le!(stats.handover_ratio(), 0.1 * 1.02);
    assert_ge!(stats.handover_ratio(), 0.1 * 0.95);
    assert_in_delta!(stats.remote_ratio(), 0.2, 0.02);
    assert_le!(stats.remote_handovers() - stats.restorations, 4000);
}

#[rstest]
fn test_same_seed_same_trace(scenario: TraceConfig) {
    let cfg = TraceConfig { seed: Some(11), ..scenario };

    let mut first = MemorySink::default();
    let mut second = MemorySink::default();
    generate(&cfg, &mut first).unwrap();
    generate(&cfg, &mut second).unwrap();
    assert_eq!(first.units, second.units);

    let mut third = MemorySink::default();
    generate(&TraceConfig { seed: Some(12), ..cfg }, &mut third).unwrap();
    assert_ne!(first.units, third.units);
}

#[rstest]
fn test_config_error_before_any_record(scenario: TraceConfig) {
    let mut sink = MemorySink::default();
    let err = generate(&TraceConfig { access_point_total: 3, ..scenario }, &mut sink).unwrap_err();

    assert!(matches!(err, GenError::Config(_)));
    assert!(sink.header.is_none());
    assert!(sink.is_empty());
}

#[rstest]
fn test_sink_failure_aborts(scenario: TraceConfig) {
    let err = generate(&TraceConfig { seed: Some(1), ..scenario }, FailingSink).unwrap_err();
    assert!(matches!(err, GenError::Sink(_)));
}

#[rstest]
#[traced_test]
fn test_logs_summary(scenario: TraceConfig) {
    generate(&TraceConfig { seed: Some(2), ..scenario }, MemorySink::default()).unwrap();
    assert!(logs_contain("trace generation complete"));
}
