use rstest::*;

use super::*;
use crate::sink::HandoverKind;
use crate::topology::Topology;

#[fixture]
fn config() -> TraceConfig {
    TraceConfig {
        node_total: 2,
        unit_total: 2,
        entity_total: 20,
        access_point_total: 4,
        p_handovers: 0.1,
        p_remote: 0.2,
        p_moving_fraction: 0.2,
        tx_total: 100,
        seed: Some(4),
    }
}

#[rstest]
fn test_csv_layout(config: TraceConfig) {
    let topology = Topology::new(&config).unwrap();
    let mut sink = CsvSink::new(vec![Vec::new(), Vec::new()]);

    sink.begin(&TraceHeader::new(&config, &topology)).unwrap();
    sink.append(1, &TxRecord::Activate { entity: 18, access_point: 3 }).unwrap();
    sink.append(0, &TxRecord::Handover { entity: 18, access_point: 1, kind: HandoverKind::Fetch }).unwrap();
    sink.append(0, &TxRecord::Deactivate { entity: 18 }).unwrap();
    sink.finish().unwrap();

    let outputs: Vec<_> = sink.into_writers().into_iter().map(|w| String::from_utf8(w).unwrap()).collect();
    assert_eq!(outputs[0], "20, 4, 0.1, 0.2, 0.2\n0, 9, 0, 1\n\n2, 18, 1\n1, 18\n");
    assert_eq!(outputs[1], "20, 4, 0.1, 0.2, 0.2\n10, 19, 2, 3\n\n0, 18, 3\n");
}

#[rstest]
fn test_writer_count_mismatch(config: TraceConfig) {
    let topology = Topology::new(&config).unwrap();
    let mut sink = CsvSink::new(vec![Vec::new()]);

    let err = sink.begin(&TraceHeader::new(&config, &topology)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}
