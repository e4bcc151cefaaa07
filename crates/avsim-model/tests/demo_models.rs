//! Every model shipped under `demos/` must load and validate.

use avsim_model::{load_model, ProgramModel};
use std::path::PathBuf;

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

#[test]
fn test_beacon_pair_loads() {
    let model = load_model(demos_dir().join("beacon_pair.yaml")).unwrap();

    assert_eq!(model.nodes.len(), 3);
    assert_eq!(model.simulation.seed, 42);
    assert_eq!(
        model.node_names().collect::<Vec<_>>(),
        vec!["beacon-a", "listener", "beacon-b"]
    );
    assert_eq!(model.nodes[2].clock.hz(), 3_686_400);
    assert!(matches!(model.nodes[0].program, ProgramModel::Beacon { data: 165, .. }));
    assert_eq!(model.start_delays(), vec![0, 1000, 2000]);
}

#[test]
fn test_all_demos_validate() {
    for entry in std::fs::read_dir(demos_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            load_model(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        }
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let err = load_model(demos_dir().join("does-not-exist.yaml")).unwrap_err();
    assert!(matches!(err, avsim_model::ModelError::Io(_)));
}
