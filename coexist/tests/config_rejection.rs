mod common;

use serde_json::json;

use coexist::config::{OPTIONS, SCHEMA_VERSION};
use coexist::io::{ContactMatrix, CsvDataDir, DataProvider, StaticData};
use coexist::{Axis, ConfigError, EngineError, ModelParams, Scenario};

#[test]
fn defaults_pass_their_own_checks() {
    ModelParams::default().check().expect("defaults are valid");
    StaticData::england().0.validate(9).expect("england data is valid");
}

#[test]
fn every_option_is_documented() {
    let value = serde_json::to_value(ModelParams::default()).expect("serialize");
    let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
    assert_eq!(keys.len(), OPTIONS.len());
    for k in keys {
        assert!(OPTIONS.iter().any(|o| o.name == k), "undocumented option {k}");
    }
}

#[test]
fn partial_options_keep_defaults() {
    let params = ModelParams::from_json(&json!({
        "total_days": 10,
        "quarantine": { "social_distancing_start": "2020-03-23" }
    }))
    .expect("valid options");
    assert_eq!(params.total_days, 10);
    assert_eq!(params.dims, ModelParams::default().dims);
    assert_eq!(
        params.quarantine.social_distancing_start.map(|d| d.to_string()),
        Some("2020-03-23".to_string())
    );
}

#[test]
fn unknown_option_is_rejected() {
    let err = ModelParams::from_json(&json!({ "total_dayz": 10 })).unwrap_err();
    match err {
        ConfigError::UnknownOption { name, known } => {
            assert_eq!(name, "total_dayz");
            assert!(known.contains("total_days"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn unknown_nested_option_is_rejected() {
    let err = ModelParams::from_json(&json!({ "integrator": { "max_step": 1.0 } })).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{err:?}");
}

#[test]
fn wrong_schema_version_is_rejected() {
    let err = ModelParams::from_json(&json!({ "schema_version": SCHEMA_VERSION + 1 })).unwrap_err();
    assert_eq!(
        err,
        ConfigError::SchemaVersion {
            expected: SCHEMA_VERSION,
            found: SCHEMA_VERSION + 1
        }
    );
}

#[test]
fn stage_vector_of_wrong_length_is_rejected() {
    let err = ModelParams::from_json(&json!({
        "infection": { "transmission_by_stage": [0.1, 0.2] }
    }))
    .unwrap_err();
    match err {
        ConfigError::AxisMismatch {
            axis,
            expected,
            actual,
            ..
        } => {
            assert_eq!(axis, Axis::Health);
            assert_eq!(expected, 4);
            assert_eq!(actual, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn last_stage_cannot_progress_forward() {
    let mut params = ModelParams::default();
    params.progression.forward_by_stage = vec![0.3, 0.1, 0.1, 0.1];
    assert!(matches!(
        params.check(),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn age_data_of_wrong_length_is_rejected() {
    let mut data = StaticData::england().0;
    data.staff_ratio.pop();
    let err = Scenario::new(ModelParams::default(), &data).err().expect("must fail");
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::AxisMismatch {
            axis: Axis::Age,
            expected: 9,
            actual: 8,
            ..
        })
    ));
}

#[test]
fn asymmetric_contact_matrix_is_rejected() {
    let err = ContactMatrix::new(vec![vec![1.0, 2.0], vec![3.0, 1.0]]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::AsymmetricContact { row: 0, col: 1, .. }
    ));

    let parsed: Result<ContactMatrix, _> = serde_json::from_value(json!([[1.0, 2.0], [3.0, 1.0]]));
    assert!(parsed.is_err());
}

#[test]
fn symmetrizing_is_explicit() {
    let m = ContactMatrix::symmetrized("survey", vec![vec![1.0, 2.0], vec![3.0, 1.0]])
        .expect("square input");
    assert_eq!(m.get(0, 1), 2.5);
    assert_eq!(m.get(1, 0), 2.5);
    assert!(ContactMatrix::new(m.rows().to_vec()).is_ok());
}

#[test]
fn seeding_more_than_available_fails() {
    let mut params = ModelParams::neutral(common::toy_dims());
    params.initial_exposed = vec![150.0, 0.0];
    let err = Scenario::new(params, &common::toy_data(vec![100.0, 100.0]))
        .err()
        .expect("must fail");
    assert!(matches!(
        err,
        EngineError::InsufficientSusceptibles { age: 0, .. }
    ));
}

fn write(dir: &std::path::Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).expect("write csv");
}

fn write_inputs(dir: &std::path::Path, baseline: &str) {
    write(dir, "population.csv", "age_group,pop\n0-39,1000\n40+,500\n");
    write(
        dir,
        "age_rates.csv",
        "age_group,hospital_admission_rate,hospital_discharge_rate,staff_ratio,relative_death_risk,relative_admission_risk\n\
         0-39,0.001,0.25,0.02,-0.5,-0.5\n\
         40+,0.002,0.2,0.01,1.0,1.0\n",
    );
    write(dir, "contact_baseline.csv", baseline);
    write(dir, "contact_distancing.csv", "a,b\n1,0.5\n0.5,1\n");
}

#[test]
fn csv_inputs_load_and_validate() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_inputs(tmp.path(), "a,b\n4,2\n2,3\n");
    let data = CsvDataDir::new(tmp.path()).load().expect("load");
    assert_eq!(data.age_population, vec![1000.0, 500.0]);
    assert_eq!(data.contact_baseline.get(0, 1), 2.0);
    assert_eq!(data.relative_recovery_speed, vec![0.0, 0.0]);
    assert!(data.contact_isolation.is_none());
}

#[test]
fn asymmetric_csv_contacts_need_opt_in() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_inputs(tmp.path(), "a,b\n4,2\n1,3\n");
    assert!(CsvDataDir::new(tmp.path()).load().is_err());

    let provider = CsvDataDir {
        symmetrize: true,
        ..CsvDataDir::new(tmp.path())
    };
    let data = provider.load().expect("symmetrized load");
    assert_eq!(data.contact_baseline.get(1, 0), 1.5);
}
