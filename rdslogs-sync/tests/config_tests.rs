use pretty_assertions::assert_eq;
use rdslogs_sync::config::{MAX_FETCH_ATTEMPTS, MIN_PART_SIZE};
use rdslogs_sync::{DestinationTarget, SyncConfig, SyncError};
use std::collections::HashMap;
use std::path::PathBuf;

fn load(vars: &[(&str, &str)]) -> Result<SyncConfig, SyncError> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SyncConfig::from_lookup(|key| map.get(key).cloned())
}

fn config_error(vars: &[(&str, &str)]) -> String {
    match load(vars) {
        Err(SyncError::Config(msg)) => msg,
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.region, "us-east-1");
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(config.run_timeout_secs, 270);
    assert_eq!(config.part_size_bytes, 8 * 1024 * 1024);
    assert_eq!(config.fetch_max_attempts, 3);
    assert!(config.rds_endpoint_override.is_none());
    assert!(config.s3_endpoint_override.is_none());
}

#[test]
fn minimal_environment() {
    let config = load(&[("DBNAME", "prod-db"), ("TARGET_BUCKET", "log-archive")]).unwrap();
    assert_eq!(config.db_instance_id, "prod-db");
    assert_eq!(
        config.destination,
        DestinationTarget::S3 {
            bucket: "log-archive".into()
        }
    );
    assert_eq!(config.key_prefix, "");
    assert_eq!(config.destination_label(), "s3://log-archive");
    assert_eq!(config.rds_base_url(), "https://rds.us-east-1.amazonaws.com");
}

#[test]
fn missing_db_name_is_rejected() {
    assert_eq!(config_error(&[("TARGET_BUCKET", "b")]), "DBNAME is not set");
}

#[test]
fn empty_db_name_counts_as_missing() {
    assert_eq!(
        config_error(&[("DBNAME", "  "), ("TARGET_BUCKET", "b")]),
        "DBNAME is not set"
    );
}

#[test]
fn missing_bucket_is_rejected() {
    assert_eq!(config_error(&[("DBNAME", "db")]), "TARGET_BUCKET is not set");
}

#[test]
fn target_dir_selects_local_destination() {
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "ignored"),
        ("TARGET_DIR", "/tmp/mirror"),
    ])
    .unwrap();
    assert_eq!(
        config.destination,
        DestinationTarget::Local {
            root: PathBuf::from("/tmp/mirror")
        }
    );
    assert_eq!(config.destination_label(), "/tmp/mirror");
}

#[test]
fn prefix_slashes_are_trimmed() {
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("TARGET_PREFIX", "/rds/prod/"),
    ])
    .unwrap();
    assert_eq!(config.key_prefix, "rds/prod");
}

#[test]
fn region_falls_back_to_default_region_variable() {
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("AWS_DEFAULT_REGION", "eu-central-1"),
    ])
    .unwrap();
    assert_eq!(config.region, "eu-central-1");
    assert_eq!(config.rds_base_url(), "https://rds.eu-central-1.amazonaws.com");

    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("AWS_REGION", "ap-south-1"),
        ("AWS_DEFAULT_REGION", "eu-central-1"),
    ])
    .unwrap();
    assert_eq!(config.region, "ap-south-1");
}

#[test]
fn endpoint_overrides() {
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("RDS_ENDPOINT_URL", "http://localhost:4566"),
        ("S3_ENDPOINT_URL", "http://localhost:9000"),
    ])
    .unwrap();
    assert_eq!(config.rds_base_url(), "http://localhost:4566");
    assert_eq!(config.s3_endpoint_override.as_deref(), Some("http://localhost:9000"));
}

#[test]
fn tunables_are_parsed() {
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("SYNC_CONCURRENCY", "8"),
        ("SYNC_TIMEOUT_SECS", " 120 "),
        ("SYNC_PART_SIZE_BYTES", "16777216"),
        ("SYNC_FETCH_ATTEMPTS", "5"),
    ])
    .unwrap();
    assert_eq!(config.max_concurrency, 8);
    assert_eq!(config.run_timeout_secs, 120);
    assert_eq!(config.part_size_bytes, 16 * 1024 * 1024);
    assert_eq!(config.fetch_max_attempts, 5);
}

#[test]
fn non_numeric_tunable_is_rejected() {
    assert_eq!(
        config_error(&[("DBNAME", "db"), ("TARGET_BUCKET", "b"), ("SYNC_CONCURRENCY", "four")]),
        "SYNC_CONCURRENCY is not a valid number: four"
    );
}

#[test]
fn zero_concurrency_is_rejected() {
    let msg = config_error(&[("DBNAME", "db"), ("TARGET_BUCKET", "b"), ("SYNC_CONCURRENCY", "0")]);
    assert!(msg.contains("SYNC_CONCURRENCY"));
}

#[test]
fn part_size_below_s3_minimum_is_rejected() {
    let too_small = (MIN_PART_SIZE - 1).to_string();
    let msg = config_error(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("SYNC_PART_SIZE_BYTES", too_small.as_str()),
    ]);
    assert!(msg.contains("SYNC_PART_SIZE_BYTES"));
}

#[test]
fn fetch_attempts_are_bounded() {
    for attempts in ["0".to_string(), (MAX_FETCH_ATTEMPTS + 1).to_string(), "4294967295".into()] {
        let msg = config_error(&[
            ("DBNAME", "db"),
            ("TARGET_BUCKET", "b"),
            ("SYNC_FETCH_ATTEMPTS", attempts.as_str()),
        ]);
        assert_eq!(msg, format!("SYNC_FETCH_ATTEMPTS must be between 1 and {MAX_FETCH_ATTEMPTS}"));
    }

    let max = MAX_FETCH_ATTEMPTS.to_string();
    let config = load(&[
        ("DBNAME", "db"),
        ("TARGET_BUCKET", "b"),
        ("SYNC_FETCH_ATTEMPTS", max.as_str()),
    ])
    .unwrap();
    assert_eq!(config.fetch_max_attempts, MAX_FETCH_ATTEMPTS);
}

#[test]
fn serialization_roundtrip() {
    let config = load(&[("DBNAME", "db"), ("TARGET_DIR", "/tmp/x")]).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains(r#""kind":"local""#));

    let back: SyncConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.destination, config.destination);
    assert_eq!(back.max_concurrency, config.max_concurrency);
}
