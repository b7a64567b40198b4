use pelago::{ConfigError, DedupConfig, TopicPolicies};

#[test]
fn defaults_are_valid() {
    let config = DedupConfig::default();
    config.validate().expect("defaults must validate");
    assert!(!config.enabled);
    assert_eq!(config.snapshot_entry_interval, 1_000);
    assert_eq!(config.replicator_prefix, "pelago.repl");
}

#[test]
fn invalid_knobs_are_named_in_the_error() {
    let cases: Vec<(DedupConfig, &str)> = vec![
        (
            DedupConfig {
                snapshot_entry_interval: 0,
                ..DedupConfig::default()
            },
            "snapshot_entry_interval",
        ),
        (
            DedupConfig {
                max_producers_per_snapshot: 0,
                ..DedupConfig::default()
            },
            "max_producers_per_snapshot",
        ),
        (
            DedupConfig {
                replicator_prefix: String::new(),
                ..DedupConfig::default()
            },
            "replicator_prefix",
        ),
        (
            DedupConfig {
                max_in_flight_appends: 0,
                ..DedupConfig::default()
            },
            "max_in_flight_appends",
        ),
    ];
    for (config, expected_knob) in cases {
        match config.validate() {
            Err(ConfigError::InvalidKnob { knob, .. }) => assert_eq!(knob, expected_knob),
            Ok(()) => panic!("{expected_knob} = 0 should not validate"),
        }
    }
}

#[test]
fn partial_json_fills_defaults() {
    let config: DedupConfig =
        serde_json::from_str(r#"{"enabled": true, "snapshot_entry_interval": 50}"#)
            .expect("partial config deserializes");
    assert!(config.enabled);
    assert_eq!(config.snapshot_entry_interval, 50);
    assert_eq!(config.max_producers_per_snapshot, 10_000);
    config.validate().expect("partial config validates");
}

#[test]
fn topic_policies_override_broker_defaults() {
    let config = DedupConfig {
        enabled: false,
        snapshot_interval_seconds: 120,
        ..DedupConfig::default()
    };

    let unset = TopicPolicies::default();
    assert!(!unset.effective_enabled(&config));
    assert_eq!(unset.effective_snapshot_interval_seconds(&config), 120);

    let overridden = TopicPolicies::default()
        .with_deduplication(true)
        .with_snapshot_interval_seconds(0);
    assert!(overridden.effective_enabled(&config));
    assert_eq!(overridden.effective_snapshot_interval_seconds(&config), 0);
}

#[test]
fn inactivity_timeout_converts_to_milliseconds() {
    let config = DedupConfig {
        producer_inactivity_timeout_minutes: 3,
        ..DedupConfig::default()
    };
    assert_eq!(config.inactivity_timeout_ms(), 180_000);
}
