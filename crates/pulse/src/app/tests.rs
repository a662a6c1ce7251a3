use super::*;

#[test]
fn test_cli_build() {
    let app = build_cli();
    assert_eq!(app.get_name(), "pulse");
}

#[test]
fn test_cli_watch_defaults_to_pools_default() {
    let app = build_cli();
    let matches = app.try_get_matches_from(vec!["pulse", "watch"]).unwrap();
    let watch = matches.subcommand_matches("watch").unwrap();

    assert_eq!(watch.get_one::<String>("path").unwrap(), "/pools/default");
    assert!(watch.get_one::<u64>("interval-ms").is_none());
    assert!(!watch.get_flag("once"));
}

#[test]
fn test_cli_watch_with_options() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec![
            "pulse",
            "watch",
            "/pools/default/tasks",
            "--interval-ms",
            "1500",
            "--json",
        ])
        .unwrap();
    let watch = matches.subcommand_matches("watch").unwrap();

    assert_eq!(
        watch.get_one::<String>("path").unwrap(),
        "/pools/default/tasks"
    );
    assert_eq!(watch.get_one::<u64>("interval-ms"), Some(&1500));
    assert!(watch.get_flag("json"));
}

#[test]
fn test_cli_watch_long_poll_conflicts_with_interval() {
    let app = build_cli();
    let result = app.try_get_matches_from(vec![
        "pulse",
        "watch",
        "--long-poll",
        "--interval-ms",
        "1000",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_cli_watch_rejects_non_numeric_interval() {
    let app = build_cli();
    let result = app.try_get_matches_from(vec!["pulse", "watch", "--interval-ms", "soon"]);
    assert!(result.is_err());
}

#[test]
fn test_cli_compact_collects_buckets() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec!["pulse", "compact", "beer-sample", "travel-sample"])
        .unwrap();
    let compact = matches.subcommand_matches("compact").unwrap();
    let buckets: Vec<&String> = compact.get_many::<String>("bucket").unwrap().collect();

    assert_eq!(buckets, vec!["beer-sample", "travel-sample"]);
}

#[test]
fn test_cli_compact_requires_bucket() {
    let app = build_cli();
    let result = app.try_get_matches_from(vec!["pulse", "compact"]);
    assert!(result.is_err());
}

#[test]
fn test_cli_global_flags_reach_subcommands() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec![
            "pulse",
            "config",
            "--base-url",
            "http://node-a:8091",
            "-u",
            "Administrator",
            "-v",
        ])
        .unwrap();
    let config = matches.subcommand_matches("config").unwrap();

    assert_eq!(
        config.get_one::<String>("base-url").unwrap(),
        "http://node-a:8091"
    );
    assert_eq!(config.get_one::<String>("username").unwrap(), "Administrator");
    assert!(matches.get_flag("verbose"));
}

#[test]
fn test_cli_requires_subcommand() {
    let app = build_cli();
    assert!(app.try_get_matches_from(vec!["pulse"]).is_err());
}
