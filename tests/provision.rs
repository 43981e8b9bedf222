// tests/provision.rs

//! End-to-end pipeline tests over the fake host controller.

mod common;

use common::{good_facts, test_env};
use drydock::pipeline::Driver;
use drydock::{Error, FakeHost, StageStatus};

fn artifact_snapshot(env: &drydock::HostEnvironment) -> Vec<(String, String)> {
    let layout = &env.layout;
    [
        &layout.app_config,
        &layout.proxy_config,
        &layout.balancer_config,
        &layout.cache_router_config,
        &layout.cron_file,
        &layout.env_profile,
    ]
    .iter()
    .map(|path| {
        (
            path.display().to_string(),
            std::fs::read_to_string(path).unwrap_or_default(),
        )
    })
    .collect()
}

#[test]
fn test_fresh_host_provisions_everything() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &["gold", "missingplugin"]);
    let mut host = FakeHost::new();

    let outcomes = Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();
    assert!(outcomes
        .iter()
        .all(|o| o.status == StageStatus::Applied));

    // Every artifact exists
    assert!(env.layout.app_config.is_file());
    assert!(env.layout.proxy_config.is_file());
    assert!(env.layout.balancer_config.is_file());
    assert!(env.layout.cron_file.is_file());
    assert!(env.layout.env_profile.is_file());
    assert!(env.layout.unit_dir.join("websockets.service").is_file());
    assert!(env.layout.registry_root.join("automoderator_q").is_file());

    // Missing plugin silently excluded from the synthesized config
    let config = std::fs::read_to_string(&env.layout.app_config).unwrap();
    assert!(config.contains("plugins = gold\n"));
    assert!(!config.contains("missingplugin"));

    // Infrastructure principals exist, one refresh per touched unit
    assert!(host.principals.contains("broker:webapp"));
    assert!(host.principals.contains("database:webapp"));
    assert_eq!(host.count_ops("reload rabbitmq-server"), 1);
}

#[test]
fn test_bootstrap_runs_once_before_any_start() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &[]);
    let mut host = FakeHost::new();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    assert_eq!(host.count_ops("run-as"), 1);
    let bootstrap = host.first_op("run-as").unwrap();
    let first_start = host.first_op("start ").unwrap();
    assert!(bootstrap < first_start);
    assert_eq!(host.count_ops("start consumer-manager"), 1);
}

#[test]
fn test_second_run_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &["gold"]);
    let mut host = FakeHost::new();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();
    let first_snapshot = artifact_snapshot(&env);
    let ops_after_first = host.ops.len();

    let outcomes = Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    // Artifacts byte-identical after the second run
    assert_eq!(artifact_snapshot(&env), first_snapshot);

    // No duplicate control actions: principals and namespaces created once
    assert_eq!(host.count_ops("create-principal broker"), 1);
    assert_eq!(host.count_ops("create-principal database"), 1);
    assert_eq!(host.count_ops("create-namespace"), 2);
    assert_eq!(host.count_ops("install-packages"), 1);
    assert_eq!(host.count_ops("clone"), 2);

    // No proxy/balancer restart on an unchanged topology
    assert_eq!(host.count_ops("restart nginx"), 1);
    assert_eq!(host.count_ops("restart haproxy"), 1);

    // Mutating stages all report Skipped on the rerun; only the read-only
    // preflight, the re-evaluated synthesis, and activation reapply.
    for outcome in &outcomes {
        let expected = matches!(
            outcome.stage,
            "preflight" | "config-synthesis" | "activate"
        );
        assert_eq!(
            outcome.status == StageStatus::Applied,
            expected,
            "unexpected status for stage {}",
            outcome.stage
        );
    }

    // The second run still confirmed bootstrap before starting workers
    let second_run_ops = &host.ops[ops_after_first..];
    let bootstrap = second_run_ops
        .iter()
        .position(|op| op.starts_with("run-as"))
        .unwrap();
    let first_start = second_run_ops
        .iter()
        .position(|op| op.starts_with("start "))
        .unwrap();
    assert!(bootstrap < first_start);
}

#[test]
fn test_operator_edits_survive_rerun() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &["gold"]);
    let mut host = FakeHost::new();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    // Operator adds a custom key and tunes a unit file
    let mut config = std::fs::read_to_string(&env.layout.app_config).unwrap();
    config.push_str("foo = bar\n");
    std::fs::write(&env.layout.app_config, &config).unwrap();
    let unit = env.layout.unit_dir.join("activity.service");
    std::fs::write(&unit, "# tuned\n").unwrap();

    // Plugin set changes on disk: gold checkout removed
    std::fs::remove_dir_all(env.source_root.join("gold")).unwrap();
    // Keep the fetch stage from recreating it
    let mut env2 = test_env(temp.path(), &[]);
    env2.plugins = vec!["gold".to_string()];

    Driver::with_facts(&env2, &mut host, good_facts())
        .run()
        .unwrap();

    let patched = std::fs::read_to_string(&env.layout.app_config).unwrap();
    assert!(patched.contains("plugins = \n"));
    assert!(patched.contains("foo = bar\n"));
    assert_eq!(std::fs::read_to_string(&unit).unwrap(), "# tuned\n");
}

#[test]
fn test_queue_defaults_do_not_clobber_operator_tuning() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &[]);
    let mut host = FakeHost::new();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    let registry = drydock::QueueRegistry::new(&env.layout.registry_root);
    registry.force_consumer_count("search_q", 5).unwrap();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();
    assert_eq!(registry.consumer_count("search_q").unwrap(), Some(5));
}

#[test]
fn test_low_memory_non_interactive_fails_deterministically() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &[]);
    let mut host = FakeHost::new();

    let mut facts = good_facts();
    facts.memory_kb = 1_500_000;

    // Tests run without a terminal on stdin, so the prompt path is never
    // taken and the check must fail outright.
    let err = Driver::with_facts(&env, &mut host, facts.clone())
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::LowMemory { .. }));
    assert!(host.ops.is_empty(), "no mutation may precede preflight");

    // The explicit override proceeds
    let mut env = test_env(temp.path(), &[]);
    env.allow_low_memory = true;
    Driver::with_facts(&env, &mut host, facts).run().unwrap();
}

#[test]
fn test_stage_failure_aborts_remaining_sequence() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &[]);
    let mut host = FakeHost::new();
    host.fail_on = Some("create-principal database".to_string());

    let err = Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::ControlAction { .. }));

    // Nothing downstream of the infrastructure stage ran
    assert!(!env.layout.app_config.exists());
    assert_eq!(host.count_ops("run-as"), 0);
    assert_eq!(host.count_ops("start "), 0);
}

#[test]
fn test_balancer_backup_preserved_on_topology_change() {
    let temp = tempfile::tempdir().unwrap();
    let env = test_env(temp.path(), &[]);
    let mut host = FakeHost::new();

    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    // Simulate a stale balancer config from an earlier release
    std::fs::write(&env.layout.balancer_config, "# old config\n").unwrap();
    Driver::with_facts(&env, &mut host, good_facts())
        .run()
        .unwrap();

    let dir = env.layout.balancer_config.parent().unwrap();
    let backups: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        std::fs::read_to_string(backups[0].path()).unwrap(),
        "# old config\n"
    );
}
