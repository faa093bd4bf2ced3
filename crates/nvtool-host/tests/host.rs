use nvtool_bag::{BagError, NvBag, NvValue};
use nvtool_host::{FatalPolicy, HostError, ScriptHost};

fn run(fragments: &[&str]) -> Result<NvBag, HostError> {
    let mut host = ScriptHost::new(NvBag::new())?;
    let owned: Vec<String> = fragments.iter().map(|s| s.to_string()).collect();
    host.run_scripts(&owned, FatalPolicy::Propagate)?;
    host.into_bag()
}

#[test]
fn bridge_calls_build_entries_in_call_order() {
    let bag = run(&[
        r#"nvlist_add_string(nvl, "host", "alpha");"#,
        r#"nvlist_add_string(nvl, "zone", "global");"#,
    ])
    .expect("run ok");

    let entries: Vec<(&str, &NvValue)> = bag.iter().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "host");
    assert_eq!(entries[0].1, &NvValue::String("alpha".to_string()));
    assert_eq!(entries[1].0, "zone");
    assert_eq!(entries[1].1, &NvValue::String("global".to_string()));
}

#[test]
fn fragments_share_one_scope() {
    let bag = run(&[
        r#"let name = "alpha";"#,
        r#"nvlist_add_string(nvl, "host", name);"#,
    ])
    .expect("run ok");
    assert_eq!(bag.get("host"), Some(&NvValue::String("alpha".to_string())));
}

#[test]
fn preloaded_bag_survives_and_scripts_append() {
    let mut seed = NvBag::new();
    seed.add_string("class", "fault.cpu").unwrap();

    let mut host = ScriptHost::new(seed).expect("host");
    host.run_scripts(
        &[r#"nvlist_add_string(nvl, "host", "alpha");"#.to_string()],
        FatalPolicy::Propagate,
    )
    .expect("run ok");
    let bag = host.into_bag().expect("bag back");

    let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["class", "host"]);
}

#[test]
fn duplicate_key_is_fatal() {
    let err = run(&[
        r#"nvlist_add_string(nvl, "host", "alpha");"#,
        r#"nvlist_add_string(nvl, "host", "beta");"#,
    ])
    .unwrap_err();
    match err {
        HostError::Fatal {
            source: BagError::DuplicateKey { key },
        } => assert_eq!(key, "host"),
        other => panic!("expected fatal duplicate-key error, got {other}"),
    }
}

#[test]
fn duplicate_key_is_fatal_even_when_the_script_catches_it() {
    let mut host = ScriptHost::new(NvBag::new()).expect("host");
    let err = host
        .run_scripts(
            &[r#"
                nvlist_add_string(nvl, "host", "alpha");
                try {
                    nvlist_add_string(nvl, "host", "beta");
                } catch (e) {
                    nvlist_add_string(nvl, "caught", "yes");
                }
            "#
            .to_string()],
            FatalPolicy::Propagate,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::Fatal {
            source: BagError::DuplicateKey { .. }
        }
    ));
}

#[test]
fn no_fragment_runs_after_a_fatal_error() {
    let mut host = ScriptHost::new(NvBag::new()).expect("host");
    let err = host
        .run_scripts(
            &[
                r#"nvlist_add_string(nvl, "host", "alpha");"#.to_string(),
                r#"nvlist_add_string(nvl, "host", "beta");"#.to_string(),
                r#"nvlist_add_string(nvl, "late", "never");"#.to_string(),
            ],
            FatalPolicy::Propagate,
        )
        .unwrap_err();
    assert!(matches!(err, HostError::Fatal { .. }));

    let bag = host.into_bag().expect("bag back");
    assert_eq!(bag.get("host"), Some(&NvValue::String("alpha".to_string())));
    assert!(bag.get("late").is_none());
}

#[test]
fn wrong_argument_kind_is_an_uncaught_script_error() {
    let err = run(&[r#"nvlist_add_string(nvl, 42, "alpha");"#]).unwrap_err();
    assert!(matches!(err, HostError::Script { .. }), "got {err}");
}

#[test]
fn wrong_argument_kind_is_catchable_by_the_script() {
    let bag = run(&[r#"
        try {
            nvlist_add_string(nvl, 42, "alpha");
        } catch (e) {
            nvlist_add_string(nvl, "recovered", "yes");
        }
        nvlist_add_string(nvl, "host", "alpha");
    "#])
    .expect("caught type error must not end the run");
    assert_eq!(
        bag.get("recovered"),
        Some(&NvValue::String("yes".to_string()))
    );
    assert_eq!(bag.get("host"), Some(&NvValue::String("alpha".to_string())));
}

#[test]
fn stale_handle_is_a_script_error_not_fatal() {
    let err = run(&[r#"nvlist_add_string(12345, "host", "alpha");"#]).unwrap_err();
    assert!(matches!(err, HostError::Script { .. }));

    // Same failure wrapped in a handler: the run continues.
    let bag = run(&[r#"
        try {
            nvlist_add_string(12345, "host", "alpha");
        } catch (e) {
            nvlist_add_string(nvl, "recovered", "yes");
        }
    "#])
    .expect("run ok");
    assert_eq!(
        bag.get("recovered"),
        Some(&NvValue::String("yes".to_string()))
    );
    assert!(bag.get("host").is_none());
}

#[test]
fn uncaught_script_error_stops_later_fragments() {
    let mut host = ScriptHost::new(NvBag::new()).expect("host");
    let err = host
        .run_scripts(
            &[
                r#"this_function_does_not_exist();"#.to_string(),
                r#"nvlist_add_string(nvl, "late", "never");"#.to_string(),
            ],
            FatalPolicy::Propagate,
        )
        .unwrap_err();
    assert!(matches!(err, HostError::Script { .. }));

    let bag = host.into_bag().expect("bag back");
    assert!(bag.is_empty());
}

#[test]
fn empty_run_yields_the_bag_unchanged() {
    let bag = run(&[]).expect("run ok");
    assert!(bag.is_empty());
}
