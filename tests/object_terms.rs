use tendril::{compile, tree};

#[test]
fn objects_without_remnant_must_be_exhausted() {
    let pattern = compile("{a: 1}").unwrap();
    assert!(pattern.matches(&tree!({"a": 1})).unwrap());
    assert!(!pattern.matches(&tree!({"a": 1, "b": 2})).unwrap());
    assert!(compile("{a: 1, %}")
        .unwrap()
        .matches(&tree!({"a": 1, "b": 2}))
        .unwrap());
}

#[test]
fn explicit_exhaustion_forms() {
    for src in ["{a: 1, $}", "{a: 1, (?!%)}"] {
        let pattern = compile(src).unwrap();
        assert!(pattern.matches(&tree!({"a": 1})).unwrap(), "{}", src);
        assert!(!pattern.matches(&tree!({"a": 1, "b": 2})).unwrap(), "{}", src);
    }
}

#[test]
fn remnant_bounds_residual_count() {
    let pattern = compile("{a: 1, %#{1,2}}").unwrap();
    assert!(!pattern.matches(&tree!({"a": 1})).unwrap());
    assert!(pattern.matches(&tree!({"a": 1, "b": 2})).unwrap());
    assert!(pattern.matches(&tree!({"a": 1, "b": 2, "c": 3})).unwrap());
    assert!(!pattern.matches(&tree!({"a": 1, "b": 2, "c": 3, "d": 4})).unwrap());
}

#[test]
fn remnant_capture_projects_leftovers_in_order() {
    let bindings = compile("{foo: 1, @rest=(%)}")
        .unwrap()
        .extract(&tree!({"bar": 2, "foo": 1, "baz": 3}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["rest"], tree!({"bar": 2, "baz": 3}));
}

#[test]
fn key_binder_enumerates_pool_in_insertion_order() {
    let all = compile("{$k: 1, %}")
        .unwrap()
        .extract_all(&tree!({"x": 1, "n": 2, "y": 1}))
        .unwrap();
    let keys: Vec<_> = all.iter().map(|b| b["k"].clone()).collect();
    assert_eq!(keys, vec![tree!("x"), tree!("y")]);
}

#[test]
fn regex_keys_select_from_the_pool() {
    let bindings = compile("{/^p/: $v, %}")
        .unwrap()
        .extract(&tree!({"x": 1, "port": 80}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["v"], tree!(80));
}

#[test]
fn keys_are_not_reusable_across_terms() {
    // Both any-key terms need a key; one key cannot serve twice.
    let pattern = compile("{$a: _, $b: _}").unwrap();
    assert!(!pattern.matches(&tree!({"only": 1})).unwrap());
    let bindings = pattern
        .extract(&tree!({"x": 1, "y": 2}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["a"], tree!("x"));
    assert_eq!(bindings["b"], tree!("y"));
}

#[test]
fn imply_checks_value_only_when_key_present() {
    let pattern = compile("{mode:> \"strict\", %}").unwrap();
    assert!(pattern.matches(&tree!({})).unwrap());
    assert!(pattern.matches(&tree!({"other": 1})).unwrap());
    assert!(pattern.matches(&tree!({"mode": "strict"})).unwrap());
    assert!(!pattern.matches(&tree!({"mode": "lax"})).unwrap());
}

#[test]
fn imply_sweeps_every_matching_key() {
    let pattern = compile("{/^flag_/:> true, %}").unwrap();
    assert!(pattern
        .matches(&tree!({"flag_a": true, "flag_b": true, "x": 0}))
        .unwrap());
    assert!(!pattern
        .matches(&tree!({"flag_a": true, "flag_b": false}))
        .unwrap());
}

#[test]
fn optional_terms_tolerate_absence_not_mismatch() {
    let pattern = compile("{a: 1?}").unwrap();
    assert!(pattern.matches(&tree!({})).unwrap());
    assert!(pattern.matches(&tree!({"a": 1})).unwrap());
    // Present with the wrong value: the key is left unconsumed and the
    // default exhaustion rejects it.
    assert!(!pattern.matches(&tree!({"a": 2})).unwrap());
}

#[test]
fn count_quantifier_selects_that_many_keys() {
    let pattern = compile("{_: _ #{2}, %}").unwrap();
    assert!(!pattern.matches(&tree!({"a": 1})).unwrap());
    assert!(pattern.matches(&tree!({"a": 1, "b": 2})).unwrap());
    assert!(pattern.matches(&tree!({"a": 1, "b": 2, "c": 3})).unwrap());

    let exhaustive = compile("{_: _ #{2}}").unwrap();
    assert!(!exhaustive.matches(&tree!({"a": 1, "b": 2, "c": 3})).unwrap());
}

#[test]
fn hash_question_makes_selection_optional() {
    let pattern = compile("{a: $x #?}").unwrap();
    assert!(pattern.matches(&tree!({})).unwrap());
    assert!(pattern.matches(&tree!({"a": 7})).unwrap());
}

#[test]
fn object_groups_share_the_pool_and_bind_projections() {
    let bindings = compile("{@creds=(user: $u, pass: _), %}")
        .unwrap()
        .extract(&tree!({"user": "root", "pass": "x", "ttl": 30}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["creds"], tree!({"user": "root", "pass": "x"}));
    assert_eq!(bindings["u"], tree!("root"));
}

#[test]
fn object_lookahead_consumes_nothing() {
    // The lookahead sees `a`, then the real term still consumes it.
    let pattern = compile("{(?= (a: $probe)), a: $x}").unwrap();
    let bindings = pattern.extract(&tree!({"a": 5})).unwrap().unwrap();
    assert_eq!(bindings["x"], tree!(5));
    // Lookahead bindings are discarded.
    assert!(!bindings.contains_key("probe"));

    let negative = compile("{(?! (admin: true)), %}").unwrap();
    assert!(negative.matches(&tree!({"admin": false})).unwrap());
    assert!(!negative.matches(&tree!({"admin": true})).unwrap());
}

#[test]
fn value_unification_across_terms() {
    let pattern = compile("{x: $v, y: $v}").unwrap();
    assert!(pattern.matches(&tree!({"x": 3, "y": 3})).unwrap());
    assert!(!pattern.matches(&tree!({"x": 3, "y": 4})).unwrap());
}

#[test]
fn key_alternation() {
    let pattern = compile("{(\"host\" | \"hostname\"): $h, %}").unwrap();
    assert_eq!(
        compile("{(\"host\" | \"hostname\"): $h, %}")
            .unwrap()
            .extract(&tree!({"hostname": "db1"}))
            .unwrap()
            .unwrap()["h"],
        tree!("db1")
    );
    assert!(pattern.matches(&tree!({"host": "db2"})).unwrap());
}
