use tendril::{compile, tree};

#[test]
fn literal_atoms_match_same_value_zero() {
    assert!(compile("42").unwrap().matches(&tree!(42)).unwrap());
    assert!(!compile("42").unwrap().matches(&tree!(43)).unwrap());
    assert!(compile("true").unwrap().matches(&tree!(true)).unwrap());
    assert!(compile("null").unwrap().matches(&tree!(null)).unwrap());
    assert!(compile("\"hi\"").unwrap().matches(&tree!("hi")).unwrap());
    assert!(!compile("\"hi\"").unwrap().matches(&tree!("ho")).unwrap());
    assert!(compile("_").unwrap().matches(&tree!({"any": [1]})).unwrap());
}

#[test]
fn negative_zero_equals_zero() {
    assert!(compile("0").unwrap().matches(&tree!(-0.0)).unwrap());
}

#[test]
fn extract_named_field() {
    let bindings = compile("{ name: $x }")
        .unwrap()
        .extract(&tree!({"name": "Alice"}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!("Alice"));
}

#[test]
fn repeated_variable_must_unify() {
    let pattern = compile("[$a, $a]").unwrap();
    assert!(pattern.matches(&tree!([3, 3])).unwrap());
    assert!(!pattern.matches(&tree!([3, 4])).unwrap());
}

#[test]
fn unification_is_deep_for_composites() {
    let pattern = compile("[$a, $a]").unwrap();
    assert!(pattern.matches(&tree!([{"k": [1]}, {"k": [1]}])).unwrap());
    assert!(!pattern.matches(&tree!([{"k": [1]}, {"k": [2]}])).unwrap());
}

#[test]
fn regex_binder_scans_within_spreads() {
    let all = compile("[.., $p=(/^p/), ..]")
        .unwrap()
        .extract_all(&tree!(["x", "port", "z"]))
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["p"], tree!("port"));
}

#[test]
fn deep_key_search_extracts_nested_value() {
    let bindings = compile("{..password: $x}")
        .unwrap()
        .extract(&tree!({"a": {"b": {"password": "hunter2"}}}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!("hunter2"));
}

#[test]
fn greedy_plus_binds_whole_span() {
    let all = compile("[$a+]").unwrap().extract_all(&tree!([1, 2, 3])).unwrap();
    assert_eq!(all[0]["a"], tree!([1, 2, 3]));
}

#[test]
fn alternation_tries_left_to_right() {
    let pattern = compile("1 | 2 | 3").unwrap();
    assert!(pattern.matches(&tree!(2)).unwrap());
    assert!(!pattern.matches(&tree!(4)).unwrap());

    let bound = compile("$x=(1 | \"one\")").unwrap();
    assert!(bound.matches(&tree!("one")).unwrap());
    assert!(bound.matches(&tree!(1)).unwrap());
    assert!(!bound.matches(&tree!("two")).unwrap());
}

#[test]
fn nested_containers_match_structurally() {
    let pattern = compile("{servers: [{host: $h, port: $p}, ..], %}").unwrap();
    let tree = tree!({
        "servers": [{"host": "a", "port": 80}, {"host": "b", "port": 81}],
        "extra": true
    });
    let bindings = pattern.extract(&tree).unwrap().unwrap();
    assert_eq!(bindings["h"], tree!("a"));
    assert_eq!(bindings["p"], tree!(80));
}

#[test]
fn empty_containers() {
    assert!(compile("[]").unwrap().matches(&tree!([])).unwrap());
    assert!(!compile("[]").unwrap().matches(&tree!([1])).unwrap());
    assert!(compile("{}").unwrap().matches(&tree!({})).unwrap());
    assert!(!compile("{}").unwrap().matches(&tree!({"a": 1})).unwrap());
    assert!(compile("{%}").unwrap().matches(&tree!({"a": 1})).unwrap());
}

#[test]
fn extract_returns_none_on_mismatch() {
    assert!(compile("{a: 1}")
        .unwrap()
        .extract(&tree!({"a": 2}))
        .unwrap()
        .is_none());
}

#[test]
fn lookahead_is_a_zero_width_predicate() {
    let pattern = compile("(?= {a: 1, %})").unwrap();
    assert!(pattern.matches(&tree!({"a": 1, "b": 2})).unwrap());
    assert!(!pattern.matches(&tree!({"a": 2})).unwrap());

    let negative = compile("(?! {a: 1, %})").unwrap();
    assert!(negative.matches(&tree!({"a": 2})).unwrap());
    assert!(!negative.matches(&tree!({"a": 1, "b": 2})).unwrap());
}
