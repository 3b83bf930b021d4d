use tendril::{compile, tree, MatchError};

#[test]
fn guards_gate_on_bound_variables() {
    let pattern = compile("{n: $x, #($x > 3)}").unwrap();
    assert!(pattern.matches(&tree!({"n": 5})).unwrap());
    assert!(!pattern.matches(&tree!({"n": 2})).unwrap());
}

#[test]
fn guards_in_sequences_are_zero_width() {
    let pattern = compile("[$a, #($a != 0), $b]").unwrap();
    let bindings = pattern.extract(&tree!([1, 2])).unwrap().unwrap();
    assert_eq!(bindings["a"], tree!(1));
    assert_eq!(bindings["b"], tree!(2));
    assert!(!pattern.matches(&tree!([0, 2])).unwrap());
}

#[test]
fn guard_failure_fails_the_branch_not_the_query() {
    // `$x % 0` raises a division failure for the first alternative's
    // binding; the second alternative still succeeds.
    let pattern = compile("[$x=(0 | 2), #(4 % $x == 0)]").unwrap();
    assert!(pattern.matches(&tree!([2])).unwrap());

    // Type errors likewise reject only the branch.
    let typed = compile("[$x, #($x + 1 > 0), ..] | [.., $x]").unwrap();
    assert!(typed.matches(&tree!(["not-a-number"])).unwrap());
}

#[test]
fn guard_root_reads_the_match_root() {
    let pattern = compile("{items: $i, #(size(_) == 2), %}").unwrap();
    assert!(pattern.matches(&tree!({"items": [], "other": 1})).unwrap());
    assert!(!pattern
        .matches(&tree!({"items": [], "other": 1, "third": 2}))
        .unwrap());
}

#[test]
fn guard_functions() {
    let pattern = compile("{v: $x, #(number($x) == 3)}").unwrap();
    assert!(pattern.matches(&tree!({"v": "3"})).unwrap());
    assert!(pattern.matches(&tree!({"v": 3})).unwrap());
    assert!(!pattern.matches(&tree!({"v": "4"})).unwrap());

    let size = compile("{v: $x, #(size($x) >= 2)}").unwrap();
    assert!(size.matches(&tree!({"v": [1, 2]})).unwrap());
    assert!(size.matches(&tree!({"v": "ab"})).unwrap());
    assert!(!size.matches(&tree!({"v": "a"})).unwrap());
}

#[test]
fn unseedable_guard_variable_errors_up_front() {
    let pattern = compile("#($limit > 1)").unwrap();
    match pattern.matches(&tree!(5)) {
        Err(MatchError::UnboundGuardVar(name)) => assert_eq!(name, "limit"),
        other => panic!("expected unbound guard var error, got {:?}", other),
    }
    // Seeding the name closes the guard.
    let seeded = pattern.env_seed("limit", tree!(5));
    assert!(seeded.matches(&tree!("anything")).unwrap());
    let low = pattern.env_seed("limit", tree!(0));
    assert!(!low.matches(&tree!("anything")).unwrap());
}

#[test]
fn stream_filter_guard() {
    let pattern = compile("{$k: $v, %}").unwrap();
    let data = tree!({"a": 1, "b": 5, "c": 9});
    let solutions = pattern
        .solutions(&data)
        .filter_guard("$v > 2")
        .unwrap()
        .to_vec()
        .unwrap();
    let ks: Vec<_> = solutions.iter().map(|s| s.bindings["k"].clone()).collect();
    assert_eq!(ks, vec![tree!("b"), tree!("c")]);
}

#[test]
fn filter_guard_rejects_bad_syntax() {
    let pattern = compile("$x").unwrap();
    let data = tree!(1);
    assert!(pattern.solutions(&data).filter_guard("$x >").is_err());
}
