use tendril::{compile, tree};

#[test]
fn dot_steps_one_level() {
    let bindings = compile("{a.b: $x}")
        .unwrap()
        .extract(&tree!({"a": {"b": 5}}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!(5));
    assert!(!compile("{a.b: $x}")
        .unwrap()
        .matches(&tree!({"a": {"c": 5}}))
        .unwrap());
}

#[test]
fn bracket_steps_through_sequences() {
    let bindings = compile("{a[0]: $x}")
        .unwrap()
        .extract(&tree!({"a": [7, 8]}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!(7));
    assert!(compile("{a[1]: 8}")
        .unwrap()
        .matches(&tree!({"a": [7, 8]}))
        .unwrap());
}

#[test]
fn chained_crumbs_compose() {
    let bindings = compile("{cfg.db.port: $p}")
        .unwrap()
        .extract(&tree!({"cfg": {"db": {"port": 5432}}}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["p"], tree!(5432));
}

#[test]
fn skip_crumb_descends_any_depth() {
    let pattern = compile("{a..port: $p}").unwrap();
    assert_eq!(
        pattern.extract(&tree!({"a": {"port": 1}})).unwrap().unwrap()["p"],
        tree!(1)
    );
    assert_eq!(
        pattern
            .extract(&tree!({"a": {"x": {"y": {"port": 2}}}}))
            .unwrap()
            .unwrap()["p"],
        tree!(2)
    );
}

#[test]
fn skip_matches_shallowest_depth_first() {
    let all = compile("{..k: $x, %}")
        .unwrap()
        .extract_all(&tree!({"k": 1, "nest": {"k": 2, "deeper": {"k": 3}}}))
        .unwrap();
    let xs: Vec<_> = all.iter().map(|b| b["x"].clone()).collect();
    assert_eq!(xs, vec![tree!(1), tree!(2), tree!(3)]);
}

#[test]
fn root_skip_consumes_the_top_level_key_it_descends_through() {
    // The whole mapping is accounted for: `a` is consumed by the
    // descent, so no remnant marker is needed.
    assert!(compile("{..password: $x}")
        .unwrap()
        .matches(&tree!({"a": {"b": {"password": "pw"}}}))
        .unwrap());
    // An unrelated sibling is left over and the default is exhaustive.
    assert!(!compile("{..password: $x}")
        .unwrap()
        .matches(&tree!({"a": {"password": "pw"}, "other": 1}))
        .unwrap());
    assert!(compile("{..password: $x, %}")
        .unwrap()
        .matches(&tree!({"a": {"password": "pw"}, "other": 1}))
        .unwrap());
}

#[test]
fn skip_descends_through_sequences() {
    let bindings = compile("{..password: $x}")
        .unwrap()
        .extract(&tree!({"accounts": [{"password": "pw1"}]}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!("pw1"));
}

#[test]
fn trailing_skip_means_any_key_any_depth() {
    let pattern = compile("{a..: 5, %}").unwrap();
    // Depth zero: the key's own value.
    assert!(pattern.matches(&tree!({"a": 5})).unwrap());
    // Deeper.
    assert!(pattern.matches(&tree!({"a": {"x": {"y": 5}}})).unwrap());
    assert!(!pattern.matches(&tree!({"a": {"x": 6}})).unwrap());
}

#[test]
fn root_trailing_skip_searches_everything() {
    let pattern = compile("{..: \"needle\", %}").unwrap();
    assert!(pattern.matches(&tree!({"x": {"y": ["needle"]}})).unwrap());
    assert!(!pattern.matches(&tree!({"x": {"y": ["hay"]}})).unwrap());
}

#[test]
fn crumb_key_binders_capture_the_stepped_key() {
    let bindings = compile("{a.$k: 9, %}")
        .unwrap()
        .extract(&tree!({"a": {"m": 1, "n": 9}}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["k"], tree!("n"));
}

#[test]
fn quantified_step_repeats() {
    // Two `.next` steps from the key's value.
    let pattern = compile("{start.next{2}: $x}").unwrap();
    let bindings = pattern
        .extract(&tree!({"start": {"next": {"next": "end"}}}))
        .unwrap()
        .unwrap();
    assert_eq!(bindings["x"], tree!("end"));
}
