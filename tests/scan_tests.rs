use tendril::{compile, tree, OccurrenceRef};

#[test]
fn scan_visits_every_node_depth_first() {
    let pattern = compile("$x").unwrap();
    let data = tree!({"a": 1, "b": [2]});
    let xs: Vec<_> = pattern
        .occurrences(&data)
        .to_vec()
        .unwrap()
        .into_iter()
        .map(|s| s.bindings["x"].clone())
        .collect();
    assert_eq!(
        xs,
        vec![
            tree!({"a": 1, "b": [2]}),
            tree!(1),
            tree!([2]),
            tree!(2),
        ]
    );
}

#[test]
fn scan_finds_nested_objects() {
    let pattern = compile("{password: $p, %}").unwrap();
    let data = tree!({"svc": {"password": "pw", "port": 1}, "other": []});
    let found = pattern.occurrences(&data).to_vec().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].bindings["p"], tree!("pw"));
    match &found[0].where_ {
        OccurrenceRef::Node { path } => assert_eq!(path.sort_key(), ".svc"),
        other => panic!("expected node ref, got {:?}", other),
    }
}

#[test]
fn scan_tries_contiguous_slices_for_sequence_patterns() {
    let pattern = compile("[$a, $b]").unwrap();
    let data = tree!([1, 2, 3]);
    let found = pattern.occurrences(&data).to_vec().unwrap();
    let spans: Vec<(usize, usize)> = found
        .iter()
        .map(|s| match &s.where_ {
            OccurrenceRef::ArraySlice { start, end, .. } => (*start, *end),
            other => panic!("expected slice ref, got {:?}", other),
        })
        .collect();
    assert_eq!(spans, vec![(0, 2), (1, 3)]);
    assert_eq!(found[0].bindings["a"], tree!(1));
    assert_eq!(found[1].bindings["a"], tree!(2));
}

#[test]
fn where_prefixes_every_binding_ref() {
    let pattern = compile("{k: $v, %}").unwrap();
    let data = tree!({"outer": {"k": 1}, "k": 2});
    for solution in pattern.occurrences(&data).to_vec().unwrap() {
        let root = solution.where_.path().clone();
        for refs in solution.at.values() {
            for refr in refs {
                assert!(
                    refr.path().starts_with(&root),
                    "{:?} does not extend {:?}",
                    refr,
                    root
                );
            }
        }
    }
}

#[test]
fn scan_order_is_stable_across_runs() {
    let pattern = compile("$x").unwrap();
    let data = tree!({"m": {"q": [true, null]}, "z": "s"});
    let run = || {
        pattern
            .occurrences(&data)
            .to_vec()
            .unwrap()
            .into_iter()
            .map(|s| s.where_.sort_key())
            .collect::<Vec<_>>()
    };
    let first = run();
    for _ in 0..3 {
        assert_eq!(run(), first);
    }
}
