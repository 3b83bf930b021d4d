use tendril::{compile, tree};

#[test]
fn greedy_star_takes_longest_first() {
    let all = compile("[$a*, $b*]")
        .unwrap()
        .extract_all(&tree!([1, 2]))
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["a"], tree!([1, 2]));
    assert_eq!(all[0]["b"], tree!([]));
    assert_eq!(all[1]["a"], tree!([1]));
    assert_eq!(all[1]["b"], tree!([2]));
    assert_eq!(all[2]["a"], tree!([]));
    assert_eq!(all[2]["b"], tree!([1, 2]));
}

#[test]
fn reluctant_star_takes_shortest_first() {
    let all = compile("[$a*?, $b*]")
        .unwrap()
        .extract_all(&tree!([1, 2]))
        .unwrap();
    assert_eq!(all[0]["a"], tree!([]));
    assert_eq!(all[0]["b"], tree!([1, 2]));
}

#[test]
fn optional_binds_empty_group_when_absent() {
    let all = compile("[$a?]").unwrap().extract_all(&tree!([])).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["a"], tree!([]));
}

#[test]
fn possessive_star_never_gives_back() {
    // Greedy succeeds by backing off; possessive has committed.
    assert!(compile("[$a*, 1]").unwrap().matches(&tree!([1])).unwrap());
    assert!(!compile("[$a*+, 1]").unwrap().matches(&tree!([1])).unwrap());
    assert!(!compile("[$a++, 2]").unwrap().matches(&tree!([1, 2])).unwrap());
    // With nothing after it, possessive consumption is fine.
    let all = compile("[$a*+]").unwrap().extract_all(&tree!([1, 2])).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["a"], tree!([1, 2]));
}

#[test]
fn counted_ranges_accept_exact_window() {
    let pattern = compile("[_{2,3}]").unwrap();
    assert!(!pattern.matches(&tree!([1])).unwrap());
    assert!(pattern.matches(&tree!([1, 2])).unwrap());
    assert!(pattern.matches(&tree!([1, 2, 3])).unwrap());
    assert!(!pattern.matches(&tree!([1, 2, 3, 4])).unwrap());

    assert!(compile("[_{2}]").unwrap().matches(&tree!([1, 2])).unwrap());
    assert!(!compile("[_{2}]").unwrap().matches(&tree!([1, 2, 3])).unwrap());
    assert!(compile("[_{,2}]").unwrap().matches(&tree!([])).unwrap());
    assert!(compile("[_{1,}]").unwrap().matches(&tree!([1, 2, 3, 4])).unwrap());
}

#[test]
fn spread_absorbs_any_span() {
    let pattern = compile("[1, .., 9]").unwrap();
    assert!(pattern.matches(&tree!([1, 9])).unwrap());
    assert!(pattern.matches(&tree!([1, 5, 7, 9])).unwrap());
    assert!(!pattern.matches(&tree!([1, 5, 7])).unwrap());
    assert!(compile("[..]").unwrap().matches(&tree!([])).unwrap());
    assert!(compile("[..]").unwrap().matches(&tree!([1, 2])).unwrap());
}

#[test]
fn grouped_spans_repeat_as_units() {
    let pattern = compile("[($k, $v)+]").unwrap();
    assert!(!pattern.matches(&tree!([1])).unwrap());
    let all = pattern.extract_all(&tree!(["a", 1, "a", 1])).unwrap();
    // Each repetition re-binds; repeats must unify.
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["k"], tree!("a"));
    assert!(!pattern.matches(&tree!(["a", 1, "b", 2])).unwrap());
}

#[test]
fn quantified_group_bind_takes_whole_span() {
    let all = compile("[@pair=((_, _)){2}]")
        .unwrap()
        .extract_all(&tree!([1, 2, 3, 4]))
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["pair"], tree!([1, 2, 3, 4]));
}

#[test]
fn alternation_of_quantified_bases() {
    let pattern = compile("[(1+ | 2), 9]").unwrap();
    assert!(pattern.matches(&tree!([1, 1, 9])).unwrap());
    assert!(pattern.matches(&tree!([2, 9])).unwrap());
    assert!(!pattern.matches(&tree!([2, 2, 9])).unwrap());
}

#[test]
fn sequence_lookahead_is_zero_width() {
    let pattern = compile("[(?= (1, ..)), $x, ..]").unwrap();
    let bindings = pattern.extract(&tree!([1, 2])).unwrap().unwrap();
    assert_eq!(bindings["x"], tree!(1));
    assert!(!pattern.matches(&tree!([2, 1])).unwrap());

    let negative = compile("[(?! (9, ..)), .., $last]").unwrap();
    assert!(negative.matches(&tree!([1, 2])).unwrap());
    assert!(!negative.matches(&tree!([9, 2])).unwrap());
}

#[test]
fn commas_between_elements_are_optional() {
    assert!(compile("[1 2 3]").unwrap().matches(&tree!([1, 2, 3])).unwrap());
}
