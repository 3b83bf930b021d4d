use tendril::{compile, tree, MatchError, NormalForm};

#[test]
fn step_budget_surfaces_as_an_error() {
    let pattern = compile("[$a*, $b*, $c*, 9]").unwrap().max_steps(20);
    let data = tree!([1, 1, 1, 1, 1, 1, 1, 1]);
    match pattern.matches(&data) {
        Err(MatchError::StepBudgetExceeded { budget }) => assert_eq!(budget, 20),
        other => panic!("expected budget exhaustion, got {:?}", other),
    }
}

#[test]
fn generous_budget_is_harmless() {
    let pattern = compile("[$a*, $b*]").unwrap().max_steps(100_000);
    assert!(pattern.matches(&tree!([1, 2])).unwrap());
}

#[test]
fn builders_are_copy_on_write() {
    let base = compile("[$a*, 9]").unwrap();
    let tight = base.max_steps(5);
    let data = tree!([1, 2, 3, 4, 5, 6, 7, 8]);
    // The configured copy errors; the original is untouched.
    assert!(tight.matches(&data).is_err());
    assert!(!base.matches(&data).unwrap());
}

#[test]
fn nfc_normalization_equates_composed_and_decomposed() {
    // Pattern carries decomposed e + U+0301; the tree holds composed é.
    let src = "\"e\\u0301\"";
    assert!(!compile(src).unwrap().matches(&tree!("\u{e9}")).unwrap());
    assert!(compile(src)
        .unwrap()
        .unicode_normalize(NormalForm::Nfc)
        .matches(&tree!("\u{e9}"))
        .unwrap());
    assert!(compile(src)
        .unwrap()
        .unicode_normalize(NormalForm::Nfd)
        .matches(&tree!("\u{e9}"))
        .unwrap());
}

#[test]
fn normalization_applies_to_keys_too() {
    let pattern = compile("{\"e\\u0301\": 1}").unwrap();
    let data = tree!({"\u{e9}": 1});
    assert!(!pattern.matches(&data).unwrap());
    assert!(pattern
        .unicode_normalize(NormalForm::Nfc)
        .matches(&data)
        .unwrap());
}

#[test]
fn regex_subject_is_normalized_before_matching() {
    // Composed é holds no literal 'e'; its NFD form does.
    let pattern = compile("/e/").unwrap();
    let data = tree!("\u{e9}");
    assert!(!pattern.matches(&data).unwrap());
    assert!(pattern
        .unicode_normalize(NormalForm::Nfd)
        .matches(&data)
        .unwrap());
}

#[test]
fn env_seed_prebinds_names() {
    let pattern = compile("{host: $h, backup: $h, %}").unwrap();
    let data = tree!({"host": "db1", "backup": "db1"});
    assert!(pattern.matches(&data).unwrap());
    let seeded = pattern.env_seed("h", tree!("db2"));
    assert!(!seeded.matches(&data).unwrap());
    let agreeing = pattern.env_seed("h", tree!("db1"));
    assert!(agreeing.matches(&data).unwrap());
}

#[test]
fn regex_flags() {
    assert!(compile("/^ab$/i").unwrap().matches(&tree!("AB")).unwrap());
    assert!(compile("/a.c/s").unwrap().matches(&tree!("a\nc")).unwrap());
    assert!(!compile("/a.c/").unwrap().matches(&tree!("a\nc")).unwrap());
    // Sticky anchors at the start of the subject.
    assert!(compile("/bc/y").unwrap().matches(&tree!("bcd")).unwrap());
    assert!(!compile("/bc/y").unwrap().matches(&tree!("abcd")).unwrap());
}
