use tendril::{bindings, compile, tree, Edit, EditOp, OccurrenceRef, Value};

#[test]
fn replace_all_patches_bound_values() {
    let pattern = compile("{foo: $y, %}").unwrap();
    let data = tree!({"foo": 1, "bar": 2, "baz": 3});
    let out = pattern
        .replace_all_with(&data, |sol| {
            let y = sol.get("y")?.as_number()?;
            Some(bindings! {"y" => (y + 10.0)})
        })
        .unwrap();
    assert_eq!(out, tree!({"foo": 11, "bar": 2, "baz": 3}));
}

#[test]
fn identity_replacement_round_trips() {
    let pattern = compile("{..k: $x, %}").unwrap();
    let data = tree!({"k": [1, {"k": 2}], "rest": {"k": 3}});
    let out = pattern
        .replace_all_with(&data, |sol| {
            let mut plan = tendril::Plan::new();
            plan.insert("x".to_string(), sol.get("x").unwrap().clone());
            Some(plan)
        })
        .unwrap();
    assert_eq!(out, data);
}

#[test]
fn replace_all_is_deterministic() {
    let pattern = compile("{$k: $v, %}").unwrap();
    let data = tree!({"a": 1, "b": 2, "c": 3});
    let run = || {
        pattern
            .replace_all_with(&data, |sol| {
                let v = sol.get("v")?.as_number()?;
                Some(bindings! {"v" => (v * 2.0)})
            })
            .unwrap()
    };
    let first = run();
    for _ in 0..5 {
        assert_eq!(run(), first);
    }
    assert_eq!(first, tree!({"a": 2, "b": 4, "c": 6}));
}

#[test]
fn replace_with_derives_a_plan_from_the_first_solution() {
    let pattern = compile("{port: $p, %}").unwrap();
    let data = tree!({"port": 80, "host": "a"});
    let out = pattern
        .replace_with(&data, |sol| {
            let p = sol.get("p")?.as_number()?;
            Some(bindings! {"p" => (p + 8000.0)})
        })
        .unwrap();
    assert_eq!(out, tree!({"port": 8080, "host": "a"}));
}

#[test]
fn repeated_variable_rewrites_every_occurrence() {
    let pattern = compile("[$a, $a, ..]").unwrap();
    let out = pattern
        .replace(&tree!([3, 3, 9]), &bindings! {"a" => 0})
        .unwrap();
    assert_eq!(out, tree!([0, 0, 9]));
}

#[test]
fn group_replacement_splices() {
    let pattern = compile("[1, $mid+, 9]").unwrap();
    // A sequence replacement splices into the slice.
    let out = pattern
        .replace(&tree!([1, 2, 3, 9]), &bindings! {"mid" => ["x"]})
        .unwrap();
    assert_eq!(out, tree!([1, "x", 9]));
    // A scalar replacement inserts one element.
    let out = pattern
        .replace(&tree!([1, 2, 3, 9]), &bindings! {"mid" => "solo"})
        .unwrap();
    assert_eq!(out, tree!([1, "solo", 9]));
}

#[test]
fn string_against_key_ref_renames() {
    let pattern = compile("{$k: 1, %}").unwrap();
    let out = pattern
        .replace(&tree!({"a": 1, "b": 2}), &bindings! {"k" => "first"})
        .unwrap();
    assert_eq!(out, tree!({"first": 1, "b": 2}));
    // Position is preserved.
    let keys: Vec<&String> = out.as_map().unwrap().keys().collect();
    assert_eq!(keys, ["first", "b"]);
}

#[test]
fn dollar_zero_replaces_the_match_root() {
    let pattern = compile("[_, $x]").unwrap();
    let out = pattern
        .replace(&tree!([1, 2]), &bindings! {"0" => [9]})
        .unwrap();
    assert_eq!(out, tree!([9]));
}

#[test]
fn remainder_capture_can_be_replaced_wholesale() {
    let pattern = compile("{keep: $k, @rest=(%)}").unwrap();
    let out = pattern
        .replace(
            &tree!({"keep": 1, "drop1": 2, "drop2": 3}),
            &bindings! {"rest" => {"merged": true}},
        )
        .unwrap();
    assert_eq!(out, tree!({"keep": 1, "merged": true}));
}

#[test]
fn plans_never_mutate_the_input() {
    let pattern = compile("{foo: $y, %}").unwrap();
    let data = tree!({"foo": 1, "bar": 2});
    let _ = pattern.replace_all(&data, &bindings! {"y" => 99}).unwrap();
    assert_eq!(data, tree!({"foo": 1, "bar": 2}));
}

#[test]
fn no_solution_returns_the_tree_unchanged() {
    let pattern = compile("{missing: 1}").unwrap();
    let data = tree!({"other": 2});
    assert_eq!(
        pattern.replace(&data, &bindings! {"x" => 1}).unwrap(),
        data
    );
}

#[test]
fn manual_edits_apply_through_the_planner() {
    let pattern = compile("{$k: $v, %}").unwrap();
    let data = tree!({"a": 1, "b": 2});
    let out = pattern
        .edit(&data, |sol| {
            if sol.bindings["v"] == tree!(2) {
                sol.at["v"]
                    .iter()
                    .map(|refr| Edit {
                        at: refr.clone(),
                        op: EditOp::Replace(Value::from("two")),
                    })
                    .collect()
            } else {
                Vec::new()
            }
        })
        .unwrap();
    assert_eq!(out, tree!({"a": 1, "b": "two"}));
}

#[test]
fn rename_with_non_string_is_an_invalid_plan() {
    let pattern = compile("{$k: 1, %}").unwrap();
    let data = tree!({"a": 1});
    let sol = pattern.solutions(&data).first().unwrap().unwrap();
    let key_ref = sol.at["k"][0].clone();
    assert!(matches!(key_ref, OccurrenceRef::ObjectKeys { .. }));
    let result = pattern.edit(&data, |s| {
        vec![Edit {
            at: s.at["k"][0].clone(),
            op: EditOp::Rename("ok".to_string()),
        }]
    });
    assert!(result.is_ok());
    let bad = pattern.edit(&data, |s| {
        vec![Edit {
            at: s.where_.clone(),
            op: EditOp::Rename("nope".to_string()),
        }]
    });
    assert!(bad.is_err());
}
