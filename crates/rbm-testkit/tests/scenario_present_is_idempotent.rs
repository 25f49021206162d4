use rbm_reconcile::{Ensure, ItemSpec, RawItem, RuleSpec};
use rbm_testkit::{apply, role, seeded_store};

fn blog_forest() -> Vec<RawItem> {
    vec![
        ItemSpec::role("admin")
            .ensure(Ensure::Present)
            .description("Everything")
            .child(
                ItemSpec::role("author")
                    .ensure(Ensure::Present)
                    .child(ItemSpec::permission("createPost").ensure(Ensure::Present))
                    .child(
                        ItemSpec::permission("updateOwnPost")
                            .ensure(Ensure::Present)
                            .rule(RuleSpec::new("isAuthor", "owner"))
                            .child(ItemSpec::permission("updatePost").ensure(Ensure::Present)),
                    ),
            )
            .into(),
        ItemSpec::permission("legacyExport")
            .ensure(Ensure::Absent)
            .into(),
    ]
}

#[test]
fn second_apply_of_present_forest_changes_nothing() {
    let mut store = seeded_store(&[role("legacyExport")]).unwrap();
    // Wrong type on purpose: ABSENT permission ignores the role of the same name.
    let forest = blog_forest();

    let first = apply(&mut store, &forest).unwrap();
    assert!(!first.is_noop());
    let after_first = store.snapshot();

    let second = apply(&mut store, &forest).unwrap();
    assert!(second.is_noop(), "second apply reported changes: {second:?}");
    assert_eq!(second.already_linked, 4);
    assert_eq!(store.snapshot(), after_first);
}

#[test]
fn present_with_replace_is_idempotent_too() {
    let mut store = seeded_store(&[]).unwrap();
    let forest: Vec<RawItem> = vec![ItemSpec::permission("D")
        .ensure(Ensure::Present)
        .replace(true)
        .description("v1")
        .rule(RuleSpec::new("gate", "deny"))
        .into()];

    apply(&mut store, &forest).unwrap();
    let snap = store.snapshot();

    let again = apply(&mut store, &forest).unwrap();
    assert!(again.is_noop());
    assert_eq!(again.unchanged, 1);
    assert_eq!(store.snapshot(), snap);
}
