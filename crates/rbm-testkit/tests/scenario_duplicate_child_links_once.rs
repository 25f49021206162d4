use rbm_reconcile::{Ensure, ItemSpec, RawItem};
use rbm_testkit::{apply_recorded, seeded_store};

#[test]
fn child_declared_twice_yields_one_grant_edge() {
    let mut store = seeded_store(&[]).unwrap();
    let p = || ItemSpec::permission("P").ensure(Ensure::Present);
    let forest: Vec<RawItem> = vec![ItemSpec::role("R").child(p()).child(p()).into()];

    let (out, events) = apply_recorded(&mut store, &forest);
    let report = out.unwrap();

    assert_eq!(report.linked, 1);
    assert_eq!(report.already_linked, 1);
    assert_eq!(store.snapshot().grants.len(), 1);
    assert_eq!(
        events.kinds(),
        [
            "processing",
            "created",
            "processing",
            "created",
            "child_linked",
            "processing",
            "unchanged",
            "child_already_linked",
        ]
    );
}

#[test]
fn same_child_under_two_parents_is_two_edges() {
    let mut store = seeded_store(&[]).unwrap();
    let p = || ItemSpec::permission("P").ensure(Ensure::Present);
    let forest: Vec<RawItem> = vec![
        ItemSpec::role("R1").child(p()).into(),
        ItemSpec::role("R2").child(p()).into(),
    ];

    apply_recorded(&mut store, &forest).0.unwrap();
    assert_eq!(store.children("R1"), ["P"]);
    assert_eq!(store.children("R2"), ["P"]);
}
