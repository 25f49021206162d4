use rbm_reconcile::{Ensure, ItemSpec, LiveItem, RawItem, RuleSpec};
use rbm_testkit::{apply, perm, seeded_store};

fn seeded_with_v1() -> rbm_store::MemoryStore {
    let mut d = perm("D");
    d.description = Some("v1".to_string());
    seeded_store(&[d]).unwrap()
}

fn v2(replace: bool) -> Vec<RawItem> {
    vec![ItemSpec::named("D")
        .ensure(Ensure::Present)
        .replace(replace)
        .description("v2")
        .into()]
}

fn description(item: Option<&LiveItem>) -> Option<&str> {
    item.and_then(|i| i.description.as_deref())
}

#[test]
fn replace_true_updates_description() {
    let mut store = seeded_with_v1();
    let report = apply(&mut store, &v2(true)).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(description(store.item("D")), Some("v2"));
}

#[test]
fn replace_false_leaves_description() {
    let mut store = seeded_with_v1();
    let report = apply(&mut store, &v2(false)).unwrap();
    assert!(report.is_noop());
    assert_eq!(description(store.item("D")), Some("v1"));
}

#[test]
fn replace_true_also_rebinds_rule() {
    let mut store = seeded_with_v1();
    let forest: Vec<RawItem> = vec![ItemSpec::named("D")
        .ensure(Ensure::Present)
        .replace(true)
        .rule(RuleSpec::new("gate", "deny"))
        .into()];

    apply(&mut store, &forest).unwrap();
    let d = store.item("D").unwrap();
    assert_eq!(d.rule_name.as_deref(), Some("gate"));
    // Undeclared fields are kept.
    assert_eq!(d.description.as_deref(), Some("v1"));
}

#[test]
fn replaced_rule_is_rebuilt_only_on_request() {
    let mut store = seeded_store(&[]).unwrap();
    let plain: Vec<RawItem> = vec![ItemSpec::named("P")
        .ensure(Ensure::Present)
        .replace(true)
        .description("x")
        .rule(RuleSpec::new("gate", "deny"))
        .into()];
    apply(&mut store, &plain).unwrap();

    let forced: Vec<RawItem> = vec![ItemSpec::named("P")
        .ensure(Ensure::Present)
        .replace(true)
        .description("y")
        .rule(RuleSpec::new("gate", "owner").replace(true))
        .into()];
    let report = apply(&mut store, &forced).unwrap();
    assert_eq!(report.rules_replaced, 1);
    assert_eq!(store.rule("gate").unwrap().class(), "owner");
}
