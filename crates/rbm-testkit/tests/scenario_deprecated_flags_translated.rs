use rbm_reconcile::{DeprecatedFlag, Ensure, ItemSpec, RawItem, ReconcileEvent};
use rbm_testkit::{apply_recorded, perm, policy_from_yaml, seeded_store};

fn deprecations(events: &[ReconcileEvent]) -> Vec<DeprecatedFlag> {
    events
        .iter()
        .filter_map(|e| match e {
            ReconcileEvent::DeprecatedFlag { flag, .. } => Some(*flag),
            _ => None,
        })
        .collect()
}

#[test]
fn legacy_exists_means_must_exist() {
    let mut store = seeded_store(&[]).unwrap();
    let mut spec = ItemSpec::named("guest");
    spec.legacy_exists = true;

    let (out, events) = apply_recorded(&mut store, &[RawItem::from(spec)]);
    assert!(out.unwrap_err().is_policy_violation());
    assert_eq!(deprecations(events.events()), [DeprecatedFlag::Exists]);
}

#[test]
fn legacy_force_means_present_with_replace() {
    let mut d = perm("D");
    d.description = Some("v1".to_string());
    let mut store = seeded_store(&[d]).unwrap();

    let mut spec = ItemSpec::named("D").description("v2");
    spec.legacy_force = true;

    let (out, events) = apply_recorded(&mut store, &[RawItem::from(spec)]);
    assert_eq!(out.unwrap().updated, 1);
    assert_eq!(store.item("D").unwrap().description.as_deref(), Some("v2"));
    assert_eq!(deprecations(events.events()), [DeprecatedFlag::Force]);
}

#[test]
fn force_wins_over_exists_and_explicit_ensure() {
    let mut store = seeded_store(&[]).unwrap();
    let mut spec = ItemSpec::named("X").ensure(Ensure::Absent);
    spec.legacy_exists = true;
    spec.legacy_force = true;

    let (out, events) = apply_recorded(&mut store, &[RawItem::from(spec)]);
    assert_eq!(out.unwrap().created, 1);
    assert_eq!(
        deprecations(events.events()),
        [DeprecatedFlag::Exists, DeprecatedFlag::Force]
    );
}

#[test]
fn legacy_rule_force_replaces_rule() {
    let mut store = seeded_store(&[]).unwrap();
    let first = policy_from_yaml(
        r#"
privileges:
  - name: p
    rule: { name: gate, class: deny }
"#,
    )
    .unwrap();
    apply_recorded(&mut store, &first.privileges).0.unwrap();

    let second = policy_from_yaml(
        r#"
privileges:
  - name: p
    _force: true
    rule: { name: gate, class: owner, _force: true }
"#,
    )
    .unwrap();
    let (out, events) = apply_recorded(&mut store, &second.privileges);

    assert_eq!(out.unwrap().rules_replaced, 1);
    assert_eq!(store.rule("gate").unwrap().class(), "owner");
    assert_eq!(
        deprecations(events.events()),
        [DeprecatedFlag::Force, DeprecatedFlag::RuleForce]
    );
}
