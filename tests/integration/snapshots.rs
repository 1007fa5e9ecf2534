//! Snapshot round trips across the whole stack.

use brindle_engine::{KnowledgeBase, Session, Settled, snapshot};
use brindle_foundation::{ErrorKind, Value};
use brindle_language::ast::{BinaryOp, Expr, PackageDecl, PatternDecl, RuleDecl, Statement};

use crate::fixtures::{self, CHEESE, CHEESERY, MAKING_CHEESE, PERSON, SELLING_CHEESE};
use crate::imports::import_functions_package;

fn through_bytes(kb: &KnowledgeBase, session: &Session) -> Session {
    let bytes = snapshot::to_bytes(&session.snapshot().unwrap()).unwrap();
    kb.restore_session(&snapshot::from_bytes(&bytes).unwrap())
        .unwrap()
}

#[test]
fn import_functions_survive_a_snapshot() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.insert(fixtures::cheese("stilton", 15)).unwrap();
    session.set_global("list", Value::empty_list()).unwrap();

    let mut restored = through_bytes(&kb, &session);
    assert_eq!(restored.activations().len(), 4);
    assert_eq!(restored.fire_all_rules().unwrap(), 4);
    assert_eq!(
        fixtures::strings(restored.get_global("list")),
        vec!["rule1", "rule2", "rule3", "rule4"]
    );
}

#[test]
fn restored_session_continues_like_the_original() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut original = kb.new_session().unwrap();
    original.set_global("list", Value::empty_list()).unwrap();
    original.insert(fixtures::cheese("stilton", 15)).unwrap();
    assert_eq!(original.fire_until(2).unwrap(), 2);

    let mut restored = through_bytes(&kb, &original);

    for session in [&mut original, &mut restored] {
        session.insert(fixtures::cheese("brie", 3)).unwrap();
    }
    let a = original.fire_all_rules().unwrap();
    let b = restored.fire_all_rules().unwrap();
    assert_eq!(a, b);
    assert_eq!(original.get_global("list"), restored.get_global("list"));
    assert_eq!(
        fixtures::strings(restored.get_global("list")),
        vec!["rule1", "rule2", "rule1", "rule3", "rule4", "rule4"]
    );
}

#[test]
fn static_field_rules_survive_snapshots_between_inserts() {
    let package = PackageDecl::new("org.example.rules")
        .import(CHEESERY)
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("selling")
                .when(PatternDecl::new("Cheesery").bind("$c").test(Expr::equals(
                    Expr::name("status"),
                    Expr::path("Cheesery.SELLING_CHEESE"),
                )))
                .then(Statement::Expr(Expr::method(
                    Expr::name("list"),
                    "add",
                    vec![Expr::name("$c")],
                ))),
        )
        .rule(
            RuleDecl::new("young")
                .when(PatternDecl::new("Cheesery").bind("$c").test(Expr::equals(
                    Expr::name("maturity"),
                    Expr::path("Cheesery.Maturity.YOUNG"),
                )))
                .then(Statement::Expr(Expr::method(
                    Expr::name("list"),
                    "add",
                    vec![Expr::name("$c")],
                ))),
        );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let session = kb.new_session().unwrap();
    let mut session = through_bytes(&kb, &session);
    session.set_global("list", Value::empty_list()).unwrap();

    let first = fixtures::cheesery(SELLING_CHEESE, "OLD");
    session.insert(first.clone()).unwrap();
    let mut session = through_bytes(&kb, &session);

    let second = fixtures::cheesery(MAKING_CHEESE, "YOUNG");
    session.insert(second.clone()).unwrap();
    let mut session = through_bytes(&kb, &session);

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    let list = session.get_global("list").and_then(Value::as_list).unwrap();
    assert_eq!(list.get(0), Some(&Value::Object(first)));
    assert_eq!(list.get(1), Some(&Value::Object(second)));
}

#[test]
fn snapshot_files_round_trip() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.insert(fixtures::cheese("stilton", 15)).unwrap();
    session.set_global("list", Value::empty_list()).unwrap();
    let taken = session.snapshot().unwrap();

    let path = std::env::temp_dir().join("brindle_integration_snapshot.msgpack");
    snapshot::save_to_file(&taken, &path).unwrap();
    let loaded = snapshot::load_from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, taken);
    let mut restored = kb.restore_session(&loaded).unwrap();
    assert_eq!(restored.fire_all_rules().unwrap(), 4);
}

#[test]
fn snapshot_from_another_knowledge_base_is_rejected() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.insert(fixtures::cheese("stilton", 15)).unwrap();
    let taken = session.snapshot().unwrap();

    let other = KnowledgeBase::build(
        fixtures::catalog(),
        &[PackageDecl::new("org.example.rules").import("org.example.Cheese")],
    )
    .unwrap();
    let err = other.restore_session(&taken).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SnapshotMismatch(_)));
}

fn record(text: &str) -> Statement {
    Statement::Expr(Expr::method(Expr::name("list"), "add", vec![Expr::str(text)]))
}

fn pricey() -> KnowledgeBase {
    let package = PackageDecl::new("org.example.rules")
        .import(CHEESE)
        .global("list", "java.util.List")
        .global("threshold", "int")
        .rule(
            RuleDecl::new("pricey")
                .when(PatternDecl::new("Cheese").test(Expr::binary(
                    BinaryOp::Gt,
                    Expr::name("price"),
                    Expr::name("threshold"),
                )))
                .then(record("pricey")),
        );
    KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap()
}

#[test]
fn matches_survive_a_later_change_to_the_globals_they_read() {
    let kb = pricey();
    let mut original = kb.new_session().unwrap();
    original.set_global("list", Value::empty_list()).unwrap();
    original.set_global("threshold", Value::Int(5)).unwrap();
    original.insert(fixtures::cheese("stilton", 10)).unwrap();
    original.set_global("threshold", Value::Int(20)).unwrap();

    let mut restored = through_bytes(&kb, &original);
    assert_eq!(restored.activations().len(), 1);
    assert_eq!(restored.fire_all_rules().unwrap(), 1);
    assert_eq!(original.fire_all_rules().unwrap(), 1);
    assert_eq!(fixtures::strings(restored.get_global("list")), vec!["pricey"]);
}

#[test]
fn matches_never_made_are_not_invented_by_a_restore() {
    let kb = pricey();
    let mut original = kb.new_session().unwrap();
    original.set_global("list", Value::empty_list()).unwrap();
    original.set_global("threshold", Value::Int(20)).unwrap();
    original.insert(fixtures::cheese("stilton", 10)).unwrap();
    original.set_global("threshold", Value::Int(5)).unwrap();

    let mut restored = through_bytes(&kb, &original);
    assert!(restored.activations().is_empty());
    assert_eq!(restored.fire_all_rules().unwrap(), 0);

    // New facts are matched against the current globals in both sessions.
    for session in [&mut original, &mut restored] {
        session.insert(fixtures::cheese("brie", 10)).unwrap();
        assert_eq!(session.fire_all_rules().unwrap(), 1);
    }
    assert_eq!(original.get_global("list"), restored.get_global("list"));
}

#[test]
fn fired_and_suppressed_matches_survive_until_an_outside_update() {
    let package = PackageDecl::new("org.example.rules")
        .import(PERSON)
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("birthday")
                .salience(10)
                .no_loop(true)
                .when(PatternDecl::new("Person").bind("$p").bind_field("$a", "age"))
                .then(Statement::modify(
                    "$p",
                    vec![(
                        "age",
                        Expr::binary(BinaryOp::Add, Expr::name("$a"), Expr::int(1)),
                    )],
                )),
        )
        .rule(
            RuleDecl::new("greet")
                .when(PatternDecl::new("Person"))
                .then(record("hi")),
        );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let mut original = kb.new_session().unwrap();
    original.set_global("list", Value::empty_list()).unwrap();
    let ann = original.insert(fixtures::person("ann", "brie")).unwrap();
    assert_eq!(original.fire_all_rules().unwrap(), 2);

    let taken = original.snapshot().unwrap();
    assert!(taken.activations.is_empty());
    assert_eq!(taken.settled.len(), 2);
    assert!(
        taken
            .settled
            .iter()
            .any(|m| m.rule == "birthday" && m.state == Settled::Suppressed)
    );
    assert!(
        taken
            .settled
            .iter()
            .any(|m| m.rule == "greet" && m.state == Settled::Fired)
    );

    let mut restored = through_bytes(&kb, &original);
    assert_eq!(restored.fire_all_rules().unwrap(), 0);

    for session in [&mut original, &mut restored] {
        let older = session.get_fact(ann).unwrap().set("age", Value::Int(50));
        session.update(ann, older).unwrap();
        assert_eq!(session.fire_all_rules().unwrap(), 2);
        assert_eq!(session.get_fact(ann).unwrap().get("age"), Some(&Value::Int(51)));
    }
    assert_eq!(
        fixtures::strings(restored.get_global("list")),
        vec!["hi", "hi"]
    );
    assert_eq!(original.get_global("list"), restored.get_global("list"));
}
