//! Session behaviour over compiled packages: ordering, loops, negation,
//! failures, lifecycle, and concurrent use of one knowledge base.

use std::collections::BTreeSet;

use brindle_debug::{SharedTracer, TracerConfig};
use brindle_engine::{KnowledgeBase, SessionConfig};
use brindle_foundation::{ErrorKind, FactHandle, Object, SemanticLimit, Value};
use brindle_language::ast::{
    BinaryOp, ConditionElement, Expr, PackageDecl, PatternDecl, RuleDecl, Statement,
};
use proptest::prelude::*;

use crate::fixtures::{self, CHEESE, PERSON};

const PKG: &str = "org.example.rules";

fn base() -> PackageDecl {
    PackageDecl::new(PKG)
        .import(CHEESE)
        .import(PERSON)
        .global("list", "java.util.List")
}

fn record(text: &str) -> Statement {
    Statement::Expr(Expr::method(Expr::name("list"), "add", vec![Expr::str(text)]))
}

fn session_for(package: PackageDecl) -> (KnowledgeBase, brindle_engine::Session) {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.set_global("list", Value::empty_list()).unwrap();
    (kb, session)
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn higher_salience_fires_first_whatever_the_insertion_order() {
    let package = base()
        .rule(
            RuleDecl::new("cheese")
                .salience(20)
                .when(PatternDecl::new("Cheese"))
                .then(record("cheese")),
        )
        .rule(
            RuleDecl::new("person")
                .salience(30)
                .when(PatternDecl::new("Person"))
                .then(record("person")),
        );
    let (_kb, mut session) = session_for(package);
    session.insert(fixtures::cheese("brie", 1)).unwrap();
    session.insert(fixtures::person("ann", "brie")).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(
        fixtures::strings(session.get_global("list")),
        vec!["person", "cheese"]
    );
}

#[test]
fn equal_salience_fires_oldest_activation_first() {
    let package = base().rule(
        RuleDecl::new("see")
            .when(PatternDecl::new("Cheese").bind_field("$t", "type"))
            .then(Statement::Expr(Expr::method(
                Expr::name("list"),
                "add",
                vec![Expr::name("$t")],
            ))),
    );
    let (_kb, mut session) = session_for(package);
    for kind in ["a", "b", "c"] {
        session.insert(fixtures::cheese(kind, 1)).unwrap();
    }
    session.fire_all_rules().unwrap();
    assert_eq!(fixtures::strings(session.get_global("list")), vec!["a", "b", "c"]);
}

#[test]
fn fire_until_stops_after_the_requested_count() {
    let package = base().rule(
        RuleDecl::new("see")
            .when(PatternDecl::new("Cheese"))
            .then(record("seen")),
    );
    let (_kb, mut session) = session_for(package);
    for kind in ["a", "b", "c"] {
        session.insert(fixtures::cheese(kind, 1)).unwrap();
    }
    assert_eq!(session.fire_until(1).unwrap(), 1);
    assert_eq!(session.activations().len(), 2);
    assert_eq!(session.fire_all_rules().unwrap(), 2);
}

// =============================================================================
// Modify and no-loop
// =============================================================================

fn birthday(no_loop: bool) -> PackageDecl {
    base().rule(
        RuleDecl::new("birthday")
            .no_loop(no_loop)
            .when(PatternDecl::new("Person").bind("$p").bind_field("$a", "age"))
            .then(Statement::modify(
                "$p",
                vec![(
                    "age",
                    Expr::binary(BinaryOp::Add, Expr::name("$a"), Expr::int(1)),
                )],
            )),
    )
}

#[test]
fn no_loop_rule_does_not_reactivate_on_its_own_modify() {
    let (_kb, mut session) = session_for(birthday(true));
    let p = session.insert(fixtures::person("ann", "brie")).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.get_fact(p).unwrap().get("age"), Some(&Value::Int(39)));
    assert!(session.activations().is_empty());

    // An outside update is a new match and fires again.
    let older = session.get_fact(p).unwrap().set("age", Value::Int(50));
    session.update(p, older).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.get_fact(p).unwrap().get("age"), Some(&Value::Int(51)));
}

#[test]
fn looping_rule_hits_the_activation_limit() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[birthday(false)]).unwrap();
    let mut session = kb
        .new_session_with(SessionConfig::new().with_max_activations(10))
        .unwrap();
    let p = session.insert(fixtures::person("ann", "brie")).unwrap();

    let err = session.fire_all_rules().unwrap_err();
    match err.kind {
        ErrorKind::LimitExceeded(SemanticLimit::MaxActivations { limit, context }) => {
            assert_eq!(limit, 10);
            assert_eq!(context.as_deref(), Some("org.example.rules.birthday"));
        }
        other => panic!("expected an activation limit, got {other:?}"),
    }
    assert_eq!(session.get_fact(p).unwrap().get("age"), Some(&Value::Int(48)));
}

// =============================================================================
// Negation
// =============================================================================

#[test]
fn retracting_the_blocker_unblocks_a_negated_rule() {
    let package = base().rule(
        RuleDecl::new("no cheese")
            .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
            .when(ConditionElement::Not(PatternDecl::new("Cheese").test(
                Expr::equals(Expr::name("type"), Expr::name("$likes")),
            )))
            .then(record("hungry")),
    );
    let (_kb, mut session) = session_for(package);
    session.insert(fixtures::person("ann", "brie")).unwrap();
    assert_eq!(session.activations().len(), 1);

    let brie = session.insert(fixtures::cheese("brie", 2)).unwrap();
    assert!(session.activations().is_empty());

    // A cheese of another type does not block.
    session.insert(fixtures::cheese("feta", 2)).unwrap();
    assert!(session.activations().is_empty());

    session.retract(brie).unwrap();
    assert_eq!(session.activations().len(), 1);
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(fixtures::strings(session.get_global("list")), vec!["hungry"]);
}

// =============================================================================
// Failures and lifecycle
// =============================================================================

#[test]
fn failed_consequence_names_the_rule_and_keeps_earlier_changes() {
    let package = base().rule(
        RuleDecl::new("explode")
            .when(PatternDecl::new("Cheese").bind_field("$p", "price"))
            .then(record("before"))
            .then(Statement::Expr(Expr::binary(
                BinaryOp::Div,
                Expr::name("$p"),
                Expr::int(0),
            ))),
    );
    let (_kb, mut session) = session_for(package);
    session.insert(fixtures::cheese("brie", 2)).unwrap();

    let err = session.fire_all_rules().unwrap_err();
    let ErrorKind::ConsequenceFailure { rule, source } = err.kind else {
        panic!("expected a consequence failure");
    };
    assert_eq!(rule, "explode");
    assert!(matches!(source.kind, ErrorKind::DivisionByZero));
    assert_eq!(fixtures::strings(session.get_global("list")), vec!["before"]);
    assert!(session.activations().is_empty());
}

#[test]
fn failed_insert_is_rolled_back() {
    let package = base()
        .global("divisor", "int")
        .rule(
            RuleDecl::new("any")
                .when(PatternDecl::new("Cheese"))
                .then(record("any")),
        )
        .rule(
            RuleDecl::new("ratio")
                .when(PatternDecl::new("Cheese").test(Expr::binary(
                    BinaryOp::Gt,
                    Expr::binary(BinaryOp::Div, Expr::name("price"), Expr::name("divisor")),
                    Expr::int(1),
                )))
                .then(record("ratio")),
        );
    let (kb, mut session) = session_for(package);
    session.set_global("divisor", Value::Int(0)).unwrap();

    let err = session.insert(fixtures::cheese("brie", 10)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DivisionByZero));
    assert_eq!(session.fact_count(), 0);
    assert!(session.activations().is_empty());

    // Nothing half-propagated is left behind for a snapshot to trip over.
    let restored = kb.restore_session(&session.snapshot().unwrap()).unwrap();
    assert_eq!(restored.fact_count(), 0);

    session.set_global("divisor", Value::Int(2)).unwrap();
    let brie = session.insert(fixtures::cheese("brie", 10)).unwrap();
    assert_eq!(session.activations().len(), 2);
    assert!(session.activations().iter().all(|a| a.tuple == vec![brie]));
    assert_eq!(session.fire_all_rules().unwrap(), 2);
}

#[test]
fn halt_stops_the_loop_and_the_next_call_resumes() {
    let package = base()
        .rule(
            RuleDecl::new("stop")
                .salience(10)
                .when(PatternDecl::new("Person"))
                .then(record("stop"))
                .then(Statement::Halt),
        )
        .rule(
            RuleDecl::new("after")
                .when(PatternDecl::new("Person"))
                .then(record("after")),
        );
    let (_kb, mut session) = session_for(package);
    session.insert(fixtures::person("ann", "brie")).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert!(session.is_halted());
    assert_eq!(session.activations().len(), 1);

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert!(!session.is_halted());
    assert_eq!(
        fixtures::strings(session.get_global("list")),
        vec!["stop", "after"]
    );
}

#[test]
fn retract_returns_the_fact_and_forgets_the_handle() {
    let (_kb, mut session) = session_for(base());
    let brie = fixtures::cheese("brie", 2);
    let handle = session.insert(brie.clone()).unwrap();
    assert_eq!(session.fact_count(), 1);

    assert_eq!(session.retract(handle).unwrap(), brie);
    assert_eq!(session.fact_count(), 0);
    let err = session.retract(handle).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownFact(_)));
}

#[test]
fn facts_of_unknown_types_are_rejected() {
    let (_kb, mut session) = session_for(base());
    let err = session.insert(Object::new("org.example.Wine")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownType(_)));
    assert_eq!(session.fact_count(), 0);
}

#[test]
fn disposed_sessions_refuse_every_operation() {
    let (_kb, mut session) = session_for(base());
    let handle = session.insert(fixtures::cheese("brie", 2)).unwrap();
    session.dispose();
    assert!(session.is_disposed());

    for err in [
        session.insert(fixtures::cheese("feta", 1)).unwrap_err(),
        session.retract(handle).unwrap_err(),
        session.set_global("list", Value::empty_list()).unwrap_err(),
        session.fire_all_rules().unwrap_err(),
        session.snapshot().unwrap_err(),
    ] {
        assert!(matches!(err.kind, ErrorKind::SessionDisposed));
    }
}

// =============================================================================
// Listeners
// =============================================================================

#[test]
fn shared_tracer_sees_the_whole_firing() {
    let package = base().rule(
        RuleDecl::new("see")
            .when(PatternDecl::new("Cheese"))
            .then(record("seen")),
    );
    let (_kb, mut session) = session_for(package);
    let tracer = SharedTracer::new(TracerConfig::new().enabled());
    session.add_listener(Box::new(tracer.clone()));

    let handle = session.insert(fixtures::cheese("brie", 2)).unwrap();
    session.fire_all_rules().unwrap();
    session.retract(handle).unwrap();

    let kinds: Vec<_> = tracer.records().iter().map(|r| r.event_type()).collect();
    assert_eq!(
        kinds,
        vec![
            "fact-inserted",
            "activation-created",
            "before-fire",
            "after-fire",
            "fact-retracted",
        ]
    );
    assert_eq!(tracer.with(|t| t.firings()), 1);
    assert!(tracer.with(|t| t.format_recent(10)).contains("org.example.rules.see"));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn sessions_of_one_knowledge_base_run_on_separate_threads() {
    let package = base().rule(
        RuleDecl::new("pair")
            .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
            .when(PatternDecl::new("Cheese").test(Expr::equals(
                Expr::name("type"),
                Expr::name("$likes"),
            )))
            .then(record("pair")),
    );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();

    let counts: Vec<u32> = std::thread::scope(|scope| {
        let workers: Vec<_> = (1..=4_i64)
            .map(|n| {
                let kb = &kb;
                scope.spawn(move || {
                    let mut session = kb.new_session().unwrap();
                    session.set_global("list", Value::empty_list()).unwrap();
                    session.insert(fixtures::person("ann", "brie")).unwrap();
                    for price in 0..n {
                        session.insert(fixtures::cheese("brie", price)).unwrap();
                    }
                    session.fire_all_rules().unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    assert_eq!(counts, vec![1, 2, 3, 4]);
}

// =============================================================================
// Agenda agrees with a brute-force matcher
// =============================================================================

#[derive(Clone, Debug)]
enum Op {
    Person(usize),
    Cheese(usize),
    Retract(usize),
    Relike(usize, usize),
}

const KINDS: [&str; 3] = ["brie", "feta", "gouda"];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KINDS.len()).prop_map(Op::Person),
        (0..KINDS.len()).prop_map(Op::Cheese),
        any::<usize>().prop_map(Op::Retract),
        (any::<usize>(), 0..KINDS.len()).prop_map(|(i, k)| Op::Relike(i, k)),
    ]
}

fn matching_package() -> PackageDecl {
    base()
        .rule(
            RuleDecl::new("pair")
                .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
                .when(PatternDecl::new("Cheese").test(Expr::equals(
                    Expr::name("type"),
                    Expr::name("$likes"),
                ))),
        )
        .rule(
            RuleDecl::new("unmatched")
                .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
                .when(ConditionElement::Not(PatternDecl::new("Cheese").test(
                    Expr::equals(Expr::name("type"), Expr::name("$likes")),
                ))),
        )
}

fn expected(live: &[(FactHandle, Object)]) -> (BTreeSet<Vec<FactHandle>>, BTreeSet<Vec<FactHandle>>) {
    let of = |name: &str| {
        live.iter()
            .filter(move |(_, o)| o.type_name() == name)
            .collect::<Vec<_>>()
    };
    let people = of(PERSON);
    let cheeses = of(CHEESE);
    let mut pairs = BTreeSet::new();
    let mut unmatched = BTreeSet::new();
    for (p, person) in &people {
        let likes = person.get("likes");
        let mut any = false;
        for (c, cheese) in &cheeses {
            if cheese.get("type") == likes {
                pairs.insert(vec![*p, *c]);
                any = true;
            }
        }
        if !any {
            unmatched.insert(vec![*p]);
        }
    }
    (pairs, unmatched)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pending_activations_match_a_brute_force_join(ops in prop::collection::vec(op(), 1..40)) {
        let kb = KnowledgeBase::build(fixtures::catalog(), &[matching_package()]).unwrap();
        let pair = kb.rule_id(PKG, "pair").unwrap();
        let unmatched = kb.rule_id(PKG, "unmatched").unwrap();
        let mut session = kb.new_session().unwrap();
        let mut live: Vec<(FactHandle, Object)> = Vec::new();

        for op in ops {
            match op {
                Op::Person(k) => {
                    let fact = fixtures::person("p", KINDS[k]);
                    live.push((session.insert(fact.clone()).unwrap(), fact));
                }
                Op::Cheese(k) => {
                    let fact = fixtures::cheese(KINDS[k], 1);
                    live.push((session.insert(fact.clone()).unwrap(), fact));
                }
                Op::Retract(i) if !live.is_empty() => {
                    let (handle, _) = live.remove(i % live.len());
                    session.retract(handle).unwrap();
                }
                Op::Relike(i, k) if !live.is_empty() => {
                    let slot = i % live.len();
                    let (handle, fact) = &live[slot];
                    if fact.type_name() == PERSON {
                        let changed = fact.set("likes", Value::from(KINDS[k]));
                        session.update(*handle, changed.clone()).unwrap();
                        live[slot].1 = changed;
                    }
                }
                Op::Retract(_) | Op::Relike(..) => {}
            }
        }

        let (pairs, lonely) = expected(&live);
        let pending = session.activations();
        let got = |rule| {
            pending
                .iter()
                .filter(|a| a.rule == rule)
                .map(|a| a.tuple.clone())
                .collect::<BTreeSet<_>>()
        };
        prop_assert_eq!(got(pair), pairs);
        prop_assert_eq!(got(unmatched), lonely);
        prop_assert_eq!(
            pending.len(),
            got(pair).len() + got(unmatched).len()
        );
    }
}
