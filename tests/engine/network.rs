//! Node sharing and pruning as seen through a knowledge base.

use std::sync::Arc;

use brindle_engine::KnowledgeBase;
use brindle_foundation::{Object, Type, Value};
use brindle_language::ast::{
    BinaryOp, ConditionElement, Expr, FunctionDecl, PackageDecl, PatternDecl, RuleDecl, Statement,
};
use brindle_language::{Catalog, TypeDef};

const CHEESE: &str = "org.example.Cheese";
const PERSON: &str = "org.example.Person";

fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    catalog
        .register(
            TypeDef::new(CHEESE)
                .field("type", Type::String)
                .field("price", Type::Int),
        )
        .unwrap();
    catalog
        .register(TypeDef::new(PERSON).field("likes", Type::String))
        .unwrap();
    Arc::new(catalog)
}

fn package(name: &str) -> PackageDecl {
    PackageDecl::new(name)
        .import(CHEESE)
        .import(PERSON)
        .global("list", "java.util.List")
}

fn stilton(rule: &str) -> RuleDecl {
    RuleDecl::new(rule)
        .when(PatternDecl::new("Cheese").test(Expr::equals(Expr::name("type"), Expr::str("stilton"))))
        .then(Statement::Expr(Expr::method(
            Expr::name("list"),
            "add",
            vec![Expr::str(rule)],
        )))
}

fn likes(rule: &str) -> RuleDecl {
    RuleDecl::new(rule)
        .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
        .when(PatternDecl::new("Cheese").test(Expr::equals(
            Expr::name("type"),
            Expr::name("$likes"),
        )))
}

// =============================================================================
// Sharing
// =============================================================================

#[test]
fn identical_patterns_share_nodes_across_packages() {
    let one = KnowledgeBase::build(catalog(), &[package("a").rule(stilton("r"))]).unwrap();
    let alone = one.network().node_count();
    // object-type, alpha, join, terminal
    assert_eq!(alone, 4);

    let both = KnowledgeBase::build(
        catalog(),
        &[package("a").rule(stilton("r")), package("b").rule(stilton("r"))],
    )
    .unwrap();
    assert_eq!(both.network().node_count(), alone + 1);
    assert_eq!(both.network().node_summary()["terminal"], 2);
}

#[test]
fn joins_share_their_prefix() {
    let kb = KnowledgeBase::build(
        catalog(),
        &[package("a").rule(likes("first")).rule(likes("second"))],
    )
    .unwrap();
    let summary = kb.network().node_summary();
    assert_eq!(summary["object-type"], 2);
    assert_eq!(summary["join"], 2);
    assert_eq!(summary["terminal"], 2);
}

#[test]
fn tests_calling_local_functions_stay_in_their_package() {
    let is_stilton = || {
        FunctionDecl::new(
            "isStilton",
            "boolean",
            Expr::equals(Expr::name("t"), Expr::str("stilton")),
        )
        .param("t", "String")
    };
    let rule = || {
        RuleDecl::new("r").when(
            PatternDecl::new("Cheese")
                .test(Expr::call("isStilton", vec![Expr::name("type")])),
        )
    };
    let kb = KnowledgeBase::build(
        catalog(),
        &[
            package("a").function(is_stilton()).rule(rule()),
            package("b").function(is_stilton()).rule(rule()),
        ],
    )
    .unwrap();
    let summary = kb.network().node_summary();
    assert_eq!(summary["object-type"], 1);
    assert_eq!(summary["alpha"], 2);
    assert_eq!(summary["terminal"], 2);
}

// =============================================================================
// Pruning
// =============================================================================

#[test]
fn removing_rules_prunes_only_unshared_nodes() {
    let mut kb = KnowledgeBase::build(
        catalog(),
        &[package("a").rule(stilton("keep")).rule(stilton("drop")).rule(likes("pair"))],
    )
    .unwrap();
    let before = kb.network().node_count();

    let drop = kb.rule_id("a", "drop").unwrap();
    kb.remove_rule(drop).unwrap();
    assert_eq!(kb.network().node_count(), before - 1);

    let pair = kb.rule_id("a", "pair").unwrap();
    kb.remove_rule(pair).unwrap();
    let summary = kb.network().node_summary();
    assert_eq!(summary["object-type"], 1);
    assert_eq!(summary["terminal"], 1);
    assert!(kb.network().object_type(PERSON).is_none());

    let mut session = kb.new_session().unwrap();
    session.set_global("list", Value::empty_list()).unwrap();
    session
        .insert(Object::new(CHEESE).with("type", "stilton").with("price", 1))
        .unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
}

#[test]
fn rules_added_later_reuse_existing_nodes() {
    let mut kb = KnowledgeBase::build(catalog(), &[package("a").rule(stilton("first"))]).unwrap();
    let before = kb.network().node_count();
    kb.add_rule("a", &stilton("second")).unwrap().unwrap();
    assert_eq!(kb.network().node_count(), before + 1);

    let cheap = RuleDecl::new("cheap").when(
        PatternDecl::new("Cheese")
            .test(Expr::equals(Expr::name("type"), Expr::str("stilton")))
            .test(Expr::binary(BinaryOp::Lt, Expr::name("price"), Expr::int(5))),
    );
    kb.add_rule("a", &cheap).unwrap().unwrap();
    // a second alpha below the shared one, plus its join and terminal
    assert_eq!(kb.network().node_count(), before + 4);
}

#[test]
fn negated_patterns_get_their_own_join() {
    let lonely = RuleDecl::new("lonely")
        .when(PatternDecl::new("Person").bind_field("$likes", "likes"))
        .when(ConditionElement::Not(PatternDecl::new("Cheese").test(
            Expr::equals(Expr::name("type"), Expr::name("$likes")),
        )));
    let kb = KnowledgeBase::build(catalog(), &[package("a").rule(likes("pair")).rule(lonely)])
        .unwrap();
    let summary = kb.network().node_summary();
    assert_eq!(summary["not"], 1);
    assert_eq!(summary["join"], 2);
}
