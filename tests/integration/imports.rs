//! Import resolution scenarios, end to end.

use brindle_engine::{KnowledgeBase, KnowledgeBuilder};
use brindle_foundation::Value;
use brindle_language::CompileErrorKind;
use brindle_language::ast::{
    BinaryOp, ConditionElement, Expr, FunctionDecl, PackageDecl, PatternDecl, RuleDecl, Statement,
};

use crate::fixtures::{self, CHEESERY, MAKING_CHEESE, SELLING_CHEESE};

fn add_to_list(value: Expr) -> Statement {
    Statement::Expr(Expr::method(Expr::name("list"), "add", vec![value]))
}

/// Four rules at salience 30, 20, 10, and 0, calling wildcard-imported,
/// explicitly imported, and local functions.
pub fn import_functions_package() -> PackageDecl {
    PackageDecl::new("org.example.rules")
        .import_functions("org.example.StaticMethods")
        .import_function("org.example.StaticMethods", "getString1")
        .import_function("org.example.StaticMethods2", "getString3")
        .import("org.example.Cheese")
        .global("list", "java.util.List")
        .function(
            FunctionDecl::new("getString4", "String", Expr::name("string")).param("string", "String"),
        )
        .rule(
            RuleDecl::new("test rule1")
                .salience(30)
                .when(PatternDecl::new("Cheese"))
                .then(add_to_list(Expr::call("getString1", vec![Expr::str("rule1")]))),
        )
        .rule(
            RuleDecl::new("test rule2")
                .salience(20)
                .when(PatternDecl::new("Cheese").test(Expr::equals(
                    Expr::name("type"),
                    Expr::call("getString2", vec![Expr::str("stilton")]),
                )))
                .then(add_to_list(Expr::call(
                    "getString3",
                    vec![Expr::str("rule"), Expr::int(2)],
                ))),
        )
        .rule(
            RuleDecl::new("test rule3")
                .salience(10)
                .when(PatternDecl::new("Cheese").bind_field("$type", "type"))
                .when(ConditionElement::Eval(Expr::method(
                    Expr::name("$type"),
                    "equals",
                    vec![Expr::call("getString1", vec![Expr::str("stilton")])],
                )))
                .then(add_to_list(Expr::call("getString2", vec![Expr::str("rule3")]))),
        )
        .rule(
            RuleDecl::new("test rule4")
                .salience(0)
                .when(PatternDecl::new("Cheese"))
                .then(add_to_list(Expr::call("getString4", vec![Expr::str("rule4")]))),
        )
}

#[test]
fn import_functions_fire_in_salience_order() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut session = kb.new_session().unwrap();

    session.insert(fixtures::cheese("stilton", 15)).unwrap();
    session.set_global("list", Value::empty_list()).unwrap();
    let fired = session.fire_all_rules().unwrap();

    assert_eq!(fired, 4);
    assert_eq!(
        fixtures::strings(session.get_global("list")),
        vec!["rule1", "rule2", "rule3", "rule4"]
    );
    session.dispose();
}

#[test]
fn non_matching_fact_only_fires_unconstrained_rules() {
    let kb = KnowledgeBase::build(fixtures::catalog(), &[import_functions_package()]).unwrap();
    let mut session = kb.new_session().unwrap();

    session.set_global("list", Value::empty_list()).unwrap();
    session.insert(fixtures::cheese("brie", 4)).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(
        fixtures::strings(session.get_global("list")),
        vec!["rule1", "rule4"]
    );
}

#[test]
fn missing_class_is_a_compile_error_for_its_rule() {
    let package = PackageDecl::new("org.example")
        .import("org.example.Person")
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("rule1")
                .when(PatternDecl::new("Cheese").bind("$i"))
                .when(PatternDecl::new("MissingClass").test(Expr::equals(
                    Expr::name("fieldName"),
                    Expr::name("$i"),
                )))
                .then(add_to_list(Expr::name("$i"))),
        );

    let mut builder = KnowledgeBuilder::new(fixtures::catalog());
    builder.add_package(&package);

    assert!(builder.has_errors());
    let error = builder
        .errors()
        .iter()
        .find(|e| e.symbol.as_deref() == Some("MissingClass"))
        .expect("an error naming MissingClass");
    assert_eq!(error.kind, CompileErrorKind::UnresolvedSymbol);
    assert_eq!(error.rule.as_deref(), Some("rule1"));
    assert_eq!(error.package.as_deref(), Some("org.example"));
    assert!(builder.build().is_err());
}

#[test]
fn errors_in_one_rule_do_not_hide_errors_in_another() {
    let package = PackageDecl::new("org.example.rules")
        .import("org.example.Cheese")
        .rule(RuleDecl::new("a").when(PatternDecl::new("Nope")))
        .rule(RuleDecl::new("b").when(PatternDecl::new("Cheese").test(Expr::equals(
            Expr::name("colour"),
            Expr::str("blue"),
        ))))
        .rule(RuleDecl::new("fine").when(PatternDecl::new("Cheese")));

    let errors = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap_err();
    let rules: Vec<_> = errors.iter().filter_map(|e| e.rule.as_deref()).collect();
    assert!(rules.contains(&"a"));
    assert!(rules.contains(&"b"));
    assert!(!rules.contains(&"fine"));
}

#[test]
fn explicit_function_imports_from_two_holders_conflict() {
    let package = PackageDecl::new("org.example.rules")
        .import_function("org.example.StaticMethods", "getString1")
        .import_function("org.example.OtherMethods", "getString1")
        .import("org.example.Cheese")
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("uses-it")
                .when(PatternDecl::new("Cheese"))
                .then(add_to_list(Expr::call("getString1", vec![Expr::str("x")]))),
        )
        .rule(RuleDecl::new("unrelated").when(PatternDecl::new("Cheese")));

    let mut builder = KnowledgeBuilder::new(fixtures::catalog());
    builder.add_package(&package);
    let kinds: Vec<_> = builder.errors().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&CompileErrorKind::Conflict));
    let use_site = builder
        .errors()
        .iter()
        .find(|e| e.kind == CompileErrorKind::AmbiguousSymbol)
        .expect("the call is ambiguous");
    assert_eq!(use_site.rule.as_deref(), Some("uses-it"));
    assert!(builder.errors().iter().all(|e| e.rule.as_deref() != Some("unrelated")));
    assert!(builder.build().is_err());
}

#[test]
fn explicit_import_after_wildcard_is_not_a_conflict() {
    let package = PackageDecl::new("org.example.rules")
        .import_functions("org.example.OtherMethods")
        .import_function("org.example.StaticMethods", "getString1")
        .import("org.example.Cheese")
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("uses-it")
                .when(PatternDecl::new("Cheese"))
                .then(add_to_list(Expr::call("getString1", vec![Expr::str("x")]))),
        );
    assert!(KnowledgeBase::build(fixtures::catalog(), &[package]).is_ok());
}

#[test]
fn nested_alternative_keys_stay_apart_across_packages() {
    fn package(name: &str, outer: &str) -> PackageDecl {
        PackageDecl::new(name)
            .import(&format!("org.example.{outer}"))
            .import(&format!("org.example.{outer}.AlternativeKey"))
            .global("list", "java.util.List")
            .rule(
                RuleDecl::new("outer")
                    .when(PatternDecl::new(outer).bind("$o"))
                    .then(add_to_list(Expr::name("$o"))),
            )
            .rule(
                RuleDecl::new("key")
                    .when(PatternDecl::new("AlternativeKey").bind("$k"))
                    .then(add_to_list(Expr::name("$k"))),
            )
    }

    let kb = KnowledgeBase::build(
        fixtures::catalog(),
        &[package("nested1", "FirstClass"), package("nested2", "SecondClass")],
    )
    .unwrap();
    let mut session = kb.new_session().unwrap();
    session.set_global("list", Value::empty_list()).unwrap();

    let catalog = fixtures::catalog();
    for name in [
        "org.example.FirstClass",
        "org.example.SecondClass",
        "org.example.FirstClass.AlternativeKey",
        "org.example.SecondClass.AlternativeKey",
    ] {
        session
            .insert(catalog.get(name).unwrap().default_object())
            .unwrap();
    }
    assert_eq!(session.fire_all_rules().unwrap(), 4);

    let mut seen: Vec<String> = session
        .get_global("list")
        .and_then(Value::as_list)
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().type_name().to_string())
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "org.example.FirstClass",
            "org.example.FirstClass.AlternativeKey",
            "org.example.SecondClass",
            "org.example.SecondClass.AlternativeKey",
        ]
    );
}

#[test]
fn colliding_nested_imports_in_one_package_are_reported() {
    let package = PackageDecl::new("org.example.rules")
        .import("org.example.FirstClass.AlternativeKey")
        .import("org.example.SecondClass.AlternativeKey")
        .rule(RuleDecl::new("key").when(PatternDecl::new("AlternativeKey")));

    let errors = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap_err();
    assert!(errors.iter().any(|e| e.kind == CompileErrorKind::DuplicateImport));
    let ambiguous = errors
        .iter()
        .find(|e| e.kind == CompileErrorKind::AmbiguousSymbol)
        .expect("the rule's use of the short name is ambiguous");
    assert_eq!(ambiguous.rule.as_deref(), Some("key"));
}

#[test]
fn static_constants_resolve_through_imported_and_nested_types() {
    let package = PackageDecl::new("org.example.rules")
        .import(CHEESERY)
        .global("list", "java.util.List")
        .rule(
            RuleDecl::new("selling")
                .when(
                    PatternDecl::new("Cheesery")
                        .bind("$c")
                        .test(Expr::equals(
                            Expr::name("status"),
                            Expr::path("Cheesery.SELLING_CHEESE"),
                        )),
                )
                .then(add_to_list(Expr::name("$c"))),
        )
        .rule(
            RuleDecl::new("young")
                .when(
                    PatternDecl::new("Cheesery")
                        .bind("$c")
                        .test(Expr::equals(
                            Expr::name("maturity"),
                            Expr::path("Cheesery.Maturity.YOUNG"),
                        )),
                )
                .then(add_to_list(Expr::name("$c"))),
        );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.set_global("list", Value::empty_list()).unwrap();

    let first = fixtures::cheesery(SELLING_CHEESE, "OLD");
    let second = fixtures::cheesery(MAKING_CHEESE, "YOUNG");
    session.insert(first.clone()).unwrap();
    session.insert(second.clone()).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 2);

    let list = session.get_global("list").and_then(Value::as_list).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.get(0), Some(&Value::Object(first)));
    assert_eq!(list.get(1), Some(&Value::Object(second)));
}

#[test]
fn nested_type_used_as_a_value_is_rejected() {
    let package = PackageDecl::new("org.example.rules")
        .import(CHEESERY)
        .rule(RuleDecl::new("bad").when(PatternDecl::new("Cheesery").test(Expr::equals(
            Expr::name("maturity"),
            Expr::path("Cheesery.Maturity"),
        ))));
    let errors = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap_err();
    assert_eq!(errors[0].kind, CompileErrorKind::InvalidExpression);
}

#[test]
fn wildcard_package_import_with_no_loop_modify() {
    let package = PackageDecl::new("org.example.test")
        .import("org.example.*")
        .rule(
            RuleDecl::new("R1")
                .no_loop(true)
                .when(PatternDecl::new("Person").bind("$p"))
                .when(PatternDecl::new("Cheese").bind("$c"))
                .then(Statement::modify("$p", vec![("cheese", Expr::name("$c"))])),
        );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let mut session = kb.new_session().unwrap();

    let p = session.insert(fixtures::person("Mario", "gorgonzola")).unwrap();
    let gorgonzola = fixtures::cheese("Gorgonzola", 0);
    session.insert(gorgonzola.clone()).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(
        session.get_fact(p).unwrap().get("cheese"),
        Some(&Value::Object(gorgonzola))
    );
    assert!(session.activations().is_empty());
}

#[test]
fn arithmetic_in_consequences_uses_bound_fields() {
    let package = PackageDecl::new("org.example.rules")
        .import("org.example.Cheese")
        .global("total", "int")
        .rule(
            RuleDecl::new("sum")
                .when(PatternDecl::new("Cheese").bind_field("$p", "price"))
                .then(Statement::SetGlobal {
                    name: "total".to_string(),
                    value: Expr::binary(BinaryOp::Add, Expr::name("total"), Expr::name("$p")),
                }),
        );
    let kb = KnowledgeBase::build(fixtures::catalog(), &[package]).unwrap();
    let mut session = kb.new_session().unwrap();
    session.set_global("total", 0).unwrap();
    for price in [3, 4, 5] {
        session.insert(fixtures::cheese("any", price)).unwrap();
    }
    assert_eq!(session.fire_all_rules().unwrap(), 3);
    assert_eq!(session.get_global("total"), Some(&Value::Int(12)));
}
