//! Fact types shared by the integration tests.

use std::sync::Arc;

use brindle_foundation::{Object, Type, Value};
use brindle_language::{Catalog, NativeFunction, TypeDef};

pub const CHEESE: &str = "org.example.Cheese";
pub const PERSON: &str = "org.example.Person";
pub const CHEESERY: &str = "org.example.Cheesery";

pub const SELLING_CHEESE: i64 = 1;
pub const MAKING_CHEESE: i64 = 0;

fn echo(name: &str) -> NativeFunction {
    NativeFunction::new(name, vec![Type::String], Type::String, |args| Ok(args[0].clone()))
}

/// Every type the scenarios use.
pub fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    let types = [
        TypeDef::new(CHEESE)
            .field("type", Type::String)
            .field("price", Type::Int),
        TypeDef::new(PERSON)
            .field("name", Type::String)
            .field("age", Type::Int)
            .field("likes", Type::String)
            .field("cheese", Type::object(CHEESE)),
        TypeDef::new("org.example.StaticMethods")
            .function(echo("getString1"))
            .function(echo("getString2")),
        TypeDef::new("org.example.StaticMethods2").function(NativeFunction::new(
            "getString3",
            vec![Type::String, Type::Int],
            Type::String,
            |args| Ok(Value::from(format!("{}{}", args[0], args[1]))),
        )),
        TypeDef::new("org.example.OtherMethods").function(echo("getString1")),
        TypeDef::new(CHEESERY)
            .field("status", Type::Int)
            .field("maturity", Type::String)
            .constant("SELLING_CHEESE", SELLING_CHEESE)
            .constant("MAKING_CHEESE", MAKING_CHEESE),
        TypeDef::new("org.example.Cheesery.Maturity")
            .constant("YOUNG", "YOUNG")
            .constant("OLD", "OLD"),
        TypeDef::new("org.example.FirstClass").field("name", Type::String),
        TypeDef::new("org.example.FirstClass.AlternativeKey").field("key", Type::String),
        TypeDef::new("org.example.SecondClass").field("name", Type::String),
        TypeDef::new("org.example.SecondClass.AlternativeKey").field("key", Type::String),
    ];
    for def in types {
        catalog.register(def).unwrap();
    }
    Arc::new(catalog)
}

pub fn cheese(kind: &str, price: i64) -> Object {
    Object::new(CHEESE).with("type", kind).with("price", price)
}

pub fn person(name: &str, likes: &str) -> Object {
    Object::new(PERSON)
        .with("name", name)
        .with("age", 38)
        .with("likes", likes)
        .with("cheese", Value::Nil)
}

pub fn cheesery(status: i64, maturity: &str) -> Object {
    Object::new(CHEESERY)
        .with("status", status)
        .with("maturity", maturity)
}

/// The strings in a list global.
pub fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_list)
        .map(|items| items.iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}
