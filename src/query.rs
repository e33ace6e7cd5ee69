//
// query.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// TypeQuery Handler (C3, SPEC_FULL.md §4.3): synchronous semantic queries
// against the environment. Every failure mode collapses to a
// `QueryResult::Error(message)` rather than a `Result::Err` — user-visible
// query failures are data, not control flow (SPEC_FULL.md §7).
//

use crate::cache::find_annotation;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::file::File;
use crate::request::Response;
use crate::state::ServerState;
use crate::types::{Parameter, QueryResult, Type, TypeQuery};

pub fn process_type_query(state: &mut ServerState, config: &ServerConfig, query: TypeQuery) -> Response {
    let result = match query {
        TypeQuery::Attributes(class) => attributes(state, &class),
        TypeQuery::Methods(class) => methods(state, &class),
        TypeQuery::Join(a, b) => binary_type_op(state, &a, &b, |env, ta, tb| env.join(ta, tb)),
        TypeQuery::Meet(a, b) => binary_type_op(state, &a, &b, |env, ta, tb| env.meet(ta, tb)),
        TypeQuery::LessOrEqual(a, b) => less_or_equal(state, &a, &b),
        TypeQuery::NormalizeType(expr) => normalize_type(state, &expr),
        TypeQuery::Signature(name) => signature(state, &name),
        TypeQuery::Superclasses(class) => superclasses(state, &class),
        TypeQuery::TypeAtLocation { path, start } => type_at_location(state, config, &path, start),
        TypeQuery::ResolveGlobal(name) => resolve_global(state, &name),
    };
    Response::TypeQuery(result)
}

fn attributes(state: &ServerState, class: &str) -> QueryResult {
    match state.environment.class_definition(class) {
        Some(def) => QueryResult::Attributes(def.attributes),
        None => QueryResult::Error(format!("No class definition found for {class}")),
    }
}

/// Drops the receiver parameter (already absent from stored methods) and
/// prepends the primitive `self` so the positional list begins with it.
fn methods(state: &ServerState, class: &str) -> QueryResult {
    match state.environment.class_definition(class) {
        Some(def) => {
            let methods = def
                .methods
                .into_iter()
                .map(|mut m| {
                    m.parameters.insert(0, Parameter { name: Some("self".to_string()), annotation: Type::Unknown });
                    m
                })
                .collect();
            QueryResult::Methods(methods)
        },
        None => QueryResult::Error(format!("No class definition found for {class}")),
    }
}

fn binary_type_op(
    state: &ServerState,
    a: &str,
    b: &str,
    op: impl Fn(&dyn crate::environment::EnvironmentHandle, &Type, &Type) -> crate::error::Result<Type>,
) -> QueryResult {
    match (state.environment.parse_type(a), state.environment.parse_type(b)) {
        (Ok(ta), Ok(tb)) => match op(state.environment.as_ref(), &ta, &tb) {
            Ok(result) => QueryResult::Type(result),
            Err(err) => untracked_to_query_error(err),
        },
        (Err(err), _) | (_, Err(err)) => untracked_to_query_error(err),
    }
}

fn less_or_equal(state: &ServerState, a: &str, b: &str) -> QueryResult {
    match (state.environment.parse_type(a), state.environment.parse_type(b)) {
        (Ok(ta), Ok(tb)) => match state.environment.less_or_equal(&ta, &tb) {
            Ok(result) => QueryResult::Bool(result),
            Err(err) => untracked_to_query_error(err),
        },
        (Err(err), _) | (_, Err(err)) => untracked_to_query_error(err),
    }
}

fn normalize_type(state: &ServerState, expr: &str) -> QueryResult {
    match state.environment.parse_type(expr) {
        Ok(ty) => QueryResult::Type(ty),
        Err(err) => untracked_to_query_error(err),
    }
}

/// Drops unnamed parameters, then drops `Top` annotations (reported as
/// "unknown" on render rather than kept as `object`).
fn signature(state: &ServerState, name: &str) -> QueryResult {
    match state.environment.signature(name) {
        Some(overloads) => {
            let overloads = overloads
                .into_iter()
                .map(|overload| {
                    let parameters = overload
                        .parameters
                        .into_iter()
                        .filter(|p| p.name.is_some())
                        .map(|p| if matches!(p.annotation, Type::Top) { Parameter { annotation: Type::Unknown, ..p } } else { p })
                        .collect();
                    let return_type = if matches!(overload.return_type, Type::Top) { Type::Unknown } else { overload.return_type };
                    crate::types::Overload { return_type, parameters }
                })
                .collect();
            QueryResult::Signatures(overloads)
        },
        None => QueryResult::Error(format!("No signature found for {name}")),
    }
}

fn superclasses(state: &ServerState, class: &str) -> QueryResult {
    match state.environment.class_definition(class) {
        Some(def) => QueryResult::Superclasses(def.superclasses),
        None => QueryResult::Error(format!("No class definition found for {class}")),
    }
}

fn type_at_location(
    state: &mut ServerState,
    config: &ServerConfig,
    path: &crate::file::FileHandle,
    start: crate::types::Position,
) -> QueryResult {
    let file = File::new(config.local_root.clone(), path.as_str());
    match find_annotation(state, config, &file, start) {
        Some((location, ty)) => QueryResult::Annotation(location, ty),
        None => QueryResult::Error(format!("No type found at {path}:{}:{}", start.line, start.column)),
    }
}

fn resolve_global(state: &ServerState, name: &str) -> QueryResult {
    match state.environment.resolve_global(name) {
        Some(ty) => QueryResult::Type(ty),
        None => QueryResult::Error(format!("No global binding found for {name}")),
    }
}

fn untracked_to_query_error(err: Error) -> QueryResult {
    QueryResult::Error(err.to_string())
}
