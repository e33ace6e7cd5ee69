//
// environment.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// The semantic environment and its backing AST store are, per SPEC_FULL.md
// §1/§4.9, external collaborators: this module defines the trait boundary
// the rest of the crate programs against (`Environment`, `AstStore`) and
// ships one concrete, in-memory implementation (`fixture`) that is the real
// backing for local/test runs. A production deployment swaps `fixture` for
// a real analysis engine behind the same two traits; nothing above this
// module needs to change.
//
// Grounded on the lazily-populated, in-memory `Library`/`Package` tables in
// the teacher's `ark-lsp/src/state.rs` (load-on-miss, cache by name).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::types::{Attribute, ClassDefinition, ErrorRecord, Location, Method, Overload, Parameter, Position, Type};

/// A parsed source file, as the environment understands it. Deliberately
/// shallow: the real parser's AST is opaque to this crate, so only the
/// facts the pipeline and queries need are represented.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    pub imports: Vec<String>,
    pub bindings: Vec<Binding>,
    pub classes: Vec<ClassDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub annotation: Type,
    pub location: Location,
    /// Top-level `define`s are the names stage 8 purges from the resolution
    /// memo; plain assignments are not.
    pub is_define: bool,
}

/// Shared-memory backing store for ASTs (SPEC_FULL.md §4.2/§4.4 stage 4/5).
pub trait AstStore: Send + Sync {
    fn get(&self, handle: &FileHandle) -> Option<Ast>;
    fn remove(&self, handles: &[FileHandle]);
    /// Parse `content` for `handle` and insert the result. Returns `None`
    /// (and inserts nothing) on a parse failure — failures are absorbed, not
    /// propagated, per SPEC_FULL.md §4.4 failure semantics.
    fn parse_and_store(&self, handle: &FileHandle, content: &str) -> Option<Ast>;
}

/// The semantic environment and type-order (SPEC_FULL.md §6 "Environment
/// interface consumed").
pub trait Environment: Send + Sync {
    fn class_definition(&self, class: &str) -> Option<ClassDefinition>;
    /// Canonical path a module qualifier currently resolves to, if any.
    fn module_definition(&self, qualifier: &str) -> Option<FileHandle>;
    fn resolve_global(&self, name: &str) -> Option<Type>;
    /// Files that depend on any of `qualifiers`, derived from the forward
    /// import graph fed in by `repopulate`.
    fn dependents(&self, qualifiers: &[String]) -> BTreeSet<FileHandle>;

    fn parse_type(&self, expr: &str) -> Result<Type>;
    fn join(&self, a: &Type, b: &Type) -> Result<Type>;
    fn meet(&self, a: &Type, b: &Type) -> Result<Type>;
    fn less_or_equal(&self, a: &Type, b: &Type) -> Result<bool>;

    fn signature(&self, name: &str) -> Option<Vec<Overload>>;

    /// Remove all records (class definitions, bindings, import edges)
    /// belonging to these handles.
    fn purge(&self, handles: &[FileHandle]);
    /// Feed freshly parsed ASTs in and run protocol inference over the
    /// classes they define (stage 6).
    fn repopulate(&self, asts: &[(FileHandle, Ast)]);
    /// Register user-suppressed error markers for these handles (stage 7).
    fn register_ignores(&self, handles: &[FileHandle]);
    /// Purge the resolution memo for these top-level define names (stage 8).
    fn purge_resolution(&self, names: &[String]);
    /// Run the analyzer over these handles, producing a flat error list
    /// (stage 9). Errors are data, never a `Result::Err` (SPEC_FULL.md §7).
    fn analyze(&self, handles: &[FileHandle]) -> Vec<ErrorRecord>;

    /// The `(location, type)` the lookup table reports at `pos` in `handle`,
    /// used by C2's `find_annotation` and the `TypeAtLocation` query.
    fn annotation_at(&self, handle: &FileHandle, pos: Position) -> Option<(Location, Type)>;
    /// The definition location for the symbol at `pos` in `handle`, used by
    /// C2's `find_definition`.
    fn definition_at(&self, handle: &FileHandle, pos: Position) -> Option<Location>;

    /// Per-class attribute memoization, cleared at the start of every
    /// type-check (stage 1). A no-op for environments that don't memoize.
    fn clear_attribute_memo(&self) {}
}

/// A combined handle the rest of the crate stores and passes around — the
/// environment and its backing AST store are always deployed together.
pub trait EnvironmentHandle: Environment + AstStore {}
impl<T: Environment + AstStore> EnvironmentHandle for T {}

/// In-memory fixture implementation (SPEC_FULL.md §4.9).
pub mod fixture {
    use super::*;

    #[derive(Default)]
    struct Inner {
        asts: DashMap<FileHandle, Ast>,
        /// Keyed by both `"{qualifier}.{name}"` and the bare class name (last
        /// writer wins on the bare key when two modules share a class name).
        classes: DashMap<String, ClassDefinition>,
        /// bare class name -> qualifier that currently owns the bare-key
        /// entry in `classes`, so `purge` only drops that entry when the
        /// purged qualifier is still the owner.
        class_owner: DashMap<String, String>,
        /// qualifier -> bare class names it contributed, so `purge` can find
        /// every entry it needs to remove without scanning all of `classes`.
        classes_by_qualifier: DashMap<String, Vec<String>>,
        /// qualifier -> canonical handle, set by `repopulate`.
        modules: DashMap<String, FileHandle>,
        /// qualifier -> the qualifiers it imports (forward edges).
        imports: DashMap<String, BTreeSet<String>>,
        globals: DashMap<String, Type>,
        /// binding name -> qualifier that currently owns the `globals` entry.
        global_owner: DashMap<String, String>,
        /// qualifier -> binding names it contributed.
        globals_by_qualifier: DashMap<String, Vec<String>>,
        signatures: DashMap<String, Vec<Overload>>,
        /// class name -> qualifier that currently owns the `signatures` entry.
        signature_owner: DashMap<String, String>,
        /// qualifier -> class names it contributed signatures for.
        signatures_by_qualifier: DashMap<String, Vec<String>>,
        ignored: RwLock<BTreeSet<FileHandle>>,
        resolution_memo: RwLock<BTreeSet<String>>,
        attribute_memo_cleared: std::sync::atomic::AtomicUsize,
    }

    /// A type-order over a small fixed lattice plus declared classes:
    /// `Bottom <= {Bool, Int, Float, Str} <= Top`, and each class is ordered
    /// under its declared superclass chain, all of it under `Top`.
    pub struct FixtureEnvironment {
        inner: Inner,
    }

    impl FixtureEnvironment {
        pub fn new() -> Self {
            Self { inner: Inner::default() }
        }

        fn lattice_type(name: &str) -> Option<Type> {
            match name {
                "Never" | "Bottom" => Some(Type::Bottom),
                "object" | "Top" => Some(Type::Top),
                "bool" => Some(Type::Bool),
                "int" => Some(Type::Int),
                "float" => Some(Type::Float),
                "str" => Some(Type::Str),
                "unknown" => Some(Type::Unknown),
                _ => None,
            }
        }

        fn is_tracked(&self, ty: &Type) -> bool {
            match ty {
                Type::Class(name) => self.inner.classes.contains_key(name),
                _ => true,
            }
        }

        fn superclass_chain(&self, class: &str) -> Vec<String> {
            let mut chain = Vec::new();
            let mut current = class.to_string();
            let mut guard = 0;
            while let Some(def) = self.inner.classes.get(&current) {
                guard += 1;
                if guard > 64 {
                    break; // cyclic base chain in a malformed fixture; stop rather than loop
                }
                match def.superclasses.first() {
                    Some(Type::Class(next)) => {
                        chain.push(next.clone());
                        current = next.clone();
                    },
                    _ => break,
                }
            }
            chain
        }

        /// `true` iff `a` is `b` or appears in `b`'s ancestor chain, used for
        /// `less_or_equal` between two class types.
        fn class_is_subclass(&self, a: &str, b: &str) -> bool {
            a == b || self.superclass_chain(a).iter().any(|c| c == b)
        }

        fn rank(ty: &Type) -> Option<u8> {
            match ty {
                Type::Bottom => Some(0),
                Type::Bool => Some(1),
                Type::Int => Some(1),
                Type::Float => Some(1),
                Type::Str => Some(1),
                Type::Top => Some(2),
                Type::Class(_) | Type::Unknown => None,
            }
        }
    }

    impl Default for FixtureEnvironment {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AstStore for FixtureEnvironment {
        fn get(&self, handle: &FileHandle) -> Option<Ast> {
            self.inner.asts.get(handle).map(|entry| entry.clone())
        }

        fn remove(&self, handles: &[FileHandle]) {
            for handle in handles {
                self.inner.asts.remove(handle);
            }
        }

        fn parse_and_store(&self, handle: &FileHandle, content: &str) -> Option<Ast> {
            let ast = parse_fixture_source(content)?;
            self.inner.asts.insert(handle.clone(), ast.clone());
            Some(ast)
        }
    }

    impl Environment for FixtureEnvironment {
        fn class_definition(&self, class: &str) -> Option<ClassDefinition> {
            self.inner.classes.get(class).map(|entry| entry.clone())
        }

        fn module_definition(&self, qualifier: &str) -> Option<FileHandle> {
            self.inner.modules.get(qualifier).map(|entry| entry.clone())
        }

        fn resolve_global(&self, name: &str) -> Option<Type> {
            self.inner.globals.get(name).map(|entry| entry.clone())
        }

        fn dependents(&self, qualifiers: &[String]) -> BTreeSet<FileHandle> {
            let targets: BTreeSet<&str> = qualifiers.iter().map(String::as_str).collect();
            let mut result = BTreeSet::new();
            for entry in self.inner.imports.iter() {
                let dependent_qualifier = entry.key();
                if entry.value().iter().any(|dep| targets.contains(dep.as_str())) {
                    if let Some(handle) = self.inner.modules.get(dependent_qualifier) {
                        result.insert(handle.clone());
                    }
                }
            }
            result
        }

        fn parse_type(&self, expr: &str) -> Result<Type> {
            let expr = expr.trim();
            if let Some(ty) = Self::lattice_type(expr) {
                return Ok(ty);
            }
            if self.inner.classes.contains_key(expr) {
                return Ok(Type::Class(expr.to_string()));
            }
            Err(Error::untracked(expr))
        }

        fn join(&self, a: &Type, b: &Type) -> Result<Type> {
            if !self.is_tracked(a) {
                return Err(Error::untracked(a.to_string()));
            }
            if !self.is_tracked(b) {
                return Err(Error::untracked(b.to_string()));
            }
            if a == b {
                return Ok(a.clone());
            }
            if let (Type::Class(ca), Type::Class(cb)) = (a, b) {
                if self.class_is_subclass(ca, cb) {
                    return Ok(b.clone());
                }
                if self.class_is_subclass(cb, ca) {
                    return Ok(a.clone());
                }
                return Ok(Type::Top);
            }
            match (Self::rank(a), Self::rank(b)) {
                (Some(ra), Some(rb)) if ra == 0 => Ok(b.clone()),
                (Some(ra), Some(_)) if ra == 0 => Ok(b.clone()),
                (Some(_), Some(rb)) if rb == 0 => Ok(a.clone()),
                _ => Ok(Type::Top),
            }
        }

        fn meet(&self, a: &Type, b: &Type) -> Result<Type> {
            if !self.is_tracked(a) {
                return Err(Error::untracked(a.to_string()));
            }
            if !self.is_tracked(b) {
                return Err(Error::untracked(b.to_string()));
            }
            if a == b {
                return Ok(a.clone());
            }
            if let (Type::Class(ca), Type::Class(cb)) = (a, b) {
                if self.class_is_subclass(ca, cb) {
                    return Ok(a.clone());
                }
                if self.class_is_subclass(cb, ca) {
                    return Ok(b.clone());
                }
                return Ok(Type::Bottom);
            }
            match (a, b) {
                (Type::Top, other) | (other, Type::Top) => Ok(other.clone()),
                _ => Ok(Type::Bottom),
            }
        }

        fn less_or_equal(&self, a: &Type, b: &Type) -> Result<bool> {
            if !self.is_tracked(a) {
                return Err(Error::untracked(a.to_string()));
            }
            if !self.is_tracked(b) {
                return Err(Error::untracked(b.to_string()));
            }
            if a == b || matches!(b, Type::Top) || matches!(a, Type::Bottom) {
                return Ok(true);
            }
            if let (Type::Class(ca), Type::Class(cb)) = (a, b) {
                return Ok(self.class_is_subclass(ca, cb));
            }
            Ok(false)
        }

        fn signature(&self, name: &str) -> Option<Vec<Overload>> {
            self.inner.signatures.get(name).map(|entry| entry.clone())
        }

        fn purge(&self, handles: &[FileHandle]) {
            for handle in handles {
                let qualifier = handle.qualifier();
                self.inner.modules.remove(&qualifier);
                self.inner.imports.remove(&qualifier);

                if let Some((_, names)) = self.inner.classes_by_qualifier.remove(&qualifier) {
                    for name in names {
                        self.inner.classes.remove(&format!("{qualifier}.{name}"));
                        remove_if_still_owned(&self.inner.classes, &self.inner.class_owner, &name, &qualifier);
                    }
                }
                if let Some((_, names)) = self.inner.globals_by_qualifier.remove(&qualifier) {
                    for name in names {
                        remove_if_still_owned(&self.inner.globals, &self.inner.global_owner, &name, &qualifier);
                    }
                }
                if let Some((_, names)) = self.inner.signatures_by_qualifier.remove(&qualifier) {
                    for name in names {
                        remove_if_still_owned(&self.inner.signatures, &self.inner.signature_owner, &name, &qualifier);
                    }
                }
            }
        }

        fn repopulate(&self, asts: &[(FileHandle, Ast)]) {
            // Pass 1: insert every binding/class as each file is visited, so
            // `superclass_chain` below can see bases defined in a sibling
            // file of this same batch.
            for (handle, ast) in asts {
                let qualifier = handle.qualifier();
                self.inner.modules.insert(qualifier.clone(), handle.clone());
                self.inner
                    .imports
                    .insert(qualifier.clone(), ast.imports.iter().cloned().collect());

                let mut global_names = Vec::new();
                for binding in &ast.bindings {
                    self.inner.globals.insert(binding.name.clone(), binding.annotation.clone());
                    self.inner.global_owner.insert(binding.name.clone(), qualifier.clone());
                    global_names.push(binding.name.clone());
                }
                self.inner.globals_by_qualifier.insert(qualifier.clone(), global_names);

                let mut class_names = Vec::new();
                let mut signature_names = Vec::new();
                for class in &ast.classes {
                    // "Protocol inference over classes" — namespaced by
                    // qualifier so two modules may each define `Foo`.
                    let namespaced = format!("{qualifier}.{}", class.name);
                    self.inner.classes.insert(namespaced.clone(), class.clone());
                    self.inner.classes.insert(class.name.clone(), class.clone());
                    self.inner.class_owner.insert(class.name.clone(), qualifier.clone());
                    class_names.push(class.name.clone());

                    let overloads: Vec<Overload> = class
                        .methods
                        .iter()
                        .map(|m| Overload {
                            return_type: m.return_annotation.clone(),
                            parameters: m.parameters.clone(),
                        })
                        .collect();
                    if !overloads.is_empty() {
                        self.inner.signatures.insert(class.name.clone(), overloads);
                        self.inner.signature_owner.insert(class.name.clone(), qualifier.clone());
                        signature_names.push(class.name.clone());
                    }
                }
                self.inner.classes_by_qualifier.insert(qualifier.clone(), class_names);
                self.inner.signatures_by_qualifier.insert(qualifier.clone(), signature_names);
            }

            // Pass 2: now that every class in this batch is visible, widen
            // each one's stored `superclasses` from "immediate parent only"
            // to the full ancestor chain, matching `ClassDefinition`'s
            // documented contract. `superclass_chain` reads `.first()` at
            // each step, which is still the immediate parent either way, so
            // this doesn't change what `join`/`meet`/`less_or_equal` see.
            for (_, ast) in asts {
                for class in &ast.classes {
                    let chain: Vec<Type> = self.superclass_chain(&class.name).into_iter().map(Type::Class).collect();
                    if chain.len() <= 1 {
                        continue;
                    }
                    if let Some(qualifier) = self.inner.class_owner.get(&class.name).map(|e| e.clone()) {
                        if let Some(mut def) = self.inner.classes.get_mut(&format!("{qualifier}.{}", class.name)) {
                            def.superclasses = chain.clone();
                        }
                    }
                    if let Some(mut def) = self.inner.classes.get_mut(&class.name) {
                        def.superclasses = chain;
                    }
                }
            }
        }

        fn register_ignores(&self, handles: &[FileHandle]) {
            let mut ignored = self.inner.ignored.write().expect("ignore registry poisoned");
            for handle in handles {
                ignored.insert(handle.clone());
            }
        }

        fn purge_resolution(&self, names: &[String]) {
            let mut memo = self.inner.resolution_memo.write().expect("resolution memo poisoned");
            for name in names {
                memo.remove(name);
            }
        }

        fn analyze(&self, handles: &[FileHandle]) -> Vec<ErrorRecord> {
            let mut errors = Vec::new();
            for handle in handles {
                let Some(ast) = self.get(handle) else { continue };
                for binding in &ast.bindings {
                    if matches!(binding.annotation, Type::Unknown) {
                        errors.push(ErrorRecord {
                            path: handle.clone(),
                            kind: "unknown-annotation".to_string(),
                            location: binding.location.clone(),
                            message: format!("Could not determine the type of `{}`", binding.name),
                        });
                    }
                }
            }
            errors
        }

        fn annotation_at(&self, handle: &FileHandle, pos: Position) -> Option<(Location, Type)> {
            let ast = self.get(handle)?;
            ast.bindings
                .iter()
                .find(|b| b.location.start == pos)
                .map(|b| (b.location.clone(), b.annotation.clone()))
        }

        fn definition_at(&self, handle: &FileHandle, pos: Position) -> Option<Location> {
            let ast = self.get(handle)?;
            let name_at_pos = ast.bindings.iter().find(|b| b.location.start == pos)?.name.clone();
            ast.bindings
                .iter()
                .find(|b| b.name == name_at_pos && b.is_define)
                .map(|b| b.location.clone())
        }

        fn clear_attribute_memo(&self) {
            self.inner
                .attribute_memo_cleared
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Drops `map[name]` only if `owner[name]` still says `qualifier` — a
    /// bare (non-namespaced) key may have been overwritten by a different
    /// module since, in which case purging `qualifier` must leave it alone.
    fn remove_if_still_owned<V>(map: &DashMap<String, V>, owner: &DashMap<String, String>, name: &str, qualifier: &str) {
        let still_owned = owner.get(name).map(|o| o.as_str() == qualifier).unwrap_or(false);
        if still_owned {
            map.remove(name);
            owner.remove(name);
        }
    }

    /// A tiny fixture "language" standing in for the real lexer/parser this
    /// crate treats as out of scope (SPEC_FULL.md §1). Lines:
    ///   `import <qualifier>`
    ///   `<name>: <type> = ...`        (plain binding)
    ///   `def <name>(...) -> <type>:`  (top-level define)
    ///   `class <Name>(<Base>):` followed by indented `attr <name>: <type>`
    ///   and `def <name>(<params>) -> <type>:` lines.
    /// Returns `None` only if the fixture source is literally empty, to
    /// mirror "parse errors are silently absorbed" for blank/whitespace
    /// files (no AST, no contribution to repopulation).
    pub fn parse_fixture_source(content: &str) -> Option<Ast> {
        if content.trim().is_empty() {
            return None;
        }

        let mut ast = Ast::default();
        let mut current_class: Option<ClassDefinition> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(indented) = raw_line.strip_prefix(|c: char| c.is_whitespace()) {
                let indented = indented.trim();
                if let Some(class) = current_class.as_mut() {
                    if let Some(rest) = indented.strip_prefix("attr ") {
                        if let Some((name, ty)) = rest.split_once(':') {
                            class.attributes.push(Attribute {
                                name: name.trim().to_string(),
                                annotation: parse_type_literal(ty.trim()),
                            });
                        }
                        continue;
                    }
                    if let Some(rest) = indented.strip_prefix("def ") {
                        if let Some(method) = parse_def_signature(rest) {
                            class.methods.push(method);
                        }
                        continue;
                    }
                }
            }

            if let Some(rest) = line.strip_prefix("import ") {
                ast.imports.push(rest.trim().to_string());
                continue;
            }

            if let Some(rest) = line.strip_prefix("class ") {
                if let Some(class) = current_class.take() {
                    ast.classes.push(class);
                }
                let (name, base) = parse_class_header(rest);
                current_class = Some(ClassDefinition {
                    name,
                    attributes: Vec::new(),
                    methods: Vec::new(),
                    superclasses: base.into_iter().collect(),
                });
                continue;
            }

            if let Some(class) = current_class.take() {
                ast.classes.push(class);
            }

            if let Some(rest) = line.strip_prefix("def ") {
                if let Some(method) = parse_def_signature(rest) {
                    ast.bindings.push(Binding {
                        name: method.name.clone(),
                        annotation: method.return_annotation,
                        location: Location {
                            path: FileHandle::new(""),
                            start: Position::new(line_no, 0),
                            end: Position::new(line_no, raw_line.len() as u32),
                        },
                        is_define: true,
                    });
                }
                continue;
            }

            if let Some((name, rest)) = line.split_once(':') {
                let (type_part, _value) = rest.split_once('=').unwrap_or((rest, ""));
                ast.bindings.push(Binding {
                    name: name.trim().to_string(),
                    annotation: parse_type_literal(type_part.trim()),
                    location: Location {
                        path: FileHandle::new(""),
                        start: Position::new(line_no, 0),
                        end: Position::new(line_no, raw_line.len() as u32),
                    },
                    is_define: false,
                });
            }
        }

        if let Some(class) = current_class.take() {
            ast.classes.push(class);
        }

        Some(ast)
    }

    fn parse_type_literal(raw: &str) -> Type {
        match FixtureEnvironment::lattice_type(raw) {
            Some(ty) => ty,
            None if raw.is_empty() => Type::Unknown,
            None => Type::Class(raw.to_string()),
        }
    }

    fn parse_class_header(rest: &str) -> (String, Option<Type>) {
        let rest = rest.trim_end_matches(':');
        if let Some((name, bases)) = rest.split_once('(') {
            let base = bases.trim_end_matches(')').split(',').next().unwrap_or("").trim();
            let base = if base.is_empty() { None } else { Some(parse_type_literal(base)) };
            (name.trim().to_string(), base)
        } else {
            (rest.trim().to_string(), None)
        }
    }

    fn parse_def_signature(rest: &str) -> Option<Method> {
        let rest = rest.trim_end_matches(':');
        let (name, tail) = rest.split_once('(')?;
        let (params_raw, ret_raw) = tail.split_once(')')?;
        let return_annotation = ret_raw
            .trim()
            .strip_prefix("->")
            .map(|s| parse_type_literal(s.trim()))
            .unwrap_or(Type::Unknown);

        let mut parameters = Vec::new();
        for (i, param) in params_raw.split(',').enumerate() {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            if i == 0 && param == "self" {
                continue; // receiver parameter, dropped at the source (SPEC_FULL.md §4.3 Methods)
            }
            let (pname, ptype) = param.split_once(':').unwrap_or((param, ""));
            parameters.push(Parameter {
                name: Some(pname.trim().to_string()),
                annotation: parse_type_literal(ptype.trim()),
            });
        }

        Some(Method {
            name: name.trim().to_string(),
            parameters,
            return_annotation,
        })
    }

}
