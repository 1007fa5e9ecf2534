//! Per-package symbol table.
//!
//! Resolves the short names used inside rules to catalog types, static
//! callables, locally declared functions and globals. Every binding is fixed
//! before any rule runs; nothing is looked up by name at match or fire time.
//!
//! Precedence for callables is local function, then explicit function import,
//! then wildcard function import. For types it is explicit import, then a type
//! in the same package, then wildcard imports.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use brindle_foundation::Type;
use tracing::debug;

use crate::ast::AliasPolicy;
use crate::catalog::{Catalog, NativeFunction, QualifiedName, TypeDef};
use crate::diagnostics::{CompileError, CompileErrorKind};
use crate::expr::FunctionTable;

// =============================================================================
// Resolved references
// =============================================================================

/// A resolved type.
#[derive(Clone, Debug)]
pub struct TypeRef {
    def: Arc<TypeDef>,
}

impl TypeRef {
    /// Returns the type definition.
    #[must_use]
    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    /// Returns the fully-qualified name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        self.def.full_name()
    }

    /// Returns the static type of instances.
    #[must_use]
    pub fn as_type(&self) -> Type {
        self.def.as_type()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.def.full_name() == other.def.full_name()
    }
}

impl Eq for TypeRef {}

/// How a callable name came into scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingOrigin {
    /// Declared in the same package.
    Local,
    /// `import function holder.name`.
    StaticImport,
    /// `import function holder.*`.
    WildcardImport,
}

/// A callable signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter types in order.
    pub params: Vec<Type>,
    /// Return type.
    pub ret: Type,
}

/// What a resolved call invokes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallableTarget {
    /// A host function from the catalog.
    Native(NativeFunction),
    /// A package-local function, by index in the package's function table.
    Local(usize),
}

/// A resolved callable binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallableRef {
    /// Name as written at the call site.
    pub name: Arc<str>,
    /// How the name was bound.
    pub origin: BindingOrigin,
    /// Selected overload.
    pub signature: Signature,
    /// What to invoke.
    pub target: CallableTarget,
}

impl CallableRef {
    fn native(function: &NativeFunction, origin: BindingOrigin) -> Self {
        Self {
            name: Arc::from(function.name()),
            origin,
            signature: Signature {
                params: function.params().to_vec(),
                ret: function.ret().clone(),
            },
            target: CallableTarget::Native(function.clone()),
        }
    }

    /// Returns the holder type for imported callables.
    #[must_use]
    pub fn holder(&self) -> Option<&QualifiedName> {
        match &self.target {
            CallableTarget::Native(function) => Some(function.holder()),
            CallableTarget::Local(_) => None,
        }
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            CallableTarget::Native(function) => write!(f, "{}", function.qualified_name()),
            CallableTarget::Local(_) => write!(f, "function {}", self.name),
        }
    }
}

/// A function declared in the package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFunction {
    /// Function name.
    pub name: Arc<str>,
    /// Signature.
    pub signature: Signature,
}

#[derive(Clone, Debug)]
enum ImportedCallable {
    Explicit {
        holder: QualifiedName,
        overloads: Vec<NativeFunction>,
    },
    Wildcard {
        overloads: Vec<NativeFunction>,
    },
}

// =============================================================================
// Overload selection
// =============================================================================

/// Picks one overload for the given argument types.
///
/// An exact match of arity and every parameter type wins; otherwise a single
/// compatible overload (after int-to-float widening, nil, and `any`) is
/// chosen. Two exact matches, or two compatible ones with no exact match,
/// are ambiguous.
///
/// # Errors
///
/// Returns `AmbiguousSymbol` on a tie and `TypeMismatch` if nothing fits.
pub fn select_overload(
    name: &str,
    candidates: &[(&[Type], String)],
    args: &[Type],
) -> Result<usize, CompileError> {
    let arity: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, (params, _))| params.len() == args.len())
        .map(|(i, _)| i)
        .collect();
    if arity.is_empty() {
        return Err(CompileError::type_mismatch(format!(
            "no overload of '{name}' takes {} argument(s)",
            args.len()
        ))
        .with_symbol(name));
    }

    let exact: Vec<usize> = arity
        .iter()
        .copied()
        .filter(|&i| {
            candidates[i]
                .0
                .iter()
                .zip(args)
                .all(|(param, arg)| param == arg && *arg != Type::Any)
        })
        .collect();
    match exact.as_slice() {
        [only] => return Ok(*only),
        [] => {}
        many => return Err(ambiguous_overloads(name, candidates, many)),
    }

    let compatible: Vec<usize> = arity
        .iter()
        .copied()
        .filter(|&i| {
            candidates[i]
                .0
                .iter()
                .zip(args)
                .all(|(param, arg)| param.accepts(arg))
        })
        .collect();
    match compatible.as_slice() {
        [only] => Ok(*only),
        [] => {
            let shown: Vec<String> = args.iter().map(ToString::to_string).collect();
            Err(CompileError::type_mismatch(format!(
                "no overload of '{name}' accepts ({})",
                shown.join(", ")
            ))
            .with_symbol(name))
        }
        many => Err(ambiguous_overloads(name, candidates, many)),
    }
}

fn ambiguous_overloads(name: &str, candidates: &[(&[Type], String)], picks: &[usize]) -> CompileError {
    let labels: Vec<String> = picks.iter().map(|&i| candidates[i].1.clone()).collect();
    CompileError::ambiguous(name, &labels)
}

/// Resolves a static call `Type.name(args)` against one type's callables.
///
/// # Errors
///
/// Returns `UnresolvedSymbol` if the type declares no callable with that
/// name, or the errors of [`select_overload`].
pub fn resolve_static_call(
    def: &TypeDef,
    name: &str,
    args: &[Type],
) -> Result<CallableRef, CompileError> {
    let overloads: Vec<&NativeFunction> = def.functions_named(name).collect();
    if overloads.is_empty() {
        return Err(CompileError::unresolved(
            "static method",
            &format!("{}.{name}", def.full_name()),
        ));
    }
    let candidates: Vec<(&[Type], String)> = overloads
        .iter()
        .map(|f| (f.params(), format!("{f:?}")))
        .collect();
    let index = select_overload(name, &candidates, args)?;
    Ok(CallableRef::native(overloads[index], BindingOrigin::StaticImport))
}

// =============================================================================
// SymbolTable
// =============================================================================

/// Names visible inside one package.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    package: QualifiedName,
    catalog: Arc<Catalog>,
    type_imports: BTreeMap<String, Arc<TypeDef>>,
    type_conflicts: BTreeMap<String, Vec<String>>,
    type_wildcards: Vec<QualifiedName>,
    callables: BTreeMap<String, ImportedCallable>,
    callable_conflicts: BTreeMap<String, Vec<String>>,
    locals: Vec<LocalFunction>,
    globals: BTreeMap<String, Type>,
    functions: Arc<FunctionTable>,
}

impl SymbolTable {
    /// Creates an empty table for a package.
    #[must_use]
    pub fn new(package: &str, catalog: Arc<Catalog>) -> Self {
        Self {
            package: QualifiedName::parse(package),
            catalog,
            type_imports: BTreeMap::new(),
            type_conflicts: BTreeMap::new(),
            type_wildcards: Vec::new(),
            callables: BTreeMap::new(),
            callable_conflicts: BTreeMap::new(),
            locals: Vec::new(),
            globals: BTreeMap::new(),
            functions: Arc::new(FunctionTable::empty(package)),
        }
    }

    /// Returns the package name.
    #[must_use]
    pub fn package(&self) -> &QualifiedName {
        &self.package
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    // -------------------------------------------------------------------------
    // Types
    // -------------------------------------------------------------------------

    /// Registers `import a.b.C`.
    ///
    /// Importing the same type twice is harmless. Importing a different type
    /// under an already-bound short name is a `DuplicateImport`; the first
    /// binding stays, and later uses of the short name are ambiguous.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` if the type is not in the catalog, `DuplicateImport`
    /// on a clash.
    pub fn register_import(&mut self, name: &str) -> Result<(), CompileError> {
        let Some(def) = self.catalog.get(name).cloned() else {
            return Err(CompileError::unresolved("import", name));
        };
        let short = def.name().simple_name().to_string();
        if let Some(existing) = self.type_imports.get(&short) {
            if existing.full_name() == def.full_name() {
                return Ok(());
            }
            let existing = existing.full_name().to_string();
            let colliding = vec![existing.clone(), def.full_name().to_string()];
            self.type_conflicts
                .entry(short.clone())
                .or_insert_with(|| vec![existing.clone()])
                .push(def.full_name().to_string());
            return Err(CompileError::new(
                CompileErrorKind::DuplicateImport,
                format!(
                    "'{short}' is already imported as '{existing}'; cannot also import '{}'",
                    def.full_name()
                ),
            )
            .with_symbol(colliding.join(", ")));
        }
        debug!(package = %self.package, import = %def.full_name(), "registered type import");
        self.type_imports.insert(short, def);
        Ok(())
    }

    /// Registers `import a.b.*`.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` if nothing in the catalog lives in that package.
    pub fn register_type_wildcard(&mut self, package: &str) -> Result<(), CompileError> {
        if self.catalog.types_in_package(package).next().is_none() {
            return Err(CompileError::unresolved("package", package));
        }
        let name = QualifiedName::parse(package);
        if !self.type_wildcards.contains(&name) {
            debug!(package = %self.package, wildcard = %name, "registered wildcard import");
            self.type_wildcards.push(name);
        }
        Ok(())
    }

    /// Resolves a type name as written in a rule.
    ///
    /// Dotted names resolve their first segment as a type and the rest as
    /// nested types (`Cheesery.Maturity`), falling back to a fully-qualified
    /// lookup.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` if nothing matches, `AmbiguousSymbol` if the short
    /// name is bound more than once.
    pub fn resolve_type(&self, name: &str) -> Result<TypeRef, CompileError> {
        let Some((head, rest)) = name.split_once('.') else {
            return self.resolve_simple_type(name);
        };
        match self.resolve_simple_type(head) {
            Ok(outer) => {
                let nested = format!("{}.{rest}", outer.full_name());
                self.catalog
                    .get(&nested)
                    .map(|def| TypeRef { def: Arc::clone(def) })
                    .ok_or_else(|| CompileError::unresolved("type", name))
            }
            Err(err) if err.kind == CompileErrorKind::AmbiguousSymbol => Err(err),
            Err(_) => self
                .catalog
                .get(name)
                .map(|def| TypeRef { def: Arc::clone(def) })
                .ok_or_else(|| CompileError::unresolved("type", name)),
        }
    }

    fn resolve_simple_type(&self, name: &str) -> Result<TypeRef, CompileError> {
        if let Some(colliding) = self.type_conflicts.get(name) {
            return Err(CompileError::ambiguous(name, colliding));
        }
        if let Some(def) = self.type_imports.get(name) {
            return Ok(TypeRef { def: Arc::clone(def) });
        }
        if let Some(def) = self.catalog.get(&self.package.child(name).full_name()) {
            return Ok(TypeRef { def: Arc::clone(def) });
        }
        let mut found: Vec<&Arc<TypeDef>> = Vec::new();
        for package in &self.type_wildcards {
            if let Some(def) = self.catalog.get(&package.child(name).full_name()) {
                if !found.iter().any(|d| d.full_name() == def.full_name()) {
                    found.push(def);
                }
            }
        }
        match found.as_slice() {
            [only] => Ok(TypeRef { def: Arc::clone(only) }),
            [] => self
                .catalog
                .get(name)
                .map(|def| TypeRef { def: Arc::clone(def) })
                .ok_or_else(|| CompileError::unresolved("type", name)),
            many => {
                let names: Vec<String> = many.iter().map(|d| d.full_name().to_string()).collect();
                Err(CompileError::ambiguous(name, &names))
            }
        }
    }

    /// Resolves a declared type name (globals, parameters) to a static type.
    ///
    /// Built-in names such as `String` or `java.util.List` are recognised
    /// before catalog types.
    ///
    /// # Errors
    ///
    /// The errors of [`SymbolTable::resolve_type`].
    pub fn resolve_value_type(&self, name: &str) -> Result<Type, CompileError> {
        if let Some(ty) = Type::from_builtin_name(name) {
            return Ok(ty);
        }
        self.resolve_type(name).map(|t| t.as_type())
    }

    // -------------------------------------------------------------------------
    // Callables
    // -------------------------------------------------------------------------

    /// Registers `import function holder.name` or `import function holder.*`.
    ///
    /// A wildcard import binds every static callable of the holder that is not
    /// already explicitly bound. An explicit import replaces a wildcard
    /// binding of the same name. Explicitly importing the same name from two
    /// different holders is a `Conflict`: the first binding is kept and later
    /// uses of the name are ambiguous.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` if the holder or named callable does not exist,
    /// `Conflict` on an explicit clash.
    pub fn register_function_import(
        &mut self,
        holder: &str,
        policy: &AliasPolicy,
    ) -> Result<(), CompileError> {
        let def = match self.resolve_type(holder) {
            Ok(type_ref) => Arc::clone(type_ref.def()),
            Err(_) => return Err(CompileError::unresolved("function holder", holder)),
        };
        match policy {
            AliasPolicy::Named(name) => self.import_named(&def, name),
            AliasPolicy::Wildcard => {
                self.import_wildcard(&def);
                Ok(())
            }
        }
    }

    fn import_named(&mut self, def: &TypeDef, name: &str) -> Result<(), CompileError> {
        let overloads: Vec<NativeFunction> = def.functions_named(name).cloned().collect();
        if overloads.is_empty() {
            return Err(CompileError::unresolved(
                "function",
                &format!("{}.{name}", def.full_name()),
            ));
        }
        if let Some(ImportedCallable::Explicit { holder, .. }) = self.callables.get(name) {
            if holder == def.name() {
                return Ok(());
            }
            let first = format!("{holder}.{name}");
            let second = format!("{}.{name}", def.full_name());
            self.callable_conflicts
                .entry(name.to_string())
                .or_insert_with(|| vec![first.clone()])
                .push(second.clone());
            return Err(CompileError::new(
                CompileErrorKind::Conflict,
                format!("function '{name}' is imported from both '{first}' and '{second}'"),
            )
            .with_symbol(name));
        }
        debug!(package = %self.package, function = %name, holder = %def.name(), "registered function import");
        self.callables.insert(
            name.to_string(),
            ImportedCallable::Explicit {
                holder: def.name().clone(),
                overloads,
            },
        );
        Ok(())
    }

    fn import_wildcard(&mut self, def: &TypeDef) {
        for function in def.functions() {
            match self.callables.get_mut(function.name()) {
                Some(ImportedCallable::Explicit { .. }) => {}
                Some(ImportedCallable::Wildcard { overloads }) => {
                    if !overloads.contains(function) {
                        overloads.push(function.clone());
                    }
                }
                None => {
                    self.callables.insert(
                        function.name().to_string(),
                        ImportedCallable::Wildcard {
                            overloads: vec![function.clone()],
                        },
                    );
                }
            }
        }
        debug!(package = %self.package, holder = %def.name(), "registered wildcard function import");
    }

    /// Declares a package-local function and returns its index.
    ///
    /// # Errors
    ///
    /// `InvalidExpression` if a function with the same name and parameter
    /// types is already declared.
    pub fn declare_function(
        &mut self,
        name: &str,
        signature: Signature,
    ) -> Result<usize, CompileError> {
        if self
            .locals
            .iter()
            .any(|f| &*f.name == name && f.signature.params == signature.params)
        {
            return Err(CompileError::invalid(format!(
                "function '{name}' is already declared with the same parameters"
            ))
            .with_symbol(name));
        }
        self.locals.push(LocalFunction {
            name: Arc::from(name),
            signature,
        });
        Ok(self.locals.len() - 1)
    }

    /// Returns the declared local functions, indexed as in the function table.
    #[must_use]
    pub fn local_functions(&self) -> &[LocalFunction] {
        &self.locals
    }

    /// Installs the compiled bodies of the local functions.
    pub fn install_functions(&mut self, functions: Arc<FunctionTable>) {
        self.functions = functions;
    }

    /// Returns the compiled local function table.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// Resolves a call `name(args)` by name and argument types.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` if no callable has that name, `AmbiguousSymbol` on a
    /// tie or an unresolved import conflict, `TypeMismatch` if no overload
    /// accepts the arguments.
    pub fn resolve_callable(&self, name: &str, args: &[Type]) -> Result<CallableRef, CompileError> {
        let locals: Vec<(usize, &LocalFunction)> = self
            .locals
            .iter()
            .enumerate()
            .filter(|(_, f)| &*f.name == name)
            .collect();
        if !locals.is_empty() {
            let candidates: Vec<(&[Type], String)> = locals
                .iter()
                .map(|(_, f)| (f.signature.params.as_slice(), format!("function {name}")))
                .collect();
            let pick = select_overload(name, &candidates, args)?;
            let (index, function) = locals[pick];
            return Ok(CallableRef {
                name: Arc::clone(&function.name),
                origin: BindingOrigin::Local,
                signature: function.signature.clone(),
                target: CallableTarget::Local(index),
            });
        }

        if let Some(colliding) = self.callable_conflicts.get(name) {
            return Err(CompileError::ambiguous(name, colliding));
        }

        let (overloads, origin) = match self.callables.get(name) {
            Some(ImportedCallable::Explicit { overloads, .. }) => {
                (overloads, BindingOrigin::StaticImport)
            }
            Some(ImportedCallable::Wildcard { overloads }) => {
                (overloads, BindingOrigin::WildcardImport)
            }
            None => return Err(CompileError::unresolved("function", name)),
        };
        let candidates: Vec<(&[Type], String)> = overloads
            .iter()
            .map(|f| (f.params(), format!("{f:?}")))
            .collect();
        let index = select_overload(name, &candidates, args)?;
        Ok(CallableRef::native(&overloads[index], origin))
    }

    // -------------------------------------------------------------------------
    // Globals
    // -------------------------------------------------------------------------

    /// Declares a global.
    ///
    /// # Errors
    ///
    /// `InvalidExpression` if the global is already declared with another type.
    pub fn declare_global(&mut self, name: &str, ty: Type) -> Result<(), CompileError> {
        if let Some(existing) = self.globals.get(name) {
            if *existing != ty {
                return Err(CompileError::invalid(format!(
                    "global '{name}' is already declared as {existing}"
                ))
                .with_symbol(name));
            }
            return Ok(());
        }
        self.globals.insert(name.to_string(), ty);
        Ok(())
    }

    /// Returns the declared type of a global.
    #[must_use]
    pub fn global_type(&self, name: &str) -> Option<&Type> {
        self.globals.get(name)
    }

    /// Returns all declared globals.
    #[must_use]
    pub fn globals(&self) -> &BTreeMap<String, Type> {
        &self.globals
    }
}
