//! Knowledge bases: compiled packages plus the network built from them.
//!
//! A [`KnowledgeBuilder`] compiles packages and accumulates their
//! diagnostics; a [`KnowledgeBase`] is the error-free result. Sessions share
//! the knowledge base's network through an `Arc`. Adding or removing rules
//! copies the network on write, so sessions created earlier keep matching
//! against the network they started with.

use std::collections::BTreeMap;
use std::sync::Arc;

use brindle_foundation::Result;
use brindle_language::ast::{PackageDecl, RuleDecl};
use brindle_language::{Catalog, CompileError, CompileErrorKind, Diagnostics, SymbolTable};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::network::Network;
use crate::package::{CompiledPackage, compile_package};
use crate::rule::{CompiledRule, RuleCompiler, RuleId};
use crate::session::{GlobalTypes, Session};
use crate::snapshot::SessionSnapshot;

// =============================================================================
// KnowledgeBuilder
// =============================================================================

/// Compiles packages and collects every problem found.
#[derive(Debug)]
pub struct KnowledgeBuilder {
    catalog: Arc<Catalog>,
    packages: Vec<CompiledPackage>,
    globals: GlobalTypes,
    diagnostics: Diagnostics,
}

impl KnowledgeBuilder {
    /// Creates a builder over a catalog.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            packages: Vec::new(),
            globals: GlobalTypes::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Compiles a package. Problems are recorded, not returned.
    pub fn add_package(&mut self, decl: &PackageDecl) -> &mut Self {
        let (package, diags) = compile_package(decl, &self.catalog);
        self.diagnostics.extend(diags.into_errors());
        if self.packages.iter().any(|p| p.name == package.name) {
            self.diagnostics.push(duplicate_package(&package.name));
            return self;
        }
        self.diagnostics
            .extend(merge_globals(&mut self.globals, &package));
        self.packages.push(package);
        self
    }

    /// Returns true if any package had errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// Returns every diagnostic recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[CompileError] {
        self.diagnostics.errors()
    }

    /// Builds the knowledge base.
    ///
    /// # Errors
    ///
    /// Every recorded error if any package had errors; no partial knowledge
    /// base is produced.
    pub fn build(self) -> std::result::Result<KnowledgeBase, Vec<CompileError>> {
        if self.has_errors() {
            return Err(self
                .diagnostics
                .into_errors()
                .into_iter()
                .filter(CompileError::is_error)
                .collect());
        }
        let mut network = Network::new();
        let mut errors = Vec::new();
        let mut packages = BTreeMap::new();
        for package in self.packages {
            for rule in package.rules.iter().filter(|r| r.enabled) {
                if let Err(err) = network.add_rule(Arc::clone(rule)) {
                    errors.push(err);
                }
            }
            packages.insert(Arc::clone(&package.name), Arc::clone(&package.symbols));
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        info!(
            packages = packages.len(),
            rules = network.rule_count(),
            nodes = network.node_count(),
            "built knowledge base"
        );
        Ok(KnowledgeBase {
            catalog: self.catalog,
            network: Arc::new(network),
            globals: Arc::new(self.globals),
            packages,
        })
    }
}

fn duplicate_package(name: &str) -> CompileError {
    CompileError::new(
        CompileErrorKind::BuildError,
        format!("package '{name}' is already part of the knowledge base"),
    )
    .with_package(name)
}

/// Adds a package's globals, rejecting a name declared with two types.
fn merge_globals(globals: &mut GlobalTypes, package: &CompiledPackage) -> Vec<CompileError> {
    let mut errors = Vec::new();
    for (name, ty) in package.globals() {
        match globals.get(name) {
            Some(existing) if existing != ty => errors.push(
                CompileError::new(
                    CompileErrorKind::BuildError,
                    format!("global '{name}' is declared as {existing} elsewhere and {ty} here"),
                )
                .with_package(&*package.name)
                .with_symbol(name),
            ),
            Some(_) => {}
            None => {
                globals.insert(name.to_string(), ty.clone());
            }
        }
    }
    errors
}

// =============================================================================
// KnowledgeBase
// =============================================================================

/// Compiled rules and the network built from them.
#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    catalog: Arc<Catalog>,
    network: Arc<Network>,
    globals: Arc<GlobalTypes>,
    packages: BTreeMap<Arc<str>, Arc<SymbolTable>>,
}

impl KnowledgeBase {
    /// Compiles packages into a knowledge base.
    ///
    /// # Errors
    ///
    /// Every compile error from every package.
    pub fn build(
        catalog: Arc<Catalog>,
        packages: &[PackageDecl],
    ) -> std::result::Result<Self, Vec<CompileError>> {
        let mut builder = KnowledgeBuilder::new(catalog);
        for package in packages {
            builder.add_package(package);
        }
        builder.build()
    }

    /// Compiles another package into this knowledge base.
    ///
    /// Returns the ids of the rules added. Existing sessions are unaffected.
    ///
    /// # Errors
    ///
    /// The package's compile errors, a `BuildError` if a package with the
    /// same name is present or a global clashes. Nothing is added on error.
    pub fn add_package(
        &mut self,
        decl: &PackageDecl,
    ) -> std::result::Result<Vec<RuleId>, Vec<CompileError>> {
        let (package, diags) = compile_package(decl, &self.catalog);
        if diags.has_errors() {
            return Err(diags.into_errors());
        }
        if self.packages.contains_key(&package.name) {
            return Err(vec![duplicate_package(&package.name)]);
        }
        let mut globals = (*self.globals).clone();
        let clashes = merge_globals(&mut globals, &package);
        if !clashes.is_empty() {
            return Err(clashes);
        }

        let mut network = (*self.network).clone();
        let mut ids = Vec::new();
        for rule in package.rules.iter().filter(|r| r.enabled) {
            ids.push(network.add_rule(Arc::clone(rule)).map_err(|err| vec![err])?);
        }
        debug!(package = %package.name, rules = ids.len(), "added package");
        self.network = Arc::new(network);
        self.globals = Arc::new(globals);
        self.packages.insert(package.name, package.symbols);
        Ok(ids)
    }

    /// Compiles one rule in the scope of an existing package and adds it.
    ///
    /// Returns `None` for a disabled rule, which is compiled but not added.
    ///
    /// # Errors
    ///
    /// `UnresolvedSymbol` for an unknown package, the rule's compile errors,
    /// or a `BuildError` if the package already has a rule with that name.
    pub fn add_rule(
        &mut self,
        package: &str,
        decl: &RuleDecl,
    ) -> std::result::Result<Option<RuleId>, Vec<CompileError>> {
        let symbols = self
            .packages
            .get(package)
            .ok_or_else(|| vec![CompileError::unresolved("package", package)])?;
        let rule = RuleCompiler::new(symbols).compile(decl)?;
        if !rule.enabled {
            return Ok(None);
        }
        let id = Arc::make_mut(&mut self.network)
            .add_rule(Arc::new(rule))
            .map_err(|err| vec![err])?;
        Ok(Some(id))
    }

    /// Removes a rule. Sessions created afterwards no longer see it.
    pub fn remove_rule(&mut self, id: RuleId) -> Option<Arc<CompiledRule>> {
        if self.network.rule(id).is_none() {
            return None;
        }
        Arc::make_mut(&mut self.network).remove_rule(id)
    }

    /// Looks up a rule by package and name.
    #[must_use]
    pub fn rule_id(&self, package: &str, name: &str) -> Option<RuleId> {
        self.network.rule_id(package, name)
    }

    /// Returns a rule.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Arc<CompiledRule>> {
        self.network.rule(id)
    }

    /// Returns the network.
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the declared globals of every package.
    #[must_use]
    pub fn globals(&self) -> &GlobalTypes {
        &self.globals
    }

    /// Returns the names of the compiled packages.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(|name| &**name)
    }

    /// Creates a session with the default configuration.
    ///
    /// # Errors
    ///
    /// Errors raised while priming rules whose first condition is a negation
    /// or an eval.
    pub fn new_session(&self) -> Result<Session> {
        self.new_session_with(SessionConfig::default())
    }

    /// Creates a session with the given configuration.
    ///
    /// # Errors
    ///
    /// As for [`KnowledgeBase::new_session`].
    pub fn new_session_with(&self, config: SessionConfig) -> Result<Session> {
        Session::new(
            Arc::clone(&self.network),
            Arc::clone(&self.catalog),
            Arc::clone(&self.globals),
            config,
        )
    }

    /// Rebuilds a session from a snapshot taken against this knowledge base.
    ///
    /// # Errors
    ///
    /// `SnapshotMismatch` if the snapshot names rules or matches this
    /// knowledge base does not have, `UnknownType` for facts of unknown types.
    pub fn restore_session(&self, snapshot: &SessionSnapshot) -> Result<Session> {
        snapshot.restore(self, SessionConfig::default())
    }

    pub(crate) fn unseeded_session(&self, config: SessionConfig) -> Session {
        Session::unseeded(
            Arc::clone(&self.network),
            Arc::clone(&self.catalog),
            Arc::clone(&self.globals),
            config,
        )
    }
}
