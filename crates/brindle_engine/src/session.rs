//! Stateful sessions.
//!
//! A [`Session`] owns a working memory, the network memories for its
//! knowledge base's network, and an agenda. Every insert, update, and retract
//! propagates through the network before returning; rules fire only when the
//! caller runs the firing loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use brindle_foundation::{
    Error, ErrorContext, ErrorKind, FactHandle, Object, Result, SemanticLimit, Type, Value,
};
use brindle_language::{
    Catalog, CompiledAction, CompiledExpr, Evaluator, FunctionTable, Scope,
};
use tracing::{debug, trace, warn};

use crate::agenda::{Activation, Agenda};
use crate::config::SessionConfig;
use crate::event::{RuleRef, SessionEvent, SessionListener};
use crate::network::{ActivationSink, Network, NetworkMemory, TerminalInfo};
use crate::rule::{CompiledRule, RuleId};
use crate::working_memory::WorkingMemory;

/// The declared globals of a knowledge base.
pub type GlobalTypes = BTreeMap<String, Type>;

/// A stateful rule session.
pub struct Session {
    network: Arc<Network>,
    catalog: Arc<Catalog>,
    global_types: Arc<GlobalTypes>,
    config: SessionConfig,
    memory: WorkingMemory,
    matches: NetworkMemory,
    agenda: Agenda,
    listeners: Vec<Box<dyn SessionListener + Send>>,
    halted: bool,
    disposed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("facts", &self.memory.len())
            .field("pending", &self.agenda.len())
            .field("listeners", &self.listeners.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session and primes the network with the root token.
    pub(crate) fn new(
        network: Arc<Network>,
        catalog: Arc<Catalog>,
        global_types: Arc<GlobalTypes>,
        config: SessionConfig,
    ) -> Result<Self> {
        let mut session = Self::unseeded(network, catalog, global_types, config);
        session.seed()?;
        Ok(session)
    }

    pub(crate) fn unseeded(
        network: Arc<Network>,
        catalog: Arc<Catalog>,
        global_types: Arc<GlobalTypes>,
        config: SessionConfig,
    ) -> Self {
        Self {
            network,
            catalog,
            global_types,
            config,
            memory: WorkingMemory::new(),
            matches: NetworkMemory::new(),
            agenda: Agenda::new(),
            listeners: Vec::new(),
            halted: false,
            disposed: false,
        }
    }

    /// Attaches a listener.
    pub fn add_listener(&mut self, listener: Box<dyn SessionListener + Send>) {
        self.listeners.push(listener);
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the network this session matches against.
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    // =========================================================================
    // Facts
    // =========================================================================

    /// Inserts a fact and propagates it.
    ///
    /// # Errors
    ///
    /// `UnknownType` if the fact's type is not in the catalog,
    /// `SessionDisposed` after [`Session::dispose`], or any error raised while
    /// evaluating constraints. On a constraint error the insert is rolled
    /// back: the fact is withdrawn from the network and removed again.
    pub fn insert(&mut self, fact: Object) -> Result<FactHandle> {
        self.ensure_live()?;
        self.check_type(&fact)?;
        let type_name = Arc::clone(fact.type_name_arc());
        let handle = self.memory.allocate();
        self.memory.put(handle, fact);
        debug!(fact = %handle, type_name = %type_name, "insert");
        self.notify(SessionEvent::FactInserted {
            handle,
            type_name: Arc::clone(&type_name),
        });
        if let Err(err) = self.propagate(handle, Direction::Assert) {
            warn!(fact = %handle, error = %err, "insert failed, rolling back");
            if let Err(undo) = self.propagate(handle, Direction::Retract) {
                warn!(fact = %handle, error = %undo, "rollback did not complete");
            }
            self.memory.remove(handle);
            self.notify(SessionEvent::FactRetracted { handle, type_name });
            return Err(err);
        }
        Ok(handle)
    }

    /// Replaces a fact, keeping its handle.
    ///
    /// Matches involving the fact are withdrawn and re-evaluated, so rules that
    /// already fired for it can fire again.
    ///
    /// # Errors
    ///
    /// `UnknownFact` for a retracted or foreign handle, `UnknownType`,
    /// `SessionDisposed`, or constraint evaluation errors.
    pub fn update(&mut self, handle: FactHandle, fact: Object) -> Result<()> {
        self.ensure_live()?;
        if !self.memory.contains(handle) {
            return Err(Error::unknown_fact(handle));
        }
        self.check_type(&fact)?;
        let type_name = Arc::clone(fact.type_name_arc());
        debug!(fact = %handle, type_name = %type_name, "update");
        self.propagate(handle, Direction::Retract)?;
        self.memory.put(handle, fact);
        self.notify(SessionEvent::FactUpdated { handle, type_name });
        self.propagate(handle, Direction::Assert)
    }

    /// Retracts a fact, cancelling every activation that involves it.
    ///
    /// # Errors
    ///
    /// `UnknownFact` for a retracted or foreign handle, `SessionDisposed`, or
    /// errors raised while re-evaluating matches the retraction unblocks.
    pub fn retract(&mut self, handle: FactHandle) -> Result<Object> {
        self.ensure_live()?;
        if !self.memory.contains(handle) {
            return Err(Error::unknown_fact(handle));
        }
        debug!(fact = %handle, "retract");
        let result = self.propagate(handle, Direction::Retract);
        let fact = self
            .memory
            .remove(handle)
            .ok_or_else(|| Error::unknown_fact(handle))?;
        self.notify(SessionEvent::FactRetracted {
            handle,
            type_name: Arc::clone(fact.type_name_arc()),
        });
        result.map(|()| fact)
    }

    /// Returns a live fact.
    #[must_use]
    pub fn get_fact(&self, handle: FactHandle) -> Option<&Object> {
        self.memory.get(handle)
    }

    /// Iterates over live facts in handle order.
    pub fn facts(&self) -> impl Iterator<Item = (FactHandle, &Object)> {
        self.memory.iter()
    }

    /// Returns the number of live facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.memory.len()
    }

    // =========================================================================
    // Globals
    // =========================================================================

    /// Sets a global declared by one of the knowledge base's packages.
    ///
    /// Constraints read globals when facts are matched; changing a global
    /// does not re-evaluate existing matches.
    ///
    /// # Errors
    ///
    /// `UnknownGlobal` if no package declares it, `TypeMismatch` if the value
    /// does not fit the declared type, `SessionDisposed`.
    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_live()?;
        self.assign_global(name, value.into())
    }

    /// Returns a global's value, if it has been set.
    #[must_use]
    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.memory.global(name)
    }

    fn assign_global(&mut self, name: &str, value: Value) -> Result<()> {
        let declared = self
            .global_types
            .get(name)
            .ok_or_else(|| Error::unknown_global(name))?;
        let actual = value.value_type();
        if !declared.accepts(&actual) {
            return Err(Error::type_mismatch(declared.clone(), actual));
        }
        self.memory.set_global(name, value);
        Ok(())
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Fires activations until the agenda is empty or a consequence halts.
    ///
    /// Returns the number of rules fired.
    ///
    /// # Errors
    ///
    /// `ConsequenceFailure` naming the rule if a consequence fails (the
    /// changes it made before failing are kept), `LimitExceeded` if the
    /// configured activation limit is reached, `SessionDisposed`.
    pub fn fire_all_rules(&mut self) -> Result<u32> {
        self.fire_loop(None)
    }

    /// Like [`Session::fire_all_rules`], but fires at most `max_count` rules.
    ///
    /// # Errors
    ///
    /// As for [`Session::fire_all_rules`].
    pub fn fire_until(&mut self, max_count: u32) -> Result<u32> {
        self.fire_loop(Some(max_count))
    }

    /// Returns the pending activations in firing order.
    #[must_use]
    pub fn activations(&self) -> Vec<Activation> {
        self.agenda.pending()
    }

    /// Returns true if the last firing loop was stopped by `halt()`.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Looks up a rule of this session's network.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Arc<CompiledRule>> {
        self.network.rule(id)
    }

    fn fire_loop(&mut self, max_count: Option<u32>) -> Result<u32> {
        self.ensure_live()?;
        self.halted = false;
        let mut fired: u32 = 0;
        loop {
            if max_count.is_some_and(|max| fired >= max) || self.halted {
                break;
            }
            let Some(next) = self.agenda.peek() else {
                break;
            };
            if let Some(limit) = self.config.max_activations {
                if fired >= limit {
                    let context = self.network.rule(next.rule).map(|r| r.qualified_name());
                    warn!(limit, rule = ?context, "activation limit reached");
                    return Err(Error::limit_exceeded(SemanticLimit::MaxActivations {
                        limit,
                        context,
                    }));
                }
            }
            let Some(activation) = self.agenda.pop() else {
                break;
            };
            let Some(rule) = self.network.rule(activation.rule).cloned() else {
                self.agenda.finish_firing();
                return Err(Error::internal(format!(
                    "activation for unknown rule {}",
                    activation.rule
                )));
            };
            if !activation.tuple.iter().all(|h| self.memory.contains(*h)) {
                trace!(rule = %rule.qualified_name(), "skipping stale activation");
                self.agenda.finish_firing();
                continue;
            }

            let rule_ref = RuleRef::new(activation.rule, &rule);
            debug!(
                rule = %rule_ref,
                tuple = ?activation.tuple,
                salience = activation.salience,
                sequence = activation.sequence,
                "firing"
            );
            self.notify(SessionEvent::BeforeFire {
                rule: rule_ref.clone(),
                tuple: activation.tuple.clone(),
                sequence: activation.sequence,
            });
            let outcome = self.execute(&rule, &activation.tuple);
            self.agenda.finish_firing();
            if let Err(source) = outcome {
                warn!(rule = %rule_ref, error = %source, "consequence failed");
                let context = ErrorContext::new()
                    .with_source(rule.qualified_name())
                    .with_frame(format!("rule {}", rule.name));
                return Err(Error::consequence_failure(&*rule.name, source).with_context(context));
            }
            fired += 1;
            self.notify(SessionEvent::AfterFire {
                rule: rule_ref,
                tuple: activation.tuple,
            });
            if self.halted {
                self.notify(SessionEvent::Halted);
            }
        }
        debug!(fired, pending = self.agenda.len(), "firing loop finished");
        Ok(fired)
    }

    fn execute(&mut self, rule: &CompiledRule, tuple: &[FactHandle]) -> Result<()> {
        let functions = Arc::clone(&rule.functions);
        let mut frame = vec![Value::Nil; rule.consequence.frame_size];
        for action in &rule.consequence.actions {
            match action {
                CompiledAction::Eval(expr) => {
                    self.eval(&functions, expr, tuple, &mut frame)?;
                }
                CompiledAction::Let { slot, value } => {
                    let value = self.eval(&functions, value, tuple, &mut frame)?;
                    let target = frame
                        .get_mut(*slot)
                        .ok_or_else(|| Error::internal(format!("frame slot {slot} out of range")))?;
                    *target = value;
                }
                CompiledAction::Insert(expr) => {
                    let value = self.eval(&functions, expr, tuple, &mut frame)?;
                    let Value::Object(fact) = value else {
                        return Err(Error::type_mismatch(
                            Type::object("fact"),
                            value.value_type(),
                        ));
                    };
                    self.insert(fact)?;
                }
                CompiledAction::Modify {
                    index,
                    var,
                    assignments,
                } => {
                    let handle = tuple_handle(tuple, *index, var)?;
                    let mut values = Vec::with_capacity(assignments.len());
                    for (field, expr) in assignments {
                        values.push((field, self.eval(&functions, expr, tuple, &mut frame)?));
                    }
                    let current = self
                        .memory
                        .get(handle)
                        .ok_or_else(|| Error::unknown_fact(handle))?;
                    let updated = values
                        .into_iter()
                        .fold(current.clone(), |obj, (field, value)| {
                            obj.set(Arc::clone(field), value)
                        });
                    self.update(handle, updated)?;
                }
                CompiledAction::Retract { index, var } => {
                    let handle = tuple_handle(tuple, *index, var)?;
                    self.retract(handle)?;
                }
                CompiledAction::SetGlobal { name, value } => {
                    let value = self.eval(&functions, value, tuple, &mut frame)?;
                    self.assign_global(name, value)?;
                }
                CompiledAction::Halt => {
                    debug!(rule = %rule.qualified_name(), "halt requested");
                    self.halted = true;
                }
            }
        }
        Ok(())
    }

    fn eval(
        &mut self,
        functions: &FunctionTable,
        expr: &CompiledExpr,
        tuple: &[FactHandle],
        frame: &mut [Value],
    ) -> Result<Value> {
        Evaluator::new(functions)
            .with_max_depth(self.config.max_call_depth)
            .eval(expr, Scope::tuple(tuple), frame, &mut self.memory)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Releases the session's facts and activations. Every later operation
    /// fails with `SessionDisposed`.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        debug!(facts = self.memory.len(), "disposing session");
        self.disposed = true;
        self.memory = WorkingMemory::new();
        self.matches = NetworkMemory::new();
        self.agenda.clear();
        self.notify(SessionEvent::Disposed);
    }

    /// Returns true once the session has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::new(ErrorKind::SessionDisposed));
        }
        Ok(())
    }

    // =========================================================================
    // Internals shared with snapshots
    // =========================================================================

    pub(crate) fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut WorkingMemory {
        &mut self.memory
    }

    pub(crate) fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub(crate) fn agenda_mut(&mut self) -> &mut Agenda {
        &mut self.agenda
    }

    pub(crate) fn check_type(&self, fact: &Object) -> Result<()> {
        if self.catalog.contains(fact.type_name()) {
            Ok(())
        } else {
            Err(Error::unknown_type(fact.type_name()))
        }
    }

    pub(crate) fn network_memory(&self) -> &NetworkMemory {
        &self.matches
    }

    pub(crate) fn restore_network_memory(&mut self, matches: NetworkMemory) {
        self.matches = matches;
    }

    fn seed(&mut self) -> Result<()> {
        let mut recorder = Recorder::new(&mut self.agenda, &self.network, !self.listeners.is_empty());
        let result = self.matches.seed(
            &self.network,
            &self.memory,
            &mut recorder,
            self.config.max_call_depth,
        );
        let events = recorder.events;
        self.dispatch(events);
        result
    }

    fn propagate(&mut self, handle: FactHandle, direction: Direction) -> Result<()> {
        let mut recorder = Recorder::new(&mut self.agenda, &self.network, !self.listeners.is_empty());
        let depth = self.config.max_call_depth;
        let result = match direction {
            Direction::Assert => {
                self.matches
                    .assert_fact(&self.network, handle, &self.memory, &mut recorder, depth)
            }
            Direction::Retract => {
                self.matches
                    .retract_fact(&self.network, handle, &self.memory, &mut recorder, depth)
            }
        };
        let events = recorder.events;
        self.dispatch(events);
        result
    }

    fn notify(&mut self, event: SessionEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    fn dispatch(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            self.notify(event);
        }
    }
}

fn tuple_handle(tuple: &[FactHandle], index: usize, var: &str) -> Result<FactHandle> {
    tuple
        .get(index)
        .copied()
        .ok_or_else(|| Error::internal(format!("'{var}' is not bound to a matched fact")))
}

#[derive(Clone, Copy)]
enum Direction {
    Assert,
    Retract,
}

/// Feeds terminal output into the agenda, recording events when asked to.
struct Recorder<'a> {
    agenda: &'a mut Agenda,
    network: &'a Network,
    record: bool,
    events: Vec<SessionEvent>,
}

impl<'a> Recorder<'a> {
    fn new(agenda: &'a mut Agenda, network: &'a Network, record: bool) -> Self {
        Self {
            agenda,
            network,
            record,
            events: Vec::new(),
        }
    }

    fn rule_ref(&self, id: RuleId) -> Option<RuleRef> {
        self.network.rule(id).map(|rule| RuleRef::new(id, rule))
    }
}

impl ActivationSink for Recorder<'_> {
    fn activate(&mut self, info: TerminalInfo, tuple: &[FactHandle]) {
        let Some(sequence) = self.agenda.activate(info, tuple) else {
            return;
        };
        trace!(rule = %info.rule, tuple = ?tuple, sequence, "activation created");
        if self.record {
            if let Some(rule) = self.rule_ref(info.rule) {
                self.events.push(SessionEvent::ActivationCreated {
                    rule,
                    tuple: tuple.to_vec(),
                    sequence,
                });
            }
        }
    }

    fn deactivate(&mut self, rule: RuleId, prefix: &[FactHandle]) {
        for cancelled in self.agenda.deactivate(rule, prefix) {
            trace!(rule = %rule, tuple = ?cancelled.tuple, "activation cancelled");
            if self.record {
                if let Some(rule) = self.rule_ref(rule) {
                    self.events.push(SessionEvent::ActivationCancelled {
                        rule,
                        tuple: cancelled.tuple,
                    });
                }
            }
        }
    }
}
