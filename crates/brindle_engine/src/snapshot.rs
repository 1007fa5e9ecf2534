//! Session snapshots using `MessagePack`.
//!
//! A snapshot holds every fact with its handle, the session's network
//! memories, the state of every live match (pending with its sequence
//! number, fired, or suppressed by no-loop), the set globals, and the handle
//! and sequence counters. Restoring puts that state back as it was; no
//! constraint is evaluated, so matches that read globals since changed come
//! back unchanged. The network itself is not stored, only its shape (the id
//! and kind of every node), which must equal the restoring knowledge base's.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use brindle_foundation::{Error, ErrorKind, FactHandle, Object, Result, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agenda::Settled;
use crate::config::SessionConfig;
use crate::knowledge::KnowledgeBase;
use crate::network::{MemoryRecord, Network, NetworkMemory, NodeId};
use crate::rule::RuleId;
use crate::session::Session;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 2;

/// One fact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Handle the fact had.
    pub handle: FactHandle,
    /// Fully-qualified type name.
    pub type_name: String,
    /// The fact.
    pub object: Object,
}

/// One pending activation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Owning package of the rule.
    pub package: String,
    /// Rule name.
    pub rule: String,
    /// Matched facts.
    pub tuple: Vec<FactHandle>,
    /// Rule salience when the snapshot was taken.
    pub salience: i32,
    /// Creation order.
    pub sequence: u64,
}

/// One live match that is no longer pending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Owning package of the rule.
    pub package: String,
    /// Rule name.
    pub rule: String,
    /// Matched facts.
    pub tuple: Vec<FactHandle>,
    /// Fired or suppressed.
    pub state: Settled,
}

/// One node of the network the snapshot was taken against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id.
    pub node: NodeId,
    /// Node kind, as [`crate::NodeKind::label`] names it.
    pub label: String,
}

/// The persistent state of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Format version.
    pub version: u32,
    /// Shape of the network, in node id order.
    pub nodes: Vec<NodeRecord>,
    /// Facts in handle order.
    pub facts: Vec<FactRecord>,
    /// Network memories.
    pub memory: MemoryRecord,
    /// Pending activations in firing order.
    pub activations: Vec<ActivationRecord>,
    /// Live matches that fired or were suppressed.
    pub settled: Vec<MatchRecord>,
    /// Globals that have been set, in name order.
    pub globals: Vec<(String, Value)>,
    /// Next fact handle.
    pub next_handle: FactHandle,
    /// Next activation sequence number.
    pub next_sequence: u64,
}

impl SessionSnapshot {
    /// Captures a session.
    ///
    /// # Errors
    ///
    /// `SessionDisposed` for a disposed session, `Internal` if a match
    /// names a rule the session's network does not have.
    pub fn capture(session: &Session) -> Result<Self> {
        session.ensure_live()?;
        let network = session.network();
        let rule_name = |id: RuleId| {
            network
                .rule(id)
                .map(|rule| (rule.package.to_string(), rule.name.to_string()))
                .ok_or_else(|| Error::internal(format!("match of unknown rule {id}")))
        };

        let facts = session
            .memory()
            .iter()
            .map(|(handle, object)| FactRecord {
                handle,
                type_name: object.type_name().to_string(),
                object: object.clone(),
            })
            .collect();
        let activations = session
            .agenda()
            .pending()
            .into_iter()
            .map(|activation| {
                let (package, rule) = rule_name(activation.rule)?;
                Ok(ActivationRecord {
                    package,
                    rule,
                    tuple: activation.tuple,
                    salience: activation.salience,
                    sequence: activation.sequence,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let settled = session
            .agenda()
            .settled()
            .map(|(id, tuple, state)| {
                let (package, rule) = rule_name(id)?;
                Ok(MatchRecord {
                    package,
                    rule,
                    tuple: tuple.clone(),
                    state,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let globals = session
            .memory()
            .globals()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Ok(Self {
            version: SNAPSHOT_VERSION,
            nodes: shape(network),
            facts,
            memory: session.network_memory().to_record(),
            activations,
            settled,
            globals,
            next_handle: session.memory().next_handle(),
            next_sequence: session.agenda().next_sequence(),
        })
    }

    /// Rebuilds a session against a knowledge base.
    ///
    /// Facts get their original handles, and network memories and match
    /// states are put back as recorded. Pending activations keep their
    /// sequence numbers.
    ///
    /// # Errors
    ///
    /// `SnapshotMismatch` if the knowledge base's network has another shape,
    /// a recorded rule is missing, a match names a fact the snapshot does not
    /// hold, or a match is recorded twice. `UnknownType`, `UnknownGlobal`, or
    /// `TypeMismatch` if facts or globals do not fit the knowledge base.
    pub fn restore(&self, kb: &KnowledgeBase, config: SessionConfig) -> Result<Session> {
        check_shape(kb.network(), &self.nodes)?;
        let mut session = kb.unseeded_session(config);
        for (name, value) in &self.globals {
            session.set_global(name, value.clone())?;
        }
        for record in &self.facts {
            if record.type_name != record.object.type_name() {
                return Err(Error::snapshot_mismatch(format!(
                    "fact {} is tagged {} but holds a {}",
                    record.handle,
                    record.type_name,
                    record.object.type_name()
                )));
            }
            session.check_type(&record.object)?;
            session.memory_mut().put(record.handle, record.object.clone());
        }
        session.memory_mut().reserve_until(self.next_handle);

        let matches = NetworkMemory::from_record(&self.memory, kb.network(), session.memory())?;
        session.restore_network_memory(matches);

        for record in &self.activations {
            let rule = lookup_rule(kb, &record.package, &record.rule)?;
            check_tuple(&session, &record.tuple)?;
            let restored = session.agenda_mut().restore_pending(
                rule,
                record.tuple.clone(),
                record.salience,
                record.sequence,
            );
            if !restored {
                return Err(duplicate(&record.package, &record.rule, &record.tuple));
            }
        }
        for record in &self.settled {
            let rule = lookup_rule(kb, &record.package, &record.rule)?;
            check_tuple(&session, &record.tuple)?;
            let restored =
                session
                    .agenda_mut()
                    .restore_settled(rule, record.tuple.clone(), record.state);
            if !restored {
                return Err(duplicate(&record.package, &record.rule, &record.tuple));
            }
        }
        session.agenda_mut().set_next_sequence(self.next_sequence);
        debug!(
            facts = self.facts.len(),
            activations = self.activations.len(),
            settled = self.settled.len(),
            "restored session"
        );
        Ok(session)
    }
}

fn shape(network: &Network) -> Vec<NodeRecord> {
    network
        .nodes()
        .map(|(node, n)| NodeRecord {
            node,
            label: n.kind.label().to_string(),
        })
        .collect()
}

fn check_shape(network: &Network, recorded: &[NodeRecord]) -> Result<()> {
    let live = shape(network);
    if live == recorded {
        return Ok(());
    }
    let message = match live.iter().zip(recorded).find(|(a, b)| a != b) {
        Some((have, want)) => format!(
            "snapshot expects {} node {}, the network has {} node {}",
            want.label, want.node, have.label, have.node
        ),
        None => format!(
            "snapshot expects {} nodes, the network has {}",
            recorded.len(),
            live.len()
        ),
    };
    Err(Error::snapshot_mismatch(message))
}

fn lookup_rule(kb: &KnowledgeBase, package: &str, rule: &str) -> Result<RuleId> {
    kb.rule_id(package, rule).ok_or_else(|| {
        Error::snapshot_mismatch(format!("rule {package}.{rule} is not in the knowledge base"))
    })
}

fn check_tuple(session: &Session, tuple: &[FactHandle]) -> Result<()> {
    match tuple.iter().find(|h| session.get_fact(**h).is_none()) {
        Some(missing) => Err(Error::snapshot_mismatch(format!(
            "fact {missing} is matched but not stored"
        ))),
        None => Ok(()),
    }
}

fn duplicate(package: &str, rule: &str, tuple: &[FactHandle]) -> Error {
    Error::snapshot_mismatch(format!("rule {package}.{rule} records {tuple:?} twice"))
}

impl Session {
    /// Captures this session. See [`SessionSnapshot::capture`].
    ///
    /// # Errors
    ///
    /// As for [`SessionSnapshot::capture`].
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        SessionSnapshot::capture(self)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Serializes a snapshot to bytes using `MessagePack` format.
///
/// Uses named serialization to preserve struct field names.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(snapshot: &SessionSnapshot) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(snapshot).map_err(|e| Error::serialization(e.to_string()))
}

/// Deserializes a snapshot from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails or the snapshot was written in
/// another format version.
pub fn from_bytes(bytes: &[u8]) -> Result<SessionSnapshot> {
    let snapshot: SessionSnapshot =
        rmp_serde::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::snapshot_mismatch(format!(
            "snapshot version {} is not supported (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(snapshot)
}

/// Saves a snapshot to a file using `MessagePack` format.
///
/// Creates the file if it doesn't exist, or overwrites it if it does.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to,
/// or if serialization fails.
pub fn save_to_file<P: AsRef<Path>>(snapshot: &SessionSnapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| io_error("create", path, &e))?;
    let mut writer = BufWriter::new(file);
    let bytes = to_bytes(snapshot)?;
    writer
        .write_all(&bytes)
        .map_err(|e| io_error("write to", path, &e))?;
    writer.flush().map_err(|e| io_error("flush", path, &e))?;
    Ok(())
}

/// Loads a snapshot from a `MessagePack` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or if deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SessionSnapshot> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| io_error("open", path, &e))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| io_error("read", path, &e))?;
    from_bytes(&bytes)
}

fn io_error(action: &str, path: &Path, err: &std::io::Error) -> Error {
    Error::new(ErrorKind::IoError(format!(
        "failed to {action} file '{}': {err}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use brindle_foundation::Type;
    use brindle_language::ast::{Expr, PackageDecl, PatternDecl, RuleDecl, Statement};
    use brindle_language::{Catalog, TypeDef};

    fn knowledge_base() -> KnowledgeBase {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TypeDef::new("org.example.Cheese")
                    .field("type", Type::String)
                    .field("price", Type::Int),
            )
            .unwrap();
        let package = PackageDecl::new("org.example")
            .global("log", "java.util.List")
            .rule(
                RuleDecl::new("log")
                    .when(PatternDecl::new("Cheese").bind_field("$t", "type"))
                    .then(Statement::Expr(Expr::method(
                        Expr::name("log"),
                        "add",
                        vec![Expr::name("$t")],
                    ))),
            );
        KnowledgeBase::build(Arc::new(catalog), &[package]).unwrap()
    }

    fn cheese(kind: &str) -> Object {
        Object::new("org.example.Cheese")
            .with("type", kind)
            .with("price", 1)
    }

    #[test]
    fn restored_session_fires_what_was_pending() {
        let kb = knowledge_base();
        let mut session = kb.new_session().unwrap();
        session.set_global("log", Value::empty_list()).unwrap();
        session.insert(cheese("brie")).unwrap();
        assert_eq!(session.fire_all_rules().unwrap(), 1);
        let stilton = session.insert(cheese("stilton")).unwrap();

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.facts.len(), 2);
        assert_eq!(snapshot.activations.len(), 1);
        assert_eq!(snapshot.activations[0].tuple, vec![stilton]);

        let bytes = to_bytes(&snapshot).unwrap();
        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let mut restored = kb.restore_session(&decoded).unwrap();
        assert_eq!(restored.fire_all_rules().unwrap(), 1);
        assert_eq!(session.fire_all_rules().unwrap(), 1);
        assert_eq!(restored.get_global("log"), session.get_global("log"));

        let next = restored.insert(cheese("gouda")).unwrap();
        assert_eq!(next, session.insert(cheese("gouda")).unwrap());
    }

    #[test]
    fn unknown_rules_are_a_mismatch() {
        let kb = knowledge_base();
        let mut session = kb.new_session().unwrap();
        session.insert(cheese("brie")).unwrap();
        let mut snapshot = session.snapshot().unwrap();
        snapshot.activations[0].rule = "gone".to_string();
        let err = kb.restore_session(&snapshot).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::SnapshotMismatch(_)));
    }

    #[test]
    fn other_versions_are_rejected() {
        let kb = knowledge_base();
        let session = kb.new_session().unwrap();
        let mut snapshot = session.snapshot().unwrap();
        snapshot.version = 99;
        let bytes = rmp_serde::to_vec_named(&snapshot).unwrap();
        let err = from_bytes(&bytes).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::SnapshotMismatch(_)));
    }

    #[test]
    fn file_round_trip() {
        let kb = knowledge_base();
        let mut session = kb.new_session().unwrap();
        session.insert(cheese("brie")).unwrap();
        let snapshot = session.snapshot().unwrap();

        let temp_path = std::env::temp_dir().join("brindle_test_snapshot.msgpack");
        save_to_file(&snapshot, &temp_path).unwrap();
        let loaded = load_from_file(&temp_path).unwrap();
        assert_eq!(loaded, snapshot);
        let _ = std::fs::remove_file(&temp_path);

        let missing = load_from_file(std::env::temp_dir().join("brindle_missing.msgpack"));
        assert!(matches!(missing.unwrap_err().kind, ErrorKind::IoError(_)));
    }
}
