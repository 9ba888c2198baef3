//! Externalization rules for the main-process build.
//!
//! The main process runs inside Electron, which provides Node's builtin
//! modules and its own `electron` binding at runtime. Those identifiers must
//! never be bundled, so they are merged into whatever `external` rule the
//! caller configured.
//!
//! ## JSON shape
//!
//! ```json
//! { "external": ["sqlite3", { "pattern": "^@prisma/" }] }
//! ```
//!
//! A string is a single identifier, `{ "pattern": ... }` is a regular
//! expression, and an array mixes both. Any other shape is ignored (treated
//! as absent) with a warning.

use crate::error::Error;
use regex_lite::Regex;
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Module name of the host application's own binding layer.
pub const HOST_BINDING_MODULE: &str = "electron";

/// Scheme prefix that names a runtime builtin explicitly.
pub const BUILTIN_SCHEME: &str = "node:";

/// Node's builtin module list, including private (`_`-prefixed) ones.
const NODE_BUILTIN_MODULES: &[&str] = &[
    "_http_agent",
    "_http_client",
    "_http_common",
    "_http_incoming",
    "_http_outgoing",
    "_http_server",
    "_stream_duplex",
    "_stream_passthrough",
    "_stream_readable",
    "_stream_transform",
    "_stream_wrap",
    "_stream_writable",
    "_tls_common",
    "_tls_wrap",
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "inspector/promises",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// The fixed set of identifiers that are always externalized.
#[derive(Debug)]
pub struct BuiltinModules {
    ordered: Vec<String>,
    lookup: HashSet<String>,
}

impl BuiltinModules {
    fn compute() -> Self {
        let public: Vec<&str> = NODE_BUILTIN_MODULES
            .iter()
            .copied()
            .filter(|name| !name.starts_with('_'))
            .collect();

        let mut ordered: Vec<String> = public.iter().map(|name| (*name).to_string()).collect();
        ordered.push(HOST_BINDING_MODULE.to_string());
        ordered.extend(public.iter().map(|name| format!("{BUILTIN_SCHEME}{name}")));

        let lookup = ordered.iter().cloned().collect();
        Self { ordered, lookup }
    }

    /// Whether `source` is one of the builtin identifiers.
    #[must_use]
    pub fn contains(&self, source: &str) -> bool {
        self.lookup.contains(source)
    }

    /// Identifiers in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Builtin identifiers, computed once per process.
pub fn builtin_modules() -> &'static BuiltinModules {
    static BUILTINS: OnceLock<BuiltinModules> = OnceLock::new();
    BUILTINS.get_or_init(BuiltinModules::compute)
}

/// Caller-supplied predicate: `(source, importer, is_resolved) -> external?`.
pub type ExternalPredicate = Arc<dyn Fn(&str, Option<&str>, bool) -> bool + Send + Sync>;

/// One element of an [`ExternalRule::List`].
#[derive(Debug, Clone)]
pub enum ExternalEntry {
    /// Exact module identifier.
    Id(String),
    /// Regular expression tested against the import source.
    Pattern(Regex),
}

impl ExternalEntry {
    fn matches(&self, source: &str) -> bool {
        match self {
            Self::Id(id) => id == source,
            Self::Pattern(re) => re.is_match(source),
        }
    }

    fn from_json(value: &serde_json::Value) -> Result<Option<Self>, Error> {
        match value {
            serde_json::Value::String(id) => Ok(Some(Self::Id(id.clone()))),
            serde_json::Value::Object(map) => match map.get("pattern") {
                Some(serde_json::Value::String(pattern)) => {
                    let re = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })?;
                    Ok(Some(Self::Pattern(re)))
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

impl Serialize for ExternalEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_str(id),
            Self::Pattern(re) => serde_json::json!({ "pattern": re.as_str() }).serialize(serializer),
        }
    }
}

/// Which module identifiers the bundler must leave unresolved.
#[derive(Clone, Default)]
pub enum ExternalRule {
    /// No rule configured.
    #[default]
    Absent,
    /// A single identifier.
    Id(String),
    /// A single pattern.
    Pattern(Regex),
    /// A collection of identifiers and patterns.
    List(Vec<ExternalEntry>),
    /// Arbitrary caller logic.
    Predicate(ExternalPredicate),
}

impl fmt::Debug for ExternalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::List(entries) => f.debug_tuple("List").field(entries).finish(),
            Self::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl ExternalRule {
    /// Wrap a predicate closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, Option<&str>, bool) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Whether `source` is externalized by this rule.
    #[must_use]
    pub fn is_external(&self, source: &str, importer: Option<&str>, is_resolved: bool) -> bool {
        match self {
            Self::Absent => false,
            Self::Id(id) => id == source,
            Self::Pattern(re) => re.is_match(source),
            Self::List(entries) => entries.iter().any(|e| e.matches(source)),
            Self::Predicate(f) => f(source, importer, is_resolved),
        }
    }

    /// Exact identifiers carried by the rule (patterns and predicates excluded).
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Id(id) => vec![id.as_str()],
            Self::List(entries) => entries
                .iter()
                .filter_map(|e| match e {
                    ExternalEntry::Id(id) => Some(id.as_str()),
                    ExternalEntry::Pattern(_) => None,
                })
                .collect(),
            Self::Absent | Self::Pattern(_) | Self::Predicate(_) => Vec::new(),
        }
    }

    /// Whether parts of this rule cannot be expressed as plain identifiers.
    #[must_use]
    pub fn has_dynamic_parts(&self) -> bool {
        match self {
            Self::Pattern(_) | Self::Predicate(_) => true,
            Self::List(entries) => entries.iter().any(|e| matches!(e, ExternalEntry::Pattern(_))),
            Self::Absent | Self::Id(_) => false,
        }
    }

    /// Parse the JSON form of a rule.
    ///
    /// Unrecognized shapes widen to [`ExternalRule::Absent`]; invalid
    /// patterns are errors.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        match value {
            serde_json::Value::Null => Ok(Self::Absent),
            serde_json::Value::Array(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    match ExternalEntry::from_json(item)? {
                        Some(entry) => entries.push(entry),
                        None => warn!(entry = %item, "Ignoring unrecognized external entry"),
                    }
                }
                Ok(Self::List(entries))
            }
            other => match ExternalEntry::from_json(other)? {
                Some(ExternalEntry::Id(id)) => Ok(Self::Id(id)),
                Some(ExternalEntry::Pattern(re)) => Ok(Self::Pattern(re)),
                None => {
                    warn!(rule = %other, "Unrecognized external rule, treating as absent");
                    Ok(Self::Absent)
                }
            },
        }
    }
}

impl Serialize for ExternalRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Predicates cannot cross a process boundary.
            Self::Absent | Self::Predicate(_) => serializer.serialize_none(),
            Self::Id(id) => serializer.serialize_str(id),
            Self::Pattern(re) => ExternalEntry::Pattern(re.clone()).serialize(serializer),
            Self::List(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for entry in entries {
                    seq.serialize_element(entry)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExternalRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}

/// Merge the builtin identifiers into `rule`.
///
/// The caller's rule is left untouched; every identifier it externalized
/// is still externalized by the result.
#[must_use]
pub fn with_external_builtins(rule: &ExternalRule) -> ExternalRule {
    let builtins = builtin_modules();
    let builtin_entries = || -> Vec<ExternalEntry> {
        builtins.iter().map(|id| ExternalEntry::Id(id.to_string())).collect()
    };

    match rule {
        ExternalRule::Absent => ExternalRule::List(builtin_entries()),
        ExternalRule::Id(id) => {
            let mut entries = builtin_entries();
            entries.push(ExternalEntry::Id(id.clone()));
            ExternalRule::List(entries)
        }
        ExternalRule::Pattern(re) => {
            let mut entries = builtin_entries();
            entries.push(ExternalEntry::Pattern(re.clone()));
            ExternalRule::List(entries)
        }
        ExternalRule::List(existing) => {
            let mut entries = builtin_entries();
            entries.extend(existing.iter().cloned());
            ExternalRule::List(entries)
        }
        ExternalRule::Predicate(original) => {
            let original = Arc::clone(original);
            ExternalRule::predicate(move |source, importer, is_resolved| {
                builtins.contains(source) || original(source, importer, is_resolved)
            })
        }
    }
}
