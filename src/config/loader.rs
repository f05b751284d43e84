//! YAML configuration loading with legacy ordered-dict tag support

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};
use yaml_rust2::scanner::{Scanner, Token, TokenType};

use crate::error::{Error, Result};

/// Fully resolved form of the tag older experiment tooling writes for ordered dicts
pub const LEGACY_ORDERED_DICT_TAG: &str =
    "tag:yaml.org,2002:python/object/apply:collections.OrderedDict";

const CORE_PREFIX: &str = "tag:yaml.org,2002:";

/// Local tag the legacy tag is rewritten to before the document reaches the YAML parser
const ORDERED_DICT_MARKER: &str = "rl_repro.ordered_dict";

/// Decoding rule for the legacy ordered-dict tag
#[derive(Debug)]
pub struct LegacyTagRule {
    tag: &'static str,
}

impl LegacyTagRule {
    fn matches(&self, resolved: &str) -> bool {
        resolved == self.tag
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

static LEGACY_TAG_RULE: OnceLock<LegacyTagRule> = OnceLock::new();

/// Register the legacy ordered-dict decoding rule for the whole process.
///
/// Only the first call initializes anything; later calls return the same rule.
pub fn register_legacy_tags() -> &'static LegacyTagRule {
    LEGACY_TAG_RULE.get_or_init(|| {
        tracing::debug!("Registering decoding rule for {}", LEGACY_ORDERED_DICT_TAG);
        LegacyTagRule {
            tag: LEGACY_ORDERED_DICT_TAG,
        }
    })
}

/// A loaded configuration document: option names to values, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    entries: Mapping,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(entries: Mapping) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a nested mapping, e.g. the hyperparameter block of one environment
    pub fn section(&self, key: &str) -> Option<&Mapping> {
        self.get(key).and_then(Value::as_mapping)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(Value::String(key.into()), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Option names in document order; non-string keys are skipped
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().filter_map(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.entries
    }

    pub fn into_mapping(self) -> Mapping {
        self.entries
    }

    /// Deserialize the whole document into a typed view
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(Value::Mapping(self.entries.clone()))
            .map_err(|e| Error::config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.entries).map_err(|e| Error::parse(e.to_string()))
    }
}

/// Loads YAML configuration documents.
///
/// Only the default YAML tags are accepted unless the legacy ordered-dict rule has been
/// registered, in which case `!!python/object/apply:collections.OrderedDict [[k, v], ...]`
/// decodes to `{environment: {k: v, ...}}` (or to the bare ordered mapping when the
/// loader has no environment). Every other `python/` tag is rejected.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    environment: Option<String>,
    legacy: Option<&'static LegacyTagRule>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader for hyperparameter documents saved for one environment
    pub fn for_environment(environment: impl Into<String>) -> Self {
        Self::new()
            .with_environment(environment)
            .register_legacy_tags()
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn register_legacy_tags(mut self) -> Self {
        self.legacy = Some(register_legacy_tags());
        self
    }

    pub fn legacy_rule(&self) -> Option<&'static LegacyTagRule> {
        self.legacy
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Configuration> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = self.load_str(&text).map_err(|e| e.at_path(path))?;
        tracing::debug!("Loaded {} options from {}", config.len(), path.display());
        Ok(config)
    }

    pub fn load_str(&self, text: &str) -> Result<Configuration> {
        let text = rewrite_tags(text, self.legacy)?;
        if is_blank_document(&text) {
            return Ok(Configuration::new());
        }

        let value: Value = serde_yaml::from_str(&text).map_err(|e| Error::parse(e.to_string()))?;
        match self.normalize(value)? {
            Value::Mapping(entries) => Ok(Configuration::from_mapping(entries)),
            Value::Null => Ok(Configuration::new()),
            other => Err(Error::parse(format!(
                "expected a mapping at the document root, found {}",
                kind(&other)
            ))),
        }
    }

    fn normalize(&self, value: Value) -> Result<Value> {
        match value {
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                if self.legacy.is_some() && tag == Tag::new(ORDERED_DICT_MARKER) {
                    self.decode_ordered_dict(value)
                } else {
                    Err(Error::parse(format!("unsupported tag `{tag}`")))
                }
            }
            Value::Mapping(entries) => {
                let mut normalized = Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    normalized.insert(self.normalize(key)?, self.normalize(value)?);
                }
                Ok(Value::Mapping(normalized))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.normalize(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    /// Decode the single sequence argument of the legacy constructor call
    fn decode_ordered_dict(&self, argument: Value) -> Result<Value> {
        let Value::Sequence(arguments) = argument else {
            return Err(Error::parse(format!(
                "ordered dict tag expects a sequence argument, found {}",
                kind(&argument)
            )));
        };
        let Some(Value::Sequence(pairs)) = arguments.into_iter().next() else {
            return Err(Error::parse(
                "ordered dict tag expects a list of [key, value] pairs as first argument",
            ));
        };

        let mut ordered = Mapping::with_capacity(pairs.len());
        for (index, pair) in pairs.into_iter().enumerate() {
            let Value::Sequence(pair) = pair else {
                return Err(Error::parse(format!(
                    "ordered dict entry {index} is {}, expected a [key, value] pair",
                    kind(&pair)
                )));
            };
            let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
                Error::parse(format!(
                    "ordered dict entry {index} has {} elements, expected 2",
                    pair.len()
                ))
            })?;
            ordered.insert(self.normalize(key)?, self.normalize(value)?);
        }

        Ok(match &self.environment {
            Some(environment) => {
                let mut wrapped = Mapping::with_capacity(1);
                wrapped.insert(Value::String(environment.clone()), Value::Mapping(ordered));
                Value::Mapping(wrapped)
            }
            None => Value::Mapping(ordered),
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn is_blank_document(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

/// Resolve a scanned tag to its full name using the document's `%TAG` handles.
///
/// Verbatim tags (`!<x>`) come out of the scanner with an empty handle.
fn resolve_tag(handles: &HashMap<String, String>, handle: &str, suffix: &str) -> Result<String> {
    if handle.is_empty() {
        return Ok(suffix.to_owned());
    }
    match handles.get(handle) {
        Some(prefix) => Ok(format!("{prefix}{suffix}")),
        None if handle == "!!" => Ok(format!("{CORE_PREFIX}{suffix}")),
        None if handle == "!" => Ok(format!("!{suffix}")),
        None => Err(Error::parse(format!("undefined tag handle `{handle}`"))),
    }
}

fn is_code_construction(resolved: &str) -> bool {
    resolved
        .strip_prefix(CORE_PREFIX)
        .unwrap_or_else(|| resolved.trim_start_matches('!'))
        .starts_with("python/")
}

/// Rewrite registered legacy tags to the local marker tag and reject code-construction tags.
///
/// Tags are located with the YAML scanner, so tag-like text inside scalars, block
/// scalars and comments is never touched.
fn rewrite_tags<'a>(text: &'a str, legacy: Option<&LegacyTagRule>) -> Result<Cow<'a, str>> {
    let mut handles = HashMap::new();
    let mut legacy_tags = Vec::new();
    let mut scanner = Scanner::new(text.chars());

    for Token(mark, token) in &mut scanner {
        match token {
            TokenType::TagDirective(handle, prefix) => {
                handles.insert(handle, prefix);
            }
            TokenType::Tag(handle, suffix) => {
                let resolved = resolve_tag(&handles, &handle, &suffix)?;
                if legacy.is_some_and(|rule| rule.matches(&resolved)) {
                    legacy_tags.push(mark.index());
                } else if is_code_construction(&resolved) {
                    return Err(Error::parse(format!("disallowed tag `{resolved}`")));
                }
            }
            _ => {}
        }
    }
    if let Some(error) = scanner.get_error() {
        return Err(Error::parse(error.to_string()));
    }
    if legacy_tags.is_empty() {
        return Ok(Cow::Borrowed(text));
    }
    legacy_tags.sort_unstable();

    let mut rewritten = String::with_capacity(text.len());
    let mut copied = 0;
    let mut offsets = text.char_indices().map(|(offset, _)| offset).enumerate();
    for index in legacy_tags {
        let Some((_, start)) = offsets.find(|&(i, _)| i == index) else {
            break;
        };
        let end = tag_end(text.as_bytes(), start);
        rewritten.push_str(&text[copied..start]);
        rewritten.push('!');
        rewritten.push_str(ORDERED_DICT_MARKER);
        copied = end;
    }
    rewritten.push_str(&text[copied..]);
    Ok(Cow::Owned(rewritten))
}

/// Byte offset just past the tag starting at `i`
fn tag_end(bytes: &[u8], i: usize) -> usize {
    if bytes.get(i + 1) == Some(&b'<') {
        return bytes[i..]
            .iter()
            .position(|&b| b == b'>')
            .map_or(bytes.len(), |offset| i + offset + 1);
    }
    bytes[i..]
        .iter()
        .position(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b',' | b']' | b'}'))
        .map_or(bytes.len(), |offset| i + offset)
}
