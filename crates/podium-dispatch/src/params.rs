//! Request parameters and call arguments.
//!
//! Path remainders arrive percent-encoded and positional while actions declare
//! named arguments. The helpers here move values between the two shapes.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Request parameters keyed by name.
pub type Params = Map<String, Value>;

/// Percent-decodes one path segment.
///
/// Malformed escapes are kept literally; decoded bytes that are not valid
/// UTF-8 become U+FFFD.
pub fn unquote(segment: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-decodes every remainder segment.
pub fn decode_remainder<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .map(|segment| unquote(segment.as_ref()))
        .collect()
}

/// Maps remainder segments onto declared argument names in declaration order.
///
/// A positional value replaces a keyword parameter of the same name. Segments
/// beyond the declared names are left for [`flatten_arguments`].
pub fn bind_remainder(arg_names: &[String], params: &Params, remainder: &[String]) -> Params {
    let mut bound = params.clone();
    for (name, value) in arg_names.iter().zip(remainder) {
        bound.insert(name.clone(), Value::String(value.clone()));
    }
    bound
}

/// Splits bound parameters into the arguments an action is called with.
///
/// Everything bound to a name stays named; remainder segments that no declared
/// name absorbed are passed positionally.
pub fn flatten_arguments(arg_names: &[String], params: Params, remainder: &[String]) -> Arguments {
    let positional = remainder
        .iter()
        .skip(arg_names.len())
        .map(|segment| Value::String(segment.clone()))
        .collect();
    Arguments {
        positional,
        named: params,
    }
}

/// Expands flat form keys into nested lists and mappings.
///
/// A `.` descends into a mapping and a `-N` suffix addresses item `N` of a
/// list, so `user.tags-0` and `user.tags-1` become `{"user": {"tags": [..]}}`.
/// Lists keep index order with gaps closed. A `name--repetitions` key only
/// makes sure `name` exists as a list.
pub fn variable_decode(params: &Params) -> Params {
    let mut root = Slot::Map(BTreeMap::new());
    for (key, value) in params {
        match key.strip_suffix("--repetitions") {
            Some(name) => root.ensure_list(&key_path(name)),
            None => root.insert(&key_path(key), value.clone()),
        }
    }
    match root.into_value() {
        Value::Object(decoded) => decoded,
        _ => Params::new(),
    }
}

enum Step {
    Key(String),
    Index(usize),
}

fn key_path(key: &str) -> Vec<Step> {
    let mut path = Vec::new();
    for part in key.split('.') {
        match part.rsplit_once('-') {
            Some((name, index)) if !name.is_empty() => match index.parse() {
                Ok(index) => {
                    path.push(Step::Key(name.to_string()));
                    path.push(Step::Index(index));
                }
                Err(_) => path.push(Step::Key(part.to_string())),
            },
            _ => path.push(Step::Key(part.to_string())),
        }
    }
    path
}

enum Slot {
    Leaf(Value),
    Map(BTreeMap<String, Slot>),
    List(BTreeMap<usize, Slot>),
}

impl Slot {
    fn child(&mut self, step: &Step) -> &mut Slot {
        match (self, step) {
            (Slot::Map(map), Step::Key(name)) => {
                map.entry(name.clone()).or_insert(Slot::Leaf(Value::Null))
            }
            (Slot::List(list), Step::Index(index)) => {
                list.entry(*index).or_insert(Slot::Leaf(Value::Null))
            }
            (slot, step) => {
                // a scalar or the other container kind is replaced
                *slot = match step {
                    Step::Key(_) => Slot::Map(BTreeMap::new()),
                    Step::Index(_) => Slot::List(BTreeMap::new()),
                };
                slot.child(step)
            }
        }
    }

    fn insert(&mut self, path: &[Step], value: Value) {
        match path.split_first() {
            Some((step, rest)) => self.child(step).insert(rest, value),
            None => *self = Slot::Leaf(value),
        }
    }

    fn ensure_list(&mut self, path: &[Step]) {
        match path.split_first() {
            Some((step, rest)) => self.child(step).ensure_list(rest),
            None => {
                if let Slot::Leaf(Value::Null) = self {
                    *self = Slot::List(BTreeMap::new());
                }
            }
        }
    }

    fn into_value(self) -> Value {
        match self {
            Slot::Leaf(value) => value,
            Slot::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(key, slot)| (key, slot.into_value()))
                    .collect(),
            ),
            Slot::List(list) => Value::Array(list.into_values().map(Slot::into_value).collect()),
        }
    }
}

/// Arguments an action is invoked with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    /// Surplus remainder segments, in path order.
    pub positional: Vec<Value>,
    /// Named arguments, validated when validation succeeded.
    pub named: Params,
}

impl Arguments {
    pub fn new(positional: Vec<Value>, named: Params) -> Self {
        Self { positional, named }
    }

    /// Looks up a named argument.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Looks up a named argument holding a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.named.get(name).and_then(Value::as_str)
    }

    /// Returns the positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }
}
