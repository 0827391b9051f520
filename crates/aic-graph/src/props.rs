//! Ordered property trees with embedded tokens

use crate::error::ExecutionError;
use crate::token::{Resolve, Token};
use crate::types::LogicalId;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A single property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// A string, possibly deferred
    Token(Token),
    /// A boolean
    Bool(bool),
    /// An integer
    Int(i64),
    /// An ordered list
    List(Vec<PropValue>),
    /// A nested property map
    Map(Props),
}

/// Resource properties, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(IndexMap<String, PropValue>);

impl Props {
    /// Empty property map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert only when a value is present
    #[must_use]
    pub fn with_opt<V: Into<PropValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    /// Insert or replace `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Top-level value for `key`
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.0.get(key)
    }

    /// Follow a dotted path through nested maps
    pub fn get_path(&self, path: &str) -> Option<&PropValue> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every resource referenced anywhere in the tree
    pub fn references(&self) -> Vec<&LogicalId> {
        let mut out = Vec::new();
        for value in self.0.values() {
            value.collect_references(&mut out);
        }
        out
    }

    /// Render with tokens as template intrinsics
    pub fn to_template(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.0 {
            map.insert(key.clone(), value.to_template());
        }
        Value::Object(map)
    }

    pub(crate) fn resolve(&self, state: &dyn Resolve) -> Result<Value, ExecutionError> {
        let mut map = Map::new();
        for (key, value) in &self.0 {
            map.insert(key.clone(), value.resolve(state)?);
        }
        Ok(Value::Object(map))
    }
}

impl PropValue {
    /// The token, for string values
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            PropValue::Token(token) => Some(token),
            _ => None,
        }
    }

    /// The literal string, when known at build time
    pub fn as_str(&self) -> Option<&str> {
        self.as_token().and_then(Token::as_literal)
    }

    /// The boolean, for boolean values
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer, for integer values
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The items, for lists
    pub fn as_list(&self) -> Option<&[PropValue]> {
        match self {
            PropValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// The nested map, for maps
    pub fn as_map(&self) -> Option<&Props> {
        match self {
            PropValue::Map(props) => Some(props),
            _ => None,
        }
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a LogicalId>) {
        match self {
            PropValue::Token(token) => token.collect_references(out),
            PropValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            PropValue::Map(props) => {
                for value in props.0.values() {
                    value.collect_references(out);
                }
            }
            PropValue::Bool(_) | PropValue::Int(_) => {}
        }
    }

    /// Render with tokens as template intrinsics
    pub fn to_template(&self) -> Value {
        match self {
            PropValue::Token(token) => token.to_template(),
            PropValue::Bool(value) => Value::Bool(*value),
            PropValue::Int(value) => Value::from(*value),
            PropValue::List(items) => Value::Array(items.iter().map(PropValue::to_template).collect()),
            PropValue::Map(props) => props.to_template(),
        }
    }

    fn resolve(&self, state: &dyn Resolve) -> Result<Value, ExecutionError> {
        Ok(match self {
            PropValue::Token(token) => Value::String(token.resolve(state)?),
            PropValue::Bool(value) => Value::Bool(*value),
            PropValue::Int(value) => Value::from(*value),
            PropValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(state))
                    .collect::<Result<_, _>>()?,
            ),
            PropValue::Map(props) => props.resolve(state)?,
        })
    }
}

impl From<Token> for PropValue {
    fn from(value: Token) -> Self {
        PropValue::Token(value)
    }
}

impl From<&Token> for PropValue {
    fn from(value: &Token) -> Self {
        PropValue::Token(value.clone())
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Token(Token::literal(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Token(Token::literal(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<u16> for PropValue {
    fn from(value: u16) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<Props> for PropValue {
    fn from(value: Props) -> Self {
        PropValue::Map(value)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(value: Vec<T>) -> Self {
        PropValue::List(value.into_iter().map(Into::into).collect())
    }
}
