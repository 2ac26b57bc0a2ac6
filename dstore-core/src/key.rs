/// Entity keys
///
/// A key is a namespace plus an ordered path of (kind, identifier) elements.
/// Every element but the last must carry an identifier; a key whose last
/// element has none is incomplete and gets its id from the service.

use crate::validation::{validate_id, validate_kind, validate_name, validate_namespace};
use crate::value::Int;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one path element.
///
/// Variant order gives the service ordering: numeric ids sort before names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    Id(i64),
    Name(String),
}

/// One (kind, identifier) element of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub id: Option<KeyId>,
}

/// A token of a flat key path: `[kind, identifier, kind, identifier, ...]`
///
/// Kinds must be `Text`. Identifiers are `Text` (a name), `Number` or `Int`
/// (a numeric id).
#[derive(Debug, Clone, PartialEq)]
pub enum PathToken {
    Text(String),
    Number(i64),
    Int(Int),
}

impl From<&str> for PathToken {
    fn from(s: &str) -> Self {
        PathToken::Text(s.to_string())
    }
}

impl From<String> for PathToken {
    fn from(s: String) -> Self {
        PathToken::Text(s)
    }
}

impl From<i64> for PathToken {
    fn from(n: i64) -> Self {
        PathToken::Number(n)
    }
}

impl From<i32> for PathToken {
    fn from(n: i32) -> Self {
        PathToken::Number(n as i64)
    }
}

impl From<Int> for PathToken {
    fn from(i: Int) -> Self {
        PathToken::Int(i)
    }
}

/// Build a `Vec<PathToken>` from mixed kinds and identifiers.
///
/// ```
/// use dstore_core::{path, Key};
///
/// let key = Key::from_path(path!["Company", "Acme", "Employee", 5]).unwrap();
/// assert_eq!(key.kind(), "Employee");
/// assert_eq!(key.id(), Some(5));
/// ```
#[macro_export]
macro_rules! path {
    ($($token:expr),* $(,)?) => {
        vec![$($crate::PathToken::from($token)),*]
    };
}

/// Options form of key construction
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    pub namespace: Option<String>,
    pub path: Vec<PathToken>,
}

impl KeyOptions {
    pub fn new(path: Vec<PathToken>) -> Self {
        Self {
            namespace: None,
            path,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Entity key
///
/// Deserialization goes through the same checks as `Key::from_elements`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawKey")]
pub struct Key {
    namespace: Option<String>,
    path: Vec<PathElement>,
}

/// Unchecked wire form of a key
#[derive(Deserialize)]
struct RawKey {
    namespace: Option<String>,
    path: Vec<PathElement>,
}

impl TryFrom<RawKey> for Key {
    type Error = Error;

    fn try_from(raw: RawKey) -> Result<Self> {
        Key::from_elements(raw.namespace, raw.path)
    }
}

impl Key {
    /// Build a key from a flat path in the default namespace
    pub fn from_path<I, T>(path: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<PathToken>,
    {
        Self::build(None, path.into_iter().map(Into::into).collect())
    }

    /// Build a key from options (namespace + flat path)
    pub fn with_options(options: KeyOptions) -> Result<Self> {
        Self::build(options.namespace, options.path)
    }

    /// Incomplete key of a root kind
    pub fn incomplete(kind: impl Into<String>) -> Result<Self> {
        Self::from_elements(None, vec![element(kind.into(), None)?])
    }

    /// Complete key of a root kind with a string name
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Self::from_elements(None, vec![element(kind.into(), Some(KeyId::Name(name.into())))?])
    }

    /// Complete key of a root kind with a numeric id
    pub fn with_id(kind: impl Into<String>, id: i64) -> Result<Self> {
        Self::from_elements(None, vec![element(kind.into(), Some(KeyId::Id(id)))?])
    }

    /// Key built from already-typed path elements
    pub fn from_elements(namespace: Option<String>, path: Vec<PathElement>) -> Result<Self> {
        let namespace = normalize_namespace(namespace)?;
        if path.is_empty() {
            return Err(Error::InvalidKey("key path must not be empty".to_string()));
        }
        let last = path.len() - 1;
        for (i, elem) in path.iter().enumerate() {
            validate_kind(&elem.kind)?;
            match &elem.id {
                Some(KeyId::Id(id)) => validate_id(*id)?,
                Some(KeyId::Name(name)) => validate_name(name)?,
                None if i < last => {
                    return Err(Error::InvalidKey(format!(
                        "ancestor element '{}' has no identifier",
                        elem.kind
                    )))
                }
                None => {}
            }
        }
        Ok(Self { namespace, path })
    }

    fn build(namespace: Option<String>, tokens: Vec<PathToken>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::InvalidKey("key path must not be empty".to_string()));
        }
        let mut elements = Vec::with_capacity(tokens.len().div_ceil(2));
        let mut iter = tokens.into_iter();
        while let Some(kind) = iter.next() {
            let kind = match kind {
                PathToken::Text(kind) => kind,
                other => {
                    return Err(Error::InvalidKey(format!(
                        "expected a kind, got identifier {:?}",
                        other
                    )))
                }
            };
            let id = match iter.next() {
                None => None,
                Some(PathToken::Text(name)) => Some(KeyId::Name(name)),
                Some(PathToken::Number(n)) => Some(KeyId::Id(n)),
                Some(PathToken::Int(i)) => Some(KeyId::Id(i.value())),
            };
            elements.push(PathElement { kind, id });
        }
        Self::from_elements(namespace, elements)
    }

    /// Child key under this (complete) key; the identifier is a name or an id
    pub fn child(&self, kind: impl Into<String>, id: impl Into<PathToken>) -> Result<Self> {
        let id = match id.into() {
            PathToken::Text(name) => KeyId::Name(name),
            PathToken::Number(n) => KeyId::Id(n),
            PathToken::Int(i) => KeyId::Id(i.value()),
        };
        self.push_child(element(kind.into(), Some(id))?)
    }

    /// Child key with a string name under this (complete) key
    pub fn child_named(&self, kind: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        self.push_child(element(kind.into(), Some(KeyId::Name(name.into())))?)
    }

    /// Child key with a numeric id under this (complete) key
    pub fn child_with_id(&self, kind: impl Into<String>, id: i64) -> Result<Self> {
        self.push_child(element(kind.into(), Some(KeyId::Id(id)))?)
    }

    /// Incomplete child key under this (complete) key
    pub fn incomplete_child(&self, kind: impl Into<String>) -> Result<Self> {
        self.push_child(element(kind.into(), None)?)
    }

    fn push_child(&self, elem: PathElement) -> Result<Self> {
        if self.is_incomplete() {
            return Err(Error::InvalidKey(format!(
                "cannot add a child to incomplete key {}",
                self
            )));
        }
        let mut path = self.path.clone();
        path.push(elem);
        Self::from_elements(self.namespace.clone(), path)
    }

    /// Same path in another namespace
    pub fn in_namespace(self, namespace: impl Into<String>) -> Result<Self> {
        Self::from_elements(Some(namespace.into()), self.path)
    }

    /// Complete an incomplete key with a service-allocated id
    pub fn complete_with_id(&self, id: i64) -> Result<Self> {
        if !self.is_incomplete() {
            return Err(Error::InvalidKey(format!("key {} is already complete", self)));
        }
        validate_id(id)?;
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.id = Some(KeyId::Id(id));
        }
        Ok(Self {
            namespace: self.namespace.clone(),
            path,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Kind of the last path element
    pub fn kind(&self) -> &str {
        &self.last().kind
    }

    /// Numeric id of the last path element, if it has one
    pub fn id(&self) -> Option<i64> {
        match &self.last().id {
            Some(KeyId::Id(id)) => Some(*id),
            _ => None,
        }
    }

    /// String name of the last path element, if it has one
    pub fn name(&self) -> Option<&str> {
        match &self.last().id {
            Some(KeyId::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.path
    }

    /// Reconstruct the flat path. Integer-wrapper ids come back as numbers.
    pub fn path(&self) -> Vec<PathToken> {
        let mut tokens = Vec::with_capacity(self.path.len() * 2);
        for elem in &self.path {
            tokens.push(PathToken::Text(elem.kind.clone()));
            match &elem.id {
                Some(KeyId::Id(id)) => tokens.push(PathToken::Number(*id)),
                Some(KeyId::Name(name)) => tokens.push(PathToken::Text(name.clone())),
                None => {}
            }
        }
        tokens
    }

    /// Parent key, `None` for a root key
    pub fn parent(&self) -> Option<Key> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Key {
            namespace: self.namespace.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.last().id.is_some()
    }

    pub fn is_incomplete(&self) -> bool {
        !self.is_complete()
    }

    /// Ancestor keys, nearest first
    pub fn ancestors(&self) -> Vec<Key> {
        (1..self.path.len())
            .rev()
            .map(|len| Key {
                namespace: self.namespace.clone(),
                path: self.path[..len].to_vec(),
            })
            .collect()
    }

    /// True when `ancestor` is this key or one of its ancestors
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        self.namespace == ancestor.namespace && self.path.starts_with(&ancestor.path)
    }

    /// Strict form of `has_ancestor`: the key itself does not count
    pub fn is_descendant_of(&self, ancestor: &Key) -> bool {
        self.path.len() > ancestor.path.len() && self.has_ancestor(ancestor)
    }

    fn last(&self) -> &PathElement {
        // Construction guarantees a non-empty path.
        &self.path[self.path.len() - 1]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}:", ns)?;
        }
        for (i, elem) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match &elem.id {
                Some(KeyId::Id(id)) => write!(f, "{}({})", elem.kind, id)?,
                Some(KeyId::Name(name)) => write!(f, "{}('{}')", elem.kind, name)?,
                None => write!(f, "{}(?)", elem.kind)?,
            }
        }
        Ok(())
    }
}

fn element(kind: String, id: Option<KeyId>) -> Result<PathElement> {
    validate_kind(&kind)?;
    Ok(PathElement { kind, id })
}

fn normalize_namespace(namespace: Option<String>) -> Result<Option<String>> {
    match namespace {
        Some(ns) if ns.is_empty() => Ok(None),
        Some(ns) => {
            validate_namespace(&ns)?;
            Ok(Some(ns))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_complete() {
        let key = Key::from_path(path!["Company", "Acme", "Employee", 42]).unwrap();
        assert_eq!(key.kind(), "Employee");
        assert_eq!(key.id(), Some(42));
        assert!(key.is_complete());

        let parent = key.parent().unwrap();
        assert_eq!(parent.kind(), "Company");
        assert_eq!(parent.name(), Some("Acme"));
        assert!(parent.parent().is_none());
    }

    #[test]
    fn test_trailing_kind_is_incomplete() {
        let key = Key::from_path(path!["Company", "Acme", "Employee"]).unwrap();
        assert!(key.is_incomplete());
        assert_eq!(key.id(), None);
        assert_eq!(key.name(), None);
    }

    #[test]
    fn test_path_round_trip() {
        let tokens = path!["Company", "Acme", "Employee", 7];
        let key = Key::from_path(tokens.clone()).unwrap();
        assert_eq!(key.path(), tokens);
    }

    #[test]
    fn test_int_identifier_normalizes_to_number() {
        let key = Key::from_path(path!["Task", Int::new(99)]).unwrap();
        assert_eq!(key.path(), path!["Task", 99]);
        assert_eq!(key, Key::with_id("Task", 99).unwrap());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(Key::from_path(Vec::<PathToken>::new()).is_err());
        assert!(Key::from_path(path![5, "Task"]).is_err());
        assert!(Key::from_path(path!["Task", 0]).is_err());
        assert!(Key::from_path(path!["", "x"]).is_err());
    }

    #[test]
    fn test_equality_is_path_and_namespace() {
        let a = Key::with_options(KeyOptions::new(path!["Task", "a"]).namespace("ns")).unwrap();
        let b = Key::with_options(KeyOptions::new(path!["Task", "a"]).namespace("ns")).unwrap();
        let c = Key::from_path(path!["Task", "a"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_namespace_is_default() {
        let a = Key::with_options(KeyOptions::new(path!["Task", "a"]).namespace("")).unwrap();
        let b = Key::from_path(path!["Task", "a"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.namespace(), None);
    }

    #[test]
    fn test_ordering_ids_before_names() {
        let by_id = Key::with_id("Task", 1000).unwrap();
        let by_name = Key::named("Task", "a").unwrap();
        assert!(by_id < by_name);
        assert!(Key::with_id("Task", 2).unwrap() < Key::with_id("Task", 10).unwrap());
    }

    #[test]
    fn test_children_and_ancestry() {
        let root = Key::named("User", "alice").unwrap();
        let child = root.child_with_id("Post", 3).unwrap();
        assert!(child.has_ancestor(&root));
        assert!(child.has_ancestor(&child));
        assert!(!root.has_ancestor(&child));

        assert!(child.is_descendant_of(&root));
        assert!(!child.is_descendant_of(&child));
        assert_eq!(child, root.child("Post", 3).unwrap());
        assert_eq!(root.child("Post", "p").unwrap().name(), Some("p"));

        let grandchild = child.child_named("Comment", "c1").unwrap();
        assert_eq!(grandchild.ancestors(), vec![child.clone(), root.clone()]);
        assert!(root.ancestors().is_empty());

        let incomplete = root.incomplete_child("Post").unwrap();
        assert!(incomplete.incomplete_child("Comment").is_err());
    }

    #[test]
    fn test_complete_with_id() {
        let key = Key::incomplete("Task").unwrap();
        let done = key.complete_with_id(17).unwrap();
        assert_eq!(done.id(), Some(17));
        assert!(done.complete_with_id(18).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let key = Key::from_path(path!["User", "alice", "Post", 3]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(serde_json::from_str::<Key>(&json).unwrap(), key);

        let empty = r#"{"namespace":null,"path":[]}"#;
        assert!(serde_json::from_str::<Key>(empty).is_err());

        let reserved = r#"{"namespace":null,"path":[{"kind":"__Reserved","id":{"Id":4}}]}"#;
        assert!(serde_json::from_str::<Key>(reserved).is_err());

        let negative = r#"{"namespace":null,"path":[{"kind":"Task","id":{"Id":-4}}]}"#;
        assert!(serde_json::from_str::<Key>(negative).is_err());

        let orphan = r#"{"namespace":null,"path":[{"kind":"Leaf","id":null},{"kind":"X","id":{"Id":1}}]}"#;
        assert!(serde_json::from_str::<Key>(orphan).is_err());

        let bad_namespace = r#"{"namespace":"no spaces","path":[{"kind":"Task","id":{"Id":1}}]}"#;
        assert!(serde_json::from_str::<Key>(bad_namespace).is_err());
    }

    #[test]
    fn test_display() {
        let key = Key::from_path(path!["User", "alice", "Post", 3]).unwrap();
        assert_eq!(key.to_string(), "User('alice')/Post(3)");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn token() -> impl Strategy<Value = PathToken> {
            prop_oneof![
                (1i64..i64::MAX).prop_map(PathToken::from),
                "[a-z][a-z0-9]{0,10}".prop_map(PathToken::from),
            ]
        }

        proptest! {
            #[test]
            fn prop_serde_round_trip(
                elements in prop::collection::vec(("[A-Z][a-z]{0,8}", token()), 1..5),
                incomplete_kind in proptest::option::of("[A-Z][a-z]{0,8}"),
            ) {
                let mut path: Vec<PathToken> = elements
                    .into_iter()
                    .flat_map(|(kind, id)| [PathToken::from(kind), id])
                    .collect();
                if let Some(kind) = incomplete_kind {
                    path.push(PathToken::from(kind));
                }
                let key = Key::from_path(path.clone()).unwrap();
                prop_assert_eq!(key.path(), path);

                let json = serde_json::to_string(&key).unwrap();
                prop_assert_eq!(serde_json::from_str::<Key>(&json).unwrap(), key);
            }
        }
    }
}
