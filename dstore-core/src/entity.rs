/// Entity payloads
///
/// An entity pairs a key with a property map and the list of properties
/// that must not be indexed. Plain serializable values become entities by
/// pairing them with a key out of band: `(key, value)`.

use crate::key::Key;
use crate::value::{Properties, Value};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Key + data + index exclusions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Key,
    pub properties: Properties,
    #[serde(default)]
    pub exclude_from_indexes: Vec<String>,
}

impl Entity {
    /// Empty entity for a key
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: Properties::new(),
            exclude_from_indexes: Vec::new(),
        }
    }

    /// Entity from a key and an existing property map
    pub fn with_properties(key: Key, properties: Properties) -> Self {
        Self {
            key,
            properties,
            exclude_from_indexes: Vec::new(),
        }
    }

    /// Set a property (builder style)
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Mark properties as excluded from indexes (builder style)
    pub fn exclude_from_indexes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.exclude_from_indexes.contains(&name) {
                self.exclude_from_indexes.push(name);
            }
        }
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn is_indexed(&self, property: &str) -> bool {
        !self.exclude_from_indexes.iter().any(|p| p == property)
    }

    /// Index entries written for this entity (indexed properties only)
    pub fn index_entries(&self) -> u64 {
        self.properties
            .iter()
            .filter(|(name, _)| self.is_indexed(name))
            .map(|(_, value)| value.index_entries())
            .sum()
    }

    /// Copy keeping only the listed properties
    pub fn project(&self, properties: &[String]) -> Entity {
        let projected = self
            .properties
            .iter()
            .filter(|(name, _)| properties.iter().any(|p| p == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Entity::with_properties(self.key.clone(), projected)
    }

    /// Build an entity from any serializable value that maps to a JSON object
    pub fn from_serializable<T: Serialize>(key: Key, data: &T) -> Result<Self> {
        match Value::from_json(serde_json::to_value(data)?)? {
            Value::Entity(properties) => Ok(Self::with_properties(key, properties)),
            other => Err(Error::InvalidArgument(format!(
                "entity data must serialize to an object, got {:?}",
                other
            ))),
        }
    }

    /// Deserialize the property map into a plain value
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let json = Value::Entity(self.properties.clone()).to_json();
        Ok(serde_json::from_value(json)?)
    }
}

/// Anything that can be saved as one entity
pub trait IntoEntity {
    fn into_entity(self) -> Result<Entity>;
}

impl IntoEntity for Entity {
    fn into_entity(self) -> Result<Entity> {
        Ok(self)
    }
}

impl<T: Serialize> IntoEntity for (Key, T) {
    fn into_entity(self) -> Result<Entity> {
        Entity::from_serializable(self.0, &self.1)
    }
}

/// One entity or many
pub trait IntoEntities {
    fn into_entities(self) -> Result<Vec<Entity>>;
}

impl IntoEntities for Entity {
    fn into_entities(self) -> Result<Vec<Entity>> {
        Ok(vec![self])
    }
}

impl<T: Serialize> IntoEntities for (Key, T) {
    fn into_entities(self) -> Result<Vec<Entity>> {
        Ok(vec![self.into_entity()?])
    }
}

impl<E: IntoEntity> IntoEntities for Vec<E> {
    fn into_entities(self) -> Result<Vec<Entity>> {
        self.into_iter().map(IntoEntity::into_entity).collect()
    }
}

/// One key or many
pub trait IntoKeys {
    fn into_keys(self) -> Vec<Key>;
}

impl IntoKeys for Key {
    fn into_keys(self) -> Vec<Key> {
        vec![self]
    }
}

impl IntoKeys for &Key {
    fn into_keys(self) -> Vec<Key> {
        vec![self.clone()]
    }
}

impl IntoKeys for Vec<Key> {
    fn into_keys(self) -> Vec<Key> {
        self
    }
}

impl IntoKeys for &[Key] {
    fn into_keys(self) -> Vec<Key> {
        self.to_vec()
    }
}

impl IntoKeys for &Vec<Key> {
    fn into_keys(self) -> Vec<Key> {
        self.clone()
    }
}
