//! Contract registry
//!
//! Registration happens once at startup through `RegistryBuilder`; the
//! built `ContractRegistry` is immutable and read without locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TandemError};

use super::{ContractGroup, ContractSchema};

/// Resolved contracts of one group, keyed by id
#[derive(Debug)]
pub struct GroupTable {
    name: String,
    schemas: HashMap<u8, ContractSchema>,
}

impl GroupTable {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schemas: HashMap::new(),
        }
    }

    /// Schema registered under `id`
    pub fn resolve(&self, id: u8) -> Result<&ContractSchema> {
        self.schemas.get(&id).ok_or_else(|| {
            TandemError::Contract(format!(
                "{}[{}] has not been registered to be resolved",
                self.name, id
            ))
        })
    }

    pub fn contains(&self, id: u8) -> bool {
        self.schemas.contains_key(&id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.schemas.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate `schema` and insert it; nothing changes on failure
    fn insert(&mut self, schema: ContractSchema) -> Result<()> {
        schema.validate()?;

        if let Some(existing) = self.schemas.get(&schema.id()) {
            return Err(TandemError::Contract(format!(
                "\"{}\" cannot be assigned to {}[{}] because it is currently registered to \"{}\"",
                schema.name(),
                self.name,
                schema.id(),
                existing.name()
            )));
        }

        tracing::debug!(
            group = %self.name,
            id = schema.id(),
            members = schema.members().len(),
            "registered contract {}",
            schema.name()
        );
        for member in schema.members() {
            tracing::trace!("\t[{}] {} : {}", member.order, member.name, member.kind);
        }

        self.schemas.insert(schema.id(), schema);
        Ok(())
    }
}

/// Immutable set of registered contract groups
#[derive(Debug)]
pub struct ContractRegistry {
    groups: HashMap<String, Arc<GroupTable>>,
}

impl ContractRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Table of a registered group
    pub fn group(&self, name: &str) -> Result<Arc<GroupTable>> {
        self.groups
            .get(name)
            .cloned()
            .ok_or_else(|| TandemError::Contract(format!("group \"{}\" is not registered", name)))
    }

    /// Group names in ascending order
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects groups before freezing them into a `ContractRegistry`
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    groups: HashMap<String, GroupTable>,
}

impl RegistryBuilder {
    /// Register every contract of `group`
    ///
    /// All-or-nothing: if any schema is invalid or reuses an id, the group is
    /// not registered. A group name may only be registered once.
    pub fn register_group(&mut self, group: ContractGroup) -> Result<&mut Self> {
        if self.groups.contains_key(group.name()) {
            return Err(TandemError::Contract(format!(
                "group \"{}\" is already registered",
                group.name()
            )));
        }

        let mut table = GroupTable::new(group.name());
        for schema in group.schemas() {
            table.insert(schema.clone())?;
        }

        self.groups.insert(group.name().to_string(), table);
        Ok(self)
    }

    /// Register a single schema into `group`, creating the group if needed
    ///
    /// Fails without touching the group if the schema is invalid or its id
    /// is already taken.
    pub fn register_schema(&mut self, group: &str, schema: ContractSchema) -> Result<&mut Self> {
        match self.groups.get_mut(group) {
            Some(table) => table.insert(schema)?,
            None => {
                let mut table = GroupTable::new(group);
                table.insert(schema)?;
                self.groups.insert(group.to_string(), table);
            }
        }
        Ok(self)
    }

    /// Freeze the registrations
    pub fn build(self) -> Arc<ContractRegistry> {
        let groups = self
            .groups
            .into_iter()
            .map(|(name, table)| (name, Arc::new(table)))
            .collect();
        Arc::new(ContractRegistry { groups })
    }
}
