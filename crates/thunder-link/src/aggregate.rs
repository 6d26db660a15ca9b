//! Struct types shared across the functions of a unit.
//!
//! Every function names its structs by the head of a field chain in its own
//! buffer. Registration turns each chain into an [`Aggregate`] of the unit,
//! reusing an existing one when the field types, field names and phantom
//! flag all agree. The struct name does not take part in the comparison;
//! the first registration names the aggregate.

use std::collections::{BTreeMap, HashMap, HashSet};

use thunder_ir::semalz::field_chain;
use thunder_ir::{CallableId, Function, Index, IrError, PlainDataType};

use crate::types::DataType;

/// Per-function map from atom index to aggregate index.
pub type TypeMap = BTreeMap<Index, usize>;

/// Identity of an aggregate within a unit.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct AggregateKey {
    pub fields: Vec<DataType>,
    /// Declared field names; empty when the front end gave none.
    pub names: Vec<String>,
    pub phantom: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub ty: DataType,
    pub name: String,
}

/// A named struct of the unit.
#[derive(Clone, Debug)]
pub struct Aggregate {
    pub name: String,
    /// Function whose chain first produced this aggregate.
    pub origin: CallableId,
    pub head: Index,
    pub fields: Vec<Field>,
    pub phantom: bool,
    key: AggregateKey,
}

impl Aggregate {
    pub fn key(&self) -> &AggregateKey {
        &self.key
    }
}

/// Registry of a unit's aggregates.
#[derive(Debug, Default)]
pub struct Aggregates {
    entries: Vec<Aggregate>,
    by_key: HashMap<AggregateKey, usize>,
    names: HashSet<String>,
}

impl Aggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the struct whose chain starts at `head` in `function`,
    /// nested structs first, and records the mapping in `map`.
    pub fn register(
        &mut self,
        function: &Function,
        head: Index,
        map: &mut TypeMap,
    ) -> Result<usize, IrError> {
        if let Some(&existing) = map.get(&head) {
            return Ok(existing);
        }
        let buffer = &function.buffer;
        let nodes = field_chain(buffer, head)?;

        let mut fields = Vec::with_capacity(nodes.len());
        for &node in &nodes {
            fields.push(match buffer.type_of(node)?.plain_data() {
                Some(PlainDataType::Primitive(p)) => DataType::Primitive(p),
                Some(PlainDataType::Concrete(nested)) => {
                    DataType::Aggregate(self.register(function, nested, map)?)
                }
                None => {
                    return Err(buffer.structural_error(format!(
                        "field {node} of struct {head} is not plain data"
                    )));
                }
            });
        }

        let decoration = buffer.decoration(head);
        let mut names = decoration.map(|d| d.fields.clone()).unwrap_or_default();
        if !names.is_empty() && names.len() != fields.len() {
            log::warn!(
                "struct {head} of `{}` names {} fields but has {}; ignoring field names",
                function.name,
                names.len(),
                fields.len()
            );
            names.clear();
        }
        let key = AggregateKey {
            fields,
            names,
            phantom: decoration.is_some_and(|d| d.phantom),
        };

        let index = match self.by_key.get(&key) {
            Some(&index) => index,
            None => {
                let index = self.entries.len();
                let name = self.unique_name(decoration.map(|d| d.name.as_str()), index);
                let fields = key
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(k, &ty)| Field {
                        ty,
                        name: key.names.get(k).cloned().unwrap_or_else(|| format!("f{k}")),
                    })
                    .collect();
                log::debug!("aggregate {name} registered from `{}`", function.name);
                self.entries.push(Aggregate {
                    name,
                    origin: function.id,
                    head,
                    fields,
                    phantom: key.phantom,
                    key: key.clone(),
                });
                self.by_key.insert(key, index);
                index
            }
        };
        map.insert(head, index);
        Ok(index)
    }

    fn unique_name(&mut self, hint: Option<&str>, index: usize) -> String {
        let base = match hint {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Aggregate{index}"),
        };
        let name = if self.names.contains(&base) {
            format!("{base}_{index}")
        } else {
            base
        };
        self.names.insert(name.clone());
        name
    }

    pub fn get(&self, index: usize) -> Option<&Aggregate> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aggregate> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
