//! Id counters and the registry of traced functions.

use std::collections::BTreeMap;

use crate::buffer::Buffer;
use crate::error::IrError;
use crate::function::{CallableId, Function};

/// Owns the callable and uuid counters and every function traced so far.
///
/// Front ends register functions here; a linkage unit borrows the context
/// to resolve call targets.
#[derive(Debug, Default)]
pub struct Context {
    next_callable: u32,
    next_uuid: u64,
    functions: BTreeMap<CallableId, Function>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_callable_id(&mut self) -> CallableId {
        let id = CallableId(self.next_callable);
        self.next_callable += 1;
        id
    }

    /// Fresh id for buffer references and shared allocations.
    pub fn next_uuid(&mut self) -> u64 {
        let id = self.next_uuid;
        self.next_uuid += 1;
        id
    }

    /// Prepares `buffer` as a new function and registers it.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        buffer: Buffer,
    ) -> Result<CallableId, IrError> {
        let id = self.next_callable_id();
        self.insert(Function::new(name, id, buffer)?);
        Ok(id)
    }

    /// Registers an already prepared function, replacing any function with
    /// the same id.
    pub fn insert(&mut self, function: Function) {
        self.next_callable = self.next_callable.max(function.id.0 + 1);
        self.functions.insert(function.id, function);
    }

    pub fn function(&self, id: CallableId) -> Option<&Function> {
        self.functions.get(&id)
    }

    pub fn function_mut(&mut self, id: CallableId) -> Option<&mut Function> {
        self.functions.get_mut(&id)
    }

    /// First function registered under `name`.
    pub fn find(&self, name: &str) -> Option<&Function> {
        self.functions.values().find(|f| f.name == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
