//! FILENAME: core/evaluator/src/names.rs
//! PURPOSE: Named-value bindings consulted when an expression references a name.
//! CONTEXT: A name is bound to an expression rather than to a value, the same
//! way a workbook defined name holds a formula. The pivot engine binds each
//! field referenced by a calculated field to `SUM(v1, v2, ...)`.

use formula_parser::Expression;
use std::collections::HashMap;

/// Case-insensitive table of name -> bound expression.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    bindings: HashMap<String, Expression>,
}

impl NameTable {
    pub fn new() -> Self {
        NameTable {
            bindings: HashMap::new(),
        }
    }

    /// Binds `name` to an already-built expression, replacing any earlier binding.
    pub fn define(&mut self, name: &str, expr: Expression) {
        self.bindings.insert(name.to_uppercase(), expr);
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.bindings.get(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
