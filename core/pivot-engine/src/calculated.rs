//! FILENAME: core/pivot-engine/src/calculated.rs
//! Calculated field resolution.
//!
//! A calculated field may reference stored fields and other calculated
//! fields. Resolution inlines every calculated reference (parenthesized, so
//! precedence survives) until only stored fields remain, then writes the
//! flattened formula and the set of stored fields it needs back onto the
//! cache field.

use crate::cache::PivotCache;
use crate::definition::FieldIndex;
use crate::error::{PivotError, PivotResult};
use crate::functions::AggregationEngine;
use formula_parser::{tokens_to_formula, Token};
use log::trace;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Flattened form of one calculated field.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedField {
    tokens: Vec<Token>,
    referenced_fields: BTreeMap<String, FieldIndex>,
}

struct Resolver<'a> {
    cache: &'a PivotCache,
    engine: &'a mut AggregationEngine,
    resolved: FxHashMap<FieldIndex, ResolvedField>,
    /// Fields currently being resolved, outermost first.
    visiting: Vec<FieldIndex>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, index: FieldIndex) -> PivotResult<ResolvedField> {
        if let Some(done) = self.resolved.get(&index) {
            return Ok(done.clone());
        }

        let cache = self.cache;

        if let Some(start) = self.visiting.iter().position(|&i| i == index) {
            let mut chain: Vec<&str> = self.visiting[start..]
                .iter()
                .map(|&i| cache.fields[i].name.as_str())
                .collect();
            chain.push(cache.fields[index].name.as_str());
            return Err(PivotError::CyclicCalculatedField(chain.join(" -> ")));
        }

        let field = cache.field(index)?;
        let formula = field.formula.clone().unwrap_or_default();
        self.visiting.push(index);

        let tokens = self.engine.tokenize(&formula);
        let mut out = Vec::with_capacity(tokens.len());
        let mut referenced_fields = BTreeMap::new();

        for (i, token) in tokens.iter().enumerate() {
            if i == 0 && *token == Token::Equals {
                continue;
            }

            let is_call = matches!(tokens.get(i + 1), Some(Token::LParen));
            let Some(name) = token.name().filter(|_| !is_call) else {
                out.push(token.clone());
                continue;
            };

            let Some(target) = cache.field_index(name) else {
                self.visiting.pop();
                return Err(PivotError::UnknownFieldReference {
                    field: field.name.clone(),
                    name: name.to_string(),
                });
            };

            let target_field = &cache.fields[target];
            if target_field.is_calculated() {
                let inner = match self.resolve(target) {
                    Ok(inner) => inner,
                    Err(e) => {
                        self.visiting.pop();
                        return Err(e);
                    }
                };
                out.push(Token::LParen);
                out.extend(inner.tokens);
                out.push(Token::RParen);
                referenced_fields.extend(inner.referenced_fields);
            } else {
                out.push(Token::QuotedIdentifier(target_field.name.clone()));
                referenced_fields.insert(target_field.name.clone(), target);
            }
        }

        self.visiting.pop();
        let done = ResolvedField {
            tokens: out,
            referenced_fields,
        };
        self.resolved.insert(index, done.clone());
        Ok(done)
    }
}

/// Resolves every calculated field of `cache`, setting `resolved_formula`
/// and `referenced_fields`. Names must already be registered with
/// `engine.add_names`. A cache without calculated fields is left untouched.
pub fn configure_calculated_fields(
    cache: &mut PivotCache,
    engine: &mut AggregationEngine,
) -> PivotResult<()> {
    if !cache.has_calculated_fields() {
        return Ok(());
    }

    let calculated: Vec<FieldIndex> = cache
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_calculated())
        .map(|(i, _)| i)
        .collect();

    let mut results = Vec::with_capacity(calculated.len());
    {
        let mut resolver = Resolver {
            cache,
            engine,
            resolved: FxHashMap::default(),
            visiting: Vec::new(),
        };
        for &index in &calculated {
            results.push((index, resolver.resolve(index)?));
        }
    }

    for (index, resolved) in results {
        let field = &mut cache.fields[index];
        let formula = tokens_to_formula(&resolved.tokens);
        trace!("calculated field {} resolved to {}", field.name, formula);
        field.resolved_formula = Some(formula);
        field.referenced_fields = resolved.referenced_fields;
    }
    Ok(())
}
