//! FILENAME: core/pivot-engine/src/functions.rs
//! Aggregation functions and calculated-field evaluation.
//!
//! `calculate` applies one of the data-field functions to a list of raw
//! values. `AggregationEngine` is the per-refresh context for calculated
//! fields: it knows every cache field name, maps names the formula syntax
//! cannot express to generated identifiers, and evaluates resolved formulas
//! with each referenced field bound to `SUM(...)` of its values.

use crate::definition::AggregationType;
use crate::error::PivotResult;
use formula_eval::{CellError, CellValue, EvalResult, Evaluator, NameTable};
use formula_parser::{is_valid_identifier, parse, Expression, Lexer, Token, Value};
use log::warn;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Prefix of generated identifiers for field names that are not valid
/// formula identifiers.
pub const SANITIZED_NAME_PREFIX: &str = "_PVT_FIELD_";

// ============================================================================
// VALUE STATISTICS
// ============================================================================

/// Running statistics over one value list.
#[derive(Debug, Clone)]
struct ValueStats {
    count: u64,
    count_numbers: u64,
    sum: f64,
    product: f64,
    min: Option<f64>,
    max: Option<f64>,
    /// Welford's running mean and sum of squared differences.
    mean: f64,
    m2: f64,
}

impl ValueStats {
    fn collect(values: &[CellValue]) -> Self {
        let mut stats = ValueStats {
            count: 0,
            count_numbers: 0,
            sum: 0.0,
            product: 1.0,
            min: None,
            max: None,
            mean: 0.0,
            m2: 0.0,
        };

        for value in values {
            match value {
                CellValue::Empty => {}
                CellValue::Number(n) => stats.add_number(*n),
                _ => stats.count += 1,
            }
        }
        stats
    }

    fn add_number(&mut self, value: f64) {
        self.count += 1;
        self.count_numbers += 1;
        self.sum += value;
        self.product *= value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));

        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        self.m2 += delta * (value - self.mean);
    }

    /// Variance with `ddof` = 1 (sample) or 0 (population).
    fn variance(&self, ddof: u64) -> CellValue {
        if self.count_numbers <= ddof {
            return CellValue::Error(CellError::Div0);
        }
        CellValue::Number(self.m2 / (self.count_numbers - ddof) as f64)
    }

    fn std_dev(&self, ddof: u64) -> CellValue {
        match self.variance(ddof) {
            CellValue::Number(v) => CellValue::Number(v.sqrt()),
            other => other,
        }
    }
}

/// Applies `function` to `values`.
///
/// Returns `CellValue::Empty` (no value to show) for an empty list. Blank
/// entries are ignored; text, booleans and errors only count toward Count.
pub fn calculate(function: AggregationType, values: &[CellValue]) -> CellValue {
    if values.is_empty() {
        return CellValue::Empty;
    }

    let stats = ValueStats::collect(values);
    match function {
        AggregationType::Sum => CellValue::Number(stats.sum),
        AggregationType::Count => CellValue::Number(stats.count as f64),
        AggregationType::CountNumbers => CellValue::Number(stats.count_numbers as f64),
        AggregationType::Average => {
            if stats.count_numbers == 0 {
                CellValue::Error(CellError::Div0)
            } else {
                CellValue::Number(stats.sum / stats.count_numbers as f64)
            }
        }
        AggregationType::Max => CellValue::Number(stats.max.unwrap_or(0.0)),
        AggregationType::Min => CellValue::Number(stats.min.unwrap_or(0.0)),
        AggregationType::Product => {
            if stats.count_numbers == 0 {
                CellValue::Number(0.0)
            } else {
                CellValue::Number(stats.product)
            }
        }
        AggregationType::StdDev => stats.std_dev(1),
        AggregationType::StdDevP => stats.std_dev(0),
        AggregationType::Var => stats.variance(1),
        AggregationType::VarP => stats.variance(0),
    }
}

// ============================================================================
// AGGREGATION ENGINE
// ============================================================================

/// Per-pass state for calculated-field work. Create one per refresh (or
/// `reset` it); it is not meant to be shared between two pivot tables.
#[derive(Debug, Default)]
pub struct AggregationEngine {
    /// Upper-cased declared name -> identifier used inside formulas.
    name_to_sanitized: FxHashMap<String, String>,
    /// Upper-cased identifier -> declared name.
    sanitized_to_name: FxHashMap<String, String>,
    /// Formula text -> formula text with quoted field names replaced.
    sanitized_formulas: FxHashMap<String, String>,
    /// Sanitized formula text -> parsed expression.
    parsed_formulas: FxHashMap<String, Expression>,
    next_id: usize,
}

impl AggregationEngine {
    pub fn new() -> Self {
        AggregationEngine::default()
    }

    /// Drops every name mapping and memoized formula.
    pub fn reset(&mut self) {
        self.name_to_sanitized.clear();
        self.sanitized_to_name.clear();
        self.sanitized_formulas.clear();
        self.parsed_formulas.clear();
        self.next_id = 0;
    }

    pub fn calculate(&self, function: AggregationType, values: &[CellValue]) -> CellValue {
        calculate(function, values)
    }

    /// Registers field names. Valid identifiers keep their (upper-cased)
    /// name; anything else gets a generated identifier.
    pub fn add_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            let key = name.to_uppercase();
            if self.name_to_sanitized.contains_key(&key) {
                continue;
            }

            let sanitized = if is_valid_identifier(name) && !self.sanitized_to_name.contains_key(&key) {
                key.clone()
            } else {
                self.generate_identifier()
            };

            self.sanitized_to_name.insert(sanitized.clone(), name.to_string());
            self.name_to_sanitized.insert(key, sanitized);
        }
        // Formulas memoized before this call may have been sanitized without these names.
        self.sanitized_formulas.clear();
    }

    fn generate_identifier(&mut self) -> String {
        loop {
            self.next_id += 1;
            let candidate = format!("{}{}", SANITIZED_NAME_PREFIX, self.next_id);
            if !self.sanitized_to_name.contains_key(&candidate)
                && !self.name_to_sanitized.contains_key(&candidate)
            {
                return candidate;
            }
        }
    }

    /// Identifier used inside formulas for a declared field name.
    pub fn sanitized_name(&self, name: &str) -> Option<&str> {
        self.name_to_sanitized.get(&name.to_uppercase()).map(String::as_str)
    }

    /// Declared field name behind a formula identifier.
    pub fn original_name(&self, sanitized: &str) -> Option<&str> {
        self.sanitized_to_name.get(&sanitized.to_uppercase()).map(String::as_str)
    }

    /// Replaces every quoted reference to a registered field with its
    /// identifier. String literals are copied untouched.
    pub fn sanitize_formula(&mut self, formula: &str) -> String {
        if let Some(done) = self.sanitized_formulas.get(formula) {
            return done.clone();
        }

        let mut out = String::with_capacity(formula.len());
        let mut chars = formula.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    out.push(c);
                    while let Some(s) = chars.next() {
                        out.push(s);
                        if s == '"' {
                            if chars.peek() == Some(&'"') {
                                out.push('"');
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }
                '\'' => {
                    let mut name = String::new();
                    let mut closed = false;
                    while let Some(s) = chars.next() {
                        if s == '\'' {
                            if chars.peek() == Some(&'\'') {
                                name.push('\'');
                                chars.next();
                            } else {
                                closed = true;
                                break;
                            }
                        } else {
                            name.push(s);
                        }
                    }

                    match self.name_to_sanitized.get(&name.to_uppercase()) {
                        Some(id) if closed => out.push_str(id),
                        _ => {
                            out.push('\'');
                            out.push_str(&name.replace('\'', "''"));
                            if closed {
                                out.push('\'');
                            }
                        }
                    }
                }
                _ => out.push(c),
            }
        }

        self.sanitized_formulas.insert(formula.to_string(), out.clone());
        out
    }

    /// Tokenizes a formula. Name tokens that refer to a registered field
    /// come back as `QuotedIdentifier` with the field's declared name.
    pub fn tokenize(&mut self, formula: &str) -> Vec<Token> {
        let sanitized = self.sanitize_formula(formula);
        let tokens = Lexer::tokenize(&sanitized);

        let mut out = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let is_call = matches!(tokens.get(i + 1), Some(Token::LParen));
            if let Some(name) = token.name().filter(|_| !is_call) {
                if let Some(original) = self.original_name(name) {
                    out.push(Token::QuotedIdentifier(original.to_string()));
                    continue;
                }
            }
            out.push(token.clone());
        }
        out
    }

    /// Evaluates a resolved calculated-field formula with each field in
    /// `field_values` bound to the sum of its values.
    ///
    /// A missing formula gives `Empty`. Evaluation errors (division by zero,
    /// unknown names) also give `Empty`; a formula that does not parse is a
    /// configuration error.
    pub fn evaluate_calculated_field_formula(
        &mut self,
        field_values: &BTreeMap<String, Vec<CellValue>>,
        formula: Option<&str>,
    ) -> PivotResult<CellValue> {
        let Some(formula) = formula.filter(|f| !f.trim().is_empty()) else {
            return Ok(CellValue::Empty);
        };

        let sanitized = self.sanitize_formula(formula);
        if !self.parsed_formulas.contains_key(&sanitized) {
            let expr = parse(&sanitized)?;
            self.parsed_formulas.insert(sanitized.clone(), expr);
        }

        let names = self.bind_field_values(field_values);
        let Some(expr) = self.parsed_formulas.get(&sanitized) else {
            return Ok(CellValue::Empty);
        };

        match Evaluator::new(&names).evaluate(expr) {
            EvalResult::Error(e) => {
                warn!("calculated field formula {} evaluated to {}, showing blank", formula, e);
                Ok(CellValue::Empty)
            }
            result => Ok(result.to_cell_value()),
        }
    }

    fn bind_field_values(&self, field_values: &BTreeMap<String, Vec<CellValue>>) -> NameTable {
        let mut names = NameTable::new();

        for (field, values) in field_values {
            let key = self
                .sanitized_name(field)
                .map(str::to_string)
                .unwrap_or_else(|| field.to_uppercase());
            let args = values
                .iter()
                .filter_map(CellValue::as_number)
                .map(|n| Expression::Literal(Value::Number(n)))
                .collect();

            names.define(
                &key,
                Expression::FunctionCall {
                    name: "SUM".to_string(),
                    args,
                },
            );
        }
        names
    }
}
