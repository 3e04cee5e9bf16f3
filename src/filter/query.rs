// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! jq predicates over resource documents, evaluated with jaq

use anyhow::{Result, anyhow};
use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// A jq expression compiled once per run and evaluated against every candidate
pub struct QueryFilter {
    expression: String,
    filter: jaq_core::Filter<Native<Val>>,
}

impl fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFilter")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl QueryFilter {
    /// Parse and compile a jq expression against the standard library
    pub fn compile(expression: &str) -> Result<Self> {
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let arena = Arena::default();
        let program = File {
            code: expression,
            path: (),
        };

        let modules = loader.load(&arena, program).map_err(|errs| {
            anyhow!(
                "invalid jq expression '{}': {} parse error(s)",
                expression,
                errs.len()
            )
        })?;

        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(|errs| {
                anyhow!(
                    "invalid jq expression '{}': {} undefined reference(s)",
                    expression,
                    errs.len()
                )
            })?;

        Ok(Self {
            expression: expression.to_string(),
            filter,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Run the expression against `doc`. Outputs are consumed in order: the
    /// first truthy value is a match, the first runtime error is a non-match.
    pub fn matches(&self, doc: &Value) -> bool {
        let inputs = RcIter::new(core::iter::empty());
        let outputs = self
            .filter
            .run((Ctx::new([], &inputs), Val::from(doc.clone())));

        for output in outputs {
            match output {
                Ok(value) if is_truthy(&value) => return true,
                Ok(_) => continue,
                Err(err) => {
                    debug!(expression = %self.expression, error = ?err, "jq evaluation failed");
                    return false;
                }
            }
        }
        false
    }
}

/// jq truthiness: everything except `null` and `false`
fn is_truthy(value: &Val) -> bool {
    !matches!(value, Val::Null | Val::Bool(false))
}
