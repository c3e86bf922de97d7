//! User-supplied scalar expression

use super::expr::{self, Expr};
use ocdc_core::{Error, Result};

/// A single-argument expression such as `lambda x: x + 5`, parsed once and
/// evaluated per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaTransform {
    source: String,
    var: String,
    expr: Expr,
}

impl LambdaTransform {
    /// Parse an expression, failing with [`Error::Evaluation`] when it is not a
    /// valid single-argument lambda.
    pub fn parse(source: &str) -> Result<Self> {
        let (var, expr) = expr::parse_lambda(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            var,
            expr,
        })
    }

    /// The expression text as given
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the bound variable
    pub fn variable(&self) -> &str {
        &self.var
    }

    pub fn apply(&self, value: f64) -> Result<f64> {
        let out = expr::eval(&self.expr, value);
        if out.is_finite() {
            Ok(out)
        } else {
            Err(Error::Evaluation(format!(
                "'{}' is not finite for input {}",
                self.source, value
            )))
        }
    }
}
