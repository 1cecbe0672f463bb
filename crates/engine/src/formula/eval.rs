// Formula evaluation - walks the AST, pulling referenced cell values through
// a resolver callback. Errors are values, not failures: they propagate
// through operands the same way numbers do.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::Position;

use super::parser::{BinOp, Expr, UnaryOp};

/// Computation error codes, rendered in place of a result.
///
/// First-class values: a cell can hold one, and a formula referencing such a
/// cell yields it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaError {
    /// Division by zero.
    Div0,
    /// Text where a number is required.
    Value,
    /// A reference that cannot be resolved.
    Ref,
    /// Arithmetic produced a non-finite result.
    Num,
}

impl FormulaError {
    /// Stable renderable code.
    pub fn code(self) -> &'static str {
        match self {
            FormulaError::Div0 => "#DIV/0!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Ref => "#REF!",
            FormulaError::Num => "#NUM!",
        }
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A cell's computed result: number, text, or error code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl Value {
    /// The result an empty cell reads as.
    pub fn empty() -> Self {
        Value::Text(String::new())
    }

    /// Numeric coercion: numbers pass through, blank text is zero, numeric
    /// text converts, anything else is `#VALUE!`. Errors propagate.
    pub fn to_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| FormulaError::Value),
            Value::Error(e) => Err(*e),
        }
    }

    /// Rendered form: integers without a decimal point, error codes verbatim.
    pub fn to_display(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Error(e) => e.code().to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

/// Format a number the way cells render: no trailing ".0" on integers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Resolves a cell reference to its current value during evaluation.
///
/// Takes `&mut self` so the implementation can fill result caches while a
/// formula is being pulled.
pub trait CellResolver {
    fn cell_value(&mut self, pos: Position) -> Value;
}

/// Evaluate an expression against a resolver.
///
/// Operands evaluate left to right and must be side-effect free; the first
/// error encountered becomes the result.
pub fn evaluate<R: CellResolver>(expr: &Expr, resolver: &mut R) -> Value {
    match eval_number(expr, resolver) {
        Ok(n) => Value::Number(n),
        Err(e) => Value::Error(e),
    }
}

fn eval_number<R: CellResolver>(expr: &Expr, resolver: &mut R) -> Result<f64, FormulaError> {
    let n = match expr {
        Expr::Number(n) => *n,
        Expr::Ref(pos) => resolver.cell_value(*pos).to_number()?,
        Expr::Unary { op, operand } => {
            let v = eval_number(operand, resolver)?;
            match op {
                UnaryOp::Plus => v,
                UnaryOp::Neg => -v,
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval_number(left, resolver)?;
            let r = eval_number(right, resolver)?;
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(FormulaError::Div0);
                    }
                    l / r
                }
                BinOp::Pow => l.powf(r),
            }
        }
    };
    if n.is_finite() {
        Ok(n)
    } else {
        Err(FormulaError::Num)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::formula::parser::parse;

    struct MapResolver(HashMap<Position, Value>);

    impl MapResolver {
        fn new(cells: &[(&str, Value)]) -> Self {
            Self(
                cells
                    .iter()
                    .map(|(a1, v)| (Position::parse(a1).unwrap(), v.clone()))
                    .collect(),
            )
        }
    }

    impl CellResolver for MapResolver {
        fn cell_value(&mut self, pos: Position) -> Value {
            self.0.get(&pos).cloned().unwrap_or_else(Value::empty)
        }
    }

    fn eval(formula: &str, resolver: &mut MapResolver) -> Value {
        evaluate(&parse(formula).unwrap(), resolver)
    }

    #[test]
    fn test_arithmetic() {
        let mut r = MapResolver::new(&[]);
        assert_eq!(eval("1+2*3", &mut r), Value::Number(7.0));
        assert_eq!(eval("(1+2)*3", &mut r), Value::Number(9.0));
        assert_eq!(eval("8-2-1", &mut r), Value::Number(5.0));
        assert_eq!(eval("7/2", &mut r), Value::Number(3.5));
        assert_eq!(eval("2^10", &mut r), Value::Number(1024.0));
        assert_eq!(eval("-3+1", &mut r), Value::Number(-2.0));
    }

    #[test]
    fn test_reference_lookup() {
        let mut r = MapResolver::new(&[("A1", Value::Number(10.0))]);
        assert_eq!(eval("A1*2", &mut r), Value::Number(20.0));
    }

    #[test]
    fn test_empty_reference_reads_as_zero() {
        let mut r = MapResolver::new(&[]);
        assert_eq!(eval("B7+1", &mut r), Value::Number(1.0));
    }

    #[test]
    fn test_numeric_text_coerces() {
        let mut r = MapResolver::new(&[("A1", Value::Text("10".to_string()))]);
        assert_eq!(eval("A1+1", &mut r), Value::Number(11.0));
    }

    #[test]
    fn test_non_numeric_text_is_value_error() {
        let mut r = MapResolver::new(&[("A1", Value::Text("hello".to_string()))]);
        assert_eq!(eval("A1+1", &mut r), Value::Error(FormulaError::Value));
    }

    #[test]
    fn test_division_by_zero() {
        let mut r = MapResolver::new(&[]);
        assert_eq!(eval("1/0", &mut r), Value::Error(FormulaError::Div0));
        // an empty cell coerces to zero
        assert_eq!(eval("1/C9", &mut r), Value::Error(FormulaError::Div0));
    }

    #[test]
    fn test_error_propagates_through_operands() {
        let mut r = MapResolver::new(&[("A1", Value::Error(FormulaError::Div0))]);
        assert_eq!(eval("A1+1", &mut r), Value::Error(FormulaError::Div0));
        assert_eq!(eval("2*A1", &mut r), Value::Error(FormulaError::Div0));
    }

    #[test]
    fn test_overflow_is_num_error() {
        let mut r = MapResolver::new(&[]);
        assert_eq!(eval("10^400", &mut r), Value::Error(FormulaError::Num));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Number(3.0).to_display(), "3");
        assert_eq!(Value::Number(3.5).to_display(), "3.5");
        assert_eq!(Value::Text("hi".to_string()).to_display(), "hi");
        assert_eq!(Value::Error(FormulaError::Div0).to_display(), "#DIV/0!");
        assert_eq!(Value::Error(FormulaError::Value).to_display(), "#VALUE!");
    }
}
