//! Formula mini-language
//!
//! Formulas combine the inputs of a `formula` module row by row:
//!
//! ```text
//! [1] + 2*[2]            per-row sum
//! sqrt([1]^2 + [2]^2)    magnitude
//! [1] - [1_]             offset from the latest value of input 1
//! ```
//!
//! # Grammar
//!
//! Precedence, lowest first: binary `+ -`, then `* / %`, then `^`, then
//! unary `-`, then function calls, then atoms. Atoms are numeric literals,
//! parenthesised sub-expressions and input references `[k]` (row `i` of
//! input `k`) or `[k_]` (latest value of input `k`), `k` starting at 1.
//!
//! The parser works on a copy of the source with all whitespace removed and
//! letters lower-cased. It splits each span at the last top-level operator of
//! the lowest precedence present, so every binary operator (including `^`)
//! is left-associative.
//!
//! Functions: `sqrt sin cos tan asin acos atan sinh cosh tanh exp log abs
//! sign heaviside round ceil floor` take one argument; `atan2 min max` take
//! two.

use super::value_source::BinaryOp;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("{message}: '{fragment}'")]
    Parse { message: String, fragment: String },

    #[error("row {row}: {message}")]
    Execution { row: usize, message: String },
}

impl FormulaError {
    fn parse(message: impl Into<String>, fragment: &str) -> Self {
        FormulaError::Parse {
            message: message.into(),
            fragment: fragment.to_string(),
        }
    }
}

/// Single-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    Neg,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Abs,
    Sign,
    Heaviside,
    Round,
    Ceil,
    Floor,
}

impl UnaryFn {
    pub fn eval(self, x: f64) -> f64 {
        match self {
            UnaryFn::Neg => -x,
            UnaryFn::Sqrt => x.sqrt(),
            UnaryFn::Sin => x.sin(),
            UnaryFn::Cos => x.cos(),
            UnaryFn::Tan => x.tan(),
            UnaryFn::Asin => x.asin(),
            UnaryFn::Acos => x.acos(),
            UnaryFn::Atan => x.atan(),
            UnaryFn::Sinh => x.sinh(),
            UnaryFn::Cosh => x.cosh(),
            UnaryFn::Tanh => x.tanh(),
            UnaryFn::Exp => x.exp(),
            UnaryFn::Log => x.ln(),
            UnaryFn::Abs => x.abs(),
            UnaryFn::Sign => {
                if x.is_nan() {
                    f64::NAN
                } else if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            UnaryFn::Heaviside => {
                if x.is_nan() {
                    f64::NAN
                } else if x >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryFn::Round => x.round(),
            UnaryFn::Ceil => x.ceil(),
            UnaryFn::Floor => x.floor(),
        }
    }
}

enum Function {
    One(UnaryFn),
    Two(BinaryOp),
}

fn lookup_function(name: &str) -> Option<Function> {
    let f = match name {
        "sqrt" => Function::One(UnaryFn::Sqrt),
        "sin" => Function::One(UnaryFn::Sin),
        "cos" => Function::One(UnaryFn::Cos),
        "tan" => Function::One(UnaryFn::Tan),
        "asin" => Function::One(UnaryFn::Asin),
        "acos" => Function::One(UnaryFn::Acos),
        "atan" => Function::One(UnaryFn::Atan),
        "sinh" => Function::One(UnaryFn::Sinh),
        "cosh" => Function::One(UnaryFn::Cosh),
        "tanh" => Function::One(UnaryFn::Tanh),
        "exp" => Function::One(UnaryFn::Exp),
        "log" => Function::One(UnaryFn::Log),
        "abs" => Function::One(UnaryFn::Abs),
        "sign" => Function::One(UnaryFn::Sign),
        "heaviside" => Function::One(UnaryFn::Heaviside),
        "round" => Function::One(UnaryFn::Round),
        "ceil" => Function::One(UnaryFn::Ceil),
        "floor" => Function::One(UnaryFn::Floor),
        "atan2" => Function::Two(BinaryOp::Atan2),
        "min" => Function::Two(BinaryOp::Min),
        "max" => Function::Two(BinaryOp::Max),
        _ => return None,
    };
    Some(f)
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    /// Zero-based input index; `latest` reads the last value instead of row `i`.
    Input { index: usize, latest: bool },
    Unary(UnaryFn, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate at row `row`.
    pub fn eval(&self, inputs: &[Vec<f64>], row: usize) -> Result<f64, FormulaError> {
        match self {
            Expr::Const(v) => Ok(*v),
            Expr::Input { index, latest } => {
                let exec_err = |message: String| FormulaError::Execution { row, message };
                let data = inputs
                    .get(*index)
                    .ok_or_else(|| exec_err(format!("input [{}] is not bound", index + 1)))?;
                if *latest {
                    data.last()
                        .copied()
                        .ok_or_else(|| exec_err(format!("input [{}] is empty", index + 1)))
                } else if data.is_empty() {
                    Err(exec_err(format!("input [{}] is empty", index + 1)))
                } else {
                    data.get(row)
                        .copied()
                        .ok_or_else(|| exec_err(format!("input [{}] is too short", index + 1)))
                }
            }
            Expr::Unary(f, arg) => Ok(f.eval(arg.eval(inputs, row)?)),
            Expr::Binary(op, a, b) => Ok(op.eval(a.eval(inputs, row)?, b.eval(inputs, row)?)),
        }
    }

    /// Highest one-based input index referenced, `0` if none.
    pub fn max_input(&self) -> usize {
        match self {
            Expr::Const(_) => 0,
            Expr::Input { index, .. } => index + 1,
            Expr::Unary(_, a) => a.max_input(),
            Expr::Binary(_, a, b) => a.max_input().max(b.max_input()),
        }
    }
}

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let normalized: String = source
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if normalized.is_empty() {
            return Err(FormulaError::parse("Empty formula", source));
        }
        let root = Parser { text: &normalized }.parse(0, normalized.len())?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// Highest one-based input index the formula reads.
    pub fn max_input(&self) -> usize {
        self.root.max_input()
    }

    /// Evaluate one row.
    pub fn evaluate_row(&self, inputs: &[Vec<f64>], row: usize) -> Result<f64, FormulaError> {
        self.root.eval(inputs, row)
    }

    /// Evaluate rows `0..max(len(inputs))`, stopping at the first row that
    /// fails.
    pub fn evaluate(&self, inputs: &[Vec<f64>]) -> Vec<f64> {
        let n = inputs.iter().map(Vec::len).max().unwrap_or(0);
        let mut result = Vec::with_capacity(n);
        for row in 0..n {
            match self.root.eval(inputs, row) {
                Ok(v) => result.push(v),
                Err(e) => {
                    tracing::trace!("Formula '{}' stopped: {}", self.source, e);
                    break;
                }
            }
        }
        result
    }
}

impl std::str::FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

struct Parser<'a> {
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }

    fn parse(&self, mut s: usize, mut e: usize) -> Result<Expr, FormulaError> {
        if s >= e {
            return Err(FormulaError::parse("Missing operand", self.text));
        }
        let b = self.bytes();

        while b[s] == b'(' && b[e - 1] == b')' && self.closing_paren(s) == Some(e - 1) {
            s += 1;
            e -= 1;
            if s >= e {
                return Err(FormulaError::parse("Empty parentheses", self.text));
            }
        }
        let span = &self.text[s..e];

        self.check_balance(s, e)?;

        if let Some((at, op)) = self.split_point(s, e) {
            let left = self.parse(s, at)?;
            let right = self.parse(at + 1, e)?;
            return Ok(Expr::Binary(op, Box::new(left), Box::new(right)));
        }

        if b[s] == b'-' {
            return Ok(Expr::Unary(UnaryFn::Neg, Box::new(self.parse(s + 1, e)?)));
        }

        if b[s] == b'[' {
            return self.parse_input(s, e);
        }

        if b[s].is_ascii_lowercase() {
            return self.parse_call(s, e);
        }

        if b[s].is_ascii_digit() || b[s] == b'.' {
            return span
                .parse::<f64>()
                .map(Expr::Const)
                .map_err(|_| FormulaError::parse("Not a number", span));
        }

        Err(FormulaError::parse(
            "No recognized operator and no parsable value",
            span,
        ))
    }

    /// Index of the `)` matching the `(` at `open`.
    fn closing_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for (i, &c) in self.bytes().iter().enumerate().skip(open) {
            match c {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn check_balance(&self, s: usize, e: usize) -> Result<(), FormulaError> {
        let mut paren = 0i32;
        let mut bracket = 0i32;
        for &c in &self.bytes()[s..e] {
            match c {
                b'(' => paren += 1,
                b')' => paren -= 1,
                b'[' => bracket += 1,
                b']' => bracket -= 1,
                _ => {}
            }
            if paren < 0 || bracket < 0 {
                break;
            }
        }
        if paren != 0 || bracket != 0 {
            return Err(FormulaError::parse(
                "Brackets do not match",
                &self.text[s..e],
            ));
        }
        Ok(())
    }

    /// Last top-level operator of the lowest precedence in `s..e`.
    fn split_point(&self, s: usize, e: usize) -> Option<(usize, BinaryOp)> {
        let b = self.bytes();
        let mut depth = 0i32;
        let mut best: Option<(usize, BinaryOp, u8)> = None;
        for i in s..e {
            match b[i] {
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                _ => {}
            }
            if depth != 0 {
                continue;
            }
            let candidate = match b[i] {
                b'+' | b'-' if self.is_binary_sign(s, i) => Some(if b[i] == b'+' {
                    (BinaryOp::Add, 1)
                } else {
                    (BinaryOp::Sub, 1)
                }),
                b'*' => Some((BinaryOp::Mul, 2)),
                b'/' => Some((BinaryOp::Div, 2)),
                b'%' => Some((BinaryOp::Rem, 2)),
                b'^' => Some((BinaryOp::Pow, 3)),
                _ => None,
            };
            if let Some((op, level)) = candidate {
                if best.map_or(true, |(_, _, best_level)| level <= best_level) {
                    best = Some((i, op, level));
                }
            }
        }
        best.map(|(i, op, _)| (i, op))
    }

    /// A sign is binary when it follows an operand and is not the exponent
    /// sign of a literal like `1e-3`.
    fn is_binary_sign(&self, s: usize, i: usize) -> bool {
        if i == s {
            return false;
        }
        let b = self.bytes();
        let prev = b[i - 1];
        if matches!(prev, b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'(' | b',') {
            return false;
        }
        if prev == b'e' && i >= s + 2 {
            let before = b[i - 2];
            if before.is_ascii_digit() || before == b'.' {
                return !self.literal_starts_with_digit(s, i - 1);
            }
        }
        true
    }

    /// Whether the run of literal characters ending at `end` starts with a
    /// digit or dot (as opposed to an identifier such as `sinh2e`).
    fn literal_starts_with_digit(&self, s: usize, end: usize) -> bool {
        let b = self.bytes();
        let mut j = end;
        while j > s && (b[j - 1].is_ascii_alphanumeric() || b[j - 1] == b'.') {
            j -= 1;
        }
        b[j].is_ascii_digit() || b[j] == b'.'
    }

    fn parse_input(&self, s: usize, e: usize) -> Result<Expr, FormulaError> {
        let span = &self.text[s..e];
        let b = self.bytes();
        if b[e - 1] != b']' || self.text[s + 1..e - 1].contains(']') {
            return Err(FormulaError::parse("Malformed input reference", span));
        }
        let mut inner = &self.text[s + 1..e - 1];
        let latest = inner.ends_with('_');
        if latest {
            inner = &inner[..inner.len() - 1];
        }
        let k: usize = inner
            .parse()
            .map_err(|_| FormulaError::parse("Could not parse index", span))?;
        if k < 1 {
            return Err(FormulaError::parse("Indices start at 1", span));
        }
        Ok(Expr::Input {
            index: k - 1,
            latest,
        })
    }

    fn parse_call(&self, s: usize, e: usize) -> Result<Expr, FormulaError> {
        let b = self.bytes();
        let span = &self.text[s..e];
        let mut name_end = s;
        while name_end < e && (b[name_end].is_ascii_lowercase() || (name_end > s && b[name_end].is_ascii_digit())) {
            name_end += 1;
        }
        let name = &self.text[s..name_end];
        if name_end >= e || b[name_end] != b'(' {
            return Err(FormulaError::parse(
                format!("Function {} needs a parameter", name),
                span,
            ));
        }
        if self.closing_paren(name_end) != Some(e - 1) {
            return Err(FormulaError::parse("Unexpected text after function call", span));
        }
        let function = lookup_function(name)
            .ok_or_else(|| FormulaError::parse("Unknown function", name))?;

        let (args_s, args_e) = (name_end + 1, e - 1);
        let comma = self.top_level_comma(args_s, args_e);
        match (function, comma) {
            (Function::One(f), None) => Ok(Expr::Unary(f, Box::new(self.parse(args_s, args_e)?))),
            (Function::Two(op), Some(c)) => Ok(Expr::Binary(
                op,
                Box::new(self.parse(args_s, c)?),
                Box::new(self.parse(c + 1, args_e)?),
            )),
            (Function::One(_), Some(_)) => Err(FormulaError::parse(
                format!("Function {} takes one argument", name),
                span,
            )),
            (Function::Two(_), None) => Err(FormulaError::parse(
                format!("Function {} takes two arguments", name),
                span,
            )),
        }
    }

    fn top_level_comma(&self, s: usize, e: usize) -> Option<usize> {
        let mut depth = 0i32;
        for i in s..e {
            match self.bytes()[i] {
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b',' if depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }
}
