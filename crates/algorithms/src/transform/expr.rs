//! Restricted scalar expression language for lambda transforms
//!
//! Accepts a single-argument lambda such as `lambda x: 255 * (x / 255) ** 0.8`.
//! Only arithmetic, the bound variable, numeric constants and a fixed set of
//! pure math functions are understood; anything else is rejected at parse
//! time, so evaluating an expression can never have side effects.

use ocdc_core::{Error, Result};

/// A token in the parsed expression
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char), // +, -, *, /, %
    Pow,      // **
    LParen,
    RParen,
    Comma,
    Colon,
}

/// Functions callable from an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        // numpy / math qualified names resolve to the same functions
        let name = name
            .strip_prefix("np.")
            .or_else(|| name.strip_prefix("numpy."))
            .or_else(|| name.strip_prefix("math."))
            .unwrap_or(name);

        let func = match name {
            "abs" | "fabs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "log" | "ln" => Func::Ln,
            "log2" => Func::Log2,
            "log10" => Func::Log10,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "min" | "minimum" => Func::Min,
            "max" | "maximum" => Func::Max,
            "pow" | "power" => Func::Pow,
            _ => return None,
        };
        Some(func)
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max | Func::Pow => 2,
            _ => 1,
        }
    }

    fn call(self, args: &[f64]) -> f64 {
        match self {
            Func::Abs => args[0].abs(),
            Func::Sqrt => args[0].sqrt(),
            Func::Exp => args[0].exp(),
            Func::Ln => args[0].ln(),
            Func::Log2 => args[0].log2(),
            Func::Log10 => args[0].log10(),
            Func::Sin => args[0].sin(),
            Func::Cos => args[0].cos(),
            Func::Tan => args[0].tan(),
            Func::Floor => args[0].floor(),
            Func::Ceil => args[0].ceil(),
            Func::Round => args[0].round_ties_even(),
            Func::Min => args[0].min(args[1]),
            Func::Max => args[0].max(args[1]),
            Func::Pow => args[0].powf(args[1]),
        }
    }
}

/// A node in the expression AST
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Num(f64),
    Var,
    Neg(Box<Expr>),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Evaluation(msg.into())
}

/// Tokenize an expression string
fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent part: 1e-3, 2.5E+4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let num_str: String = chars[start..i].iter().collect();
                let num = num_str
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("Invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric()
                        || chars[i] == '_'
                        || (chars[i] == '.'
                            && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic())))
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(name));
            }
            c => {
                return Err(invalid(format!("Unexpected character '{}' in expression", c)));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser for the lambda body
struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    var: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, var: &'a str) -> Self {
        Self { tokens, pos: 0, var }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(invalid(format!("Expected {}, found {:?}", what, other))),
        }
    }

    /// Parse: expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;

        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse: term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse: unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// Parse: power = atom ('**' unary)?
    ///
    /// The exponent binds tighter than a leading minus (`-x**2 == -(x**2)`)
    /// and is right associative.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if let Some(Token::Pow) = self.peek() {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp {
                op: '^',
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// Parse: atom = number | name | name '(' args ')' | '(' expr ')'
    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.advance();
                    return self.parse_call(&name);
                }
                if name == self.var {
                    Ok(Expr::Var)
                } else {
                    match name.as_str() {
                        "pi" | "np.pi" | "math.pi" => Ok(Expr::Num(std::f64::consts::PI)),
                        "e" | "np.e" | "math.e" => Ok(Expr::Num(std::f64::consts::E)),
                        _ => Err(invalid(format!("Unknown name '{}'", name))),
                    }
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(expr)
            }
            other => Err(invalid(format!("Unexpected token in expression: {:?}", other))),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr> {
        let func = Func::lookup(name).ok_or_else(|| invalid(format!("Unknown function '{}'", name)))?;

        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.advance();
        } else {
            loop {
                args.push(self.parse_expr()?);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    other => {
                        return Err(invalid(format!(
                            "Expected ',' or ')' in call to {}, found {:?}",
                            name, other
                        )))
                    }
                }
            }
        }

        if args.len() != func.arity() {
            return Err(invalid(format!(
                "{} takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            )));
        }
        Ok(Expr::Call { func, args })
    }
}

/// Parse `lambda <name>: <expr>` into the bound variable name and body
pub(crate) fn parse_lambda(text: &str) -> Result<(String, Expr)> {
    let tokens = tokenize(text)?;

    let var = match tokens.as_slice() {
        [Token::Ident(kw), Token::Ident(var), Token::Colon, ..] if kw == "lambda" => var.clone(),
        [Token::Ident(kw), Token::Ident(_), Token::Comma, ..] if kw == "lambda" => {
            return Err(invalid("lambda transform must take exactly one argument"));
        }
        [Token::Ident(kw), Token::Colon, ..] if kw == "lambda" => {
            return Err(invalid("lambda transform must take exactly one argument"));
        }
        _ => {
            return Err(invalid(format!(
                "Expected an expression of the form 'lambda x: ...', got '{}'",
                text
            )))
        }
    };
    if Func::lookup(&var).is_some() || var == "lambda" {
        return Err(invalid(format!("'{}' cannot be used as the lambda argument", var)));
    }

    let body: Vec<Token> = tokens[3..].to_vec();
    if body.is_empty() {
        return Err(invalid("lambda transform has an empty body"));
    }

    let mut parser = Parser::new(body, &var);
    let expr = parser.parse_expr()?;
    if let Some(t) = parser.peek() {
        return Err(invalid(format!("Unexpected trailing token {:?}", t)));
    }

    Ok((var, expr))
}

/// Evaluate an expression for one input value
pub(crate) fn eval(expr: &Expr, x: f64) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Var => x,
        Expr::Neg(inner) => -eval(inner, x),
        Expr::BinOp { op, left, right } => {
            let l = eval(left, x);
            let r = eval(right, x);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 { f64::NAN } else { l / r }
                }
                '%' => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        // Result takes the sign of the divisor
                        let m = l % r;
                        if m != 0.0 && (m < 0.0) != (r < 0.0) { m + r } else { m }
                    }
                }
                '^' => l.powf(r),
                _ => f64::NAN,
            }
        }
        Expr::Call { func, args } => {
            let values: Vec<f64> = args.iter().map(|a| eval(a, x)).collect();
            func.call(&values)
        }
    }
}
