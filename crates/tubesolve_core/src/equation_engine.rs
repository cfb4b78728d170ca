use crate::error::TubeError;
use crate::interval::{next_down, next_up, Interval};
use crate::traits::DynamicalSystem;
use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::{E, PI};

/// OpCodes for the stack-based virtual machine.
/// The VM operates on a stack of intervals.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant enclosure onto the stack.
    LoadConst(Interval),
    /// Pushes the value of a state variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pushes the time interval onto the stack.
    LoadTime,
    Add,
    Sub,
    Mul,
    Div,
    /// Pops (b, a), pushes a ^ b. Integer exponents use `powi`.
    Pow,
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
    Neg,
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based virtual machine evaluating bytecode over intervals.
pub struct VM;

impl VM {
    pub fn execute(
        bytecode: &Bytecode,
        t: Interval,
        vars: &[Interval],
        params: &[Interval],
        stack: &mut Vec<Interval>,
    ) -> Interval {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(val),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::LoadParam(idx) => stack.push(params[idx]),
                OpCode::LoadTime => stack.push(t),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack);
                    stack.push(pow(a, b));
                }
                OpCode::Sin => {
                    let a = pop(stack);
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = pop(stack);
                    stack.push(a.cos());
                }
                OpCode::Exp => {
                    let a = pop(stack);
                    stack.push(a.exp());
                }
                OpCode::Ln => {
                    let a = pop(stack);
                    stack.push(a.ln());
                }
                OpCode::Sqrt => {
                    let a = pop(stack);
                    stack.push(a.sqrt());
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
            }
        }

        pop(stack)
    }
}

// Compiled bytecode never underflows; an empty stack yields the whole line.
fn pop(stack: &mut Vec<Interval>) -> Interval {
    stack.pop().unwrap_or(Interval::ENTIRE)
}

fn pop_pair(stack: &mut Vec<Interval>) -> (Interval, Interval) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

fn pow(a: Interval, b: Interval) -> Interval {
    let n = b.lb();
    if b.is_degenerated() && !b.is_empty() && n.fract() == 0.0 && n.abs() <= i32::MAX as f64 {
        a.powi(n as i32)
    } else {
        (b * a.ln()).exp()
    }
}

// --- AST & Parser ---

/// Abstract syntax tree for expressions.
#[derive(Debug)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>),
    Unary(char, Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an [`Expr`] into [`Bytecode`], resolving names to indices.
///
/// The name `t` refers to time unless a state variable shadows it;
/// `pi` and `e` are predefined constants.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, TubeError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), TubeError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(literal(*n))),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    match name.as_str() {
                        "t" => ops.push(OpCode::LoadTime),
                        "pi" => ops.push(OpCode::LoadConst(Interval::new(PI, next_up(PI)))),
                        "e" => ops.push(OpCode::LoadConst(Interval::new(next_down(E), next_up(E)))),
                        _ => {
                            return Err(TubeError::Parse(format!(
                                "Unknown variable or parameter: {}",
                                name
                            )))
                        }
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => return Err(TubeError::Parse(format!("Unknown binary operator: {}", op))),
                });
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => return Err(TubeError::Parse(format!("Unknown unary operator: {}", op))),
                }
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(match func.as_str() {
                    "sin" => OpCode::Sin,
                    "cos" => OpCode::Cos,
                    "exp" => OpCode::Exp,
                    "ln" | "log" => OpCode::Ln,
                    "sqrt" => OpCode::Sqrt,
                    _ => return Err(TubeError::Parse(format!("Unknown function: {}", func))),
                });
            }
        }
        Ok(())
    }
}

/// Decimal literals are generally not representable; only small integers are kept exact.
fn literal(n: f64) -> Interval {
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        Interval::point(n)
    } else {
        Interval::new(next_down(n), next_up(n))
    }
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, TubeError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(TubeError::Parse(format!(
            "Unexpected trailing input in '{}'",
            input
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, TubeError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| TubeError::Parse(format!("Invalid number: {}", num_str)))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(TubeError::Parse(format!("Unexpected character '{}'", c))),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expression(&mut self) -> Result<Expr, TubeError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, TubeError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Unary minus binds looser than '^': -x^2 == -(x^2).
    fn parse_unary(&mut self) -> Result<Expr, TubeError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, TubeError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, TubeError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(TubeError::Parse(format!("Unexpected token {:?}", token))),
            None => Err(TubeError::Parse("Unexpected end of expression".to_string())),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), TubeError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(TubeError::Parse("Expected ')'".to_string())),
        }
    }
}

// --- IntervalFunction ---

/// A vector-valued function `f(t, x)` compiled to bytecode, one expression per component.
#[derive(Debug)]
pub struct IntervalFunction {
    equations: Vec<Bytecode>,
    params: Vec<Interval>,
    stack: RefCell<Vec<Interval>>,
}

impl Clone for IntervalFunction {
    fn clone(&self) -> Self {
        Self {
            equations: self.equations.clone(),
            params: self.params.clone(),
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }
}

impl IntervalFunction {
    pub fn parse(var_names: &[&str], exprs: &[&str]) -> Result<Self, TubeError> {
        Self::parse_with_params(var_names, &[], exprs)
    }

    pub fn parse_with_params(
        var_names: &[&str],
        params: &[(&str, Interval)],
        exprs: &[&str],
    ) -> Result<Self, TubeError> {
        let var_names: Vec<String> = var_names.iter().map(|s| s.to_string()).collect();
        let param_names: Vec<String> = params.iter().map(|(n, _)| n.to_string()).collect();
        let compiler = Compiler::new(&var_names, &param_names);

        let equations = exprs
            .iter()
            .map(|src| compiler.compile(&parse(src)?))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            equations,
            params: params.iter().map(|(_, v)| *v).collect(),
            stack: RefCell::new(Vec::with_capacity(64)),
        })
    }

    pub fn image_dim(&self) -> usize {
        self.equations.len()
    }

    pub fn eval(&self, t: Interval, x: &[Interval]) -> Vec<Interval> {
        let mut out = vec![Interval::ENTIRE; self.equations.len()];
        self.eval_into(t, x, &mut out);
        out
    }

    fn eval_into(&self, t: Interval, x: &[Interval], out: &mut [Interval]) {
        let mut stack = self.stack.borrow_mut();
        for (slot, eq) in out.iter_mut().zip(&self.equations) {
            *slot = VM::execute(eq, t, x, &self.params, &mut stack);
        }
    }
}

impl DynamicalSystem for IntervalFunction {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, t: Interval, x: &[Interval], out: &mut [Interval]) {
        self.eval_into(t, x, out);
    }
}
