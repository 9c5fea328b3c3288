use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Associativity {
    Left,
    Right,
}

/// (precedence, associativity) of an infix operator
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct OperatorInfo {
    pub precedence: u32,
    pub associativity: Associativity,
}

lazy_static! {
    /// Every infix operator, assignment included
    pub static ref BINARY_OPERATORS: BTreeMap<char, OperatorInfo> = {
        let mut map = BTreeMap::new();
        let mut add = |op, precedence, associativity| {
            map.insert(op, OperatorInfo { precedence, associativity });
        };

        add('=', ASSIGN_PRECEDENCE, Associativity::Right);
        add('+', 10, Associativity::Left);
        add('-', 10, Associativity::Left);
        add('*', 20, Associativity::Left);
        add('/', 20, Associativity::Left);
        add('%', 20, Associativity::Left);
        add('^', POWER_PRECEDENCE, Associativity::Right);

        map
    };
}

pub const UNARY_OPERATORS: &[char] = &['-'];

pub const ASSIGN_PRECEDENCE: u32 = 5;

/// Negation binds tighter than every infix operator except `^`, so `-2^2` is `-(2^2)`
pub const UNARY_PRECEDENCE: u32 = 25;

pub const POWER_PRECEDENCE: u32 = 30;

/// Numbers, names and calls never need parentheses
const ATOM_PRECEDENCE: u32 = u32::MAX;

pub fn binary_operator(op: char) -> Option<OperatorInfo> {
    BINARY_OPERATORS.get(&op).copied()
}

#[derive(Debug, PartialEq, Hash, PartialOrd, Ord, Eq, Clone)]
pub struct Identifier(pub String);

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier(s.to_string())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum UnaryExpression {
    /// `-`
    Minus(Box<Expression>),
}

impl UnaryExpression {
    pub fn new(op: char, operand: Expression) -> Option<Self> {
        match op {
            '-' => Some(UnaryExpression::Minus(Box::new(operand))),
            _ => None,
        }
    }

    pub fn op_str(&self) -> &str {
        match self {
            UnaryExpression::Minus(_) => "-",
        }
    }

    pub fn operand(&self) -> &Expression {
        match self {
            UnaryExpression::Minus(e) => e,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum BinaryExpression {
    /// `+`
    Plus(Box<Expression>, Box<Expression>),
    /// `-`
    Minus(Box<Expression>, Box<Expression>),
    /// `*`
    Multiply(Box<Expression>, Box<Expression>),
    /// `/`
    Divide(Box<Expression>, Box<Expression>),
    /// `%`
    Modulo(Box<Expression>, Box<Expression>),
    /// `^`
    Power(Box<Expression>, Box<Expression>),
}

impl BinaryExpression {
    /// Build the node for infix `op`. Assignment is not a `BinaryExpression`.
    pub fn new(op: char, lhs: Expression, rhs: Expression) -> Option<Self> {
        let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
        Some(match op {
            '+' => BinaryExpression::Plus(lhs, rhs),
            '-' => BinaryExpression::Minus(lhs, rhs),
            '*' => BinaryExpression::Multiply(lhs, rhs),
            '/' => BinaryExpression::Divide(lhs, rhs),
            '%' => BinaryExpression::Modulo(lhs, rhs),
            '^' => BinaryExpression::Power(lhs, rhs),
            _ => return None,
        })
    }

    pub fn op_char(&self) -> char {
        match self {
            BinaryExpression::Plus(_, _) => '+',
            BinaryExpression::Minus(_, _) => '-',
            BinaryExpression::Multiply(_, _) => '*',
            BinaryExpression::Divide(_, _) => '/',
            BinaryExpression::Modulo(_, _) => '%',
            BinaryExpression::Power(_, _) => '^',
        }
    }

    pub fn operands(&self) -> (&Expression, &Expression) {
        match self {
            BinaryExpression::Plus(lhs, rhs)
            | BinaryExpression::Minus(lhs, rhs)
            | BinaryExpression::Multiply(lhs, rhs)
            | BinaryExpression::Divide(lhs, rhs)
            | BinaryExpression::Modulo(lhs, rhs)
            | BinaryExpression::Power(lhs, rhs) => (lhs, rhs),
        }
    }

    pub fn info(&self) -> OperatorInfo {
        match binary_operator(self.op_char()) {
            Some(info) => info,
            None => unreachable!("every binary expression has a table entry"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(f64),
    /// Read of a global variable
    Identifier(Identifier),
    /// (name, position in the owning function's parameter list)
    Parameter(Identifier, usize),
    UnaryExpression(UnaryExpression),
    BinaryExpression(BinaryExpression),
    /// (target, value)
    Assignment(Identifier, Box<Expression>),
    /// (function, arguments)
    FunctionCall(Identifier, Vec<Expression>),
}

impl Expression {
    fn precedence(&self) -> u32 {
        match self {
            Expression::Assignment(_, _) => ASSIGN_PRECEDENCE,
            Expression::BinaryExpression(b) => b.info().precedence,
            Expression::UnaryExpression(_) => UNARY_PRECEDENCE,
            Expression::Number(_)
            | Expression::Identifier(_)
            | Expression::Parameter(_, _)
            | Expression::FunctionCall(_, _) => ATOM_PRECEDENCE,
        }
    }

    /// Names of every function called anywhere in this tree, in source order
    pub fn called_functions(&self) -> Vec<&Identifier> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'a>(&'a self, calls: &mut Vec<&'a Identifier>) {
        match self {
            Expression::Number(_) | Expression::Identifier(_) | Expression::Parameter(_, _) => (),
            Expression::UnaryExpression(u) => u.operand().collect_calls(calls),
            Expression::BinaryExpression(b) => {
                let (lhs, rhs) = b.operands();
                lhs.collect_calls(calls);
                rhs.collect_calls(calls);
            }
            Expression::Assignment(_, value) => value.collect_calls(calls),
            Expression::FunctionCall(name, args) => {
                calls.push(name);
                for arg in args {
                    arg.collect_calls(calls);
                }
            }
        }
    }

    /// Human readable form that parses back to the same tree
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, paren: bool) -> fmt::Result {
    if paren {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{}", n),
            Expression::Identifier(ident) | Expression::Parameter(ident, _) => {
                write!(f, "{}", ident)
            }
            Expression::UnaryExpression(u) => {
                write!(f, "{}", u.op_str())?;
                fmt_operand(f, u.operand(), u.operand().precedence() < POWER_PRECEDENCE)
            }
            Expression::BinaryExpression(b) => {
                let OperatorInfo {
                    precedence,
                    associativity,
                } = b.info();
                let (lhs, rhs) = b.operands();

                let lhs_paren = lhs.precedence() < precedence
                    || (lhs.precedence() == precedence && associativity == Associativity::Right);
                let rhs_paren = rhs.precedence() < precedence
                    || (rhs.precedence() == precedence && associativity == Associativity::Left);

                fmt_operand(f, lhs, lhs_paren)?;
                match b.op_char() {
                    '^' => write!(f, "^")?,
                    op => write!(f, " {} ", op)?,
                }
                fmt_operand(f, rhs, rhs_paren)
            }
            Expression::Assignment(target, value) => write!(f, "{} = {}", target, value),
            Expression::FunctionCall(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
fn num(n: f64) -> Expression {
    Expression::Number(n)
}

#[cfg(test)]
fn bin(op: char, lhs: Expression, rhs: Expression) -> Expression {
    Expression::BinaryExpression(BinaryExpression::new(op, lhs, rhs).unwrap())
}

#[test]
fn test_render_parenthesization() {
    let data = vec![
        (bin('+', num(2.0), bin('*', num(3.0), num(4.0))), "2 + 3 * 4"),
        (bin('*', bin('+', num(2.0), num(3.0)), num(4.0)), "(2 + 3) * 4"),
        (bin('-', num(1.0), bin('-', num(2.0), num(3.0))), "1 - (2 - 3)"),
        (bin('-', bin('-', num(1.0), num(2.0)), num(3.0)), "1 - 2 - 3"),
        (bin('^', num(2.0), bin('^', num(3.0), num(2.0))), "2^3^2"),
        (bin('^', bin('^', num(2.0), num(3.0)), num(2.0)), "(2^3)^2"),
        (
            Expression::UnaryExpression(UnaryExpression::new('-', bin('^', num(2.0), num(2.0))).unwrap()),
            "-2^2",
        ),
        (
            bin(
                '^',
                Expression::UnaryExpression(UnaryExpression::new('-', num(2.0)).unwrap()),
                num(2.0),
            ),
            "(-2)^2",
        ),
        (
            Expression::UnaryExpression(
                UnaryExpression::new('-', bin('+', num(1.0), num(2.0))).unwrap(),
            ),
            "-(1 + 2)",
        ),
        (
            bin(
                '+',
                Expression::Assignment(Identifier::from("x"), Box::new(num(1.5))),
                num(1.0),
            ),
            "(x = 1.5) + 1",
        ),
        (
            Expression::FunctionCall(
                Identifier::from("max"),
                vec![Expression::Identifier(Identifier::from("a")), num(0.25)],
            ),
            "max(a, 0.25)",
        ),
        (
            Expression::FunctionCall(Identifier::from("rnd"), vec![]),
            "rnd()",
        ),
    ];

    for (expr, expected) in data {
        assert_eq!(expr.render(), expected);
    }
}

#[test]
fn test_called_functions() {
    let expr = bin(
        '+',
        Expression::FunctionCall(
            Identifier::from("f"),
            vec![Expression::FunctionCall(Identifier::from("g"), vec![])],
        ),
        Expression::Assignment(
            Identifier::from("x"),
            Box::new(Expression::FunctionCall(Identifier::from("h"), vec![num(1.0)])),
        ),
    );

    let names: Vec<String> = expr.called_functions().iter().map(|i| i.0.clone()).collect();
    assert_eq!(names, vec!["f", "g", "h"]);
}
