//! Tree walking evaluation.
//!
//! A line is evaluated as a unit: assignments are staged while walking the tree and only written
//! back to the environment once the whole expression produced a value. An unknown variable
//! anywhere in the line therefore aborts it without any partial stores.

use log::debug;

use crate::lang::ast::*;
use crate::lang::error::{CalcError, Result};
use crate::lang::functions::FunctionKind;
use crate::lang::variables::Environment;

struct Eval<'e> {
    env: &'e Environment,
    /// In assignment order
    staged: Vec<(Identifier, f64)>,
}

impl<'e> Eval<'e> {
    fn new(env: &'e Environment) -> Self {
        Self {
            env,
            staged: Vec::new(),
        }
    }

    fn staged(&self, ident: &Identifier) -> Option<f64> {
        self.staged
            .iter()
            .rev()
            .find(|(i, _)| i == ident)
            .map(|(_, v)| *v)
    }

    fn eval_identifier(&self, ident: &Identifier) -> Result<f64> {
        if let Some(v) = self.staged(ident) {
            return Ok(v);
        }

        match self.env.variable(ident) {
            Some(v) => Ok(v),
            None => {
                let hint = if self.env.function(ident).is_some() {
                    ". Maybe you meant to use the function?"
                } else {
                    ""
                };
                Err(CalcError::UnknownIdentifier(format!("{}{}", ident, hint)))
            }
        }
    }

    fn eval_binop_expr(&mut self, binop: &BinaryExpression, frame: &[f64]) -> Result<f64> {
        let (lhs, rhs) = binop.operands();
        let lhs = self.eval_expr(lhs, frame)?;
        let rhs = self.eval_expr(rhs, frame)?;

        Ok(match binop {
            BinaryExpression::Plus(_, _) => lhs + rhs,
            BinaryExpression::Minus(_, _) => lhs - rhs,
            BinaryExpression::Multiply(_, _) => lhs * rhs,
            BinaryExpression::Divide(_, _) => lhs / rhs,
            BinaryExpression::Modulo(_, _) => lhs % rhs,
            BinaryExpression::Power(_, _) => lhs.powf(rhs),
        })
    }

    fn eval_unary_expr(&mut self, unary: &UnaryExpression, frame: &[f64]) -> Result<f64> {
        match unary {
            UnaryExpression::Minus(e) => Ok(-self.eval_expr(e, frame)?),
        }
    }

    /// Arguments are evaluated left to right in the caller's frame; a user defined body then runs
    /// in a fresh frame holding just those values.
    fn eval_function(&mut self, ident: &Identifier, args: &[Expression], frame: &[f64]) -> Result<f64> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, frame)?);
        }

        // A variable assigned earlier on this line has already evicted the function
        let func = match self.staged(ident) {
            Some(_) => None,
            None => self.env.function(ident),
        };
        let func = func.ok_or_else(|| CalcError::UnknownFunction(ident.to_string()))?;

        // Definitions can change between parse and call (`del`, `def`), so check again
        if func.arity() != values.len() {
            return Err(CalcError::arity(&ident.0, func.arity(), values.len()));
        }

        match &func.kind {
            FunctionKind::Intrinsic(i) => Ok(i.call(&values)),
            FunctionKind::Builtin(b) => Ok(b.call(&values)),
            FunctionKind::UserDefined(body) => self.eval_expr(body, &values),
        }
    }

    fn eval_expr(&mut self, expr: &Expression, frame: &[f64]) -> Result<f64> {
        match expr {
            Expression::Number(n) => Ok(*n),
            Expression::Identifier(ident) => self.eval_identifier(ident),
            Expression::Parameter(ident, idx) => frame
                .get(*idx)
                .copied()
                .ok_or_else(|| CalcError::UnknownIdentifier(ident.to_string())),
            Expression::UnaryExpression(unary) => self.eval_unary_expr(unary, frame),
            Expression::BinaryExpression(binop) => self.eval_binop_expr(binop, frame),
            Expression::Assignment(target, value) => {
                let v = self.eval_expr(value, frame)?;
                self.staged.push((target.clone(), v));
                Ok(v)
            }
            Expression::FunctionCall(ident, args) => self.eval_function(ident, args, frame),
        }
    }
}

/// Evaluate a complete tree and commit its assignments to `env`
pub fn evaluate(expr: &Expression, env: &mut Environment) -> Result<f64> {
    let mut eval = Eval::new(env);
    let val = eval.eval_expr(expr, &[])?;
    let staged = eval.staged;

    for (ident, v) in staged {
        debug!("store {} = {}", ident, v);
        env.set_variable(ident, v);
    }

    Ok(val)
}

impl Expression {
    pub fn evaluate(&self, env: &mut Environment) -> Result<f64> {
        evaluate(self, env)
    }
}

#[cfg(test)]
fn run(line: &str, env: &mut Environment) -> Result<f64> {
    let mut lex = crate::lang::lexer::Tokenizer::new();
    lex.reset(line);
    crate::lang::parse::parse(&mut lex, env)?.evaluate(env)
}

#[cfg(test)]
fn def(env: &mut Environment, name: &str, params: &[&str], body: &str) {
    use crate::lang::functions::Function;

    let name = Identifier::from(name);
    let params: Vec<Identifier> = params.iter().map(|p| Identifier::from(*p)).collect();
    let mut lex = crate::lang::lexer::Tokenizer::new();
    lex.reset(body);
    let body = crate::lang::parse::parse_function_body(&mut lex, env, &name, &params)
        .expect("Failed to parse body");
    env.define_function(name, Function::user_defined(params, body));
}

#[test]
fn test_arithmetic() {
    let tests = vec![
        ("2 + 3 * 4", 14.0),
        ("(2 + 3) * 4", 20.0),
        ("2 ^ 3 ^ 2", 512.0),
        ("(2 ^ 3) ^ 2", 64.0),
        ("-2 ^ 2", -4.0),
        ("(-2) ^ 2", 4.0),
        ("--5", 5.0),
        ("2 ^ -1", 0.5),
        ("10 - 4 - 3", 3.0),
        ("100 / 10 / 5", 2.0),
        ("7 % 4", 3.0),
        ("-7 % 4", -3.0),
        ("7.5 % 2", 1.5),
        ("4.2e+1", 42.0),
        ("1 - -1", 2.0),
    ];

    for (input, expected) in tests {
        let mut env = Environment::new();
        assert_eq!(run(input, &mut env), Ok(expected), "{}", input);
    }
}

#[test]
fn test_ieee_semantics() {
    let mut env = Environment::new();
    assert_eq!(run("1 / 0", &mut env), Ok(f64::INFINITY));
    assert_eq!(run("-1 / 0", &mut env), Ok(f64::NEG_INFINITY));
    assert!(run("0 / 0", &mut env).unwrap().is_nan());
    assert!(run("1 % 0", &mut env).unwrap().is_nan());
}

#[test]
fn test_assignment() {
    let mut env = Environment::new();
    assert_eq!(run("x = y = 5", &mut env), Ok(5.0));
    assert_eq!(env.variable(&Identifier::from("x")), Some(5.0));
    assert_eq!(env.variable(&Identifier::from("y")), Some(5.0));

    assert_eq!(run("x = x + 1", &mut env), Ok(6.0));
    assert_eq!(run("x * y", &mut env), Ok(30.0));

    // Later reads on the same line see the staged value
    assert_eq!(run("(z = 2) + z * 10", &mut env), Ok(22.0));
    assert_eq!(env.variable(&Identifier::from("z")), Some(2.0));
}

#[test]
fn test_unknown_identifier_is_deferred() {
    let mut env = Environment::new();
    let mut lex = crate::lang::lexer::Tokenizer::new();
    lex.reset("y");
    let expr = crate::lang::parse::parse(&mut lex, &env).expect("y must parse");

    assert_eq!(
        expr.evaluate(&mut env),
        Err(CalcError::UnknownIdentifier("y".to_string()))
    );

    env.set_variable(Identifier::from("y"), 3.0);
    assert_eq!(expr.evaluate(&mut env), Ok(3.0));
}

#[test]
fn test_failed_line_stores_nothing() {
    let mut env = Environment::new();
    run("x = 1", &mut env).unwrap();

    assert!(matches!(
        run("(x = 2) + (w = 3) + nope", &mut env),
        Err(CalcError::UnknownIdentifier(_))
    ));
    assert_eq!(env.variable(&Identifier::from("x")), Some(1.0));
    assert_eq!(env.variable(&Identifier::from("w")), None);
}

#[test]
fn test_user_functions() {
    let mut env = Environment::new();
    def(&mut env, "f", &["x"], "x * 2");
    def(&mut env, "sub", &["a", "b"], "a - b");
    def(&mut env, "g", &["x"], "f(x) + f(f(x))");

    assert_eq!(run("f(3)", &mut env), Ok(6.0));
    assert_eq!(run("sub(10, 4)", &mut env), Ok(6.0));
    // Every call gets its own frame, even when nested in its own arguments
    assert_eq!(run("sub(sub(10, 4), sub(3, 1))", &mut env), Ok(4.0));
    assert_eq!(run("g(1)", &mut env), Ok(6.0));
}

#[test]
fn test_function_body_reads_globals() {
    let mut env = Environment::new();
    def(&mut env, "scale", &["x"], "x * k");

    assert!(matches!(
        run("scale(2)", &mut env),
        Err(CalcError::UnknownIdentifier(_))
    ));
    run("k = 10", &mut env).unwrap();
    assert_eq!(run("scale(2)", &mut env), Ok(20.0));
    run("k = 0.5", &mut env).unwrap();
    assert_eq!(run("scale(2)", &mut env), Ok(1.0));
}

#[test]
fn test_function_body_assigns_globals() {
    let mut env = Environment::new();
    def(&mut env, "remember", &["x"], "last = x");

    assert_eq!(run("remember(4) + 1", &mut env), Ok(5.0));
    assert_eq!(env.variable(&Identifier::from("last")), Some(4.0));
}

#[test]
fn test_callee_changed_after_definition() {
    let mut env = Environment::new();
    def(&mut env, "f", &["x"], "x + 1");
    def(&mut env, "g", &["x"], "f(x) * 10");
    assert_eq!(run("g(1)", &mut env), Ok(20.0));

    // Redefinitions are picked up by name
    def(&mut env, "f", &["x"], "x + 2");
    assert_eq!(run("g(1)", &mut env), Ok(30.0));

    def(&mut env, "f", &["x", "y"], "x + y");
    assert!(matches!(run("g(1)", &mut env), Err(CalcError::ArityMismatch(_))));

    env.remove(&Identifier::from("f")).unwrap();
    assert_eq!(
        run("g(1)", &mut env),
        Err(CalcError::UnknownFunction("f".to_string()))
    );
}

#[test]
fn test_builtins() {
    use crate::lang::functions::{Importable, BUILTINS};

    let mut env = Environment::new();
    for b in BUILTINS.iter() {
        match b {
            Importable::Constant(name, v) => env.set_variable(Identifier::from(*name), *v),
            _ => {
                if let Some(f) = b.function() {
                    env.define_function(Identifier::from(b.name()), f)
                }
            }
        }
    }

    assert_eq!(run("sqrt(16) + abs(-2)", &mut env), Ok(6.0));
    assert_eq!(run("min(3, max(1, 2))", &mut env), Ok(2.0));
    assert_eq!(run("floor(-1.5) + ceil(1.2) + trunc(-1.7)", &mut env), Ok(-1.0));
    assert_eq!(run("round(cos(0))", &mut env), Ok(1.0));
    assert!((run("log(e)", &mut env).unwrap() - 1.0).abs() < 1e-12);
    assert!((run("tan(pi / 4)", &mut env).unwrap() - 1.0).abs() < 1e-12);
    assert!((run("gamma(6)", &mut env).unwrap() - 120.0).abs() < 1e-9);

    let r = run("rand(1, 2)", &mut env).unwrap();
    assert!((1.0..=2.0).contains(&r));
    assert!(run("rand(2, 1)", &mut env).unwrap().is_nan());
}

#[test]
fn test_assignment_evicts_function() {
    let mut env = Environment::new();
    def(&mut env, "f", &["x"], "x");

    assert_eq!(run("f = 3", &mut env), Ok(3.0));
    assert!(env.function(&Identifier::from("f")).is_none());
    assert_eq!(env.variable(&Identifier::from("f")), Some(3.0));
}
