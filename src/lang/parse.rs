//! Expression parser.
//!
//! This is a precedence climbing parser over the token stream produced by `Tokenizer`. Binding
//! strength and associativity come from `ast::BINARY_OPERATORS`, the same table the renderer
//! uses to decide where parentheses are needed.
//!
//! Identifiers are resolved while parsing:
//!
//! * inside a function body, a parameter name becomes `Expression::Parameter`
//! * `name(...)` must name an existing function of matching arity
//! * anything else is a variable read, checked only when evaluated
//!
//! The parser only ever borrows the environment immutably, so a failed parse cannot leave
//! anything half-defined behind.

use log::debug;

use crate::lang::ast::*;
use crate::lang::error::{CalcError, Result};
use crate::lang::functions::Function;
use crate::lang::lexer::{Token, Tokenizer};
use crate::lang::variables::Environment;

/// The function whose body is being parsed
struct Definition<'a> {
    name: &'a Identifier,
    params: &'a [Identifier],
}

struct Parser<'a> {
    lex: &'a mut Tokenizer,
    env: &'a Environment,
    definition: Option<Definition<'a>>,
}

/// Parse a whole line as a top level expression
pub fn parse(lex: &mut Tokenizer, env: &Environment) -> Result<Expression> {
    let mut parser = Parser {
        lex,
        env,
        definition: None,
    };

    parser.parse_line()
}

/// Parse the rest of a line as the body of function `name`
///
/// `params` is the parameter list of the function being defined; names in it resolve to
/// `Expression::Parameter`.
pub fn parse_function_body(
    lex: &mut Tokenizer,
    env: &Environment,
    name: &Identifier,
    params: &[Identifier],
) -> Result<Expression> {
    let mut parser = Parser {
        lex,
        env,
        definition: Some(Definition { name, params }),
    };

    parser.parse_line()
}

/// Whether calling `func` can end up calling `target`
fn reaches(
    env: &Environment,
    func: &Function,
    target: &Identifier,
    visited: &mut Vec<Identifier>,
) -> bool {
    let body = match func.body() {
        Some(b) => b,
        None => return false,
    };

    for callee in body.called_functions() {
        if callee == target {
            return true;
        }
        if visited.contains(callee) {
            continue;
        }
        visited.push(callee.clone());

        if let Some(f) = env.function(callee) {
            if reaches(env, &f, target, visited) {
                return true;
            }
        }
    }

    false
}

impl<'a> Parser<'a> {
    fn parse_line(&mut self) -> Result<Expression> {
        let expr = self.parse_expr()?;
        match self.lex.next()? {
            Token::EndOfInput => {
                debug!("parsed: {:?}", expr);
                Ok(expr)
            }
            tok => Err(CalcError::unexpected(tok)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expression> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(0, lhs)
    }

    /// Prefix operators are right associative: `--x` is `-(-x)`
    ///
    /// The operand also absorbs any `^` chain, so `-2^2` is `-(2^2)`.
    fn parse_unary(&mut self) -> Result<Expression> {
        let op = match self.lex.peek()? {
            Token::Operator(c) if UNARY_OPERATORS.contains(c) => Some(*c),
            _ => None,
        };
        let op = match op {
            Some(op) => op,
            None => return self.parse_primary(),
        };
        self.lex.next()?;

        let operand = self.parse_unary()?;
        let operand = self.parse_binary_rhs(POWER_PRECEDENCE, operand)?;

        match UnaryExpression::new(op, operand) {
            Some(u) => Ok(Expression::UnaryExpression(u)),
            None => Err(CalcError::unexpected(Token::Operator(op))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.lex.next()? {
            Token::Number(n) => Ok(Expression::Number(n)),
            Token::Identifier(i) => self.parse_identifier(Identifier(i)),
            Token::Punctuation('(') => self.parse_paren(),
            tok => Err(CalcError::unexpected(tok)),
        }
    }

    fn parse_paren(&mut self) -> Result<Expression> {
        let expr = self.parse_expr()?;
        match self.lex.next()? {
            Token::Punctuation(')') => Ok(expr),
            _ => Err(CalcError::UnclosedParenthesis),
        }
    }

    fn parse_identifier(&mut self, ident: Identifier) -> Result<Expression> {
        if let Some(def) = &self.definition {
            if let Some(idx) = def.params.iter().position(|p| *p == ident) {
                return Ok(Expression::Parameter(ident, idx));
            }
        }

        if *self.lex.peek()? != Token::Punctuation('(') {
            return Ok(Expression::Identifier(ident));
        }
        self.lex.next()?;

        let args = self.parse_args()?;
        self.resolve_call(&ident, args.len())?;

        Ok(Expression::FunctionCall(ident, args))
    }

    /// Comma separated, `(` already consumed. `f()` has no arguments, `f(1,)` is an error.
    fn parse_args(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if *self.lex.peek()? == Token::Punctuation(')') {
            self.lex.next()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expr()?);
            match self.lex.next()? {
                Token::Punctuation(')') => return Ok(args),
                Token::Punctuation(',') => {
                    if *self.lex.peek()? == Token::Punctuation(')') {
                        return Err(CalcError::unexpected(Token::Punctuation(')')));
                    }
                }
                Token::EndOfInput => return Err(CalcError::UnclosedParenthesis),
                tok => return Err(CalcError::unexpected(tok)),
            }
        }
    }

    fn resolve_call(&self, ident: &Identifier, argc: usize) -> Result<()> {
        if let Some(def) = &self.definition {
            if def.name == ident {
                return Err(CalcError::RecursiveDefinitionNotAllowed(format!(
                    "{} calls itself",
                    ident
                )));
            }
        }

        let func = match self.env.function(ident) {
            Some(f) => f,
            None => {
                let hint = if self.env.variable(ident).is_some() {
                    ". Maybe you meant to use the variable?"
                } else {
                    ""
                };
                return Err(CalcError::UnknownFunction(format!("{}{}", ident, hint)));
            }
        };

        if func.arity() != argc {
            return Err(CalcError::arity(&ident.0, func.arity(), argc));
        }

        if let Some(def) = &self.definition {
            if reaches(self.env, &func, def.name, &mut Vec::new()) {
                return Err(CalcError::RecursiveDefinitionNotAllowed(format!(
                    "{} calls {} through {}",
                    def.name, def.name, ident
                )));
            }
        }

        Ok(())
    }

    fn peek_binary_operator(&mut self) -> Result<Option<(char, OperatorInfo)>> {
        match self.lex.peek()? {
            Token::Operator(c) => Ok(binary_operator(*c).map(|info| (*c, info))),
            _ => Ok(None),
        }
    }

    fn parse_binary_rhs(&mut self, min_precedence: u32, mut lhs: Expression) -> Result<Expression> {
        loop {
            let (op, info) = match self.peek_binary_operator()? {
                Some((op, info)) if info.precedence >= min_precedence => (op, info),
                _ => return Ok(lhs),
            };
            self.lex.next()?;

            let mut rhs = self.parse_unary()?;
            while let Some((_, next)) = self.peek_binary_operator()? {
                let binds_tighter = next.precedence > info.precedence
                    || (next.precedence == info.precedence
                        && next.associativity == Associativity::Right);
                if !binds_tighter {
                    break;
                }
                rhs = self.parse_binary_rhs(next.precedence, rhs)?;
            }

            lhs = combine(op, lhs, rhs)?;
        }
    }
}

fn combine(op: char, lhs: Expression, rhs: Expression) -> Result<Expression> {
    if op == '=' {
        return match lhs {
            Expression::Identifier(target) => Ok(Expression::Assignment(target, Box::new(rhs))),
            other => Err(CalcError::NotAssignable(other.to_string())),
        };
    }

    match BinaryExpression::new(op, lhs, rhs) {
        Some(b) => Ok(Expression::BinaryExpression(b)),
        None => Err(CalcError::unexpected(Token::Operator(op))),
    }
}

#[cfg(test)]
fn parse_str(input: &str, env: &Environment) -> Result<Expression> {
    let mut lex = Tokenizer::new();
    lex.reset(input);
    parse(&mut lex, env)
}

#[cfg(test)]
fn define(env: &mut Environment, name: &str, params: &[&str], body: &str) -> Result<()> {
    let name = Identifier::from(name);
    let params: Vec<Identifier> = params.iter().map(|p| Identifier::from(*p)).collect();
    let mut lex = Tokenizer::new();
    lex.reset(body);

    let body = parse_function_body(&mut lex, env, &name, &params)?;
    env.define_function(name, Function::user_defined(params, body));
    Ok(())
}

#[test]
fn test_precedence_and_associativity() {
    let env = Environment::new();
    let data = vec![
        ("2 + 3 * 4", "2 + 3 * 4"),
        ("(2 + 3) * 4", "(2 + 3) * 4"),
        ("2 ^ 3 ^ 2", "2^3^2"),
        ("(2 ^ 3) ^ 2", "(2^3)^2"),
        ("1 - 2 - 3", "1 - 2 - 3"),
        ("1 - (2 - 3)", "1 - (2 - 3)"),
        ("8 / 4 / 2 % 3", "8 / 4 / 2 % 3"),
        ("x = y = 5", "x = y = 5"),
        ("x = 1 + 2 * y", "x = 1 + 2 * y"),
        ("-2 ^ 2", "-2^2"),
        ("(-2) ^ 2", "(-2)^2"),
        ("--x", "-(-x)"),
        ("2 ^ -1", "2^(-1)"),
        ("-2 * 3", "-2 * 3"),
        ("1 + (x = 2)", "1 + (x = 2)"),
        ("((((7))))", "7"),
    ];

    for (input, expected) in data {
        let expr = parse_str(input, &env).expect(input);
        assert_eq!(expr.render(), expected, "{}", input);
        // Rendering must re-parse to the very same tree
        assert_eq!(parse_str(&expr.render(), &env), Ok(expr), "{}", input);
    }
}

#[test]
fn test_tree_shape() {
    let env = Environment::new();
    assert_eq!(
        parse_str("-2^2", &env),
        Ok(Expression::UnaryExpression(UnaryExpression::Minus(Box::new(
            Expression::BinaryExpression(BinaryExpression::Power(
                Box::new(Expression::Number(2.0)),
                Box::new(Expression::Number(2.0)),
            ))
        ))))
    );
    assert_eq!(
        parse_str("x = y = 5", &env),
        Ok(Expression::Assignment(
            Identifier::from("x"),
            Box::new(Expression::Assignment(
                Identifier::from("y"),
                Box::new(Expression::Number(5.0))
            ))
        ))
    );
}

#[test]
fn test_malformed() {
    let env = Environment::new();
    let data = vec!["", "1 +", "1 2", "* 3", ")", "1 + )", "x y", "3 !", "1,2"];

    for input in data {
        match parse_str(input, &env) {
            Err(CalcError::MalformedExpression(_)) => (),
            r => panic!("{:?} parsed as {:?}", input, r),
        }
    }

    for input in vec!["(1 + 2", "((1)", "(1 2)"] {
        assert_eq!(parse_str(input, &env), Err(CalcError::UnclosedParenthesis), "{}", input);
    }

    assert!(matches!(
        parse_str("1 + 2.3.4", &env),
        Err(CalcError::MalformedNumber(_))
    ));
}

#[test]
fn test_not_assignable() {
    let env = Environment::new();
    for input in vec!["1 = 2", "x + y = 3", "(x) + 1 = 2", "-x = 1"] {
        match parse_str(input, &env) {
            Err(CalcError::NotAssignable(_)) => (),
            r => panic!("{:?} parsed as {:?}", input, r),
        }
    }
    // A parenthesised bare name is still a name
    assert!(parse_str("(x) = 2", &env).is_ok());
}

#[test]
fn test_unknown_variable_parses() {
    let env = Environment::new();
    assert_eq!(
        parse_str("y", &env),
        Ok(Expression::Identifier(Identifier::from("y")))
    );
}

#[test]
fn test_function_calls() {
    let mut env = Environment::new();
    define(&mut env, "f", &["x"], "x * 2").unwrap();
    define(&mut env, "two", &["a", "b"], "a + b").unwrap();
    define(&mut env, "k", &[], "42").unwrap();
    env.set_variable(Identifier::from("v"), 1.0);

    assert!(parse_str("f(3) + two(1, f(2)) + k()", &env).is_ok());
    assert!(matches!(
        parse_str("two(1)", &env),
        Err(CalcError::ArityMismatch(_))
    ));
    assert!(matches!(
        parse_str("k(1)", &env),
        Err(CalcError::ArityMismatch(_))
    ));
    assert_eq!(
        parse_str("g(1)", &env),
        Err(CalcError::UnknownFunction("g".to_string()))
    );
    assert_eq!(
        parse_str("v(1)", &env),
        Err(CalcError::UnknownFunction(
            "v. Maybe you meant to use the variable?".to_string()
        ))
    );
    assert_eq!(parse_str("two(1,)", &env), Err(CalcError::unexpected("')'")));
    assert_eq!(parse_str("two(1, 2", &env), Err(CalcError::UnclosedParenthesis));
    assert!(matches!(
        parse_str("f(1 2)", &env),
        Err(CalcError::MalformedExpression(_))
    ));
    assert!(matches!(
        parse_str("f(,)", &env),
        Err(CalcError::MalformedExpression(_))
    ));
}

#[test]
fn test_parameters() {
    let env = Environment::new();
    let name = Identifier::from("f");
    let params = vec![Identifier::from("x"), Identifier::from("y")];
    let mut lex = Tokenizer::new();
    lex.reset("y - x * z");

    assert_eq!(
        parse_function_body(&mut lex, &env, &name, &params)
            .unwrap()
            .to_string(),
        "y - x * z"
    );

    lex.reset("y - x * z");
    match parse_function_body(&mut lex, &env, &name, &params).unwrap() {
        Expression::BinaryExpression(BinaryExpression::Minus(lhs, _)) => {
            assert_eq!(*lhs, Expression::Parameter(Identifier::from("y"), 1))
        }
        e => panic!("unexpected tree {:?}", e),
    }

    // Parameters are not assignable
    lex.reset("x = 1");
    assert!(matches!(
        parse_function_body(&mut lex, &env, &name, &params),
        Err(CalcError::NotAssignable(_))
    ));
}

#[test]
fn test_recursion_rejected() {
    let mut env = Environment::new();

    // Direct recursion is caught before the name is ever looked up
    assert!(matches!(
        define(&mut env, "f", &["x"], "f(x)"),
        Err(CalcError::RecursiveDefinitionNotAllowed(_))
    ));
    assert!(!env.contains(&Identifier::from("f")));

    define(&mut env, "f", &["x"], "x * 2").unwrap();
    assert!(matches!(
        define(&mut env, "f", &["x"], "1 + f(x)"),
        Err(CalcError::RecursiveDefinitionNotAllowed(_))
    ));

    // Indirect recursion through another user function
    define(&mut env, "g", &["x"], "f(x) + 1").unwrap();
    assert!(matches!(
        define(&mut env, "f", &["x"], "g(x)"),
        Err(CalcError::RecursiveDefinitionNotAllowed(_))
    ));

    // Calling other functions, even several times, is fine
    define(&mut env, "h", &["x"], "g(x) + f(g(x))").unwrap();

    // At top level a function may be used anywhere
    assert!(parse_str("f(f(f(1)))", &env).is_ok());
}

#[test]
fn test_parse_leaves_environment_untouched() {
    let mut env = Environment::new();
    env.set_variable(Identifier::from("x"), 1.0);

    assert!(parse_str("x = 2 +", &env).is_err());
    assert_eq!(env.variable(&Identifier::from("x")), Some(1.0));
    assert!(parse_str("x = 2", &env).is_ok());
    assert_eq!(env.variable(&Identifier::from("x")), Some(1.0));
}
