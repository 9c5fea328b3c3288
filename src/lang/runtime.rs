use std::io::Write;

use log::debug;

use crate::lang::ast::Identifier;
use crate::lang::command::{execute, parse_command, report_warnings, Command};
use crate::lang::lexer::Tokenizer;
use crate::lang::parse::parse;
use crate::lang::variables::Environment;

#[derive(Debug, PartialEq)]
pub enum EvalResult {
    Ok,
    Quit,
    Err(String),
}

/// Everything a session keeps between lines
pub struct Runtime<'a> {
    sink: &'a mut dyn Write,
    env: Environment,
    lex: Tokenizer,
}

impl<'a> Runtime<'a> {
    /// Create a new `Runtime` instance
    ///
    /// `sink` is where output should be written. eg. the value of each expression, warnings and
    /// the output of `!env` or `!help`
    pub fn new(sink: &'a mut dyn Write) -> Self {
        Self {
            sink,
            env: Environment::new(),
            lex: Tokenizer::new(),
        }
    }

    /// Run one line of input: a command if it starts with `!`, otherwise an expression
    pub fn eval(&mut self, line: &str) -> EvalResult {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return EvalResult::Ok;
        }

        if trimmed.starts_with('!') {
            match parse_command(trimmed) {
                Ok(cmd) => self.run_command(cmd),
                Err(e) => EvalResult::Err(format!("Invalid command : {}", e)),
            }
        } else {
            match self.eval_expression(line) {
                Ok(()) => EvalResult::Ok,
                Err(e) => EvalResult::Err(format!("Invalid input : {}", e)),
            }
        }
    }

    /// Same as `!import names...`
    pub fn import(&mut self, names: &[String]) -> EvalResult {
        let idents = names.iter().map(|n| Identifier::from(n.as_str())).collect();
        self.run_command(Command::Import(idents))
    }

    fn run_command(&mut self, cmd: Command) -> EvalResult {
        debug!("command: {:?}", cmd);
        match execute(cmd, &mut self.env, &mut *self.sink, &mut self.lex) {
            Ok(true) => EvalResult::Quit,
            Ok(false) => EvalResult::Ok,
            Err(e) => EvalResult::Err(format!("Invalid command : {}", e)),
        }
    }

    fn eval_expression(&mut self, line: &str) -> anyhow::Result<()> {
        self.lex.reset(line);
        let expr = parse(&mut self.lex, &self.env)?;
        let val = expr.evaluate(&mut self.env)?;

        report_warnings(&mut self.env, &mut *self.sink)?;
        writeln!(self.sink, "{}", val)?;

        Ok(())
    }
}

#[cfg(test)]
fn run(lines: &[&str]) -> (Vec<EvalResult>, String) {
    let mut output = Vec::new();
    let results = {
        let mut rt = Runtime::new(&mut output);
        lines.iter().map(|l| rt.eval(l)).collect()
    };

    (
        results,
        String::from_utf8(output).expect("Output not utf-8"),
    )
}

#[test]
fn test_expression() {
    let tests = vec![
        ("1 + 2", "3\n"),
        ("2 * 3 + 4", "10\n"),
        ("2 * (3 + 4)", "14\n"),
        ("2 ^ 3 ^ 2", "512\n"),
        ("-2^2", "-4\n"),
        ("(-2)^2", "4\n"),
        ("10 - 4 - 3", "3\n"),
        ("7 % 3", "1\n"),
        ("-7 % 3", "-1\n"),
        ("1 / 4", "0.25\n"),
        ("1 / 0", "inf\n"),
        ("4.2e+1", "42\n"),
        ("  5  ", "5\n"),
    ];

    for (input, expected) in tests {
        let (results, output) = run(&[input]);
        assert_eq!(results, vec![EvalResult::Ok], "{}", input);
        assert_eq!(output, expected, "{}", input);
    }
}

#[test]
fn test_session() {
    let (results, output) = run(&["x = y = 3", "x * y", "x = x + 1", "x"]);
    assert!(results.iter().all(|r| *r == EvalResult::Ok));
    assert_eq!(output, "3\n9\n4\n4\n");
}

#[test]
fn test_blank_and_quit() {
    let (results, output) = run(&["", "   ", "!", "!quit"]);
    assert_eq!(
        results,
        vec![
            EvalResult::Ok,
            EvalResult::Ok,
            EvalResult::Quit,
            EvalResult::Quit
        ]
    );
    assert_eq!(output, "");
}

#[test]
fn test_errors() {
    let tests = vec![
        ("1 +", "Invalid input : Ill-formed expression : unexpected end of input"),
        ("(1 + 2", "Invalid input : Ill-formed expression : expected ')'"),
        ("y + 1", "Invalid input : Undeclared identifier : y"),
        ("f(1)", "Invalid input : Undeclared function : f"),
        ("3 = 4", "Invalid input : Expression is not assignable : 3"),
        ("!nope", "Invalid command : No such command : nope"),
        ("!del x", "Invalid command : x is not in current environment"),
    ];

    for (input, expected) in tests {
        let (results, output) = run(&[input]);
        assert_eq!(results, vec![EvalResult::Err(expected.to_string())], "{}", input);
        assert_eq!(output, "", "{}", input);
    }
}

#[test]
fn test_failed_line_keeps_environment() {
    let (results, output) = run(&["x = 1", "x = 2 + nope", "x"]);
    assert_eq!(results[0], EvalResult::Ok);
    assert!(matches!(results[1], EvalResult::Err(_)));
    assert_eq!(output, "1\n1\n");
}

#[test]
fn test_import_and_env() {
    let (results, output) = run(&["!import sqrt pi min", "sqrt(16) + min(1, 2)", "!env min"]);
    assert!(results.iter().all(|r| *r == EvalResult::Ok));
    assert_eq!(
        output,
        format!(
            "pi = {}\nFunction min(x, y)\nFunction sqrt(x)\n5\nmin(x, y) (builtin)\n",
            std::f64::consts::PI
        )
    );

    // Warnings follow the same order: constants first, then functions by name
    let (results, output) = run(&["!def pi() = 3", "sqrt = 2", "!import sqrt pi"]);
    assert!(results.iter().all(|r| *r == EvalResult::Ok));
    assert_eq!(
        output,
        format!(
            "2\nWarning : overriding function pi\npi = {}\n\
             Warning : overriding variable sqrt\nFunction sqrt(x)\n",
            std::f64::consts::PI
        )
    );

    // Validation happens before anything is imported
    let (results, output) = run(&["!import e tau", "!env"]);
    assert_eq!(
        results[0],
        EvalResult::Err("Invalid command : tau is not in builtin list".to_string())
    );
    assert_eq!(output, "");
}

#[test]
fn test_define() {
    let (results, output) = run(&[
        "!def sq(x) = x ^ 2",
        "!def hyp(a, b) = (sq(a) + sq(b)) ^ 0.5",
        "hyp(3, 4)",
        "!env",
    ]);
    assert!(results.iter().all(|r| *r == EvalResult::Ok), "{:?}", results);
    assert_eq!(
        output,
        "5\nFunctions :\nhyp(a, b) = (sq(a) + sq(b))^0.5\nsq(x) = x^2\n"
    );
}

#[test]
fn test_define_errors() {
    let (results, _) = run(&["!def f(x) = f(x - 1)"]);
    assert!(matches!(&results[0], EvalResult::Err(e) if e.contains("Recursive")));

    let (results, _) = run(&["!def f(x) = g(x)"]);
    assert_eq!(
        results[0],
        EvalResult::Err("Invalid command : Undeclared function : g".to_string())
    );

    let (results, _) = run(&["!def f(x) = x +"]);
    assert!(matches!(&results[0], EvalResult::Err(e) if e.starts_with("Invalid command : Ill-formed")));
}

#[test]
fn test_warnings() {
    let (results, output) = run(&["!def f() = 1", "f = 2", "!def f() = 3", "!def f() = 4"]);
    assert!(results.iter().all(|r| *r == EvalResult::Ok));
    assert_eq!(
        output,
        "Warning : overriding function f\n2\n\
         Warning : overriding variable f\n\
         Warning : redefining function f\n"
    );
}

#[test]
fn test_cli_import() {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output);
        assert_eq!(rt.import(&["e".to_string()]), EvalResult::Ok);
        assert_eq!(
            rt.eval("round(e)"),
            EvalResult::Err("Invalid input : Undeclared function : round".to_string())
        );
        assert_eq!(rt.eval("e - e"), EvalResult::Ok);
    }
    assert_eq!(
        String::from_utf8(output).expect("Output not utf-8"),
        format!("e = {}\n0\n", std::f64::consts::E)
    );
}
