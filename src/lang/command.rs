//! Meta-commands: every line starting with `!`.
//!
//! Command lines are tiny and regular so they are parsed with `pom` combinators. The one
//! exception is the body of `!def`, which is handed to the expression parser as raw text.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io::Write;
use std::iter::FromIterator;

use anyhow::{anyhow, bail, ensure, Result};
use lazy_static::lazy_static;
use log::info;
use pom::parser::{any, end, is_a, list, one_of, sym, Parser};

use crate::lang::ast::Identifier;
use crate::lang::functions::{Function, Importable};
use crate::lang::lexer::Tokenizer;
use crate::lang::parse::parse_function_body;
use crate::lang::variables::Environment;

#[derive(Debug, PartialEq)]
pub enum Command {
    Help(Option<Identifier>),
    Quit,
    Env(Vec<Identifier>),
    Import(Vec<Identifier>),
    Del(Vec<Identifier>),
    /// (name, params, body source)
    Def(Identifier, Vec<Identifier>, String),
}

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Help,
    Quit,
    Env,
    Import,
    Del,
    Def,
}

#[derive(Clone, Copy)]
enum ArgCount {
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
}

struct CommandSpec {
    kind: Kind,
    args: ArgCount,
    syntax: &'static str,
    doc: &'static [&'static str],
}

lazy_static! {
    static ref COMMANDS: BTreeMap<&'static str, CommandSpec> = {
        let mut map = BTreeMap::new();
        map.insert(
            "help",
            CommandSpec {
                kind: Kind::Help,
                args: ArgCount::AtMost(1),
                syntax: "!help [command]",
                doc: &["Print help.", "Command-specific help : !help command"],
            },
        );
        map.insert(
            "quit",
            CommandSpec {
                kind: Kind::Quit,
                args: ArgCount::Exactly(0),
                syntax: "!quit",
                doc: &["Exit the program.", "You can use Ctrl-D too."],
            },
        );
        map.insert(
            "env",
            CommandSpec {
                kind: Kind::Env,
                args: ArgCount::AtLeast(0),
                syntax: "!env [identifiers...]",
                doc: &[
                    "Print the value of variables or functions.",
                    "If no arguments are given, print the entire environment.",
                ],
            },
        );
        map.insert(
            "import",
            CommandSpec {
                kind: Kind::Import,
                args: ArgCount::AtLeast(1),
                syntax: "!import builtins...",
                doc: &["Import builtins in the environment."],
            },
        );
        map.insert(
            "del",
            CommandSpec {
                kind: Kind::Del,
                args: ArgCount::AtLeast(1),
                syntax: "!del identifiers...",
                doc: &["Delete elements from the environment."],
            },
        );
        map.insert(
            "def",
            CommandSpec {
                kind: Kind::Def,
                args: ArgCount::AtLeast(0),
                syntax: "!def name([params...]) = body",
                doc: &[
                    "Define new functions. Body can be any valid expression.",
                    "Note : Recursive function calls are not allowed.",
                ],
            },
        );
        map
    };
}

/// Names `!` can be followed by
pub fn command_names() -> impl Iterator<Item = &'static str> {
    COMMANDS.keys().copied()
}

fn space<'a>() -> Parser<'a, char, ()> {
    one_of(" \t\r\n").repeat(0..).discard()
}

fn ident<'a>() -> Parser<'a, char, Identifier> {
    (is_a(|c: char| c.is_alphabetic()) + is_a(|c: char| c.is_alphanumeric()).repeat(0..))
        .collect()
        .map(String::from_iter)
        .map(Identifier)
}

/// `!name` followed by whatever else is on the line
fn header<'a>() -> Parser<'a, char, (Option<Identifier>, String)> {
    space() * sym('!') * space() * ident().opt() + any().repeat(0..).map(String::from_iter)
}

fn args<'a>() -> Parser<'a, char, Vec<Identifier>> {
    (space() * ident()).repeat(0..) - space() - end()
}

/// `name(a, b) =` followed by the body
fn definition<'a>() -> Parser<'a, char, ((Identifier, Vec<Identifier>), String)> {
    let params = list(space() * ident(), space() * sym(','));
    let prototype = space() * ident() - space() - sym('(') + params - space() - sym(')');

    prototype - space() - sym('=') + any().repeat(0..).map(String::from_iter)
}

fn check_arg_count(name: &str, spec: &CommandSpec, count: usize) -> Result<()> {
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    let (ok, bound, n) = match spec.args {
        ArgCount::Exactly(n) => (count == n, "exactly", n),
        ArgCount::AtLeast(n) => (count >= n, "at least", n),
        ArgCount::AtMost(n) => (count <= n, "at most", n),
    };

    ensure!(
        ok,
        "Wrong argument count. Command {} takes {} {} argument{}",
        name,
        bound,
        n,
        plural(n)
    );

    Ok(())
}

fn check_unique(idents: &[Identifier]) -> Result<()> {
    for (i, ident) in idents.iter().enumerate() {
        ensure!(!idents[..i].contains(ident), "Multiple uses of {}", ident);
    }

    Ok(())
}

/// Parse a line whose first non-blank character is `!`
pub fn parse_command(line: &str) -> Result<Command> {
    let input: Vec<char> = line.chars().collect();
    let (name, rest) = header()
        .parse(&input)
        .map_err(|_| anyhow!("Commands start with '!'"))?;

    let name = match name {
        Some(n) => n,
        None if rest.trim().is_empty() => return Ok(Command::Quit),
        None => bail!("No such command"),
    };
    let spec = COMMANDS
        .get(name.0.as_str())
        .ok_or_else(|| anyhow!("No such command : {}", name))?;

    let rest: Vec<char> = rest.chars().collect();
    if spec.kind == Kind::Def {
        ensure!(
            rest.iter().any(|c| !c.is_whitespace()),
            "Expected function definition"
        );
        let ((fn_name, params), body) = definition()
            .parse(&rest)
            .map_err(|_| anyhow!("Syntax error in function definition, expected {}", spec.syntax))?;
        for (i, p) in params.iter().enumerate() {
            ensure!(!params[..i].contains(p), "Multiple parameters named {}", p);
        }

        return Ok(Command::Def(fn_name, params, body));
    }

    let args = args()
        .parse(&rest)
        .map_err(|_| anyhow!("Wrong argument format"))?;
    check_arg_count(&name.0, spec, args.len())?;

    let mut args = args.into_iter();
    Ok(match spec.kind {
        Kind::Help => Command::Help(args.next()),
        Kind::Quit => Command::Quit,
        Kind::Env => Command::Env(args.collect()),
        Kind::Import => Command::Import(args.collect()),
        Kind::Del => Command::Del(args.collect()),
        Kind::Def => unreachable!(),
    })
}

/// Print and clear pending environment warnings
pub fn report_warnings(env: &mut Environment, sink: &mut dyn Write) -> Result<()> {
    for w in env.take_warnings() {
        writeln!(sink, "{}", w)?;
    }

    Ok(())
}

fn print_table(sink: &mut dyn Write, rows: &[(String, String)]) -> Result<()> {
    let width = rows
        .iter()
        .max_by_key(|p| p.0.len())
        .map_or(0, |p| p.0.len() + 4);
    for (l, r) in rows {
        writeln!(sink, "{:width$}{}", l, r, width = width)?;
    }

    Ok(())
}

fn print_help(sink: &mut dyn Write, command: Option<&Identifier>) -> Result<()> {
    if let Some(command) = command {
        let spec = COMMANDS
            .get(command.0.as_str())
            .ok_or_else(|| anyhow!("No such command : {}", command))?;
        writeln!(sink, "Syntax : {}", spec.syntax)?;
        for line in spec.doc {
            writeln!(sink, "    {}", line)?;
        }
        if spec.kind == Kind::Import {
            let names: Vec<&str> = crate::lang::functions::BUILTINS
                .iter()
                .map(|b| b.name())
                .collect();
            writeln!(sink, "    Builtins : {}", names.join(", "))?;
        }
        return Ok(());
    }

    let mut rows: Vec<(String, String)> = vec![
        ("Expression syntax", ""),
        ("--------------------", ""),
        ("42, 42.0, 4.2e+1", "Numbers"),
        ("x + y, x - y", "Addition, subtraction (left-associative)"),
        ("x * y, x / y, x % y", "Multiplication, division, modulo (left-associative)"),
        ("x ^ y", "Exponentiation (right-associative)"),
        ("x = y", "Assignment (right-associative)"),
        ("-x", "Negation"),
        ("f(x, y)", "Function call"),
        ("", ""),
        ("Commands", ""),
        ("--------------------", ""),
    ]
    .into_iter()
    .map(|(l, r)| (l.to_string(), r.to_string()))
    .collect();
    for spec in COMMANDS.values() {
        rows.push((spec.syntax.to_string(), spec.doc[0].to_string()));
    }

    print_table(sink, &rows)
}

fn print_env(env: &Environment, sink: &mut dyn Write, idents: &[Identifier]) -> Result<()> {
    if idents.is_empty() {
        if env.variables().next().is_some() {
            writeln!(sink, "Variables :")?;
        }
        for (ident, val) in env.variables() {
            writeln!(sink, "{} = {}", ident, val)?;
        }
        if env.functions().next().is_some() {
            writeln!(sink, "Functions :")?;
        }
        for (ident, func) in env.functions() {
            writeln!(sink, "{}", func.signature(ident))?;
        }

        return Ok(());
    }

    check_unique(idents)?;
    // Validate everything first so a bad name prints nothing
    let mut lines = Vec::with_capacity(idents.len());
    for ident in idents {
        if let Some(val) = env.variable(ident) {
            lines.push(format!("{} = {}", ident, val));
        } else if let Some(func) = env.function(ident) {
            lines.push(func.signature(ident));
        } else {
            bail!("Undeclared identifier : {}", ident);
        }
    }
    for line in lines {
        writeln!(sink, "{}", line)?;
    }

    Ok(())
}

fn import(env: &mut Environment, sink: &mut dyn Write, idents: &[Identifier]) -> Result<()> {
    check_unique(idents)?;
    let mut builtins = idents
        .iter()
        .map(|i| Importable::try_from(i.0.as_str()))
        .collect::<Result<Vec<_>>>()?;
    // Constants before functions, each group by name
    builtins.sort_by_key(|b| (!matches!(b, Importable::Constant(_, _)), b.name()));

    for builtin in builtins {
        let ident = Identifier::from(builtin.name());
        match (builtin, builtin.function()) {
            (Importable::Constant(_, val), _) => {
                env.set_variable(ident.clone(), val);
                report_warnings(env, sink)?;
                writeln!(sink, "{} = {}", ident, val)?;
            }
            (_, Some(func)) => {
                let params: Vec<&str> = func.params.iter().map(|p| p.0.as_str()).collect();
                let echo = format!("Function {}({})", ident, params.join(", "));
                env.define_function(ident, func);
                report_warnings(env, sink)?;
                writeln!(sink, "{}", echo)?;
            }
            (_, None) => unreachable!("non-constant builtins always have a function"),
        }
    }

    Ok(())
}

fn delete(env: &mut Environment, idents: &[Identifier]) -> Result<()> {
    check_unique(idents)?;
    for ident in idents {
        ensure!(env.contains(ident), "{} is not in current environment", ident);
    }
    for ident in idents {
        env.remove(ident)?;
    }

    Ok(())
}

fn define(
    env: &mut Environment,
    sink: &mut dyn Write,
    lex: &mut Tokenizer,
    name: Identifier,
    params: Vec<Identifier>,
    body: &str,
) -> Result<()> {
    lex.reset(body);
    let body = parse_function_body(lex, env, &name, &params)?;
    info!("define {} = {}", name, body.render());

    env.define_function(name, Function::user_defined(params, body));
    report_warnings(env, sink)
}

/// Run `cmd`. Returns `true` if the session should end.
pub fn execute(
    cmd: Command,
    env: &mut Environment,
    sink: &mut dyn Write,
    lex: &mut Tokenizer,
) -> Result<bool> {
    match cmd {
        Command::Help(command) => print_help(sink, command.as_ref())?,
        Command::Quit => return Ok(true),
        Command::Env(idents) => print_env(env, sink, &idents)?,
        Command::Import(idents) => import(env, sink, &idents)?,
        Command::Del(idents) => delete(env, &idents)?,
        Command::Def(name, params, body) => define(env, sink, lex, name, params, &body)?,
    }

    Ok(false)
}

#[cfg(test)]
fn ids(names: &[&str]) -> Vec<Identifier> {
    names.iter().map(|n| Identifier::from(*n)).collect()
}

#[test]
fn test_parse_command() {
    let data = vec![
        ("!", Command::Quit),
        ("  !  ", Command::Quit),
        ("!quit", Command::Quit),
        ("!help", Command::Help(None)),
        ("!help env", Command::Help(Some(Identifier::from("env")))),
        ("!env", Command::Env(vec![])),
        ("!env x  y2 ", Command::Env(ids(&["x", "y2"]))),
        ("! import pi sqrt", Command::Import(ids(&["pi", "sqrt"]))),
        ("!del f", Command::Del(ids(&["f"]))),
        (
            "!def f(x, y) = x * y",
            Command::Def(Identifier::from("f"), ids(&["x", "y"]), " x * y".to_string()),
        ),
        (
            "!def k( )=1",
            Command::Def(Identifier::from("k"), vec![], "1".to_string()),
        ),
    ];

    for (input, expected) in data {
        assert_eq!(parse_command(input).expect(input), expected);
    }
}

#[test]
fn test_parse_command_errors() {
    let data = vec![
        ("!nope", "No such command : nope"),
        ("!42", "No such command"),
        ("!quit now", "Wrong argument count. Command quit takes exactly 0 arguments"),
        ("!help a b", "Wrong argument count. Command help takes at most 1 argument"),
        ("!import", "Wrong argument count. Command import takes at least 1 argument"),
        ("!del", "Wrong argument count. Command del takes at least 1 argument"),
        ("!env 3", "Wrong argument format"),
        ("!def", "Expected function definition"),
        ("!def f(x, x) = x", "Multiple parameters named x"),
    ];

    for (input, expected) in data {
        match parse_command(input) {
            Ok(c) => panic!("{} parsed as {:?}", input, c),
            Err(e) => assert_eq!(e.to_string(), expected),
        }
    }

    for input in vec!["!def f", "!def f(x,) = x", "!def f(x) x", "!def (x) = 1", "!def f(1) = 1"] {
        assert!(parse_command(input).is_err(), "{}", input);
    }
}
