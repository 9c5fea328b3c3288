use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{bail, Result};
use log::warn;

use crate::lang::ast::Identifier;
use crate::lang::functions::Function;

/// Raised whenever a binding silently replacing another would be surprising
#[derive(Debug, PartialEq, Clone)]
pub enum Warning {
    /// A variable took the name of a function
    OverridingFunction(Identifier),
    /// A function took the name of a variable
    OverridingVariable(Identifier),
    /// A function replaced another function
    RedefiningFunction(Identifier),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::OverridingFunction(i) => write!(f, "Warning : overriding function {}", i),
            Warning::OverridingVariable(i) => write!(f, "Warning : overriding variable {}", i),
            Warning::RedefiningFunction(i) => write!(f, "Warning : redefining function {}", i),
        }
    }
}

/// Global variable and function tables shared by every line of a session
///
/// A name lives in at most one of the two tables. Functions are reference counted so a caller can
/// keep using a definition for the duration of a call even if the table entry goes away.
#[derive(Default)]
pub struct Environment {
    variables: BTreeMap<Identifier, f64>,
    functions: BTreeMap<Identifier, Rc<Function>>,
    warnings: Vec<Warning>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, ident: &Identifier) -> Option<f64> {
        self.variables.get(ident).copied()
    }

    pub fn function(&self, ident: &Identifier) -> Option<Rc<Function>> {
        self.functions.get(ident).cloned()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&Identifier, f64)> {
        self.variables.iter().map(|(k, v)| (k, *v))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&Identifier, &Rc<Function>)> {
        self.functions.iter()
    }

    pub fn contains(&self, ident: &Identifier) -> bool {
        self.variables.contains_key(ident) || self.functions.contains_key(ident)
    }

    fn push_warning(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Create or update a variable, evicting a function of the same name
    pub fn set_variable(&mut self, ident: Identifier, val: f64) {
        if self.functions.remove(&ident).is_some() {
            self.push_warning(Warning::OverridingFunction(ident.clone()));
        }

        self.variables.insert(ident, val);
    }

    /// Create or replace a function, evicting a variable of the same name
    pub fn define_function(&mut self, ident: Identifier, func: Function) {
        if self.variables.remove(&ident).is_some() {
            self.push_warning(Warning::OverridingVariable(ident.clone()));
        }
        if self.functions.contains_key(&ident) {
            self.push_warning(Warning::RedefiningFunction(ident.clone()));
        }

        self.functions.insert(ident, Rc::new(func));
    }

    /// Remove `ident` from whichever table holds it
    pub fn remove(&mut self, ident: &Identifier) -> Result<()> {
        if self.variables.remove(ident).is_some() || self.functions.remove(ident).is_some() {
            Ok(())
        } else {
            bail!("{} is not in current environment", ident)
        }
    }

    /// Warnings raised since the last call
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[test]
fn test_names_are_exclusive() {
    let x = Identifier::from("x");
    let mut env = Environment::new();

    env.set_variable(x.clone(), 1.0);
    assert_eq!(env.variable(&x), Some(1.0));
    assert!(env.take_warnings().is_empty());

    env.define_function(
        x.clone(),
        Function::user_defined(vec![], crate::lang::ast::Expression::Number(2.0)),
    );
    assert_eq!(env.variable(&x), None);
    assert!(env.function(&x).is_some());
    assert_eq!(env.take_warnings(), vec![Warning::OverridingVariable(x.clone())]);

    env.set_variable(x.clone(), 3.0);
    assert!(env.function(&x).is_none());
    assert_eq!(env.variable(&x), Some(3.0));
    assert_eq!(env.take_warnings(), vec![Warning::OverridingFunction(x.clone())]);
    assert!(env.take_warnings().is_empty());
}

#[test]
fn test_remove() {
    let (x, f) = (Identifier::from("x"), Identifier::from("f"));
    let mut env = Environment::new();
    env.set_variable(x.clone(), 1.0);
    env.define_function(
        f.clone(),
        Function::user_defined(vec![], crate::lang::ast::Expression::Number(2.0)),
    );

    assert!(env.remove(&x).is_ok());
    assert!(!env.contains(&x));
    assert!(env.contains(&f));
    assert!(env.remove(&x).is_err());
    assert!(env.remove(&f).is_ok());
    assert!(!env.contains(&f));
}

#[test]
fn test_snapshot_outlives_entry() {
    let f = Identifier::from("f");
    let mut env = Environment::new();
    env.define_function(
        f.clone(),
        Function::user_defined(vec![], crate::lang::ast::Expression::Number(2.0)),
    );

    let snapshot = env.function(&f).unwrap();
    env.remove(&f).unwrap();
    assert_eq!(snapshot.arity(), 0);
}
