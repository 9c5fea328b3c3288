use thiserror::Error;

/// Every way a single line can fail inside the language core
///
/// All of these are recoverable: they abort the current line only. Parse-time kinds are raised
/// before the environment is touched, so the environment is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Wrong number format: {0}")]
    MalformedNumber(String),
    #[error("Ill-formed expression{0}")]
    MalformedExpression(String),
    #[error("Ill-formed expression : expected ')'")]
    UnclosedParenthesis,
    #[error("Undeclared identifier : {0}")]
    UnknownIdentifier(String),
    #[error("Undeclared function : {0}")]
    UnknownFunction(String),
    #[error("{0}")]
    ArityMismatch(String),
    #[error("Recursive function calls are not allowed ({0})")]
    RecursiveDefinitionNotAllowed(String),
    #[error("Expression is not assignable : {0}")]
    NotAssignable(String),
}

impl CalcError {
    /// `MalformedExpression` pointing at the offending token
    pub fn unexpected(what: impl std::fmt::Display) -> Self {
        CalcError::MalformedExpression(format!(" : unexpected {}", what))
    }

    pub fn arity(name: &str, expected: usize, got: usize) -> Self {
        let plural = if expected == 1 { "" } else { "s" };
        CalcError::ArityMismatch(format!(
            "Too {} arguments in call to function {}. Function takes {} argument{}",
            if expected < got { "many" } else { "few" },
            name,
            expected,
            plural
        ))
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;

#[test]
fn test_messages() {
    assert_eq!(
        CalcError::arity("min", 2, 1).to_string(),
        "Too few arguments in call to function min. Function takes 2 arguments"
    );
    assert_eq!(
        CalcError::arity("sqrt", 1, 3).to_string(),
        "Too many arguments in call to function sqrt. Function takes 1 argument"
    );
    assert_eq!(
        CalcError::unexpected("')'").to_string(),
        "Ill-formed expression : unexpected ')'"
    );
    assert_eq!(
        CalcError::UnclosedParenthesis.to_string(),
        "Ill-formed expression : expected ')'"
    );
}
