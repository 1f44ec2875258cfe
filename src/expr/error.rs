use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExprError {
    #[error("no token matches at position {position}\n{input}\n{caret}")]
    UnrecognizedToken {
        position: usize,
        input: String,
        caret: String,
    },
    #[error("lexeme longer than {max} characters")]
    LexemeTooLong { max: usize },
    #[error("expression has more than {max} tokens")]
    TooManyTokens { max: usize },
    #[error("bad expression")]
    BadExpression,
    #[error("unknown register '{0}'")]
    UnknownRegister(String),
    #[error("division by zero")]
    DivideByZero,
}
