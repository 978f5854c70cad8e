use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Type mismatch, expected int, got {0}")]
    TypeMismatch(&'static str),
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Worker disconnected before the program finished")]
    WorkerDisconnected,
}
