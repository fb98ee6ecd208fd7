use thiserror::Error;

/// Dynamically-typed value produced by running a script chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ScriptResult {
    #[default]
    Nothing,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// Raw bytes; may contain embedded zeros and need not be UTF-8.
    Text(Vec<u8>),
}

impl ScriptResult {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptResult::Nothing => "nothing",
            ScriptResult::Integer(_) => "integer",
            ScriptResult::Real(_) => "real",
            ScriptResult::Boolean(_) => "boolean",
            ScriptResult::Text(_) => "text",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("unsupported result type: {0}")]
    UnsupportedValue(&'static str),
}

/// The engine's scripting subsystem.
pub trait ScriptHost {
    /// Compiles `code` as a chunk named `chunk_name` and calls it with no arguments.
    fn execute(&mut self, chunk_name: &str, code: &str) -> Result<ScriptResult, ScriptError>;
}
