/// Outcome of one step attempt. `Retryable` covers transient collaborator
/// failures (LLM transport, retriever, storage); `Fatal` covers anything a
/// retry cannot fix. A step never mutates shared state: success carries the
/// complete next state by value.
#[derive(Clone, Debug)]
pub enum StepResult<S> {
    Ok { state: S, message: Option<String> },
    Retryable { message: String },
    Fatal { message: String },
}

impl<S> StepResult<S> {
    pub fn ok(state: S) -> Self {
        Self::Ok { state, message: None }
    }

    pub fn ok_with(state: S, message: impl Into<String>) -> Self {
        Self::Ok { state, message: Some(message.into()) }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }
}
