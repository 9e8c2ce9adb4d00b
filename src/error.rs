#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("no templates found for agent: {0}")]
    UnknownAgent(String),

    #[error("agent {0} has no default template")]
    MissingDefault(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("issue store error: {0}")]
    IssueStore(String),

    #[error("test oracle error: {0}")]
    Oracle(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("process error: {0}")]
    Process(String),
}

pub type Result<T> = std::result::Result<T, Error>;
