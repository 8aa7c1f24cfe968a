use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command `{name}` is already registered")]
    DuplicateCommand { name: String },

    #[error(transparent)]
    Bot(#[from] alya_bot::Error),
}

impl Error {
    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateCommand { name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
