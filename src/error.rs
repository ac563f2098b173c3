use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("config: {0}")]
    Config(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    // reywen errors are only Debug, so they are flattened to text
    #[error("transport: {0}")]
    Transport(String),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("render: {0}")]
    Render(String),

    #[error("font: {0}")]
    Font(String),

    #[error("no mention found in `{0}`")]
    MissingMention(String),

    #[error("login: {0}")]
    Login(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
