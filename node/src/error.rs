use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] weave_store::StoreError),

    #[error(transparent)]
    Network(#[from] weave_network::NetworkError),

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
