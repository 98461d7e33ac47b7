use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("election capacity reached ({0})")]
    ElectionCapacityReached(usize),

    #[error("election not found for root {0}")]
    ElectionNotFound(String),
}
