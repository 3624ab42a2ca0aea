#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand the job to the retrieval worker.
    EnqueueRetrieval(crate::RetrievalJob),
}
