use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Source followed by a chain of same-type transforms, drained into memory.
pub struct Pipeline<S, T> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>,
}

impl<T, S> Pipeline<S, T>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
{
    /// Run the pipeline to completion.
    ///
    /// A record rejected by a transform is logged and skipped. A source error
    /// aborts the run.
    pub async fn collect(self) -> Result<Vec<T>, PipelineError> {
        let mut stream = self.source.stream().await;
        let mut out = Vec::new();
        let mut rejected = 0usize;

        'records: while let Some(item) = stream.next().await {
            let mut env = item?;
            let received_at = env.received_at;
            for t in &self.transforms {
                match t.apply(env).await {
                    Ok(next) => env = next,
                    Err(e) => {
                        rejected += 1;
                        tracing::warn!(
                            error = %e,
                            received_at = ?received_at,
                            "record rejected by transform, skipping"
                        );
                        continue 'records;
                    }
                }
            }
            out.push(env.payload);
        }

        tracing::info!(accepted = out.len(), rejected, "pipeline drained");
        Ok(out)
    }
}
