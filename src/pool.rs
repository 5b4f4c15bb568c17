//! Job scheduling: validate on the caller's thread, blend on a worker.
//!
//! A [`BlendPool`] owns a bounded rayon thread pool. `submit` performs all
//! option validation synchronously and then spawns exactly one task; the
//! task delivers exactly one result over an mpsc channel wrapped in a
//! [`JobHandle`]. Jobs are fire-and-forget: dropping the handle abandons
//! the result, and there is no cancellation.

use std::sync::{Arc, OnceLock, mpsc};

use tracing::debug;

use crate::blend::{self, BlendOutput};
use crate::decode::{DefaultDecoder, LayerDecoder};
use crate::error::{BlendError, BlendResult};
use crate::layer::Layer;
use crate::options::BlendOptions;

pub struct BlendPool {
    pool: rayon::ThreadPool,
    decoder: Arc<dyn LayerDecoder>,
}

impl BlendPool {
    /// Build a pool with the default decoder. `threads: None` lets rayon
    /// pick a worker count.
    pub fn new(threads: Option<usize>) -> BlendResult<Self> {
        Self::with_decoder(threads, Arc::new(DefaultDecoder))
    }

    /// Build a pool around a custom decoder implementation.
    pub fn with_decoder(
        threads: Option<usize>,
        decoder: Arc<dyn LayerDecoder>,
    ) -> BlendResult<Self> {
        if threads == Some(0) {
            return Err(BlendError::validation(
                "blend pool 'threads' must be >= 1 when set",
            ));
        }
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| BlendError::Other(anyhow::anyhow!("failed to build thread pool: {e}")))?;
        Ok(Self { pool, decoder })
    }

    /// Validate a job and enqueue it. Returns without blocking on any
    /// decode/composite/encode work; validation failures surface here and
    /// spawn nothing.
    pub fn submit(&self, layers: Vec<Layer>, options: &BlendOptions) -> BlendResult<JobHandle> {
        let resolved = options.resolve(&layers)?;

        // A lone bare buffer with nothing requested of it is forwarded
        // verbatim; the codec stack is never involved.
        if layers.len() == 1
            && layers[0].is_plain()
            && !resolved.reencode
            && options.width == 0
            && options.height == 0
        {
            debug!("single plain layer, forwarding bytes verbatim");
            return Ok(JobHandle::ready(Ok(BlendOutput {
                bytes: layers[0].bytes.to_vec(),
                warnings: Vec::new(),
            })));
        }

        let (tx, rx) = mpsc::channel();
        let decoder = Arc::clone(&self.decoder);
        self.pool.spawn(move || {
            let result = blend::run(&layers, resolved, decoder.as_ref());
            // The receiver may have been dropped; that is fine.
            let _ = tx.send(result);
        });
        Ok(JobHandle::pending(rx))
    }
}

/// Handle to one in-flight blend job. The result is delivered exactly once.
#[derive(Debug)]
pub struct JobHandle {
    rx: Option<mpsc::Receiver<BlendResult<BlendOutput>>>,
    ready: Option<BlendResult<BlendOutput>>,
}

impl JobHandle {
    fn ready(result: BlendResult<BlendOutput>) -> Self {
        Self {
            rx: None,
            ready: Some(result),
        }
    }

    fn pending(rx: mpsc::Receiver<BlendResult<BlendOutput>>) -> Self {
        Self {
            rx: Some(rx),
            ready: None,
        }
    }

    /// Block until the job finishes.
    pub fn wait(mut self) -> BlendResult<BlendOutput> {
        if let Some(result) = self.ready.take() {
            return result;
        }
        match self.rx.take() {
            Some(rx) => rx.recv().unwrap_or_else(|_| Err(channel_closed())),
            None => Err(channel_closed()),
        }
    }

    /// Poll for completion without blocking. Returns `None` while the job
    /// is still running.
    pub fn try_wait(&mut self) -> Option<BlendResult<BlendOutput>> {
        if let Some(result) = self.ready.take() {
            return Some(result);
        }
        let rx = self.rx.take()?;
        match rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => {
                self.rx = Some(rx);
                None
            }
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(channel_closed())),
        }
    }
}

fn channel_closed() -> BlendError {
    BlendError::Other(anyhow::anyhow!("blend worker dropped its result channel"))
}

static DEFAULT_POOL: OnceLock<BlendPool> = OnceLock::new();

fn default_pool() -> BlendResult<&'static BlendPool> {
    if DEFAULT_POOL.get().is_none() {
        let pool = BlendPool::new(None)?;
        let _ = DEFAULT_POOL.set(pool);
    }
    DEFAULT_POOL
        .get()
        .ok_or_else(|| BlendError::Other(anyhow::anyhow!("default blend pool unavailable")))
}

/// Blend on a shared process-wide pool and block until the job finishes.
pub fn blend(layers: Vec<Layer>, options: &BlendOptions) -> BlendResult<BlendOutput> {
    default_pool()?.submit(layers, options)?.wait()
}
