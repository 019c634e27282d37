//! Worker pool service and its shutdown protocol.

use crate::broker::{Broker, Deliveries, Envelope};
use crate::codec::Codec;
use crate::error::ServiceError;
use crate::job::Job;
use crate::metrics::{FailureStage, PoolMetrics};
use std::any::type_name;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Runs `concurrency` workers over one broker subscription.
///
/// Each worker decodes a delivery, marks it in progress, runs the job,
/// publishes the result if there is one, and acknowledges last. Decode, job
/// and encode failures leave the delivery unacknowledged. A publish failure
/// is logged and the input is still acknowledged.
pub struct Service<B, J, C> {
    concurrency: usize,
    broker: Arc<B>,
    job: Arc<J>,
    codec: Arc<C>,
    metrics: PoolMetrics,
    shutdown: Arc<watch::Sender<bool>>,
    started: AtomicBool,
}

/// Triggers a graceful shutdown of a running [`Service`].
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the service to stop. Calling it more than once has no further effect.
    pub fn stop(&self) {
        if !self.sender.send_replace(true) {
            debug!("Shutdown requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

impl<B: Broker, J: Job, C: Codec> Service<B, J, C> {
    /// Create a service. `concurrency` must be at least one.
    pub fn new(concurrency: usize, broker: B, job: J, codec: C) -> Result<Self, ServiceError> {
        if concurrency == 0 {
            return Err(ServiceError::InvalidConcurrency(concurrency));
        }

        let (shutdown, _) = watch::channel(false);
        let metrics = PoolMetrics::new(job.name());

        Ok(Self {
            concurrency,
            broker: Arc::new(broker),
            job: Arc::new(job),
            codec: Arc::new(codec),
            metrics,
            shutdown: Arc::new(shutdown),
            started: AtomicBool::new(false),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown.clone(),
        }
    }

    /// Run until SIGINT or SIGTERM, or until a [`ShutdownHandle`] stops the pool.
    pub async fn run(&self) -> Result<(), ServiceError> {
        let signals = TerminationSignals::install();
        self.run_until(signals.recv()).await
    }

    /// Run until `signal` completes, or until a [`ShutdownHandle`] stops the pool.
    ///
    /// Only a failed subscription is returned as an error. On shutdown every
    /// worker finishes the message it holds before the broker is shut down.
    pub async fn run_until<F>(&self, signal: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStarted);
        }

        let deliveries = self
            .broker
            .subscribe()
            .await
            .map_err(ServiceError::Subscribe)?;

        info!(
            concurrency = self.concurrency,
            job = self.job.name(),
            codec = self.codec.name(),
            "Starting worker pool"
        );

        let mut workers = JoinSet::new();
        for id in 1..=self.concurrency {
            let worker = Worker {
                id,
                broker: self.broker.clone(),
                job: self.job.clone(),
                codec: self.codec.clone(),
                metrics: self.metrics.clone(),
            };
            workers.spawn(worker.run(deliveries.clone(), self.shutdown.subscribe()));
        }
        drop(deliveries);

        let mut stop = self.shutdown.subscribe();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Termination signal received, shutting down");
                    break;
                }
                _ = wait_for_stop(&mut stop) => {
                    info!("Shutdown requested, stopping workers");
                    break;
                }
                joined = workers.join_next() => match joined {
                    Some(result) => log_worker_exit(result),
                    None => {
                        warn!("All workers exited, shutting down");
                        break;
                    }
                }
            }
        }

        self.shutdown.send_replace(true);
        while let Some(result) = workers.join_next().await {
            log_worker_exit(result);
        }
        info!("All workers stopped");

        self.broker.shutdown().await;
        info!("Worker pool stopped");

        Ok(())
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Worker panicked");
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

struct Worker<B, J, C> {
    id: usize,
    broker: Arc<B>,
    job: Arc<J>,
    codec: Arc<C>,
    metrics: PoolMetrics,
}

impl<B: Broker, J: Job, C: Codec> Worker<B, J, C> {
    async fn run(self, deliveries: Deliveries, mut stop: watch::Receiver<bool>) {
        debug!(worker = self.id, "Worker started");

        loop {
            let envelope = tokio::select! {
                biased;

                _ = wait_for_stop(&mut stop) => break,
                envelope = deliveries.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => {
                        debug!(worker = self.id, "Delivery channel closed");
                        break;
                    }
                },
            };

            self.handle(envelope).await;
        }

        debug!(worker = self.id, "Worker stopped");
    }

    async fn handle(&self, mut envelope: Envelope) {
        let started = Instant::now();
        let message_type = type_name::<J::Input>();
        self.metrics.message_received();

        if envelope.is_redelivery() {
            debug!(
                worker = self.id,
                message_type,
                delivery_count = envelope.delivery_count(),
                "Processing redelivered message"
            );
        }

        let input: J::Input = match self.codec.decode(envelope.payload()) {
            Ok(input) => input,
            Err(e) => {
                warn!(
                    worker = self.id,
                    message_type,
                    codec = self.codec.name(),
                    error = %e,
                    "Failed to decode message"
                );
                self.metrics.message_failed(FailureStage::Decode);
                return;
            }
        };

        if let Err(e) = envelope.in_progress().await {
            debug!(worker = self.id, message_type, error = %e, "Failed to extend ack deadline");
        }

        let output = match self.job.execute(input).await {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    worker = self.id,
                    message_type,
                    job = self.job.name(),
                    error = %e,
                    "Job failed, leaving message for redelivery"
                );
                self.metrics.message_failed(FailureStage::Job);
                return;
            }
        };

        if let Some(output) = output {
            let output_type = type_name::<J::Output>();

            let payload = match self.codec.encode(&output) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        worker = self.id,
                        message_type = output_type,
                        codec = self.codec.name(),
                        error = %e,
                        "Failed to encode result"
                    );
                    self.metrics.message_failed(FailureStage::Encode);
                    return;
                }
            };

            match self.broker.publish(payload).await {
                Ok(()) => self.metrics.result_published(),
                Err(e) => {
                    error!(
                        worker = self.id,
                        message_type = output_type,
                        error = %e,
                        "Failed to publish result, acknowledging input anyway"
                    );
                    self.metrics.publish_failed();
                }
            }
        }

        if let Err(e) = envelope.ack().await {
            warn!(worker = self.id, message_type, error = %e, "Failed to acknowledge message");
            self.metrics.ack_failed();
            return;
        }

        let duration = started.elapsed();
        self.metrics.message_processed(duration);
        debug!(
            worker = self.id,
            message_type,
            duration_ms = duration.as_millis() as u64,
            "Message processed"
        );
    }
}

/// SIGINT and SIGTERM listeners, installed before the subscription starts.
struct TerminationSignals {
    #[cfg(unix)]
    interrupt: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl TerminationSignals {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind: SignalKind, name: &str| match signal(kind) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!(signal = name, error = %e, "Failed to install signal handler");
                None
            }
        };

        Self {
            interrupt: listen(SignalKind::interrupt(), "SIGINT"),
            terminate: listen(SignalKind::terminate(), "SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self {}
    }

    #[cfg(unix)]
    async fn recv(mut self) {
        tokio::select! {
            _ = next_signal(self.interrupt.as_mut()) => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully");
            }
            _ = next_signal(self.terminate.as_mut()) => {
                info!("Received SIGTERM, shutting down gracefully");
            }
        }
    }

    #[cfg(not(unix))]
    async fn recv(self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
async fn next_signal(listener: Option<&mut tokio::signal::unix::Signal>) {
    match listener {
        Some(listener) => {
            if listener.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
