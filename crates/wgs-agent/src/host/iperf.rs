//! TCP throughput generator
//!
//! A minimal iperf-style workload: the server role counts bytes received on
//! the source address, the client role streams a buffer to the destination.
//! Both log bandwidth every `interval` and stop on their own after `time`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;

use wgs_core::config::{WorkloadConfig, WorkloadProtocol, WorkloadRole};
use wgs_core::error::WorkloadError;
use wgs_core::traits::WorkloadService;

/// Totals of a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadReport {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl WorkloadReport {
    pub fn bits_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.bytes as f64 * 8.0 / secs
        }
    }
}

struct Run {
    cancel: CancellationToken,
    task: JoinHandle<WorkloadReport>,
}

/// [`WorkloadService`] running one TCP workload at a time
#[derive(Default)]
pub struct IperfService {
    current: tokio::sync::Mutex<Option<Run>>,
    last_report: Mutex<Option<WorkloadReport>>,
}

impl IperfService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals of the most recently stopped run
    pub fn last_report(&self) -> Option<WorkloadReport> {
        self.last_report.lock().ok().and_then(|report| *report)
    }
}

#[async_trait]
impl WorkloadService for IperfService {
    async fn start(&self, config: &WorkloadConfig) -> Result<(), WorkloadError> {
        if config.protocol == WorkloadProtocol::Udp {
            return Err(WorkloadError::Unsupported("udp".to_string()));
        }

        let mut current = self.current.lock().await;
        if matches!(current.as_ref(), Some(run) if !run.task.is_finished()) {
            return Err(WorkloadError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task = match config.role {
            WorkloadRole::Server => {
                let listener = TcpListener::bind(config.source()).await?;
                tracing::info!("Workload server listening on {}", config.source());
                tokio::spawn(serve(listener, config.clone(), cancel.clone()))
            }
            WorkloadRole::Client => {
                tracing::info!("Workload client sending to {}", config.destination());
                tokio::spawn(send(config.clone(), cancel.clone()))
            }
        };

        *current = Some(Run { cancel, task });
        Ok(())
    }

    async fn stop(&self) -> Result<(), WorkloadError> {
        let run = self
            .current
            .lock()
            .await
            .take()
            .ok_or(WorkloadError::NotRunning)?;

        run.cancel.cancel();
        let report = run
            .task
            .await
            .map_err(|e| WorkloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        tracing::info!(
            "Workload finished: {} bytes in {:.1} s ({:.2} Mbits/sec)",
            report.bytes,
            report.elapsed.as_secs_f64(),
            report.bits_per_second() / 1_000_000.0
        );
        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report);
        }
        Ok(())
    }
}

/// Periodic bandwidth reporting over a shared byte counter
struct Meter {
    bytes: Arc<AtomicU64>,
    started: Instant,
    last_at: Instant,
    last_bytes: u64,
}

impl Meter {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            bytes: Arc::new(AtomicU64::new(0)),
            started: now,
            last_at: now,
            last_bytes: 0,
        }
    }

    fn report_interval(&mut self) {
        let now = Instant::now();
        let total = self.bytes.load(Ordering::Relaxed);
        let delta = total - self.last_bytes;
        let span = now.duration_since(self.last_at).as_secs_f64();
        let mbits = if span > 0.0 {
            delta as f64 * 8.0 / span / 1_000_000.0
        } else {
            0.0
        };
        tracing::info!(
            "[{:>5.1}-{:>5.1} sec] {:>8} KBytes {:>8.2} Mbits/sec",
            self.last_at.duration_since(self.started).as_secs_f64(),
            now.duration_since(self.started).as_secs_f64(),
            delta / 1024,
            mbits
        );
        self.last_at = now;
        self.last_bytes = total;
    }

    fn finish(&self) -> WorkloadReport {
        WorkloadReport {
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Zero disables periodic reports
fn reporter(interval: Duration) -> Option<Interval> {
    (!interval.is_zero()).then(|| tokio::time::interval_at(Instant::now() + interval, interval))
}

async fn next_report(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Zero runs until stopped
async fn run_limit(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn deadline(config: &WorkloadConfig) -> Option<Instant> {
    (!config.time.is_zero()).then(|| Instant::now() + config.time)
}

async fn serve(listener: TcpListener, config: WorkloadConfig, cancel: CancellationToken) -> WorkloadReport {
    let mut meter = Meter::new();
    let mut ticker = reporter(config.interval);
    let deadline = deadline(&config);
    let connections = cancel.child_token();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = run_limit(deadline) => {
                tracing::debug!("Workload server reached its run time");
                break;
            }
            _ = next_report(&mut ticker) => meter.report_interval(),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("Workload connection from {}", peer);
                    tokio::spawn(drain(
                        stream,
                        peer,
                        config.buffer_len(),
                        Arc::clone(&meter.bytes),
                        connections.clone(),
                    ));
                }
                Err(e) => tracing::warn!("Workload accept failed: {}", e),
            },
        }
    }

    connections.cancel();
    meter.finish()
}

async fn drain(
    mut stream: TcpStream,
    peer: SocketAddr,
    buffer_len: usize,
    bytes: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; buffer_len];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = stream.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                tracing::debug!("Workload connection from {} closed", peer);
                return;
            }
            Ok(n) => {
                bytes.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!("Workload connection from {} failed: {}", peer, e);
                return;
            }
        }
    }
}

async fn send(config: WorkloadConfig, cancel: CancellationToken) -> WorkloadReport {
    let mut meter = Meter::new();
    let destination = config.destination();

    let connected = tokio::select! {
        _ = cancel.cancelled() => return meter.finish(),
        connected = TcpStream::connect(destination) => connected,
    };
    let mut stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Workload connect to {} failed: {}", destination, e);
            return meter.finish();
        }
    };

    let buf = vec![0u8; config.buffer_len()];
    let mut ticker = reporter(config.interval);
    let deadline = deadline(&config);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = run_limit(deadline) => break,
            _ = next_report(&mut ticker) => meter.report_interval(),
            written = stream.write_all(&buf) => match written {
                Ok(()) => {
                    meter.bytes.fetch_add(buf.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!("Workload send to {} failed: {}", destination, e);
                    break;
                }
            },
        }
    }

    if let Err(e) = stream.shutdown().await {
        tracing::debug!("Workload shutdown: {}", e);
    }
    meter.finish()
}
