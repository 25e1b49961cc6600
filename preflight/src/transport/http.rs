//! HTTP transport built on the blocking reqwest client.
//!
//! Single-file fetches and group downloads both run on transport-owned
//! threads and report back through the caller's channel. Group downloads
//! process resources in batches of the configured concurrency; each
//! resource is retried autonomously with every failure reported, so the
//! pipeline core can decide when a resource is abandoned without ever
//! touching the network itself.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::config::BootstrapConfig;
use crate::diff::ResourceUpdateEntry;
use crate::services::{FetchEvent, ResourceStore, TransferEvent, Transport};
use crate::version::crc32;

/// Buffer size for streaming response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Delay between retry attempts for a failing resource.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Aggregate throughput sampled over one-second windows.
struct SpeedMeter {
    window_start: Mutex<Instant>,
    window_bytes: AtomicU64,
    last_rate: AtomicU64,
}

impl SpeedMeter {
    fn new() -> Self {
        Self {
            window_start: Mutex::new(Instant::now()),
            window_bytes: AtomicU64::new(0),
            last_rate: AtomicU64::new(0),
        }
    }

    fn record(&self, bytes: u64) {
        self.window_bytes.fetch_add(bytes, Ordering::Relaxed);
        let mut start = self.window_start.lock().unwrap();
        let elapsed = start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let total = self.window_bytes.swap(0, Ordering::Relaxed);
            let rate = (total as f64 / elapsed.as_secs_f64()) as u64;
            self.last_rate.store(rate, Ordering::Relaxed);
            *start = Instant::now();
        }
    }

    fn rate(&self) -> u64 {
        self.last_rate.load(Ordering::Relaxed)
    }
}

/// HTTP transport collaborator.
///
/// Downloads are verified before they are committed: compressed length and
/// CRC32 first, then the inflated payload against its own expected pair.
/// Only verified payloads reach the resource store.
pub struct HttpTransport {
    client: Client,
    store: Arc<dyn ResourceStore>,
    concurrency: usize,
    retry_budget: u32,
    timeout: Duration,
    speed: Arc<SpeedMeter>,
}

impl HttpTransport {
    /// Create a transport from the bootstrap configuration.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when the TLS backend cannot be
    /// initialized.
    pub fn new(
        config: &BootstrapConfig,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            store,
            concurrency: config.parallel_downloads.max(1),
            retry_budget: config.max_retry_attempts.max(1),
            timeout: config.timeout,
            speed: Arc::new(SpeedMeter::new()),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, events: Sender<FetchEvent>) {
        let client = self.client.clone();
        let url = url.to_string();
        thread::spawn(move || {
            let event = match fetch_bytes(&client, &url) {
                Ok(bytes) => FetchEvent::Completed(bytes),
                Err(reason) => FetchEvent::Failed(reason),
            };
            // The requesting state may have left already.
            let _ = events.send(event);
        });
    }

    fn download_group(
        &self,
        root_url: &str,
        entries: &[ResourceUpdateEntry],
        events: Sender<TransferEvent>,
    ) {
        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        let speed = Arc::clone(&self.speed);
        let root = root_url.trim_end_matches('/').to_string();
        let entries = entries.to_vec();
        let concurrency = self.concurrency;
        let retry_budget = self.retry_budget;

        thread::spawn(move || {
            let failed = Arc::new(AtomicU64::new(0));
            let mut handles = Vec::new();

            for batch in entries.chunks(concurrency) {
                for entry in batch {
                    let client = client.clone();
                    let store = Arc::clone(&store);
                    let speed = Arc::clone(&speed);
                    let events = events.clone();
                    let failed = Arc::clone(&failed);
                    let url = format!("{}/{}", root, entry.name);
                    let entry = entry.clone();

                    handles.push(thread::spawn(move || {
                        if !download_resource(
                            &client,
                            store.as_ref(),
                            &speed,
                            &url,
                            &entry,
                            retry_budget,
                            &events,
                        ) {
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }));
                }
                for handle in handles.drain(..) {
                    let _ = handle.join();
                }
            }

            let succeeded = failed.load(Ordering::SeqCst) == 0;
            let _ = events.send(TransferEvent::GroupComplete { succeeded });
        });
    }

    fn current_speed(&self) -> u64 {
        self.speed.rate()
    }
}

/// Fetch a URL into memory, treating non-success statuses as failures.
fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("request failed with status {}", status));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

/// Download one resource with autonomous retries.
///
/// Returns whether the resource was eventually committed.
fn download_resource(
    client: &Client,
    store: &dyn ResourceStore,
    speed: &SpeedMeter,
    url: &str,
    entry: &ResourceUpdateEntry,
    retry_budget: u32,
    events: &Sender<TransferEvent>,
) -> bool {
    let mut retry_count = 0u32;
    loop {
        let _ = events.send(TransferEvent::Started {
            name: entry.name.clone(),
        });

        match attempt_download(client, store, speed, url, entry, events) {
            Ok(()) => {
                let _ = events.send(TransferEvent::Succeeded {
                    name: entry.name.clone(),
                    compressed_length: entry.compressed_length,
                });
                return true;
            }
            Err(message) => {
                retry_count += 1;
                warn!(
                    name = %entry.name,
                    retry_count,
                    retry_budget,
                    message,
                    "resource download attempt failed"
                );
                let _ = events.send(TransferEvent::Failed {
                    name: entry.name.clone(),
                    retry_count,
                    total_retry_count: retry_budget,
                    message,
                });
                if retry_count >= retry_budget {
                    return false;
                }
                thread::sleep(RETRY_DELAY);
            }
        }
    }
}

/// One download attempt: stream, verify, commit.
fn attempt_download(
    client: &Client,
    store: &dyn ResourceStore,
    speed: &SpeedMeter,
    url: &str,
    entry: &ResourceUpdateEntry,
    events: &Sender<TransferEvent>,
) -> Result<(), String> {
    let mut response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("request failed with status {}", status));
    }

    let mut compressed = Vec::with_capacity(entry.compressed_length as usize);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = response
            .read(&mut buffer)
            .map_err(|e| format!("read error: {}", e))?;
        if read == 0 {
            break;
        }
        compressed.extend_from_slice(&buffer[..read]);
        speed.record(read as u64);
        let _ = events.send(TransferEvent::Progress {
            name: entry.name.clone(),
            bytes: compressed.len() as u64,
        });
    }

    let plain = verify_resource(&compressed, entry)?;
    debug!(name = %entry.name, bytes = plain.len(), "resource verified");

    store
        .commit_resource(&entry.name, &plain, entry.expected_hash)
        .map_err(|e| e.to_string())
}

/// Verify a downloaded payload against the manifest's expectations.
///
/// Checks the compressed length and CRC32, inflates, then checks the
/// uncompressed pair. Returns the inflated bytes on success.
fn verify_resource(compressed: &[u8], entry: &ResourceUpdateEntry) -> Result<Vec<u8>, String> {
    if compressed.len() as u64 != entry.compressed_length {
        return Err(format!(
            "compressed length mismatch: expected {}, got {}",
            entry.compressed_length,
            compressed.len()
        ));
    }
    let actual = crc32(compressed);
    if actual != entry.expected_compressed_hash {
        return Err(format!(
            "compressed hash mismatch: expected {:08x}, got {:08x}",
            entry.expected_compressed_hash, actual
        ));
    }

    let mut plain = Vec::with_capacity(entry.uncompressed_length as usize);
    GzDecoder::new(compressed)
        .read_to_end(&mut plain)
        .map_err(|e| format!("inflate failed: {}", e))?;

    if plain.len() as u64 != entry.uncompressed_length {
        return Err(format!(
            "length mismatch: expected {}, got {}",
            entry.uncompressed_length,
            plain.len()
        ));
    }
    let actual = crc32(&plain);
    if actual != entry.expected_hash {
        return Err(format!(
            "hash mismatch: expected {:08x}, got {:08x}",
            entry.expected_hash, actual
        ));
    }

    Ok(plain)
}
