//! Concurrency ceiling for the asset fetcher, measured against an
//! instrumented mock transport.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use refpipe_core::{
    AssetFetcher, AssetStatus, CancelToken, EnrichedRecord, PipelineConfig, RecordStatus,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Records when each request arrived and answers after a fixed delay, so
/// `[start, start + delay]` brackets each transfer's time in flight.
struct TimestampProbe {
    starts: Arc<Mutex<Vec<Instant>>>,
    delay: Duration,
}

impl Respond for TimestampProbe {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.starts.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/pdf")
            .set_body_bytes(vec![0u8; 1024])
            .set_delay(self.delay)
    }
}

/// Maximum number of intervals `[start, start + delay]` alive at once.
fn max_overlap(starts: &[Instant], delay: Duration) -> usize {
    let mut events: Vec<(Instant, i32)> = Vec::with_capacity(starts.len() * 2);
    for &start in starts {
        events.push((start, 1));
        events.push((start + delay, -1));
    }
    events.sort();
    let mut current = 0i32;
    let mut max = 0i32;
    for (_, delta) in events {
        current += delta;
        max = max.max(current);
    }
    usize::try_from(max).unwrap_or(0)
}

fn eligible_record(doi: &str, asset_url: &str) -> EnrichedRecord {
    EnrichedRecord {
        asset_url: Some(asset_url.to_string()),
        license_open: true,
        status: RecordStatus::Enriched,
        ..EnrichedRecord::pending(doi)
    }
}

/// Fifty eligible records against a cap of five: every record downloads,
/// and at no instant are more than five transfers in flight.
#[tokio::test]
async fn download_concurrency_never_exceeds_cap() {
    let server = MockServer::start().await;
    let starts = Arc::new(Mutex::new(Vec::new()));
    let delay = Duration::from_millis(150);
    Mock::given(method("GET"))
        .and(path("/asset.pdf"))
        .respond_with(TimestampProbe {
            starts: Arc::clone(&starts),
            delay,
        })
        .mount(&server)
        .await;

    let download_dir = TempDir::new().unwrap();
    let asset_url = format!("{}/asset.pdf", server.uri());

    let mut records = BTreeMap::new();
    for index in 0..50 {
        records.insert(
            index,
            eligible_record(&format!("10.1000/ref{index}"), &asset_url),
        );
    }

    let config = PipelineConfig {
        download_concurrency: 5,
        ..PipelineConfig::default()
    };
    let fetcher = AssetFetcher::new(&config).unwrap();
    assert_eq!(fetcher.concurrency(), 5);

    let outcomes = fetcher
        .fetch_all(&records, download_dir.path(), &CancelToken::new())
        .await;

    assert_eq!(outcomes.len(), 50);
    assert!(
        outcomes
            .values()
            .all(|outcome| outcome.status == AssetStatus::Downloaded),
        "all downloads should succeed"
    );

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 50);
    let peak = max_overlap(&starts, delay);
    assert!(
        peak <= 5,
        "observed {peak} concurrent transfers, cap is 5"
    );
    // The pool actually runs transfers in parallel rather than serially.
    assert!(peak >= 2, "expected parallel transfers, observed {peak}");
}

/// A cancellation mid-batch stops dispatching new downloads; outcomes for
/// undispatched records are simply absent.
#[tokio::test]
async fn cancellation_stops_new_dispatches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asset.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(vec![0u8; 64])
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let download_dir = TempDir::new().unwrap();
    let asset_url = format!("{}/asset.pdf", server.uri());
    let mut records = BTreeMap::new();
    for index in 0..20 {
        records.insert(
            index,
            eligible_record(&format!("10.1000/c{index}"), &asset_url),
        );
    }

    let config = PipelineConfig {
        download_concurrency: 2,
        ..PipelineConfig::default()
    };
    let fetcher = AssetFetcher::new(&config).unwrap();

    let cancel = CancelToken::with_timeout(Duration::from_millis(80));
    let outcomes = fetcher
        .fetch_all(&records, download_dir.path(), &cancel)
        .await;

    assert!(
        outcomes.len() < 20,
        "expected the batch to stop early, got {} outcomes",
        outcomes.len()
    );
    assert!(
        outcomes
            .values()
            .all(|outcome| outcome.status == AssetStatus::Downloaded),
        "dispatched downloads still complete cleanly"
    );
}
