use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use url::Url;

use crate::error::TransferError;
use crate::events::EventSink;
use crate::fingerprint::{fingerprint_file, HashDepth};
use crate::index::FingerprintIndex;
use crate::scanner::Scanner;
use crate::utils::{ensure_dir_exists, sanitize_file_name, short_name, truncate_message};

/// Extensions a page link must end in to count as a download candidate.
const CANDIDATE_EXTENSIONS: [&str; 4] = ["mp3", "m4a", "wav", "aac"];

/// Suffix for provisional files awaiting duplicate verification.
const PROVISIONAL_SUFFIX: &str = ".tmp";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One audio link discovered on the source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub display_name: String,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    /// The destination filename was already on disk; no fetch happened.
    SkippedExisting,
    /// Fetched content matched the file at the carried path.
    SkippedDuplicate(PathBuf),
    /// Bytes arrived but failed verification (size mismatch, empty body).
    FailedIntegrity,
    FailedTransfer,
}

/// Aggregate result of one download session.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub total_candidates: usize,
    pub skipped_duplicates: usize,
    pub outcomes: Vec<(Candidate, DownloadOutcome)>,
}

/// A fetched HTTP response, reduced to what the pipeline verifies.
pub struct FetchedBody {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

/// The web collaborator: raw page text and candidate bytes.
pub trait Fetcher {
    fn fetch_page(&self, url: &str) -> Result<String, TransferError>;
    fn fetch_bytes(&self, url: &str) -> Result<FetchedBody, TransferError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch_page(&self, url: &str) -> Result<String, TransferError> {
        (**self).fetch_page(url)
    }

    fn fetch_bytes(&self, url: &str) -> Result<FetchedBody, TransferError> {
        (**self).fetch_bytes(url)
    }
}

/// Production fetcher over a blocking HTTP client with a 30 second timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, TransferError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| TransferError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, TransferError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransferError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransferError::Status(response.status().as_u16()));
        }
        response
            .text()
            .map_err(|e| TransferError::Request(e.to_string()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<FetchedBody, TransferError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransferError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response
            .bytes()
            .map_err(|e| TransferError::Request(e.to_string()))?
            .to_vec();
        Ok(FetchedBody {
            status,
            content_length,
            body,
        })
    }
}

/// Parameters for one download session.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub source_url: String,
    pub dest_dir: PathBuf,
    /// Library tree whose fingerprints seed the session index, so already
    /// owned tracks are skipped without being re-fetched.
    pub existing_dir: Option<PathBuf>,
    pub depth: HashDepth,
}

/// Runs the download-and-verify pipeline for one session.
///
/// Candidates are processed strictly in page order, one at a time. A
/// committed download's fingerprint enters the session index immediately,
/// so a later candidate on the same page with identical content is caught.
pub struct Downloader<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> Downloader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Run the session to completion. Per-candidate failures are recovered
    /// and reported; only setup failures (destination folder, page fetch)
    /// end the session early.
    pub fn run(&self, options: &DownloadOptions, events: &EventSink) -> Result<DownloadReport> {
        ensure_dir_exists(&options.dest_dir)?;
        events.emit(format!(
            "Download folder ready: {}",
            options.dest_dir.display()
        ));

        let mut index = FingerprintIndex::new();
        if let Some(existing) = &options.existing_dir {
            if existing.is_dir() {
                events.emit(format!("Scanning existing files in: {}", existing.display()));
                let seeded =
                    Scanner::with_depth(options.depth).build_index(existing, &mut index, events);
                events.emit(format!(
                    "Found {seeded} existing audio files to check against"
                ));
            }
        }

        events.emit(format!("Fetching page: {}", options.source_url));
        let page = self
            .fetcher
            .fetch_page(&options.source_url)
            .with_context(|| format!("failed to fetch page {}", options.source_url))?;
        let candidates = extract_candidates(&page, &options.source_url)?;
        events.emit(format!("Found {} audio files to download", candidates.len()));

        let mut report = DownloadReport {
            total_candidates: candidates.len(),
            ..Default::default()
        };

        for (i, candidate) in candidates.iter().enumerate() {
            events.emit(format!(
                "Processing {}/{}: {}",
                i + 1,
                candidates.len(),
                truncate_message(&candidate.display_name, 50)
            ));
            let outcome = self.process_candidate(candidate, options, &mut index, events);
            match &outcome {
                DownloadOutcome::Downloaded => report.downloaded += 1,
                DownloadOutcome::SkippedDuplicate(_) => report.skipped_duplicates += 1,
                _ => {}
            }
            report.outcomes.push((candidate.clone(), outcome));
        }

        events.emit(format!(
            "Download complete: {} downloaded, {} duplicates skipped",
            report.downloaded, report.skipped_duplicates
        ));
        Ok(report)
    }

    fn process_candidate(
        &self,
        candidate: &Candidate,
        options: &DownloadOptions,
        index: &mut FingerprintIndex,
        events: &EventSink,
    ) -> DownloadOutcome {
        let destination = destination_path(&options.dest_dir, candidate);

        if destination.exists() {
            events.emit(format!("File already exists: {}", candidate.display_name));
            return DownloadOutcome::SkippedExisting;
        }

        let fetched = match self.fetcher.fetch_bytes(&candidate.url) {
            Ok(fetched) => fetched,
            Err(err) => {
                events.emit(format!(
                    "Error downloading {}: {}",
                    candidate.display_name,
                    truncate_message(&err.to_string(), 50)
                ));
                return DownloadOutcome::FailedTransfer;
            }
        };

        if let Err(err) = verify_body(&fetched) {
            events.emit(transfer_event(&err, candidate));
            return if err.is_integrity() {
                DownloadOutcome::FailedIntegrity
            } else {
                DownloadOutcome::FailedTransfer
            };
        }

        let provisional = provisional_path(&destination);
        match self.verify_and_commit(
            &fetched.body,
            &provisional,
            &destination,
            options.depth,
            index,
            candidate,
            events,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                // A failed candidate must never leave a provisional file.
                let _ = fs::remove_file(&provisional);
                events.emit(format!(
                    "Error downloading {}: {}",
                    candidate.display_name,
                    truncate_message(&format!("{err:#}"), 50)
                ));
                DownloadOutcome::FailedTransfer
            }
        }
    }

    /// Save to the provisional path, fingerprint on disk with the same
    /// function the index uses, then either discard as a duplicate or
    /// atomically rename into place and index the new file.
    #[allow(clippy::too_many_arguments)]
    fn verify_and_commit(
        &self,
        body: &[u8],
        provisional: &Path,
        destination: &Path,
        depth: HashDepth,
        index: &mut FingerprintIndex,
        candidate: &Candidate,
        events: &EventSink,
    ) -> Result<DownloadOutcome> {
        fs::write(provisional, body)
            .with_context(|| format!("failed to write {}", provisional.display()))?;

        let fingerprint = fingerprint_file(provisional, depth)?;
        if let Some(existing) = index.get(&fingerprint) {
            let existing = existing.to_path_buf();
            fs::remove_file(provisional)
                .with_context(|| format!("failed to remove {}", provisional.display()))?;
            events.emit(format!(
                "Duplicate found: {} matches {}",
                candidate.display_name,
                short_name(&existing)
            ));
            return Ok(DownloadOutcome::SkippedDuplicate(existing));
        }

        fs::rename(provisional, destination).with_context(|| {
            format!(
                "failed to rename {} to {}",
                provisional.display(),
                destination.display()
            )
        })?;
        index.insert(fingerprint, destination.to_path_buf());
        events.emit(format!(
            "Downloaded: {} ({} bytes)",
            candidate.display_name,
            body.len()
        ));
        Ok(DownloadOutcome::Downloaded)
    }
}

/// Pull every `<a href>` whose URL path ends in a candidate extension,
/// resolving relative links against the page URL. The display name is the
/// trimmed link text.
pub fn extract_candidates(page_html: &str, base_url: &str) -> Result<Vec<Candidate>> {
    let base =
        Url::parse(base_url).with_context(|| format!("invalid source URL: {base_url}"))?;
    let document = Html::parse_document(page_html);
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut candidates = Vec::new();
    for element in document.select(&anchors) {
        let href = match element.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let resolved = match base.join(href) {
            Ok(resolved) => resolved,
            Err(_) => continue,
        };
        if !has_candidate_extension(resolved.path()) {
            continue;
        }
        let display_name = element.text().collect::<String>().trim().to_string();
        candidates.push(Candidate {
            url: resolved.to_string(),
            display_name,
        });
    }
    Ok(candidates)
}

fn has_candidate_extension(url_path: &str) -> bool {
    let lower = url_path.to_lowercase();
    CANDIDATE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

fn verify_body(fetched: &FetchedBody) -> Result<(), TransferError> {
    if !(200..300).contains(&fetched.status) {
        return Err(TransferError::Status(fetched.status));
    }
    if let Some(expected) = fetched.content_length {
        let actual = fetched.body.len() as u64;
        if actual != expected {
            return Err(TransferError::SizeMismatch { expected, actual });
        }
    }
    if fetched.body.is_empty() {
        return Err(TransferError::EmptyBody);
    }
    Ok(())
}

fn transfer_event(err: &TransferError, candidate: &Candidate) -> String {
    match err {
        TransferError::Status(code) => {
            format!("Failed: HTTP {code} for {}", candidate.display_name)
        }
        TransferError::SizeMismatch { .. } => {
            format!("Corrupted: {} (size mismatch)", candidate.display_name)
        }
        TransferError::EmptyBody => format!("Empty file: {}", candidate.display_name),
        TransferError::Request(reason) => format!(
            "Error downloading {}: {}",
            candidate.display_name,
            truncate_message(reason, 50)
        ),
    }
}

/// Destination filename: sanitized display text plus the candidate URL's
/// original extension.
fn destination_path(dest_dir: &Path, candidate: &Candidate) -> PathBuf {
    let safe = sanitize_file_name(&candidate.display_name);
    match url_extension(&candidate.url) {
        Some(ext) => dest_dir.join(format!("{safe}.{ext}")),
        None => dest_dir.join(safe),
    }
}

fn url_extension(url: &str) -> Option<String> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_string())
}

fn provisional_path(destination: &Path) -> PathBuf {
    let mut raw = destination.as_os_str().to_owned();
    raw.push(PROVISIONAL_SUFFIX);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    struct FakeFetcher {
        page: String,
        files: HashMap<String, (u16, Option<u64>, Vec<u8>)>,
        fetch_log: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(page: &str) -> Self {
            Self {
                page: page.to_string(),
                files: HashMap::new(),
                fetch_log: RefCell::new(Vec::new()),
            }
        }

        fn serve(mut self, url: &str, status: u16, length: Option<u64>, body: &[u8]) -> Self {
            self.files
                .insert(url.to_string(), (status, length, body.to_vec()));
            self
        }

        fn fetched_urls(&self) -> Vec<String> {
            self.fetch_log.borrow().clone()
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch_page(&self, _url: &str) -> Result<String, TransferError> {
            Ok(self.page.clone())
        }

        fn fetch_bytes(&self, url: &str) -> Result<FetchedBody, TransferError> {
            self.fetch_log.borrow_mut().push(url.to_string());
            match self.files.get(url) {
                Some((status, content_length, body)) => Ok(FetchedBody {
                    status: *status,
                    content_length: *content_length,
                    body: body.clone(),
                }),
                None => Err(TransferError::Request("connection refused".to_string())),
            }
        }
    }

    const BASE: &str = "https://example.com/music/";

    fn options(dest: &Path) -> DownloadOptions {
        DownloadOptions {
            source_url: BASE.to_string(),
            dest_dir: dest.to_path_buf(),
            existing_dir: None,
            depth: HashDepth::HeadTail,
        }
    }

    fn outcome_for<'a>(
        report: &'a DownloadReport,
        display_name: &str,
    ) -> &'a DownloadOutcome {
        &report
            .outcomes
            .iter()
            .find(|(c, _)| c.display_name == display_name)
            .unwrap()
            .1
    }

    #[test]
    fn extracts_audio_links_and_resolves_relative_urls() {
        let page = r#"
            <html><body>
            <a href="one.mp3">Track One</a>
            <a href="/abs/two.M4A">Track Two</a>
            <a href="https://cdn.example.net/three.wav?ver=2">Track Three</a>
            <a href="cover.jpg">Artwork</a>
            <a href="page.html">More</a>
            </body></html>
        "#;
        let candidates = extract_candidates(page, BASE).unwrap();

        assert_eq!(
            candidates,
            vec![
                Candidate {
                    url: "https://example.com/music/one.mp3".to_string(),
                    display_name: "Track One".to_string(),
                },
                Candidate {
                    url: "https://example.com/abs/two.M4A".to_string(),
                    display_name: "Track Two".to_string(),
                },
                Candidate {
                    url: "https://cdn.example.net/three.wav?ver=2".to_string(),
                    display_name: "Track Three".to_string(),
                },
            ]
        );
    }

    #[test]
    fn downloads_new_content_and_skips_same_page_duplicates() {
        let page = r#"
            <a href="one.mp3">First Take</a>
            <a href="copy/one_again.mp3">Second Take</a>
        "#;
        let fetcher = FakeFetcher::new(page)
            .serve(
                "https://example.com/music/one.mp3",
                200,
                Some(9),
                b"dupe body",
            )
            .serve(
                "https://example.com/music/copy/one_again.mp3",
                200,
                Some(9),
                b"dupe body",
            );
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(report.total_candidates, 2);
        assert_eq!(*outcome_for(&report, "First Take"), DownloadOutcome::Downloaded);
        assert_eq!(
            *outcome_for(&report, "Second Take"),
            DownloadOutcome::SkippedDuplicate(dest.path().join("First Take.mp3"))
        );
        assert!(dest.path().join("First Take.mp3").exists());
        assert!(!dest.path().join("Second Take.mp3").exists());
    }

    #[test]
    fn existing_destination_file_is_never_fetched() {
        let page = r#"<a href="one.mp3">Track One</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/one.mp3",
            200,
            Some(5),
            b"bytes",
        );
        let dest = tempdir().unwrap();
        fs::write(dest.path().join("Track One.mp3"), b"already here").unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(
            *outcome_for(&report, "Track One"),
            DownloadOutcome::SkippedExisting
        );
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped_duplicates, 0);
        assert!(fetcher.fetched_urls().is_empty());
    }

    #[test]
    fn http_error_leaves_no_file_behind() {
        let page = r#"<a href="one.mp3">Track One</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/one.mp3",
            500,
            None,
            b"server error page",
        );
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(
            *outcome_for(&report, "Track One"),
            DownloadOutcome::FailedTransfer
        );
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn short_body_fails_integrity_and_leaves_no_file() {
        let page = r#"<a href="one.mp3">Track One</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/one.mp3",
            200,
            Some(1000),
            b"only a few bytes",
        );
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(
            *outcome_for(&report, "Track One"),
            DownloadOutcome::FailedIntegrity
        );
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_body_fails_integrity() {
        let page = r#"<a href="one.mp3">Track One</a>"#;
        let fetcher =
            FakeFetcher::new(page).serve("https://example.com/music/one.mp3", 200, None, b"");
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(
            *outcome_for(&report, "Track One"),
            DownloadOutcome::FailedIntegrity
        );
    }

    #[test]
    fn unreachable_candidate_is_a_transfer_failure_not_fatal() {
        let page = r#"
            <a href="gone.mp3">Missing</a>
            <a href="fine.mp3">Fine</a>
        "#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/fine.mp3",
            200,
            Some(4),
            b"good",
        );
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(
            *outcome_for(&report, "Missing"),
            DownloadOutcome::FailedTransfer
        );
        assert_eq!(*outcome_for(&report, "Fine"), DownloadOutcome::Downloaded);
        assert_eq!(report.downloaded, 1);
    }

    #[test]
    fn existing_library_seeds_duplicate_detection() {
        let existing = tempdir().unwrap();
        let owned = existing.path().join("owned_track.mp3");
        fs::write(&owned, b"library bytes").unwrap();

        let page = r#"<a href="new.mp3">Shiny New Upload</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/new.mp3",
            200,
            None,
            b"library bytes",
        );
        let dest = tempdir().unwrap();
        let mut options = options(dest.path());
        options.existing_dir = Some(existing.path().to_path_buf());

        let report = Downloader::new(&fetcher)
            .run(&options, &EventSink::disabled())
            .unwrap();

        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(
            *outcome_for(&report, "Shiny New Upload"),
            DownloadOutcome::SkippedDuplicate(owned)
        );
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn unsafe_display_names_are_sanitized_in_destination() {
        let page = r#"<a href="one.mp3">AC/DC: Live?</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/one.mp3",
            200,
            None,
            b"riffs",
        );
        let dest = tempdir().unwrap();

        let report = Downloader::new(&fetcher)
            .run(&options(dest.path()), &EventSink::disabled())
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert!(dest.path().join("AC_DC_ Live_.mp3").exists());
    }

    #[test]
    fn session_events_end_with_a_summary() {
        let page = r#"<a href="one.mp3">Track One</a>"#;
        let fetcher = FakeFetcher::new(page).serve(
            "https://example.com/music/one.mp3",
            200,
            None,
            b"bytes",
        );
        let dest = tempdir().unwrap();

        let (sink, rx) = EventSink::channel();
        Downloader::new(&fetcher)
            .run(&options(dest.path()), &sink)
            .unwrap();
        drop(sink);

        let messages: Vec<String> = rx.iter().collect();
        assert!(messages
            .last()
            .unwrap()
            .starts_with("Download complete: 1 downloaded"));
    }
}
