//! End-to-end batch runs on real PNG/JPEG files.

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_webp::{
    estimate, Candidate, CandidateStatus, CollisionPolicy, ConvertError, EstimationStatus,
    Scheduler, SchedulerOptions, WebpCodec, WebpEncode,
};
use shared_utils::CancellationToken;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn write_png(path: &Path, seed: u8) {
    RgbImage::from_fn(32, 24, |x, y| {
        Rgb([(x as u8).wrapping_mul(7) ^ seed, (y as u8).wrapping_mul(11), seed])
    })
    .save(path)
    .unwrap();
}

fn write_rgba_png(path: &Path) {
    RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 16, y as u8 * 16, 0, 200]))
        .save(path)
        .unwrap();
}

fn write_jpeg(path: &Path) {
    RgbImage::from_fn(32, 32, |x, _| Rgb([x as u8 * 8, 90, 160]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

fn candidates(paths: &[PathBuf]) -> Vec<Candidate> {
    paths.iter().map(|p| Candidate::from_path(p).unwrap()).collect()
}

fn dir_listing(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

fn is_webp(path: &Path) -> bool {
    let bytes = std::fs::read(path).unwrap();
    bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

#[test]
fn test_mixed_batch_converts_supported_and_skips_the_rest() {
    let dir = TempDir::new().unwrap();
    let png = dir.path().join("one.png");
    let jpg = dir.path().join("two.JPG");
    let txt = dir.path().join("notes.txt");
    write_png(&png, 1);
    write_jpeg(&jpg);
    std::fs::write(&txt, "not an image").unwrap();

    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());
    let summary = scheduler
        .run(&candidates(&[png, jpg, txt]), &CancellationToken::new(), |_| {})
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.counts.attempted(), 2);
    assert_eq!(summary.counts.succeeded, 2);
    assert_eq!(summary.counts.skipped, 1);
    assert_eq!(summary.processed, 3);
    assert!(is_webp(&dir.path().join("one.webp")));
    assert!(is_webp(&dir.path().join("two.webp")));
    assert!(!dir.path().join("notes.webp").exists());
    assert_eq!(summary.converted.len(), 2);
    assert_eq!(
        summary.output_bytes,
        summary.converted.iter().map(|c| c.output_size).sum::<u64>()
    );
}

#[test]
fn test_outputs_sit_next_to_inputs() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("assets").join("icons");
    std::fs::create_dir_all(&nested).unwrap();
    let input = nested.join("logo.png");
    write_rgba_png(&input);

    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());
    let summary = scheduler
        .run(&candidates(&[input.clone()]), &CancellationToken::new(), |_| {})
        .unwrap();

    assert_eq!(summary.converted[0].output, nested.join("logo.webp"));
    let expected: BTreeSet<String> = ["logo.png", "logo.webp"].iter().map(|s| s.to_string()).collect();
    assert_eq!(dir_listing(&nested), expected);
    assert!(input.exists(), "source must be kept");
}

#[test]
fn test_selection_over_limit_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..6).map(|i| dir.path().join(format!("img{}.png", i))).collect();
    for (i, p) in paths.iter().enumerate() {
        write_png(p, i as u8);
    }
    let before = dir_listing(dir.path());

    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());
    let err = scheduler
        .run(&candidates(&paths), &CancellationToken::new(), |_| {})
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "You have selected 6 files. The maximum number of files allowed is 5."
    );
    assert_eq!(dir_listing(dir.path()), before);
}

#[test]
fn test_one_corrupt_file_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let mut paths = Vec::new();
    for i in 0..3 {
        let p = dir.path().join(format!("ok{}.png", i));
        write_png(&p, i);
        paths.push(p);
    }
    let bad = dir.path().join("bad.png");
    std::fs::write(&bad, b"\x89PNG\r\n\x1a\n truncated").unwrap();
    paths.insert(1, bad);

    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());
    let summary = scheduler
        .run(&candidates(&paths), &CancellationToken::new(), |_| {})
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.counts.succeeded, 3);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "bad.png");
    assert!(summary.failures[0].line().starts_with("bad.png: Conversion error ("));
    assert!(!dir.path().join("bad.webp").exists());
    assert_eq!(summary.statuses[1], CandidateStatus::Failed);

    let report = &summary.report;
    assert!(!report.success);
    assert!(report.message.contains("- bad.png: Conversion error ("));
    // no temp files left in the destination directory
    assert!(dir_listing(dir.path()).iter().all(|n| !n.ends_with(".tmp")));
}

#[test]
fn test_estimation_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let png = dir.path().join("photo.png");
    let jpg = dir.path().join("photo2.jpeg");
    let txt = dir.path().join("readme.md");
    write_png(&png, 9);
    write_jpeg(&jpg);
    std::fs::write(&txt, "# hi").unwrap();
    let before = dir_listing(dir.path());

    let calls = AtomicUsize::new(0);
    let records = estimate(&WebpCodec::new(), &candidates(&[png, jpg, txt]), None, |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    assert_eq!(dir_listing(dir.path()), before);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(records[0].status, EstimationStatus::Estimated);
    assert!(records[0].estimated_size.unwrap() > 0);
    assert!(records[0].reduction_percent.is_some());
    assert_eq!(records[1].status, EstimationStatus::Estimated);
    assert_eq!(records[2].status, EstimationStatus::Unsupported);
    assert_eq!(records[2].reduction_cell(), "N/A");
}

#[test]
fn test_estimate_matches_converted_size() {
    let dir = TempDir::new().unwrap();
    let png = dir.path().join("same.png");
    write_png(&png, 3);
    let batch = candidates(&[png]);

    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());
    let records = scheduler.estimate(&batch, |_, _| {}).unwrap();
    let summary = scheduler.run(&batch, &CancellationToken::new(), |_| {}).unwrap();

    assert_eq!(records[0].estimated_size, Some(summary.converted[0].output_size));
}

/// Converts normally but cancels the batch while handling its `after`-th file.
struct CancellingCodec {
    inner: WebpCodec,
    calls: AtomicUsize,
    after: usize,
    token: CancellationToken,
}

impl WebpEncode for CancellingCodec {
    fn encode(&self, input: &Path) -> img_webp::Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.token.cancel();
        }
        self.inner.encode(input)
    }
}

#[test]
fn test_cancellation_keeps_finished_work_and_starts_nothing_new() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..5).map(|i| dir.path().join(format!("c{}.png", i))).collect();
    for (i, p) in paths.iter().enumerate() {
        write_png(p, i as u8);
    }

    let token = CancellationToken::new();
    let codec = CancellingCodec {
        inner: WebpCodec::new(),
        calls: AtomicUsize::new(0),
        after: 2,
        token: token.clone(),
    };
    let scheduler = Scheduler::new(codec, SchedulerOptions::default().with_pool_size(1));
    let summary = scheduler.run(&candidates(&paths), &token, |_| {}).unwrap();

    assert!(summary.cancelled);
    assert!(!summary.completed);
    assert_eq!(summary.processed, 2);
    let written = dir_listing(dir.path())
        .into_iter()
        .filter(|n| n.ends_with(".webp"))
        .count();
    assert_eq!(written, 2);
    assert!(matches!(
        summary.ensure_complete(),
        Err(ConvertError::Interrupted { processed: 2, total: 5 })
    ));
}

#[test]
fn test_background_batch_reports_progress_in_order() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..5).map(|i| dir.path().join(format!("p{}.png", i))).collect();
    for (i, p) in paths.iter().enumerate() {
        write_png(p, i as u8 + 40);
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let scheduler = Arc::new(Scheduler::with_webp_codec(SchedulerOptions::default()));
    let handle = scheduler
        .spawn(candidates(&paths), CancellationToken::new(), move |snap| {
            sink.lock().unwrap().push(snap.text.clone());
        })
        .unwrap();
    let summary = handle.join().unwrap();

    assert!(summary.completed);
    assert_eq!(summary.processed, summary.total);
    let seen = seen.lock().unwrap().clone();
    let expected: Vec<String> = (1..=5).map(|i| format!("Processed files: {} of 5", i)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_existing_output_policies() {
    let dir = TempDir::new().unwrap();
    let png = dir.path().join("pic.png");
    let jpg = dir.path().join("pic.jpg");
    write_png(&png, 5);
    write_jpeg(&jpg);
    std::fs::write(dir.path().join("pic.webp"), b"previous").unwrap();
    let batch = candidates(&[png, jpg]);

    let skip = Scheduler::with_webp_codec(
        SchedulerOptions::default().with_collision(CollisionPolicy::Skip),
    );
    let summary = skip.run(&batch, &CancellationToken::new(), |_| {}).unwrap();
    assert_eq!(summary.counts.skipped, 2);
    assert_eq!(std::fs::read(dir.path().join("pic.webp")).unwrap(), b"previous");

    let rename = Scheduler::with_webp_codec(
        SchedulerOptions::default().with_collision(CollisionPolicy::Rename),
    );
    let summary = rename.run(&batch, &CancellationToken::new(), |_| {}).unwrap();
    assert_eq!(summary.counts.succeeded, 2);
    assert!(is_webp(&dir.path().join("pic-1.webp")));
    assert!(is_webp(&dir.path().join("pic-2.webp")));
    assert_eq!(std::fs::read(dir.path().join("pic.webp")).unwrap(), b"previous");

    let overwrite = Scheduler::with_webp_codec(
        SchedulerOptions::default().with_pool_size(1),
    );
    let summary = overwrite
        .run(&batch[..1], &CancellationToken::new(), |_| {})
        .unwrap();
    assert_eq!(summary.counts.succeeded, 1);
    assert!(is_webp(&dir.path().join("pic.webp")));
}

#[test]
fn test_missing_file_fails_alone() {
    let dir = TempDir::new().unwrap();
    let ok = dir.path().join("ok.png");
    let gone = dir.path().join("gone.png");
    write_png(&ok, 12);

    let batch: Vec<Candidate> = [&ok, &gone].iter().map(|p| Candidate::discover(*p)).collect();
    let scheduler = Scheduler::with_webp_codec(SchedulerOptions::default());

    let records = scheduler.estimate(&batch, |_, _| {}).unwrap();
    assert_eq!(records[0].status, EstimationStatus::Estimated);
    assert!(matches!(records[1].status, EstimationStatus::Error(_)));

    let summary = scheduler.run(&batch, &CancellationToken::new(), |_| {}).unwrap();
    assert!(summary.completed);
    assert_eq!(summary.counts.succeeded, 1);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.failures[0].name, "gone.png");
    assert!(summary.failures[0].reason.starts_with("Conversion error (IO error"));
    assert!(is_webp(&dir.path().join("ok.webp")));
    assert!(!dir.path().join("gone.webp").exists());
}
