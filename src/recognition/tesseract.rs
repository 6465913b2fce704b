//! Recognition backed by the `tesseract` command-line tool in TSV mode.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat};

use super::{RecognitionError, TextRecognizer};
use crate::models::{Detection, Quad};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// TSV row level for a single word.
const WORD_LEVEL: u32 = 5;
/// Fully automatic page segmentation.
const PAGE_SEGMENTATION_MODE: &str = "3";
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    /// Checks that the binary runs and that the language pack is installed.
    /// A recognition run still going after `timeout` is killed.
    pub fn load(
        binary: impl Into<PathBuf>,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let binary = binary.into();
        let language = tesseract_language(language);

        let version = Command::new(&binary)
            .arg("--version")
            .output()
            .map_err(|err| {
                RecognitionError::Unavailable(format!(
                    "cannot run {}: {err}",
                    binary.display()
                ))
            })?;
        let banner = String::from_utf8_lossy(&version.stdout);
        log_info!(
            "found {}",
            banner.lines().next().unwrap_or("tesseract (unknown version)")
        );

        let listing = Command::new(&binary)
            .arg("--list-langs")
            .output()
            .map_err(|err| RecognitionError::Unavailable(format!("cannot list languages: {err}")))?;
        let installed = parse_language_list(&String::from_utf8_lossy(&listing.stdout));
        if !installed.iter().any(|lang| lang == &language) {
            return Err(RecognitionError::Unavailable(format!(
                "language pack '{language}' is not installed"
            )));
        }

        Ok(Self {
            binary,
            language,
            timeout,
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl TextRecognizer for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>, RecognitionError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|err| RecognitionError::Engine(format!("png encode failed: {err}")))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language])
            .args(["--psm", PAGE_SEGMENTATION_MODE, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| RecognitionError::Engine(format!("spawn failed: {err}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError::Engine("stdin unavailable".into()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = wait_with_deadline(child, self.timeout)?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(RecognitionError::Engine(format!("write failed: {err}"))),
            Err(_) => return Err(RecognitionError::Engine("stdin writer panicked".into())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let detections = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        log_debug!("tesseract returned {} line(s)", detections.len());
        Ok(detections)
    }
}

/// Like `Child::wait_with_output`, but kills the process once `timeout`
/// has passed.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> Result<Output, RecognitionError> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log_warn!("tesseract killed after {}ms", timeout.as_millis());
                return Err(RecognitionError::Engine(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )));
            }
            Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
            Err(err) => {
                let _ = child.kill();
                return Err(RecognitionError::Engine(format!("wait failed: {err}")));
            }
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout, "stdout")?,
        stderr: collect(stderr, "stderr")?,
    })
}

/// Reads a child pipe to the end on its own thread so a full pipe never
/// stalls the child.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, RecognitionError> {
    match reader.join() {
        Ok(Ok(buffer)) => Ok(buffer),
        Ok(Err(err)) => Err(RecognitionError::Engine(format!("{name} read failed: {err}"))),
        Err(_) => Err(RecognitionError::Engine(format!("{name} reader panicked"))),
    }
}

/// Maps two-letter codes to tesseract pack names; anything else passes through.
pub fn tesseract_language(code: &str) -> String {
    let code = code.trim();
    match code {
        "en" => "eng",
        "fr" => "fra",
        "de" => "deu",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        other => other,
    }
    .to_string()
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| line.starts_with("List of"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct LineAccumulator {
    words: Vec<String>,
    confidence_sum: f32,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl LineAccumulator {
    fn push(&mut self, word: &str, confidence: f32, left: f32, top: f32, width: f32, height: f32) {
        if self.words.is_empty() {
            self.left = left;
            self.top = top;
            self.right = left + width;
            self.bottom = top + height;
        } else {
            self.left = self.left.min(left);
            self.top = self.top.min(top);
            self.right = self.right.max(left + width);
            self.bottom = self.bottom.max(top + height);
        }
        self.words.push(word.to_string());
        self.confidence_sum += confidence;
    }

    fn finish(self) -> Detection {
        let confidence = self.confidence_sum / self.words.len() as f32 / 100.0;
        Detection {
            text: self.words.join(" "),
            confidence: confidence.clamp(0.0, 1.0),
            bounding_box: Quad::from_rect(
                self.left,
                self.top,
                self.right - self.left,
                self.bottom - self.top,
            ),
        }
    }
}

/// Groups word rows of tesseract TSV output into one detection per text line,
/// in the order lines first appear.
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf, text. Rows with negative confidence or blank text are layout-only.
pub fn parse_tsv(tsv: &str) -> Vec<Detection> {
    let mut order: Vec<(u32, u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32, u32), LineAccumulator> = HashMap::new();

    for row in tsv.lines().skip(1) {
        let columns: Vec<&str> = row.splitn(12, '\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let ints: Vec<u32> = columns[..10]
            .iter()
            .filter_map(|value| value.trim().parse().ok())
            .collect();
        if ints.len() != 10 || ints[0] != WORD_LEVEL {
            continue;
        }
        let Ok(confidence) = columns[10].trim().parse::<f32>() else {
            continue;
        };
        let text = columns[11].trim();
        if confidence < 0.0 || text.is_empty() {
            continue;
        }

        let key = (ints[1], ints[2], ints[3], ints[4]);
        let line = lines.entry(key).or_insert_with(|| {
            order.push(key);
            LineAccumulator::default()
        });
        line.push(
            text,
            confidence,
            ints[6] as f32,
            ints[7] as f32,
            ints[8] as f32,
            ints[9] as f32,
        );
    }

    order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .map(LineAccumulator::finish)
        .collect()
}
