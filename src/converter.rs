use crate::osm::{Document, RawElement};
use crate::shaper::shape_element;
use anyhow::{Context, Result};
use log::{debug, info};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const PROGRESS_INTERVAL: usize = 100_000;

/// Result of writing a JSON-lines file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub output_path: PathBuf,
    pub documents_written: usize,
}

/// `<input>.json` next to the input file.
pub fn output_path_for(input_path: &Path) -> PathBuf {
    let mut path = OsString::from(input_path.as_os_str());
    path.push(".json");
    PathBuf::from(path)
}

/// Lazily shape every top-level node, way and relation of an OSM XML file.
pub fn shape_elements(input_path: &Path) -> Result<ShapedElements<BufReader<File>>> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open OSM XML file: {}", input_path.display()))?;
    Ok(ShapedElements::from_reader(BufReader::new(file)))
}

/// Convert an OSM XML file into `<input>.json`, one shaped document per line.
///
/// The file is written as it is read; nothing is kept in memory beyond the
/// element currently being built. Use [`shape_elements`] to consume the
/// documents directly instead.
pub fn process_map(input_path: &Path, pretty_print: bool) -> Result<ConvertSummary> {
    let output_path = output_path_for(input_path);
    info!(
        "Converting {} -> {}",
        input_path.display(),
        output_path.display()
    );

    let elements = shape_elements(input_path)?;
    let file = File::create(&output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let documents_written = write_json_lines(elements, &mut writer, pretty_print)?;
    writer.flush()?;

    info!(
        "Conversion complete. Total documents: {}",
        documents_written
    );
    Ok(ConvertSummary {
        output_path,
        documents_written,
    })
}

/// Serialize every shaped document to `writer`, one per line.
pub fn write_json_lines<I, W>(elements: I, writer: &mut W, pretty_print: bool) -> Result<usize>
where
    I: IntoIterator<Item = Result<Document>>,
    W: Write,
{
    let mut count = 0usize;
    for doc in elements {
        let doc = doc?;
        let line = if pretty_print {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        writeln!(writer, "{}", line)?;
        count += 1;

        if count % PROGRESS_INTERVAL == 0 {
            info!("Streamed {} documents", count);
            if let Some(memory_usage) = get_memory_usage_mb() {
                debug!("Current memory usage: {} MB", memory_usage);
            }
        }
    }
    Ok(count)
}

/// Streaming iterator over shaped documents.
///
/// Only the subtree of the open top-level element is held in memory; it is
/// dropped as soon as the element is shaped. The first error ends iteration.
pub struct ShapedElements<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    open: Vec<RawElement>,
    finished: bool,
}

enum Step {
    Continue,
    Complete(RawElement),
    Eof,
}

impl<R: BufRead> ShapedElements<R> {
    pub fn from_reader(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);
        ShapedElements {
            reader,
            buf: Vec::new(),
            open: Vec::new(),
            finished: false,
        }
    }

    fn next_complete_element(&mut self) -> Result<Option<RawElement>> {
        loop {
            let position = self.reader.buffer_position();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| format!("Malformed XML near byte {}", position))?;

            let step = match event {
                Event::Start(e) => {
                    let element = raw_element(&e)?;
                    if !self.open.is_empty() || is_top_level(&element) {
                        self.open.push(element);
                    }
                    Step::Continue
                }
                Event::Empty(e) => {
                    let element = raw_element(&e)?;
                    match self.open.last_mut() {
                        Some(parent) => {
                            parent.children.push(element);
                            Step::Continue
                        }
                        None if is_top_level(&element) => Step::Complete(element),
                        None => Step::Continue,
                    }
                }
                Event::End(_) => match self.open.pop() {
                    Some(element) => match self.open.last_mut() {
                        Some(parent) => {
                            parent.children.push(element);
                            Step::Continue
                        }
                        None => Step::Complete(element),
                    },
                    None => Step::Continue,
                },
                Event::Eof => Step::Eof,
                _ => Step::Continue,
            };
            self.buf.clear();

            match step {
                Step::Continue => {}
                Step::Complete(element) => return Ok(Some(element)),
                Step::Eof => {
                    if let Some(unclosed) = self.open.first() {
                        anyhow::bail!(
                            "Unexpected end of file inside <{}> {}",
                            unclosed.name,
                            unclosed.attr("id").unwrap_or("?")
                        );
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for ShapedElements<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let outcome = self.next_complete_element().and_then(|element| {
            element
                .map(|element| shape_element(&element).map_err(anyhow::Error::from))
                .transpose()
        });
        match outcome {
            // Top-level elements are always node/way/relation, so shaping
            // never reports "not applicable" here.
            Ok(Some(Some(doc))) => Some(Ok(doc)),
            Ok(Some(None)) | Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn is_top_level(element: &RawElement) -> bool {
    element.kind().is_some()
}

fn raw_element(start: &BytesStart<'_>) -> Result<RawElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .context("Element name is not valid UTF-8")?
        .to_string();
    let mut element = RawElement::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("Attribute name is not valid UTF-8")?
            .to_string();
        let value = attr.unescape_value()?.to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn get_memory_usage_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        use std::fs;
        let contents = fs::read_to_string("/proc/self/status").ok()?;
        for line in contents.lines() {
            if line.starts_with("VmRSS:") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 {
                    return parts[1].parse::<u64>().ok().map(|kb| kb / 1024);
                }
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
