//! Format-specific text extraction.
//!
//! PDF text comes from `pdf-extract`, Office formats are unzipped and their
//! XML payloads read with `quick-xml`, workbooks go through `calamine`, and
//! raster images are delegated to the [`OcrEngine`] capability. Extraction
//! never interprets content; it only recovers ordered text segments with
//! source metadata.

use std::io::{Cursor, Read};

use url::Url;

use super::fetch::DocumentFormat;
use crate::providers::OcrEngine;
use crate::types::{RagError, Segment, SegmentMetadata};

/// Sentinel emitted for slide decks with no extractable text or images.
pub const NO_READABLE_TEXT: &str = "[No readable text found in presentation]";

/// Dispatches raw bytes to the extractor for `format`.
pub async fn extract_segments(
    format: DocumentFormat,
    bytes: &[u8],
    url: &Url,
    ocr: &dyn OcrEngine,
) -> Result<Vec<Segment>, RagError> {
    let source = url.as_str();
    match format {
        DocumentFormat::Txt => Ok(extract_txt(bytes, source)),
        DocumentFormat::Pdf => extract_pdf(bytes, source),
        DocumentFormat::Docx => extract_docx(bytes, source),
        DocumentFormat::Pptx => extract_pptx(bytes, source, ocr).await,
        DocumentFormat::Xlsx | DocumentFormat::Xls => extract_workbook(format, bytes, source),
        DocumentFormat::Image => extract_image(bytes, url, ocr).await,
    }
}

fn extract_txt(bytes: &[u8], source: &str) -> Vec<Segment> {
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![Segment::new(
        text.into_owned(),
        SegmentMetadata::for_source(source),
    )]
}

fn extract_pdf(bytes: &[u8], source: &str) -> Result<Vec<Segment>, RagError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| RagError::Extraction(format!("pdf: {err}")))?;
    // pdf-extract separates pages with form feeds when the document declares
    // page boundaries; fall back to a single segment otherwise.
    let segments: Vec<Segment> = text
        .split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| {
            Segment::new(
                page.trim().to_string(),
                SegmentMetadata::for_source(source).with_page(i + 1),
            )
        })
        .collect();
    Ok(segments)
}

fn extract_docx(bytes: &[u8], source: &str) -> Result<Vec<Segment>, RagError> {
    let xml = read_zip_entry(bytes, "word/document.xml")?;
    let text = office_xml_text(&xml, b"t", b"p")?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![Segment::new(
        text.trim().to_string(),
        SegmentMetadata::for_source(source),
    )])
}

async fn extract_pptx(
    bytes: &[u8],
    source: &str,
    ocr: &dyn OcrEngine,
) -> Result<Vec<Segment>, RagError> {
    let mut archive = open_zip(bytes)?;
    let names: Vec<String> = archive.file_names().map(String::from).collect();

    // Slides are slide1.xml, slide2.xml, ... - sort numerically, not lexically.
    let mut slides: Vec<(usize, String)> = names
        .iter()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<usize>()
                .ok()?;
            Some((number, name.clone()))
        })
        .collect();
    slides.sort_unstable_by_key(|(number, _)| *number);

    let mut segments = Vec::new();
    for (number, name) in &slides {
        let xml = read_named_entry(&mut archive, name)?;
        let text = office_xml_text(&xml, b"t", b"p")?;
        if !text.trim().is_empty() {
            segments.push(Segment::new(
                text.trim().to_string(),
                SegmentMetadata::for_source(source).with_page(*number),
            ));
        }
    }

    // OCR embedded raster media for decks that carry text as images.
    for name in names.iter().filter(|name| {
        name.starts_with("ppt/media/")
            && [".png", ".jpg", ".jpeg"]
                .iter()
                .any(|ext| name.to_lowercase().ends_with(ext))
    }) {
        let image = read_named_entry(&mut archive, name)?;
        let text = ocr.recognize(&image).await?;
        if !text.trim().is_empty() {
            segments.push(Segment::new(
                text.trim().to_string(),
                SegmentMetadata::for_source(source).with_image_ref(name.clone()),
            ));
        }
    }

    if segments.is_empty() {
        segments.push(Segment::new(
            NO_READABLE_TEXT,
            SegmentMetadata::for_source(source),
        ));
    }
    Ok(segments)
}

fn extract_workbook(
    format: DocumentFormat,
    bytes: &[u8],
    source: &str,
) -> Result<Vec<Segment>, RagError> {
    use calamine::Reader;

    let sheets: Vec<(String, calamine::Range<calamine::Data>)> = match format {
        DocumentFormat::Xls => {
            let mut workbook = calamine::Xls::new(Cursor::new(bytes))
                .map_err(|err| RagError::Extraction(format!("xls: {err}")))?;
            workbook.worksheets()
        }
        _ => {
            let mut workbook = calamine::Xlsx::new(Cursor::new(bytes))
                .map_err(|err| RagError::Extraction(format!("xlsx: {err}")))?;
            workbook.worksheets()
        }
    };

    let mut segments = Vec::new();
    for (index, (name, range)) in sheets.into_iter().enumerate() {
        let mut lines = Vec::new();
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(ToString::to_string)
                .filter(|cell| !cell.is_empty())
                .collect();
            if !cells.is_empty() {
                lines.push(cells.join("\t"));
            }
        }
        if lines.is_empty() {
            continue;
        }
        segments.push(Segment::new(
            format!("Sheet: {name}\n{}", lines.join("\n")),
            SegmentMetadata::for_source(source).with_page(index + 1),
        ));
    }
    Ok(segments)
}

async fn extract_image(
    bytes: &[u8],
    url: &Url,
    ocr: &dyn OcrEngine,
) -> Result<Vec<Segment>, RagError> {
    let text = ocr.recognize(bytes).await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let image_ref = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("image")
        .to_string();
    Ok(vec![Segment::new(
        text.trim().to_string(),
        SegmentMetadata::for_source(url.as_str()).with_image_ref(image_ref),
    )])
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<Archive<'_>, RagError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| RagError::Extraction(format!("zip: {err}")))
}

fn read_named_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, RagError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|err| RagError::Extraction(format!("zip entry {name}: {err}")))?;
    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|err| RagError::Extraction(format!("zip entry {name}: {err}")))?;
    Ok(buffer)
}

fn read_zip_entry(bytes: &[u8], name: &str) -> Result<Vec<u8>, RagError> {
    let mut archive = open_zip(bytes)?;
    read_named_entry(&mut archive, name)
}

/// Collects the character data of `<…:text_tag>` runs from an Office XML
/// payload, inserting a newline at the close of every `<…:para_tag>`.
///
/// Works for WordprocessingML (`w:t` / `w:p`) and DrawingML (`a:t` / `a:p`)
/// alike since only local names are compared.
fn office_xml_text(xml: &[u8], text_tag: &[u8], para_tag: &[u8]) -> Result<String, RagError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_reader(xml);
    let mut out = String::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == text_tag => in_text_run = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == text_tag => in_text_run = false,
            Ok(Event::End(e)) if e.local_name().as_ref() == para_tag => out.push('\n'),
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|err| RagError::Extraction(format!("xml text: {err}")))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(RagError::Extraction(format!("xml: {err}"))),
        }
    }
    Ok(out)
}
