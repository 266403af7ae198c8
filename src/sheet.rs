//! Tabular file reading for batch import.
//!
//! Every supported format is reduced to the same shape: one JSON object per
//! data row, keyed by the header row. Blank cells are omitted from the row
//! and fully blank rows are skipped, so the normalizer only ever sees
//! values that were actually present in the file.

use crate::import::RawRow;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported import file type: {0} (expected .csv, .xlsx or .json)")]
    Unsupported(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workbook: {0}")]
    Workbook(String),
    #[error("invalid JSON rows: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Csv,
    Xlsx,
    Json,
}

impl SheetKind {
    pub fn from_path(path: &Path) -> Result<Self, SheetError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(SheetKind::Csv),
            "xlsx" => Ok(SheetKind::Xlsx),
            "json" => Ok(SheetKind::Json),
            "xls" => Err(SheetError::Unsupported(
                ".xls (legacy binary workbook; save it as .xlsx or .csv)".into(),
            )),
            "" => Err(SheetError::Unsupported("(no extension)".into())),
            other => Err(SheetError::Unsupported(format!(".{}", other))),
        }
    }
}

pub fn read_rows(path: &Path) -> Result<Vec<RawRow>, SheetError> {
    let kind = SheetKind::from_path(path)?;
    let io_err = |source| SheetError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    };
    match kind {
        SheetKind::Csv => {
            let bytes = std::fs::read(path).map_err(io_err)?;
            Ok(parse_csv(&String::from_utf8_lossy(&bytes)))
        }
        SheetKind::Json => {
            let text = std::fs::read_to_string(path).map_err(io_err)?;
            parse_json_rows(&text)
        }
        SheetKind::Xlsx => {
            let f = File::open(path).map_err(io_err)?;
            parse_xlsx(f)
        }
    }
}

pub fn parse_json_rows(text: &str) -> Result<Vec<RawRow>, SheetError> {
    let v: Value = serde_json::from_str(text).map_err(|e| SheetError::Json(e.to_string()))?;
    let Value::Array(items) = v else {
        return Err(SheetError::Json("expected an array of row objects".into()));
    };
    // Non-object entries keep their slot so row numbers stay aligned; they
    // are rejected by the normalizer like any other empty row.
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::Object(m) => m,
            _ => RawRow::new(),
        })
        .collect())
}

/// Header names with blanks and duplicates made unique the way spreadsheet
/// exports usually do it (`__EMPTY`, `Name_1`).
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .map(|h| {
            let base = if h.trim().is_empty() {
                "__EMPTY".to_string()
            } else {
                h
            };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, n)
            };
            *n += 1;
            name
        })
        .collect()
}

fn csv_cell_value(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    let t = text.trim();
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    if let Some(n) = t
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
    {
        return Some(Value::Number(n));
    }
    Some(Value::String(text.to_string()))
}

fn split_csv_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            // Quoting only opens at the start of a field; a mid-field `"` is literal.
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

pub fn parse_csv(text: &str) -> Vec<RawRow> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_csv_records(text)
        .into_iter()
        .filter(|r| r.iter().any(|f| !f.is_empty()));

    let Some(header) = records.next() else {
        return Vec::new();
    };
    let headers = unique_headers(header);

    records
        .map(|fields| {
            let mut row = RawRow::new();
            for (h, f) in headers.iter().zip(fields.iter()) {
                if let Some(v) = csv_cell_value(f) {
                    row.insert(h.clone(), v);
                }
            }
            row
        })
        .filter(|row| !row.is_empty())
        .collect()
}

struct XmlElement<'a> {
    attrs: &'a str,
    inner: Option<&'a str>,
}

/// Non-nested scan for `<tag ...>inner</tag>` and `<tag .../>`.
fn xml_elements<'a>(xml: &'a str, tag: &str) -> Vec<XmlElement<'a>> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(found) = xml[pos..].find(&open) {
        let start = pos + found + open.len();
        let next = xml[start..].chars().next();
        if !matches!(next, Some(' ') | Some('\t') | Some('\r') | Some('\n') | Some('>') | Some('/')) {
            pos = start;
            continue;
        }
        let Some(gt) = xml[start..].find('>') else {
            break;
        };
        let head_end = start + gt;
        if xml[..head_end].ends_with('/') {
            out.push(XmlElement {
                attrs: &xml[start..head_end - 1],
                inner: None,
            });
            pos = head_end + 1;
            continue;
        }
        let body_start = head_end + 1;
        let Some(end) = xml[body_start..].find(&close) else {
            break;
        };
        out.push(XmlElement {
            attrs: &xml[start..head_end],
            inner: Some(&xml[body_start..body_start + end]),
        });
        pos = body_start + end + close.len();
    }
    out
}

fn xml_attr(attrs: &str, name: &str) -> Option<String> {
    let mut pos = 0;
    while let Some(found) = attrs[pos..].find(name) {
        let at = pos + found;
        let after = at + name.len();
        let boundary = at == 0 || attrs[..at].ends_with(char::is_whitespace);
        let rest = &attrs[after..];
        if boundary && rest.starts_with('=') {
            let quoted = &rest[1..];
            let quote = quoted.chars().next()?;
            if quote == '"' || quote == '\'' {
                let body = &quoted[1..];
                let end = body.find(quote)?;
                return Some(xml_unescape(&body[..end]));
            }
        }
        pos = after;
    }
    None
}

fn xml_unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                .ok()
                .and_then(char::from_u32),
            _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

/// All `<t>` runs inside a fragment, concatenated (rich text has several).
fn text_runs(fragment: &str) -> String {
    xml_elements(fragment, "t")
        .into_iter()
        .filter_map(|e| e.inner)
        .map(xml_unescape)
        .collect()
}

/// Last column an `.xlsx` sheet can have (`XFD`), zero-based.
const MAX_COLUMN: usize = 16_383;

/// Zero-based column index from a cell reference such as `AB12`.
/// `Err` for references past `XFD`.
fn column_index(cell_ref: &str) -> Result<Option<usize>, SheetError> {
    let too_wide = || SheetError::Workbook(format!("cell reference {} is out of range", cell_ref));
    let mut idx: usize = 0;
    let mut any = false;
    for c in cell_ref.chars() {
        if !c.is_ascii_alphabetic() {
            break;
        }
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        idx = idx
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| *v <= MAX_COLUMN + 1)
            .ok_or_else(too_wide)?;
        any = true;
    }
    Ok(if any { Some(idx - 1) } else { None })
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SheetError> {
    let mut entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(SheetError::Workbook(e.to_string())),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| SheetError::Workbook(format!("{}: {}", name, e)))?;
    Ok(Some(text))
}

/// Path of the first worksheet in workbook order.
fn first_sheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, SheetError> {
    let fallback = "xl/worksheets/sheet1.xml".to_string();
    let Some(workbook) = read_entry(archive, "xl/workbook.xml")? else {
        return Ok(fallback);
    };
    let Some(rel_id) = xml_elements(&workbook, "sheet")
        .first()
        .and_then(|s| xml_attr(s.attrs, "r:id"))
    else {
        return Ok(fallback);
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(fallback);
    };
    let target = xml_elements(&rels, "Relationship")
        .into_iter()
        .find(|r| xml_attr(r.attrs, "Id").as_deref() == Some(rel_id.as_str()))
        .and_then(|r| xml_attr(r.attrs, "Target"));
    Ok(match target {
        Some(t) if t.starts_with('/') => t.trim_start_matches('/').to_string(),
        Some(t) => format!("xl/{}", t),
        None => fallback,
    })
}

fn xlsx_cell_value(cell: &XmlElement<'_>, shared: &[String]) -> Option<Value> {
    let inner = cell.inner?;
    let kind = xml_attr(cell.attrs, "t").unwrap_or_default();
    if kind == "inlineStr" {
        let s = text_runs(inner);
        return if s.is_empty() { None } else { Some(Value::String(s)) };
    }
    let raw = xml_elements(inner, "v")
        .first()
        .and_then(|v| v.inner)
        .map(xml_unescape)?;
    if raw.is_empty() {
        return None;
    }
    match kind.as_str() {
        "s" => {
            let s = raw.trim().parse::<usize>().ok().and_then(|i| shared.get(i))?;
            if s.is_empty() {
                None
            } else {
                Some(Value::String(s.clone()))
            }
        }
        "b" => Some(Value::Bool(raw.trim() == "1")),
        "str" | "e" => Some(Value::String(raw)),
        _ => match raw.trim().parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Some(Value::Number(n)),
            None => Some(Value::String(raw)),
        },
    }
}

fn cell_header_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => crate::import::number_text(n),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Reads the first worksheet of an `.xlsx` workbook.
pub fn parse_xlsx<R: Read + Seek>(reader: R) -> Result<Vec<RawRow>, SheetError> {
    let mut archive = ZipArchive::new(reader).map_err(|e| SheetError::Workbook(e.to_string()))?;

    let shared: Vec<String> = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => xml_elements(&xml, "si")
            .into_iter()
            .map(|si| si.inner.map(text_runs).unwrap_or_default())
            .collect(),
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet_xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| SheetError::Workbook(format!("missing worksheet {}", sheet_path)))?;
    let data = match xml_elements(&sheet_xml, "sheetData").into_iter().next() {
        Some(XmlElement {
            inner: Some(inner), ..
        }) => inner,
        _ => return Ok(Vec::new()),
    };

    let mut grid: Vec<Vec<(usize, Value)>> = Vec::new();
    for row in xml_elements(data, "row") {
        let Some(inner) = row.inner else {
            continue;
        };
        let mut cells = Vec::new();
        for (pos, cell) in xml_elements(inner, "c").iter().enumerate() {
            let col = match xml_attr(cell.attrs, "r") {
                Some(r) => column_index(&r)?.unwrap_or(pos),
                None => pos,
            };
            if col > MAX_COLUMN {
                return Err(SheetError::Workbook(format!(
                    "row has more than {} columns",
                    MAX_COLUMN + 1
                )));
            }
            if let Some(v) = xlsx_cell_value(cell, &shared) {
                cells.push((col, v));
            }
        }
        if !cells.is_empty() {
            grid.push(cells);
        }
    }

    let mut rows = grid.into_iter();
    let Some(header_cells) = rows.next() else {
        return Ok(Vec::new());
    };
    let width = header_cells.iter().map(|(c, _)| c + 1).max().unwrap_or(0);
    let mut raw_headers = vec![String::new(); width];
    for (col, v) in &header_cells {
        raw_headers[*col] = cell_header_text(v);
    }
    let headers = unique_headers(raw_headers);

    Ok(rows
        .map(|cells| {
            let mut row = RawRow::new();
            for (col, v) in cells {
                if let Some(h) = headers.get(col) {
                    row.insert(h.clone(), v);
                }
            }
            row
        })
        .filter(|row| !row.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_xlsx(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default();
        for (name, body) in entries {
            zip.start_file(*name, opts).expect("start entry");
            zip.write_all(body.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn csv_rows_are_keyed_by_header() {
        let text = "\u{feff}FARMER,LOCATION,SOIL (N-P-K),YIELD (TONS)\r\n\
                    Asha,Nashik,120-60-40,8\r\n\
                    \"Patil, R.\",Pune,,4.5\r\n";
        let rows = parse_csv(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["FARMER"], json!("Asha"));
        assert_eq!(rows[0]["SOIL (N-P-K)"], json!("120-60-40"));
        assert_eq!(rows[0]["YIELD (TONS)"], json!(8));
        assert_eq!(rows[1]["FARMER"], json!("Patil, R."));
        assert!(rows[1].get("SOIL (N-P-K)").is_none());
        assert_eq!(rows[1]["YIELD (TONS)"], json!(4.5));
    }

    #[test]
    fn csv_handles_quotes_newlines_and_blank_rows() {
        let text = "Name,Notes\n\nRavi,\"said \"\"ok\"\"\nthen left\"\n,\n";
        let rows = parse_csv(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Notes"], json!("said \"ok\"\nthen left"));
    }

    #[test]
    fn csv_mid_field_quote_is_literal() {
        let text = "Name,Location,Yield,Notes\n\
                    Asha,Pune,3,6\" rain\n\
                    Ravi,Nashik,4,ok\n\
                    Mina,Satara,5,fine\n";
        let rows = parse_csv(text);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Notes"], json!("6\" rain"));
        assert_eq!(rows[1]["Name"], json!("Ravi"));
        assert_eq!(rows[2]["Notes"], json!("fine"));
    }

    #[test]
    fn xlsx_cell_ref_past_last_column_is_an_error() {
        let sheet1 = r#"<worksheet><sheetData>
<row r="1"><c r="ZZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>Name</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>Ravi</t></is></c></row>
</sheetData></worksheet>"#;
        let bytes = build_xlsx(&[("xl/worksheets/sheet1.xml", sheet1)]);
        assert!(matches!(
            parse_xlsx(Cursor::new(bytes)),
            Err(SheetError::Workbook(_))
        ));
    }

    #[test]
    fn duplicate_and_blank_headers_are_made_unique() {
        let rows = parse_csv("Name,Name,\na,b,c\n");
        assert_eq!(rows[0]["Name"], json!("a"));
        assert_eq!(rows[0]["Name_1"], json!("b"));
        assert_eq!(rows[0]["__EMPTY"], json!("c"));
    }

    #[test]
    fn json_rows_keep_positions() {
        let rows = parse_json_rows(r#"[{"Farmer":"a"}, 3, {"Farmer":"b"}]"#).expect("rows");
        assert_eq!(rows.len(), 3);
        assert!(rows[1].is_empty());
        assert!(parse_json_rows(r#"{"Farmer":"a"}"#).is_err());
    }

    #[test]
    fn extension_check() {
        assert_eq!(
            SheetKind::from_path(Path::new("data/FIELD.CSV")).expect("csv"),
            SheetKind::Csv
        );
        assert_eq!(
            SheetKind::from_path(Path::new("a.xlsx")).expect("xlsx"),
            SheetKind::Xlsx
        );
        assert!(matches!(
            SheetKind::from_path(Path::new("a.xls")),
            Err(SheetError::Unsupported(_))
        ));
        assert!(matches!(
            SheetKind::from_path(Path::new("a.txt")),
            Err(SheetError::Unsupported(_))
        ));
    }

    #[test]
    fn xlsx_first_sheet_with_shared_and_inline_strings() {
        let workbook = r#"<?xml version="1.0"?>
<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Data" sheetId="1" r:id="rId2"/><sheet name="Other" sheetId="2" r:id="rId1"/></sheets>
</workbook>"#;
        let rels = r#"<?xml version="1.0"?>
<Relationships>
<Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;
        let shared = r#"<sst><si><t>Farmer</t></si><si><t>Location</t></si><si><r><t>As</t></r><r><t>ha</t></r></si><si><t>Nashik &amp; Co</t></si></sst>"#;
        let sheet2 = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="D1" t="inlineStr"><is><t>Yield</t></is></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="s"><v>3</v></c><c r="C2"/><c r="D2"><v>8</v></c></row>
<row r="3"/>
</sheetData></worksheet>"#;
        let sheet1 = r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Wrong</t></is></c></row></sheetData></worksheet>"#;
        let bytes = build_xlsx(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet1),
            ("xl/worksheets/sheet2.xml", sheet2),
        ]);

        let rows = parse_xlsx(Cursor::new(bytes)).expect("parse xlsx");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Farmer"], json!("Asha"));
        assert_eq!(rows[0]["Location"], json!("Nashik & Co"));
        assert_eq!(rows[0]["Yield"].as_f64(), Some(8.0));
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn xlsx_without_workbook_falls_back_to_sheet1() {
        let sheet1 = r#"<worksheet><sheetData>
<row><c t="inlineStr"><is><t>Name</t></is></c><c t="inlineStr"><is><t>Yield</t></is></c></row>
<row><c t="inlineStr"><is><t>Ravi</t></is></c><c><v>2.5</v></c></row>
</sheetData></worksheet>"#;
        let bytes = build_xlsx(&[("xl/worksheets/sheet1.xml", sheet1)]);
        let rows = parse_xlsx(Cursor::new(bytes)).expect("parse xlsx");
        assert_eq!(rows[0]["Name"], json!("Ravi"));
        assert_eq!(rows[0]["Yield"].as_f64(), Some(2.5));
    }

    #[test]
    fn column_refs_and_entities() {
        assert_eq!(column_index("A1").expect("A1"), Some(0));
        assert_eq!(column_index("Z9").expect("Z9"), Some(25));
        assert_eq!(column_index("AB12").expect("AB12"), Some(27));
        assert_eq!(column_index("XFD3").expect("XFD3"), Some(16_383));
        assert_eq!(column_index("12").expect("12"), None);
        assert!(column_index("XFE1").is_err());
        assert!(column_index("ZZZZZZZZZZZZZZZ1").is_err());
        assert_eq!(xml_unescape("a &lt;b&gt; &#65;&#x42; &bogus;"), "a <b> AB &bogus;");
    }
}
