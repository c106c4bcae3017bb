//! Read-only access to the Data Structure Definition: its concept scheme and code lists.
//!
//! The DSD arrives either as a workbook with one sheet per table, or as a directory holding one
//! `<SHEET>.csv` export per sheet. Both are read as rows of text cells and interpreted by
//! position, following the fixed layout of the DSD template.

use std::io::Cursor;
use std::iter;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Reader, Sheets};
use log::{debug, info};

use crate::config::DsdConfig;
use crate::error::{Result, SdmxPrepError};
use crate::source::{fetch_bytes, is_url};

pub type Rows = Vec<Vec<String>>;

/// Anything that can produce the rows of a named sheet.
pub trait SheetSource {
    fn read_sheet(&mut self, name: &str) -> Result<Rows>;
}

/// A spreadsheet workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`), held in memory.
pub struct Workbook {
    location: String,
    sheets: Sheets<Cursor<Vec<u8>>>,
}

impl Workbook {
    /// Fetches the workbook at `location`, a local path or an http(s) URL.
    pub async fn open(location: &str) -> Result<Self> {
        let bytes = fetch_bytes(location).await?;
        Self::from_bytes(location, bytes)
    }

    pub fn from_bytes(location: &str, bytes: Vec<u8>) -> Result<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
            SdmxPrepError::source(
                location,
                format!("{e}; the DSD must be an .xlsx, .xls or .ods workbook"),
            )
        })?;
        Ok(Self {
            location: location.to_string(),
            sheets,
        })
    }
}

impl SheetSource for Workbook {
    fn read_sheet(&mut self, name: &str) -> Result<Rows> {
        let range = self.sheets.worksheet_range(name).map_err(|e| {
            SdmxPrepError::source(&self.location, format!("sheet `{name}`: {e}"))
        })?;
        // The range starts at the first used cell; pad back to A1 so layout positions hold
        let (start_row, start_col) = range
            .start()
            .map(|(row, col)| (row as usize, col as usize))
            .unwrap_or_default();
        let mut rows: Rows = vec![Vec::new(); start_row];
        rows.extend(range.rows().map(|row| {
            iter::repeat(String::new())
                .take(start_col)
                .chain(row.iter().map(|cell| cell.to_string()))
                .collect()
        }));
        Ok(rows)
    }
}

/// A directory of per-sheet CSV exports named `<SHEET>.csv`.
pub struct CsvSheetDirectory {
    dir: PathBuf,
}

impl CsvSheetDirectory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl SheetSource for CsvSheetDirectory {
    fn read_sheet(&mut self, name: &str) -> Result<Rows> {
        let path = self.dir.join(format!("{name}.csv"));
        let location = path.to_string_lossy().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| SdmxPrepError::source(&location, e))?;
        reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(str::to_string).collect())
                    .map_err(|e| SdmxPrepError::source(&location, e))
            })
            .collect()
    }
}

/// Opens the DSD at `location`: a directory of CSV exports, or a workbook file or URL.
pub async fn open_sheets(location: &str) -> Result<Box<dyn SheetSource>> {
    if !is_url(location) && Path::new(location).is_dir() {
        info!("Reading DSD sheets from directory {location}");
        Ok(Box::new(CsvSheetDirectory::new(location)))
    } else {
        info!("Reading DSD workbook {location}");
        Ok(Box::new(Workbook::open(location).await?))
    }
}

impl<S: SheetSource + ?Sized> SheetSource for Box<S> {
    fn read_sheet(&mut self, name: &str) -> Result<Rows> {
        (**self).read_sheet(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub code_list_id: Option<String>,
}

/// The concept scheme: concept name → concept ID and code-list identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptScheme(pub Vec<Concept>);

impl ConceptScheme {
    pub fn concept(&self, name: &str) -> Option<&Concept> {
        self.0.iter().find(|c| c.name == name)
    }

    /// Code-list identifier of the concept named exactly `name`.
    pub fn lookup_tab(&self, name: &str) -> Option<&str> {
        self.concept(name).and_then(|c| c.code_list_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub code: String,
    pub name: String,
}

/// The codes of one code list, in sheet order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeList {
    pub id: String,
    pub codes: Vec<Code>,
}

impl CodeList {
    /// Code whose human-readable name is exactly `name`.
    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.codes
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.code.as_str())
    }
}

fn cell(row: &[String], position: usize) -> Option<&str> {
    row.get(position)
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

/// The DSD, read through a `SheetSource` according to the configured layout.
pub struct Dsd<S: SheetSource> {
    sheets: S,
    layout: DsdConfig,
}

impl<S: SheetSource> Dsd<S> {
    pub fn new(sheets: S, layout: DsdConfig) -> Self {
        Self { sheets, layout }
    }

    pub fn sheets(&self) -> &S {
        &self.sheets
    }

    /// Sheet holding the code list `code_list_id`.
    pub fn sheet_name(code_list_id: &str) -> String {
        code_list_id.to_uppercase()
    }

    pub fn concept_scheme(&mut self) -> Result<ConceptScheme> {
        let rows = self.sheets.read_sheet(&self.layout.concept_scheme_sheet)?;
        // Skipped rows are followed by one header row
        let concepts = rows
            .iter()
            .skip(self.layout.concept_skip_rows + 1)
            .filter_map(|row| {
                let name = cell(row, self.layout.concept_name_column)?;
                Some(Concept {
                    id: cell(row, self.layout.concept_id_column)
                        .unwrap_or(name)
                        .to_string(),
                    name: name.to_string(),
                    code_list_id: cell(row, self.layout.concept_code_list_column)
                        .map(str::to_string),
                })
            })
            .collect::<Vec<_>>();
        debug!("Concept scheme has {} concepts", concepts.len());
        Ok(ConceptScheme(concepts))
    }

    pub fn code_list(&mut self, code_list_id: &str) -> Result<CodeList> {
        let rows = self.sheets.read_sheet(&Self::sheet_name(code_list_id))?;
        let codes = rows
            .iter()
            .skip(self.layout.code_list_skip_rows + 1)
            .filter_map(|row| {
                Some(Code {
                    code: cell(row, self.layout.code_column)?.to_string(),
                    name: cell(row, self.layout.code_name_column)?.to_string(),
                })
            })
            .collect::<Vec<_>>();
        debug!("Code list {code_list_id} has {} codes", codes.len());
        Ok(CodeList {
            id: code_list_id.to_string(),
            codes,
        })
    }
}
