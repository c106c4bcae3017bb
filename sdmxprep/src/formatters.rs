use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use anyhow::{anyhow, Result};
use enum_dispatch::enum_dispatch;
use log::info;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`
/// Covers the types the pipeline tables contain.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::StringOwned(s) => Ok(Value::String(s.to_string())),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        AnyValue::Float64(n) => Ok(json!(*n)),
        _ => Err(anyhow!("Failed to convert type")),
    }
}

/// Trait to define different output generators. Defines two
/// functions, format which generates a serialized string of the
/// `DataFrame` and save which writes it to a writer
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, df)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential
/// output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Csv(CSVFormatter),
    Tsv(TSVFormatter),
    Json(JSONRecordsFormatter),
}

impl OutputFormatter {
    /// Tab separated for `.tsv` and `.txt` paths, comma separated otherwise.
    pub fn for_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.ends_with(".tsv") || lower.ends_with(".txt") {
            Self::Tsv(TSVFormatter)
        } else {
            Self::Csv(CSVFormatter)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).include_header(true).finish(df)?;
        Ok(())
    }
}

/// Tab separated values, the format of the final mapping tables
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TSVFormatter;

impl OutputGenerator for TSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer)
            .include_header(true)
            .with_separator(b'\t')
            .finish(df)?;
        Ok(())
    }
}

/// Format the results as a JSON array with one object per row
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JSONRecordsFormatter;

impl OutputGenerator for JSONRecordsFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let mut records = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let mut record = serde_json::Map::new();
            for col in df.get_columns() {
                record.insert(col.name().to_string(), any_value_to_json(&col.get(idx)?)?);
            }
            records.push(Value::Object(record));
        }
        serde_json::to_writer(writer, &Value::Array(records))?;
        Ok(())
    }
}

/// Writes `df` to `path` in the format its extension implies, creating parent directories.
pub fn write_table(path: &str, df: &mut DataFrame) -> Result<()> {
    write_table_as(path, df, OutputFormatter::for_path(path))
}

/// Writes `df` to `path` with `formatter` whatever the extension, creating parent directories.
pub fn write_table_as(path: &str, df: &mut DataFrame, formatter: OutputFormatter) -> Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    formatter.save(&mut writer, df)?;
    writer.flush()?;
    info!("Wrote {} rows to {path}", df.height());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    fn test_df() -> DataFrame {
        df!(
            "Text" => &["Female", "16 to 24"],
            "Dimension" => &["SEX", "AGE"],
            "Value" => &[Some("F"), None]
        )
        .unwrap()
    }

    #[test]
    fn csv_formatter_should_work() {
        let output = CSVFormatter.format(&mut test_df());
        let correct_str = ["Text,Dimension,Value", "Female,SEX,F", "16 to 24,AGE,", ""].join("\n");
        assert_eq!(output.unwrap(), correct_str, "Output should be correct");
    }

    #[test]
    fn tsv_formatter_should_work() {
        let output = TSVFormatter.format(&mut test_df());
        let correct_str =
            ["Text\tDimension\tValue", "Female\tSEX\tF", "16 to 24\tAGE\t", ""].join("\n");
        assert_eq!(output.unwrap(), correct_str, "Output should be correct");
    }

    #[test]
    fn json_formatter_should_work() {
        let output = JSONRecordsFormatter.format(&mut test_df());
        let correct_str = r#"[{"Dimension":"SEX","Text":"Female","Value":"F"},{"Dimension":"AGE","Text":"16 to 24","Value":null}]"#;
        assert_eq!(output.unwrap(), correct_str, "Output should be correct");
    }

    #[test]
    fn format_follows_the_extension() {
        assert!(matches!(
            OutputFormatter::for_path("out/code_mapping.TSV"),
            OutputFormatter::Tsv(_)
        ));
        assert!(matches!(
            OutputFormatter::for_path("out/indicators.csv"),
            OutputFormatter::Csv(_)
        ));
    }

    #[test]
    fn write_table_creates_parent_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/output/column_mapping.tsv");
        let path = path.to_string_lossy().to_string();
        write_table(&path, &mut test_df())?;
        assert!(read_to_string(&path)?.starts_with("Text\tDimension\tValue\n"));
        Ok(())
    }
}
