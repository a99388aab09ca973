use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::dataset::Dataset;
use super::error::DatasetWriterError;

/// Version of the YAML layout written for a dataset
const FORMAT_VERSION: &str = "1.0";

/// A simple struct which writes decoded datasets to YAML.
///
/// The document holds a small header (writer version, source file) followed by the dataset:
///
/// ```text
/// format: pcrd_decoder:1.0
/// source: plate_07.pcrd
/// dataset:
///   instrument, plate, dyes, protocol, events, windows, warnings, records, calibrations
/// ```
#[derive(Debug)]
pub struct DatasetWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

#[derive(serde::Serialize)]
struct DatasetDocument<'a> {
    format: String,
    source: String,
    dataset: &'a Dataset,
}

impl DatasetWriter {
    /// Create the writer, opening a file at path
    pub fn new(path: &Path) -> Result<Self, DatasetWriterError> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn write_dataset(&mut self, dataset: &Dataset, source: &Path) -> Result<(), DatasetWriterError> {
        let document = DatasetDocument {
            format: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            source: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            dataset,
        };
        serde_yaml::to_writer(&mut self.writer, &document)?;
        spdlog::info!(
            "Wrote {} records to {}",
            dataset.records().len(),
            self.path.display()
        );
        Ok(())
    }

    /// Flush and close the file
    pub fn close(mut self) -> Result<(), DatasetWriterError> {
        self.writer.flush()?;
        Ok(())
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DocumentFixture;
    use crate::pipeline::{decode_document, DecodeOptions};

    #[test]
    fn test_write_dataset() {
        let dataset = decode_document(
            DocumentFixture::default().to_xml().as_bytes(),
            &DecodeOptions::default(),
        )
        .unwrap();
        let dir = std::env::temp_dir().join("pcrd_decoder_writer_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("plate.yml");

        let mut writer = DatasetWriter::new(&path).unwrap();
        writer
            .write_dataset(&dataset, Path::new("/in/plate.pcrd"))
            .unwrap();
        writer.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let yaml: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(yaml["format"].as_str(), Some("libpcrd_decoder:1.0"));
        assert_eq!(yaml["source"].as_str(), Some("plate.pcrd"));
        assert_eq!(yaml["dataset"]["instrument"].as_str(), Some("CFX Opus (raw)"));
        let records = yaml["dataset"]["records"].as_sequence().unwrap();
        assert_eq!(records.len(), 100);
        assert_eq!(records[0]["well"].as_str(), Some("A1"));
        assert!(yaml["dataset"].get("reads").is_none());
    }
}
