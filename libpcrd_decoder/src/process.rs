use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::dataset::Dataset;
use super::dataset_writer::DatasetWriter;
use super::error::ProcessorError;
use super::pipeline::{decode_archive, DecodeOptions};
use super::worker_status::{BarColor, WorkerStatus};

/// Read an instrument file and decode it.
///
/// Reading the file is the only IO; everything after it is the pure decode pipeline.
pub fn decode_file(
    path: &Path,
    secret: &str,
    options: &DecodeOptions,
) -> Result<Dataset, ProcessorError> {
    let bytes = std::fs::read(path)?;
    spdlog::info!(
        "Read {} ({})",
        path.display(),
        human_bytes::human_bytes(bytes.len() as f64)
    );
    decode_archive(&bytes, secret, options).map_err(|source| ProcessorError::DecodeError {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a single file and write its dataset to the output directory.
/// Returns the path of the written dataset
pub fn process_file(config: &Config, secret: &str, path: &Path) -> Result<PathBuf, ProcessorError> {
    let dataset = decode_file(path, secret, &config.decode_options())?;
    let output_path = config.get_output_file_name(path)?;
    let mut writer = DatasetWriter::new(&output_path)?;
    writer.write_dataset(&dataset, path)?;
    writer.close()?;
    Ok(output_path)
}

/// Process a subset of files.
///
/// A file that fails is logged and counted; the rest of the subset is still processed.
/// Returns the number of failed files.
pub fn process_subset(
    config: Config,
    secret: String,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
) -> Result<usize, ProcessorError> {
    let total = subset.len().max(1) as f32;
    let mut failures = 0;
    for (idx, path) in subset.into_iter().enumerate() {
        tx.send(WorkerStatus::new(
            idx as f32 / total,
            Some(path.clone()),
            worker_id,
            BarColor::CYAN,
        ))?;
        spdlog::info!("Processing file {}...", path.display());
        match process_file(&config, &secret, &path) {
            Ok(output) => spdlog::info!(
                "Finished processing file {}, wrote {}.",
                path.display(),
                output.display()
            ),
            Err(e) => {
                failures += 1;
                spdlog::error!("Failed to process {}: {e}", path.display());
            }
        }
    }

    let color = if failures == 0 {
        BarColor::GREEN
    } else {
        BarColor::RED
    };
    tx.send(WorkerStatus::new(1.0, None, worker_id, color))?;
    Ok(failures)
}

/// Divide the input files in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config, files: Vec<PathBuf>) -> Vec<Vec<PathBuf>> {
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, file) in files.into_iter().enumerate() {
        subsets[idx % n_subsets].push(file)
    }

    subsets
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DocumentFixture;
    use std::sync::mpsc;

    const SECRET: &str = "batch-secret";

    #[test]
    fn test_create_subsets() {
        let config = Config {
            n_threads: 3,
            ..Default::default()
        };
        let files: Vec<PathBuf> = (0..7).map(|i| PathBuf::from(format!("{i}.pcrd"))).collect();
        let subsets = create_subsets(&config, files);
        assert_eq!(subsets.len(), 3);
        assert_eq!(subsets[0].len(), 3);
        assert_eq!(subsets[1].len(), 2);
        assert_eq!(subsets[2][1], PathBuf::from("5.pcrd"));
    }

    #[test]
    fn test_failing_file_does_not_stop_subset() {
        let root = std::env::temp_dir().join("pcrd_decoder_process_test");
        let _ = std::fs::remove_dir_all(&root);
        let input = root.join("in");
        let output = root.join("out");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        std::fs::write(input.join("bad.pcrd"), b"not an archive").unwrap();
        std::fs::write(
            input.join("good.pcrd"),
            DocumentFixture::default().to_archive(SECRET),
        )
        .unwrap();

        let config = Config {
            input_path: input.clone(),
            output_path: output.clone(),
            ..Default::default()
        };
        let files = config.collect_input_files().unwrap();
        let (tx, rx) = mpsc::channel::<WorkerStatus>();
        let failures = process_subset(config, SECRET.to_string(), tx, 0, files).unwrap();
        assert_eq!(failures, 1);
        assert!(output.join("good.yml").exists());
        assert!(!output.join("bad.yml").exists());

        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].file_label(), "bad.pcrd");
        assert_eq!(statuses[2].progress, 1.0);
        assert!(matches!(statuses[2].color, BarColor::RED));
    }

    #[test]
    fn test_decode_file_names_path() {
        let path = std::env::temp_dir().join("pcrd_decoder_garbage.pcrd");
        std::fs::write(&path, b"garbage").unwrap();
        match decode_file(&path, SECRET, &DecodeOptions::default()) {
            Err(ProcessorError::DecodeError { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
