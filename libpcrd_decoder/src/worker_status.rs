use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    GREEN,
    RED,
}

/// Progress report sent from a worker to whoever is drawing progress
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub current_file: Option<PathBuf>,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(
        progress: f32,
        current_file: Option<PathBuf>,
        worker_id: usize,
        color: BarColor,
    ) -> Self {
        Self {
            progress,
            current_file,
            worker_id,
            color,
        }
    }

    /// File name for display, if the worker is on a file
    pub fn file_label(&self) -> String {
        self.current_file
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
