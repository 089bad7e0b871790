use crate::config::VectorizerConfig;
use crate::models::Category;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Maps a recorded attachment name to a notice PDF on disk.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    base_path: PathBuf,
    sale_folder: String,
    lease_folder: String,
    excluded_markers: Vec<String>,
    required_markers: Vec<String>,
}

impl SourceResolver {
    pub fn new(config: &VectorizerConfig) -> Self {
        Self {
            base_path: config.pdf_base_path.clone(),
            sale_folder: config.sale_folder.clone(),
            lease_folder: config.lease_folder.clone(),
            excluded_markers: config.excluded_markers.clone(),
            required_markers: config.required_markers.clone(),
        }
    }

    /// Pamphlets are skipped; only attachments named as the notice itself
    /// are accepted.
    pub fn accepts(&self, file_name: &str) -> bool {
        if self
            .excluded_markers
            .iter()
            .any(|marker| file_name.contains(marker.as_str()))
        {
            return false;
        }
        self.required_markers.is_empty()
            || self
                .required_markers
                .iter()
                .any(|marker| file_name.contains(marker.as_str()))
    }

    pub fn category_root(&self, category: Category) -> PathBuf {
        let folder = match category {
            Category::Sale => &self.sale_folder,
            Category::Lease => &self.lease_folder,
        };
        self.base_path.join(folder)
    }

    pub fn resolve(&self, file_name: &str, category: Category) -> Option<PathBuf> {
        if !self.accepts(file_name) {
            return None;
        }
        discover_pdf_files(&self.category_root(category))
            .into_iter()
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name == file_name)
            })
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
