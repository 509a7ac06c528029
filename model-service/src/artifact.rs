//! Uploaded model archives: task detection from the bundled README and on-disk storage.

use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use log::{debug, info};
use uuid::Uuid;
use zip::ZipArchive;

use crate::{
    api_types::Task,
    error::{Result, ServiceError},
};

const README: &str = "README.md";
const FRONT_MATTER_FENCE: &str = "---";

/// What an archive tells us about the model inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub task: Task,
    pub readme: Option<String>,
}

/// Open a zip archive and derive the model task from its shallowest `README.md`.
pub fn inspect_archive(content: &[u8]) -> Result<ArtifactInfo> {
    if content.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "model content is empty".to_owned(),
        ));
    }

    let mut archive = ZipArchive::new(Cursor::new(content)).map_err(|e| {
        ServiceError::InvalidArgument(format!("model content is not a zip archive: {}", e))
    })?;

    let mut readme_entry: Option<(usize, usize)> = None;
    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(|e| {
            ServiceError::InvalidArgument(format!("failed to read zip entry {}: {}", i, e))
        })?;
        if file.is_dir() {
            continue;
        }
        let path = match file.enclosed_name() {
            Some(path) => path,
            None => continue,
        };
        if path.file_name().map(|n| n == README).unwrap_or(false) {
            let depth = path.components().count();
            if readme_entry.map(|(d, _)| depth < d).unwrap_or(true) {
                readme_entry = Some((depth, i));
            }
        }
    }

    let readme = match readme_entry {
        Some((_, idx)) => {
            let mut file = archive.by_index(idx).map_err(|e| {
                ServiceError::InvalidArgument(format!("failed to read {}: {}", README, e))
            })?;
            let mut text = String::new();
            file.read_to_string(&mut text).map_err(|e| {
                ServiceError::FailedPrecondition(format!("{} is not valid UTF-8: {}", README, e))
            })?;
            Some(text)
        }
        None => None,
    };

    let task = match &readme {
        Some(text) => task_from_readme(text)?,
        None => Task::Unspecified,
    };
    debug!("inspected archive task={}", task.as_str());

    Ok(ArtifactInfo { task, readme })
}

/// Task named by the `Task` key of a README's YAML front matter.
pub fn task_from_readme(readme: &str) -> Result<Task> {
    let front_matter = match front_matter(readme) {
        Some(front_matter) => front_matter,
        None => return Ok(Task::Unspecified),
    };

    let meta: serde_yaml::Value = serde_yaml::from_str(&front_matter).map_err(|e| {
        ServiceError::FailedPrecondition(format!("could not get metadata from {}: {}", README, e))
    })?;

    let task = meta.as_mapping().and_then(|mapping| {
        mapping.iter().find_map(|(key, value)| match key.as_str() {
            Some(key) if key.eq_ignore_ascii_case("task") => Some(value.clone()),
            _ => None,
        })
    });

    let task = match task {
        None | Some(serde_yaml::Value::Null) => return Ok(Task::Unspecified),
        Some(serde_yaml::Value::String(task)) => task,
        Some(other) => {
            return Err(ServiceError::FailedPrecondition(format!(
                "{} task must be a string, got {:?}",
                README, other
            )))
        }
    };

    match Task::parse(&format!("TASK_{}", screaming_snake(task.trim()))) {
        Some(task) => Ok(task),
        None if task.trim().is_empty() => Ok(Task::Unspecified),
        None => Err(ServiceError::FailedPrecondition(format!(
            "{} contains unsupported task {:?}",
            README, task
        ))),
    }
}

/// `InstanceSegmentation`, `instance segmentation` and `instance-segmentation` all become
/// `INSTANCE_SEGMENTATION`.
fn screaming_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        match c {
            ' ' | '-' | '_' => {
                if !out.ends_with('_') {
                    out.push('_');
                }
                prev_lower = false;
            }
            c if c.is_ascii_uppercase() && prev_lower => {
                out.push('_');
                out.push(c);
                prev_lower = false;
            }
            c => {
                out.push(c.to_ascii_uppercase());
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
    }
    out
}

/// Text between the leading `---` fence and the next one.
fn front_matter(text: &str) -> Option<String> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != FRONT_MATTER_FENCE {
        return None;
    }

    let mut body = Vec::new();
    for line in lines {
        if line.trim_end() == FRONT_MATTER_FENCE {
            return Some(body.join("\n"));
        }
        body.push(line);
    }

    None
}

/// On-disk store of uploaded archives, one directory per model.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        ArtifactStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn model_dir(&self, model_uid: &Uuid) -> PathBuf {
        self.root.join(model_uid.to_string())
    }

    pub async fn save(
        &self,
        model_uid: &Uuid,
        instance_id: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.model_dir(model_uid);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.zip", instance_id));
        tokio::fs::write(&path, content).await?;
        info!("stored archive {} ({} bytes)", path.display(), content.len());

        Ok(path)
    }

    pub async fn remove_model(&self, model_uid: &Uuid) -> Result<()> {
        let dir = self.model_dir(model_uid);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("removed archives under {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::{Cursor, Write};

    use uuid::Uuid;
    use zip::{write::FileOptions, ZipWriter};

    use super::{inspect_archive, task_from_readme, ArtifactStore};
    use crate::{api_types::Task, error::Code};

    /// Build a zip archive from `(path, contents)` pairs.
    pub fn zip_archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, contents) in files {
            writer.start_file(*path, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    pub fn task_from_front_matter() {
        let readme = "---\nTask: Classification\nTags:\n  - dummy\n---\n# Dummy model\n";
        assert_eq!(task_from_readme(readme).unwrap(), Task::Classification);
        assert_eq!(
            task_from_readme("---\ntask: keypoint\n---\n").unwrap(),
            Task::Keypoint
        );
        assert_eq!(
            task_from_readme("---\nTask: InstanceSegmentation\n---\n").unwrap(),
            Task::InstanceSegmentation
        );
        assert_eq!(
            task_from_readme("---\ntask: semantic segmentation\n---\n").unwrap(),
            Task::SemanticSegmentation
        );
        assert_eq!(task_from_readme("# No front matter").unwrap(), Task::Unspecified);
        assert_eq!(task_from_readme("---\nTags: []\n---\n").unwrap(), Task::Unspecified);
        assert_eq!(
            task_from_readme("---\nTask: Translation\n---\n")
                .unwrap_err()
                .code(),
            Code::FailedPrecondition
        );
    }

    #[test]
    pub fn shallowest_readme_wins() {
        let archive = zip_archive(&[
            ("dummy-cls/nested/README.md", "---\nTask: Detection\n---\n"),
            ("dummy-cls/README.md", "---\nTask: Classification\n---\n"),
            ("dummy-cls/model.py", "print('hi')"),
        ]);

        let info = inspect_archive(&archive).unwrap();
        assert_eq!(info.task, Task::Classification);
        assert!(info.readme.unwrap().contains("Classification"));
    }

    #[test]
    pub fn archive_without_readme_is_unspecified() {
        let archive = zip_archive(&[("model/model.py", "pass")]);
        let info = inspect_archive(&archive).unwrap();

        assert_eq!(info.task, Task::Unspecified);
        assert!(info.readme.is_none());
    }

    #[test]
    pub fn non_zip_content_is_invalid() {
        assert_eq!(
            inspect_archive(b"definitely not a zip").unwrap_err().code(),
            Code::InvalidArgument
        );
        assert_eq!(inspect_archive(b"").unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    pub async fn store_and_remove() {
        let dir = tempdir::TempDir::new("artifact_test").unwrap();
        let store = ArtifactStore::new(dir.path());
        let uid = Uuid::new_v4();

        let path = store.save(&uid, "latest", b"zip bytes").await.unwrap();
        assert!(path.exists());

        store.remove_model(&uid).await.unwrap();
        assert!(!store.model_dir(&uid).exists());

        // Removing again is fine.
        store.remove_model(&uid).await.unwrap();
    }
}
