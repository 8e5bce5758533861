// executor.rs — Applies patch commands to a working tree.
//
// Each command is checked against the file-type allow-list, then run:
//   setField    → parse the file, set the field, write the new text back
//   createFile  → write the content verbatim; the file must not exist yet
//   deleteFile  → remove the file; it must exist
//
// Commands see the effects of earlier commands in the same tree, so a
// createFile followed by a setField on the same path works.

use tracing::info;

use patchgate_changeset::{CommandAction, PatchCommand};
use patchgate_yaml::Document;

use crate::error::WorkspaceError;
use crate::tree::WorkingTree;

/// Extensions patchable when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".yaml", ".yml"];

/// Runs patch commands against a [`WorkingTree`].
#[derive(Debug, Clone)]
pub struct Executor {
    allowed_extensions: Vec<String>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()))
    }
}

impl Executor {
    /// Create an executor that only touches files with one of `extensions`
    /// (written with the leading dot, e.g. `.yaml`).
    pub fn new(extensions: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_extensions: extensions.into_iter().collect(),
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Apply every command in order, stopping at the first failure. The
    /// index of the failed command is returned with the error.
    pub fn apply_all(
        &self,
        tree: &mut WorkingTree,
        commands: &[PatchCommand],
    ) -> Result<(), (usize, WorkspaceError)> {
        for (idx, command) in commands.iter().enumerate() {
            self.apply(tree, command).map_err(|err| (idx, err))?;
        }
        Ok(())
    }

    /// Apply one command.
    pub fn apply(
        &self,
        tree: &mut WorkingTree,
        command: &PatchCommand,
    ) -> Result<(), WorkspaceError> {
        let path = command.path.as_str();
        if !self
            .allowed_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return Err(WorkspaceError::UnsupportedFileType {
                path: path.to_string(),
                allowed: self.allowed_extensions.join(", "),
            });
        }

        match &command.action {
            CommandAction::SetField {
                field,
                value,
                create,
            } => {
                let bytes = tree.read_file(path)?;
                let text = String::from_utf8(bytes).map_err(|_| WorkspaceError::NotText {
                    path: path.to_string(),
                })?;
                let field_error = |source| WorkspaceError::Field {
                    path: path.to_string(),
                    field: field.to_string(),
                    source,
                };
                let mut doc = Document::parse(text).map_err(field_error)?;
                let written = doc.set_path(field, value, *create).map_err(field_error)?;
                tree.write_file(path, doc.into_string())?;
                info!(path, field = %field, targets = written, "patched YAML");
            }
            CommandAction::CreateFile { content } => {
                if tree.exists(path)? {
                    return Err(WorkspaceError::FileAlreadyExists {
                        path: path.to_string(),
                    });
                }
                tree.write_file(path, content.as_bytes())?;
                info!(path, bytes = content.len(), "created file");
            }
            CommandAction::DeleteFile {} => {
                tree.remove_file(path)?;
                info!(path, "deleted file");
            }
        }
        Ok(())
    }
}
