// request.rs — Patch requests: the JSON wire shape and its validated form.
//
// A request body is decoded into the `Raw*` types, which mirror the JSON
// exactly and reject unknown fields. `RawPatchRequest::validate` turns them
// into a `PatchRequest` whose commands are a tagged enum, whose field paths
// are parsed and whose values are known to be scalars. Nothing downstream
// ever sees an unvalidated request.

use serde::{Deserialize, Serialize};

use patchgate_yaml::{PathExpr, ScalarValue};

use crate::error::ChangesetError;

/// A name and email pair for commit authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("'name' must not be empty".into());
        }
        if self.email.is_empty() {
            return Err("'email' must not be empty".into());
        }
        Ok(())
    }
}

// ── Wire shape ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPatchRequest {
    #[serde(default)]
    pub commit: RawCommit,
    #[serde(default)]
    pub commands: Vec<RawCommand>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommit {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub committer: Option<Signature>,
    #[serde(default)]
    pub author: Option<Signature>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RawCommand {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub set_field: Option<RawSetField>,
    #[serde(default)]
    pub create_file: Option<RawCreateFile>,
    #[serde(default)]
    pub delete_file: Option<RawDeleteFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSetField {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCreateFile {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeleteFile {}

// ── Validated form ───────────────────────────────────────────────

/// Commit metadata supplied with a request. Absent values fall back to the
/// service's configured defaults when the commit is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<Signature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Signature>,
}

/// What a command does to its file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandAction {
    /// Set the scalar(s) at `field`; with `create`, add missing keys.
    SetField {
        field: PathExpr,
        value: ScalarValue,
        create: bool,
    },
    /// Write a new file with exactly this content.
    CreateFile { content: String },
    /// Remove the file.
    DeleteFile {},
}

impl CommandAction {
    /// The wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            CommandAction::SetField { .. } => "setField",
            CommandAction::CreateFile { .. } => "createFile",
            CommandAction::DeleteFile {} => "deleteFile",
        }
    }
}

/// One instruction against one file, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchCommand {
    pub path: String,
    #[serde(flatten)]
    pub action: CommandAction,
}

/// A validated, ordered batch of commands applied as one commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    pub commit: CommitMetadata,
    pub commands: Vec<PatchCommand>,
}

impl PatchRequest {
    /// Decode and validate a JSON request body.
    pub fn from_json(body: &[u8]) -> Result<Self, ChangesetError> {
        let raw: RawPatchRequest = serde_json::from_slice(body)?;
        raw.validate()
    }

    /// Paths of all commands, in order, without duplicates.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            if !paths.contains(&command.path.as_str()) {
                paths.push(&command.path);
            }
        }
        paths
    }
}

impl RawPatchRequest {
    /// Check every request rule and produce the validated request. The first
    /// broken rule is reported, prefixed with where it was found.
    pub fn validate(self) -> Result<PatchRequest, ChangesetError> {
        let commit = self
            .commit
            .validate()
            .map_err(|e| ChangesetError::Invalid(format!("invalid 'commit': {e}")))?;

        if self.commands.is_empty() {
            return Err(ChangesetError::Invalid("no 'commands' given".into()));
        }
        let commands = self
            .commands
            .into_iter()
            .enumerate()
            .map(|(idx, command)| {
                command.validate().map_err(|e| {
                    ChangesetError::Invalid(format!("'commands[{idx}]' is invalid: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PatchRequest { commit, commands })
    }
}

impl RawCommit {
    fn validate(self) -> Result<CommitMetadata, String> {
        if let Some(committer) = &self.committer {
            committer
                .validate()
                .map_err(|e| format!("invalid 'committer': {e}"))?;
        }
        if let Some(author) = &self.author {
            author
                .validate()
                .map_err(|e| format!("invalid 'author': {e}"))?;
        }
        Ok(CommitMetadata {
            message: self.message.filter(|m| !m.trim().is_empty()),
            committer: self.committer,
            author: self.author,
        })
    }
}

impl RawCommand {
    fn validate(self) -> Result<PatchCommand, String> {
        if self.path.is_empty() {
            return Err("'path' must be set".into());
        }

        let set: Vec<&str> = [
            self.set_field.as_ref().map(|_| "'setField'"),
            self.create_file.as_ref().map(|_| "'createFile'"),
            self.delete_file.as_ref().map(|_| "'deleteFile'"),
        ]
        .into_iter()
        .flatten()
        .collect();
        match set.len() {
            0 => return Err("no command is set".into()),
            1 => {}
            _ => {
                return Err(format!(
                    "only one command can be set, but {} are specified",
                    set.join(", ")
                ))
            }
        }

        let action = if let Some(set_field) = self.set_field {
            set_field
                .validate()
                .map_err(|e| format!("invalid 'setField' command: {e}"))?
        } else if let Some(create_file) = self.create_file {
            CommandAction::CreateFile {
                content: create_file.content,
            }
        } else {
            CommandAction::DeleteFile {}
        };

        Ok(PatchCommand {
            path: self.path,
            action,
        })
    }
}

impl RawSetField {
    fn validate(self) -> Result<CommandAction, String> {
        if self.field.is_empty() {
            return Err("field must not be empty".into());
        }
        let field: PathExpr = self.field.parse().map_err(|e| format!("{e}"))?;
        let value = ScalarValue::try_from(&self.value).map_err(|e| format!("{e}"))?;
        Ok(CommandAction::SetField {
            field,
            value,
            create: self.create,
        })
    }
}
