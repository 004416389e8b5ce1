//! Project, conversation, and message persistence.
//!
//! Layout under the data root:
//!
//! ```text
//! <data>/projects.json                         project records
//! <data>/<id>/uploads/<filename>               raw user files
//! <data>/<id>/bm25.index/                      lexical index
//! <data>/<id>/vectors.{gob,json}               chunk + summary store
//! <data>/<id>/conversations/<cid>.meta.json    conversation record
//! <data>/<id>/conversations/<cid>.json         message list (JSON array)
//! ```
//!
//! All mutations run under the store's write lock; reads take the read
//! lock. Message append is read-modify-write on the list file.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Conversation, Message, Project, ProjectStatus};

pub struct ProjectStore {
    root: PathBuf,
    projects: RwLock<Vec<Project>>,
}

impl ProjectStore {
    /// Open the store at `root`, creating the directory and loading any
    /// existing `projects.json`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let index_path = root.join("projects.json");
        let projects = match std::fs::read(&index_path) {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        Ok(Self {
            root,
            projects: RwLock::new(projects),
        })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("projects.json")
    }

    fn persist(&self, projects: &[Project]) -> Result<()> {
        let data = serde_json::to_vec_pretty(projects)?;
        std::fs::write(self.index_path(), data)?;
        Ok(())
    }

    // ==================== Projects ====================

    pub fn create(&self, name: &str) -> Result<Project> {
        let mut projects = self.projects.write().unwrap();

        let id = Uuid::new_v4().to_string();
        let name = if name.is_empty() {
            format!("Project {}", &id[..8])
        } else {
            name.to_string()
        };

        let project = Project {
            id: id.clone(),
            name,
            created_at: Utc::now(),
            file_count: 0,
            chunk_count: 0,
            status: ProjectStatus::Upload,
        };

        std::fs::create_dir_all(self.uploads_dir(&id))?;
        std::fs::create_dir_all(self.conversations_dir(&id))?;

        projects.push(project.clone());
        self.persist(&projects)?;
        Ok(project)
    }

    pub fn list(&self) -> Vec<Project> {
        self.projects.read().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Result<Project> {
        self.projects
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("project {id}")))
    }

    /// Whole-record replacement keyed by id.
    pub fn update(&self, project: Project) -> Result<()> {
        let mut projects = self.projects.write().unwrap();
        let slot = projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or_else(|| EngineError::NotFound(format!("project {}", project.id)))?;
        *slot = project;
        self.persist(&projects)
    }

    /// Remove the record and the whole project directory tree.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut projects = self.projects.write().unwrap();
        let before = projects.len();
        projects.retain(|p| p.id != id);
        if projects.len() == before {
            return Err(EngineError::NotFound(format!("project {id}")));
        }

        let _ = std::fs::remove_dir_all(self.project_dir(id));
        self.persist(&projects)
    }

    // ==================== Paths ====================

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn uploads_dir(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("uploads")
    }

    pub fn bm25_dir(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("bm25.index")
    }

    pub fn vectors_path(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("vectors.json")
    }

    pub fn conversations_dir(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("conversations")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    // ==================== Conversations ====================

    pub fn create_conversation(&self, project_id: &str, name: &str) -> Result<Conversation> {
        self.get(project_id)?;
        let _write = self.projects.write().unwrap();

        let id = Uuid::new_v4().to_string();
        let name = if name.is_empty() {
            format!("Chat {}", &id[..8])
        } else {
            name.to_string()
        };

        let conversation = Conversation {
            id: id.clone(),
            project_id: project_id.to_string(),
            name,
            created_at: Utc::now(),
        };

        let dir = self.conversations_dir(project_id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join(format!("{id}.meta.json")),
            serde_json::to_vec_pretty(&conversation)?,
        )?;
        std::fs::write(dir.join(format!("{id}.json")), b"[]")?;

        Ok(conversation)
    }

    pub fn list_conversations(&self, project_id: &str) -> Vec<Conversation> {
        let _read = self.projects.read().unwrap();
        let dir = self.conversations_dir(project_id);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut conversations: Vec<Conversation> = entries
            .flatten()
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .ends_with(".meta.json")
            })
            .filter_map(|e| {
                let data = std::fs::read(e.path()).ok()?;
                serde_json::from_slice(&data).ok()
            })
            .collect();
        conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        conversations
    }

    pub fn get_conversation(&self, project_id: &str, conversation_id: &str) -> Result<Conversation> {
        let _read = self.projects.read().unwrap();
        let path = self
            .conversations_dir(project_id)
            .join(format!("{conversation_id}.meta.json"));
        let data = std::fs::read(path)
            .map_err(|_| EngineError::NotFound(format!("conversation {conversation_id}")))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        let _write = self.projects.write().unwrap();
        let path = self
            .conversations_dir(&conversation.project_id)
            .join(format!("{}.meta.json", conversation.id));
        std::fs::write(path, serde_json::to_vec_pretty(conversation)?)?;
        Ok(())
    }

    pub fn delete_conversation(&self, project_id: &str, conversation_id: &str) -> Result<()> {
        let _write = self.projects.write().unwrap();
        let dir = self.conversations_dir(project_id);
        let _ = std::fs::remove_file(dir.join(format!("{conversation_id}.meta.json")));
        let _ = std::fs::remove_file(dir.join(format!("{conversation_id}.json")));
        Ok(())
    }

    // ==================== Messages ====================

    pub fn load_messages(&self, project_id: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let _read = self.projects.read().unwrap();
        self.read_messages(project_id, conversation_id)
    }

    fn read_messages(&self, project_id: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let path = self
            .conversations_dir(project_id)
            .join(format!("{conversation_id}.json"));
        let data = std::fs::read(path)
            .map_err(|_| EngineError::NotFound(format!("conversation {conversation_id}")))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Append one message (read-modify-write on the list file).
    pub fn append_message(
        &self,
        project_id: &str,
        conversation_id: &str,
        message: Message,
    ) -> Result<()> {
        let _write = self.projects.write().unwrap();
        let mut messages = self
            .read_messages(project_id, conversation_id)
            .unwrap_or_default();
        messages.push(message);

        let path = self
            .conversations_dir(project_id)
            .join(format!("{conversation_id}.json"));
        std::fs::write(path, serde_json::to_vec_pretty(&messages)?)?;
        Ok(())
    }
}

/// Reject upload filenames that are not plain basenames. Any name that
/// differs from its basename (separators, `.`, `..`) is a traversal attempt.
pub fn validate_upload_name(name: &str) -> Result<()> {
    let is_basename = Path::new(name)
        .file_name()
        .map(|base| base == name)
        .unwrap_or(false);
    if name.is_empty() || !is_basename {
        return Err(EngineError::InvalidInput(format!("invalid filename: {name}")));
    }
    Ok(())
}
