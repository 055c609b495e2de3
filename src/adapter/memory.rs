//! In-memory storage adapter

use crate::adapter::{guess_mime_type, StorageAdapter, WriteOptions};
use crate::error::AdapterError;
use crate::item::FilesystemItem;
use crate::path;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Node {
    File { contents: Vec<u8>, last_modified: i64 },
    Directory { last_modified: i64 },
}

impl Node {
    fn last_modified(&self) -> i64 {
        match self {
            Node::File { last_modified, .. } | Node::Directory { last_modified } => *last_modified,
        }
    }
}

/// Storage adapter keeping the whole tree in a sorted map
///
/// Parent directories are created implicitly on write.
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    nodes: RwLock<BTreeMap<String, Node>>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the modification time of an existing node.
    pub fn set_last_modified(&self, path: &str, timestamp: i64) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(path) {
            Some(Node::File { last_modified, .. }) | Some(Node::Directory { last_modified }) => {
                *last_modified = timestamp;
                Ok(())
            }
            None => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, file_path: &str) -> Result<(), AdapterError> {
        for ancestor in path::ancestors(file_path) {
            match nodes.get(ancestor) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(AdapterError::NotADirectory(ancestor.to_string()))
                }
                None => {
                    nodes.insert(
                        ancestor.to_string(),
                        Node::Directory {
                            last_modified: now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn to_item(node_path: &str, node: &Node) -> FilesystemItem {
        match node {
            Node::File {
                contents,
                last_modified,
            } => FilesystemItem::file(node_path)
                .with_last_modified(Some(*last_modified))
                .with_file_size(Some(contents.len() as u64))
                .with_mime_type(guess_mime_type(node_path)),
            Node::Directory { last_modified } => {
                FilesystemItem::directory(node_path).with_last_modified(Some(*last_modified))
            }
        }
    }
}

impl StorageAdapter for InMemoryAdapter {
    fn file_exists(&self, path: &str) -> Result<bool, AdapterError> {
        Ok(matches!(self.nodes.read().get(path), Some(Node::File { .. })))
    }

    fn directory_exists(&self, path: &str) -> Result<bool, AdapterError> {
        if path.is_empty() {
            return Ok(true);
        }
        Ok(matches!(
            self.nodes.read().get(path),
            Some(Node::Directory { .. })
        ))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, AdapterError> {
        match self.nodes.read().get(path) {
            Some(Node::File { contents, .. }) => Ok(contents.clone()),
            _ => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    fn write(&self, path: &str, contents: &[u8], _options: &WriteOptions) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        if let Some(Node::Directory { .. }) = nodes.get(path) {
            return Err(AdapterError::AlreadyExists(path.to_string()));
        }
        Self::ensure_parents(&mut nodes, path)?;
        nodes.insert(
            path.to_string(),
            Node::File {
                contents: contents.to_vec(),
                last_modified: now(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            _ => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    fn delete_directory(&self, path: &str) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        if !path.is_empty() && !matches!(nodes.get(path), Some(Node::Directory { .. })) {
            return Err(AdapterError::NotFound(path.to_string()));
        }
        nodes.retain(|key, _| !(path::is_within(key, path)));
        Ok(())
    }

    fn create_directory(&self, path: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(AdapterError::AlreadyExists(path.to_string())),
            None => {
                Self::ensure_parents(&mut nodes, path)?;
                nodes.insert(
                    path.to_string(),
                    Node::Directory {
                        last_modified: now(),
                    },
                );
                Ok(())
            }
        }
    }

    fn copy(&self, source: &str, destination: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        let contents = match nodes.get(source) {
            Some(Node::File { contents, .. }) => contents.clone(),
            _ => return Err(AdapterError::NotFound(source.to_string())),
        };
        Self::ensure_parents(&mut nodes, destination)?;
        nodes.insert(
            destination.to_string(),
            Node::File {
                contents,
                last_modified: now(),
            },
        );
        Ok(())
    }

    fn rename(&self, source: &str, destination: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(source) {
            return Err(AdapterError::NotFound(source.to_string()));
        }
        if nodes.contains_key(destination) {
            return Err(AdapterError::AlreadyExists(destination.to_string()));
        }
        Self::ensure_parents(&mut nodes, destination)?;

        let moved: Vec<(String, Node)> = nodes
            .iter()
            .filter(|(key, _)| path::is_within(key, source))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        for (key, node) in moved {
            nodes.remove(&key);
            let rest = path::strip_prefix(&key, source).unwrap_or_default();
            nodes.insert(path::join(destination, rest), node);
        }
        Ok(())
    }

    fn last_modified(&self, path: &str) -> Result<Option<i64>, AdapterError> {
        self.nodes
            .read()
            .get(path)
            .map(|node| Some(node.last_modified()))
            .ok_or_else(|| AdapterError::NotFound(path.to_string()))
    }

    fn file_size(&self, path: &str) -> Result<u64, AdapterError> {
        match self.nodes.read().get(path) {
            Some(Node::File { contents, .. }) => Ok(contents.len() as u64),
            _ => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    fn mime_type(&self, path: &str) -> Result<Option<String>, AdapterError> {
        match self.nodes.read().get(path) {
            Some(Node::File { .. }) => Ok(guess_mime_type(path)),
            _ => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    fn list_contents(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, AdapterError> {
        let nodes = self.nodes.read();
        if let Some(Node::File { .. }) = nodes.get(path) {
            return Err(AdapterError::NotADirectory(path.to_string()));
        }
        Ok(nodes
            .iter()
            .filter(|(key, _)| key.as_str() != path && path::is_within(key, path))
            .filter(|(key, _)| deep || path::is_direct_child(key, path))
            .map(|(key, node)| Self::to_item(key, node))
            .collect())
    }
}
