//! Chunks and chunk groups
//!
//! Both live in one arena and refer to each other by index. Chunk groups
//! form a graph (an async chunk group can be the child of several parents),
//! so every traversal tracks what it has visited.

use std::collections::HashSet;

use super::{ModuleId, RuntimeId};

pub type ChunkId = usize;
pub type ChunkGroupId = usize;

/// A set of modules emitted together
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: Option<String>,

    /// `None` until ids are assigned
    pub runtime_id: Option<RuntimeId>,

    /// Emitted files, relative to the compilation output
    pub files: Vec<String>,

    pub modules: Vec<ModuleId>,

    /// Modules the chunk starts executing from
    pub entry_modules: Vec<ModuleId>,
}

impl Chunk {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            runtime_id: None,
            files: Vec::new(),
            modules: Vec::new(),
            entry_modules: Vec::new(),
        }
    }
}

/// Chunks loaded together, plus the groups they can load on demand
#[derive(Debug, Clone, Default)]
pub struct ChunkGroup {
    pub name: Option<String>,
    pub chunks: Vec<ChunkId>,
    pub children: Vec<ChunkGroupId>,
}

/// Everything a chunk-group walk touched, in first-visit order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkGroupWalk {
    pub groups: Vec<ChunkGroupId>,
    pub chunks: Vec<ChunkId>,
}

#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
    groups: Vec<ChunkGroup>,
}

impl ChunkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> ChunkId {
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    pub fn add_group(&mut self, name: Option<String>, chunks: Vec<ChunkId>) -> ChunkGroupId {
        self.groups.push(ChunkGroup {
            name,
            chunks,
            children: Vec::new(),
        });
        self.groups.len() - 1
    }

    pub fn add_child(&mut self, parent: ChunkGroupId, child: ChunkGroupId) {
        if let Some(group) = self.groups.get_mut(parent) {
            if !group.children.contains(&child) {
                group.children.push(child);
            }
        }
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(id)
    }

    pub fn group(&self, id: ChunkGroupId) -> Option<&ChunkGroup> {
        self.groups.get(id)
    }

    /// Group whose name matches, if any
    pub fn find_group(&self, name: &str) -> Option<ChunkGroupId> {
        self.groups.iter().position(|group| group.name.as_deref() == Some(name))
    }

    pub fn chunks(&self) -> impl Iterator<Item = (ChunkId, &Chunk)> {
        self.chunks.iter().enumerate()
    }

    /// Files of a group's own chunks, without duplicates
    pub fn group_files(&self, id: ChunkGroupId) -> Vec<String> {
        let mut seen = HashSet::new();
        self.group(id)
            .into_iter()
            .flat_map(|group| group.chunks.iter())
            .filter_map(|&chunk| self.chunk(chunk))
            .flat_map(|chunk| chunk.files.iter())
            .filter(|file| seen.insert(file.as_str()))
            .cloned()
            .collect()
    }

    /// Walk a group, its chunks and every descendant group.
    ///
    /// Uses an explicit stack so deep graphs cannot overflow; each group
    /// and chunk is visited once even when shared by several parents.
    pub fn walk(&self, start: ChunkGroupId) -> ChunkGroupWalk {
        let mut walk = ChunkGroupWalk::default();
        let mut seen_groups = HashSet::new();
        let mut seen_chunks = HashSet::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            if !seen_groups.insert(id) {
                continue;
            }
            let Some(group) = self.group(id) else { continue };
            walk.groups.push(id);

            for &chunk in &group.chunks {
                if seen_chunks.insert(chunk) {
                    walk.chunks.push(chunk);
                }
            }
            // Reversed so children are visited in declaration order
            stack.extend(group.children.iter().rev().copied());
        }

        walk
    }
}
