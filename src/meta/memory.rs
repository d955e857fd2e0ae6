//! In-memory metadata repository.
//!
//! Backs the integration tests and RAM-only shares. The tree is a flat
//! `file id → node` map; directories hold insertion-ordered `(name, id)`
//! pairs, never pointers, so there are no cyclic ownership issues. Handles
//! are exactly the 8-byte big-endian file id.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::xdr::nfs3;

use super::{
    validate_filename, AuthContext, ContentId, CreatePayload, DirEntry, FileHandle, MetaError,
    MetaResult, MetadataRepository,
};

/// Nominal size reported for directories.
const DIR_SIZE: u64 = 4096;
/// fsid reported for every object of this repository.
const MEMORY_FSID: u64 = 0xd1770;

/// Current wall clock as an NFS timestamp.
pub fn now() -> nfs3::nfstime3 {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    nfs3::nfstime3 {
        seconds: since_epoch.as_secs() as u32,
        nseconds: since_epoch.subsec_nanos(),
    }
}

#[derive(Debug)]
enum NodeKind {
    Regular {
        content_id: ContentId,
        /// Verifier of an EXCLUSIVE create, kept for idempotent retries.
        createverf: Option<nfs3::createverf3>,
    },
    Directory {
        children: Vec<(nfs3::filename3, u64)>,
        parent: u64,
    },
    Symlink {
        target: nfs3::nfspath3,
    },
    Special,
}

#[derive(Debug)]
struct Node {
    attrs: nfs3::fattr3,
    kind: NodeKind,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

struct Inner {
    next_id: u64,
    nodes: HashMap<u64, Node>,
}

/// Mutex-guarded in-memory tree satisfying [`MetadataRepository`].
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Creates a repository containing an empty, world-writable root.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let time = now();
        let root_id = 1;
        nodes.insert(
            root_id,
            Node {
                attrs: nfs3::fattr3 {
                    ftype: nfs3::ftype3::NF3DIR,
                    mode: 0o777,
                    nlink: 2,
                    uid: 0,
                    gid: 0,
                    size: DIR_SIZE,
                    used: DIR_SIZE,
                    rdev: nfs3::specdata3::default(),
                    fsid: MEMORY_FSID,
                    fileid: root_id,
                    atime: time,
                    mtime: time,
                    ctime: time,
                },
                kind: NodeKind::Directory { children: Vec::new(), parent: root_id },
            },
        );
        MemoryRepository { inner: Mutex::new(Inner { next_id: 2, nodes }) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("metadata repository lock poisoned")
    }
}

impl Inner {
    fn resolve(&self, handle: &FileHandle) -> MetaResult<u64> {
        let id = handle.file_id();
        if handle.as_bytes().len() != 8 || !self.nodes.contains_key(&id) {
            return Err(MetaError::StaleHandle);
        }
        Ok(id)
    }

    fn node(&self, id: u64) -> &Node {
        &self.nodes[&id]
    }

    fn node_mut(&mut self, id: u64) -> &mut Node {
        self.nodes.get_mut(&id).expect("node id resolved but missing")
    }

    fn dir_children(&self, id: u64) -> MetaResult<&Vec<(nfs3::filename3, u64)>> {
        match &self.node(id).kind {
            NodeKind::Directory { children, .. } => Ok(children),
            _ => Err(MetaError::NotDirectory),
        }
    }

    fn child_id(&self, dir: u64, name: &nfs3::filename3) -> MetaResult<u64> {
        self.dir_children(dir)?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or(MetaError::NotFound)
    }

    /// Bumps a directory's mtime/ctime after a child mutation.
    fn touch_dir(&mut self, id: u64) {
        let time = now();
        let attrs = &mut self.node_mut(id).attrs;
        attrs.mtime = time;
        attrs.ctime = time;
    }

    fn new_node_attrs(&mut self, ftype: nfs3::ftype3, attr: &nfs3::sattr3) -> nfs3::fattr3 {
        let id = self.next_id;
        self.next_id += 1;
        let time = now();
        let default_mode = match ftype {
            nfs3::ftype3::NF3DIR => 0o777,
            _ => 0o666,
        };
        let size = match ftype {
            nfs3::ftype3::NF3DIR => DIR_SIZE,
            _ => attr.size.unwrap_or(0),
        };
        nfs3::fattr3 {
            ftype,
            mode: attr.mode.unwrap_or(default_mode),
            nlink: if ftype == nfs3::ftype3::NF3DIR { 2 } else { 1 },
            uid: attr.uid.unwrap_or(0),
            gid: attr.gid.unwrap_or(0),
            size,
            used: size,
            rdev: nfs3::specdata3::default(),
            fsid: MEMORY_FSID,
            fileid: id,
            atime: match attr.atime {
                nfs3::set_atime::SET_TO_CLIENT_TIME(t) => t,
                _ => time,
            },
            mtime: match attr.mtime {
                nfs3::set_mtime::SET_TO_CLIENT_TIME(t) => t,
                _ => time,
            },
            ctime: time,
        }
    }

    fn insert_child(
        &mut self,
        dir: u64,
        name: &nfs3::filename3,
        attr: nfs3::sattr3,
        payload: CreatePayload,
    ) -> MetaResult<(FileHandle, nfs3::fattr3)> {
        validate_filename(name)?;
        if !self.node(dir).is_dir() {
            return Err(MetaError::NotDirectory);
        }
        if self.child_id(dir, name).is_ok() {
            return Err(MetaError::AlreadyExists);
        }

        let ftype = match &payload {
            CreatePayload::Regular => nfs3::ftype3::NF3REG,
            CreatePayload::Directory => nfs3::ftype3::NF3DIR,
            CreatePayload::Symlink(_) => nfs3::ftype3::NF3LNK,
            CreatePayload::Special(t, _) => *t,
        };
        let mut attrs = self.new_node_attrs(ftype, &attr);
        let id = attrs.fileid;
        let kind = match payload {
            CreatePayload::Regular => NodeKind::Regular {
                content_id: format!("mem-{id}"),
                createverf: None,
            },
            CreatePayload::Directory => NodeKind::Directory { children: Vec::new(), parent: dir },
            CreatePayload::Symlink(target) => {
                attrs.size = target.len() as u64;
                attrs.used = attrs.size;
                NodeKind::Symlink { target }
            }
            CreatePayload::Special(_, spec) => {
                attrs.rdev = spec;
                NodeKind::Special
            }
        };
        let is_dir = matches!(kind, NodeKind::Directory { .. });
        self.nodes.insert(id, Node { attrs, kind });

        if let NodeKind::Directory { children, .. } = &mut self.node_mut(dir).kind {
            children.push((name.clone(), id));
        }
        if is_dir {
            self.node_mut(dir).attrs.nlink += 1;
        }
        self.touch_dir(dir);
        Ok((FileHandle::from_file_id(id), self.node(id).attrs))
    }
}

#[async_trait]
impl MetadataRepository for MemoryRepository {
    fn root(&self) -> FileHandle {
        FileHandle::from_file_id(1)
    }

    async fn get_file(&self, handle: &FileHandle) -> MetaResult<nfs3::fattr3> {
        let inner = self.lock();
        let id = inner.resolve(handle)?;
        Ok(inner.node(id).attrs)
    }

    async fn get_child(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
    ) -> MetaResult<FileHandle> {
        let inner = self.lock();
        let dir_id = inner.resolve(dir)?;
        let id = inner.child_id(dir_id, name)?;
        Ok(FileHandle::from_file_id(id))
    }

    async fn get_parent(&self, dir: &FileHandle) -> MetaResult<FileHandle> {
        let inner = self.lock();
        let id = inner.resolve(dir)?;
        match &inner.node(id).kind {
            NodeKind::Directory { parent, .. } => Ok(FileHandle::from_file_id(*parent)),
            _ => Err(MetaError::NotDirectory),
        }
    }

    async fn get_children(&self, dir: &FileHandle) -> MetaResult<Vec<DirEntry>> {
        let inner = self.lock();
        let dir_id = inner.resolve(dir)?;
        let children = inner.dir_children(dir_id)?;
        Ok(children
            .iter()
            .map(|(name, id)| DirEntry {
                name: name.clone(),
                handle: FileHandle::from_file_id(*id),
                attrs: inner.node(*id).attrs,
            })
            .collect())
    }

    async fn add_file_to_directory(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
        attr: nfs3::sattr3,
        payload: CreatePayload,
    ) -> MetaResult<(FileHandle, nfs3::fattr3)> {
        let mut inner = self.lock();
        let dir_id = inner.resolve(dir)?;
        inner.insert_child(dir_id, name, attr, payload)
    }

    async fn create_exclusive(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
        verifier: nfs3::createverf3,
    ) -> MetaResult<(FileHandle, nfs3::fattr3)> {
        let mut inner = self.lock();
        let dir_id = inner.resolve(dir)?;
        validate_filename(name)?;

        if let Ok(existing) = inner.child_id(dir_id, name) {
            // A retry of the same create must succeed with the same object.
            return match &inner.node(existing).kind {
                NodeKind::Regular { createverf: Some(v), .. } if *v == verifier => {
                    debug!(fileid = existing, "exclusive create replay");
                    Ok((FileHandle::from_file_id(existing), inner.node(existing).attrs))
                }
                _ => Err(MetaError::AlreadyExists),
            };
        }

        let (handle, attrs) =
            inner.insert_child(dir_id, name, nfs3::sattr3::default(), CreatePayload::Regular)?;
        if let NodeKind::Regular { createverf, .. } = &mut inner.node_mut(attrs.fileid).kind {
            *createverf = Some(verifier);
        }
        Ok((handle, attrs))
    }

    async fn delete_child(&self, dir: &FileHandle, name: &nfs3::filename3) -> MetaResult<()> {
        let mut inner = self.lock();
        let dir_id = inner.resolve(dir)?;
        let child = inner.child_id(dir_id, name)?;

        let child_is_dir = match &inner.node(child).kind {
            NodeKind::Directory { children, .. } => {
                if !children.is_empty() {
                    return Err(MetaError::NotEmpty);
                }
                true
            }
            _ => false,
        };

        if let NodeKind::Directory { children, .. } = &mut inner.node_mut(dir_id).kind {
            children.retain(|(n, _)| n != name);
        }
        if child_is_dir {
            inner.node_mut(dir_id).attrs.nlink -= 1;
        }
        let time = now();
        let child_attrs = &mut inner.node_mut(child).attrs;
        child_attrs.nlink = child_attrs.nlink.saturating_sub(1);
        child_attrs.ctime = time;
        inner.touch_dir(dir_id);
        Ok(())
    }

    async fn delete_file(&self, handle: &FileHandle) -> MetaResult<()> {
        let mut inner = self.lock();
        // Orphan-safe: deleting an object that is already gone is a no-op.
        if let Ok(id) = inner.resolve(handle) {
            inner.nodes.remove(&id);
        }
        Ok(())
    }

    async fn set_attrs(
        &self,
        handle: &FileHandle,
        new: nfs3::sattr3,
    ) -> MetaResult<nfs3::fattr3> {
        let mut inner = self.lock();
        let id = inner.resolve(handle)?;
        if new.size.is_some() && !matches!(inner.node(id).kind, NodeKind::Regular { .. }) {
            return Err(MetaError::IsDirectory);
        }

        let time = now();
        let attrs = &mut inner.node_mut(id).attrs;
        if let Some(mode) = new.mode {
            attrs.mode = mode & 0o7777;
        }
        if let Some(uid) = new.uid {
            attrs.uid = uid;
        }
        if let Some(gid) = new.gid {
            attrs.gid = gid;
        }
        if let Some(size) = new.size {
            attrs.size = size;
            attrs.used = size;
            attrs.mtime = time;
        }
        match new.atime {
            nfs3::set_atime::DONT_CHANGE => {}
            nfs3::set_atime::SET_TO_SERVER_TIME => attrs.atime = time,
            nfs3::set_atime::SET_TO_CLIENT_TIME(t) => attrs.atime = t,
        }
        match new.mtime {
            nfs3::set_mtime::DONT_CHANGE => {}
            nfs3::set_mtime::SET_TO_SERVER_TIME => attrs.mtime = time,
            nfs3::set_mtime::SET_TO_CLIENT_TIME(t) => attrs.mtime = t,
        }
        attrs.ctime = time;
        Ok(*attrs)
    }

    async fn check_access(
        &self,
        handle: &FileHandle,
        auth: &AuthContext,
        requested: u32,
    ) -> MetaResult<u32> {
        let inner = self.lock();
        let id = inner.resolve(handle)?;
        let attrs = inner.node(id).attrs;

        if auth.is_root() {
            return Ok(requested);
        }

        let shift = if auth.uid == Some(attrs.uid) {
            6
        } else if auth.in_group(attrs.gid) {
            3
        } else {
            0
        };
        let bits = (attrs.mode >> shift) & 0o7;

        let mut allowed = 0;
        if bits & 0o4 != 0 {
            allowed |= nfs3::ACCESS3_READ;
        }
        if bits & 0o2 != 0 {
            allowed |= nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND | nfs3::ACCESS3_DELETE;
        }
        if bits & 0o1 != 0 {
            allowed |= nfs3::ACCESS3_EXECUTE | nfs3::ACCESS3_LOOKUP;
        }
        Ok(requested & allowed)
    }

    async fn rename(
        &self,
        from_dir: &FileHandle,
        from_name: &nfs3::filename3,
        to_dir: &FileHandle,
        to_name: &nfs3::filename3,
    ) -> MetaResult<()> {
        validate_filename(from_name)?;
        validate_filename(to_name)?;
        let mut inner = self.lock();
        let from_id = inner.resolve(from_dir)?;
        let to_id = inner.resolve(to_dir)?;
        let moved = inner.child_id(from_id, from_name)?;
        let moved_is_dir = inner.node(moved).is_dir();

        if let Ok(existing) = inner.child_id(to_id, to_name) {
            if existing == moved {
                return Ok(());
            }
            match (&inner.node(existing).kind, moved_is_dir) {
                (NodeKind::Directory { children, .. }, true) => {
                    if !children.is_empty() {
                        return Err(MetaError::NotEmpty);
                    }
                }
                (NodeKind::Directory { .. }, false) => return Err(MetaError::IsDirectory),
                (_, true) => return Err(MetaError::NotDirectory),
                (_, false) => {}
            }
            // Replace the destination: unlink it and drop the orphan.
            let existing_is_dir = inner.node(existing).is_dir();
            if let NodeKind::Directory { children, .. } = &mut inner.node_mut(to_id).kind {
                children.retain(|(n, _)| n != to_name);
            }
            let nlink_after = {
                let attrs = &mut inner.node_mut(existing).attrs;
                attrs.nlink = attrs.nlink.saturating_sub(1);
                attrs.nlink
            };
            if nlink_after == 0 || existing_is_dir {
                if existing_is_dir {
                    inner.node_mut(to_id).attrs.nlink -= 1;
                }
                inner.nodes.remove(&existing);
            }
        }

        if let NodeKind::Directory { children, .. } = &mut inner.node_mut(from_id).kind {
            children.retain(|(n, _)| n != from_name);
        }
        if let NodeKind::Directory { children, .. } = &mut inner.node_mut(to_id).kind {
            children.push((to_name.clone(), moved));
        }
        if moved_is_dir && from_id != to_id {
            inner.node_mut(from_id).attrs.nlink -= 1;
            inner.node_mut(to_id).attrs.nlink += 1;
            if let NodeKind::Directory { parent, .. } = &mut inner.node_mut(moved).kind {
                *parent = to_id;
            }
        }
        inner.node_mut(moved).attrs.ctime = now();
        inner.touch_dir(from_id);
        if from_id != to_id {
            inner.touch_dir(to_id);
        }
        Ok(())
    }

    async fn link(
        &self,
        file: &FileHandle,
        dir: &FileHandle,
        name: &nfs3::filename3,
    ) -> MetaResult<nfs3::fattr3> {
        validate_filename(name)?;
        let mut inner = self.lock();
        let file_id = inner.resolve(file)?;
        let dir_id = inner.resolve(dir)?;
        if inner.node(file_id).is_dir() {
            return Err(MetaError::IsDirectory);
        }
        if !inner.node(dir_id).is_dir() {
            return Err(MetaError::NotDirectory);
        }
        if inner.child_id(dir_id, name).is_ok() {
            return Err(MetaError::AlreadyExists);
        }
        if let NodeKind::Directory { children, .. } = &mut inner.node_mut(dir_id).kind {
            children.push((name.clone(), file_id));
        }
        inner.touch_dir(dir_id);
        let attrs = &mut inner.node_mut(file_id).attrs;
        attrs.nlink += 1;
        attrs.ctime = now();
        Ok(*attrs)
    }

    async fn read_symlink(&self, handle: &FileHandle) -> MetaResult<nfs3::nfspath3> {
        let inner = self.lock();
        let id = inner.resolve(handle)?;
        match &inner.node(id).kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(MetaError::InvalidArgument),
        }
    }

    async fn content_id(&self, handle: &FileHandle) -> MetaResult<ContentId> {
        let inner = self.lock();
        let id = inner.resolve(handle)?;
        match &inner.node(id).kind {
            NodeKind::Regular { content_id, .. } => Ok(content_id.clone()),
            NodeKind::Directory { .. } => Err(MetaError::IsDirectory),
            _ => Err(MetaError::InvalidArgument),
        }
    }
}
