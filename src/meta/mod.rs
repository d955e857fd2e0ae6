//! Metadata repository interface: the tree of names, handles and
//! attributes behind the NFS procedures.
//!
//! A repository owns everything except file content: handle-keyed
//! attributes, directory children, access evaluation and the handle ↔
//! content-id mapping the cache layer needs. Any implementation of
//! [`MetadataRepository`] is substitutable (in-memory, embedded KV, remote
//! service) and is responsible for its own locking: every trait method is
//! atomic from the handler's point of view.
//!
//! Errors use the abstract [`MetaError`] taxonomy; handlers translate it to
//! protocol status codes via the [`nfsstat3`] conversion so repositories
//! never depend on wire details.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::xdr::nfs3;

pub mod memory;

pub use memory::MemoryRepository;

/// Shortest acceptable handle: the big-endian file id prefix.
pub const MIN_HANDLE_LEN: usize = 8;
/// Longest acceptable handle (NFSv3 protocol limit).
pub const MAX_HANDLE_LEN: usize = nfs3::NFS3_FHSIZE as usize;

/// Result alias used by every repository operation.
pub type MetaResult<T> = Result<T, MetaError>;

/// Stable identifier of a file's byte content, independent of its handle
/// and of any name. Keys the slice cache and the content store.
pub type ContentId = String;

/// Abstract failure taxonomy of the metadata layer.
///
/// Handlers map these onto NFS status codes; unknown conditions surface as
/// [`MetaError::Io`] and map conservatively to `NFS3ERR_IO`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    #[error("object not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("operation requires ownership or privilege")]
    PermissionDenied,
    #[error("not a directory")]
    NotDirectory,
    #[error("is a directory")]
    IsDirectory,
    #[error("name already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("no space left")]
    NoSpace,
    #[error("repository is read-only")]
    ReadOnly,
    #[error("stale file handle")]
    StaleHandle,
    #[error("malformed file handle")]
    InvalidHandle,
    #[error("operation not supported")]
    NotSupported,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("object temporarily locked")]
    Locked,
    #[error("privileged operation")]
    PrivilegeRequired,
    #[error("name too long")]
    NameTooLong,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("authentication required")]
    AuthRequired,
}

impl From<&MetaError> for nfs3::nfsstat3 {
    fn from(e: &MetaError) -> nfs3::nfsstat3 {
        use nfs3::nfsstat3::*;
        match e {
            MetaError::NotFound => NFS3ERR_NOENT,
            MetaError::AccessDenied | MetaError::PermissionDenied => NFS3ERR_ACCES,
            MetaError::AuthRequired => NFS3ERR_ACCES,
            MetaError::NotDirectory => NFS3ERR_NOTDIR,
            MetaError::IsDirectory => NFS3ERR_ISDIR,
            MetaError::AlreadyExists => NFS3ERR_EXIST,
            MetaError::NotEmpty => NFS3ERR_NOTEMPTY,
            MetaError::NoSpace => NFS3ERR_NOSPC,
            MetaError::ReadOnly => NFS3ERR_ROFS,
            MetaError::StaleHandle => NFS3ERR_STALE,
            MetaError::InvalidHandle => NFS3ERR_BADHANDLE,
            MetaError::NotSupported => NFS3ERR_NOTSUPP,
            MetaError::Locked => NFS3ERR_JUKEBOX,
            MetaError::PrivilegeRequired => NFS3ERR_PERM,
            MetaError::NameTooLong => NFS3ERR_NAMETOOLONG,
            MetaError::InvalidArgument => NFS3ERR_INVAL,
            MetaError::Io(_) => NFS3ERR_IO,
        }
    }
}

impl From<MetaError> for nfs3::nfsstat3 {
    fn from(e: MetaError) -> nfs3::nfsstat3 {
        (&e).into()
    }
}

/// Opaque, stable identifier of a filesystem object within a share.
///
/// 8 to 64 bytes; the first 8 bytes are always interpretable as the
/// big-endian file id reported in attributes. Handles are byte-stable for
/// the lifetime of the object, and removing then recreating a name yields a
/// fresh handle.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(Vec<u8>);

impl FileHandle {
    /// Wraps raw handle bytes, enforcing the length bounds.
    pub fn new(data: Vec<u8>) -> Result<Self, MetaError> {
        if data.len() < MIN_HANDLE_LEN || data.len() > MAX_HANDLE_LEN {
            return Err(MetaError::InvalidHandle);
        }
        Ok(FileHandle(data))
    }

    /// Validates a wire handle; too short or too long is `BADHANDLE`.
    pub fn from_wire(fh: &nfs3::nfs_fh3) -> Result<Self, nfs3::nfsstat3> {
        Self::new(fh.data.clone()).map_err(|_| nfs3::nfsstat3::NFS3ERR_BADHANDLE)
    }

    /// Handle carrying exactly the 8-byte big-endian file id.
    pub fn from_file_id(id: u64) -> Self {
        FileHandle(id.to_be_bytes().to_vec())
    }

    /// The file id encoded in the first 8 bytes.
    pub fn file_id(&self) -> u64 {
        let mut prefix = [0_u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The wire representation of this handle.
    pub fn to_wire(&self) -> nfs3::nfs_fh3 {
        nfs3::nfs_fh3 { data: self.0.clone() }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fh:{:#018x}", self.file_id())
    }
}

/// Caller identity attached to every request.
///
/// AUTH_NONE leaves the ids absent; AUTH_UNIX fills uid, gid and up to 16
/// supplementary gids. A GSS-established identity arrives in the same
/// shape, so everything downstream treats flavors uniformly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub flavor: crate::xdr::rpc::auth_flavor,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub gids: Vec<u32>,
}

impl AuthContext {
    /// Identity-free context for AUTH_NONE callers.
    pub fn anonymous() -> Self {
        AuthContext::default()
    }

    /// Context built from a parsed AUTH_UNIX credential body.
    pub fn from_unix(cred: &crate::xdr::rpc::auth_unix) -> Self {
        AuthContext {
            flavor: crate::xdr::rpc::auth_flavor::AUTH_UNIX,
            uid: Some(cred.uid),
            gid: Some(cred.gid),
            gids: cred.gids.clone(),
        }
    }

    /// Whether the caller presented any identity at all.
    pub fn is_authenticated(&self) -> bool {
        self.uid.is_some()
    }

    /// Whether the caller is the superuser.
    pub fn is_root(&self) -> bool {
        self.uid == Some(0)
    }

    /// Whether `gid` is the caller's primary or a supplementary group.
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == Some(gid) || self.gids.contains(&gid)
    }
}

/// One directory child: name, handle and full attributes.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: nfs3::filename3,
    pub handle: FileHandle,
    pub attrs: nfs3::fattr3,
}

/// What kind of object a create operation should materialize.
#[derive(Clone, Debug)]
pub enum CreatePayload {
    Regular,
    Directory,
    Symlink(nfs3::nfspath3),
    Special(nfs3::ftype3, nfs3::specdata3),
}

/// Checks a pathname component against the directory naming rules: not
/// empty, no NUL or `/`, not `"."` or `".."` (those are synthesized by
/// LOOKUP and READDIR), at most 255 bytes.
pub fn validate_filename(name: &nfs3::filename3) -> MetaResult<()> {
    if name.is_empty() || name.as_ref() == b"." || name.as_ref() == b".." {
        return Err(MetaError::InvalidArgument);
    }
    if name.len() > nfs3::NFS3_MAXNAMLEN {
        return Err(MetaError::NameTooLong);
    }
    if name.as_ref().iter().any(|&b| b == 0 || b == b'/') {
        return Err(MetaError::InvalidArgument);
    }
    Ok(())
}

/// Handle-keyed metadata operations consumed by the NFS handlers.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Handle of the share root.
    fn root(&self) -> FileHandle;

    /// Full attributes of an object.
    async fn get_file(&self, handle: &FileHandle) -> MetaResult<nfs3::fattr3>;

    /// Resolves one name inside a directory.
    async fn get_child(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
    ) -> MetaResult<FileHandle>;

    /// Parent directory of `dir`; the root is its own parent.
    async fn get_parent(&self, dir: &FileHandle) -> MetaResult<FileHandle>;

    /// All children of a directory in insertion order.
    async fn get_children(&self, dir: &FileHandle) -> MetaResult<Vec<DirEntry>>;

    /// Creates an object and links it under `name`.
    async fn add_file_to_directory(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
        attr: nfs3::sattr3,
        payload: CreatePayload,
    ) -> MetaResult<(FileHandle, nfs3::fattr3)>;

    /// Idempotent exclusive create: succeeds again for the same verifier,
    /// fails with `AlreadyExists` for a different one.
    async fn create_exclusive(
        &self,
        dir: &FileHandle,
        name: &nfs3::filename3,
        verifier: nfs3::createverf3,
    ) -> MetaResult<(FileHandle, nfs3::fattr3)>;

    /// Unlinks `name` from the directory. Refuses to unlink a non-empty
    /// directory with `NotEmpty`. The object itself survives until
    /// [`delete_file`](Self::delete_file) once its last link is gone.
    async fn delete_child(&self, dir: &FileHandle, name: &nfs3::filename3) -> MetaResult<()>;

    /// Destroys an object record. Only called after the last directory
    /// link is removed; deleting an already-gone object is not an error.
    async fn delete_file(&self, handle: &FileHandle) -> MetaResult<()>;

    /// Applies the set attributes and returns the result.
    async fn set_attrs(
        &self,
        handle: &FileHandle,
        new: nfs3::sattr3,
    ) -> MetaResult<nfs3::fattr3>;

    /// Evaluates the requested ACCESS3_* bitmap for the caller and returns
    /// the granted subset. Never fails on a mere permission mismatch.
    async fn check_access(
        &self,
        handle: &FileHandle,
        auth: &AuthContext,
        requested: u32,
    ) -> MetaResult<u32>;

    /// Atomically moves `from_dir/from_name` to `to_dir/to_name`.
    /// An existing destination is replaced; a destination directory must
    /// be empty.
    async fn rename(
        &self,
        from_dir: &FileHandle,
        from_name: &nfs3::filename3,
        to_dir: &FileHandle,
        to_name: &nfs3::filename3,
    ) -> MetaResult<()>;

    /// Adds a hard link to an existing non-directory object.
    async fn link(
        &self,
        file: &FileHandle,
        dir: &FileHandle,
        name: &nfs3::filename3,
    ) -> MetaResult<nfs3::fattr3>;

    /// Target path of a symbolic link.
    async fn read_symlink(&self, handle: &FileHandle) -> MetaResult<nfs3::nfspath3>;

    /// Content identifier of a regular file, the cache and store key.
    async fn content_id(&self, handle: &FileHandle) -> MetaResult<ContentId>;
}
