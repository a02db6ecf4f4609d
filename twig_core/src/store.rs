//! Content store and object I/O.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader, ObjectType};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compression threshold: blobs >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// Config format version written by `init`.
const CONFIG_VERSION: &str = "1";

/// The on-disk object store inside a repository directory.
///
/// Blobs live under `objects/{algorithm}/` and commits under `commits/`, both
/// sharded by the first byte of their hash. Objects are immutable once written.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    algorithm: Algorithm,
}

impl Store {
    /// Initialize a new store at the given path.
    ///
    /// Creates the directory structure:
    /// - `objects/blake3-256/` for blobs
    /// - `commits/` for commit records
    /// - `branches/` for branch records
    /// - `config` file with version and algorithm
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;
        fs::create_dir_all(root.join("commits"))?;
        fs::create_dir_all(root.join("branches"))?;

        let config_content = format!("version={}\nalgo={}\n", CONFIG_VERSION, algorithm.as_str());
        write_atomic(&root.join("config"), config_content.as_bytes())?;

        debug!(root = %root.display(), algo = algorithm.as_str(), "initialized store");
        Ok(Self { root, algorithm })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(Error::NotInitialized);
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&config_content)?;

        for dir in [
            root.join("objects").join(algorithm.as_str()),
            root.join("commits"),
            root.join("branches"),
        ] {
            if !dir.is_dir() {
                return Err(Error::invalid_store(
                    &root,
                    format!("missing directory {}", dir.display()),
                ));
            }
        }

        Ok(Self { root, algorithm })
    }

    /// Parse the config file to extract the algorithm.
    ///
    /// Keys this layer does not own (branch, user identity) are skipped.
    fn parse_config(content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for (key, value) in config_entries(content) {
            match key {
                "version" => version = Some(value),
                "algo" => algo = Some(value),
                _ => {}
            }
        }

        if version != Some(CONFIG_VERSION) {
            return Err(Error::invalid_format(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_format("Missing algo in config"))?;
        Algorithm::parse(algo_str)
    }

    /// Path to a blob file: `objects/{algorithm}/{prefix}/{suffix}`.
    pub fn blob_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("objects")
            .join(self.algorithm.as_str())
            .join(hash.prefix())
            .join(hash.suffix())
    }

    /// Path to a commit file: `commits/{prefix}/{suffix}`.
    pub fn commit_path(&self, id: &Hash) -> PathBuf {
        self.root
            .join("commits")
            .join(id.prefix())
            .join(id.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Store a blob and return its content hash.
    ///
    /// Idempotent: storing bytes that are already present is a no-op.
    /// Blobs >= 4KB are zstd-compressed on disk.
    pub fn put_blob(&self, data: &[u8]) -> Result<Hash> {
        let hash = Hash::hash_bytes(data);
        let path = self.blob_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        let (payload, compression) = if data.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(data)?, CompressionType::Zstd)
        } else {
            (data.to_vec(), CompressionType::None)
        };

        self.write_object(&path, ObjectType::Blob, compression, &payload)?;
        debug!(hash = %hash.short(), bytes = data.len(), "stored blob");
        Ok(hash)
    }

    /// Whether a blob with this hash has been stored.
    pub fn has_blob(&self, hash: &Hash) -> bool {
        self.blob_path(hash).exists()
    }

    /// Retrieve a blob by hash.
    pub fn get_blob(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.read_object(&self.blob_path(hash), ObjectType::Blob, hash)
    }

    /// Store an encoded commit under its id. Commits are small and never compressed.
    pub(crate) fn put_commit_payload(&self, id: &Hash, payload: &[u8]) -> Result<()> {
        let path = self.commit_path(id);
        if path.exists() {
            return Ok(());
        }
        self.write_object(&path, ObjectType::Commit, CompressionType::None, payload)
    }

    /// Read and verify an encoded commit.
    pub(crate) fn get_commit_payload(&self, id: &Hash) -> Result<Vec<u8>> {
        self.read_object(&self.commit_path(id), ObjectType::Commit, id)
    }

    /// List the ids of every stored commit, in no particular order.
    pub fn commit_ids(&self) -> Result<Vec<Hash>> {
        let mut ids = Vec::new();
        for shard in fs::read_dir(self.root.join("commits"))? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().into_owned();
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                // Leftover temp files from an interrupted write do not parse.
                if let Ok(id) = Hash::from_hex(&format!("{}{}", prefix, name)) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Write an object atomically using tempfile.
    fn write_object(
        &self,
        path: &Path,
        object_type: ObjectType,
        compression: CompressionType,
        payload: &[u8],
    ) -> Result<()> {
        let header = ObjectHeader::new(
            object_type,
            self.algorithm,
            compression,
            payload.len() as u64,
        );

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        write_atomic(path, &bytes)
    }

    /// Read an object file, check its type and verify it hashes to `hash`.
    fn read_object(&self, path: &Path, expected: ObjectType, hash: &Hash) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(Error::object_not_found(hash.to_hex()));
        }

        let mut file = fs::File::open(path)?;
        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)
            .map_err(|e| Error::corrupted_object(path, format!("Unreadable header: {}", e)))?;
        let header = ObjectHeader::decode(&header_buf)?;

        if header.object_type != expected {
            return Err(Error::invalid_object_type(
                expected.as_str(),
                header.object_type.as_str(),
            ));
        }

        let mut stored = Vec::new();
        file.read_to_end(&mut stored)?;
        if stored.len() as u64 != header.payload_len {
            return Err(Error::corrupted_object(
                path,
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    header.payload_len,
                    stored.len()
                ),
            ));
        }

        let payload = match header.compression {
            CompressionType::None => stored,
            CompressionType::Zstd => decompress_zstd(&stored)?,
        };

        let computed = Hash::hash_bytes(&payload);
        if computed != *hash {
            return Err(Error::corrupted_object(
                path,
                format!(
                    "Hash mismatch: expected {}, got {}",
                    hash.to_hex(),
                    computed.to_hex()
                ),
            ));
        }

        Ok(payload)
    }
}

/// Iterate `key=value` pairs of a config file, skipping blanks and `#` comments.
pub(crate) fn config_entries(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        line.split_once('=').map(|(k, v)| (k.trim(), v.trim()))
    })
}

/// Replace `path` with `bytes` through a temp file in the same directory.
///
/// Readers see either the old content or the new one, never a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::invalid_store(path, "path has no parent directory"))?;
    fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.persist(path)?;

    Ok(())
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}
