// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::DecisionLogError;
use crate::keyed::KeyedMutex;
use crate::transaction::{DecisionRecord, TransactionId, MAX_TRANSACTION_ID_LEN};

use super::DecisionLog;

const RECORD_EXTENSION: &str = "decision";
const DONE_EXTENSION: &str = "done";
const TEMP_SUFFIX: &str = ".tmp";

/// A decision log stored as files in a single directory.
///
/// Each transaction has its own record file, named by the hex encoding of its id, and a DONE
/// marker file once complete. Files are written under a temporary name, synced, then renamed
/// into place, so after a crash a record is either fully present or absent. Writes for one
/// transaction are serialized; writes for different transactions proceed independently.
pub struct FileDecisionLog {
    dir: PathBuf,
    locks: KeyedMutex<TransactionId, ()>,
}

impl FileDecisionLog {
    /// Opens the log in `dir`, creating the directory if needed and discarding temporary files
    /// left by interrupted writes.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, DecisionLogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| write_error(&dir, err))?;

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|err| read_error(&dir, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| read_error(&dir, err))?
        {
            let path = entry.path();
            if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                debug!("Removing incomplete decision log file {}", path.display());
                fs::remove_file(&path)
                    .await
                    .map_err(|err| write_error(&path, err))?;
            }
        }

        Ok(FileDecisionLog {
            dir,
            locks: KeyedMutex::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &TransactionId, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hex::encode(id.as_str()), extension))
    }

    async fn write_durably(&self, path: &Path, bytes: &[u8]) -> Result<(), DecisionLogError> {
        let temp = PathBuf::from(format!("{}{}", path.display(), TEMP_SUFFIX));

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|err| write_error(&temp, err))?;
        file.write_all(bytes)
            .await
            .map_err(|err| write_error(&temp, err))?;
        file.sync_all()
            .await
            .map_err(|err| write_error(&temp, err))?;
        drop(file);

        fs::rename(&temp, path)
            .await
            .map_err(|err| write_error(path, err))?;

        // The rename is only durable once the directory entry is.
        fs::File::open(&self.dir)
            .await
            .map_err(|err| write_error(&self.dir, err))?
            .sync_all()
            .await
            .map_err(|err| write_error(&self.dir, err))
    }

    async fn locked<T, F, Fut>(&self, id: &TransactionId, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.locks.get_or_insert_with(id.clone(), || ());
        let result = {
            let _guard = slot.lock().await;
            work().await
        };
        drop(slot);
        self.locks.remove_idle(id);
        result
    }
}

async fn exists(path: &Path) -> Result<bool, DecisionLogError> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(read_error(path, err)),
    }
}

fn write_error(path: &Path, err: io::Error) -> DecisionLogError {
    DecisionLogError::Write(format!("{}: {}", path.display(), err))
}

fn read_error(path: &Path, err: io::Error) -> DecisionLogError {
    DecisionLogError::Read(format!("{}: {}", path.display(), err))
}

fn decode_file_stem(path: &Path) -> Option<TransactionId> {
    let stem = path.file_stem()?.to_str()?;
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok().map(TransactionId::from)
}

#[async_trait]
impl DecisionLog for FileDecisionLog {
    async fn append(&self, record: DecisionRecord) -> Result<(), DecisionLogError> {
        let id = record.transaction_id.clone();
        if id.as_str().len() > MAX_TRANSACTION_ID_LEN {
            return Err(DecisionLogError::Write(format!(
                "transaction id is longer than {} bytes",
                MAX_TRANSACTION_ID_LEN
            )));
        }
        let path = self.path(&id, RECORD_EXTENSION);
        let bytes = serde_json::to_vec(&record).map_err(|err| {
            DecisionLogError::Write(format!("unable to encode record for {}: {}", id, err))
        })?;

        self.locked(&id, || async {
            if exists(&path).await? {
                return Err(DecisionLogError::DuplicateDecision(id.clone()));
            }
            self.write_durably(&path, &bytes).await
        })
        .await
    }

    async fn read(&self, id: &TransactionId) -> Result<Option<DecisionRecord>, DecisionLogError> {
        let path = self.path(id, RECORD_EXTENSION);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(read_error(&path, err)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| DecisionLogError::Read(format!("{}: {}", path.display(), err)))
    }

    async fn mark_done(&self, id: &TransactionId) -> Result<(), DecisionLogError> {
        let record_path = self.path(id, RECORD_EXTENSION);
        let done_path = self.path(id, DONE_EXTENSION);

        self.locked(id, || async {
            if !exists(&record_path).await? {
                return Err(DecisionLogError::Write(format!(
                    "no decision recorded for transaction {}",
                    id
                )));
            }
            if exists(&done_path).await? {
                return Ok(());
            }
            self.write_durably(&done_path, &[]).await
        })
        .await
    }

    async fn is_done(&self, id: &TransactionId) -> Result<bool, DecisionLogError> {
        exists(&self.path(id, DONE_EXTENSION)).await
    }

    async fn scan_incomplete(&self) -> Result<Vec<TransactionId>, DecisionLogError> {
        let mut incomplete = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|err| read_error(&self.dir, err))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| read_error(&self.dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let id = match decode_file_stem(&path) {
                Some(id) => id,
                None => {
                    warn!(
                        "Ignoring unrecognized file in decision log: {}",
                        path.display()
                    );
                    continue;
                }
            };

            if !exists(&self.path(&id, DONE_EXTENSION)).await? {
                incomplete.push(id);
            }
        }

        incomplete.sort();
        Ok(incomplete)
    }
}
