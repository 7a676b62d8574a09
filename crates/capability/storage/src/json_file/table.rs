//! 单个 JSON 文件对应的一张表

use crate::error::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// 以字符串为键的有序表，每次写入后整体落盘。
///
/// 写入先在副本上修改，落盘成功后才替换内存状态，失败时内存与文件保持一致。
pub(crate) struct JsonTable<T> {
    path: PathBuf,
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T> JsonTable<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// 打开 `<dir>/<name>.json`；文件不存在时为空表。
    pub(crate) async fn open(dir: &Path, name: &str) -> Result<Self, StorageError> {
        let path = dir.join(format!("{name}.json"));
        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    pub(crate) async fn read<R>(&self, f: impl FnOnce(&BTreeMap<String, T>) -> R) -> R {
        let rows = self.rows.read().await;
        f(&rows)
    }

    pub(crate) async fn write<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, T>) -> R,
    ) -> Result<R, StorageError> {
        let mut rows = self.rows.write().await;
        let mut next = rows.clone();
        let result = f(&mut next);
        self.persist(&next).await?;
        *rows = next;
        Ok(result)
    }

    // 先写临时文件再 rename，避免进程中断留下半个文件
    async fn persist(&self, rows: &BTreeMap<String, T>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(rows)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
