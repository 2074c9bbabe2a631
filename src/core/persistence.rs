//! JSON 文件持久化
//!
//! 队列、演进日志、技能开关都以「整文件重写」方式落盘；写入先落到同目录临时文件再 rename，
//! 避免进程中途退出留下半截文件。
//!
//! 运行期路径使用 `*_async` 版本（tokio::fs），同步版本只在启动加载与测试中使用。

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::{CataError, Result};

/// 单个 JSON 文件：load 读取（不存在时返回 None），save 原子覆盖
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取并反序列化；文件不存在时返回 Ok(None)
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// 序列化为带缩进的 JSON，写临时文件后 rename 覆盖目标；父目录不存在时自动创建
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let data = serde_json::to_string_pretty(value)?;
        write_atomic(&self.path, data.as_bytes())
    }

    /// [`JsonFile::load`] 的异步版本
    pub async fn load_async<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// [`JsonFile::save`] 的异步版本
    pub async fn save_async<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let data = serde_json::to_string_pretty(value)?;
        write_atomic_async(&self.path, data.into_bytes()).await
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

/// 原子写：同目录临时文件 + rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// [`write_atomic`] 的异步版本
pub async fn write_atomic_async(path: &Path, bytes: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// 在阻塞线程池中执行同步文件操作（目录遍历等 tokio::fs 不覆盖的场景）
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CataError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("missing.json"));
        let loaded: Option<HashMap<String, bool>> = file.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("nested/state.json"));
        let mut value = HashMap::new();
        value.insert("a".to_string(), true);
        file.save(&value).unwrap();

        let loaded: HashMap<String, bool> = file.load().unwrap().unwrap();
        assert_eq!(loaded, value);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_async_save_overwrites_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("deep/queue.json"));
        assert!(file.load_async::<Vec<u32>>().await.unwrap().is_none());

        file.save_async(&vec![1u32, 2]).await.unwrap();
        file.save_async(&vec![3u32]).await.unwrap();
        assert_eq!(file.load_async::<Vec<u32>>().await.unwrap(), Some(vec![3]));
        // 同步与异步读到同一份内容
        assert_eq!(file.load::<Vec<u32>>().unwrap(), Some(vec![3]));
    }

    #[tokio::test]
    async fn test_blocking_propagates_result() {
        let n = blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(n, 42);
        let err = blocking::<(), _>(|| Err(CataError::TaskNotFound("x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, CataError::TaskNotFound(_)));
    }
}
