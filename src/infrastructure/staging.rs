//! 下载暂存目录
//!
//! 每个 worker 独占一个暂存目录，浏览器把文件下载到这里，
//! 完成后再移动到产物目录并按车型重命名。

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// 浏览器下载中的临时后缀
const PARTIAL_SUFFIXES: [&str; 2] = [".crdownload", ".tmp"];

/// 暂存目录守卫，离开作用域时删除目录
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub async fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 清空目录中残留的文件
    pub async fn clear(&self) -> io::Result<()> {
        clear_dir(&self.path).await
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("已删除暂存目录: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除暂存目录失败 {}: {}", self.path.display(), e),
        }
    }
}

/// 是否是下载到一半的文件
pub fn is_partial_download(path: &Path) -> bool {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// 删除目录中的所有文件
pub async fn clear_dir(dir: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() {
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// 等待目录中出现一个下载完成的文件
///
/// 每秒检查一次，超时返回 `None`
pub async fn wait_for_completed_file(dir: &Path, timeout: Duration) -> io::Result<Option<PathBuf>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(path) = first_completed_file(dir).await? {
            return Ok(Some(path));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(Duration::from_secs(1)).await;
    }
}

async fn first_completed_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && !is_partial_download(&path) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// 把下载好的文件移动到产物目录，文件名为 `{key}{原扩展名}`
///
/// 同名文件会被覆盖
pub async fn move_artifact(downloaded: &Path, artifact_dir: &Path, key: &str) -> io::Result<PathBuf> {
    let file_name = match downloaded.extension() {
        Some(ext) => format!("{}.{}", key, ext.to_string_lossy()),
        None => key.to_string(),
    };
    fs::create_dir_all(artifact_dir).await?;
    let target = artifact_dir.join(file_name);

    if fs::try_exists(&target).await? {
        fs::remove_file(&target).await?;
    }

    // 跨文件系统时 rename 会失败，退回到复制 + 删除
    if fs::rename(downloaded, &target).await.is_err() {
        fs::copy(downloaded, &target).await?;
        fs::remove_file(downloaded).await?;
    }
    Ok(target)
}
