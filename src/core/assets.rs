//! 資產打包：把本機目錄壓成 zip，並以內容雜湊作為上傳的物件 key。
//!
//! 雜湊只涵蓋相對路徑與檔案內容，不含 zip 的時間戳記，所以同一份目錄
//! 每次合成都得到同一個 key。

use crate::domain::model::AssetSource;
use crate::utils::error::{Result, StackError};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Clone)]
pub struct PackagedAsset {
    pub id: String,
    pub source: String,
    pub hash: String,
    pub file_count: usize,
    pub archive: Vec<u8>,
}

impl PackagedAsset {
    /// 資產 bucket 中的物件 key
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    /// 輸出目錄中的檔名
    pub fn file_name(&self) -> String {
        format!("asset.{}.zip", self.hash)
    }
}

/// 讀取目錄下所有檔案並打包
pub async fn package_directory(asset: &AssetSource) -> Result<PackagedAsset> {
    let root = Path::new(&asset.path);

    // 驗證來源目錄存在
    let metadata = tokio::fs::metadata(root)
        .await
        .map_err(|e| asset_error(asset, e.to_string()))?;
    if !metadata.is_dir() {
        return Err(asset_error(asset, "not a directory".to_string()));
    }

    let mut listing = collect_files(root)
        .await
        .map_err(|e| asset_error(asset, e.to_string()))?;
    listing.sort_by(|a, b| a.0.cmp(&b.0));

    let mut files = Vec::with_capacity(listing.len());
    for (name, path) in listing {
        let data = tokio::fs::read(&path).await?;
        files.push((name, data));
    }

    if files.is_empty() {
        tracing::warn!("Asset {} at {} contains no files", asset.id, asset.path);
    }

    let (hash, archive) = pack_files(&files)?;
    tracing::debug!(
        "Packaged asset {} ({} files, {} bytes) as {}",
        asset.id,
        files.len(),
        archive.len(),
        hash
    );

    Ok(PackagedAsset {
        id: asset.id.clone(),
        source: asset.path.clone(),
        hash,
        file_count: files.len(),
        archive,
    })
}

/// `files` must already be sorted by name.
fn pack_files(files: &[(String, Vec<u8>)]) -> Result<(String, Vec<u8>)> {
    let mut hasher = Sha256::new();
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for (name, data) in files {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update((data.len() as u64).to_be_bytes());
        hasher.update(data);

        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }

    let cursor = zip.finish()?;
    Ok((hex::encode(hasher.finalize()), cursor.into_inner()))
}

/// 遞迴列出檔案，名稱一律以 `/` 分隔
async fn collect_files(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }

    Ok(files)
}

fn asset_error(asset: &AssetSource, message: String) -> StackError {
    StackError::AssetError {
        asset: asset.id.clone(),
        path: asset.path.clone(),
        message,
    }
}
