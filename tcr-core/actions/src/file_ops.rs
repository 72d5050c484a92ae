//! 文件与目录操作步骤

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tcr_executor::{ActionOutcome, StepAction, StepDetails};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{params, Result};

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;
const HASH_CHUNK_SIZE: usize = 4096;

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// 按 4 KiB 分块计算文件 MD5
async fn md5_file(path: &Path) -> Result<md5::Digest> {
    let mut reader = BufReader::new(tokio::fs::File::open(path).await?);
    let mut context = md5::Context::new();
    let mut chunk = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        context.consume(&chunk[..read]);
    }

    Ok(context.compute())
}

/// 目标为已有目录时，落到目录内同名文件
async fn resolve_destination(source: &Path, destination: &Path) -> PathBuf {
    if is_dir(destination).await {
        if let Some(name) = source.file_name() {
            return destination.join(name);
        }
    }
    destination.to_path_buf()
}

/// 复制文件
///
/// 参数: `from_files` (列表) 或 `from` (逗号分隔)，`to`
pub struct CopyFile;

impl CopyFile {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let mut sources = params::list(details, "from_files");
        if sources.is_empty() {
            sources = params::list(details, "from");
        }
        let destination = params::text(details, "to");

        if sources.is_empty() {
            return Ok(ActionOutcome::fail("No source files specified"));
        }
        if destination.is_empty() {
            return Ok(ActionOutcome::fail("No destination path specified"));
        }

        let destination = PathBuf::from(destination);
        let mut passed = true;
        let mut lines = Vec::with_capacity(sources.len());

        for source in &sources {
            let source_path = Path::new(source);
            if !is_file(source_path).await {
                passed = false;
                lines.push(format!("Source file not found: {}", source));
                continue;
            }

            let target = resolve_destination(source_path, &destination).await;
            tokio::fs::copy(source_path, &target).await?;
            debug!("已复制 {} -> {}", source, target.display());
            lines.push(format!("Copied '{}' to '{}'", source, destination.display()));
        }

        let message = lines.join("\n");
        Ok(if passed {
            ActionOutcome::pass(message)
        } else {
            ActionOutcome::fail(message)
        })
    }
}

#[async_trait]
impl StepAction for CopyFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 移动文件或目录
///
/// 参数: `from_path`, `to_path`
pub struct MoveFile;

impl MoveFile {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let source = params::text(details, "from_path");
        let destination = params::text(details, "to_path");
        let source_path = Path::new(&source);

        if source.is_empty() || !exists(source_path).await {
            return Ok(ActionOutcome::fail(format!(
                "Source does not exist: {}",
                source
            )));
        }

        let destination_path = Path::new(&destination);
        let target = resolve_destination(source_path, destination_path).await;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ActionOutcome::fail(format!("Move failed: {}", e)));
            }
        }

        match tokio::fs::rename(source_path, &target).await {
            Ok(()) => {
                info!("已移动 {} -> {}", source, target.display());
                Ok(ActionOutcome::pass(format!(
                    "Successfully moved {} to {}",
                    source, destination
                )))
            }
            Err(e) => Ok(ActionOutcome::fail(format!("Move failed: {}", e))),
        }
    }
}

#[async_trait]
impl StepAction for MoveFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 删除文件或目录
///
/// 参数: `path`, `recursive_var` (目录是否递归删除)
pub struct DeleteFile;

impl DeleteFile {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let path = params::text(details, "path");
        let recursive = params::flag(details, "recursive_var", false);
        let target = Path::new(&path);

        if path.is_empty() || !exists(target).await {
            return Ok(ActionOutcome::fail(format!("Path does not exist: {}", path)));
        }

        let (result, message) = if is_dir(target).await {
            if recursive {
                (
                    tokio::fs::remove_dir_all(target).await,
                    format!("Successfully deleted directory: {}", path),
                )
            } else {
                (
                    tokio::fs::remove_dir(target).await,
                    format!("Successfully deleted empty directory: {}", path),
                )
            }
        } else {
            (
                tokio::fs::remove_file(target).await,
                format!("Successfully deleted file: {}", path),
            )
        };

        Ok(match result {
            Ok(()) => ActionOutcome::pass(message),
            Err(e) => ActionOutcome::fail(format!("Delete failed: {}", e)),
        })
    }
}

#[async_trait]
impl StepAction for DeleteFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 重命名
///
/// 参数: `old_path`, `new_path`
pub struct RenameFile;

impl RenameFile {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let old_path = params::text(details, "old_path");
        let new_path = params::text(details, "new_path");

        if old_path.is_empty() || !exists(Path::new(&old_path)).await {
            return Ok(ActionOutcome::fail(format!(
                "Source does not exist: {}",
                old_path
            )));
        }
        if exists(Path::new(&new_path)).await {
            return Ok(ActionOutcome::fail(format!(
                "Destination already exists: {}",
                new_path
            )));
        }

        Ok(match tokio::fs::rename(&old_path, &new_path).await {
            Ok(()) => ActionOutcome::pass(format!(
                "Successfully renamed {} to {}",
                old_path, new_path
            )),
            Err(e) => ActionOutcome::fail(format!("Rename failed: {}", e)),
        })
    }
}

#[async_trait]
impl StepAction for RenameFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 创建目录
///
/// 参数: `path`, `create_parents_var` (默认 true)
pub struct CreateDirectory;

impl CreateDirectory {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let path = params::text(details, "path");
        let create_parents = params::flag(details, "create_parents_var", true);

        if path.is_empty() {
            return Ok(ActionOutcome::fail("No directory path specified"));
        }
        if exists(Path::new(&path)).await {
            return Ok(ActionOutcome::pass(format!(
                "Directory already exists: {}",
                path
            )));
        }

        let result = if create_parents {
            tokio::fs::create_dir_all(&path).await
        } else {
            tokio::fs::create_dir(&path).await
        };

        Ok(match result {
            Ok(()) => ActionOutcome::pass(format!("Successfully created directory: {}", path)),
            Err(e) => ActionOutcome::fail(format!("Create directory failed: {}", e)),
        })
    }
}

#[async_trait]
impl StepAction for CreateDirectory {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 检查路径是否存在
///
/// 参数: `path`, `should_exist` (`Yes` / `No`，默认 `Yes`)
pub struct CheckFileExists;

#[async_trait]
impl StepAction for CheckFileExists {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        let path = params::text(details, "path");
        let should_exist = params::optional_text(details, "should_exist")
            .map_or(true, |v| v == "Yes");
        let target = Path::new(&path);
        let found = !path.is_empty() && exists(target).await;

        Ok(match (should_exist, found) {
            (true, true) => {
                let kind = if is_dir(target).await {
                    "directory"
                } else {
                    "file"
                };
                ActionOutcome::pass(format!("Path exists ({}): {}", kind, path))
            }
            (true, false) => ActionOutcome::fail(format!("Path does not exist: {}", path)),
            (false, false) => {
                ActionOutcome::pass(format!("Path does not exist (as expected): {}", path))
            }
            (false, true) => ActionOutcome::fail(format!("Path exists (unexpected): {}", path)),
        })
    }
}

/// 比较两个文件
///
/// 参数: `file1`, `file2`, `method` (`checksum` / `content` / `size`，默认 `checksum`)
pub struct CompareFiles;

impl CompareFiles {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let first = params::text(details, "file1");
        let second = params::text(details, "file2");
        let method = params::optional_text(details, "method").unwrap_or_else(|| "checksum".into());

        if !is_file(Path::new(&first)).await {
            return Ok(ActionOutcome::fail(format!(
                "First file does not exist: {}",
                first
            )));
        }
        if !is_file(Path::new(&second)).await {
            return Ok(ActionOutcome::fail(format!(
                "Second file does not exist: {}",
                second
            )));
        }

        let outcome = match method.as_str() {
            "size" => {
                let size1 = tokio::fs::metadata(&first).await?.len();
                let size2 = tokio::fs::metadata(&second).await?.len();
                if size1 == size2 {
                    ActionOutcome::pass(format!("Files have same size: {} bytes", size1))
                } else {
                    ActionOutcome::fail(format!(
                        "Files have different sizes: {} vs {} bytes",
                        size1, size2
                    ))
                }
            }
            "checksum" => {
                let hash1 = md5_file(Path::new(&first)).await?;
                let hash2 = md5_file(Path::new(&second)).await?;
                if hash1 == hash2 {
                    ActionOutcome::pass(format!("Files are identical (MD5: {:x})", hash1))
                } else {
                    ActionOutcome::fail(format!(
                        "Files are different (MD5: {:x} vs {:x})",
                        hash1, hash2
                    ))
                }
            }
            "content" => {
                let content1 = tokio::fs::read(&first).await?;
                let content2 = tokio::fs::read(&second).await?;
                if content1 == content2 {
                    ActionOutcome::pass(format!(
                        "Files have identical content ({} bytes)",
                        content1.len()
                    ))
                } else {
                    ActionOutcome::fail("Files have different content")
                }
            }
            other => ActionOutcome::fail(format!("Unknown comparison method: {}", other)),
        };

        Ok(outcome)
    }
}

#[async_trait]
impl StepAction for CompareFiles {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 等待文件出现或消失
///
/// 参数: `file_path`, `timeout` (秒，默认 60)，
/// `should_exist` (`File to Appear` 表示等待出现，其他值表示等待消失)
pub struct WaitForFile;

impl WaitForFile {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let path = params::text(details, "file_path");
        let appear = params::optional_text(details, "should_exist")
            .map_or(true, |v| v == "File to Appear");
        let timeout = params::number(details, "timeout", Some(DEFAULT_WAIT_TIMEOUT_SECS))
            .ok_or_else(|| {
                crate::ActionError::InvalidParameter(format!(
                    "timeout: {}",
                    params::text(details, "timeout")
                ))
            })?;

        let target = Path::new(&path);
        let started = Instant::now();
        let limit = Duration::from_secs(timeout);

        loop {
            let found = !path.is_empty() && exists(target).await;
            let elapsed = started.elapsed();

            if appear && found {
                return Ok(ActionOutcome::pass(format!(
                    "File appeared after {:.2}s: {}",
                    elapsed.as_secs_f64(),
                    path
                )));
            }
            if !appear && !found {
                return Ok(ActionOutcome::pass(format!(
                    "File disappeared after {:.2}s: {}",
                    elapsed.as_secs_f64(),
                    path
                )));
            }
            if elapsed >= limit {
                let verb = if appear { "appear" } else { "disappear" };
                return Ok(ActionOutcome::fail(format!(
                    "Timeout: File did not {} within {}s: {}",
                    verb, timeout, path
                )));
            }

            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl StepAction for WaitForFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 支持的归档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// 按文件扩展名识别
    fn detect(path: &str) -> Option<Self> {
        if path.ends_with(".zip") {
            Some(Self::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "zip" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "tar.gz" => Some(Self::TarGz),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::Tar | Self::TarGz => "TAR",
        }
    }

    /// 同步解压，在阻塞线程池中调用
    fn extract(self, archive: &Path, destination: &Path) -> std::io::Result<()> {
        let file = std::fs::File::open(archive)?;
        match self {
            Self::Zip => zip::ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(destination))
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
            Self::Tar => tar::Archive::new(file).unpack(destination),
            Self::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(destination),
        }
    }
}

/// 解压归档文件
///
/// 参数: `archive_path`, `extract_to`, `archive_type` (`auto` / `zip` / `tar` / `tar.gz`)
pub struct ExtractArchive;

#[async_trait]
impl StepAction for ExtractArchive {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        let archive = params::text(details, "archive_path");
        let extract_to = params::text(details, "extract_to");
        let archive_type =
            params::optional_text(details, "archive_type").unwrap_or_else(|| "auto".into());

        if archive.is_empty() || !is_file(Path::new(&archive)).await {
            return Ok(ActionOutcome::fail(format!(
                "Archive does not exist: {}",
                archive
            )));
        }

        if let Err(e) = tokio::fs::create_dir_all(&extract_to).await {
            return Ok(ActionOutcome::fail(format!("Extract archive failed: {}", e)));
        }

        let kind = if archive_type == "auto" {
            match ArchiveKind::detect(&archive) {
                Some(kind) => kind,
                None => {
                    return Ok(ActionOutcome::fail(format!(
                        "Unknown archive type for: {}",
                        archive
                    )))
                }
            }
        } else {
            match ArchiveKind::parse(&archive_type) {
                Some(kind) => kind,
                None => {
                    return Ok(ActionOutcome::fail(format!(
                        "Unsupported archive type: {}",
                        archive_type
                    )))
                }
            }
        };

        debug!("解压 {} ({:?}) -> {}", archive, kind, extract_to);

        let source = PathBuf::from(&archive);
        let destination = PathBuf::from(&extract_to);
        let result =
            tokio::task::spawn_blocking(move || kind.extract(&source, &destination)).await;

        Ok(match result {
            Ok(Ok(())) => {
                info!("已解压 {} -> {}", archive, extract_to);
                ActionOutcome::pass(format!(
                    "Successfully extracted {} archive to: {}",
                    kind.label(),
                    extract_to
                ))
            }
            Ok(Err(e)) => ActionOutcome::fail(format!("Extract archive failed: {}", e)),
            Err(e) => ActionOutcome::fail(format!("Extract archive failed: {}", e)),
        })
    }
}
