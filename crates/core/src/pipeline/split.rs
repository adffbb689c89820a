//! Byte-range file splitting for payloads above the channel ceiling.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_BUF_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("invalid part limit: {0}")]
    InvalidLimit(u64),

    #[error("source has no file name: {0}")]
    UnnamedSource(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plan the byte ranges for splitting `total` bytes into parts of at most
/// `limit` bytes. Every byte lands in exactly one part; only the last part
/// may be short.
pub fn plan_parts(total: u64, limit: u64) -> Result<Vec<(u64, u64)>, SplitError> {
    if limit == 0 {
        return Err(SplitError::InvalidLimit(limit));
    }
    let mut parts = Vec::new();
    let mut offset = 0u64;
    while offset < total {
        let len = limit.min(total - offset);
        parts.push((offset, len));
        offset += len;
    }
    Ok(parts)
}

/// Split `input` into numbered part files next to each other in `out_dir`.
///
/// Parts are named `{file_name}.NNN` starting at 001, matching what common
/// join tools expect. Returns the part paths in order.
pub async fn split_file(
    input: &Path,
    out_dir: &Path,
    limit: u64,
) -> Result<Vec<PathBuf>, SplitError> {
    let file_name = input
        .file_name()
        .ok_or_else(|| SplitError::UnnamedSource(input.to_path_buf()))?
        .to_string_lossy()
        .to_string();

    let total = tokio::fs::metadata(input).await?.len();
    let ranges = plan_parts(total, limit)?;
    tokio::fs::create_dir_all(out_dir).await?;

    let mut source = File::open(input).await?;
    let mut buf = vec![0u8; COPY_BUF_BYTES];
    let mut paths = Vec::with_capacity(ranges.len());

    for (idx, (_, len)) in ranges.iter().enumerate() {
        let part_path = out_dir.join(format!("{}.{:03}", file_name, idx + 1));
        let mut part = File::create(&part_path).await?;

        let mut remaining = *len as usize;
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            let read = source.read(&mut buf[..chunk]).await?;
            if read == 0 {
                return Err(SplitError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "source file shrank during split",
                )));
            }
            part.write_all(&buf[..read]).await?;
            remaining -= read;
        }
        part.flush().await?;
        paths.push(part_path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plan_covers_every_byte_once() {
        let parts = plan_parts(10, 3).unwrap();
        assert_eq!(parts, vec![(0, 3), (3, 3), (6, 3), (9, 1)]);
        let total: u64 = parts.iter().map(|(_, len)| len).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn plan_exact_multiple_has_no_empty_tail() {
        let parts = plan_parts(9, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|(_, len)| *len == 3));
    }

    #[test]
    fn plan_under_limit_is_one_part() {
        assert_eq!(plan_parts(5, 100).unwrap(), vec![(0, 5)]);
    }

    #[test]
    fn plan_of_empty_file_is_empty() {
        assert!(plan_parts(0, 100).unwrap().is_empty());
    }

    #[test]
    fn plan_part_count_is_ceiling_division() {
        // 5 GiB at a 2 GiB ceiling makes exactly three parts.
        let gib = 1024u64 * 1024 * 1024;
        let parts = plan_parts(5 * gib, 2 * gib).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].1, gib);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(plan_parts(10, 0), Err(SplitError::InvalidLimit(0))));
    }

    #[tokio::test]
    async fn split_produces_rejoinable_parts() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.bin");
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        tokio::fs::write(&input, &payload).await.unwrap();

        let parts = split_file(&input, dir.path(), 300).await.unwrap();
        assert_eq!(parts.len(), 4);
        assert!(parts[0].ends_with("data.bin.001"));

        let mut rejoined = Vec::new();
        for part in &parts {
            rejoined.extend(tokio::fs::read(part).await.unwrap());
        }
        assert_eq!(rejoined, payload);
    }

    #[tokio::test]
    async fn split_part_sizes_respect_limit() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.bin");
        tokio::fs::write(&input, vec![7u8; 250]).await.unwrap();

        let parts = split_file(&input, dir.path(), 100).await.unwrap();
        let sizes: Vec<u64> = {
            let mut sizes = Vec::new();
            for p in &parts {
                sizes.push(tokio::fs::metadata(p).await.unwrap().len());
            }
            sizes
        };
        assert_eq!(sizes, vec![100, 100, 50]);
    }
}
