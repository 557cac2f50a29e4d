// SPDX-License-Identifier: Apache-2.0

use crate::config::InsightsConfig;
use crate::InsightsError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uidai_insights_model::{DatasetKind, YearScope};

/// Every transient download is created with this file-name prefix; the
/// stale sweep only ever touches files carrying it.
pub const TEMP_FILE_PREFIX: &str = "uidai-agg-";

const SPLIT_DIR: &str = "split_data";

/// A readable dataset file. Transient sources are removed when released or
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct ResolvedSource {
    path: PathBuf,
    transient: Option<TempPath>,
}

impl ResolvedSource {
    #[must_use]
    pub fn local(path: PathBuf) -> Self {
        Self {
            path,
            transient: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient.is_some()
    }

    pub fn release(self) {
        if let Some(temp) = self.transient {
            match temp.close() {
                Ok(()) => debug!(path = %self.path.display(), "removed transient dataset"),
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove transient dataset"
                ),
            }
        }
    }
}

pub struct SourceResolver {
    local_roots: Vec<PathBuf>,
    remote_base_url: Option<String>,
    temp_root: PathBuf,
    temp_max_age: Duration,
    client: reqwest::Client,
}

impl SourceResolver {
    pub fn new(cfg: &InsightsConfig) -> Result<Self, InsightsError> {
        // Bounds connection setup and each idle gap between body reads;
        // there is no total deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.download_timeout)
            .read_timeout(cfg.download_timeout)
            .build()
            .map_err(|e| InsightsError::internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            local_roots: cfg.local_roots.clone(),
            remote_base_url: cfg
                .remote_base_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| u.trim_end_matches('/').to_string()),
            temp_root: cfg.temp_root.clone(),
            temp_max_age: cfg.temp_max_age,
            client,
        })
    }

    /// Local paths probed for `(kind, scope)`, in priority order. Year files
    /// are looked up in the split directory first.
    #[must_use]
    pub fn local_candidates(&self, kind: DatasetKind, scope: YearScope) -> Vec<PathBuf> {
        let file_name = scope.file_name(kind);
        let mut out = Vec::with_capacity(self.local_roots.len() * 2);
        for root in &self.local_roots {
            if scope.is_year_specific() {
                out.push(root.join(SPLIT_DIR).join(&file_name));
            }
            out.push(root.join(&file_name));
        }
        out
    }

    #[must_use]
    pub fn remote_url(&self, kind: DatasetKind, scope: YearScope) -> Option<String> {
        self.remote_base_url
            .as_ref()
            .map(|base| format!("{base}/{}", scope.file_name(kind)))
    }

    #[instrument(name = "source_resolve", skip_all, fields(dataset = %kind, scope = %scope))]
    pub async fn resolve(
        &self,
        kind: DatasetKind,
        scope: YearScope,
    ) -> Result<ResolvedSource, InsightsError> {
        self.sweep_stale_temp_files().await;
        for candidate in self.local_candidates(kind, scope) {
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|m| m.is_file())
            {
                info!(path = %candidate.display(), "using local dataset");
                return Ok(ResolvedSource::local(candidate));
            }
        }
        let Some(url) = self.remote_url(kind, scope) else {
            return Err(InsightsError::resolution(format!(
                "no local copy of {} and no remote archive configured",
                scope.file_name(kind)
            )));
        };
        self.download(&url).await
    }

    async fn download(&self, url: &str) -> Result<ResolvedSource, InsightsError> {
        let temp_root = self.temp_root.clone();
        let temp = tokio::task::spawn_blocking(move || create_transient_file(&temp_root))
            .await
            .map_err(|e| InsightsError::internal(format!("temp file task failed: {e}")))??;
        let (file, temp_path) = temp.into_parts();
        let path = temp_path.to_path_buf();
        let mut out = tokio::fs::File::from_std(file);
        info!(url, path = %path.display(), "downloading dataset");

        let streamed = self.stream_to(url, &mut out).await;
        drop(out);
        match streamed {
            Ok(bytes) => {
                info!(url, bytes, "download complete");
                Ok(ResolvedSource {
                    path,
                    transient: Some(temp_path),
                })
            }
            Err(e) => {
                warn!(url, error = %e, "download aborted");
                if let Err(rm) = temp_path.close() {
                    warn!(path = %path.display(), error = %rm, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    async fn stream_to(&self, url: &str, out: &mut tokio::fs::File) -> Result<u64, InsightsError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InsightsError::resolution(format!("download failed url={url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(InsightsError::resolution(format!(
                "download failed status={} url={url}",
                resp.status()
            )));
        }
        let mut written = 0_u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| InsightsError::resolution(format!("read body failed url={url}: {e}")))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| InsightsError::resolution(format!("write temp file failed: {e}")))?;
            written += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| InsightsError::resolution(format!("flush temp file failed: {e}")))?;
        Ok(written)
    }

    /// Deletes transient downloads older than the configured age. Failures
    /// are logged and never propagate. Returns the number of files removed.
    pub async fn sweep_stale_temp_files(&self) -> usize {
        let dir = self.temp_root.clone();
        let max_age = self.temp_max_age;
        match tokio::task::spawn_blocking(move || sweep_stale_files(&dir, max_age)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "temp sweep task failed");
                0
            }
        }
    }
}

fn create_transient_file(temp_root: &Path) -> Result<tempfile::NamedTempFile, InsightsError> {
    std::fs::create_dir_all(temp_root).map_err(|e| {
        InsightsError::resolution(format!(
            "create temp dir {} failed: {e}",
            temp_root.display()
        ))
    })?;
    tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(".csv")
        .tempfile_in(temp_root)
        .map_err(|e| InsightsError::resolution(format!("create temp file failed: {e}")))
}

fn sweep_stale_files(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "temp sweep could not list directory");
            return 0;
        }
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let is_ours = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(TEMP_FILE_PREFIX));
        if !is_ours {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > max_age) {
            continue;
        }
        let path = entry.path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                info!(path = %path.display(), "removed stale transient dataset");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "stale sweep removal failed"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn resolver(roots: Vec<PathBuf>, remote: Option<&str>, temp_root: &Path) -> SourceResolver {
        let cfg = InsightsConfig {
            local_roots: roots,
            remote_base_url: remote.map(ToString::to_string),
            temp_root: temp_root.to_path_buf(),
            ..InsightsConfig::default()
        };
        SourceResolver::new(&cfg).expect("resolver")
    }

    fn age_file(path: &Path, age: Duration) {
        let file = fs::File::options().write(true).open(path).expect("open");
        file.set_modified(SystemTime::now() - age).expect("set mtime");
    }

    #[test]
    fn year_scope_probes_split_directory_first() {
        let tmp = tempdir().expect("tempdir");
        let r = resolver(
            vec![PathBuf::from("/a"), PathBuf::from("/b")],
            None,
            tmp.path(),
        );
        assert_eq!(
            r.local_candidates(DatasetKind::Enrolment, YearScope::Year(2025)),
            vec![
                PathBuf::from("/a/split_data/enrolment_2025.csv"),
                PathBuf::from("/a/enrolment_2025.csv"),
                PathBuf::from("/b/split_data/enrolment_2025.csv"),
                PathBuf::from("/b/enrolment_2025.csv"),
            ]
        );
        assert_eq!(
            r.local_candidates(DatasetKind::Biometric, YearScope::All),
            vec![
                PathBuf::from("/a/biometric_full.csv"),
                PathBuf::from("/b/biometric_full.csv"),
            ]
        );
    }

    #[test]
    fn remote_url_joins_base_and_file_name() {
        let tmp = tempdir().expect("tempdir");
        let r = resolver(Vec::new(), Some("https://example.org/releases/"), tmp.path());
        assert_eq!(
            r.remote_url(DatasetKind::Demographic, YearScope::All).as_deref(),
            Some("https://example.org/releases/demographic_full.csv")
        );
        let none = resolver(Vec::new(), Some("   "), tmp.path());
        assert!(none.remote_url(DatasetKind::Demographic, YearScope::All).is_none());
    }

    #[tokio::test]
    async fn local_copy_wins_and_is_not_transient() {
        let root = tempdir().expect("tempdir");
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("split_data")).expect("mkdir");
        fs::write(root.path().join("split_data/enrolment_2025.csv"), "state\n").expect("write");
        fs::write(root.path().join("enrolment_2025.csv"), "state\n").expect("write");
        let r = resolver(vec![root.path().to_path_buf()], None, temp.path());

        let source = r
            .resolve(DatasetKind::Enrolment, YearScope::Year(2025))
            .await
            .expect("resolved");
        assert!(!source.is_transient());
        assert_eq!(
            source.path(),
            root.path().join("split_data/enrolment_2025.csv")
        );
        let path = source.path().to_path_buf();
        source.release();
        assert!(path.exists(), "local sources are never deleted");
    }

    #[tokio::test]
    async fn missing_everywhere_without_remote_is_resolution_error() {
        let root = tempdir().expect("tempdir");
        let temp = tempdir().expect("tempdir");
        let r = resolver(vec![root.path().to_path_buf()], None, temp.path());
        let err = r
            .resolve(DatasetKind::Biometric, YearScope::Year(2024))
            .await
            .expect_err("nothing to resolve");
        assert_eq!(err.code, crate::InsightsErrorCode::Resolution);
        assert!(err.message.contains("biometric_2024.csv"));
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_prefixed_files() {
        let temp = tempdir().expect("tempdir");
        let r = resolver(Vec::new(), None, temp.path());
        let stale = temp.path().join(format!("{TEMP_FILE_PREFIX}old.csv"));
        let fresh = temp.path().join(format!("{TEMP_FILE_PREFIX}new.csv"));
        let foreign = temp.path().join("keep-me.csv");
        for p in [&stale, &fresh, &foreign] {
            fs::write(p, "x").expect("write");
        }
        age_file(&stale, Duration::from_secs(3600));
        age_file(&foreign, Duration::from_secs(3600));

        assert_eq!(r.sweep_stale_temp_files().await, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(foreign.exists());
    }

    #[tokio::test]
    async fn sweep_of_missing_directory_is_a_no_op() {
        let temp = tempdir().expect("tempdir");
        let r = resolver(Vec::new(), None, &temp.path().join("never-created"));
        assert_eq!(r.sweep_stale_temp_files().await, 0);
    }
}
