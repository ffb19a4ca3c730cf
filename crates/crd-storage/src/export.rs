//! Writes articles into the output directory as markdown files with a hash manifest.
//!
//! `manifest.json` records which article owns each file. Every export reads it, picks a
//! path no other article owns, writes the file and upserts its entry, all under one lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crd_core::Article;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct ExportedArticle {
    pub article_id: Uuid,
    pub slug: String,
    pub content_hash: String,
    pub relative_path: PathBuf,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// The file already held identical content and was left alone.
    pub unchanged: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub files: Vec<ExportManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifestFile {
    #[serde(default)]
    pub article_id: String,
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

impl ExportManifest {
    fn owner_of(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.article_id.as_str())
    }

    fn path_for(&self, article_id: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.article_id == article_id)
            .map(|f| f.path.as_str())
    }

    /// One entry per article and per path; the newest export wins both.
    fn upsert(&mut self, entry: ExportManifestFile) {
        self.files
            .retain(|f| f.article_id != entry.article_id && f.path != entry.path);
        self.files.push(entry);
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

#[derive(Debug, Clone)]
pub struct ArticleExporter {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ArticleExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("CRD_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./output")),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// `articles/<slug>.md`, with the slug reduced to `[a-z0-9-]` and the id as fallback.
    pub fn article_relative_path(&self, article: &Article) -> PathBuf {
        PathBuf::from("articles").join(format!("{}.md", Self::file_stem(article)))
    }

    fn file_stem(article: &Article) -> String {
        let slug = article
            .slug
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if slug.is_empty() {
            article.id.to_string()
        } else {
            slug
        }
    }

    /// The slug path unless another article owns it, in which case the id is appended.
    /// Ownership comes from the manifest, or from the `id:` front matter of a file
    /// the manifest does not know about.
    async fn resolve_path(&self, article: &Article, manifest: &ExportManifest) -> PathBuf {
        let id = article.id.to_string();
        let base = self.article_relative_path(article);
        let base_key = base.display().to_string();
        let taken = match manifest.owner_of(&base_key) {
            Some(owner) => owner != id,
            None => match fs::read_to_string(self.root.join(&base)).await {
                Ok(existing) => front_matter_id(&existing).is_some_and(|owner| owner != id),
                Err(_) => false,
            },
        };
        if !taken {
            return base;
        }
        let short = article.id.simple().to_string();
        let suffixed = PathBuf::from("articles")
            .join(format!("{}-{}.md", Self::file_stem(article), &short[..8]));
        let suffixed_key = suffixed.display().to_string();
        match manifest.owner_of(&suffixed_key) {
            Some(owner) if owner != id => {
                PathBuf::from("articles").join(format!("{}-{short}.md", Self::file_stem(article)))
            }
            _ => suffixed,
        }
    }

    pub fn render_document(article: &Article, contractor_name: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("title: {:?}\n", article.title));
        out.push_str(&format!("id: {}\n", article.id));
        out.push_str(&format!("slug: {:?}\n", article.slug));
        out.push_str(&format!("status: {}\n", article.status.as_str()));
        if let Some(name) = contractor_name {
            out.push_str(&format!("contractor: {name:?}\n"));
        }
        out.push_str(&format!("generated_at: {}\n", article.generated_at.to_rfc3339()));
        if let Some(published_at) = article.published_at {
            out.push_str(&format!("published_at: {}\n", published_at.to_rfc3339()));
        }
        out.push_str("---\n\n");
        out.push_str(article.content_markdown.trim_end());
        out.push('\n');
        out
    }

    /// Reads `manifest.json`; a missing file is an empty manifest.
    pub async fn read_manifest(&self) -> anyhow::Result<ExportManifest> {
        let path = self.manifest_path();
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing export manifest {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ExportManifest {
                schema_version: MANIFEST_SCHEMA_VERSION,
                files: Vec::new(),
            }),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Writes the article atomically, skipping identical content, and records it in the manifest.
    pub async fn export(
        &self,
        article: &Article,
        contractor_name: Option<&str>,
    ) -> anyhow::Result<ExportedArticle> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.read_manifest().await?;

        let document = Self::render_document(article, contractor_name);
        let bytes = document.as_bytes();
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.resolve_path(article, &manifest).await;
        let absolute_path = self.root.join(&relative_path);

        let unchanged = match fs::read(&absolute_path).await {
            Ok(existing) => Self::sha256_hex(&existing) == content_hash,
            Err(_) => false,
        };
        if !unchanged {
            write_atomic(&absolute_path, bytes).await?;
        }

        let id = article.id.to_string();
        let key = relative_path.display().to_string();
        if let Some(previous) = manifest.path_for(&id).filter(|p| *p != key) {
            debug!(article = %id, previous, current = %key, "article export moved");
        }
        manifest.upsert(ExportManifestFile {
            article_id: id,
            name: article.slug.clone(),
            path: key,
            sha256: content_hash.clone(),
            bytes: bytes.len() as u64,
        });
        self.store_manifest(&mut manifest).await?;

        Ok(ExportedArticle {
            article_id: article.id,
            slug: article.slug.clone(),
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            unchanged,
        })
    }

    /// Drops entries whose files are gone, then writes the manifest atomically.
    async fn store_manifest(&self, manifest: &mut ExportManifest) -> anyhow::Result<()> {
        let mut kept = Vec::with_capacity(manifest.files.len());
        for file in manifest.files.drain(..) {
            if fs::try_exists(self.root.join(&file.path)).await.unwrap_or(false) {
                kept.push(file);
            }
        }
        manifest.files = kept;
        manifest.schema_version = MANIFEST_SCHEMA_VERSION;
        let bytes = serde_json::to_vec_pretty(manifest).context("serializing export manifest")?;
        write_atomic(&self.manifest_path(), &bytes).await
    }
}

fn front_matter_id(document: &str) -> Option<&str> {
    let body = document.strip_prefix("---\n")?;
    body.lines()
        .take_while(|line| *line != "---")
        .find_map(|line| line.strip_prefix("id: "))
        .map(str::trim)
}

/// Temp file in the target directory, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating export directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp export file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp export file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp export file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("renaming temp export {} -> {}", temp_path.display(), path.display())
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use crd_core::ArticleStatus;
    use tempfile::tempdir;

    fn article(slug: &str, body: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            contractor_id: Uuid::new_v4(),
            title: "Best Chimney Sweeps".into(),
            slug: slug.into(),
            content_markdown: body.into(),
            status: ArticleStatus::Published,
            word_count: None,
            model_used: None,
            generated_at: DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
                .expect("ts")
                .with_timezone(&Utc),
            published_at: None,
        }
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(
            ArticleExporter::sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn slugs_are_sanitised() {
        let exporter = ArticleExporter::new("/tmp/out");
        let a = article("../Denver Chimney--Pros!", "x");
        assert_eq!(
            exporter.article_relative_path(&a),
            PathBuf::from("articles/denver-chimney-pros.md")
        );
        let b = article("???", "x");
        assert_eq!(
            exporter.article_relative_path(&b),
            PathBuf::from(format!("articles/{}.md", b.id))
        );
    }

    #[tokio::test]
    async fn export_is_atomic_and_skips_identical_content() {
        let dir = tempdir().expect("tempdir");
        let exporter = ArticleExporter::new(dir.path());
        let a = article("acme-chimney", "# Acme\n\nGreat work.");

        let first = exporter.export(&a, Some("Acme Chimney")).await.expect("first");
        let second = exporter.export(&a, Some("Acme Chimney")).await.expect("second");
        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(first.content_hash, second.content_hash);

        let written = std::fs::read_to_string(&first.absolute_path).expect("read");
        assert!(written.starts_with("---\ntitle: \"Best Chimney Sweeps\"\n"));
        assert!(written.contains("contractor: \"Acme Chimney\""));
        assert!(written.ends_with("Great work.\n"));

        let edited = Article {
            content_markdown: "# Acme\n\nUpdated.".into(),
            ..a
        };
        let third = exporter.export(&edited, None).await.expect("third");
        assert!(!third.unchanged);
        assert_ne!(third.content_hash, first.content_hash);

        let leftovers = std::fs::read_dir(dir.path().join("articles"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let manifest = exporter.read_manifest().await.expect("manifest");
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, "articles/acme-chimney.md");
        assert_eq!(manifest.files[0].sha256, third.content_hash);
    }

    #[tokio::test]
    async fn colliding_slugs_get_distinct_files() {
        let dir = tempdir().expect("tempdir");
        let exporter = ArticleExporter::new(dir.path());
        let first = article("Denver Chimney!", "FIRST");
        let second = article("denver-chimney", "SECOND");

        let a = exporter.export(&first, None).await.expect("first");
        let b = exporter.export(&second, None).await.expect("second");
        assert_eq!(a.relative_path, PathBuf::from("articles/denver-chimney.md"));
        assert_ne!(a.relative_path, b.relative_path);
        let short = second.id.simple().to_string();
        assert_eq!(
            b.relative_path,
            PathBuf::from(format!("articles/denver-chimney-{}.md", &short[..8]))
        );
        assert!(std::fs::read_to_string(&a.absolute_path).unwrap().contains("FIRST"));
        assert!(std::fs::read_to_string(&b.absolute_path).unwrap().contains("SECOND"));

        let again = exporter.export(&second, None).await.expect("again");
        assert_eq!(again.relative_path, b.relative_path);
        assert!(again.unchanged);

        let manifest = exporter.read_manifest().await.expect("manifest");
        let paths = manifest.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
    }

    #[tokio::test]
    async fn unknown_owner_in_front_matter_is_not_overwritten() {
        let dir = tempdir().expect("tempdir");
        let exporter = ArticleExporter::new(dir.path());
        let first = article("acme", "FIRST");
        let a = exporter.export(&first, None).await.expect("first");
        std::fs::remove_file(exporter.manifest_path()).unwrap();

        let other = article("acme", "OTHER");
        let b = exporter.export(&other, None).await.expect("other");
        assert_ne!(a.relative_path, b.relative_path);
        assert!(std::fs::read_to_string(&a.absolute_path).unwrap().contains("FIRST"));
    }

    #[tokio::test]
    async fn manifest_accumulates_across_separate_exports() {
        let dir = tempdir().expect("tempdir");
        let published = article("published-one", "one");
        let draft = Article {
            status: ArticleStatus::Draft,
            ..article("draft-two", "two")
        };

        ArticleExporter::new(dir.path())
            .export(&published, None)
            .await
            .expect("published");
        let exporter = ArticleExporter::new(dir.path());
        exporter.export(&draft, None).await.expect("draft");

        let manifest = exporter.read_manifest().await.expect("manifest");
        let paths = manifest.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["articles/draft-two.md", "articles/published-one.md"]);
        assert_eq!(manifest.files[1].article_id, published.id.to_string());

        std::fs::remove_file(dir.path().join("articles/draft-two.md")).unwrap();
        exporter.export(&published, None).await.expect("re-export");
        let manifest = exporter.read_manifest().await.expect("manifest");
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn front_matter_id_is_read() {
        let a = article("acme", "body");
        let doc = ArticleExporter::render_document(&a, None);
        assert_eq!(front_matter_id(&doc), Some(a.id.to_string().as_str()));
        assert_eq!(front_matter_id("no front matter"), None);
    }
}
