//! 标签偏好存储
//! 每个客户端、每个分类一份有序标签列表。存储后端在启动时选定并注入

use crate::types::{MediaType, TagCategory, PROTECTED_TAG};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TagError {
    #[error("标签已存在: {0}")]
    AlreadyExists(String),
    #[error("标签 {0} 不能删除")]
    Protected(String),
    #[error("标签不能为空")]
    Empty,
    #[error("标签存储失败: {0}")]
    Storage(String),
}

impl From<std::io::Error> for TagError {
    fn from(e: std::io::Error) -> Self {
        TagError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TagError {
    fn from(e: serde_json::Error) -> Self {
        TagError::Storage(e.to_string())
    }
}

/// 一份标签列表的归属
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagScope {
    pub client: String,
    pub media: MediaType,
    pub category: Option<TagCategory>,
}

impl TagScope {
    pub fn new(client: impl Into<String>, media: MediaType, category: Option<TagCategory>) -> Self {
        Self {
            client: client.into(),
            media,
            category,
        }
    }

    pub fn key(&self) -> String {
        match self.category {
            Some(category) => format!("{}:{}_{}", self.client, self.media, category.as_str()),
            None => format!("{}:{}", self.client, self.media),
        }
    }

    pub fn defaults(&self) -> Vec<String> {
        let tags = match self.category {
            Some(category) => category.fallback_tags(),
            None => self.media.default_tags(),
        };
        tags.iter().map(|t| t.to_string()).collect()
    }
}

/// 键值存储接口
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<String>>, TagError>;
    async fn save(&self, key: &str, tags: &[String]) -> Result<(), TagError>;
}

/// 进程内存储，重启即丢失
#[derive(Default)]
pub struct MemoryTagStore {
    data: RwLock<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<String>>, TagError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, tags: &[String]) -> Result<(), TagError> {
        self.data.write().await.insert(key.to_string(), tags.to_vec());
        Ok(())
    }
}

/// 单个 JSON 文件存储，写入时先写临时文件再替换
pub struct FileTagStore {
    path: PathBuf,
    data: RwLock<HashMap<String, Vec<String>>>,
}

impl FileTagStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TagError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("📂 标签存储: {} ({} 个列表)", path.display(), data.len());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &HashMap<String, Vec<String>>) -> Result<(), TagError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TagStore for FileTagStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<String>>, TagError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, tags: &[String]) -> Result<(), TagError> {
        // 写锁持有到落盘结束，落盘成功后才更新内存
        let mut data = self.data.write().await;
        let mut next = data.clone();
        next.insert(key.to_string(), tags.to_vec());
        self.persist(&next).await?;
        *data = next;
        Ok(())
    }
}

/// 转义 HTML 特殊字符并去除首尾空白
pub fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 标签增删改查
#[derive(Clone)]
pub struct TagPreferences {
    store: Arc<dyn TagStore>,
    /// 读改写期间持有，修改操作依次执行
    writes: Arc<Mutex<()>>,
}

impl TagPreferences {
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self {
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// 读取标签，没有保存过或为空时返回默认列表
    pub async fn load(&self, scope: &TagScope) -> Result<Vec<String>, TagError> {
        match self.store.load(&scope.key()).await? {
            Some(tags) if !tags.is_empty() => Ok(tags),
            _ => Ok(scope.defaults()),
        }
    }

    /// 追加标签，忽略大小写去重
    pub async fn add(&self, scope: &TagScope, tag: &str) -> Result<Vec<String>, TagError> {
        let tag = sanitize_tag(tag);
        if tag.is_empty() {
            return Err(TagError::Empty);
        }

        let _guard = self.writes.lock().await;
        let mut tags = self.load(scope).await?;
        let lowered = tag.to_lowercase();
        if tags.iter().any(|t| t.to_lowercase() == lowered) {
            return Err(TagError::AlreadyExists(tag));
        }

        tags.push(tag);
        self.store.save(&scope.key(), &tags).await?;
        debug!("标签已添加: {}", scope.key());
        Ok(tags)
    }

    /// 删除标签，受保护的标签不可删除
    pub async fn remove(&self, scope: &TagScope, tag: &str) -> Result<Vec<String>, TagError> {
        let tag = tag.trim();
        if tag == PROTECTED_TAG {
            return Err(TagError::Protected(tag.to_string()));
        }

        let _guard = self.writes.lock().await;
        let mut tags = self.load(scope).await?;
        let before = tags.len();
        tags.retain(|t| t != tag);
        if tags.len() != before {
            self.store.save(&scope.key(), &tags).await?;
        }
        Ok(tags)
    }

    /// 恢复默认列表
    pub async fn reset(&self, scope: &TagScope) -> Result<Vec<String>, TagError> {
        let defaults = scope.defaults();
        let _guard = self.writes.lock().await;
        self.store.save(&scope.key(), &defaults).await?;
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> TagPreferences {
        TagPreferences::new(Arc::new(MemoryTagStore::default()))
    }

    fn movie() -> TagScope {
        TagScope::new("browser-1", MediaType::Movie, None)
    }

    #[test]
    fn test_scope_keys() {
        assert_eq!(movie().key(), "browser-1:movie");
        let scope = TagScope::new("b", MediaType::Tv, Some(TagCategory::JpAnime));
        assert_eq!(scope.key(), "b:tv_jp_anime");
        assert_eq!(scope.defaults()[1], "冒险");
    }

    #[tokio::test]
    async fn test_load_falls_back_to_defaults() {
        let prefs = prefs();
        assert_eq!(prefs.load(&movie()).await.unwrap(), movie().defaults());

        // 空列表同样回退
        prefs.store.save(&movie().key(), &[]).await.unwrap();
        assert_eq!(prefs.load(&movie()).await.unwrap(), movie().defaults());
    }

    #[tokio::test]
    async fn test_add_dedups_case_insensitive() {
        let prefs = prefs();
        let tags = prefs.add(&movie(), "  Marvel ").await.unwrap();
        assert_eq!(tags.last().unwrap(), "Marvel");

        let err = prefs.add(&movie(), "marvel").await.unwrap_err();
        assert!(matches!(err, TagError::AlreadyExists(_)));
        assert_eq!(
            prefs.load(&movie()).await.unwrap().len(),
            movie().defaults().len() + 1
        );

        assert!(matches!(
            prefs.add(&movie(), "   ").await.unwrap_err(),
            TagError::Empty
        ));
    }

    #[tokio::test]
    async fn test_add_escapes_html() {
        let tags = prefs().add(&movie(), "<b>\"x\"</b>").await.unwrap();
        assert_eq!(tags.last().unwrap(), "&lt;b&gt;&quot;x&quot;&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_protected_tag_cannot_be_removed() {
        let prefs = prefs();
        let err = prefs.remove(&movie(), PROTECTED_TAG).await.unwrap_err();
        assert!(matches!(err, TagError::Protected(_)));

        let tags = prefs.remove(&movie(), "恐怖").await.unwrap();
        assert!(!tags.contains(&"恐怖".to_string()));
        assert_eq!(tags[0], PROTECTED_TAG);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let prefs = prefs();
        let scope = TagScope::new("b", MediaType::Tv, Some(TagCategory::Variety));
        prefs.add(&scope, "选秀").await.unwrap();
        prefs.remove(&scope, "脱口秀").await.unwrap();

        let tags = prefs.reset(&scope).await.unwrap();
        let expected: Vec<String> = TagCategory::Variety
            .fallback_tags()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(tags, expected);
        assert_eq!(prefs.load(&scope).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let prefs = prefs();
        prefs.add(&movie(), "漫威").await.unwrap();
        let other = TagScope::new("browser-2", MediaType::Movie, None);
        assert_eq!(prefs.load(&other).await.unwrap(), other.defaults());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tags.json");

        let store = FileTagStore::open(&path).await.unwrap();
        let prefs = TagPreferences::new(Arc::new(store));
        prefs.add(&movie(), "漫威").await.unwrap();

        let reopened = FileTagStore::open(&path).await.unwrap();
        let tags = reopened.load(&movie().key()).await.unwrap().unwrap();
        assert_eq!(tags.last().unwrap(), "漫威");
    }

    /// 读取时让出执行权，模拟外部键值存储
    #[derive(Default)]
    struct YieldingStore {
        inner: MemoryTagStore,
    }

    #[async_trait]
    impl TagStore for YieldingStore {
        async fn load(&self, key: &str) -> Result<Option<Vec<String>>, TagError> {
            tokio::task::yield_now().await;
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, tags: &[String]) -> Result<(), TagError> {
            tokio::task::yield_now().await;
            self.inner.save(key, tags).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_both_tags() {
        let prefs = TagPreferences::new(Arc::new(YieldingStore::default()));
        let scope = movie();

        let (a, b) = tokio::join!(prefs.add(&scope, "A"), prefs.add(&scope, "B"));
        a.unwrap();
        b.unwrap();

        let tags = prefs.load(&scope).await.unwrap();
        assert_eq!(tags.len(), scope.defaults().len() + 2);
        assert!(tags.contains(&"A".to_string()));
        assert!(tags.contains(&"B".to_string()));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("data");
        let store = FileTagStore::open(parent.join("tags.json")).await.unwrap();
        // 目录位置被普通文件占用，落盘必然失败
        std::fs::write(&parent, "occupied").unwrap();

        let prefs = TagPreferences::new(Arc::new(store));
        let err = prefs.add(&movie(), "Ghost").await.unwrap_err();
        assert!(matches!(err, TagError::Storage(_)));

        let tags = prefs.load(&movie()).await.unwrap();
        assert_eq!(tags, movie().defaults());
        assert!(prefs.store.load(&movie().key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileTagStore::open(&path).await,
            Err(TagError::Storage(_))
        ));
    }
}
